//! Approximate text matching used when the primary store is unavailable.
//!
//! Scores are partial-similarity ratios in `[0, 100]`: the shorter string is
//! slid across the longer one and the best normalized Levenshtein similarity
//! of any equal-length window wins. Both sides are lower-cased first.

use crate::models::RawHit;

/// Threshold used when the primary store fails or returns nothing.
pub const FALLBACK_THRESHOLD: f64 = 50.0;

/// Threshold for a backup-only search the caller asked for directly.
pub const MANUAL_THRESHOLD: f64 = 70.0;

/// Partial similarity of `query` against `candidate`, in `[0, 100]`.
///
/// Empty inputs never match.
pub fn partial_ratio(query: &str, candidate: &str) -> f64 {
    let q: Vec<char> = query.to_lowercase().chars().collect();
    let c: Vec<char> = candidate.to_lowercase().chars().collect();
    if q.is_empty() || c.is_empty() {
        return 0.0;
    }

    let (short, long) = if q.len() <= c.len() { (q, c) } else { (c, q) };
    let width = short.len();
    let mut best = 0.0_f64;

    for window in long.windows(width) {
        let window = window.to_vec();
        let distance = strsim::generic_levenshtein(&short, &window);
        let score = 100.0 * (1.0 - distance as f64 / width as f64);
        if score > best {
            best = score;
            if best >= 100.0 {
                break;
            }
        }
    }

    best
}

/// True if `query` scores at least `threshold` against `candidate`.
pub fn is_match(query: &str, candidate: &str, threshold: f64) -> bool {
    partial_ratio(query, candidate) >= threshold
}

/// True if any element of a multi-valued text field meets `threshold`.
pub fn any_match(query: &str, candidates: &[String], threshold: f64) -> bool {
    candidates.iter().any(|c| is_match(query, c, threshold))
}

/// Scan `corpus` in order and return the text hits matching `query`.
///
/// Each record is emitted at most once, and iteration stops as soon as `cap`
/// hits have been collected.
pub fn match_corpus<'a>(
    query: &str,
    corpus: &'a [RawHit],
    threshold: f64,
    cap: usize,
) -> Vec<&'a RawHit> {
    scan_corpus(query, corpus, threshold, cap, Some)
}

/// Like [`match_corpus`], but every match is passed through `admit` and only
/// the hits it accepts count toward `cap`.
pub fn scan_corpus<'a, T, F>(
    query: &str,
    corpus: &'a [RawHit],
    threshold: f64,
    cap: usize,
    mut admit: F,
) -> Vec<T>
where
    F: FnMut(&'a RawHit) -> Option<T>,
{
    let mut out = Vec::new();
    if cap == 0 {
        return out;
    }
    for hit in corpus {
        if !any_match(query, hit.text_lines(), threshold) {
            continue;
        }
        if let Some(accepted) = admit(hit) {
            out.push(accepted);
            if out.len() >= cap {
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Modality;
    use serde_json::json;

    fn ocr(frame: u64, text: serde_json::Value) -> RawHit {
        RawHit::decode(
            Modality::Ocr,
            json!({"video_id": "V1", "frame_id": frame, "text": text}),
        )
        .unwrap()
    }

    #[test]
    fn test_exact_substring_scores_full() {
        assert_eq!(partial_ratio("Tin Tuc", "ban tin tuc thoi su"), 100.0);
    }

    #[test]
    fn test_score_is_symmetric_in_length() {
        let a = partial_ratio("hello world", "world");
        let b = partial_ratio("world", "hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_never_matches() {
        assert_eq!(partial_ratio("", "anything"), 0.0);
        assert_eq!(partial_ratio("query", ""), 0.0);
    }

    #[test]
    fn test_one_typo_still_matches_fallback_threshold() {
        assert!(is_match("weather", "tonight's wether forecast", FALLBACK_THRESHOLD));
        assert!(!is_match("weather", "xyz", FALLBACK_THRESHOLD));
    }

    #[test]
    fn test_fallback_is_looser_than_manual() {
        assert!(is_match("wether", "weather report", FALLBACK_THRESHOLD));
        assert!(!is_match("wether", "weather report", MANUAL_THRESHOLD));
    }

    #[test]
    fn test_multi_line_record_emitted_once() {
        let corpus = vec![ocr(1, json!(["flood news", "flood warning", "flood"]))];
        let found = match_corpus("flood", &corpus, FALLBACK_THRESHOLD, 10);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_cap_stops_iteration() {
        let corpus: Vec<RawHit> = (0..10).map(|i| ocr(i, json!("market price"))).collect();
        let found = match_corpus("market", &corpus, FALLBACK_THRESHOLD, 3);
        let frames: Vec<_> = found.iter().filter_map(|h| h.locator()).map(|l| l.frame_id).collect();
        assert_eq!(frames, vec![0, 1, 2]);
    }

    #[test]
    fn test_rejected_matches_do_not_use_the_cap() {
        let corpus: Vec<RawHit> = (0..6).map(|i| ocr(i, json!("market price"))).collect();
        let mut seen = 0;
        let found = scan_corpus("market", &corpus, FALLBACK_THRESHOLD, 2, |hit| {
            seen += 1;
            hit.locator().filter(|l| l.frame_id >= 3)
        });
        let frames: Vec<_> = found.iter().map(|l| l.frame_id).collect();
        assert_eq!(frames, vec![3, 4]);
        assert_eq!(seen, 5);
    }

    #[test]
    fn test_raising_threshold_never_adds_matches() {
        let corpus = vec![
            ocr(1, json!("football match tonight")),
            ocr(2, json!("footbal")),
            ocr(3, json!("basketball")),
            ocr(4, json!(["nothing", "foot"])),
            ocr(5, json!("unrelated")),
        ];
        let mut previous = usize::MAX;
        for threshold in [0.0, 25.0, 50.0, 70.0, 90.0, 100.0] {
            let count = match_corpus("football", &corpus, threshold, usize::MAX).len();
            assert!(count <= previous, "count rose at threshold {}", threshold);
            previous = count;
        }
    }
}
