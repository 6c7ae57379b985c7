//! Per-modality search with a single primary→backup fallback decision.
//!
//! # Algorithm
//!
//! 1. Query the [`PrimaryStore`] (full-text match for `ocr`/`asr`, structured
//!    label + count filter for `object`). Object hits outside the query's
//!    locator restriction are discarded here.
//! 2. If the store is unavailable or nothing is left, scan the modality's
//!    [`BackupCorpus`](crate::store::BackupCorpus) instead: fuzzy matching for
//!    text modalities, [`ObjectQuery::matches`] for objects. Backup results
//!    keep corpus order.
//! 3. Bind speech hits to frames with the [`TemporalAligner`]; unaligned
//!    speech hits are dropped.
//! 4. Resolve catalog paths for every surviving hit.
//! 5. Cap the result count. Only surviving hits count toward the cap, so a
//!    backup scan stops at the cap-th admitted hit.
//!
//! The fallback begins only after the primary call has returned. There are
//! no retries. [`ModalitySearchClient::search_backup`] skips the primary
//! store entirely and matches with the stricter manual threshold.

use serde::Serialize;

use crate::align::TemporalAligner;
use crate::filter::{is_allowed, restrict_to_locators};
use crate::fuzzy::{self, FALLBACK_THRESHOLD, MANUAL_THRESHOLD};
use crate::models::{Modality, ObjectQuery, RawHit, ResolvedHit, SpeechRecord};
use crate::resolve::{Catalogs, PathResolver};
use crate::store::{BackupProvider, CatalogProvider, PrimaryOutcome, PrimaryStore, StoredHit};

/// Ceiling on hits returned per modality.
pub const RESULT_CAP: usize = 200;

/// Retrieval tuning, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Maximum hits per modality; callers may only ask for fewer.
    pub result_cap: usize,
    /// Fuzzy threshold applied to the backup corpus after a fallback.
    pub fallback_threshold: f64,
    /// Fuzzy threshold for [`ModalitySearchClient::search_backup`].
    pub manual_threshold: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            result_cap: RESULT_CAP,
            fallback_threshold: FALLBACK_THRESHOLD,
            manual_threshold: MANUAL_THRESHOLD,
        }
    }
}

/// One modality's query.
#[derive(Debug, Clone, PartialEq)]
pub enum ModalityQuery {
    /// Free text for `ocr` or `asr`.
    Text(String),
    /// Structured query for `object`.
    Object(ObjectQuery),
}

/// Which index produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Primary,
    Backup,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Primary => write!(f, "primary"),
            Provenance::Backup => write!(f, "backup"),
        }
    }
}

/// Hits for one modality plus where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ModalityResults {
    pub hits: Vec<ResolvedHit>,
    pub provenance: Provenance,
}

impl ModalityResults {
    fn empty() -> Self {
        Self {
            hits: Vec::new(),
            provenance: Provenance::Primary,
        }
    }

    fn backup(hits: Vec<ResolvedHit>) -> Self {
        Self {
            hits,
            provenance: Provenance::Backup,
        }
    }
}

/// Orchestrates primary-then-backup retrieval and path resolution.
///
/// Holds only shared references, so one client per request is cheap and
/// concurrent modality searches share no mutable state.
pub struct ModalitySearchClient<'a> {
    primary: &'a dyn PrimaryStore,
    backup: &'a dyn BackupProvider,
    catalogs: &'a dyn CatalogProvider,
    resolver: &'a PathResolver,
    settings: SearchSettings,
}

impl<'a> ModalitySearchClient<'a> {
    pub fn new(
        primary: &'a dyn PrimaryStore,
        backup: &'a dyn BackupProvider,
        catalogs: &'a dyn CatalogProvider,
        resolver: &'a PathResolver,
        settings: SearchSettings,
    ) -> Self {
        Self {
            primary,
            backup,
            catalogs,
            resolver,
            settings,
        }
    }

    /// Effective cap: the caller's `limit` if smaller than the ceiling.
    fn cap(&self, limit: Option<usize>) -> usize {
        let ceiling = self.settings.result_cap;
        limit.map_or(ceiling, |l| l.min(ceiling))
    }

    /// Search `modality` with `query`, falling back to the backup corpus.
    pub async fn search(
        &self,
        modality: Modality,
        query: &ModalityQuery,
        limit: Option<usize>,
    ) -> ModalityResults {
        match (modality, query) {
            (Modality::Ocr | Modality::Asr, ModalityQuery::Text(text)) => {
                self.search_text(modality, text, limit).await
            }
            (Modality::Object, ModalityQuery::Object(q)) => self.search_objects(q, limit).await,
            _ => {
                tracing::warn!(%modality, "query kind does not fit modality; no results");
                ModalityResults::empty()
            }
        }
    }

    /// Answer `query` from the backup corpus alone, without calling the
    /// primary store. Text modalities match with the manual threshold.
    pub fn search_backup(
        &self,
        modality: Modality,
        query: &ModalityQuery,
        limit: Option<usize>,
    ) -> ModalityResults {
        let cap = self.cap(limit);
        match (modality, query) {
            (Modality::Ocr | Modality::Asr, ModalityQuery::Text(text)) => {
                if text.trim().is_empty() || cap == 0 {
                    return ModalityResults::backup(Vec::new());
                }
                let hits = self.scan_text(modality, text, self.settings.manual_threshold, cap);
                ModalityResults::backup(hits)
            }
            (Modality::Object, ModalityQuery::Object(q)) => {
                if !object_query_is_usable(q) || cap == 0 {
                    return ModalityResults::backup(Vec::new());
                }
                ModalityResults::backup(self.scan_objects(q, cap))
            }
            _ => {
                tracing::warn!(%modality, "query kind does not fit modality; no results");
                ModalityResults::backup(Vec::new())
            }
        }
    }

    /// Free-text search over `ocr` or `asr`.
    pub async fn search_text(
        &self,
        modality: Modality,
        query: &str,
        limit: Option<usize>,
    ) -> ModalityResults {
        let cap = self.cap(limit);
        if query.trim().is_empty() || cap == 0 || !modality.is_text() {
            return ModalityResults::empty();
        }

        let outcome = self.primary.match_text(modality, query, cap).await;
        if !outcome.needs_fallback() {
            let hits = decode_stored(modality, outcome);
            return ModalityResults {
                hits: self.finalize(modality, hits, cap),
                provenance: Provenance::Primary,
            };
        }

        log_fallback(modality, &outcome);
        let hits = self.scan_text(modality, query, self.settings.fallback_threshold, cap);
        ModalityResults::backup(hits)
    }

    /// Structured object-detection search.
    ///
    /// An unrecognized operator matches nothing. When the query carries a
    /// locator restriction it is enforced on both paths, and a primary answer
    /// with nothing inside the restriction counts as empty.
    pub async fn search_objects(&self, query: &ObjectQuery, limit: Option<usize>) -> ModalityResults {
        let cap = self.cap(limit);
        if !object_query_is_usable(query) || cap == 0 {
            return ModalityResults::empty();
        }

        let outcome = self.primary.match_objects(query, cap).await;
        if outcome.needs_fallback() {
            log_fallback(Modality::Object, &outcome);
        } else {
            let hits = decode_stored(Modality::Object, outcome);
            let hits = match &query.restrict_to {
                Some(allowed) => restrict_to_locators(hits, allowed),
                None => hits,
            };
            if !hits.is_empty() {
                return ModalityResults {
                    hits: self.finalize(Modality::Object, hits, cap),
                    provenance: Provenance::Primary,
                };
            }
            tracing::warn!(
                label = %query.label,
                "primary store returned no hits inside the locator restriction; using backup corpus"
            );
        }

        ModalityResults::backup(self.scan_objects(query, cap))
    }

    /// Fuzzy scan of a text corpus. Each match is aligned and resolved
    /// before it counts toward `cap`.
    fn scan_text(&self, modality: Modality, query: &str, threshold: f64, cap: usize) -> Vec<ResolvedHit> {
        let corpus = self.backup.corpus(modality);
        let catalogs = self.catalogs.catalogs();
        let listing = (modality == Modality::Asr).then(|| self.catalogs.frame_listing());
        let mut aligner = listing.as_deref().map(TemporalAligner::new);

        fuzzy::scan_corpus(query, corpus.hits(), threshold, cap, |hit| {
            self.admit(modality, hit.clone(), None, aligner.as_mut(), &catalogs)
        })
    }

    /// In-order scan of the object corpus, honouring the locator restriction.
    fn scan_objects(&self, query: &ObjectQuery, cap: usize) -> Vec<ResolvedHit> {
        let corpus = self.backup.corpus(Modality::Object);
        let catalogs = self.catalogs.catalogs();

        let mut out = Vec::new();
        for hit in corpus.hits() {
            if out.len() >= cap {
                break;
            }
            let RawHit::Object(record) = hit else {
                continue;
            };
            if !query.matches(record) {
                continue;
            }
            if let Some(allowed) = &query.restrict_to {
                if !is_allowed(hit, allowed) {
                    continue;
                }
            }
            if let Some(resolved) = self.admit(Modality::Object, hit.clone(), None, None, &catalogs) {
                out.push(resolved);
            }
        }
        out
    }

    fn finalize(
        &self,
        modality: Modality,
        hits: Vec<(RawHit, Option<f64>)>,
        cap: usize,
    ) -> Vec<ResolvedHit> {
        let catalogs = self.catalogs.catalogs();
        let listing = (modality == Modality::Asr).then(|| self.catalogs.frame_listing());
        let mut aligner = listing.as_deref().map(TemporalAligner::new);

        let mut out = Vec::with_capacity(hits.len().min(cap));
        for (hit, score) in hits {
            if out.len() >= cap {
                break;
            }
            if let Some(resolved) = self.admit(modality, hit, score, aligner.as_mut(), &catalogs) {
                out.push(resolved);
            }
        }
        out
    }

    /// Align (speech only) and resolve one hit. `None` means the hit is
    /// dropped and must not count toward the cap.
    fn admit(
        &self,
        modality: Modality,
        hit: RawHit,
        score: Option<f64>,
        aligner: Option<&mut TemporalAligner<'_>>,
        catalogs: &Catalogs,
    ) -> Option<ResolvedHit> {
        let hit = match (hit, aligner) {
            (RawHit::Speech(record), Some(aligner)) => {
                RawHit::Speech(align_speech(record, aligner, catalogs)?)
            }
            (hit, _) => hit,
        };
        let resolved = self.resolver.resolve_hit(hit, score, catalogs);
        if resolved.is_none() {
            tracing::debug!(%modality, "hit has no frame locator; dropped");
        }
        resolved
    }
}

fn object_query_is_usable(query: &ObjectQuery) -> bool {
    if query.operator.is_none() {
        tracing::warn!(label = %query.label, "unrecognized count operator; no results");
        return false;
    }
    !query.label.trim().is_empty()
}

fn log_fallback(modality: Modality, outcome: &PrimaryOutcome) {
    match outcome {
        PrimaryOutcome::Unavailable(reason) => {
            tracing::warn!(%modality, %reason, "primary store unavailable; using backup corpus")
        }
        PrimaryOutcome::Hits(_) => {
            tracing::warn!(%modality, "primary store returned no hits; using backup corpus")
        }
    }
}

fn decode_stored(modality: Modality, outcome: PrimaryOutcome) -> Vec<(RawHit, Option<f64>)> {
    let PrimaryOutcome::Hits(hits) = outcome else {
        return Vec::new();
    };
    hits.into_iter()
        .filter_map(|StoredHit { source, score }| match RawHit::decode(modality, source) {
            Ok(hit) => Some((hit, score)),
            Err(e) => {
                tracing::debug!(%modality, error = %e, "skipping undecodable primary hit");
                None
            }
        })
        .collect()
}

/// Bind a speech segment to the first frame after its start.
///
/// `start` is in seconds; it is converted to a frame position when the fps
/// catalog knows the video and used as-is otherwise. Segments that already
/// carry a frame are kept unchanged.
fn align_speech(
    mut record: SpeechRecord,
    aligner: &mut TemporalAligner<'_>,
    catalogs: &Catalogs,
) -> Option<SpeechRecord> {
    if record.frame_id.is_some() {
        return Some(record);
    }
    let position = catalogs
        .fps_for(&record.video_id)
        .map_or(record.start, |fps| record.start * fps);
    match aligner.closest_frame(&record.video_id, position) {
        Some(locator) => {
            record.frame_id = Some(locator.frame_id);
            Some(record)
        }
        None => {
            tracing::debug!(
                video_id = %record.video_id,
                start = record.start,
                "no frame after speech segment; dropped"
            );
            None
        }
    }
}
