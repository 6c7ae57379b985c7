//! Merging per-modality result sets into one response.
//!
//! Fusion is a plain merge. A frame may legitimately appear under several
//! modality keys, so nothing is deduplicated, and every key is always present
//! in the serialized output.

use serde::Serialize;

use crate::models::{Modality, ResolvedHit};

/// The combined response, one ordered sequence per modality.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FusedResponse {
    pub clip: Vec<ResolvedHit>,
    pub ocr: Vec<ResolvedHit>,
    pub object: Vec<ResolvedHit>,
    pub asr: Vec<ResolvedHit>,
    pub image: Vec<ResolvedHit>,
}

impl FusedResponse {
    pub fn get(&self, modality: Modality) -> &[ResolvedHit] {
        match modality {
            Modality::Clip => &self.clip,
            Modality::Ocr => &self.ocr,
            Modality::Object => &self.object,
            Modality::Asr => &self.asr,
            Modality::Image => &self.image,
        }
    }

    pub fn get_mut(&mut self, modality: Modality) -> &mut Vec<ResolvedHit> {
        match modality {
            Modality::Clip => &mut self.clip,
            Modality::Ocr => &mut self.ocr,
            Modality::Object => &mut self.object,
            Modality::Asr => &mut self.asr,
            Modality::Image => &mut self.image,
        }
    }

    /// Rewrite every key's hits with `f`.
    pub fn map_each<F>(mut self, mut f: F) -> Self
    where
        F: FnMut(Modality, Vec<ResolvedHit>) -> Vec<ResolvedHit>,
    {
        for modality in Modality::ALL {
            let slot = self.get_mut(modality);
            let hits = std::mem::take(slot);
            *slot = f(modality, hits);
        }
        self
    }

    /// Total hit count across all keys.
    pub fn total(&self) -> usize {
        Modality::ALL.iter().map(|m| self.get(*m).len()).sum()
    }
}

/// Merge per-modality results. Modalities not supplied stay empty; a
/// modality supplied twice has its hits appended in order.
pub fn fuse<I>(results: I) -> FusedResponse
where
    I: IntoIterator<Item = (Modality, Vec<ResolvedHit>)>,
{
    let mut fused = FusedResponse::default();
    for (modality, hits) in results {
        fused.get_mut(modality).extend(hits);
    }
    fused
}
