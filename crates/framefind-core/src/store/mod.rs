//! Collaborator interfaces for the retrieval engine.
//!
//! Search operations never reach into process-wide singletons. Each one is
//! handed the collaborators it needs:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`PrimaryStore`] | Indexed, network-accessible text/object search |
//! | [`BackupProvider`] | Read-only snapshot per modality, used on fallback |
//! | [`CatalogProvider`] | Media catalogs, frame listing, per-video metadata |
//! | [`VectorSearch`] | Opaque visual-semantic nearest-neighbour search |
//!
//! Implementations must be `Send + Sync`; snapshots are handed out as `Arc`s
//! so a reload replaces the whole value and in-flight readers keep the one
//! they started with.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::align::FrameListing;
use crate::models::{Modality, ObjectQuery, RawHit, VideoMetadata};
use crate::resolve::Catalogs;

/// A document returned by the primary store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredHit {
    /// The stored document body.
    pub source: Value,
    /// Relevance score, when the store ranks results.
    pub score: Option<f64>,
}

impl StoredHit {
    pub fn new(source: Value, score: Option<f64>) -> Self {
        Self { source, score }
    }
}

/// Result of one primary-store call.
///
/// Transport failures are folded into [`PrimaryOutcome::Unavailable`] instead
/// of an error so the fallback decision is an ordinary branch.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryOutcome {
    /// Relevance-ranked hits, possibly empty.
    Hits(Vec<StoredHit>),
    /// The store could not be reached or answered with an error.
    Unavailable(String),
}

impl PrimaryOutcome {
    /// Empty results and unavailability both trigger the backup corpus.
    pub fn needs_fallback(&self) -> bool {
        match self {
            PrimaryOutcome::Hits(hits) => hits.is_empty(),
            PrimaryOutcome::Unavailable(_) => true,
        }
    }
}

/// The authoritative indexed store.
///
/// Calls must be bounded by the store's own request timeout; a timeout is
/// reported as [`PrimaryOutcome::Unavailable`].
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Full-text match of `query` against the modality's text field.
    async fn match_text(&self, modality: Modality, query: &str, limit: usize) -> PrimaryOutcome;

    /// Label equality AND count comparison AND optional locator restriction.
    async fn match_objects(&self, query: &ObjectQuery, limit: usize) -> PrimaryOutcome;
}

/// Immutable, ordered snapshot of one modality's index.
#[derive(Debug, Clone, Default)]
pub struct BackupCorpus {
    hits: Vec<RawHit>,
}

impl BackupCorpus {
    pub fn new(hits: Vec<RawHit>) -> Self {
        Self { hits }
    }

    /// Decode raw snapshot records, skipping any that do not fit the modality.
    pub fn from_records(modality: Modality, records: Vec<Value>) -> Self {
        let total = records.len();
        let hits: Vec<RawHit> = records
            .into_iter()
            .filter_map(|record| match RawHit::decode(modality, record) {
                Ok(hit) => Some(hit),
                Err(e) => {
                    tracing::debug!(%modality, error = %e, "skipping undecodable backup record");
                    None
                }
            })
            .collect();
        if hits.len() < total {
            tracing::warn!(
                %modality,
                kept = hits.len(),
                skipped = total - hits.len(),
                "backup corpus contained undecodable records"
            );
        }
        Self { hits }
    }

    pub fn hits(&self) -> &[RawHit] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Supplies backup corpora, loading lazily and caching for the process.
pub trait BackupProvider: Send + Sync {
    /// The current snapshot for `modality`; empty when none is available.
    fn corpus(&self, modality: Modality) -> Arc<BackupCorpus>;
}

/// Supplies catalogs, the frame listing, and per-video metadata.
pub trait CatalogProvider: Send + Sync {
    fn catalogs(&self) -> Arc<Catalogs>;
    fn frame_listing(&self) -> Arc<FrameListing>;
    fn video_metadata(&self) -> Arc<HashMap<String, VideoMetadata>>;
}

/// Visual-semantic nearest-neighbour search over the frame corpus.
///
/// Returns ranked corpus indices, resolved through the [`FrameListing`].
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search_text(&self, query: &str, k: usize) -> Result<Vec<usize>>;
    async fn search_image(&self, image_ref: &str, k: usize) -> Result<Vec<usize>>;
}
