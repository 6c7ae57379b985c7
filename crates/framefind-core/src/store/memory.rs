//! In-memory collaborators for tests and embedded use.
//!
//! [`InMemoryPrimary`] answers text queries by case-insensitive term overlap
//! and object queries with [`ObjectQuery::matches`]; it can be switched to an
//! unavailable state to exercise the fallback path. The remaining types hold
//! fixed snapshots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::align::FrameListing;
use crate::models::{Modality, ObjectQuery, ObjectRecord, VideoMetadata};
use crate::resolve::Catalogs;

use super::{
    BackupCorpus, BackupProvider, CatalogProvider, PrimaryOutcome, PrimaryStore, StoredHit,
    VectorSearch,
};

/// In-memory primary store.
pub struct InMemoryPrimary {
    docs: HashMap<Modality, Vec<Value>>,
    available: AtomicBool,
    calls: AtomicUsize,
}

impl InMemoryPrimary {
    pub fn new() -> Self {
        Self {
            docs: HashMap::new(),
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_docs(mut self, modality: Modality, docs: Vec<Value>) -> Self {
        self.docs.entry(modality).or_default().extend(docs);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of queries received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Option<PrimaryOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            None
        } else {
            Some(PrimaryOutcome::Unavailable("in-memory store offline".to_string()))
        }
    }
}

impl Default for InMemoryPrimary {
    fn default() -> Self {
        Self::new()
    }
}

fn text_of(doc: &Value) -> String {
    match doc.get("text") {
        Some(Value::String(s)) => s.to_lowercase(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
        _ => String::new(),
    }
}

#[async_trait]
impl PrimaryStore for InMemoryPrimary {
    async fn match_text(&self, modality: Modality, query: &str, limit: usize) -> PrimaryOutcome {
        if let Some(offline) = self.begin() {
            return offline;
        }
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return PrimaryOutcome::Hits(Vec::new());
        }

        let mut scored: Vec<StoredHit> = self
            .docs
            .get(&modality)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|doc| {
                let text = text_of(doc);
                let matches = terms.iter().filter(|t| text.contains(*t)).count();
                (matches > 0).then(|| StoredHit::new(doc.clone(), Some(matches as f64)))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        PrimaryOutcome::Hits(scored)
    }

    async fn match_objects(&self, query: &ObjectQuery, limit: usize) -> PrimaryOutcome {
        if let Some(offline) = self.begin() {
            return offline;
        }
        let hits = self
            .docs
            .get(&Modality::Object)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter(|doc| {
                serde_json::from_value::<ObjectRecord>((*doc).clone())
                    .map(|record| query.matches(&record))
                    .unwrap_or(false)
            })
            .take(limit)
            .map(|doc| StoredHit::new(doc.clone(), Some(1.0)))
            .collect();
        PrimaryOutcome::Hits(hits)
    }
}

/// Fixed backup corpora.
#[derive(Default)]
pub struct InMemoryBackup {
    corpora: HashMap<Modality, Arc<BackupCorpus>>,
}

impl InMemoryBackup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, modality: Modality, records: Vec<Value>) -> Self {
        self.corpora.insert(
            modality,
            Arc::new(BackupCorpus::from_records(modality, records)),
        );
        self
    }
}

impl BackupProvider for InMemoryBackup {
    fn corpus(&self, modality: Modality) -> Arc<BackupCorpus> {
        self.corpora.get(&modality).cloned().unwrap_or_default()
    }
}

/// Fixed catalogs, frame listing and metadata.
#[derive(Default)]
pub struct StaticCatalogs {
    catalogs: Arc<Catalogs>,
    listing: Arc<FrameListing>,
    metadata: Arc<HashMap<String, VideoMetadata>>,
}

impl StaticCatalogs {
    pub fn new(
        catalogs: Catalogs,
        listing: FrameListing,
        metadata: impl IntoIterator<Item = VideoMetadata>,
    ) -> Self {
        Self {
            catalogs: Arc::new(catalogs),
            listing: Arc::new(listing),
            metadata: Arc::new(
                metadata
                    .into_iter()
                    .map(|m| (m.video_id.clone(), m))
                    .collect(),
            ),
        }
    }
}

impl CatalogProvider for StaticCatalogs {
    fn catalogs(&self) -> Arc<Catalogs> {
        self.catalogs.clone()
    }

    fn frame_listing(&self) -> Arc<FrameListing> {
        self.listing.clone()
    }

    fn video_metadata(&self) -> Arc<HashMap<String, VideoMetadata>> {
        self.metadata.clone()
    }
}

/// Vector search that returns a preset ranking for every query.
pub struct FixedVectorSearch {
    indices: Vec<usize>,
}

impl FixedVectorSearch {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }
}

#[async_trait]
impl VectorSearch for FixedVectorSearch {
    async fn search_text(&self, query: &str, k: usize) -> Result<Vec<usize>> {
        if query.trim().is_empty() {
            bail!("query must not be empty");
        }
        Ok(self.indices.iter().copied().take(k).collect())
    }

    async fn search_image(&self, image_ref: &str, k: usize) -> Result<Vec<usize>> {
        if image_ref.trim().is_empty() {
            bail!("image reference must not be empty");
        }
        Ok(self.indices.iter().copied().take(k).collect())
    }
}
