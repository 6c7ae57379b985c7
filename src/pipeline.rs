//! Request orchestration.
//!
//! A [`SearchRequest`] carries up to one query per modality. [`SearchEngine`]
//! validates the date filter first, then runs the modalities concurrently
//! (`tokio::join!`): visual search for `clip` and `image` on the current task,
//! and a [`ModalitySearchClient`] call on the blocking pool for each of `ocr`,
//! `asr` and `object`, since a backup scan is CPU-bound.
//!
//! With `object_as_filter` set, the object search waits for `clip` and is
//! restricted to the frames it surfaced. The publish-date filter then runs
//! over every key and the per-modality results are fused.
//!
//! Text and object modalities never fail a request; their degradation is
//! handled by the backup corpus. A visual backend failure, or a malformed
//! date, fails the whole request.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use framefind_core::filter::{by_publish_date, locators_of, DateFilter};
use framefind_core::fusion::{fuse, FusedResponse};
use framefind_core::models::{Modality, ObjectQuery, ResolvedHit, DEFAULT_COUNT, DEFAULT_OPERATOR};
use framefind_core::resolve::PathResolver;
use framefind_core::search::{ModalityQuery, ModalitySearchClient, SearchSettings};
use framefind_core::store::{BackupProvider, CatalogProvider, PrimaryStore, VectorSearch};

use crate::backup::FileBackup;
use crate::catalog::FileCatalogs;
use crate::config::Config;
use crate::elastic::ElasticStore;
use crate::vector::{create_vector_search, frames_for_indices};

/// One combined search. Empty or whitespace-only queries count as absent.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub clip: Option<String>,
    #[serde(default)]
    pub ocr: Option<String>,
    #[serde(default)]
    pub asr: Option<String>,
    /// Object label.
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Count operator for `object`: `lt`, `lte`, `gt`, `gte` or `eq`.
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default = "default_value")]
    pub value: i64,
    #[serde(default)]
    pub publish_day: Option<u32>,
    #[serde(default)]
    pub publish_month: Option<u32>,
    #[serde(default)]
    pub publish_year: Option<i32>,
    #[serde(default)]
    pub object_as_filter: bool,
    /// Answer `ocr`, `asr` and `object` from the backup corpora only.
    #[serde(default)]
    pub backup_only: bool,
}

fn default_operator() -> String {
    DEFAULT_OPERATOR.to_string()
}

fn default_value() -> i64 {
    DEFAULT_COUNT
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            clip: None,
            ocr: None,
            asr: None,
            object: None,
            image_url: None,
            operator: default_operator(),
            value: default_value(),
            publish_day: None,
            publish_month: None,
            publish_year: None,
            object_as_filter: false,
            backup_only: false,
        }
    }
}

fn active(query: &Option<String>) -> Option<&str> {
    query.as_deref().map(str::trim).filter(|q| !q.is_empty())
}

/// Shared, request-independent collaborators. Cloning shares them.
#[derive(Clone)]
pub struct SearchEngine {
    primary: Arc<dyn PrimaryStore>,
    backup: Arc<dyn BackupProvider>,
    catalogs: Arc<dyn CatalogProvider>,
    vector: Arc<dyn VectorSearch>,
    resolver: PathResolver,
    settings: SearchSettings,
    clip_top_k: usize,
}

impl SearchEngine {
    pub fn new(
        primary: Arc<dyn PrimaryStore>,
        backup: Arc<dyn BackupProvider>,
        catalogs: Arc<dyn CatalogProvider>,
        vector: Arc<dyn VectorSearch>,
    ) -> Self {
        Self {
            primary,
            backup,
            catalogs,
            vector,
            resolver: PathResolver::default(),
            settings: SearchSettings::default(),
            clip_top_k: 300,
        }
    }

    pub fn with_resolver(mut self, resolver: PathResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_settings(mut self, settings: SearchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clip_top_k(mut self, k: usize) -> Self {
        self.clip_top_k = k;
        self
    }

    /// Wire up the Elasticsearch store, file-backed backup corpora and
    /// catalogs, and the configured vector backend.
    pub fn from_config(config: &Config) -> Result<Self> {
        let primary = ElasticStore::new(&config.primary)?;
        let backup = FileBackup::new(&config.backup);
        let catalogs = FileCatalogs::load(&config.catalog);
        let vector: Arc<dyn VectorSearch> = Arc::from(create_vector_search(&config.vector)?);
        let resolver = PathResolver::new(
            config.catalog.image_url_template.clone(),
            config.catalog.video_url_template.clone(),
        );

        Ok(Self::new(Arc::new(primary), Arc::new(backup), Arc::new(catalogs), vector)
            .with_resolver(resolver)
            .with_settings(config.retrieval.search_settings())
            .with_clip_top_k(config.retrieval.clip_top_k))
    }

    fn client(&self) -> ModalitySearchClient<'_> {
        ModalitySearchClient::new(
            self.primary.as_ref(),
            self.backup.as_ref(),
            self.catalogs.as_ref(),
            &self.resolver,
            self.settings.clone(),
        )
    }

    /// Run every requested modality and fuse the results.
    pub async fn search(&self, request: &SearchRequest) -> Result<FusedResponse> {
        let date_filter = DateFilter::new(
            request.publish_day,
            request.publish_month,
            request.publish_year,
        )?;

        let backup_only = request.backup_only;
        let object_query = active(&request.object)
            .map(|label| ObjectQuery::new(label, &request.operator, request.value));
        let text = |query: &Option<String>| active(query).map(|q| ModalityQuery::Text(q.to_string()));

        let clip = self.visual(Modality::Clip, active(&request.clip));
        let image = self.visual(Modality::Image, active(&request.image_url));
        let ocr = self.run_modality(Modality::Ocr, text(&request.ocr), backup_only);
        let asr = self.run_modality(Modality::Asr, text(&request.asr), backup_only);

        let (clip, image, ocr, asr, object) = if request.object_as_filter {
            let (clip, image, ocr, asr) = tokio::join!(clip, image, ocr, asr);
            let clip = clip?;
            let object = match object_query {
                Some(query) if !clip.is_empty() => {
                    let query = query.restricted_to(locators_of(&clip));
                    self.run_modality(Modality::Object, Some(ModalityQuery::Object(query)), backup_only)
                        .await
                }
                Some(_) => {
                    tracing::debug!("object filter requested without visual hits; object results empty");
                    Vec::new()
                }
                None => Vec::new(),
            };
            (clip, image, ocr, asr, object)
        } else {
            let object = self.run_modality(
                Modality::Object,
                object_query.map(ModalityQuery::Object),
                backup_only,
            );
            let (clip, image, ocr, asr, object) = tokio::join!(clip, image, ocr, asr, object);
            (clip?, image, ocr, asr, object)
        };
        let image = image?;

        let mut fused = fuse([
            (Modality::Clip, clip),
            (Modality::Ocr, ocr),
            (Modality::Object, object),
            (Modality::Asr, asr),
            (Modality::Image, image),
        ]);

        if !date_filter.is_empty() {
            let metadata = self.catalogs.video_metadata();
            fused = fused.map_each(|modality, hits| {
                by_publish_date(hits, modality, &date_filter, &metadata)
            });
        }

        tracing::info!(
            clip = fused.clip.len(),
            ocr = fused.ocr.len(),
            object = fused.object.len(),
            asr = fused.asr.len(),
            image = fused.image.len(),
            "search completed"
        );
        Ok(fused)
    }

    /// Image→vector search on its own. An empty result is returned as such;
    /// callers decide whether that is "not found".
    pub async fn similar_images(&self, image_ref: &str) -> Result<Vec<ResolvedHit>> {
        let image_ref = image_ref.trim();
        if image_ref.is_empty() {
            anyhow::bail!("image_path must not be empty");
        }
        self.visual(Modality::Image, Some(image_ref)).await
    }

    /// One text or object modality, on the blocking pool. A failed task
    /// yields no hits for that modality only.
    async fn run_modality(
        &self,
        modality: Modality,
        query: Option<ModalityQuery>,
        backup_only: bool,
    ) -> Vec<ResolvedHit> {
        let Some(query) = query else {
            return Vec::new();
        };
        let engine = self.clone();
        let handle = tokio::runtime::Handle::current();
        let task = tokio::task::spawn_blocking(move || {
            let client = engine.client();
            if backup_only {
                client.search_backup(modality, &query, None)
            } else {
                handle.block_on(client.search(modality, &query, None))
            }
        });

        match task.await {
            Ok(results) => {
                tracing::debug!(
                    %modality,
                    provenance = %results.provenance,
                    hits = results.hits.len(),
                    "modality search finished"
                );
                results.hits
            }
            Err(e) => {
                tracing::error!(%modality, error = %e, "modality search task failed");
                Vec::new()
            }
        }
    }

    async fn visual(&self, modality: Modality, query: Option<&str>) -> Result<Vec<ResolvedHit>> {
        let Some(query) = query else {
            return Ok(Vec::new());
        };
        let indices = match modality {
            Modality::Image => self.vector.search_image(query, self.clip_top_k).await,
            _ => self.vector.search_text(query, self.clip_top_k).await,
        }
        .with_context(|| format!("{} search failed", modality))?;

        let listing = self.catalogs.frame_listing();
        let catalogs = self.catalogs.catalogs();
        Ok(frames_for_indices(&indices, &listing)
            .into_iter()
            .filter_map(|hit| self.resolver.resolve_hit(hit, None, &catalogs))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use framefind_core::align::FrameListing;
    use framefind_core::filter::FilterError;
    use framefind_core::models::{FrameLocator, FrameRecord, VideoMetadata};
    use framefind_core::resolve::Catalogs;
    use framefind_core::store::memory::{
        FixedVectorSearch, InMemoryBackup, InMemoryPrimary, StaticCatalogs,
    };
    use crate::vector::DisabledVectorSearch;
    use serde_json::{json, Map};

    fn frame(video: &str, frame_id: u64) -> FrameRecord {
        FrameRecord {
            video_id: video.to_string(),
            frame_id,
            video_folder: None,
            extra: Map::new(),
        }
    }

    fn catalogs() -> StaticCatalogs {
        let listing = FrameListing::from_ordered(vec![frame("V1", 10), frame("V1", 25), frame("V2", 40)]);
        let metadata = vec![VideoMetadata {
            video_id: "V1".to_string(),
            publish_date: NaiveDate::from_ymd_opt(2022, 3, 15).unwrap(),
        }];
        StaticCatalogs::new(Catalogs::default(), listing, metadata)
    }

    fn objects() -> Vec<serde_json::Value> {
        vec![
            json!({"video_id": "V1", "frame_id": 10, "labels": ["car"], "label_counts": {"car": 2}}),
            json!({"video_id": "V1", "frame_id": 20, "labels": ["car"], "label_counts": {"car": 2}}),
            json!({"video_id": "V2", "frame_id": 40, "labels": ["car"], "label_counts": {"car": 2}}),
        ]
    }

    fn engine(primary: InMemoryPrimary, vector: Arc<dyn VectorSearch>) -> SearchEngine {
        let backup = InMemoryBackup::new().with_records(Modality::Object, objects()).with_records(
            Modality::Ocr,
            vec![json!({"video_id": "V2", "frame_id": 40, "text": "election results"})],
        );
        SearchEngine::new(Arc::new(primary), Arc::new(backup), Arc::new(catalogs()), vector)
    }

    fn frames(hits: &[ResolvedHit]) -> Vec<FrameLocator> {
        hits.iter().filter_map(|h| h.locator()).collect()
    }

    #[tokio::test]
    async fn test_empty_request_yields_all_keys_empty() {
        let engine = engine(InMemoryPrimary::new(), Arc::new(DisabledVectorSearch));
        let fused = engine.search(&SearchRequest::default()).await.unwrap();
        assert_eq!(fused.total(), 0);
    }

    #[tokio::test]
    async fn test_modalities_are_fused_independently() {
        let primary = InMemoryPrimary::new();
        primary.set_available(false);
        let engine = engine(primary, Arc::new(FixedVectorSearch::new(vec![1, 0])));
        let request = SearchRequest {
            clip: Some("a red car".into()),
            ocr: Some("election".into()),
            object: Some("car".into()),
            ..SearchRequest::default()
        };
        let fused = engine.search(&request).await.unwrap();
        assert_eq!(
            frames(&fused.clip),
            vec![FrameLocator::new("V1", 25), FrameLocator::new("V1", 10)]
        );
        assert_eq!(frames(&fused.ocr), vec![FrameLocator::new("V2", 40)]);
        assert_eq!(fused.object.len(), 3);
        assert!(fused.asr.is_empty());
        assert!(fused.image.is_empty());
    }

    #[tokio::test]
    async fn test_object_as_filter_restricts_to_clip_frames() {
        let engine = engine(InMemoryPrimary::new(), Arc::new(FixedVectorSearch::new(vec![0, 2])));
        let request = SearchRequest {
            clip: Some("street".into()),
            object: Some("car".into()),
            object_as_filter: true,
            ..SearchRequest::default()
        };
        let fused = engine.search(&request).await.unwrap();
        assert_eq!(
            frames(&fused.object),
            vec![FrameLocator::new("V1", 10), FrameLocator::new("V2", 40)]
        );
        assert_eq!(fused.clip.len(), 2);
    }

    #[tokio::test]
    async fn test_object_as_filter_without_clip_is_empty() {
        let engine = engine(InMemoryPrimary::new(), Arc::new(DisabledVectorSearch));
        let request = SearchRequest {
            object: Some("car".into()),
            object_as_filter: true,
            ..SearchRequest::default()
        };
        let fused = engine.search(&request).await.unwrap();
        assert!(fused.object.is_empty());
    }

    #[tokio::test]
    async fn test_date_filter_applies_to_every_key() {
        let engine = engine(InMemoryPrimary::new(), Arc::new(FixedVectorSearch::new(vec![0, 2])));
        let request = SearchRequest {
            clip: Some("street".into()),
            object: Some("car".into()),
            publish_year: Some(2022),
            ..SearchRequest::default()
        };
        let fused = engine.search(&request).await.unwrap();
        assert_eq!(frames(&fused.clip), vec![FrameLocator::new("V1", 10)]);
        assert!(fused.object.iter().all(|h| h.video_id() == "V1"));
        assert_eq!(fused.object.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_date_fails_before_searching() {
        let primary = Arc::new(InMemoryPrimary::new());
        let engine = SearchEngine::new(
            primary.clone(),
            Arc::new(InMemoryBackup::new()),
            Arc::new(catalogs()),
            Arc::new(DisabledVectorSearch),
        );
        let request = SearchRequest {
            ocr: Some("news".into()),
            publish_day: Some(31),
            publish_month: Some(2),
            ..SearchRequest::default()
        };
        let err = engine.search(&request).await.unwrap_err();
        assert!(err.downcast_ref::<FilterError>().is_some());
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_visual_failure_fails_request() {
        let engine = engine(InMemoryPrimary::new(), Arc::new(DisabledVectorSearch));
        let request = SearchRequest {
            clip: Some("anything".into()),
            ..SearchRequest::default()
        };
        assert!(engine.search(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_similar_images_maps_indices() {
        let engine = engine(InMemoryPrimary::new(), Arc::new(FixedVectorSearch::new(vec![2, 9])));
        let hits = engine.similar_images("https://example.org/q.jpg").await.unwrap();
        assert_eq!(frames(&hits), vec![FrameLocator::new("V2", 40)]);
        assert!(engine.similar_images("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_backup_only_never_calls_primary() {
        let primary = Arc::new(
            InMemoryPrimary::new().with_docs(Modality::Object, vec![objects()[0].clone()]),
        );
        let backup = InMemoryBackup::new().with_records(Modality::Object, objects());
        let engine = SearchEngine::new(
            primary.clone(),
            Arc::new(backup),
            Arc::new(catalogs()),
            Arc::new(DisabledVectorSearch),
        );
        let request = SearchRequest {
            object: Some("car".into()),
            backup_only: true,
            ..SearchRequest::default()
        };
        let fused = engine.search(&request).await.unwrap();
        assert_eq!(fused.object.len(), 3);
        assert_eq!(primary.calls(), 0);

        let request = SearchRequest {
            backup_only: false,
            ..request
        };
        let fused = engine.search(&request).await.unwrap();
        assert_eq!(fused.object.len(), 1);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_modalities_run_off_the_async_worker() {
        let primary = InMemoryPrimary::new();
        primary.set_available(false);
        let engine = engine(primary, Arc::new(DisabledVectorSearch));
        let request = SearchRequest {
            ocr: Some("election".into()),
            object: Some("car".into()),
            ..SearchRequest::default()
        };
        let fused = engine.search(&request).await.unwrap();
        assert_eq!(frames(&fused.ocr), vec![FrameLocator::new("V2", 40)]);
        assert_eq!(fused.object.len(), 3);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: SearchRequest = serde_json::from_value(json!({"object": "dog"})).unwrap();
        assert_eq!(request.operator, "gte");
        assert_eq!(request.value, 1);
        assert!(!request.object_as_filter);
        assert!(!request.backup_only);
        assert_eq!(active(&Some("  ".into())), None);
    }
}
