//! Visual-semantic search backends.
//!
//! The embedding model lives outside this process. A backend only returns
//! ranked corpus indices; [`frames_for_indices`] turns them into frame
//! records through the id-map frame listing.
//!
//! | Provider | Behaviour |
//! |----------|-----------|
//! | `disabled` | Every call fails with a configuration error |
//! | `http` | `POST {endpoint}` with `{"query", "k"}` or `{"image_url", "k"}`, reads `{"indices": [...]}` |

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use framefind_core::align::FrameListing;
use framefind_core::models::RawHit;
use framefind_core::store::VectorSearch;

use crate::config::VectorConfig;

/// Build the backend named by `[vector].provider`.
pub fn create_vector_search(config: &VectorConfig) -> Result<Box<dyn VectorSearch>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledVectorSearch)),
        "http" => Ok(Box::new(HttpVectorSearch::new(config)?)),
        other => bail!("Unknown vector provider: {}", other),
    }
}

pub struct DisabledVectorSearch;

#[async_trait]
impl VectorSearch for DisabledVectorSearch {
    async fn search_text(&self, _query: &str, _k: usize) -> Result<Vec<usize>> {
        bail!("visual search is disabled; set [vector].provider in the config")
    }

    async fn search_image(&self, _image_ref: &str, _k: usize) -> Result<Vec<usize>> {
        bail!("visual search is disabled; set [vector].provider in the config")
    }
}

pub struct HttpVectorSearch {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct IndicesResponse {
    indices: Vec<usize>,
}

impl HttpVectorSearch {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("vector.endpoint required for http provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build vector search HTTP client")?;
        Ok(Self { client, endpoint })
    }

    async fn post(&self, body: Value) -> Result<Vec<usize>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("vector search request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("vector search error {}: {}", status, body_text);
        }

        let parsed: IndicesResponse = response
            .json()
            .await
            .context("Invalid vector search response: expected {\"indices\": [...]}")?;
        Ok(parsed.indices)
    }
}

#[async_trait]
impl VectorSearch for HttpVectorSearch {
    async fn search_text(&self, query: &str, k: usize) -> Result<Vec<usize>> {
        if query.trim().is_empty() {
            bail!("query must not be empty");
        }
        self.post(json!({ "query": query, "k": k })).await
    }

    async fn search_image(&self, image_ref: &str, k: usize) -> Result<Vec<usize>> {
        if image_ref.trim().is_empty() {
            bail!("image reference must not be empty");
        }
        self.post(json!({ "image_url": image_ref, "k": k })).await
    }
}

/// Map ranked corpus indices to frame hits, keeping rank order.
pub fn frames_for_indices(indices: &[usize], listing: &FrameListing) -> Vec<RawHit> {
    let mut missing = 0usize;
    let hits: Vec<RawHit> = indices
        .iter()
        .filter_map(|idx| match listing.get(*idx) {
            Some(record) => Some(RawHit::Frame(record.clone())),
            None => {
                missing += 1;
                None
            }
        })
        .collect();
    if missing > 0 {
        tracing::warn!(missing, "vector search returned indices absent from the id map");
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use framefind_core::models::{FrameLocator, FrameRecord};
    use serde_json::Map;

    fn frame(video: &str, frame_id: u64) -> FrameRecord {
        FrameRecord {
            video_id: video.to_string(),
            frame_id,
            video_folder: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_indices_map_in_rank_order() {
        let listing = FrameListing::from_ordered(vec![frame("V1", 0), frame("V1", 5), frame("V2", 9)]);
        let hits = frames_for_indices(&[2, 7, 0], &listing);
        let locators: Vec<FrameLocator> = hits.iter().filter_map(|h| h.locator()).collect();
        assert_eq!(locators, vec![FrameLocator::new("V2", 9), FrameLocator::new("V1", 0)]);
    }

    #[tokio::test]
    async fn test_disabled_backend_errors() {
        let backend = create_vector_search(&VectorConfig::default()).unwrap();
        assert!(backend.search_text("a dog", 10).await.is_err());
        assert!(backend.search_image("http://img", 10).await.is_err());
    }

    #[test]
    fn test_http_backend_requires_endpoint() {
        let config = VectorConfig {
            provider: "http".to_string(),
            endpoint: None,
            timeout_secs: 5,
        };
        assert!(create_vector_search(&config).is_err());
    }
}
