//! Elasticsearch-compatible primary store.
//!
//! Talks to `POST /{index}/_search` over HTTP. Every failure mode (transport
//! error, timeout, non-2xx status, unparsable body) becomes
//! [`PrimaryOutcome::Unavailable`]; the search client treats that the same
//! as an empty result and moves on to the backup corpus.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use framefind_core::models::{CountOperator, Modality, ObjectQuery};
use framefind_core::store::{PrimaryOutcome, PrimaryStore, StoredHit};

use crate::config::PrimaryConfig;

pub struct ElasticStore {
    client: reqwest::Client,
    base_url: String,
    ocr_index: String,
    asr_index: String,
    object_index: String,
    text_field: String,
}

impl ElasticStore {
    pub fn new(config: &PrimaryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build primary store HTTP client")?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            ocr_index: config.ocr_index.clone(),
            asr_index: config.asr_index.clone(),
            object_index: config.object_index.clone(),
            text_field: config.text_field.clone(),
        })
    }

    fn index_for(&self, modality: Modality) -> Option<&str> {
        match modality {
            Modality::Ocr => Some(&self.ocr_index),
            Modality::Asr => Some(&self.asr_index),
            Modality::Object => Some(&self.object_index),
            Modality::Clip | Modality::Image => None,
        }
    }

    async fn run(&self, modality: Modality, body: &Value) -> PrimaryOutcome {
        let Some(index) = self.index_for(modality) else {
            return PrimaryOutcome::Unavailable(format!("no primary index for {}", modality));
        };
        match self.post_search(index, body).await {
            Ok(hits) => {
                tracing::debug!(%modality, index, hits = hits.len(), "primary store answered");
                PrimaryOutcome::Hits(hits)
            }
            Err(e) => PrimaryOutcome::Unavailable(format!("{:#}", e)),
        }
    }

    async fn post_search(&self, index: &str, body: &Value) -> Result<Vec<StoredHit>> {
        let url = format!("{}/{}/_search", self.base_url, index);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("primary store error {}: {}", status, body_text);
        }

        let json: Value = response
            .json()
            .await
            .context("primary store returned an unparsable body")?;
        parse_hits(&json)
    }
}

#[async_trait]
impl PrimaryStore for ElasticStore {
    async fn match_text(&self, modality: Modality, query: &str, limit: usize) -> PrimaryOutcome {
        let body = text_query(&self.text_field, query, limit);
        self.run(modality, &body).await
    }

    async fn match_objects(&self, query: &ObjectQuery, limit: usize) -> PrimaryOutcome {
        let Some(body) = object_query(query, limit) else {
            return PrimaryOutcome::Hits(Vec::new());
        };
        self.run(Modality::Object, &body).await
    }
}

/// Full-text match body.
pub fn text_query(field: &str, query: &str, limit: usize) -> Value {
    json!({
        "query": { "match": { field: query } },
        "size": limit,
    })
}

/// Label equality AND count comparison AND, when restricted, membership of
/// one of the allowed `(video, frame)` pairs. `None` when the operator is
/// unrecognized.
pub fn object_query(query: &ObjectQuery, limit: usize) -> Option<Value> {
    let op = query.operator?;
    let count_field = format!("label_counts.{}", query.label);
    let range = match op {
        CountOperator::Eq => json!({ "gte": query.value, "lte": query.value }),
        other => json!({ other.as_str(): query.value }),
    };

    let mut must = vec![
        json!({ "term": { "labels.keyword": query.label } }),
        json!({ "range": { count_field: range } }),
    ];

    if let Some(allowed) = &query.restrict_to {
        let mut pairs: Vec<_> = allowed.iter().collect();
        pairs.sort_unstable();
        let should: Vec<Value> = pairs
            .into_iter()
            .map(|loc| {
                json!({ "bool": { "must": [
                    { "term": { "video_id": loc.video_id } },
                    { "term": { "frame_id": loc.frame_id } },
                ] } })
            })
            .collect();
        must.push(json!({ "bool": { "should": should, "minimum_should_match": 1 } }));
    }

    Some(json!({
        "query": { "bool": { "must": must } },
        "size": limit,
    }))
}

/// Extract `hits.hits[]._source` and `_score`.
pub fn parse_hits(json: &Value) -> Result<Vec<StoredHit>> {
    let hits = json
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(|h| h.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid search response: missing hits.hits array"))?;

    Ok(hits
        .iter()
        .filter_map(|hit| {
            let source = hit.get("_source")?.clone();
            let score = hit.get("_score").and_then(Value::as_f64);
            Some(StoredHit::new(source, score))
        })
        .collect())
}
