//! File-backed catalogs, frame listing, and per-video metadata.
//!
//! All inputs are loaded together into one snapshot. Any file that is missing
//! or malformed contributes an empty table and a warning; path resolution
//! then leaves the affected fields null instead of failing the search.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use walkdir::WalkDir;

use framefind_core::align::FrameListing;
use framefind_core::models::{FrameRecord, VideoMetadata};
use framefind_core::resolve::{parse_fps_catalog, parse_id_catalog, Catalogs};
use framefind_core::store::CatalogProvider;

use crate::config::CatalogConfig;

#[derive(Default)]
struct Snapshot {
    catalogs: Arc<Catalogs>,
    listing: Arc<FrameListing>,
    metadata: Arc<HashMap<String, VideoMetadata>>,
}

pub struct FileCatalogs {
    config: CatalogConfig,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl FileCatalogs {
    /// Load every catalog file named in `config`.
    pub fn load(config: &CatalogConfig) -> Self {
        Self {
            config: config.clone(),
            snapshot: RwLock::new(Arc::new(read_snapshot(config))),
        }
    }

    /// Re-read all catalog files and replace the current snapshot.
    pub fn reload(&self) {
        let fresh = Arc::new(read_snapshot(&self.config));
        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = fresh;
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl CatalogProvider for FileCatalogs {
    fn catalogs(&self) -> Arc<Catalogs> {
        self.current().catalogs.clone()
    }

    fn frame_listing(&self) -> Arc<FrameListing> {
        self.current().listing.clone()
    }

    fn video_metadata(&self) -> Arc<HashMap<String, VideoMetadata>> {
        self.current().metadata.clone()
    }
}

fn read_snapshot(config: &CatalogConfig) -> Snapshot {
    let catalogs = Catalogs {
        images: parse_id_catalog(&read_json(&config.images)),
        videos: parse_id_catalog(&read_json(&config.videos)),
        fps: parse_fps_catalog(&read_json(&config.fps)),
    };
    let listing = parse_frame_listing(&read_json(&config.id_map));
    let metadata = load_metadata_dir(&config.metadata_dir);

    tracing::info!(
        images = catalogs.images.len(),
        videos = catalogs.videos.len(),
        fps = catalogs.fps.len(),
        frames = listing.len(),
        metadata = metadata.len(),
        "catalogs loaded"
    );

    Snapshot {
        catalogs: Arc::new(catalogs),
        listing: Arc::new(listing),
        metadata: Arc::new(metadata),
    }
}

/// Read a JSON file, or `Null` (with a warning) when it cannot be read.
fn read_json(path: &Path) -> Value {
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));
    match parsed {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "catalog file unavailable; using empty table");
            Value::Null
        }
    }
}

/// Build the frame listing from the id map.
///
/// Accepts a JSON array (index = position) or an object keyed by decimal
/// index. Entries that do not decode as frame records are skipped without
/// shifting the indices of the others.
pub fn parse_frame_listing(value: &Value) -> FrameListing {
    let entries: Vec<(usize, &Value)> = match value {
        Value::Array(items) => items.iter().enumerate().collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(key, item)| key.trim().parse::<usize>().ok().map(|idx| (idx, item)))
            .collect(),
        _ => Vec::new(),
    };

    let total = entries.len();
    let listing = FrameListing::new(entries.into_iter().filter_map(|(idx, item)| {
        serde_json::from_value::<FrameRecord>(item.clone())
            .ok()
            .map(|record| (idx, record))
    }));
    if listing.len() < total {
        tracing::warn!(
            kept = listing.len(),
            skipped = total - listing.len(),
            "id map contained undecodable entries"
        );
    }
    listing
}

/// Load `<video_id>.json` metadata records from `dir`, recursively.
///
/// Records without a parsable `publish_date` are skipped.
pub fn load_metadata_dir(dir: &Path) -> HashMap<String, VideoMetadata> {
    if !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "metadata directory not found; date filters will exclude every hit");
        return HashMap::new();
    }

    let mut out = HashMap::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(video_id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match VideoMetadata::from_record(video_id, &read_json(path)) {
            Some(meta) => {
                out.insert(meta.video_id.clone(), meta);
            }
            None => tracing::debug!(path = %path.display(), "metadata record has no valid publish_date"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_listing_from_array_keeps_positions() {
        let listing = parse_frame_listing(&json!([
            {"video_id": "V1", "frame_id": 0},
            {"bogus": true},
            {"video_id": "V1", "frame_id": "000125"}
        ]));
        assert_eq!(listing.len(), 2);
        assert!(listing.get(1).is_none());
        assert_eq!(listing.get(2).unwrap().frame_id, 125);
    }

    #[test]
    fn test_listing_from_index_keyed_object() {
        let listing = parse_frame_listing(&json!({
            "0": {"video_id": "V1", "frame_id": 5},
            "17": {"video_name": "V2", "frame_id": 9},
            "x": {"video_id": "V3", "frame_id": 1}
        }));
        assert_eq!(listing.len(), 2);
        assert_eq!(listing.get(17).unwrap().video_id, "V2");
    }

    #[test]
    fn test_metadata_dir_is_walked() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("L01");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("L01_V001.json"), r#"{"publish_date": "15/03/2022", "title": "x"}"#).unwrap();
        fs::write(tmp.path().join("L01_V002.json"), r#"{"publish_date": "March 2022"}"#).unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let meta = load_metadata_dir(tmp.path());
        assert_eq!(meta.len(), 1);
        assert_eq!(
            meta["L01_V001"].publish_date,
            NaiveDate::from_ymd_opt(2022, 3, 15).unwrap()
        );
    }

    #[test]
    fn test_missing_files_yield_empty_snapshot() {
        let tmp = TempDir::new().unwrap();
        let config = CatalogConfig {
            images: tmp.path().join("none.json"),
            videos: tmp.path().join("none.json"),
            fps: tmp.path().join("none.json"),
            id_map: tmp.path().join("none.json"),
            metadata_dir: tmp.path().join("none"),
            ..CatalogConfig::default()
        };
        let catalogs = FileCatalogs::load(&config);
        assert!(catalogs.catalogs().images.is_empty());
        assert!(catalogs.frame_listing().is_empty());
        assert!(catalogs.video_metadata().is_empty());
    }

    #[test]
    fn test_reload_picks_up_new_files() {
        let tmp = TempDir::new().unwrap();
        let config = CatalogConfig {
            images: tmp.path().join("images.json"),
            videos: tmp.path().join("videos.json"),
            fps: tmp.path().join("fps.json"),
            id_map: tmp.path().join("id_map.json"),
            metadata_dir: tmp.path().join("meta"),
            ..CatalogConfig::default()
        };
        let catalogs = FileCatalogs::load(&config);
        let before = catalogs.catalogs();
        assert!(before.videos.is_empty());

        fs::write(&config.videos, r#"[{"title": "V1.mp4", "id": "abc"}]"#).unwrap();
        catalogs.reload();
        assert_eq!(catalogs.catalogs().videos["V1.mp4"], "abc");
        assert!(before.videos.is_empty());
    }
}
