//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration that
//! runs entirely from the backup corpora in the working directory.
//! [`load_config`] parses and validates; invalid values fail with a message
//! naming the offending key.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use framefind_core::fuzzy::{FALLBACK_THRESHOLD, MANUAL_THRESHOLD};
use framefind_core::resolve::{
    DEFAULT_IMAGE_URL_TEMPLATE, DEFAULT_VIDEO_URL_TEMPLATE, ID_PLACEHOLDER,
};
use framefind_core::search::{SearchSettings, RESULT_CAP};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub primary: PrimaryConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Elasticsearch-compatible primary store.
#[derive(Debug, Deserialize, Clone)]
pub struct PrimaryConfig {
    #[serde(default = "default_primary_url")]
    pub url: String,
    #[serde(default = "default_primary_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_ocr_index")]
    pub ocr_index: String,
    #[serde(default = "default_asr_index")]
    pub asr_index: String,
    #[serde(default = "default_object_index")]
    pub object_index: String,
    #[serde(default = "default_text_field")]
    pub text_field: String,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            url: default_primary_url(),
            timeout_secs: default_primary_timeout(),
            ocr_index: default_ocr_index(),
            asr_index: default_asr_index(),
            object_index: default_object_index(),
            text_field: default_text_field(),
        }
    }
}

fn default_primary_url() -> String {
    "http://localhost:9200".to_string()
}
fn default_primary_timeout() -> u64 {
    5
}
fn default_ocr_index() -> String {
    "ocr".to_string()
}
fn default_asr_index() -> String {
    "asr".to_string()
}
fn default_object_index() -> String {
    "object_detection".to_string()
}
fn default_text_field() -> String {
    "text".to_string()
}

/// Snapshot files read when the primary store cannot answer.
#[derive(Debug, Deserialize, Clone)]
pub struct BackupConfig {
    #[serde(default = "default_backup_ocr")]
    pub ocr: PathBuf,
    #[serde(default = "default_backup_asr")]
    pub asr: PathBuf,
    #[serde(default = "default_backup_object")]
    pub object: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            ocr: default_backup_ocr(),
            asr: default_backup_asr(),
            object: default_backup_object(),
        }
    }
}

fn default_backup_ocr() -> PathBuf {
    PathBuf::from("data/backup/ocr.json")
}
fn default_backup_asr() -> PathBuf {
    PathBuf::from("data/backup/asr.json")
}
fn default_backup_object() -> PathBuf {
    PathBuf::from("data/backup/object_detection.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// `[{title, id}]` for frame images.
    #[serde(default = "default_images_catalog")]
    pub images: PathBuf,
    /// `[{title, id}]` for videos.
    #[serde(default = "default_videos_catalog")]
    pub videos: PathBuf,
    /// `[{title, fps}]` keyed by video file name.
    #[serde(default = "default_fps_catalog")]
    pub fps: PathBuf,
    /// Vector corpus index → frame record.
    #[serde(default = "default_id_map")]
    pub id_map: PathBuf,
    /// Directory of per-video metadata JSON files named `<video_id>.json`.
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,
    #[serde(default = "default_image_template")]
    pub image_url_template: String,
    #[serde(default = "default_video_template")]
    pub video_url_template: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            images: default_images_catalog(),
            videos: default_videos_catalog(),
            fps: default_fps_catalog(),
            id_map: default_id_map(),
            metadata_dir: default_metadata_dir(),
            image_url_template: default_image_template(),
            video_url_template: default_video_template(),
        }
    }
}

fn default_images_catalog() -> PathBuf {
    PathBuf::from("data/catalog/images.json")
}
fn default_videos_catalog() -> PathBuf {
    PathBuf::from("data/catalog/videos.json")
}
fn default_fps_catalog() -> PathBuf {
    PathBuf::from("data/catalog/fps.json")
}
fn default_id_map() -> PathBuf {
    PathBuf::from("data/catalog/id_map.json")
}
fn default_metadata_dir() -> PathBuf {
    PathBuf::from("data/metadata")
}
fn default_image_template() -> String {
    DEFAULT_IMAGE_URL_TEMPLATE.to_string()
}
fn default_video_template() -> String {
    DEFAULT_VIDEO_URL_TEMPLATE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_result_cap")]
    pub result_cap: usize,
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f64,
    /// Fuzzy threshold for backup-only searches.
    #[serde(default = "default_manual_threshold")]
    pub manual_threshold: f64,
    /// Neighbours requested from the vector backend for `clip` and `image`.
    #[serde(default = "default_clip_top_k")]
    pub clip_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            result_cap: default_result_cap(),
            fallback_threshold: default_fallback_threshold(),
            manual_threshold: default_manual_threshold(),
            clip_top_k: default_clip_top_k(),
        }
    }
}

impl RetrievalConfig {
    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            result_cap: self.result_cap,
            fallback_threshold: self.fallback_threshold,
            manual_threshold: self.manual_threshold,
        }
    }
}

fn default_result_cap() -> usize {
    RESULT_CAP
}
fn default_fallback_threshold() -> f64 {
    FALLBACK_THRESHOLD
}
fn default_manual_threshold() -> f64 {
    MANUAL_THRESHOLD
}
fn default_clip_top_k() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    #[serde(default = "default_vector_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_vector_timeout")]
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            endpoint: None,
            timeout_secs: default_vector_timeout(),
        }
    }
}

impl VectorConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_vector_provider() -> String {
    "disabled".to_string()
}
fn default_vector_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.result_cap < 1 {
        anyhow::bail!("retrieval.result_cap must be >= 1");
    }

    for (key, threshold) in [
        ("retrieval.fallback_threshold", config.retrieval.fallback_threshold),
        ("retrieval.manual_threshold", config.retrieval.manual_threshold),
    ] {
        if !(0.0..=100.0).contains(&threshold) {
            anyhow::bail!("{} must be in [0, 100]", key);
        }
    }

    if config.primary.timeout_secs == 0 {
        anyhow::bail!("primary.timeout_secs must be > 0");
    }

    for (key, template) in [
        ("catalog.image_url_template", &config.catalog.image_url_template),
        ("catalog.video_url_template", &config.catalog.video_url_template),
    ] {
        if !template.contains(ID_PLACEHOLDER) {
            anyhow::bail!("{} must contain the {} placeholder", key, ID_PLACEHOLDER);
        }
    }

    match config.vector.provider.as_str() {
        "disabled" => {}
        "http" => {
            if config.vector.endpoint.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("vector.endpoint must be specified when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown vector provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    Ok(())
}
