//! File-backed backup corpora.
//!
//! Each modality's snapshot is a JSON array read on first use and cached for
//! the life of the process. [`FileBackup::reload`] swaps in a fresh snapshot;
//! searches already holding the previous `Arc` keep reading it unchanged.
//!
//! A missing or malformed file yields an empty corpus and a warning. The
//! empty result is cached too, so a broken snapshot is reported once rather
//! than on every request.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use serde_json::Value;

use framefind_core::models::Modality;
use framefind_core::store::{BackupCorpus, BackupProvider};

use crate::config::BackupConfig;

pub struct FileBackup {
    paths: HashMap<Modality, PathBuf>,
    cache: RwLock<HashMap<Modality, Arc<BackupCorpus>>>,
}

impl FileBackup {
    pub fn new(config: &BackupConfig) -> Self {
        let paths = [
            (Modality::Ocr, config.ocr.clone()),
            (Modality::Asr, config.asr.clone()),
            (Modality::Object, config.object.clone()),
        ]
        .into_iter()
        .collect();
        Self {
            paths,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Re-read one modality's snapshot and replace the cached value.
    pub fn reload(&self, modality: Modality) -> Arc<BackupCorpus> {
        let corpus = Arc::new(self.load(modality));
        self.cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(modality, corpus.clone());
        corpus
    }

    fn load(&self, modality: Modality) -> BackupCorpus {
        let Some(path) = self.paths.get(&modality) else {
            return BackupCorpus::default();
        };
        match read_records(path) {
            Ok(records) => {
                let corpus = BackupCorpus::from_records(modality, records);
                tracing::info!(%modality, path = %path.display(), records = corpus.len(), "backup corpus loaded");
                corpus
            }
            Err(e) => {
                tracing::warn!(%modality, path = %path.display(), error = %format!("{:#}", e), "backup corpus unavailable; using empty corpus");
                BackupCorpus::default()
            }
        }
    }
}

impl BackupProvider for FileBackup {
    fn corpus(&self, modality: Modality) -> Arc<BackupCorpus> {
        if let Some(corpus) = self
            .cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&modality)
        {
            return corpus.clone();
        }

        let mut cache = self
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Another request may have loaded it while we waited for the lock.
        cache
            .entry(modality)
            .or_insert_with(|| Arc::new(self.load(modality)))
            .clone()
    }
}

/// Read a JSON array of records.
pub(crate) fn read_records(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    match value {
        Value::Array(records) => Ok(records),
        _ => anyhow::bail!("{} is not a JSON array", path.display()),
    }
}
