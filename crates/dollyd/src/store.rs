//! Registry persistence - full-snapshot load/save of the clone set.
//!
//! Every save writes the entire registry, not a delta. Concurrent savers
//! are serialized by the store; the last writer wins. That consistency
//! model is a known limitation of the snapshot format.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dolly_common::CloneRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::{create_dir_all, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Persistence seam for the clone registry
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn load(&self) -> Result<Vec<CloneRecord>>;
    async fn save(&self, records: &[CloneRecord]) -> Result<()>;
}

/// On-disk registry file format
#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    clones: Vec<CloneRecord>,
}

/// Pretty-printed JSON file store
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl RegistryStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<CloneRecord>> {
        if !self.path.exists() {
            info!("No registry file at {}, starting empty", self.path.display());
            return Ok(Vec::new());
        }

        let mut file = tokio::fs::File::open(&self.path)
            .await
            .context("Failed to open registry file")?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .await
            .context("Failed to read registry file")?;

        let registry: RegistryFile =
            serde_json::from_str(&contents).context("Failed to parse registry JSON")?;

        info!("Loaded {} clones from {}", registry.clones.len(), self.path.display());
        Ok(registry.clones)
    }

    async fn save(&self, records: &[CloneRecord]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(dir) = self.path.parent() {
            create_dir_all(dir)
                .await
                .context("Failed to create state directory")?;
        }

        let file_contents = RegistryFile {
            clones: records.to_vec(),
        };
        let json =
            serde_json::to_string_pretty(&file_contents).context("Failed to serialize registry")?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .await
            .context("Failed to open registry file for writing")?;

        file.write_all(json.as_bytes())
            .await
            .context("Failed to write registry file")?;

        file.sync_all().await.context("Failed to sync registry file")?;

        debug!("Saved {} clones to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    records: tokio::sync::Mutex<Vec<CloneRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn load(&self) -> Result<Vec<CloneRecord>> {
        Ok(self.records.lock().await.clone())
    }

    async fn save(&self, records: &[CloneRecord]) -> Result<()> {
        *self.records.lock().await = records.to_vec();
        Ok(())
    }
}
