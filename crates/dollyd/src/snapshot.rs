//! Network fact sources for the scan scheduler.
//!
//! The detector never fetches facts itself; scan workers pull them from a
//! source implementing this seam.

use anyhow::{Context, Result};
use dolly_common::{Connection, Device, NetworkSnapshot};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

/// Supplier of the current device/connection facts and the log stream
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> Result<NetworkSnapshot>;
    fn log_lines(&self) -> Result<Vec<String>>;
}

/// On-disk facts file format: devices, connections and raw log lines
#[derive(Debug, Default, Deserialize)]
struct FactsFile {
    #[serde(default)]
    devices: Vec<Device>,
    #[serde(default)]
    connections: Vec<Connection>,
    #[serde(default)]
    log_lines: Vec<String>,
}

/// Source reading a JSON facts file on every call, so scans always see
/// the facts as currently written by whatever produces the file
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<FactsFile> {
        if !self.path.exists() {
            debug!("No facts file at {}, scanning empty network", self.path.display());
            return Ok(FactsFile::default());
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }
}

impl SnapshotSource for FileSnapshotSource {
    fn snapshot(&self) -> Result<NetworkSnapshot> {
        let facts = self.read()?;
        Ok(NetworkSnapshot {
            captured_at: None,
            devices: facts.devices,
            connections: facts.connections,
        })
    }

    fn log_lines(&self) -> Result<Vec<String>> {
        Ok(self.read()?.log_lines)
    }
}

/// Fixed in-memory source for tests and ephemeral runs
#[derive(Default)]
pub struct StaticSource {
    pub snapshot: NetworkSnapshot,
    pub log_lines: Vec<String>,
}

impl StaticSource {
    pub fn new(snapshot: NetworkSnapshot, log_lines: Vec<String>) -> Self {
        Self { snapshot, log_lines }
    }
}

impl SnapshotSource for StaticSource {
    fn snapshot(&self) -> Result<NetworkSnapshot> {
        Ok(self.snapshot.clone())
    }

    fn log_lines(&self) -> Result<Vec<String>> {
        Ok(self.log_lines.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_source_missing_file_is_empty() {
        let source = FileSnapshotSource::new("/nonexistent/network.json");
        assert!(source.snapshot().unwrap().devices.is_empty());
        assert!(source.log_lines().unwrap().is_empty());
    }

    #[test]
    fn test_file_source_reads_facts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.json");
        std::fs::write(
            &path,
            r#"{
                "devices": [{"id": "dev1", "name": "Router", "firmware_updated": false}],
                "log_lines": ["Failed password for root"]
            }"#,
        )
        .unwrap();

        let source = FileSnapshotSource::new(path);
        let snapshot = source.snapshot().unwrap();
        assert_eq!(snapshot.devices.len(), 1);
        assert!(!snapshot.devices[0].firmware_updated);
        assert_eq!(source.log_lines().unwrap().len(), 1);
    }

    #[test]
    fn test_file_source_surfaces_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.json");
        std::fs::write(&path, "{not json").unwrap();

        let source = FileSnapshotSource::new(path);
        assert!(source.snapshot().is_err());
    }
}
