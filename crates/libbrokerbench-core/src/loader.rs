//! Manifest and batch file loading

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BenchError, Result};
use crate::types::{Batch, Payload};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Index of batch files in a data directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub total_transactions: u64,
    #[serde(default)]
    pub total_batches: u64,
    #[serde(default)]
    pub batch_size: u64,
    #[serde(default)]
    pub generated_at: String,
    /// Batch file names relative to the data directory, in send order
    pub files: Vec<String>,
}

impl Manifest {
    /// Read `<dir>/manifest.json`
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(BenchError::ManifestNotFound(data_dir.to_path_buf()));
        }
        let content = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(data_dir)?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(data_dir.join(MANIFEST_FILE), content)?;
        Ok(())
    }
}

/// Open the manifest in `data_dir` and return its batches lazily, in manifest
/// order.
///
/// Fails immediately if the manifest is missing or malformed. Batch files are
/// only read as the iterator advances; missing, unreadable and empty files are
/// skipped.
pub fn load_batches(data_dir: &Path) -> Result<impl Iterator<Item = Batch>> {
    let manifest = Manifest::load(data_dir)?;
    info!(
        transactions = manifest.total_transactions,
        batches = manifest.total_batches,
        files = manifest.files.len(),
        "Found manifest in {}",
        data_dir.display()
    );

    let dir = data_dir.to_path_buf();
    Ok(manifest
        .files
        .into_iter()
        .filter_map(move |file| read_batch(&dir.join(file))))
}

/// Load every usable batch up front
pub fn load_all(data_dir: &Path) -> Result<Vec<Batch>> {
    let batches: Vec<Batch> = load_batches(data_dir)?.collect();
    info!("Loaded {} batches", batches.len());
    Ok(batches)
}

fn read_batch(path: &Path) -> Option<Batch> {
    if !path.exists() {
        debug!("Skipping missing batch file {}", path.display());
        return None;
    }

    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read batch file {}: {}", path.display(), e);
            return None;
        }
    };

    let payloads: Vec<Payload> = match serde_json::from_slice(&content) {
        Ok(payloads) => payloads,
        Err(e) => {
            warn!("Failed to parse batch file {}: {}", path.display(), e);
            return None;
        }
    };

    let batch = Batch::new(payloads);
    if batch.is_none() {
        debug!("Skipping empty batch file {}", path.display());
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn payload_json(id: &str) -> String {
        format!(
            r#"{{"transactionId": "{}", "timestamp": "2024-01-01T00:00:00.000000", "amount": 1.5}}"#,
            id
        )
    }

    fn write_batch(dir: &Path, name: &str, ids: &[&str]) {
        let body: Vec<String> = ids.iter().map(|id| payload_json(id)).collect();
        std::fs::write(dir.join(name), format!("[{}]", body.join(","))).unwrap();
    }

    fn write_manifest(dir: &Path, files: &[&str]) {
        Manifest {
            files: files.iter().map(|f| f.to_string()).collect(),
            ..Manifest::default()
        }
        .save(dir)
        .unwrap();
    }

    #[test]
    fn test_missing_manifest_fails_fast() {
        let dir = tempdir().unwrap();
        let err = load_batches(dir.path()).err().unwrap();
        assert!(matches!(err, BenchError::ManifestNotFound(_)));
    }

    #[test]
    fn test_malformed_manifest_fails_fast() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{not json").unwrap();
        assert!(matches!(load_batches(dir.path()).err().unwrap(), BenchError::Json(_)));
    }

    #[test]
    fn test_loads_batches_in_manifest_order() {
        let dir = tempdir().unwrap();
        write_batch(dir.path(), "b1.json", &["a1", "a2", "a3"]);
        write_batch(dir.path(), "b2.json", &["b1", "b2", "b3"]);
        write_manifest(dir.path(), &["b2.json", "b1.json"]);

        let batches = load_all(dir.path()).unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 3));
        assert_eq!(batches[0].payloads()[0].id(), "b1");
        assert_eq!(batches[1].payloads()[2].id(), "a3");
    }

    #[test]
    fn test_skips_missing_corrupt_and_empty_files() {
        let dir = tempdir().unwrap();
        write_batch(dir.path(), "good.json", &["g1", "g2"]);
        std::fs::write(dir.path().join("corrupt.json"), "[{\"transactionId\": 1").unwrap();
        std::fs::write(dir.path().join("empty.json"), "[]").unwrap();
        write_manifest(
            dir.path(),
            &["missing.json", "corrupt.json", "good.json", "empty.json"],
        );

        let batches = load_all(dir.path()).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn test_batches_are_read_lazily() {
        let dir = tempdir().unwrap();
        write_batch(dir.path(), "b1.json", &["x"]);
        write_manifest(dir.path(), &["b1.json", "b2.json"]);

        let mut iter = load_batches(dir.path()).unwrap();
        // b2.json appears after the manifest was opened
        write_batch(dir.path(), "b2.json", &["y"]);

        assert_eq!(iter.next().unwrap().payloads()[0].id(), "x");
        assert_eq!(iter.next().unwrap().payloads()[0].id(), "y");
        assert!(iter.next().is_none());
    }
}
