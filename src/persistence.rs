//! Series persistence.
//!
//! The whole series is one JSON document. Saves write a sibling temp file and
//! rename it over the target, so a crash leaves either the old or the new
//! document on disk.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use chain_price_sampler_types::{Observation, SeriesDocument};

/// Default series file.
pub const DEFAULT_SERIES_FILE: &str = "price_data.json";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("series file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("series file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to encode series: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable home of the series.
pub trait SeriesPersistence: Send {
    /// Load the stored series. A missing or unreadable document yields an
    /// empty series.
    fn load(&self) -> Vec<Observation>;

    /// Replace the stored series with `series`.
    fn save(&self, series: &[Observation]) -> Result<(), PersistenceError>;
}

/// [`SeriesPersistence`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read the document. `Ok(None)` when the file does not exist.
    pub fn read_document(&self) -> Result<Option<SeriesDocument>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let document: SeriesDocument =
            serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        if !document.is_aligned() {
            return Err(PersistenceError::Corrupt {
                path: self.path.clone(),
                reason: format!(
                    "column lengths differ: {} timestamps, {} blocks, {} prices",
                    document.timestamps.len(),
                    document.blocks.len(),
                    document.prices.len()
                ),
            });
        }

        Ok(Some(document))
    }

    /// Write `document` atomically.
    pub fn write_document(&self, document: &SeriesDocument) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(document)?;
        let tmp = self.temp_path();

        let io_err = |source| PersistenceError::Io {
            path: tmp.clone(),
            source,
        };
        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        // Contents must be on disk before the rename makes them visible.
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl SeriesPersistence for JsonFileStore {
    fn load(&self) -> Vec<Observation> {
        match self.read_document() {
            Ok(Some(document)) => {
                let observations = document.observations().unwrap_or_default();
                info!(
                    "Loaded {} data points from {}",
                    observations.len(),
                    self.path.display()
                );
                if let Some(updated) = document.last_updated_at() {
                    info!("Last updated: {}", updated.format("%Y-%m-%d %H:%M:%S UTC"));
                }
                observations
            }
            Ok(None) => {
                info!(
                    "No existing data file at {}, starting fresh",
                    self.path.display()
                );
                Vec::new()
            }
            Err(e) => {
                warn!("Error loading data file: {}, starting fresh", e);
                Vec::new()
            }
        }
    }

    fn save(&self, series: &[Observation]) -> Result<(), PersistenceError> {
        let now = chrono::Utc::now();
        let last_updated = now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1e6;
        self.write_document(&SeriesDocument::from_observations(series, last_updated))?;
        info!("Saved {} data points to {}", series.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> Vec<Observation> {
        vec![
            Observation::new(1_700_000_000, 10, 0.001),
            Observation::new(1_700_021_600, 20, 0.002),
        ]
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("series.json"));

        store.save(&series()).unwrap();

        assert_eq!(store.load(), series());
        assert!(!dir.path().join("series.json.tmp").exists());
    }

    #[test]
    fn test_saved_document_has_aligned_columns() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("series.json"));
        store.save(&series()).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["timestamps"].as_array().unwrap().len(), 2);
        assert_eq!(value["blocks"].as_array().unwrap().len(), 2);
        assert_eq!(value["prices"].as_array().unwrap().len(), 2);
        assert!(value["last_updated"].as_f64().unwrap() > 1_600_000_000.0);
    }

    #[test]
    fn test_save_replaces_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("series.json"));

        store.save(&series()).unwrap();
        store.save(&series()[..1]).unwrap();

        assert_eq!(store.load(), series()[..1].to_vec());
    }

    #[test]
    fn test_stale_temp_file_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("series.json"));
        let tmp = dir.path().join("series.json.tmp");
        fs::write(&tmp, b"{\"timestamps\": [1, 2").unwrap();

        store.save(&series()).unwrap();

        assert!(!tmp.exists());
        assert_eq!(store.read_document().unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));

        assert!(store.read_document().unwrap().is_none());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.json");
        fs::write(&path, b"{\"timestamps\": [1, 2").unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(store.read_document(), Err(PersistenceError::Corrupt { .. })));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_misaligned_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.json");
        fs::write(
            &path,
            br#"{"timestamps": [1, 2], "blocks": [1], "prices": [1.0, 2.0], "last_updated": 0}"#,
        )
        .unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(store.read_document(), Err(PersistenceError::Corrupt { .. })));
        assert!(store.load().is_empty());
    }
}
