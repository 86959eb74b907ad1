//! File-backed record of which episodes have already been downloaded
//! per series, so a restart never re-downloads or re-notifies.
//!
//! Persisted as a single versioned JSON document. Writes are
//! append-only from the caller's perspective (`record_downloaded` only
//! ever adds an episode number) and flushed to disk synchronously
//! before returning, so a crash never loses a completed download.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Error;

const FORMAT_VERSION: &str = "3.0.0";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct IndexDocument {
    version: String,
    series: HashMap<String, BTreeSet<String>>,
}

impl IndexDocument {
    fn new() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            series: HashMap::new(),
        }
    }
}

/// Episode numbers are recorded zero-padded to four digits (e.g. `5` ->
/// `"0005"`), matching [`crate::episode::Episode::padded_number`], so the
/// persisted list sorts lexicographically in the same order as
/// numerically.
fn pad(episode_number: u32) -> String {
    format!("{episode_number:04}")
}

/// Tracks downloaded episode numbers per series name, persisted as JSON.
pub struct DownloadedIndex {
    path: PathBuf,
    doc: Mutex<IndexDocument>,
}

impl DownloadedIndex {
    /// Load the index from `path`, or start a fresh empty document if the
    /// file does not yet exist.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let doc = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexDocument::new(),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    /// Whether `episode_number` has already been recorded for `series_name`.
    pub async fn is_downloaded(&self, series_name: &str, episode_number: u32) -> bool {
        let doc = self.doc.lock().await;
        doc.series
            .get(series_name)
            .is_some_and(|numbers| numbers.contains(&pad(episode_number)))
    }

    /// Record `episode_number` as downloaded for `series_name` and flush
    /// to disk before returning.
    pub async fn record_downloaded(&self, series_name: &str, episode_number: u32) -> Result<(), Error> {
        let mut doc = self.doc.lock().await;
        doc.series
            .entry(series_name.to_string())
            .or_default()
            .insert(pad(episode_number));
        self.flush(&doc).await
    }

    /// All recorded episode numbers for `series_name`, ascending.
    pub async fn downloaded_for(&self, series_name: &str) -> Vec<u32> {
        let doc = self.doc.lock().await;
        doc.series
            .get(series_name)
            .map(|numbers| numbers.iter().filter_map(|n| n.parse().ok()).collect())
            .unwrap_or_default()
    }

    async fn flush(&self, doc: &IndexDocument) -> Result<(), Error> {
        let serialized = serde_json::to_string_pretty(doc)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp_path = tmp_path_for(&self.path);
        tokio::fs::write(&tmp_path, serialized).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_episode_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let index = DownloadedIndex::load(dir.path().join("index.json")).await.unwrap();
        assert!(!index.is_downloaded("Example Show", 1).await);
    }

    #[tokio::test]
    async fn recorded_episode_is_downloaded_and_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let index = DownloadedIndex::load(&path).await.unwrap();
        index.record_downloaded("Example Show", 7).await.unwrap();
        assert!(index.is_downloaded("Example Show", 7).await);

        let reloaded = DownloadedIndex::load(&path).await.unwrap();
        assert!(reloaded.is_downloaded("Example Show", 7).await);
        assert!(!reloaded.is_downloaded("Example Show", 8).await);
    }

    #[tokio::test]
    async fn downloaded_for_returns_ascending_episode_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let index = DownloadedIndex::load(dir.path().join("index.json")).await.unwrap();
        index.record_downloaded("Example Show", 3).await.unwrap();
        index.record_downloaded("Example Show", 1).await.unwrap();
        index.record_downloaded("Example Show", 2).await.unwrap();
        assert_eq!(index.downloaded_for("Example Show").await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn distinct_series_are_tracked_independently() {
        let dir = tempfile::tempdir().unwrap();
        let index = DownloadedIndex::load(dir.path().join("index.json")).await.unwrap();
        index.record_downloaded("Show A", 1).await.unwrap();
        assert!(index.is_downloaded("Show A", 1).await);
        assert!(!index.is_downloaded("Show B", 1).await);
    }
}
