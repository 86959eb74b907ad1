//! The task tagged sum and the lane-name grammar.
//!
//! The scheduler is generic over the task type (see [`crate::scheduler`]);
//! this module supplies the one concrete variant the Queue Manager uses.

use sha2::{Digest, Sha256};

use crate::episode::Episode;

/// One unit of work dispatched by the scheduler.
#[derive(Debug, Clone)]
pub enum Task {
    /// Check a series for new episodes.
    Check(CheckTask),
    /// Download one discovered episode.
    Download(DownloadTask),
}

/// Checks a series page for episodes matching the configured criteria.
#[derive(Debug, Clone)]
pub struct CheckTask {
    /// The series URL being checked.
    pub series_url: String,
    /// How many times this series has been checked in the current
    /// discovery session. Ranges over `[1, count]`; resets to 1 once
    /// episodes are found.
    pub attempt_number: u32,
    /// How many times this specific task instance has been re-enqueued
    /// after a transient adapter error. Independent of `attempt_number`.
    pub retry_count: u32,
}

/// Downloads one previously-discovered episode.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// The series URL the episode belongs to.
    pub series_url: String,
    /// The episode to download.
    pub episode: Episode,
    /// How many times this specific task instance has been re-enqueued
    /// after a transient downloader error.
    pub retry_count: u32,
}

impl Task {
    /// The domain this task's lane is partitioned by.
    #[must_use]
    pub fn series_url(&self) -> &str {
        match self {
            Task::Check(t) => &t.series_url,
            Task::Download(t) => &t.series_url,
        }
    }
}

/// First 12 hex characters of the SHA-256 digest of `url`.
///
/// Used to give every series its own check lane even when two series
/// share a domain.
#[must_use]
pub fn short_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex = format!("{digest:x}");
    hex[..12].to_string()
}

/// Lane name for a series' check queue: `check:<domain>:<12-hex-hash-of-url>`.
#[must_use]
pub fn check_lane_name(domain: &str, series_url: &str) -> String {
    format!("check:{domain}:{}", short_hash(series_url))
}

/// Lane name for a domain's shared download queue: `download:<domain>`.
#[must_use]
pub fn download_lane_name(domain: &str) -> String {
    format!("download:{domain}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_is_twelve_hex_chars() {
        let h = short_hash("https://example.com/series/1");
        assert_eq!(h.len(), 12);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn short_hash_is_deterministic() {
        let a = short_hash("https://example.com/series/1");
        let b = short_hash("https://example.com/series/1");
        assert_eq!(a, b);
    }

    #[test]
    fn short_hash_differs_for_different_urls() {
        let a = short_hash("https://example.com/series/1");
        let b = short_hash("https://example.com/series/2");
        assert_ne!(a, b);
    }

    #[test]
    fn check_lane_name_embeds_domain_and_hash() {
        let name = check_lane_name("example.com", "https://example.com/series/1");
        assert!(name.starts_with("check:example.com:"));
        assert_eq!(name.len(), "check:example.com:".len() + 12);
    }

    #[test]
    fn download_lane_name_is_shared_per_domain() {
        assert_eq!(download_lane_name("example.com"), "download:example.com");
    }
}
