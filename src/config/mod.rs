//! Configuration document types and the flat [`ResolvedConfig`] view the
//! rest of the crate reads.
//!
//! The raw `*Document`/`Partial*Config` types mirror the on-disk YAML
//! shape and carry `Option` fields so the [`resolver`] can deep-merge the
//! four-level hierarchy (defaults ⊕ global ⊕ domain ⊕ series). Downstream
//! code never sees these — it reads [`ResolvedConfig`], which is always
//! fully populated.

pub mod loader;
pub mod resolver;

use serde::{Deserialize, Serialize};

use crate::episode::EpisodeType;

/// Raw, possibly-partial `check` section as written in the config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialCheckConfig {
    /// Maximum checks per discovery session before giving up.
    pub count: Option<u32>,
    /// Seconds between successive checks of the same series.
    pub check_interval: Option<u64>,
    /// Episode types that are eligible for download.
    pub download_types: Option<Vec<EpisodeType>>,
}

/// Raw, possibly-partial `download` section as written in the config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialDownloadConfig {
    /// Destination directory for downloaded episodes.
    pub download_dir: Option<String>,
    /// Seconds of politeness delay between downloads on the same domain.
    pub download_delay: Option<u64>,
    /// Maximum retry attempts for a transient failure.
    pub max_retries: Option<u32>,
    /// Seconds; base of the exponential backoff formula.
    pub initial_timeout: Option<f64>,
    /// Multiplier applied per retry in the backoff formula.
    pub backoff_multiplier: Option<f64>,
    /// Symmetric jitter, as a percentage of the base delay, in `[0, 100]`.
    pub jitter_percentage: Option<f64>,
    /// Minimum acceptable episode duration in seconds, below which the
    /// downloader rejects a file as a non-episode (teaser, ad, etc.).
    pub min_duration: Option<u64>,
}

/// One level of the hierarchy: global, domain, or series overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSectionConfig {
    /// Check-related overrides.
    pub check: Option<PartialCheckConfig>,
    /// Download-related overrides.
    pub download: Option<PartialDownloadConfig>,
    /// Path to a cookie jar file used by the scraping/downloader adapters.
    pub cookie_file: Option<String>,
    /// Whether a headless-browser cookie refresh session should be used.
    pub cookie_refresh_browser: Option<bool>,
}

/// One entry in the document's `series` list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDocument {
    /// Display name, also the downloaded-index key.
    pub name: String,
    /// The series page URL.
    pub url: String,
    /// Daily wall-clock time (`HH:MM`) to run the first check. Mutually
    /// exclusive with `cron`.
    pub start_time: Option<String>,
    /// Five-field cron expression. Mutually exclusive with `start_time`.
    pub cron: Option<String>,
    /// Series-level overrides, merged last (highest precedence).
    #[serde(flatten)]
    pub overrides: PartialSectionConfig,
}

/// One entry in the document's `domainConfigs` list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDocument {
    /// The domain these overrides apply to (matched against
    /// `url::Url::host_str` of each series).
    pub domain: String,
    /// Domain-level overrides, merged after global and before series.
    #[serde(flatten)]
    pub overrides: PartialSectionConfig,
}

/// The full configuration document as loaded from YAML.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    /// The series to watch. Must be non-empty.
    pub series: Vec<SeriesDocument>,
    /// Overrides applied to every series, after the built-in defaults.
    #[serde(default)]
    pub global_config: PartialSectionConfig,
    /// Per-domain overrides, applied after global and before series.
    #[serde(default)]
    pub domain_configs: Vec<DomainDocument>,
}

/// Built-in base of the merge hierarchy. Every field is populated so the
/// resolver can guarantee a fully-concrete [`ResolvedConfig`] regardless
/// of how sparse the document's overrides are.
#[must_use]
pub fn builtin_defaults() -> PartialSectionConfig {
    PartialSectionConfig {
        check: Some(PartialCheckConfig {
            count: Some(3),
            check_interval: Some(600),
            download_types: Some(vec![EpisodeType::Available]),
        }),
        download: Some(PartialDownloadConfig {
            download_dir: Some("./downloads".to_string()),
            download_delay: Some(10),
            max_retries: Some(3),
            initial_timeout: Some(5.0),
            backoff_multiplier: Some(2.0),
            jitter_percentage: Some(10.0),
            min_duration: Some(0),
        }),
        cookie_file: None,
        cookie_refresh_browser: Some(false),
    }
}

/// The wall-clock or cron schedule driving a series' Session Scheduler
/// timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Daily wall-clock time, `HH:MM` in the local timezone.
    StartTime(String),
    /// Five-field cron expression.
    Cron(String),
}

/// Fully-resolved, fully-populated `check` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCheckConfig {
    /// Maximum checks per discovery session before giving up.
    pub count: u32,
    /// Seconds between successive checks of the same series.
    pub check_interval_secs: u64,
    /// Episode types that are eligible for download.
    pub download_types: Vec<EpisodeType>,
}

/// Fully-resolved, fully-populated `download` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDownloadConfig {
    /// Destination directory for downloaded episodes.
    pub download_dir: String,
    /// Seconds of politeness delay between downloads on the same domain.
    pub download_delay_secs: u64,
    /// Maximum retry attempts for a transient failure.
    pub max_retries: u32,
    /// Seconds; base of the exponential backoff formula.
    pub initial_timeout_secs: f64,
    /// Multiplier applied per retry in the backoff formula.
    pub backoff_multiplier: f64,
    /// Symmetric jitter, as a percentage of the base delay, in `[0, 100]`.
    pub jitter_percentage: f64,
    /// Minimum acceptable episode duration in seconds.
    pub min_duration_secs: u64,
}

/// A fully-merged, fully-populated view of one series' configuration.
/// The scheduler and queue manager never read optionals; every lookup
/// for a registered series returns one of these.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Display name, also the downloaded-index key.
    pub name: String,
    /// The series page URL.
    pub url: String,
    /// The domain this series' URL resolves to.
    pub domain: String,
    /// The timer driving this series' checks.
    pub schedule: Schedule,
    /// Resolved check section.
    pub check: ResolvedCheckConfig,
    /// Resolved download section.
    pub download: ResolvedDownloadConfig,
    /// Optional cookie jar path.
    pub cookie_file: Option<String>,
    /// Whether a headless-browser cookie refresh session should be used.
    pub cookie_refresh_browser: bool,
}
