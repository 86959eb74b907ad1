//! Error types for series-watch.
//!
//! Four kinds mirror the error-handling design: [`ConfigError`] is terminal
//! and surfaces before the scheduler ever runs; [`HandlerError`] and
//! [`DownloadError`] are per-task retryable faults raised by the scraping
//! and downloader adapters respectively; [`CookieError`] is best-effort and
//! never propagates as a task failure.

use thiserror::Error;

/// Result type alias for series-watch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type composing the four error kinds.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is invalid or could not be loaded. Terminal.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The scraping adapter failed. Retryable at the task level.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// The downloader adapter failed. Retryable at the task level.
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// The cookie-refresh collaborator failed. Logged, never fatal.
    #[error("cookie error: {0}")]
    Cookie(#[from] CookieError),

    /// I/O error, e.g. reading the config file or the downloaded-index.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons the Configuration Resolver rejects a document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A series URL failed to parse.
    #[error("invalid series url {url}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why `url::Url::parse` rejected it.
        reason: String,
    },

    /// `startTime` did not match `^\d{1,2}:\d{2}$`.
    #[error("invalid startTime '{value}' for series '{series}': expected HH:MM")]
    InvalidStartTime {
        /// The series name the bad value belongs to.
        series: String,
        /// The raw value as written in the document.
        value: String,
    },

    /// `cron` failed to parse as a five-field cron expression.
    #[error("invalid cron expression '{value}' for series '{series}': {reason}")]
    InvalidCron {
        /// The series name the bad value belongs to.
        series: String,
        /// The raw cron string.
        value: String,
        /// Parser error message.
        reason: String,
    },

    /// A numeric field violated its range invariant (e.g. `count < 1`).
    #[error("invalid value for {field} on '{series}': {reason}")]
    InvalidRange {
        /// The series name the bad value belongs to.
        series: String,
        /// The field name (e.g. "check.count").
        field: String,
        /// Human-readable description of the violated invariant.
        reason: String,
    },

    /// The `series` list was empty.
    #[error("configuration document declares no series")]
    NoSeries,

    /// An `${VAR}` placeholder referenced an environment variable that
    /// isn't set.
    #[error("undefined environment variable referenced in config: ${{{0}}}")]
    UndefinedVariable(String),

    /// The document failed to parse as YAML.
    #[error("failed to parse configuration document: {0}")]
    Parse(String),

    /// A series URL (or domain-of(url)) has no corresponding resolved
    /// entry — resolver was asked to resolve an unregistered series.
    #[error("no series registered for url: {0}")]
    UnknownSeries(String),
}

/// Errors raised by a [`crate::adapters::ScrapingAdapter`] implementation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The adapter's HTTP/browser call failed.
    #[error("failed to extract episodes from {url}: {reason}")]
    ExtractionFailed {
        /// The series URL being checked.
        url: String,
        /// Underlying cause.
        reason: String,
    },

    /// The adapter returned malformed data it could not interpret.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse {
        /// The series URL being checked.
        url: String,
        /// Description of the malformation.
        reason: String,
    },
}

/// Errors raised by a [`crate::adapters::DownloaderAdapter`] implementation.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The downloader subprocess/tool is not installed or not found.
    #[error("downloader not installed")]
    NotInstalled,

    /// The download attempt failed.
    #[error("download failed for {url} episode {episode}: {reason}")]
    Failed {
        /// The series URL.
        url: String,
        /// The episode number that failed.
        episode: u32,
        /// Underlying cause.
        reason: String,
    },
}

/// Errors raised by the cookie-refresh collaborator. Never fatal; logged
/// by the Queue Manager and otherwise ignored.
#[derive(Debug, Error)]
pub enum CookieError {
    /// The refresh browser session failed to start or navigate.
    #[error("cookie refresh failed for {url}: {reason}")]
    RefreshFailed {
        /// The series URL the refresh was attempted for.
        url: String,
        /// Underlying cause.
        reason: String,
    },
}
