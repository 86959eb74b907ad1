//! Trait boundaries between the scheduling core and the outside world:
//! scraping, downloading, notification, and cookie refresh.
//!
//! These mirror the way the teacher crate kept its parity backends
//! behind a single `async_trait` boundary — callers depend on the
//! trait, never on a concrete scraping or downloading backend.

use async_trait::async_trait;

use crate::episode::Episode;
use crate::error::{DownloadError, HandlerError};

/// Extracts the episode list from a series page.
#[async_trait]
pub trait ScrapingAdapter: Send + Sync {
    /// Fetch `series_url` and return every episode currently listed,
    /// in page order.
    async fn extract_episodes(&self, series_url: &str) -> Result<Vec<Episode>, HandlerError>;
}

/// Performs the actual download of a single episode.
#[async_trait]
pub trait DownloaderAdapter: Send + Sync {
    /// Whether the downloader's external dependency (a helper binary,
    /// browser profile, etc.) is installed and usable.
    async fn check_installed(&self) -> bool;

    /// Download `episode` from `series_url` into `download_dir`.
    async fn download(
        &self,
        series_url: &str,
        episode: &Episode,
        download_dir: &str,
    ) -> Result<(), DownloadError>;
}

/// Severity of a [`Notifier::notify`] call, ordered least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotifyLevel {
    /// Verbose, developer-facing detail.
    Debug,
    /// Routine status update.
    Info,
    /// A download or check completed successfully.
    Success,
    /// Worth drawing the operator's attention to, short of a failure.
    Highlight,
    /// Something degraded but recoverable happened.
    Warning,
    /// An unrecoverable failure.
    Error,
}

/// Surfaces scheduler events to whatever the embedding application uses
/// for notifications (a chat webhook, a desktop notification, a log
/// line — the crate itself is agnostic).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Emit a notification at the given level.
    async fn notify(&self, level: NotifyLevel, message: &str);
}

/// Refreshes an expired cookie jar for a series that requires
/// authenticated access.
#[async_trait]
pub trait CookieRefresher: Send + Sync {
    /// Refresh the cookie jar at `cookie_file` for `series_url`.
    async fn refresh(&self, series_url: &str, cookie_file: &str) -> Result<(), crate::error::CookieError>;
}

/// [`Notifier`] that logs through `tracing` at a level matching
/// [`NotifyLevel`]. The reference implementation bundled for
/// applications that don't need a richer notification channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Debug => tracing::debug!("{message}"),
            NotifyLevel::Info => tracing::info!("{message}"),
            NotifyLevel::Success => tracing::info!(success = true, "{message}"),
            NotifyLevel::Highlight => tracing::info!(highlight = true, "{message}"),
            NotifyLevel::Warning => tracing::warn!("{message}"),
            NotifyLevel::Error => tracing::error!("{message}"),
        }
    }
}

/// [`CookieRefresher`] for series that never need cookie refresh. The
/// reference implementation bundled for applications with no
/// authenticated series.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCookieRefresher;

#[async_trait]
impl CookieRefresher for NoOpCookieRefresher {
    async fn refresh(&self, _series_url: &str, _cookie_file: &str) -> Result<(), crate::error::CookieError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_cookie_refresher_always_succeeds() {
        let refresher = NoOpCookieRefresher;
        assert!(refresher.refresh("https://example.com", "cookies.txt").await.is_ok());
    }

    #[test]
    fn notify_levels_order_from_debug_to_error() {
        assert!(NotifyLevel::Debug < NotifyLevel::Info);
        assert!(NotifyLevel::Info < NotifyLevel::Success);
        assert!(NotifyLevel::Success < NotifyLevel::Highlight);
        assert!(NotifyLevel::Highlight < NotifyLevel::Warning);
        assert!(NotifyLevel::Warning < NotifyLevel::Error);
    }
}
