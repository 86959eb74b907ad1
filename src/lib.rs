//! # series-watch
//!
//! A cooldown-aware scheduling engine for periodically checking streaming
//! "series" pages for new episodes and dispatching discovered episodes to
//! an external downloader.
//!
//! ## Design Philosophy
//!
//! series-watch is designed to be:
//! - **Library-first** — no site-specific scraping or downloading logic
//!   is bundled; embedders implement [`adapters::ScrapingAdapter`] and
//!   [`adapters::DownloaderAdapter`] for the sites and tools they target.
//! - **Single-executor** — at most one task is ever in flight across every
//!   configured series and domain, regardless of how many lanes exist.
//! - **Cooldown-aware** — per-series check intervals and per-domain
//!   download politeness delays are honored without busy-waiting.
//! - **Hierarchically configured** — defaults, global overrides,
//!   per-domain overrides, and per-series overrides merge into one flat,
//!   fully-resolved view per series.
//!
//! ## Quick Start
//!
//! ```no_run
//! use series_watch::adapters::{ConsoleNotifier, NoOpCookieRefresher};
//! use series_watch::config::loader;
//! use series_watch::config::resolver::ConfigResolver;
//! use series_watch::context::AppContext;
//! use series_watch::downloaded_index::DownloadedIndex;
//! use series_watch::queue_manager::QueueManager;
//! use series_watch::session_scheduler::SessionScheduler;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let doc = loader::load(Path::new("config.yaml"))?;
//!     let resolver = Arc::new(ConfigResolver::build(&doc)?);
//!     let index = Arc::new(DownloadedIndex::load("downloaded-index.json").await?);
//!     let context = Arc::new(AppContext::new(
//!         resolver,
//!         Arc::new(ConsoleNotifier),
//!         index,
//!         Arc::new(NoOpCookieRefresher),
//!     ));
//!
//!     let manager = QueueManager::new(context.clone());
//!     // manager.register_scraping_adapter("example.com", my_adapter).await;
//!     // manager.register_downloader_adapter("example.com", my_downloader).await;
//!
//!     let scheduler = SessionScheduler::new(context, manager, false, None, None);
//!     scheduler.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Trait boundaries to the outside world: scraping, downloading,
/// notification, and cookie refresh.
pub mod adapters;
/// Configuration document types, the hierarchy resolver, and the YAML
/// loader.
pub mod config;
/// Application Context: the process-wide handle to configuration, the
/// notifier, and the downloaded-episode index.
pub mod context;
/// File-backed record of already-downloaded episodes.
pub mod downloaded_index;
/// Episode data model.
pub mod episode;
/// Error types.
pub mod error;
/// Typed queue: one lane's passive FIFO and cooldown state.
pub mod queue;
/// Queue Manager: binds the scheduler to the check/download business flow.
pub mod queue_manager;
/// Exponential backoff with jitter.
pub mod retry;
/// Universal Scheduler: cooperative, single-executor, round-robin fair
/// dispatch across lanes.
pub mod scheduler;
/// Session Scheduler: the outer wall-clock/cron driven control loop.
pub mod session_scheduler;
/// Task variants and the lane-name grammar.
pub mod task;

// Re-export commonly used types.
pub use adapters::{ConsoleNotifier, CookieRefresher, DownloaderAdapter, NoOpCookieRefresher, Notifier, NotifyLevel, ScrapingAdapter};
pub use config::resolver::ConfigResolver;
pub use config::ResolvedConfig;
pub use context::AppContext;
pub use downloaded_index::DownloadedIndex;
pub use episode::{Episode, EpisodeType};
pub use error::{ConfigError, CookieError, DownloadError, Error, HandlerError, Result};
pub use queue_manager::QueueManager;
pub use scheduler::UniversalScheduler;
pub use session_scheduler::SessionScheduler;
pub use task::Task;

/// Waits for a termination signal and then calls `scheduler.stop()`.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use series_watch::session_scheduler::SessionScheduler;
/// use std::sync::Arc;
///
/// # async fn example(scheduler: Arc<SessionScheduler>) {
/// series_watch::run_with_shutdown(&scheduler).await;
/// # }
/// ```
pub async fn run_with_shutdown(scheduler: &SessionScheduler) {
    wait_for_signal().await;
    scheduler.stop().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
