//! Queue Manager: binds the generic [`UniversalScheduler`] to the
//! check → download business flow.
//!
//! Owns the resolved configuration, the notifier, the downloaded-index,
//! the cookie-refresh collaborator, and the per-domain scraping/download
//! adapters. Implements [`Executor<Task>`] on itself (via a thin
//! [`Weak`]-holding wrapper, since the scheduler and the manager each
//! need a handle to the other) and drives every lane-name-prefixed
//! dispatch through [`Self::run_task`].

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::adapters::{DownloaderAdapter, NotifyLevel, ScrapingAdapter};
use crate::config::resolver::ConfigResolver;
use crate::context::AppContext;
use crate::episode::Episode;
use crate::retry::{backoff_delay, BackoffConfig};
use crate::scheduler::{Executor, ExecutorError, UniversalScheduler};
use crate::task::{check_lane_name, download_lane_name, CheckTask, DownloadTask, Task};

/// Binds business semantics onto the [`UniversalScheduler`].
///
/// Reads configuration, the notifier, and the downloaded-index through
/// [`AppContext`] rather than owning private copies, so a `reload` on the
/// context is observed by the next task this manager dispatches without
/// reconstructing the manager itself.
pub struct QueueManager {
    context: Arc<AppContext>,
    scraping_adapters: Mutex<HashMap<String, Arc<dyn ScrapingAdapter>>>,
    downloader_adapters: Mutex<HashMap<String, Arc<dyn DownloaderAdapter>>>,
    scheduler: Arc<UniversalScheduler<Task>>,
}

struct SchedulerExecutor {
    manager: Weak<QueueManager>,
}

#[async_trait]
impl Executor<Task> for SchedulerExecutor {
    async fn execute(&self, task: Task, lane: &str) -> std::result::Result<(), ExecutorError> {
        let manager = self
            .manager
            .upgrade()
            .ok_or_else(|| -> ExecutorError { "queue manager dropped".into() })?;
        manager.run_task(task, lane).await;
        Ok(())
    }
}

impl QueueManager {
    /// Build a new manager bound to `context`. Per-domain adapters are
    /// registered separately via [`Self::register_scraping_adapter`] and
    /// [`Self::register_downloader_adapter`] before the first series is
    /// added.
    #[must_use]
    pub fn new(context: Arc<AppContext>) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| {
            let executor: Arc<dyn Executor<Task>> = Arc::new(SchedulerExecutor {
                manager: weak_self.clone(),
            });
            let scheduler = UniversalScheduler::new(executor, None);
            Self {
                context,
                scraping_adapters: Mutex::new(HashMap::new()),
                downloader_adapters: Mutex::new(HashMap::new()),
                scheduler,
            }
        })
    }

    async fn config(&self) -> Arc<ConfigResolver> {
        self.context.config().await
    }

    /// Register the scraping adapter used for series on `domain`.
    pub async fn register_scraping_adapter(&self, domain: impl Into<String>, adapter: Arc<dyn ScrapingAdapter>) {
        self.scraping_adapters.lock().await.insert(domain.into(), adapter);
    }

    /// Register the downloader adapter used for series on `domain`.
    pub async fn register_downloader_adapter(&self, domain: impl Into<String>, adapter: Arc<dyn DownloaderAdapter>) {
        self.downloader_adapters.lock().await.insert(domain.into(), adapter);
    }

    /// Resolve `url`'s config, ensure its check and download lanes are
    /// registered, and enqueue the first check of a discovery session.
    pub async fn add_series_check(&self, url: &str) {
        let resolved = match self.config().await.resolve_series(url) {
            Ok(r) => r,
            Err(e) => {
                self.context.notifier()
                    .notify(NotifyLevel::Error, &format!("cannot start check for {url}: {e}"))
                    .await;
                return;
            }
        };

        let check_lane = check_lane_name(&resolved.domain, url);
        let download_lane = download_lane_name(&resolved.domain);

        if !self.scheduler.has_queue(&check_lane).await {
            let _ = self
                .scheduler
                .register_queue(check_lane.clone(), Duration::from_secs(resolved.check.check_interval_secs))
                .await;
        }
        if !self.scheduler.has_queue(&download_lane).await {
            let _ = self
                .scheduler
                .register_queue(download_lane, Duration::from_secs(resolved.download.download_delay_secs))
                .await;
        }

        self.scheduler
            .add_task(
                &check_lane,
                Task::Check(CheckTask {
                    series_url: url.to_string(),
                    attempt_number: 1,
                    retry_count: 0,
                }),
                Duration::ZERO,
            )
            .await;
    }

    /// Enqueue a burst of discovered episodes onto `url`'s domain download
    /// lane, staggered by `i · downloadDelay` so a burst from one check
    /// respects politeness within the same queue.
    pub async fn add_episodes(&self, url: &str, episodes: Vec<Episode>) {
        let resolved = match self.config().await.resolve_series(url) {
            Ok(r) => r,
            Err(_) => return,
        };
        let download_lane = download_lane_name(&resolved.domain);
        if !self.scheduler.has_queue(&download_lane).await {
            let _ = self
                .scheduler
                .register_queue(download_lane.clone(), Duration::from_secs(resolved.download.download_delay_secs))
                .await;
        }
        for (i, episode) in episodes.into_iter().enumerate() {
            let delay = Duration::from_secs(resolved.download.download_delay_secs * i as u64);
            self.scheduler
                .add_task(
                    &download_lane,
                    Task::Download(DownloadTask {
                        series_url: url.to_string(),
                        episode,
                        retry_count: 0,
                    }),
                    delay,
                )
                .await;
        }
    }

    /// Empty every lane without touching cooldowns.
    pub async fn clear_queues(&self) {
        self.scheduler.clear_queues().await;
    }

    /// Empty every lane and clear cooldowns, then resume dispatch. The
    /// operator's "force immediate" action.
    pub async fn reset_queues(&self) {
        self.scheduler.reset_queues().await;
    }

    /// Resume dispatch.
    pub async fn start(&self) {
        self.scheduler.resume().await;
    }

    /// Stop dispatching new tasks. Does not interrupt an in-flight task.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    /// Whether any lane holds a queued task or an in-flight executor call.
    pub async fn has_active_processing(&self) -> bool {
        self.scheduler.is_executor_busy().await || self.scheduler.has_pending_tasks().await
    }

    /// Whether an executor call is currently in flight. Narrower than
    /// [`Self::has_active_processing`] — used by graceful shutdown, which
    /// only needs to wait out the task actually running, not queued work
    /// that will never dispatch once `stop()` has been called.
    pub async fn is_executing(&self) -> bool {
        self.scheduler.is_executor_busy().await
    }

    /// Re-read every registered series' current configuration and update
    /// its check/download lanes' registered default cooldown to match.
    /// Called after [`AppContext::reload_config`] swaps the registry, so
    /// a lane whose next cooldown would otherwise fall back to a stale
    /// default reflects the reloaded value.
    pub async fn reconcile_lane_cooldowns(&self) {
        let Ok(series) = self.config().await.list_series() else {
            return;
        };
        for resolved in series {
            let check_lane = check_lane_name(&resolved.domain, &resolved.url);
            let download_lane = download_lane_name(&resolved.domain);
            self.scheduler
                .set_default_cooldown(&check_lane, Duration::from_secs(resolved.check.check_interval_secs))
                .await;
            self.scheduler
                .set_default_cooldown(&download_lane, Duration::from_secs(resolved.download.download_delay_secs))
                .await;
        }
    }

    async fn run_task(&self, task: Task, lane: &str) {
        match task {
            Task::Check(check) => self.run_check(check, lane).await,
            Task::Download(download) => self.run_download(download, lane).await,
        }
    }

    async fn run_check(&self, task: CheckTask, lane: &str) {
        let resolved = match self.config().await.resolve_series(&task.series_url) {
            Ok(r) => r,
            Err(e) => {
                self.context.notifier()
                    .notify(NotifyLevel::Error, &format!("config vanished for {}: {e}", task.series_url))
                    .await;
                self.scheduler.mark_task_complete(lane, None).await;
                return;
            }
        };

        let adapter = self.scraping_adapters.lock().await.get(&resolved.domain).cloned();
        let extracted = match adapter {
            Some(adapter) => adapter.extract_episodes(&task.series_url).await,
            None => Err(crate::error::HandlerError::ExtractionFailed {
                url: task.series_url.clone(),
                reason: format!("no scraping adapter registered for domain {}", resolved.domain),
            }),
        };

        match extracted {
            Ok(episodes) => {
                let mut new_episodes = Vec::new();
                for episode in episodes {
                    if !resolved.check.download_types.contains(&episode.episode_type) {
                        continue;
                    }
                    if self.context.downloaded_index().is_downloaded(&resolved.name, episode.number).await {
                        continue;
                    }
                    new_episodes.push(episode);
                }

                if !new_episodes.is_empty() {
                    if resolved.cookie_refresh_browser {
                        if let Some(cookie_file) = &resolved.cookie_file {
                            if let Err(e) = self.context.cookie_refresher().refresh(&task.series_url, cookie_file).await {
                                self.context.notifier()
                                    .notify(NotifyLevel::Warning, &format!("cookie refresh failed for {}: {e}", task.series_url))
                                    .await;
                            }
                        }
                    }
                    self.context.notifier()
                        .notify(
                            NotifyLevel::Success,
                            &format!("{} new episode(s) found for {}", new_episodes.len(), resolved.name),
                        )
                        .await;
                    self.add_episodes(&task.series_url, new_episodes).await;
                    self.scheduler
                        .mark_task_complete(lane, Some(Duration::from_secs(resolved.check.check_interval_secs)))
                        .await;
                } else if task.attempt_number < resolved.check.count {
                    self.scheduler
                        .add_priority_task(
                            lane,
                            Task::Check(CheckTask {
                                series_url: task.series_url.clone(),
                                attempt_number: task.attempt_number + 1,
                                retry_count: 0,
                            }),
                            Duration::from_secs(resolved.check.check_interval_secs),
                        )
                        .await;
                    self.scheduler.mark_task_complete(lane, None).await;
                } else {
                    self.context.notifier()
                        .notify(
                            NotifyLevel::Info,
                            &format!("{} exhausted {} check attempts with no new episodes", resolved.name, resolved.check.count),
                        )
                        .await;
                    self.scheduler.mark_task_complete(lane, None).await;
                }
            }
            Err(e) => {
                if task.retry_count < resolved.download.max_retries {
                    let delay = backoff_delay(
                        BackoffConfig {
                            initial_timeout_secs: resolved.download.initial_timeout_secs,
                            backoff_multiplier: resolved.download.backoff_multiplier,
                            jitter_percentage: resolved.download.jitter_percentage,
                        },
                        task.retry_count,
                    );
                    self.scheduler
                        .add_priority_task(
                            lane,
                            Task::Check(CheckTask {
                                series_url: task.series_url.clone(),
                                attempt_number: task.attempt_number,
                                retry_count: task.retry_count + 1,
                            }),
                            delay,
                        )
                        .await;
                    self.scheduler.mark_task_complete(lane, Some(Duration::ZERO)).await;
                } else {
                    self.context.notifier()
                        .notify(NotifyLevel::Error, &format!("check failed for {} after retries: {e}", resolved.name))
                        .await;
                    self.scheduler.mark_task_complete(lane, None).await;
                }
            }
        }
    }

    async fn run_download(&self, task: DownloadTask, lane: &str) {
        let resolved = match self.config().await.resolve_series(&task.series_url) {
            Ok(r) => r,
            Err(e) => {
                self.context.notifier()
                    .notify(NotifyLevel::Error, &format!("config vanished for {}: {e}", task.series_url))
                    .await;
                self.scheduler.mark_task_complete(lane, None).await;
                return;
            }
        };

        let adapter = self.downloader_adapters.lock().await.get(&resolved.domain).cloned();
        let result = match adapter {
            Some(adapter) => {
                adapter
                    .download(&task.series_url, &task.episode, &resolved.download.download_dir)
                    .await
            }
            None => Err(crate::error::DownloadError::Failed {
                url: task.series_url.clone(),
                episode: task.episode.number,
                reason: format!("no downloader adapter registered for domain {}", resolved.domain),
            }),
        };

        match result {
            Ok(()) => {
                if let Err(e) = self
                    .context
                    .downloaded_index()
                    .record_downloaded(&resolved.name, task.episode.number)
                    .await
                {
                    self.context.notifier()
                        .notify(NotifyLevel::Error, &format!("failed to persist downloaded-index entry: {e}"))
                        .await;
                }
                self.context.notifier()
                    .notify(
                        NotifyLevel::Success,
                        &format!("downloaded {} episode {}", resolved.name, task.episode.padded_number()),
                    )
                    .await;
                self.scheduler
                    .mark_task_complete(lane, Some(Duration::from_secs(resolved.download.download_delay_secs)))
                    .await;
            }
            Err(e) => {
                if task.retry_count < resolved.download.max_retries {
                    if task.retry_count == 0 {
                        self.context.notifier()
                            .notify(
                                NotifyLevel::Warning,
                                &format!("retrying download for {} ({}): {e}", resolved.name, task.episode.url),
                            )
                            .await;
                    }
                    let delay = backoff_delay(
                        BackoffConfig {
                            initial_timeout_secs: resolved.download.initial_timeout_secs,
                            backoff_multiplier: resolved.download.backoff_multiplier,
                            jitter_percentage: resolved.download.jitter_percentage,
                        },
                        task.retry_count,
                    );
                    self.scheduler
                        .add_priority_task(
                            lane,
                            Task::Download(DownloadTask {
                                series_url: task.series_url.clone(),
                                episode: task.episode.clone(),
                                retry_count: task.retry_count + 1,
                            }),
                            delay,
                        )
                        .await;
                    self.scheduler.mark_task_complete(lane, Some(Duration::ZERO)).await;
                } else {
                    self.context.notifier()
                        .notify(
                            NotifyLevel::Error,
                            &format!("download exhausted for {} episode {}: {e}", resolved.name, task.episode.padded_number()),
                        )
                        .await;
                    self.scheduler.mark_task_complete(lane, None).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ConsoleNotifier;
    use crate::config::{ConfigDocument, PartialSectionConfig, SeriesDocument};
    use crate::downloaded_index::DownloadedIndex;
    use crate::episode::EpisodeType;
    use crate::error::{DownloadError, HandlerError};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedScrapingAdapter {
        episodes: Vec<Episode>,
    }

    #[async_trait]
    impl ScrapingAdapter for FixedScrapingAdapter {
        async fn extract_episodes(&self, _series_url: &str) -> Result<Vec<Episode>, HandlerError> {
            Ok(self.episodes.clone())
        }
    }

    struct CountingDownloaderAdapter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DownloaderAdapter for CountingDownloaderAdapter {
        async fn check_installed(&self) -> bool {
            true
        }

        async fn download(&self, _series_url: &str, _episode: &Episode, _download_dir: &str) -> Result<(), DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn doc() -> ConfigDocument {
        ConfigDocument {
            series: vec![SeriesDocument {
                name: "Example Show".to_string(),
                url: "https://example.com/show/1".to_string(),
                start_time: Some("08:00".to_string()),
                cron: None,
                overrides: PartialSectionConfig::default(),
            }],
            global_config: PartialSectionConfig::default(),
            domain_configs: vec![],
        }
    }

    async fn build_manager(episodes: Vec<Episode>) -> (Arc<QueueManager>, Arc<CountingDownloaderAdapter>) {
        let resolver = Arc::new(ConfigResolver::build(&doc()).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(DownloadedIndex::load(dir.path().join("index.json")).await.unwrap());
        let context = Arc::new(AppContext::new(
            resolver,
            Arc::new(ConsoleNotifier),
            index,
            Arc::new(crate::adapters::NoOpCookieRefresher),
        ));
        let manager = QueueManager::new(context);

        let scraping: Arc<dyn ScrapingAdapter> = Arc::new(FixedScrapingAdapter { episodes });
        manager.register_scraping_adapter("example.com", scraping).await;

        let downloader = Arc::new(CountingDownloaderAdapter { calls: AtomicUsize::new(0) });
        let downloader_trait: Arc<dyn DownloaderAdapter> = downloader.clone();
        manager.register_downloader_adapter("example.com", downloader_trait).await;

        (manager, downloader)
    }

    #[tokio::test]
    async fn new_episode_triggers_download() {
        let episode = Episode {
            number: 1,
            url: "https://example.com/show/1/ep1".to_string(),
            episode_type: EpisodeType::Available,
            title: None,
            extracted_at: Utc::now(),
        };
        let (manager, downloader) = build_manager(vec![episode]).await;
        manager.start().await;
        manager.add_series_check("https://example.com/show/1").await;

        for _ in 0..50 {
            if downloader.calls.load(Ordering::SeqCst) >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn already_downloaded_episode_is_not_redownloaded() {
        let episode = Episode {
            number: 1,
            url: "https://example.com/show/1/ep1".to_string(),
            episode_type: EpisodeType::Available,
            title: None,
            extracted_at: Utc::now(),
        };
        let (manager, downloader) = build_manager(vec![episode.clone()]).await;
        manager.start().await;
        manager.add_series_check("https://example.com/show/1").await;
        for _ in 0..50 {
            if downloader.calls.load(Ordering::SeqCst) >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // Second check of the same episode should not redispatch a download.
        manager.add_series_check("https://example.com/show/1").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn has_active_processing_reports_false_once_idle() {
        let (manager, _downloader) = build_manager(vec![]).await;
        manager.start().await;
        assert!(!manager.has_active_processing().await);
        manager.add_series_check("https://example.com/show/1").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!manager.has_active_processing().await);
    }

    #[tokio::test]
    async fn reconcile_lane_cooldowns_is_a_no_op_before_lanes_exist() {
        let (manager, _downloader) = build_manager(vec![]).await;
        // No series has been checked yet, so no lanes are registered;
        // this must not panic even though every lane lookup misses.
        manager.reconcile_lane_cooldowns().await;
    }
}
