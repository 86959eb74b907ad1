//! Session Scheduler: the outer control loop.
//!
//! Waits for each series' next wall-clock `startTime` or `cron` firing,
//! injects a [`crate::task::CheckTask`] through the Queue Manager when it
//! elapses, and re-arms for the next occurrence. Also exposes the
//! `reload`/`trigger`/`quit` operator actions used by an interactive
//! front-end — the Session Scheduler itself is agnostic to stdin/TTY
//! concerns, which are the embedding binary's job.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Local, NaiveTime, TimeZone};
use tokio_util::sync::CancellationToken;

use crate::config::Schedule;
use crate::context::AppContext;
use crate::error::ConfigError;
use crate::queue_manager::QueueManager;

/// Optional hook invoked once the scheduler has armed every series' timer
/// and is otherwise idle. The TTY front-end uses this to redraw its help
/// text; the core has no opinion on what it does.
pub type OnIdle = Arc<dyn Fn() + Send + Sync>;

/// Outer driver binding wall-clock/cron timers to [`QueueManager::add_series_check`].
pub struct SessionScheduler {
    context: Arc<AppContext>,
    queue_manager: Arc<QueueManager>,
    once: bool,
    on_idle: Option<OnIdle>,
    config_path: Option<PathBuf>,
    stop_token: CancellationToken,
    series_timers: tokio::sync::Mutex<HashMap<String, CancellationToken>>,
}

impl SessionScheduler {
    /// Build a new scheduler. `once`, when true, switches [`Self::run`]
    /// into single-pass mode (see §4.5.1): every series is checked
    /// immediately and `run` returns once all queues drain, instead of
    /// waiting for each series' scheduled occurrence and running forever.
    #[must_use]
    pub fn new(
        context: Arc<AppContext>,
        queue_manager: Arc<QueueManager>,
        once: bool,
        on_idle: Option<OnIdle>,
        config_path: Option<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            context,
            queue_manager,
            once,
            on_idle,
            config_path,
            stop_token: CancellationToken::new(),
            series_timers: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Run the outer loop. In single-pass (`--once`) mode this resolves
    /// once every queue has drained; otherwise it resolves only once
    /// [`Self::stop`] has been called.
    pub async fn run(self: &Arc<Self>) -> Result<(), ConfigError> {
        self.queue_manager.start().await;

        if self.once {
            self.run_once().await;
            return Ok(());
        }

        let series = self.context.config().await.list_series()?;
        for resolved in &series {
            self.arm_series_timer(resolved.url.clone()).await;
        }
        if let Some(on_idle) = &self.on_idle {
            on_idle();
        }

        self.stop_token.cancelled().await;
        Ok(())
    }

    /// `--once`: inject every series' check immediately, skipping the
    /// start-time/cron wait entirely, then wait for the queues to drain.
    async fn run_once(&self) {
        let series = match self.context.config().await.list_series() {
            Ok(series) => series,
            Err(_) => return,
        };
        for resolved in &series {
            self.queue_manager.add_series_check(&resolved.url).await;
        }
        loop {
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            if !self.queue_manager.has_active_processing().await {
                break;
            }
        }
    }

    /// Cancel every pending per-series timer, stop the Queue Manager's
    /// dispatch, and wait for any currently-executing task to finish.
    /// Does not interrupt that in-flight task; it simply waits it out.
    pub async fn stop(&self) {
        self.stop_token.cancel();
        for (_, token) in self.series_timers.lock().await.drain() {
            token.cancel();
        }
        self.queue_manager.stop().await;
        while self.queue_manager.is_executing().await {
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
    }

    /// Operator `trigger`: bypass every lane's cooldown and start-time
    /// wait, enqueueing a fresh check for every configured series.
    /// Non-blocking — returns once tasks are enqueued, not once they run.
    pub async fn trigger(&self) {
        self.queue_manager.reset_queues().await;
        let series = match self.context.config().await.list_series() {
            Ok(series) => series,
            Err(_) => return,
        };
        for resolved in &series {
            self.queue_manager.add_series_check(&resolved.url).await;
        }
    }

    /// Operator `reload`: re-parse the configuration file this scheduler
    /// was constructed with, atomically swap the registry in
    /// [`AppContext`], and reconcile every lane's registered cooldown so
    /// it reflects the new values. An in-flight task keeps running
    /// against the registry it read at entry.
    pub async fn reload(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.config_path else {
            return Err(ConfigError::Parse(
                "reload requested but no config path was provided".to_string(),
            ));
        };
        self.context.reload_config_from_file(path).await?;
        self.queue_manager.reconcile_lane_cooldowns().await;
        Ok(())
    }

    async fn arm_series_timer(self: &Arc<Self>, url: String) {
        let schedule = match self.context.config().await.resolve_series(&url) {
            Ok(resolved) => resolved.schedule,
            Err(_) => return,
        };
        let delay = delay_until_next(&schedule, Local::now());

        let token = CancellationToken::new();
        self.series_timers.lock().await.insert(url.clone(), token.clone());

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    this.queue_manager.add_series_check(&url).await;
                    this.arm_series_timer(url).await;
                }
                () = token.cancelled() => {}
            }
        });
    }
}

/// How long to wait, from `now`, until `schedule` next fires.
///
/// `StartTime` rolls over to the next calendar day once today's
/// occurrence has already passed. `Cron` defers to the `cron` crate's
/// own upcoming-occurrence search.
fn delay_until_next(schedule: &Schedule, now: DateTime<Local>) -> StdDuration {
    match schedule {
        Schedule::StartTime(hhmm) => {
            let Some(time) = parse_hh_mm(hhmm) else {
                return StdDuration::from_secs(60);
            };
            let today = now
                .date_naive()
                .and_time(time)
                .and_local_timezone(Local)
                .single();
            let next = match today {
                Some(candidate) if candidate > now => candidate,
                Some(candidate) => candidate + chrono::Duration::days(1),
                None => now + chrono::Duration::days(1),
            };
            (next - now).to_std().unwrap_or(StdDuration::ZERO)
        }
        Schedule::Cron(expr) => {
            let six_field = format!("0 {expr}");
            match std::str::FromStr::from_str(&six_field) {
                Ok(parsed) => {
                    let schedule: cron::Schedule = parsed;
                    match schedule.upcoming(Local).next() {
                        Some(next) => (next - now).to_std().unwrap_or(StdDuration::ZERO),
                        None => StdDuration::from_secs(60),
                    }
                }
                Err(_) => StdDuration::from_secs(60),
            }
        }
    }
}

fn parse_hh_mm(value: &str) -> Option<NaiveTime> {
    let (h, m) = value.split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ConsoleNotifier, NoOpCookieRefresher};
    use crate::config::resolver::ConfigResolver;
    use crate::config::{ConfigDocument, PartialSectionConfig, SeriesDocument};
    use crate::downloaded_index::DownloadedIndex;

    fn doc_with_start_time(start_time: &str) -> ConfigDocument {
        ConfigDocument {
            series: vec![SeriesDocument {
                name: "Example Show".to_string(),
                url: "https://example.com/show/1".to_string(),
                start_time: Some(start_time.to_string()),
                cron: None,
                overrides: PartialSectionConfig::default(),
            }],
            global_config: PartialSectionConfig::default(),
            domain_configs: vec![],
        }
    }

    async fn context(doc: &ConfigDocument) -> Arc<AppContext> {
        let resolver = Arc::new(ConfigResolver::build(doc).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(DownloadedIndex::load(dir.path().join("index.json")).await.unwrap());
        Arc::new(AppContext::new(
            resolver,
            Arc::new(ConsoleNotifier),
            index,
            Arc::new(NoOpCookieRefresher),
        ))
    }

    #[test]
    fn start_time_in_the_future_today_waits_within_24h() {
        let now = Local.with_ymd_and_hms(2026, 7, 28, 8, 0, 0).single().unwrap();
        let delay = delay_until_next(&Schedule::StartTime("09:00".to_string()), now);
        assert_eq!(delay, StdDuration::from_secs(3600));
    }

    #[test]
    fn start_time_already_passed_today_rolls_to_tomorrow() {
        let now = Local.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).single().unwrap();
        let delay = delay_until_next(&Schedule::StartTime("09:00".to_string()), now);
        assert_eq!(delay, StdDuration::from_secs(23 * 3600));
    }

    #[test]
    fn cron_schedule_resolves_to_a_future_occurrence() {
        let now = Local::now();
        let delay = delay_until_next(&Schedule::Cron("0 * * * *".to_string()), now);
        assert!(delay <= StdDuration::from_secs(3600));
    }

    #[tokio::test]
    async fn once_mode_drains_queue_and_returns() {
        let doc = doc_with_start_time("08:00");
        let ctx = context(&doc).await;
        let manager = QueueManager::new(ctx.clone());
        let scheduler = SessionScheduler::new(ctx, manager, true, None, None);
        // No adapters registered: the check executor fails immediately
        // and marks the task terminal without requeue, so the queue
        // still drains promptly.
        scheduler.run().await.unwrap();
    }

    #[tokio::test]
    async fn trigger_enqueues_a_fresh_check_bypassing_cooldown() {
        let doc = doc_with_start_time("08:00");
        let ctx = context(&doc).await;
        let manager = QueueManager::new(ctx.clone());
        let scheduler = SessionScheduler::new(ctx, manager.clone(), false, None, None);
        manager.start().await;
        scheduler.trigger().await;
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        // With no scraping adapter registered the check fails and
        // terminates without requeue; asserting no panic and that the
        // manager remains idle afterward is the property under test.
        assert!(!manager.has_active_processing().await);
    }

    #[tokio::test]
    async fn reload_without_a_config_path_fails() {
        let doc = doc_with_start_time("08:00");
        let ctx = context(&doc).await;
        let manager = QueueManager::new(ctx.clone());
        let scheduler = SessionScheduler::new(ctx, manager, false, None, None);
        assert!(scheduler.reload().await.is_err());
    }

    #[tokio::test]
    async fn stop_before_run_does_not_hang() {
        let doc = doc_with_start_time("08:00");
        let ctx = context(&doc).await;
        let manager = QueueManager::new(ctx.clone());
        let scheduler = SessionScheduler::new(ctx, manager, false, None, None);
        scheduler.stop().await;
    }
}
