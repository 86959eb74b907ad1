//! Application Context: the process-wide handle to the resolved
//! configuration, notifier, and downloaded-episode state.
//!
//! `reload_config` swaps the configuration registry atomically so a
//! reload is observed on the next task without mid-task inconsistency —
//! each executor invocation reads the handle once at entry (see
//! [`crate::queue_manager::QueueManager`]).

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::adapters::{CookieRefresher, Notifier};
use crate::config::resolver::ConfigResolver;
use crate::downloaded_index::DownloadedIndex;
use crate::error::ConfigError;

/// Process-wide collaborators shared by the Session Scheduler and the
/// Queue Manager.
pub struct AppContext {
    config: RwLock<Arc<ConfigResolver>>,
    notifier: Arc<dyn Notifier>,
    downloaded_index: Arc<DownloadedIndex>,
    cookie_refresher: Arc<dyn CookieRefresher>,
}

impl AppContext {
    /// Build a new context from an already-resolved configuration.
    #[must_use]
    pub fn new(
        config: Arc<ConfigResolver>,
        notifier: Arc<dyn Notifier>,
        downloaded_index: Arc<DownloadedIndex>,
        cookie_refresher: Arc<dyn CookieRefresher>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            notifier,
            downloaded_index,
            cookie_refresher,
        }
    }

    /// The currently-active configuration registry.
    pub async fn config(&self) -> Arc<ConfigResolver> {
        self.config.read().await.clone()
    }

    /// Atomically replace the configuration registry. Takes effect for
    /// every task dispatched after this call returns; any task already
    /// in flight keeps running against the registry it read at entry.
    pub async fn reload_config(&self, new_config: Arc<ConfigResolver>) {
        *self.config.write().await = new_config;
    }

    /// Re-parse `path` and swap it in, surfacing any validation failure
    /// without disturbing the currently-active registry.
    pub async fn reload_config_from_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let doc = crate::config::loader::load(path)?;
        let resolved = ConfigResolver::build(&doc)?;
        self.reload_config(Arc::new(resolved)).await;
        Ok(())
    }

    /// The shared notifier.
    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// The shared downloaded-episode index.
    #[must_use]
    pub fn downloaded_index(&self) -> &Arc<DownloadedIndex> {
        &self.downloaded_index
    }

    /// The shared cookie-refresh collaborator.
    #[must_use]
    pub fn cookie_refresher(&self) -> &Arc<dyn CookieRefresher> {
        &self.cookie_refresher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ConsoleNotifier, NoOpCookieRefresher};
    use crate::config::{ConfigDocument, PartialSectionConfig, SeriesDocument};

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

    async fn context() -> AppContext {
        let resolver = Arc::new(ConfigResolver::build(&doc()).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(DownloadedIndex::load(dir.path().join("index.json")).await.unwrap());
        AppContext::new(resolver, Arc::new(ConsoleNotifier), index, Arc::new(NoOpCookieRefresher))
    }

    #[tokio::test]
    async fn reload_swaps_registry_atomically() {
        let ctx = context().await;
        let before = ctx.config().await;
        assert_eq!(before.list_domains(), &["example.com".to_string()]);

        let mut other_doc = doc();
        other_doc.series[0].url = "https://other.example/show/2".to_string();
        let after = Arc::new(ConfigResolver::build(&other_doc).unwrap());
        ctx.reload_config(after).await;

        let now = ctx.config().await;
        assert_eq!(now.list_domains(), &["other.example".to_string()]);
    }
}
