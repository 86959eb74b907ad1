//! The Configuration Resolver: deep-merges the four-level hierarchy
//! (defaults ⊕ global ⊕ domain ⊕ series) into a [`ResolvedConfig`] per
//! series, eagerly, at construction time.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use regex::Regex;

use super::{
    ConfigDocument, PartialCheckConfig, PartialDownloadConfig, PartialSectionConfig,
    ResolvedCheckConfig, ResolvedConfig, ResolvedDownloadConfig, Schedule, SeriesDocument,
    builtin_defaults,
};
use crate::error::ConfigError;

/// How far up the four-level hierarchy to merge before finalizing.
/// `Series` (the default used throughout the rest of the crate) is the
/// full merge; `Global`/`Domain` are exposed for introspection/debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveLevel {
    /// defaults ⊕ global only.
    Global,
    /// defaults ⊕ global ⊕ domain.
    Domain,
    /// defaults ⊕ global ⊕ domain ⊕ series (the full merge).
    Series,
}

struct Entry {
    doc: SeriesDocument,
    domain: String,
    merged_global: PartialSectionConfig,
    merged_domain: PartialSectionConfig,
    merged_series: PartialSectionConfig,
}

/// Merges the configuration hierarchy and answers lookups against the
/// resulting flat view. The only component in the crate that performs
/// hierarchical merging — everything downstream reads [`ResolvedConfig`].
pub struct ConfigResolver {
    entries: HashMap<String, Entry>,
    domains: Vec<String>,
}

impl ConfigResolver {
    /// Validate and eagerly merge every series in `doc`.
    pub fn build(doc: &ConfigDocument) -> Result<Self, ConfigError> {
        if doc.series.is_empty() {
            return Err(ConfigError::NoSeries);
        }

        let defaults = builtin_defaults();
        let merged_global = merge_section(&defaults, &doc.global_config);

        let mut domain_overrides: HashMap<&str, &PartialSectionConfig> = HashMap::new();
        for domain_doc in &doc.domain_configs {
            domain_overrides.insert(domain_doc.domain.as_str(), &domain_doc.overrides);
        }

        let mut entries = HashMap::new();
        let mut domains: BTreeMap<String, ()> = BTreeMap::new();

        for series in &doc.series {
            let parsed = url::Url::parse(&series.url).map_err(|e| ConfigError::InvalidUrl {
                url: series.url.clone(),
                reason: e.to_string(),
            })?;
            let domain = parsed
                .host_str()
                .ok_or_else(|| ConfigError::InvalidUrl {
                    url: series.url.clone(),
                    reason: "url has no host".to_string(),
                })?
                .to_string();
            domains.insert(domain.clone(), ());

            let merged_domain = match domain_overrides.get(domain.as_str()) {
                Some(overrides) => merge_section(&merged_global, overrides),
                None => merged_global.clone(),
            };
            let merged_series = merge_section(&merged_domain, &series.overrides);

            // Validate eagerly so construction-time errors surface before
            // the scheduler ever runs.
            finalize(series, &domain, &merged_series)?;

            entries.insert(
                series.url.clone(),
                Entry {
                    doc: series.clone(),
                    domain,
                    merged_global: merged_global.clone(),
                    merged_domain,
                    merged_series,
                },
            );
        }

        Ok(Self {
            entries,
            domains: domains.into_keys().collect(),
        })
    }

    /// Resolve `url` at the requested merge level.
    pub fn resolve(&self, url: &str, level: ResolveLevel) -> Result<ResolvedConfig, ConfigError> {
        let entry = self
            .entries
            .get(url)
            .ok_or_else(|| ConfigError::UnknownSeries(url.to_string()))?;
        let section = match level {
            ResolveLevel::Global => &entry.merged_global,
            ResolveLevel::Domain => &entry.merged_domain,
            ResolveLevel::Series => &entry.merged_series,
        };
        finalize(&entry.doc, &entry.domain, section)
    }

    /// Resolve `url` at the full (series) merge level. The operation the
    /// rest of the crate uses.
    pub fn resolve_series(&self, url: &str) -> Result<ResolvedConfig, ConfigError> {
        self.resolve(url, ResolveLevel::Series)
    }

    /// Every registered series, fully resolved.
    pub fn list_series(&self) -> Result<Vec<ResolvedConfig>, ConfigError> {
        self.entries
            .keys()
            .map(|url| self.resolve_series(url))
            .collect()
    }

    /// Every distinct domain across registered series, sorted.
    #[must_use]
    pub fn list_domains(&self) -> &[String] {
        &self.domains
    }
}

/// Right-hand wins on leaves, recurse into nested objects, replace arrays
/// wholesale.
fn merge_section(base: &PartialSectionConfig, overlay: &PartialSectionConfig) -> PartialSectionConfig {
    PartialSectionConfig {
        check: merge_check(&base.check, &overlay.check),
        download: merge_download(&base.download, &overlay.download),
        cookie_file: overlay.cookie_file.clone().or_else(|| base.cookie_file.clone()),
        cookie_refresh_browser: overlay.cookie_refresh_browser.or(base.cookie_refresh_browser),
    }
}

fn merge_check(
    base: &Option<PartialCheckConfig>,
    overlay: &Option<PartialCheckConfig>,
) -> Option<PartialCheckConfig> {
    match (base, overlay) {
        (None, None) => None,
        (Some(b), None) => Some(b.clone()),
        (None, Some(o)) => Some(o.clone()),
        (Some(b), Some(o)) => Some(PartialCheckConfig {
            count: o.count.or(b.count),
            check_interval: o.check_interval.or(b.check_interval),
            // Arrays replace wholesale, never concatenate.
            download_types: o.download_types.clone().or_else(|| b.download_types.clone()),
        }),
    }
}

fn merge_download(
    base: &Option<PartialDownloadConfig>,
    overlay: &Option<PartialDownloadConfig>,
) -> Option<PartialDownloadConfig> {
    match (base, overlay) {
        (None, None) => None,
        (Some(b), None) => Some(b.clone()),
        (None, Some(o)) => Some(o.clone()),
        (Some(b), Some(o)) => Some(PartialDownloadConfig {
            download_dir: o.download_dir.clone().or_else(|| b.download_dir.clone()),
            download_delay: o.download_delay.or(b.download_delay),
            max_retries: o.max_retries.or(b.max_retries),
            initial_timeout: o.initial_timeout.or(b.initial_timeout),
            backoff_multiplier: o.backoff_multiplier.or(b.backoff_multiplier),
            jitter_percentage: o.jitter_percentage.or(b.jitter_percentage),
            min_duration: o.min_duration.or(b.min_duration),
        }),
    }
}

fn start_time_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    #[allow(clippy::unwrap_used)]
    PATTERN.get_or_init(|| Regex::new(r"^\d{1,2}:\d{2}$").unwrap())
}

/// Validate `section` (assumed to already be the fully-merged view for
/// its level) and build the concrete [`ResolvedConfig`].
fn finalize(
    series: &SeriesDocument,
    domain: &str,
    section: &PartialSectionConfig,
) -> Result<ResolvedConfig, ConfigError> {
    let schedule = match (&series.start_time, &series.cron) {
        (Some(start_time), _) => {
            if !start_time_pattern().is_match(start_time) {
                return Err(ConfigError::InvalidStartTime {
                    series: series.name.clone(),
                    value: start_time.clone(),
                });
            }
            Schedule::StartTime(start_time.clone())
        }
        (None, Some(cron_expr)) => {
            // Validate eagerly; the `cron` crate expects a leading
            // seconds field, so prefix a literal `0` for the standard
            // five-field form this spec describes.
            let six_field = format!("0 {cron_expr}");
            cron::Schedule::from_str(&six_field).map_err(|e| ConfigError::InvalidCron {
                series: series.name.clone(),
                value: cron_expr.clone(),
                reason: e.to_string(),
            })?;
            Schedule::Cron(cron_expr.clone())
        }
        (None, None) => {
            return Err(ConfigError::InvalidRange {
                series: series.name.clone(),
                field: "startTime|cron".to_string(),
                reason: "series declares neither startTime nor cron".to_string(),
            });
        }
    };

    let check = section.check.as_ref().ok_or_else(|| ConfigError::InvalidRange {
        series: series.name.clone(),
        field: "check".to_string(),
        reason: "missing after merge with defaults".to_string(),
    })?;
    let count = check.count.unwrap_or(1);
    if count < 1 {
        return Err(ConfigError::InvalidRange {
            series: series.name.clone(),
            field: "check.count".to_string(),
            reason: "must be >= 1".to_string(),
        });
    }
    let download_types = check.download_types.clone().unwrap_or_default();

    let download = section
        .download
        .as_ref()
        .ok_or_else(|| ConfigError::InvalidRange {
            series: series.name.clone(),
            field: "download".to_string(),
            reason: "missing after merge with defaults".to_string(),
        })?;
    let backoff_multiplier = download.backoff_multiplier.unwrap_or(1.0);
    if backoff_multiplier < 1.0 {
        return Err(ConfigError::InvalidRange {
            series: series.name.clone(),
            field: "download.backoffMultiplier".to_string(),
            reason: "must be >= 1".to_string(),
        });
    }
    let jitter_percentage = download.jitter_percentage.unwrap_or(0.0);
    if !(0.0..=100.0).contains(&jitter_percentage) {
        return Err(ConfigError::InvalidRange {
            series: series.name.clone(),
            field: "download.jitterPercentage".to_string(),
            reason: "must be within [0, 100]".to_string(),
        });
    }

    Ok(ResolvedConfig {
        name: series.name.clone(),
        url: series.url.clone(),
        domain: domain.to_string(),
        schedule,
        check: ResolvedCheckConfig {
            count,
            check_interval_secs: check.check_interval.unwrap_or(600),
            download_types,
        },
        download: ResolvedDownloadConfig {
            download_dir: download.download_dir.clone().unwrap_or_default(),
            download_delay_secs: download.download_delay.unwrap_or(0),
            max_retries: download.max_retries.unwrap_or(0),
            initial_timeout_secs: download.initial_timeout.unwrap_or(0.0),
            backoff_multiplier,
            jitter_percentage,
            min_duration_secs: download.min_duration.unwrap_or(0),
        },
        cookie_file: section.cookie_file.clone(),
        cookie_refresh_browser: section.cookie_refresh_browser.unwrap_or(false),
    })
}
