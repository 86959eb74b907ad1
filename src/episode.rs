//! Episode data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The availability class a scraping adapter assigns to a discovered
/// episode. `downloadTypes` in the resolved config filters on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeType {
    /// Freely available, no paywall or teaser restriction.
    Available,
    /// Requires a VIP/premium account.
    Vip,
    /// A short preview clip rather than the full episode.
    Teaser,
    /// Available via an "express" early-access tier.
    Express,
    /// A low-resolution or watermarked preview.
    Preview,
    /// Present on the page but not yet unlockable.
    Locked,
}

/// An episode discovered by a scraping adapter.
///
/// Uniqueness within a series is by `number`; adapters are responsible for
/// de-duplicating before returning their result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Episode number within its series. Positive.
    pub number: u32,
    /// Direct or page URL for the episode.
    pub url: String,
    /// Availability class.
    pub episode_type: EpisodeType,
    /// Optional human-readable title.
    pub title: Option<String>,
    /// When the scraping adapter extracted this episode.
    pub extracted_at: DateTime<Utc>,
}

impl Episode {
    /// Zero-padded episode number as stored in the downloaded-index file
    /// (e.g. `5` -> `"0005"`).
    #[must_use]
    pub fn padded_number(&self) -> String {
        format!("{:04}", self.number)
    }
}
