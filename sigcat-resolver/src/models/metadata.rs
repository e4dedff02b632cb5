//! Provider identities, match methods and metadata links

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Third-party metadata provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetadataSource {
    IGDB,
    TheGamesDb,
    RetroAchievements,
    GiantBomb,
    Wikipedia,
}

impl MetadataSource {
    /// Every known provider; each metadata-capable object gets one link per entry
    pub const ALL: [MetadataSource; 5] = [
        MetadataSource::IGDB,
        MetadataSource::TheGamesDb,
        MetadataSource::RetroAchievements,
        MetadataSource::GiantBomb,
        MetadataSource::Wikipedia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataSource::IGDB => "IGDB",
            MetadataSource::TheGamesDb => "TheGamesDb",
            MetadataSource::RetroAchievements => "RetroAchievements",
            MetadataSource::GiantBomb => "GiantBomb",
            MetadataSource::Wikipedia => "Wikipedia",
        }
    }

    /// Parse a stored tag; unknown tags indicate corrupted state
    pub fn from_stored(s: &str) -> Result<Self> {
        s.parse()
            .map_err(|_| Error::Fatal(format!("invalid metadata source '{}'", s)))
    }
}

impl fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MetadataSource::ALL
            .iter()
            .copied()
            .find(|source| source.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("unknown metadata source '{}'", s)))
    }
}

/// Provenance of a metadata link's provider id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchMethod {
    NoMatch,
    Automatic,
    AutomaticTooManyMatches,
    Manual,
    ManualByAdmin,
    Voted,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::NoMatch => "NoMatch",
            MatchMethod::Automatic => "Automatic",
            MatchMethod::AutomaticTooManyMatches => "AutomaticTooManyMatches",
            MatchMethod::Manual => "Manual",
            MatchMethod::ManualByAdmin => "ManualByAdmin",
            MatchMethod::Voted => "Voted",
        }
    }

    /// Manual links are never changed by the matcher or the vote tally
    pub fn is_manual(&self) -> bool {
        matches!(self, MatchMethod::Manual | MatchMethod::ManualByAdmin)
    }

    /// Whether a platform link with this method can anchor a game search
    pub fn anchors_game_search(&self) -> bool {
        matches!(
            self,
            MatchMethod::Automatic | MatchMethod::Manual | MatchMethod::ManualByAdmin
        )
    }

    /// Parse a stored tag; unknown tags indicate corrupted state
    pub fn from_stored(s: &str) -> Result<Self> {
        match s {
            "NoMatch" => Ok(MatchMethod::NoMatch),
            "Automatic" => Ok(MatchMethod::Automatic),
            "AutomaticTooManyMatches" => Ok(MatchMethod::AutomaticTooManyMatches),
            "Manual" => Ok(MatchMethod::Manual),
            "ManualByAdmin" => Ok(MatchMethod::ManualByAdmin),
            "Voted" => Ok(MatchMethod::Voted),
            other => Err(Error::Fatal(format!("invalid match method '{}'", other))),
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link between one canonical object and one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataLink {
    pub object_id: i64,
    pub source: MetadataSource,
    /// Provider id; empty string means unset
    pub provider_id: String,
    pub match_method: MatchMethod,
    pub last_searched: Option<DateTime<Utc>>,
    pub next_search: Option<DateTime<Utc>>,
    pub winning_vote_count: i64,
    pub total_vote_count: i64,
}

impl MetadataLink {
    /// Fresh NoMatch link, never searched
    pub fn unset(object_id: i64, source: MetadataSource) -> Self {
        Self {
            object_id,
            source,
            provider_id: String::new(),
            match_method: MatchMethod::NoMatch,
            last_searched: None,
            next_search: None,
            winning_vote_count: 0,
            total_vote_count: 0,
        }
    }

    pub fn has_provider_id(&self) -> bool {
        !self.provider_id.is_empty()
    }

    /// Cooldown has elapsed (or the link was never searched)
    pub fn search_due(&self, now: DateTime<Utc>) -> bool {
        self.next_search.map_or(true, |next| next < now)
    }
}
