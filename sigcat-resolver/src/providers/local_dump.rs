//! Provider backed by a locally loaded bulk dump
//!
//! TheGamesDb publishes its catalog as one JSON document. The dump is loaded
//! once into memory and searched there; no network calls are made.
//!
//! Accepted layout (records may also be nested under a `data` object):
//!
//! ```json
//! {
//!   "platforms": [{ "id": 7, "name": "Nintendo Entertainment System (NES)", "alias": "nes" }],
//!   "companies": [{ "id": 1, "name": "Nintendo" }],
//!   "games":     [{ "id": 1, "game_title": "Contra", "platform": 7 }]
//! }
//! ```

use super::{EntityKind, MetadataProvider, ProviderEntity, ProviderError, SearchStrategy};
use crate::models::MetadataSource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One dump record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpRecord {
    pub id: i64,
    #[serde(alias = "game_title")]
    pub name: String,
    #[serde(default, alias = "alias")]
    pub slug: Option<String>,
    /// Platform id, games only
    #[serde(default, alias = "platform_id")]
    pub platform: Option<i64>,
}

impl DumpRecord {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            slug: None,
            platform: None,
        }
    }

    pub fn on_platform(mut self, platform: i64) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_slug(mut self, slug: &str) -> Self {
        self.slug = Some(slug.to_string());
        self
    }

    fn to_entity(&self) -> ProviderEntity {
        ProviderEntity {
            id: self.id.to_string(),
            slug: self.slug.clone(),
            name: self.name.clone(),
            payload: serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Records grouped by entity kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DumpRecords {
    #[serde(default)]
    pub platforms: Vec<DumpRecord>,
    #[serde(default, alias = "publishers", alias = "developers")]
    pub companies: Vec<DumpRecord>,
    #[serde(default)]
    pub games: Vec<DumpRecord>,
}

#[derive(Debug, Deserialize)]
struct DumpFile {
    #[serde(flatten)]
    records: DumpRecords,
    #[serde(default)]
    data: Option<DumpRecords>,
}

/// In-memory provider over a bulk dump
pub struct LocalDumpProvider {
    source: MetadataSource,
    records: DumpRecords,
}

impl LocalDumpProvider {
    pub fn from_records(source: MetadataSource, records: DumpRecords) -> Self {
        Self { source, records }
    }

    /// Load and parse a dump file
    pub fn from_path(source: MetadataSource, path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::NotConfigured(format!("Read dump {} failed: {}", path.display(), e))
        })?;
        let file: DumpFile = serde_json::from_str(&content)
            .map_err(|e| ProviderError::Parse(format!("Dump {}: {}", path.display(), e)))?;

        let mut records = file.records;
        if let Some(nested) = file.data {
            records.platforms.extend(nested.platforms);
            records.companies.extend(nested.companies);
            records.games.extend(nested.games);
        }

        info!(
            %source,
            platforms = records.platforms.len(),
            companies = records.companies.len(),
            games = records.games.len(),
            "Loaded provider dump"
        );
        Ok(Self::from_records(source, records))
    }

    fn records(&self, kind: EntityKind) -> Result<&[DumpRecord], ProviderError> {
        match kind {
            EntityKind::Platform => Ok(&self.records.platforms),
            EntityKind::Company => Ok(&self.records.companies),
            EntityKind::Game => Ok(&self.records.games),
            _ => Err(ProviderError::Unsupported {
                provider: self.source,
                kind,
            }),
        }
    }
}

fn name_matches(name: &str, query: &str, strategy: SearchStrategy) -> bool {
    match strategy {
        SearchStrategy::ExactPhrase => name == query,
        SearchStrategy::Fuzzy => name.to_lowercase().contains(&query.to_lowercase()),
        SearchStrategy::CaseInsensitiveExact => name.to_lowercase() == query.to_lowercase(),
    }
}

#[async_trait]
impl MetadataProvider for LocalDumpProvider {
    fn source(&self) -> MetadataSource {
        self.source
    }

    async fn fetch_by_id_or_slug(
        &self,
        kind: EntityKind,
        id_or_slug: &str,
    ) -> Result<Option<ProviderEntity>, ProviderError> {
        let key = id_or_slug.trim();
        let found = self.records(kind)?.iter().find(|r| {
            r.id.to_string() == key || r.slug.as_deref().is_some_and(|s| s == key)
        });
        Ok(found.map(DumpRecord::to_entity))
    }

    async fn search_by_name(
        &self,
        kind: EntityKind,
        query: &str,
        strategy: SearchStrategy,
        platform: Option<&str>,
    ) -> Result<Vec<ProviderEntity>, ProviderError> {
        let platform: Option<i64> = match (kind, platform) {
            (EntityKind::Game, Some(p)) => p.parse().ok(),
            _ => None,
        };

        Ok(self
            .records(kind)?
            .iter()
            .filter(|r| name_matches(&r.name, query, strategy))
            .filter(|r| platform.is_none() || r.platform == platform)
            .map(DumpRecord::to_entity)
            .collect())
    }
}
