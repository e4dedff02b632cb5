//! Metadata provider clients
//!
//! Every provider implements [`MetadataProvider`]: fetch one entity by id or
//! slug, or search entities by name with a given [`SearchStrategy`]. Providers
//! may be live HTTP APIs (rate-limited) or locally loaded bulk dumps.
//!
//! Providers without a search client (vote-only providers) are simply absent
//! from the [`ProviderRegistry`].

pub mod igdb;
pub mod local_dump;

pub use igdb::IgdbClient;
pub use local_dump::{DumpRecord, DumpRecords, LocalDumpProvider};

use crate::models::{MetadataSource, ObjectType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Provider client errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unsupported entity kind {kind} for {provider}")]
    Unsupported {
        provider: MetadataSource,
        kind: EntityKind,
    },
}

/// Provider entity types the cache and matcher work with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Game,
    Platform,
    Company,
    Cover,
    Screenshot,
    Artwork,
    AgeRating,
    PlatformLogo,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Game => "Game",
            EntityKind::Platform => "Platform",
            EntityKind::Company => "Company",
            EntityKind::Cover => "Cover",
            EntityKind::Screenshot => "Screenshot",
            EntityKind::Artwork => "Artwork",
            EntityKind::AgeRating => "AgeRating",
            EntityKind::PlatformLogo => "PlatformLogo",
        }
    }

    /// Entity kind searched for a canonical object type
    pub fn for_object_type(object_type: ObjectType) -> Option<EntityKind> {
        match object_type {
            ObjectType::Game => Some(EntityKind::Game),
            ObjectType::Platform => Some(EntityKind::Platform),
            ObjectType::Company => Some(EntityKind::Company),
            ObjectType::App | ObjectType::Rom => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name search strategy, tried in [`SearchStrategy::ORDERED`] order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchStrategy {
    /// Name equals the query exactly
    ExactPhrase,
    /// Name contains the query (wildcard both sides, case-insensitive)
    Fuzzy,
    /// Name equals the query ignoring case
    CaseInsensitiveExact,
}

impl SearchStrategy {
    pub const ORDERED: [SearchStrategy; 3] = [
        SearchStrategy::ExactPhrase,
        SearchStrategy::Fuzzy,
        SearchStrategy::CaseInsensitiveExact,
    ];
}

/// One provider entity as returned by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntity {
    /// Provider id, stringified
    pub id: String,
    pub slug: Option<String>,
    /// Display name; empty for nameless entities (covers, ratings)
    pub name: String,
    /// Raw provider record
    pub payload: serde_json::Value,
}

/// Provider call contract
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Provider this client talks to
    fn source(&self) -> MetadataSource;

    /// Fetch one entity; `Ok(None)` when the provider has no such entity
    async fn fetch_by_id_or_slug(
        &self,
        kind: EntityKind,
        id_or_slug: &str,
    ) -> Result<Option<ProviderEntity>, ProviderError>;

    /// Search entities by name. `platform` restricts game searches to one
    /// provider platform id.
    async fn search_by_name(
        &self,
        kind: EntityKind,
        query: &str,
        strategy: SearchStrategy,
        platform: Option<&str>,
    ) -> Result<Vec<ProviderEntity>, ProviderError>;
}

/// Configured provider clients, keyed by source
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<MetadataSource, Arc<dyn MetadataProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, replacing any previous client for the same source
    pub fn register(&mut self, provider: Arc<dyn MetadataProvider>) {
        self.providers.insert(provider.source(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, source: MetadataSource) -> Option<Arc<dyn MetadataProvider>> {
        self.providers.get(&source).cloned()
    }

    /// Sources with a search-capable client, in stable order
    pub fn sources(&self) -> Vec<MetadataSource> {
        self.providers.keys().copied().collect()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("sources", &self.sources())
            .finish()
    }
}
