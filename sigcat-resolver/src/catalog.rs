//! Catalog facade
//!
//! Wires the provider registry, caches and services over one database pool and
//! exposes the inbound operations. Every operation runs inside the span of the
//! caller's [`RunContext`].

use crate::context::RunContext;
use crate::db::{links, objects};
use crate::models::{CanonicalObject, HashQuery, MetadataLink, MetadataSource, ObjectType};
use crate::providers::{IgdbClient, LocalDumpProvider, ProviderRegistry};
use crate::services::voting::{TallyReport, VotePair, VoteSubmission, VoteTarget};
use crate::services::{
    hash_resolver, merge, ArtworkFetcher, MatchOutcome, MergeOutcome, MetadataMatcher,
    ObjectResolver, ProviderCache, ResolvedSignature, SweepReport, VotingService,
};
use crate::{Error, Result};
use serde::Serialize;
use sigcat_common::config::TomlConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Instrument};

/// Default cap on (object, provider) pairs visited by one bulk search
pub const DEFAULT_SWEEP_LIMIT: u32 = 10_000;

/// Result of a hash lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupResult {
    pub object: CanonicalObject,
    pub platform: Option<CanonicalObject>,
    pub publisher: Option<CanonicalObject>,
    pub signature: ResolvedSignature,
    pub metadata_links: Vec<MetadataLink>,
}

/// Result of `search_metadata`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "result")]
pub enum SearchResult {
    Single(Vec<MatchOutcome>),
    Sweep(SweepReport),
}

/// Shared catalog state
#[derive(Clone)]
pub struct Catalog {
    pub pool: SqlitePool,
    pub registry: ProviderRegistry,
    matcher: MetadataMatcher,
    resolver: ObjectResolver,
    voting: VotingService,
    sweep_limit: u32,
}

impl Catalog {
    pub fn new(pool: SqlitePool, registry: ProviderRegistry, sync_timeout: Duration) -> Self {
        let cache = ProviderCache::new(pool.clone(), registry.clone());
        let artwork = ArtworkFetcher::new(cache.clone());
        let matcher =
            MetadataMatcher::new(pool.clone(), registry.clone(), artwork.clone(), sync_timeout);
        let resolver = ObjectResolver::new(pool.clone(), matcher.clone());
        let voting = VotingService::new(pool.clone(), cache.clone(), resolver.clone(), artwork);

        Self {
            pool,
            registry,
            matcher,
            resolver,
            voting,
            sweep_limit: DEFAULT_SWEEP_LIMIT,
        }
    }

    /// Build the catalog with the providers the configuration enables.
    ///
    /// A provider that cannot be constructed is skipped with a warning; the
    /// catalog still starts.
    pub fn from_config(pool: SqlitePool, config: &TomlConfig) -> Self {
        let registry = build_registry(config);
        info!(sources = ?registry.sources(), "Metadata providers configured");

        let mut catalog = Self::new(
            pool,
            registry,
            Duration::from_secs(config.matcher.sync_timeout_seconds),
        );
        catalog.sweep_limit = config.scheduler.sweep_limit;
        catalog
    }

    pub fn sweep_limit(&self) -> u32 {
        self.sweep_limit
    }

    pub fn matcher(&self) -> &MetadataMatcher {
        &self.matcher
    }

    pub fn voting(&self) -> &VotingService {
        &self.voting
    }

    /// Resolve hashes to a signature and its canonical game object
    pub async fn lookup_by_hash(&self, ctx: &RunContext, query: &HashQuery) -> Result<LookupResult> {
        async {
            let signature = hash_resolver::resolve(&self.pool, query).await?;
            let resolved = self.resolver.resolve(&signature.game).await?;
            let metadata_links = resolved.game.metadata_links.clone();

            info!(
                object_id = resolved.game.id,
                rom_id = signature.rom.id,
                "Hash lookup resolved"
            );

            Ok::<_, Error>(LookupResult {
                object: resolved.game,
                platform: resolved.platform,
                publisher: resolved.publisher,
                signature,
                metadata_links,
            })
        }
        .instrument(ctx.span())
        .await
    }

    /// Search one object across providers, or sweep stale objects of a type
    pub async fn search_metadata(
        &self,
        ctx: &RunContext,
        object_type: ObjectType,
        object_id: Option<i64>,
        force: bool,
    ) -> Result<SearchResult> {
        async {
            if !object_type.supports_metadata() {
                return Err(Error::InvalidInput(format!(
                    "{} objects have no metadata links",
                    object_type
                )));
            }

            let Some(object_id) = object_id else {
                let report = self.matcher.sweep(object_type, self.sweep_limit).await?;
                return Ok(SearchResult::Sweep(report));
            };

            let actual = objects::object_type_of(&self.pool, object_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("object {}", object_id)))?;
            if actual != object_type {
                return Err(Error::InvalidInput(format!(
                    "object {} is a {}, not a {}",
                    object_id, actual, object_type
                )));
            }

            links::ensure_links(&self.pool, object_id).await?;
            Ok::<_, Error>(SearchResult::Single(
                self.matcher.search_all(object_id, force).await,
            ))
        }
        .instrument(ctx.span())
        .await
    }

    pub async fn submit_vote(
        &self,
        ctx: &RunContext,
        user_id: &str,
        target: &VoteTarget,
        pairs: &[VotePair],
    ) -> Result<VoteSubmission> {
        self.voting
            .submit(ctx, user_id, target, pairs)
            .instrument(ctx.span())
            .await
    }

    pub async fn tally_votes(&self, ctx: &RunContext) -> Result<TallyReport> {
        self.voting.tally().instrument(ctx.span()).await
    }

    pub async fn merge_objects(
        &self,
        ctx: &RunContext,
        source_id: i64,
        target_id: i64,
        commit: bool,
    ) -> Result<MergeOutcome> {
        merge::merge_objects(&self.pool, source_id, target_id, commit)
            .instrument(ctx.span())
            .await
    }

    /// Create missing NoMatch links for every metadata-capable object
    pub async fn backfill_links(&self, ctx: &RunContext) -> Result<u64> {
        async {
            let created = links::backfill_missing(&self.pool).await?;
            info!(created, "Metadata link backfill finished");
            Ok::<_, Error>(created)
        }
        .instrument(ctx.span())
        .await
    }
}

fn build_registry(config: &TomlConfig) -> ProviderRegistry {
    let enabled = |source: MetadataSource| {
        config
            .providers
            .enabled
            .iter()
            .any(|name| name.trim().eq_ignore_ascii_case(source.as_str()))
    };

    let mut registry = ProviderRegistry::new();

    if enabled(MetadataSource::IGDB) {
        match IgdbClient::from_config(&config.igdb) {
            Ok(client) => registry.register(Arc::new(client)),
            Err(e) => warn!(error = %e, "IGDB client disabled"),
        }
    }

    if enabled(MetadataSource::TheGamesDb) {
        match config.thegamesdb.dump_path.as_deref() {
            Some(path) => match LocalDumpProvider::from_path(MetadataSource::TheGamesDb, path) {
                Ok(provider) => registry.register(Arc::new(provider)),
                Err(e) => warn!(path = %path.display(), error = %e, "TheGamesDb dump not loaded"),
            },
            None => warn!("TheGamesDb enabled but no dump_path configured"),
        }
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_skips_unconfigured_providers() {
        let mut config = TomlConfig::default();
        config.igdb.client_id = None;
        config.thegamesdb.dump_path = None;
        assert!(build_registry(&config).sources().is_empty());
    }

    #[test]
    fn test_registry_loads_enabled_dump() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tgdb.json");
        std::fs::write(
            &path,
            r#"{"platforms": [{"id": 7, "name": "NES"}], "companies": [], "games": []}"#,
        )
        .unwrap();

        let mut config = TomlConfig::default();
        config.thegamesdb.dump_path = Some(path.clone());
        assert_eq!(build_registry(&config).sources(), vec![MetadataSource::TheGamesDb]);

        config.providers.enabled = vec!["IGDB".to_string()];
        assert!(build_registry(&config).sources().is_empty());
    }
}
