//! Provider metadata cache
//!
//! Stores one provider entity per (provider, entity kind, id-or-slug) with a
//! per-kind TTL. Reads classify the cached row as NotPresent, Expired or
//! Current:
//! - NotPresent: fetch, store, warm nested sub-entities, return fresh
//! - Expired: refetch and overwrite; on failure return the stale copy
//! - Current: return the cached copy without a network call

use crate::db::provider_cache as rows;
use crate::models::MetadataSource;
use crate::providers::{EntityKind, ProviderEntity, ProviderError, ProviderRegistry};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use tracing::{debug, warn};

/// Cached row classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    NotPresent,
    Expired,
    Current,
}

/// Time a cached entity of this kind stays current
pub fn ttl(kind: EntityKind) -> Duration {
    match kind {
        EntityKind::Game => Duration::days(7),
        EntityKind::Platform | EntityKind::Company => Duration::days(30),
        EntityKind::Cover
        | EntityKind::Screenshot
        | EntityKind::Artwork
        | EntityKind::PlatformLogo => Duration::days(30),
        EntityKind::AgeRating => Duration::days(90),
    }
}

/// Payload fields referencing sub-entities warmed alongside a new entity
pub fn nested_refs(kind: EntityKind) -> &'static [(&'static str, EntityKind)] {
    match kind {
        EntityKind::Game => &[
            ("cover", EntityKind::Cover),
            ("age_ratings", EntityKind::AgeRating),
            ("screenshots", EntityKind::Screenshot),
            ("artworks", EntityKind::Artwork),
        ],
        EntityKind::Platform => &[("platform_logo", EntityKind::PlatformLogo)],
        _ => &[],
    }
}

/// Classify a cached row's age
pub fn classify(last_fetched: Option<DateTime<Utc>>, kind: EntityKind, now: DateTime<Utc>) -> Freshness {
    match last_fetched {
        None => Freshness::NotPresent,
        Some(fetched) if fetched + ttl(kind) <= now => Freshness::Expired,
        Some(_) => Freshness::Current,
    }
}

/// Ids referenced by a payload field (scalar id or array of ids)
pub(crate) fn referenced_ids(payload: &serde_json::Value, field: &str) -> Vec<String> {
    let as_id = |v: &serde_json::Value| match v {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    };

    match payload.get(field) {
        Some(serde_json::Value::Array(items)) => items.iter().filter_map(as_id).collect(),
        Some(value) => as_id(value).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Read-through cache in front of the registered provider clients
#[derive(Clone)]
pub struct ProviderCache {
    pool: SqlitePool,
    providers: ProviderRegistry,
}

impl ProviderCache {
    pub fn new(pool: SqlitePool, providers: ProviderRegistry) -> Self {
        Self { pool, providers }
    }

    /// Freshness of the cached copy, without fetching
    pub async fn freshness(&self, source: MetadataSource, kind: EntityKind, key: &str) -> Result<Freshness> {
        let cached = rows::get(&self.pool, source, kind, key).await?;
        Ok(classify(cached.map(|c| c.last_fetched), kind, Utc::now()))
    }

    /// Get one entity, fetching through the provider when needed.
    ///
    /// `Ok(None)` means the provider has no such entity and nothing is cached.
    pub fn get_entity<'a>(
        &'a self,
        source: MetadataSource,
        kind: EntityKind,
        id_or_slug: &'a str,
    ) -> BoxFuture<'a, Result<Option<ProviderEntity>>> {
        async move {
            let key = id_or_slug.trim();
            if key.is_empty() {
                return Ok(None);
            }

            let cached = rows::get(&self.pool, source, kind, key).await?;
            let now = Utc::now();

            match classify(cached.as_ref().map(|c| c.last_fetched), kind, now) {
                Freshness::Current => {
                    let entity = cached.map(|c| serde_json::from_value(c.payload)).transpose()?;
                    Ok(entity)
                }
                Freshness::NotPresent => {
                    let Some(entity) = self.fetch(source, kind, key).await? else {
                        return Ok(None);
                    };
                    self.store(source, kind, key, &entity, now).await?;
                    self.warm_nested(source, kind, &entity).await;
                    Ok(Some(entity))
                }
                Freshness::Expired => {
                    let stale: Option<ProviderEntity> =
                        cached.map(|c| serde_json::from_value(c.payload)).transpose()?;
                    match self.fetch(source, kind, key).await {
                        Ok(Some(entity)) => {
                            self.store(source, kind, key, &entity, now).await?;
                            Ok(Some(entity))
                        }
                        Ok(None) => {
                            warn!(%source, %kind, key, "Provider no longer returns entity, serving stale copy");
                            Ok(stale)
                        }
                        Err(e) => {
                            warn!(%source, %kind, key, error = %e, "Refetch failed, serving stale copy");
                            Ok(stale)
                        }
                    }
                }
            }
        }
        .boxed()
    }

    /// Typed view of an entity's raw provider payload
    pub async fn get<T: DeserializeOwned>(
        &self,
        source: MetadataSource,
        kind: EntityKind,
        id_or_slug: &str,
    ) -> Result<Option<T>> {
        match self.get_entity(source, kind, id_or_slug).await? {
            Some(entity) => Ok(Some(serde_json::from_value(entity.payload)?)),
            None => Ok(None),
        }
    }

    async fn fetch(
        &self,
        source: MetadataSource,
        kind: EntityKind,
        key: &str,
    ) -> std::result::Result<Option<ProviderEntity>, ProviderError> {
        let provider = self
            .providers
            .get(source)
            .ok_or_else(|| ProviderError::NotConfigured(source.to_string()))?;
        debug!(%source, %kind, key, "Fetching provider entity");
        provider.fetch_by_id_or_slug(kind, key).await
    }

    /// Store under the requested key, the provider id and the slug
    async fn store(
        &self,
        source: MetadataSource,
        kind: EntityKind,
        key: &str,
        entity: &ProviderEntity,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let payload = serde_json::to_value(entity)?;
        let mut keys = vec![key.to_string()];
        for alias in std::iter::once(&entity.id).chain(entity.slug.as_ref()) {
            if !alias.is_empty() && !keys.contains(alias) {
                keys.push(alias.clone());
            }
        }

        for k in keys {
            rows::upsert(&self.pool, source, kind, &k, &payload, fetched_at).await?;
        }
        Ok(())
    }

    /// Best-effort warm of declared sub-entities; failures are logged only
    async fn warm_nested(&self, source: MetadataSource, kind: EntityKind, entity: &ProviderEntity) {
        for (field, nested_kind) in nested_refs(kind) {
            for id in referenced_ids(&entity.payload, field) {
                if let Err(e) = self.get_entity(source, *nested_kind, &id).await {
                    warn!(%source, kind = %nested_kind, id = %id, error = %e, "Failed to warm nested entity");
                }
            }
        }
    }
}
