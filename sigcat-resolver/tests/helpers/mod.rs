//! Shared test utilities: temp databases, signature seeding, fake providers

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use sigcat_resolver::models::{MetadataSource, ObjectType};
use sigcat_resolver::providers::{
    EntityKind, MetadataProvider, ProviderEntity, ProviderError, ProviderRegistry, SearchStrategy,
};
use sigcat_resolver::Catalog;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const SYNC_TIMEOUT: Duration = Duration::from_secs(15);

/// Create a temporary database with the full schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_sigcat.db");
    let pool = sigcat_common::db::init_database(&db_path).await.unwrap();
    (temp_dir, pool)
}

pub fn catalog(pool: &SqlitePool, providers: &[Arc<FakeProvider>]) -> Catalog {
    catalog_with_timeout(pool, providers, SYNC_TIMEOUT)
}

pub fn catalog_with_timeout(
    pool: &SqlitePool,
    providers: &[Arc<FakeProvider>],
    timeout: Duration,
) -> Catalog {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(provider.clone());
    }
    Catalog::new(pool.clone(), registry, timeout)
}

pub async fn seed_platform(pool: &SqlitePool, id: i64, name: &str) {
    sqlx::query("INSERT INTO signature_platforms (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn seed_publisher(pool: &SqlitePool, id: i64, name: &str) {
    sqlx::query("INSERT INTO signature_publishers (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn seed_game(
    pool: &SqlitePool,
    id: i64,
    name: &str,
    platform_id: Option<i64>,
    publisher_id: Option<i64>,
) {
    sqlx::query(
        "INSERT INTO signature_games (id, name, year, platform_id, publisher_id) VALUES (?, ?, '1988', ?, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(platform_id)
    .bind(publisher_id)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_rom(pool: &SqlitePool, id: i64, game_id: i64, md5: &str, score: i64) {
    sqlx::query(
        "INSERT INTO signature_roms (id, game_id, name, size, md5, score) VALUES (?, ?, ?, 131072, ?, ?)",
    )
    .bind(id)
    .bind(game_id)
    .bind(format!("rom-{}.nes", id))
    .bind(md5)
    .bind(score)
    .execute(pool)
    .await
    .unwrap();
}

/// 32-char md5 built from a short seed
pub fn md5(seed: &str) -> String {
    format!("{:0>32}", seed)
}

pub async fn count_objects(pool: &SqlitePool, object_type: ObjectType) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM objects WHERE object_type = ?")
        .bind(object_type.as_str())
        .fetch_one(pool)
        .await
        .unwrap()
}

pub fn entity(id: &str, name: &str) -> ProviderEntity {
    ProviderEntity {
        id: id.to_string(),
        slug: None,
        name: name.to_string(),
        payload: json!({ "id": id, "name": name }),
    }
}

/// In-process provider with call counters, a failure toggle and an
/// optional per-call delay
pub struct FakeProvider {
    source: MetadataSource,
    entities: Mutex<Vec<(EntityKind, ProviderEntity)>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    pub search_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(source: MetadataSource) -> Arc<Self> {
        Arc::new(Self {
            source,
            entities: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
            search_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        })
    }

    pub fn add(&self, kind: EntityKind, entity: ProviderEntity) {
        self.entities.lock().unwrap().push((kind, entity));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn searches(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    async fn before_call(&self) -> Result<(), ProviderError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Network("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataProvider for FakeProvider {
    fn source(&self) -> MetadataSource {
        self.source
    }

    async fn fetch_by_id_or_slug(
        &self,
        kind: EntityKind,
        id_or_slug: &str,
    ) -> Result<Option<ProviderEntity>, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;

        let entities = self.entities.lock().unwrap();
        Ok(entities
            .iter()
            .find(|(k, e)| *k == kind && (e.id == id_or_slug || e.slug.as_deref() == Some(id_or_slug)))
            .map(|(_, e)| e.clone()))
    }

    async fn search_by_name(
        &self,
        kind: EntityKind,
        query: &str,
        strategy: SearchStrategy,
        _platform: Option<&str>,
    ) -> Result<Vec<ProviderEntity>, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;

        let query_lower = query.to_lowercase();
        let entities = self.entities.lock().unwrap();
        Ok(entities
            .iter()
            .filter(|(k, _)| *k == kind)
            .filter(|(_, e)| match strategy {
                SearchStrategy::ExactPhrase => e.name == query,
                SearchStrategy::Fuzzy => e.name.to_lowercase().contains(&query_lower),
                SearchStrategy::CaseInsensitiveExact => e.name.to_lowercase() == query_lower,
            })
            .map(|(_, e)| e.clone())
            .collect())
    }
}
