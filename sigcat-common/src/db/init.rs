//! Database initialization
//!
//! Opens (or creates) the SQLite catalog database and creates every table the
//! resolution core reads or writes. Schema creation is idempotent.
//!
//! Signature tables are owned by the ingestion pipeline; they are created here
//! so a fresh database is usable, but this workspace only reads them.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL lets the scheduler's sweeps read while a lookup writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;

    // Ingestion output (read-only to the resolver)
    create_signature_platforms_table(pool).await?;
    create_signature_publishers_table(pool).await?;
    create_signature_games_table(pool).await?;
    create_signature_roms_table(pool).await?;

    // Canonical catalog state
    create_objects_table(pool).await?;
    create_object_attributes_table(pool).await?;
    create_object_signature_links_table(pool).await?;
    create_metadata_links_table(pool).await?;

    // Matching and consensus
    create_signature_resolution_cache_table(pool).await?;
    create_votes_table(pool).await?;
    create_provider_cache_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_signature_platforms_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signature_platforms (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_signature_publishers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signature_publishers (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_signature_games_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signature_games (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            year TEXT,
            publisher_id INTEGER,
            platform_id INTEGER,
            demo INTEGER NOT NULL DEFAULT 0,
            countries TEXT NOT NULL DEFAULT '[]',
            languages TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_signature_roms_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signature_roms (
            id INTEGER PRIMARY KEY,
            game_id INTEGER NOT NULL REFERENCES signature_games(id),
            name TEXT NOT NULL,
            size INTEGER,
            crc TEXT COLLATE NOCASE,
            md5 TEXT COLLATE NOCASE,
            sha1 TEXT COLLATE NOCASE,
            sha256 TEXT COLLATE NOCASE,
            dev_status TEXT,
            attributes TEXT NOT NULL DEFAULT '{}',
            media_tags TEXT NOT NULL DEFAULT '[]',
            source TEXT NOT NULL DEFAULT '',
            score INTEGER NOT NULL DEFAULT 0,
            countries TEXT NOT NULL DEFAULT '[]',
            languages TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_signature_roms_md5 ON signature_roms(md5)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_signature_roms_sha1 ON signature_roms(sha1)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_objects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS objects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_type TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_objects_type ON objects(object_type)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_object_attributes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS object_attributes (
            object_id INTEGER NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
            attribute_name TEXT NOT NULL,
            position INTEGER NOT NULL,
            attribute_type TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (object_id, attribute_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_object_signature_links_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS object_signature_links (
            object_id INTEGER NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
            signature_type TEXT NOT NULL,
            signature_id INTEGER NOT NULL,
            PRIMARY KEY (object_id, signature_type, signature_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_signature_links_signature ON object_signature_links(signature_type, signature_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_metadata_links_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metadata_links (
            object_id INTEGER NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
            source TEXT NOT NULL,
            provider_id TEXT NOT NULL DEFAULT '',
            match_method TEXT NOT NULL DEFAULT 'NoMatch',
            last_searched TIMESTAMP,
            next_search TIMESTAMP,
            winning_vote_count INTEGER NOT NULL DEFAULT 0,
            total_vote_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (object_id, source)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_signature_resolution_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signature_resolution_cache (
            signature_game_id INTEGER PRIMARY KEY,
            source TEXT NOT NULL,
            provider_id TEXT NOT NULL DEFAULT '',
            match_method TEXT NOT NULL,
            last_searched TIMESTAMP NOT NULL,
            next_search TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_votes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS votes (
            user_id TEXT NOT NULL,
            object_id INTEGER NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
            source TEXT NOT NULL,
            provider_id TEXT NOT NULL,
            submitted_at TIMESTAMP NOT NULL,
            PRIMARY KEY (user_id, object_id, source)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_provider_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provider_cache (
            source TEXT NOT NULL,
            kind TEXT NOT NULL,
            cache_key TEXT NOT NULL,
            payload TEXT NOT NULL,
            last_fetched TIMESTAMP NOT NULL,
            PRIMARY KEY (source, kind, cache_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
