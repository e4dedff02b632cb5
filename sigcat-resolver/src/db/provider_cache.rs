//! Provider entity cache rows

use crate::models::MetadataSource;
use crate::providers::EntityKind;
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// One cached provider entity
#[derive(Debug, Clone)]
pub struct CachedEntity {
    pub payload: serde_json::Value,
    pub last_fetched: DateTime<Utc>,
}

pub async fn get(
    pool: &SqlitePool,
    source: MetadataSource,
    kind: EntityKind,
    key: &str,
) -> Result<Option<CachedEntity>> {
    let row = sqlx::query(
        r#"
        SELECT payload, last_fetched
        FROM provider_cache
        WHERE source = ? AND kind = ? AND cache_key = ?
        "#,
    )
    .bind(source.as_str())
    .bind(kind.as_str())
    .bind(key)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(CachedEntity {
            payload: serde_json::from_str(row.get::<String, _>("payload").as_str())?,
            last_fetched: row.get("last_fetched"),
        })),
        None => Ok(None),
    }
}

pub async fn upsert(
    pool: &SqlitePool,
    source: MetadataSource,
    kind: EntityKind,
    key: &str,
    payload: &serde_json::Value,
    fetched_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO provider_cache (source, kind, cache_key, payload, last_fetched)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(source, kind, cache_key) DO UPDATE SET
            payload = excluded.payload,
            last_fetched = excluded.last_fetched
        "#,
    )
    .bind(source.as_str())
    .bind(kind.as_str())
    .bind(key)
    .bind(serde_json::to_string(payload)?)
    .bind(fetched_at)
    .execute(pool)
    .await?;

    Ok(())
}
