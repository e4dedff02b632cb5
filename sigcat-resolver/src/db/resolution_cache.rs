//! Signature resolution cache: SignatureGame id -> provider game id

use crate::models::{MatchMethod, MetadataSource};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// Memoized provider resolution for one signature game
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionCacheEntry {
    pub signature_game_id: i64,
    pub source: MetadataSource,
    /// Empty when the last search found nothing
    pub provider_id: String,
    pub match_method: MatchMethod,
    pub last_searched: DateTime<Utc>,
    pub next_search: DateTime<Utc>,
}

impl ResolutionCacheEntry {
    pub fn is_resolved(&self) -> bool {
        !self.provider_id.is_empty() && self.match_method != MatchMethod::NoMatch
    }
}

pub async fn get(pool: &SqlitePool, signature_game_id: i64) -> Result<Option<ResolutionCacheEntry>> {
    let row = sqlx::query(
        r#"
        SELECT signature_game_id, source, provider_id, match_method, last_searched, next_search
        FROM signature_resolution_cache
        WHERE signature_game_id = ?
        "#,
    )
    .bind(signature_game_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(ResolutionCacheEntry {
        signature_game_id: row.get("signature_game_id"),
        source: MetadataSource::from_stored(row.get::<String, _>("source").as_str())?,
        provider_id: row.get("provider_id"),
        match_method: MatchMethod::from_stored(row.get::<String, _>("match_method").as_str())?,
        last_searched: row.get("last_searched"),
        next_search: row.get("next_search"),
    }))
}

/// Insert or overwrite the single row for a signature game
pub async fn upsert(pool: &SqlitePool, entry: &ResolutionCacheEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO signature_resolution_cache (
            signature_game_id, source, provider_id, match_method, last_searched, next_search
        ) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(signature_game_id) DO UPDATE SET
            source = excluded.source,
            provider_id = excluded.provider_id,
            match_method = excluded.match_method,
            last_searched = excluded.last_searched,
            next_search = excluded.next_search
        "#,
    )
    .bind(entry.signature_game_id)
    .bind(entry.source.as_str())
    .bind(&entry.provider_id)
    .bind(entry.match_method.as_str())
    .bind(entry.last_searched)
    .bind(entry.next_search)
    .execute(pool)
    .await?;

    Ok(())
}
