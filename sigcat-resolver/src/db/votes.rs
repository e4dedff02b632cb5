//! Vote persistence: one vote per (user, object, provider)

use crate::models::MetadataSource;
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// Insert or overwrite a user's vote
pub async fn upsert_vote(
    pool: &SqlitePool,
    user_id: &str,
    object_id: i64,
    source: MetadataSource,
    provider_id: &str,
    submitted_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO votes (user_id, object_id, source, provider_id, submitted_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id, object_id, source) DO UPDATE SET
            provider_id = excluded.provider_id,
            submitted_at = excluded.submitted_at
        "#,
    )
    .bind(user_id)
    .bind(object_id)
    .bind(source.as_str())
    .bind(provider_id)
    .bind(submitted_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Distinct (object, provider) pairs that have at least one vote
pub async fn list_voted_pairs(pool: &SqlitePool) -> Result<Vec<(i64, MetadataSource)>> {
    let rows = sqlx::query("SELECT DISTINCT object_id, source FROM votes ORDER BY object_id, source")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            Ok((
                row.get("object_id"),
                MetadataSource::from_stored(row.get::<String, _>("source").as_str())?,
            ))
        })
        .collect()
}

/// Vote counts per provider id for one pair, highest count first, ties by
/// provider id
pub async fn count_votes(
    pool: &SqlitePool,
    object_id: i64,
    source: MetadataSource,
) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT provider_id, COUNT(*) AS votes
        FROM votes
        WHERE object_id = ? AND source = ?
        GROUP BY provider_id
        ORDER BY votes DESC, provider_id ASC
        "#,
    )
    .bind(object_id)
    .bind(source.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("provider_id"), row.get("votes")))
        .collect())
}

/// The vote a user cast for one pair, if any
pub async fn get_vote(
    pool: &SqlitePool,
    user_id: &str,
    object_id: i64,
    source: MetadataSource,
) -> Result<Option<String>> {
    let id = sqlx::query_scalar(
        "SELECT provider_id FROM votes WHERE user_id = ? AND object_id = ? AND source = ?",
    )
    .bind(user_id)
    .bind(object_id)
    .bind(source.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Move votes from one object to another. A user's existing vote on the
/// target wins over their vote on the source.
pub async fn move_votes(pool: &SqlitePool, from_object: i64, to_object: i64) -> Result<u64> {
    let moved = sqlx::query("UPDATE OR IGNORE votes SET object_id = ? WHERE object_id = ?")
        .bind(to_object)
        .bind(from_object)
        .execute(pool)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM votes WHERE object_id = ?")
        .bind(from_object)
        .execute(pool)
        .await?;

    Ok(moved)
}
