//! Metadata link persistence (one row per object and provider)

use crate::models::{MatchMethod, MetadataLink, MetadataSource, ObjectType};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const LINK_COLUMNS: &str = "object_id, source, provider_id, match_method, last_searched, \
                            next_search, winning_vote_count, total_vote_count";

fn row_to_link(row: &SqliteRow) -> Result<MetadataLink> {
    Ok(MetadataLink {
        object_id: row.get("object_id"),
        source: MetadataSource::from_stored(row.get::<String, _>("source").as_str())?,
        provider_id: row.get("provider_id"),
        match_method: MatchMethod::from_stored(row.get::<String, _>("match_method").as_str())?,
        last_searched: row.get("last_searched"),
        next_search: row.get("next_search"),
        winning_vote_count: row.get("winning_vote_count"),
        total_vote_count: row.get("total_vote_count"),
    })
}

pub async fn list_for_object(pool: &SqlitePool, object_id: i64) -> Result<Vec<MetadataLink>> {
    let sql = format!(
        "SELECT {} FROM metadata_links WHERE object_id = ? ORDER BY source",
        LINK_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(object_id).fetch_all(pool).await?;
    rows.iter().map(row_to_link).collect()
}

pub async fn get_link(
    pool: &SqlitePool,
    object_id: i64,
    source: MetadataSource,
) -> Result<Option<MetadataLink>> {
    let sql = format!(
        "SELECT {} FROM metadata_links WHERE object_id = ? AND source = ?",
        LINK_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(object_id)
        .bind(source.as_str())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_link).transpose()
}

/// Get a link, creating the NoMatch row first when missing
pub async fn get_or_create_link(
    pool: &SqlitePool,
    object_id: i64,
    source: MetadataSource,
) -> Result<MetadataLink> {
    sqlx::query("INSERT OR IGNORE INTO metadata_links (object_id, source) VALUES (?, ?)")
        .bind(object_id)
        .bind(source.as_str())
        .execute(pool)
        .await?;

    Ok(get_link(pool, object_id, source)
        .await?
        .unwrap_or_else(|| MetadataLink::unset(object_id, source)))
}

/// Create missing NoMatch links for one object, one per known provider
pub async fn ensure_links(pool: &SqlitePool, object_id: i64) -> Result<u64> {
    let mut created = 0;
    for source in MetadataSource::ALL {
        let result =
            sqlx::query("INSERT OR IGNORE INTO metadata_links (object_id, source) VALUES (?, ?)")
                .bind(object_id)
                .bind(source.as_str())
                .execute(pool)
                .await?;
        created += result.rows_affected();
    }
    Ok(created)
}

/// Create missing NoMatch links for every metadata-capable object
pub async fn backfill_missing(pool: &SqlitePool) -> Result<u64> {
    let mut created = 0;
    for source in MetadataSource::ALL {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO metadata_links (object_id, source)
            SELECT id, ? FROM objects
            WHERE object_type IN ('Company', 'Platform', 'Game')
            "#,
        )
        .bind(source.as_str())
        .execute(pool)
        .await?;
        created += result.rows_affected();
    }
    Ok(created)
}

/// Write a complete link row (insert or overwrite)
pub async fn save_link(pool: &SqlitePool, link: &MetadataLink) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO metadata_links (
            object_id, source, provider_id, match_method, last_searched, next_search,
            winning_vote_count, total_vote_count
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(object_id, source) DO UPDATE SET
            provider_id = excluded.provider_id,
            match_method = excluded.match_method,
            last_searched = excluded.last_searched,
            next_search = excluded.next_search,
            winning_vote_count = excluded.winning_vote_count,
            total_vote_count = excluded.total_vote_count
        "#,
    )
    .bind(link.object_id)
    .bind(link.source.as_str())
    .bind(&link.provider_id)
    .bind(link.match_method.as_str())
    .bind(link.last_searched)
    .bind(link.next_search)
    .bind(link.winning_vote_count)
    .bind(link.total_vote_count)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record that a search is starting
pub async fn mark_searched(
    pool: &SqlitePool,
    object_id: i64,
    source: MetadataSource,
    last_searched: DateTime<Utc>,
    next_search: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE metadata_links SET last_searched = ?, next_search = ? WHERE object_id = ? AND source = ?",
    )
    .bind(last_searched)
    .bind(next_search)
    .bind(object_id)
    .bind(source.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a matcher outcome on a link that is still unmatched. Links that
/// were voted or set manually meanwhile are left untouched.
pub async fn record_match(
    pool: &SqlitePool,
    object_id: i64,
    source: MetadataSource,
    method: MatchMethod,
    provider_id: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE metadata_links
        SET match_method = ?, provider_id = ?
        WHERE object_id = ? AND source = ?
          AND match_method = 'NoMatch'
        "#,
    )
    .bind(method.as_str())
    .bind(provider_id)
    .bind(object_id)
    .bind(source.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Set a manually chosen provider id
pub async fn set_manual(
    pool: &SqlitePool,
    object_id: i64,
    source: MetadataSource,
    method: MatchMethod,
    provider_id: &str,
) -> Result<()> {
    get_or_create_link(pool, object_id, source).await?;
    sqlx::query(
        "UPDATE metadata_links SET match_method = ?, provider_id = ? WHERE object_id = ? AND source = ?",
    )
    .bind(method.as_str())
    .bind(provider_id)
    .bind(object_id)
    .bind(source.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Promote a vote winner and refresh the counters
pub async fn record_vote_promotion(
    pool: &SqlitePool,
    object_id: i64,
    source: MetadataSource,
    provider_id: &str,
    winning_vote_count: i64,
    total_vote_count: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE metadata_links
        SET match_method = 'Voted', provider_id = ?, winning_vote_count = ?, total_vote_count = ?
        WHERE object_id = ? AND source = ?
          AND match_method NOT IN ('Manual', 'ManualByAdmin')
        "#,
    )
    .bind(provider_id)
    .bind(winning_vote_count)
    .bind(total_vote_count)
    .bind(object_id)
    .bind(source.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Refresh vote counters without changing the match
pub async fn update_vote_counts(
    pool: &SqlitePool,
    object_id: i64,
    source: MetadataSource,
    winning_vote_count: i64,
    total_vote_count: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE metadata_links
        SET winning_vote_count = ?, total_vote_count = ?
        WHERE object_id = ? AND source = ?
        "#,
    )
    .bind(winning_vote_count)
    .bind(total_vote_count)
    .bind(object_id)
    .bind(source.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Objects of one type whose link for `source` is unmatched and past its
/// cooldown, oldest object first
pub async fn list_due_objects(
    pool: &SqlitePool,
    object_type: ObjectType,
    source: MetadataSource,
    now: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT o.id
        FROM objects o
        JOIN metadata_links ml ON ml.object_id = o.id
        WHERE o.object_type = ?
          AND ml.source = ?
          AND ml.match_method = 'NoMatch'
          AND (ml.next_search IS NULL OR ml.next_search < ?)
        ORDER BY o.id
        LIMIT ?
        "#,
    )
    .bind(object_type.as_str())
    .bind(source.as_str())
    .bind(now)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    Ok(ids)
}
