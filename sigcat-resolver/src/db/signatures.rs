//! Signature catalog reads

use crate::models::{
    SignatureGame, SignaturePlatform, SignaturePublisher, SignatureRom, ValidatedHashes,
};
use crate::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

const ROM_COLUMNS: &str = "id, game_id, name, size, crc, md5, sha1, sha256, dev_status, \
                           attributes, media_tags, source, score, countries, languages";

fn decode_json<T: serde::de::DeserializeOwned + Default>(raw: Option<String>) -> Result<T> {
    match raw {
        Some(s) if !s.trim().is_empty() => Ok(serde_json::from_str(&s)?),
        _ => Ok(T::default()),
    }
}

fn row_to_rom(row: &SqliteRow) -> Result<SignatureRom> {
    Ok(SignatureRom {
        id: row.get("id"),
        game_id: row.get("game_id"),
        name: row.get("name"),
        size: row.get("size"),
        crc: row.get("crc"),
        md5: row.get("md5"),
        sha1: row.get("sha1"),
        sha256: row.get("sha256"),
        dev_status: row.get("dev_status"),
        attributes: decode_json::<BTreeMap<String, String>>(row.get("attributes"))?,
        media_tags: decode_json(row.get("media_tags"))?,
        source: row.get("source"),
        score: row.get("score"),
        countries: decode_json(row.get("countries"))?,
        languages: decode_json(row.get("languages"))?,
    })
}

/// Roms matching the supplied MD5 or SHA1, best score first.
///
/// Equal scores fall back to the lowest rom id so repeated lookups of the same
/// hash always rank rows identically.
pub async fn find_roms_by_hashes(
    pool: &SqlitePool,
    hashes: &ValidatedHashes,
) -> Result<Vec<SignatureRom>> {
    let sql = format!(
        "SELECT {} FROM signature_roms
         WHERE (? IS NOT NULL AND md5 = ?) OR (? IS NOT NULL AND sha1 = ?)
         ORDER BY score DESC, id ASC",
        ROM_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(&hashes.md5)
        .bind(&hashes.md5)
        .bind(&hashes.sha1)
        .bind(&hashes.sha1)
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_rom).collect()
}

pub async fn get_game(pool: &SqlitePool, id: i64) -> Result<Option<SignatureGame>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, year, publisher_id, platform_id, demo, countries, languages
        FROM signature_games
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(SignatureGame {
            id: row.get("id"),
            name: row.get("name"),
            year: row.get("year"),
            publisher_id: row.get("publisher_id"),
            platform_id: row.get("platform_id"),
            demo: row.get::<i64, _>("demo") != 0,
            countries: decode_json(row.get("countries"))?,
            languages: decode_json(row.get("languages"))?,
        })),
        None => Ok(None),
    }
}

pub async fn get_platform(pool: &SqlitePool, id: i64) -> Result<Option<SignaturePlatform>> {
    let row = sqlx::query("SELECT id, name FROM signature_platforms WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| SignaturePlatform {
        id: row.get("id"),
        name: row.get("name"),
    }))
}

pub async fn get_publisher(pool: &SqlitePool, id: i64) -> Result<Option<SignaturePublisher>> {
    let row = sqlx::query("SELECT id, name FROM signature_publishers WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| SignaturePublisher {
        id: row.get("id"),
        name: row.get("name"),
    }))
}
