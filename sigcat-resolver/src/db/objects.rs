//! Canonical object persistence: objects, typed attributes, signature links

use crate::db::links;
use crate::models::{
    Attribute, AttributeName, AttributeValue, CanonicalObject, ObjectType, SignatureLink,
    SignatureType,
};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// Insert a new object and return it (no attributes or links yet)
pub async fn create_object(
    pool: &SqlitePool,
    object_type: ObjectType,
    name: &str,
) -> Result<CanonicalObject> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO objects (object_type, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(object_type.as_str())
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(CanonicalObject {
        id: result.last_insert_rowid(),
        object_type,
        name: name.to_string(),
        created_at: now,
        updated_at: now,
        attributes: Vec::new(),
        signature_links: Vec::new(),
        metadata_links: Vec::new(),
    })
}

/// Load an object with its attributes, signature links and metadata links
pub async fn load_object(pool: &SqlitePool, id: i64) -> Result<Option<CanonicalObject>> {
    let row = sqlx::query(
        "SELECT id, object_type, name, created_at, updated_at FROM objects WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let object_type = ObjectType::from_stored(row.get::<String, _>("object_type").as_str())?;

    Ok(Some(CanonicalObject {
        id: row.get("id"),
        object_type,
        name: row.get("name"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        attributes: load_attributes(pool, id).await?,
        signature_links: load_signature_links(pool, id).await?,
        metadata_links: links::list_for_object(pool, id).await?,
    }))
}

/// Object type of an existing object
pub async fn object_type_of(pool: &SqlitePool, id: i64) -> Result<Option<ObjectType>> {
    let tag: Option<String> = sqlx::query_scalar("SELECT object_type FROM objects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    tag.map(|t| ObjectType::from_stored(&t)).transpose()
}

pub async fn load_attributes(pool: &SqlitePool, object_id: i64) -> Result<Vec<Attribute>> {
    let rows = sqlx::query(
        r#"
        SELECT attribute_name, value
        FROM object_attributes
        WHERE object_id = ?
        ORDER BY position ASC
        "#,
    )
    .bind(object_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let name = AttributeName::from_stored(row.get::<String, _>("attribute_name").as_str())?;
            let value: AttributeValue = serde_json::from_str(row.get::<String, _>("value").as_str())?;
            Ok(Attribute { name, value })
        })
        .collect()
}

async fn load_signature_links(pool: &SqlitePool, object_id: i64) -> Result<Vec<SignatureLink>> {
    let rows = sqlx::query(
        r#"
        SELECT signature_type, signature_id
        FROM object_signature_links
        WHERE object_id = ?
        ORDER BY signature_type, signature_id
        "#,
    )
    .bind(object_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(SignatureLink {
                signature_type: SignatureType::from_stored(
                    row.get::<String, _>("signature_type").as_str(),
                )?,
                signature_id: row.get("signature_id"),
            })
        })
        .collect()
}

/// Oldest object linked to a raw signature row
pub async fn find_by_signature(
    pool: &SqlitePool,
    signature_type: SignatureType,
    signature_id: i64,
) -> Result<Option<i64>> {
    let id = sqlx::query_scalar(
        r#"
        SELECT MIN(object_id)
        FROM object_signature_links
        WHERE signature_type = ? AND signature_id = ?
        "#,
    )
    .bind(signature_type.as_str())
    .bind(signature_id)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Link an object to a raw signature row (no-op when already linked)
pub async fn add_signature_link(pool: &SqlitePool, object_id: i64, link: SignatureLink) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO object_signature_links (object_id, signature_type, signature_id)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(object_id)
    .bind(link.signature_type.as_str())
    .bind(link.signature_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert or replace one attribute. A new attribute is appended after the
/// existing ones; a replaced attribute keeps its position.
pub async fn set_attribute(pool: &SqlitePool, object_id: i64, attribute: &Attribute) -> Result<()> {
    let encoded = serde_json::to_string(&attribute.value)?;

    sqlx::query(
        r#"
        INSERT INTO object_attributes (object_id, attribute_name, position, attribute_type, value)
        VALUES (
            ?, ?,
            (SELECT COALESCE(MAX(position), -1) + 1 FROM object_attributes WHERE object_id = ?),
            ?, ?
        )
        ON CONFLICT(object_id, attribute_name) DO UPDATE SET
            attribute_type = excluded.attribute_type,
            value = excluded.value
        "#,
    )
    .bind(object_id)
    .bind(attribute.name.as_str())
    .bind(object_id)
    .bind(attribute.value.tag())
    .bind(encoded)
    .execute(pool)
    .await?;

    touch(pool, object_id).await
}

/// Bump `updated_at`
pub async fn touch(pool: &SqlitePool, object_id: i64) -> Result<()> {
    sqlx::query("UPDATE objects SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(object_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Attributes of other objects holding a relationship to `target_id`
pub async fn find_relationships_to(
    pool: &SqlitePool,
    target_id: i64,
) -> Result<Vec<(i64, Attribute)>> {
    let rows = sqlx::query(
        r#"
        SELECT object_id, attribute_name, value
        FROM object_attributes
        WHERE attribute_type = 'ObjectRelationship'
          AND json_extract(value, '$.value.object_id') = ?
        ORDER BY object_id, position
        "#,
    )
    .bind(target_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let name = AttributeName::from_stored(row.get::<String, _>("attribute_name").as_str())?;
            let value: AttributeValue = serde_json::from_str(row.get::<String, _>("value").as_str())?;
            Ok((row.get("object_id"), Attribute { name, value }))
        })
        .collect()
}

/// Delete an object; attributes, links and votes cascade
pub async fn delete_object(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM objects WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
