//! Duplicate object merge
//!
//! Retires a duplicate ("source") into a survivor ("target"):
//! - attributes: union, the survivor's non-empty values win
//! - signature links: union
//! - metadata links: union, the survivor's matched links win
//! - relationships elsewhere pointing at the duplicate are re-pointed
//! - votes move to the survivor unless the user already voted there
//!
//! Without `commit` the merged state is computed and returned untouched.
//! Writes go to the survivor first and the duplicate is deleted last, so an
//! interrupted merge leaves a duplicate behind rather than losing data.

use crate::db::{links, objects, votes};
use crate::models::{Attribute, AttributeValue, CanonicalObject, MetadataLink, SignatureLink};
use crate::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

/// Merged state of the survivor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergePlan {
    pub source_id: i64,
    pub target_id: i64,
    pub attributes: Vec<Attribute>,
    pub signature_links: Vec<SignatureLink>,
    pub metadata_links: Vec<MetadataLink>,
    /// Objects whose relationship attributes point at the source
    pub repointed_objects: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "plan")]
pub enum MergeOutcome {
    Preview(MergePlan),
    Committed(MergePlan),
}

/// Attribute union: survivor order first, then attributes only the source has
pub fn merge_attributes(target: &[Attribute], source: &[Attribute]) -> Vec<Attribute> {
    let mut merged: Vec<Attribute> = target
        .iter()
        .map(|attr| {
            if attr.value.is_empty() {
                if let Some(replacement) = source
                    .iter()
                    .find(|s| s.name == attr.name && !s.value.is_empty())
                {
                    return replacement.clone();
                }
            }
            attr.clone()
        })
        .collect();

    for attr in source {
        if !merged.iter().any(|m| m.name == attr.name) {
            merged.push(attr.clone());
        }
    }
    merged
}

pub fn merge_signature_links(target: &[SignatureLink], source: &[SignatureLink]) -> Vec<SignatureLink> {
    let mut merged = target.to_vec();
    for link in source {
        if !merged.contains(link) {
            merged.push(*link);
        }
    }
    merged
}

/// Link union keyed by provider. A survivor link with a provider id always
/// wins; an unset survivor link takes the source's match.
pub fn merge_metadata_links(
    target_id: i64,
    target: &[MetadataLink],
    source: &[MetadataLink],
) -> Vec<MetadataLink> {
    let mut merged: Vec<MetadataLink> = target.to_vec();

    for link in source {
        let rekeyed = MetadataLink {
            object_id: target_id,
            ..link.clone()
        };
        match merged.iter_mut().find(|m| m.source == link.source) {
            Some(existing) => {
                if !existing.has_provider_id() && !existing.match_method.is_manual() && link.has_provider_id() {
                    *existing = rekeyed;
                }
            }
            None => merged.push(rekeyed),
        }
    }

    merged.sort_by_key(|l| l.source);
    merged
}

/// Build the merge plan and, when `commit` is set, apply it
pub async fn merge_objects(
    pool: &SqlitePool,
    source_id: i64,
    target_id: i64,
    commit: bool,
) -> Result<MergeOutcome> {
    if source_id == target_id {
        return Err(Error::InvalidInput("cannot merge an object into itself".to_string()));
    }

    let source = load(pool, source_id).await?;
    let target = load(pool, target_id).await?;
    if source.object_type != target.object_type {
        return Err(Error::InvalidInput(format!(
            "cannot merge {} {} into {} {}",
            source.object_type, source_id, target.object_type, target_id
        )));
    }

    let referrers = objects::find_relationships_to(pool, source_id).await?;
    let mut repointed_objects: Vec<i64> = referrers
        .iter()
        .map(|(id, _)| *id)
        .filter(|id| *id != source_id)
        .collect();
    repointed_objects.sort_unstable();
    repointed_objects.dedup();

    let plan = MergePlan {
        source_id,
        target_id,
        attributes: merge_attributes(&target.attributes, &source.attributes),
        signature_links: merge_signature_links(&target.signature_links, &source.signature_links),
        metadata_links: merge_metadata_links(target_id, &target.metadata_links, &source.metadata_links),
        repointed_objects,
    };

    if !commit {
        return Ok(MergeOutcome::Preview(plan));
    }

    apply(pool, &target, &plan, referrers).await?;
    info!(
        source_id,
        target_id,
        repointed = plan.repointed_objects.len(),
        "Objects merged"
    );
    Ok(MergeOutcome::Committed(plan))
}

async fn apply(
    pool: &SqlitePool,
    target: &CanonicalObject,
    plan: &MergePlan,
    referrers: Vec<(i64, Attribute)>,
) -> Result<()> {
    for attribute in &plan.attributes {
        if !target.attributes.contains(attribute) {
            objects::set_attribute(pool, target.id, attribute).await?;
        }
    }

    for link in &plan.signature_links {
        objects::add_signature_link(pool, target.id, *link).await?;
    }

    for link in &plan.metadata_links {
        if !target.metadata_links.contains(link) {
            links::save_link(pool, link).await?;
        }
    }

    for (object_id, attribute) in referrers {
        if object_id == plan.source_id {
            continue;
        }
        if let AttributeValue::ObjectRelationship { object_type, .. } = attribute.value {
            objects::set_attribute(
                pool,
                object_id,
                &Attribute::relationship(attribute.name, object_type, target.id),
            )
            .await?;
        }
    }

    votes::move_votes(pool, plan.source_id, target.id).await?;
    objects::delete_object(pool, plan.source_id).await?;
    objects::touch(pool, target.id).await
}

async fn load(pool: &SqlitePool, id: i64) -> Result<CanonicalObject> {
    objects::load_object(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("object {}", id)))
}
