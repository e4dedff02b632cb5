//! Canonical object resolution and creation
//!
//! Maps a resolved signature game onto its canonical Publisher, Platform and
//! Game objects. The first sighting of a raw signature row creates the object,
//! links it, backfills its metadata links and forces an immediate metadata
//! search (bounded by the matcher timeout). Later sightings find the existing
//! link and touch nothing.

use crate::db::{links, objects, signatures};
use crate::models::{
    Attribute, AttributeName, AttributeValue, CanonicalObject, ObjectType, SignatureGame,
    SignatureLink, SignatureType,
};
use crate::services::matcher::MetadataMatcher;
use crate::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::time::Instant;
use tracing::{info, warn};

/// Canonical objects behind one signature game
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedObjects {
    pub game: CanonicalObject,
    pub platform: Option<CanonicalObject>,
    pub publisher: Option<CanonicalObject>,
}

#[derive(Clone)]
pub struct ObjectResolver {
    pool: SqlitePool,
    matcher: MetadataMatcher,
}

impl ObjectResolver {
    pub fn new(pool: SqlitePool, matcher: MetadataMatcher) -> Self {
        Self { pool, matcher }
    }

    /// Resolve (or create) the publisher, platform and game for a signature game.
    ///
    /// Publisher and platform go first so a new game's search can anchor on the
    /// platform's provider match. First-sighting searches of all three share
    /// one sync timeout window.
    pub async fn resolve(&self, signature: &SignatureGame) -> Result<ResolvedObjects> {
        let deadline = self.matcher.deadline();
        let publisher = match signature.publisher_id {
            Some(id) => match signatures::get_publisher(&self.pool, id).await? {
                Some(row) => Some(
                    self.ensure_object(SignatureType::Company, row.id, ObjectType::Company, &row.name, Vec::new(), deadline)
                        .await?,
                ),
                None => {
                    warn!(signature_game = signature.id, publisher_id = id, "Publisher row missing");
                    None
                }
            },
            None => None,
        };

        let platform = match signature.platform_id {
            Some(id) => match signatures::get_platform(&self.pool, id).await? {
                Some(row) => Some(
                    self.ensure_object(SignatureType::Platform, row.id, ObjectType::Platform, &row.name, Vec::new(), deadline)
                        .await?,
                ),
                None => {
                    warn!(signature_game = signature.id, platform_id = id, "Platform row missing");
                    None
                }
            },
            None => None,
        };

        let attributes = game_attributes(signature, platform.as_ref(), publisher.as_ref());
        let mut game = self
            .ensure_object(
                SignatureType::Game,
                signature.id,
                ObjectType::Game,
                &signature.name,
                attributes,
                deadline,
            )
            .await?;

        if self.backfill_relationships(&game, platform.as_ref(), publisher.as_ref()).await? {
            game = self.reload(game.id).await?;
        }

        Ok(ResolvedObjects {
            game,
            platform,
            publisher,
        })
    }

    /// Find the object linked to a signature row, creating it on first sighting
    async fn ensure_object(
        &self,
        signature_type: SignatureType,
        signature_id: i64,
        object_type: ObjectType,
        name: &str,
        attributes: Vec<Attribute>,
        deadline: Instant,
    ) -> Result<CanonicalObject> {
        if let Some(id) = objects::find_by_signature(&self.pool, signature_type, signature_id).await? {
            return self.reload(id).await;
        }

        let object = objects::create_object(&self.pool, object_type, name).await?;
        objects::add_signature_link(
            &self.pool,
            object.id,
            SignatureLink {
                signature_type,
                signature_id,
            },
        )
        .await?;
        for attribute in &attributes {
            objects::set_attribute(&self.pool, object.id, attribute).await?;
        }
        links::ensure_links(&self.pool, object.id).await?;

        info!(
            object_id = object.id,
            %object_type,
            signature_id,
            object_name = name,
            "Created canonical object"
        );

        self.matcher.search_all_until(object.id, true, deadline).await;

        self.reload(object.id).await
    }

    /// Add platform/publisher relationships a game created earlier is missing
    async fn backfill_relationships(
        &self,
        game: &CanonicalObject,
        platform: Option<&CanonicalObject>,
        publisher: Option<&CanonicalObject>,
    ) -> Result<bool> {
        let mut changed = false;
        for (name, target) in [
            (AttributeName::Platform, platform),
            (AttributeName::Publisher, publisher),
        ] {
            if let Some(target) = target {
                if game.relationship(name).is_none() {
                    objects::set_attribute(
                        &self.pool,
                        game.id,
                        &Attribute::relationship(name, target.object_type, target.id),
                    )
                    .await?;
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    async fn reload(&self, id: i64) -> Result<CanonicalObject> {
        objects::load_object(&self.pool, id)
            .await?
            .ok_or_else(|| Error::Fatal(format!("object {} vanished during resolution", id)))
    }
}

/// Initial attributes for a new game object
fn game_attributes(
    signature: &SignatureGame,
    platform: Option<&CanonicalObject>,
    publisher: Option<&CanonicalObject>,
) -> Vec<Attribute> {
    let mut attributes = Vec::new();
    if let Some(platform) = platform {
        attributes.push(Attribute::relationship(
            AttributeName::Platform,
            ObjectType::Platform,
            platform.id,
        ));
    }
    if let Some(publisher) = publisher {
        attributes.push(Attribute::relationship(
            AttributeName::Publisher,
            ObjectType::Company,
            publisher.id,
        ));
    }
    if let Some(year) = signature.year.as_deref().map(str::trim).filter(|y| !y.is_empty()) {
        attributes.push(Attribute::new(
            AttributeName::Year,
            AttributeValue::ShortString(year.to_string()),
        ));
    }
    if signature.demo {
        attributes.push(Attribute::new(AttributeName::Demo, AttributeValue::Boolean(true)));
    }
    attributes
}
