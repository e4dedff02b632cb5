//! Game artwork warming
//!
//! After a game is matched (or a vote promotes a new id) its cover,
//! screenshots and artworks are pulled into the provider cache in a detached
//! task. Nothing waits on the result; failures are logged.

use crate::models::MetadataSource;
use crate::providers::EntityKind;
use crate::services::provider_cache::{referenced_ids, ProviderCache};
use crate::Result;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument, Span};

const ARTWORK_FIELDS: [(&str, EntityKind); 3] = [
    ("cover", EntityKind::Cover),
    ("screenshots", EntityKind::Screenshot),
    ("artworks", EntityKind::Artwork),
];

#[derive(Clone)]
pub struct ArtworkFetcher {
    cache: ProviderCache,
}

impl ArtworkFetcher {
    pub fn new(cache: ProviderCache) -> Self {
        Self { cache }
    }

    /// Warm artwork in the background; the returned handle may be ignored
    pub fn spawn(&self, source: MetadataSource, game_id: String) -> JoinHandle<()> {
        let fetcher = self.clone();
        tokio::spawn(
            async move {
                match fetcher.fetch(source, &game_id).await {
                    Ok(count) => debug!(%source, game_id = %game_id, count, "Artwork warmed"),
                    Err(e) => warn!(%source, game_id = %game_id, error = %e, "Artwork fetch failed"),
                }
            }
            .instrument(Span::current()),
        )
    }

    /// Warm artwork for one provider game; returns the number of images cached
    pub async fn fetch(&self, source: MetadataSource, game_id: &str) -> Result<usize> {
        let Some(game) = self
            .cache
            .get_entity(source, EntityKind::Game, game_id)
            .await?
        else {
            return Ok(0);
        };

        let mut warmed = 0;
        for (field, kind) in ARTWORK_FIELDS {
            for id in referenced_ids(&game.payload, field) {
                if self.cache.get_entity(source, kind, &id).await?.is_some() {
                    warmed += 1;
                }
            }
        }
        Ok(warmed)
    }
}
