//! Hash -> signature resolution

use crate::db::signatures;
use crate::models::{HashQuery, SignatureGame, SignatureRom};
use crate::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

/// Best cataloged dump for a hash, with its containing game
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSignature {
    pub game: SignatureGame,
    pub rom: SignatureRom,
}

/// Resolve hash values to the single best signature rom.
///
/// Several catalog sources may list the same dump; the highest source-quality
/// score wins and equal scores go to the lowest rom id.
pub async fn resolve(pool: &SqlitePool, query: &HashQuery) -> Result<ResolvedSignature> {
    let hashes = query.validate()?;

    let roms = signatures::find_roms_by_hashes(pool, &hashes).await?;
    let candidates = roms.len();
    let Some(rom) = roms.into_iter().next() else {
        return Err(Error::NotFound(format!(
            "no signature for md5={} sha1={}",
            hashes.md5.as_deref().unwrap_or("-"),
            hashes.sha1.as_deref().unwrap_or("-")
        )));
    };

    if candidates > 1 {
        debug!(
            candidates,
            rom_id = rom.id,
            score = rom.score,
            "Multiple signatures share hash, picked highest score"
        );
    }

    let game = signatures::get_game(pool, rom.game_id).await?.ok_or_else(|| {
        Error::Fatal(format!(
            "signature rom {} references missing game {}",
            rom.id, rom.game_id
        ))
    })?;

    Ok(ResolvedSignature { game, rom })
}
