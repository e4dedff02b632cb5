//! Crowd voting on provider ids
//!
//! Users assert "object X is provider id Y at provider P". Each assertion is
//! checked for plausibility before it is stored; one vote is kept per (user,
//! object, provider) and resubmission overwrites it.
//!
//! The tally promotes a winner onto the metadata link when:
//! - the link is not Manual/ManualByAdmin, and
//! - the winning id differs from the current one, and
//! - the link is NoMatch (any count), or the winner has reached the quorum.

use crate::context::RunContext;
use crate::db::{links, objects, votes};
use crate::models::{HashQuery, MatchMethod, MetadataLink, MetadataSource, ObjectType};
use crate::providers::EntityKind;
use crate::services::artwork::ArtworkFetcher;
use crate::services::hash_resolver;
use crate::services::object_resolver::ObjectResolver;
use crate::services::provider_cache::ProviderCache;
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use url::Url;

/// Votes needed to overturn an existing automatic or voted match
pub const QUORUM: i64 = 3;

/// What a vote is about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VoteTarget {
    Object(i64),
    Hashes(HashQuery),
}

/// One (provider, provider id) assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotePair {
    pub source: MetadataSource,
    pub provider_id: String,
}

impl VotePair {
    pub fn new(source: MetadataSource, provider_id: impl Into<String>) -> Self {
        Self {
            source,
            provider_id: provider_id.into(),
        }
    }
}

/// Per-pair submission result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteDecision {
    pub source: MetadataSource,
    pub provider_id: String,
    pub accepted: bool,
    /// Rejection reason
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteSubmission {
    pub object_id: i64,
    pub decisions: Vec<VoteDecision>,
}

/// Counters for one tally run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TallyReport {
    pub pairs: u64,
    pub promoted: u64,
    pub failed: u64,
}

/// Whether a vote winner replaces the link's current provider id
pub fn should_promote(link: &MetadataLink, winner_id: &str, winning_count: i64) -> bool {
    if link.match_method.is_manual() || winning_count < 1 {
        return false;
    }
    if link.provider_id == winner_id {
        return false;
    }
    match link.match_method {
        MatchMethod::NoMatch => true,
        _ => winning_count >= QUORUM,
    }
}

/// Winner of a tally. `counts` is ordered highest count first; when the
/// incumbent id shares the top count it keeps the link.
pub fn pick_winner(counts: &[(String, i64)], incumbent: &str) -> Option<(String, i64)> {
    let (first_id, top) = counts.first()?;
    let held = counts
        .iter()
        .take_while(|(_, c)| c == top)
        .find(|(id, _)| !incumbent.is_empty() && id == incumbent);
    Some(match held {
        Some((id, c)) => (id.clone(), *c),
        None => (first_id.clone(), *top),
    })
}

/// Syntactic checks on a provider id that need no network call
pub fn check_id_format(source: MetadataSource, provider_id: &str) -> std::result::Result<(), String> {
    let is_numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    match source {
        MetadataSource::IGDB => {
            if provider_id.chars().any(char::is_whitespace) {
                return Err("IGDB ids contain no whitespace".to_string());
            }
            Ok(())
        }
        MetadataSource::TheGamesDb | MetadataSource::RetroAchievements => {
            if is_numeric(provider_id) && !provider_id.trim_start_matches('0').is_empty() {
                Ok(())
            } else {
                Err(format!("{} ids are positive integers", source))
            }
        }
        MetadataSource::GiantBomb => {
            // Plain ids or type-prefixed guids such as 3030-4725
            let valid = match provider_id.split_once('-') {
                Some((prefix, id)) => is_numeric(prefix) && is_numeric(id),
                None => is_numeric(provider_id),
            };
            if valid {
                Ok(())
            } else {
                Err("GiantBomb ids are numeric or NNNN-NNNN guids".to_string())
            }
        }
        MetadataSource::Wikipedia => {
            let url = Url::parse(provider_id).map_err(|e| format!("invalid URL: {}", e))?;
            if url.scheme() != "https" {
                return Err("Wikipedia links must use https".to_string());
            }
            let host = url.host_str().unwrap_or_default();
            if host == "wikipedia.org" || host.ends_with(".wikipedia.org") {
                Ok(())
            } else {
                Err(format!("{} is not a wikipedia.org domain", host))
            }
        }
    }
}

#[derive(Clone)]
pub struct VotingService {
    pool: SqlitePool,
    cache: ProviderCache,
    resolver: ObjectResolver,
    artwork: ArtworkFetcher,
}

impl VotingService {
    pub fn new(
        pool: SqlitePool,
        cache: ProviderCache,
        resolver: ObjectResolver,
        artwork: ArtworkFetcher,
    ) -> Self {
        Self {
            pool,
            cache,
            resolver,
            artwork,
        }
    }

    /// Validate and store a user's votes for one object
    pub async fn submit(
        &self,
        ctx: &RunContext,
        user_id: &str,
        target: &VoteTarget,
        pairs: &[VotePair],
    ) -> Result<VoteSubmission> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(Error::InvalidInput("user id is required".to_string()));
        }
        if pairs.is_empty() {
            return Err(Error::InvalidInput("at least one vote is required".to_string()));
        }

        let (object_id, object_type) = self.resolve_target(target).await?;
        if !object_type.supports_metadata() {
            return Err(Error::InvalidInput(format!(
                "{} objects cannot be voted on",
                object_type
            )));
        }

        let mut decisions = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let provider_id = pair.provider_id.trim();
            let verdict = self.validate(object_type, pair.source, provider_id).await;

            let decision = match verdict {
                Ok(()) => {
                    votes::upsert_vote(&self.pool, user_id, object_id, pair.source, provider_id, Utc::now())
                        .await?;
                    debug!(
                        correlation_id = %ctx.correlation_id,
                        object_id,
                        source = %pair.source,
                        provider_id,
                        "Vote stored"
                    );
                    VoteDecision {
                        source: pair.source,
                        provider_id: provider_id.to_string(),
                        accepted: true,
                        reason: None,
                    }
                }
                Err(reason) => {
                    info!(object_id, source = %pair.source, provider_id, reason = %reason, "Vote rejected");
                    VoteDecision {
                        source: pair.source,
                        provider_id: provider_id.to_string(),
                        accepted: false,
                        reason: Some(reason),
                    }
                }
            };
            decisions.push(decision);
        }

        Ok(VoteSubmission {
            object_id,
            decisions,
        })
    }

    async fn resolve_target(&self, target: &VoteTarget) -> Result<(i64, ObjectType)> {
        match target {
            VoteTarget::Object(id) => {
                let object_type = objects::object_type_of(&self.pool, *id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("object {}", id)))?;
                Ok((*id, object_type))
            }
            VoteTarget::Hashes(query) => {
                let signature = hash_resolver::resolve(&self.pool, query).await?;
                let resolved = self.resolver.resolve(&signature.game).await?;
                Ok((resolved.game.id, resolved.game.object_type))
            }
        }
    }

    /// Plausibility check for one pair; `Err` carries the rejection reason
    async fn validate(
        &self,
        object_type: ObjectType,
        source: MetadataSource,
        provider_id: &str,
    ) -> std::result::Result<(), String> {
        if provider_id.is_empty() {
            return Err("provider id is empty".to_string());
        }
        check_id_format(source, provider_id)?;

        if source == MetadataSource::IGDB {
            let kind = EntityKind::for_object_type(object_type)
                .ok_or_else(|| format!("{} objects have no IGDB entity", object_type))?;
            match self.cache.get_entity(source, kind, provider_id).await {
                Ok(Some(_)) => {}
                Ok(None) => return Err(format!("IGDB {} {} does not exist", kind, provider_id)),
                Err(e) => return Err(format!("could not verify IGDB id: {}", e)),
            }
        }
        Ok(())
    }

    /// Tally every voted (object, provider) pair. Failures are isolated per pair.
    pub async fn tally(&self) -> Result<TallyReport> {
        let mut report = TallyReport::default();
        for (object_id, source) in votes::list_voted_pairs(&self.pool).await? {
            report.pairs += 1;
            match self.tally_pair(object_id, source).await {
                Ok(true) => report.promoted += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(object_id, %source, error = %e, "Tally failed for pair");
                }
            }
        }

        info!(
            pairs = report.pairs,
            promoted = report.promoted,
            failed = report.failed,
            "Vote tally finished"
        );
        Ok(report)
    }

    /// Tally one pair; returns whether the winner was promoted
    pub async fn tally_pair(&self, object_id: i64, source: MetadataSource) -> Result<bool> {
        let counts = votes::count_votes(&self.pool, object_id, source).await?;
        let link = links::get_or_create_link(&self.pool, object_id, source).await?;
        let Some((winner_id, winning_count)) = pick_winner(&counts, &link.provider_id) else {
            return Ok(false);
        };
        let total: i64 = counts.iter().map(|(_, c)| c).sum();

        if !should_promote(&link, &winner_id, winning_count) {
            links::update_vote_counts(&self.pool, object_id, source, winning_count, total).await?;
            return Ok(false);
        }

        links::record_vote_promotion(&self.pool, object_id, source, &winner_id, winning_count, total)
            .await?;
        info!(
            object_id,
            %source,
            previous = %link.provider_id,
            provider_id = %winner_id,
            winning_count,
            total,
            "Vote winner promoted"
        );

        if source == MetadataSource::IGDB
            && objects::object_type_of(&self.pool, object_id).await? == Some(ObjectType::Game)
        {
            self.artwork.spawn(source, winner_id);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(method: MatchMethod, provider_id: &str) -> MetadataLink {
        MetadataLink {
            match_method: method,
            provider_id: provider_id.to_string(),
            ..MetadataLink::unset(1, MetadataSource::IGDB)
        }
    }

    #[test]
    fn test_tied_incumbent_keeps_link() {
        let counts = vec![("10".to_string(), 3), ("5".to_string(), 3), ("7".to_string(), 1)];
        assert_eq!(pick_winner(&counts, "5"), Some(("5".to_string(), 3)));
        assert_eq!(pick_winner(&counts, "7"), Some(("10".to_string(), 3)));
        assert_eq!(pick_winner(&counts, ""), Some(("10".to_string(), 3)));
        assert_eq!(pick_winner(&[], "5"), None);
    }

    #[test]
    fn test_first_signal_accepts_single_vote() {
        assert!(should_promote(&link(MatchMethod::NoMatch, ""), "42", 1));
    }

    #[test]
    fn test_quorum_needed_to_overturn() {
        let automatic = link(MatchMethod::Automatic, "10");
        assert!(!should_promote(&automatic, "42", 2));
        assert!(should_promote(&automatic, "42", 3));

        let voted = link(MatchMethod::Voted, "10");
        assert!(!should_promote(&voted, "42", 2));
        assert!(should_promote(&voted, "42", 5));

        let ambiguous = link(MatchMethod::AutomaticTooManyMatches, "10");
        assert!(should_promote(&ambiguous, "42", 3));
    }

    #[test]
    fn test_manual_is_sticky() {
        assert!(!should_promote(&link(MatchMethod::Manual, "10"), "42", 100));
        assert!(!should_promote(&link(MatchMethod::ManualByAdmin, ""), "42", 100));
    }

    #[test]
    fn test_same_id_is_not_a_promotion() {
        assert!(!should_promote(&link(MatchMethod::Automatic, "42"), "42", 10));
    }

    #[test]
    fn test_id_formats() {
        assert!(check_id_format(MetadataSource::TheGamesDb, "1234").is_ok());
        assert!(check_id_format(MetadataSource::TheGamesDb, "12a").is_err());
        assert!(check_id_format(MetadataSource::RetroAchievements, "0").is_err());
        assert!(check_id_format(MetadataSource::GiantBomb, "3030-4725").is_ok());
        assert!(check_id_format(MetadataSource::GiantBomb, "abc-1").is_err());
        assert!(check_id_format(MetadataSource::IGDB, "super-mario-bros").is_ok());
    }

    #[test]
    fn test_wikipedia_domain_allow_list() {
        assert!(check_id_format(
            MetadataSource::Wikipedia,
            "https://en.wikipedia.org/wiki/Contra_(video_game)"
        )
        .is_ok());
        assert!(check_id_format(MetadataSource::Wikipedia, "http://en.wikipedia.org/wiki/Contra").is_err());
        assert!(check_id_format(MetadataSource::Wikipedia, "https://wikipedia.org.evil.com/x").is_err());
        assert!(check_id_format(MetadataSource::Wikipedia, "not a url").is_err());
    }
}
