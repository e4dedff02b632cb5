//! Metadata matcher
//!
//! Decides, per canonical object and provider, whether a search is due, runs
//! the provider search strategies and records the outcome on the object's
//! metadata link.
//!
//! A search only runs on an unmatched (NoMatch) link whose cooldown has
//! elapsed, or when forced. Once it runs, the link's search timestamps are
//! rewritten whatever the outcome, so a failing provider is not hammered.
//! Provider failures end the search as "unresolved this round".

use crate::db::{links, objects, resolution_cache};
use crate::db::resolution_cache::ResolutionCacheEntry;
use crate::models::{
    AttributeName, CanonicalObject, MatchMethod, MetadataLink, MetadataSource, ObjectType,
    SignatureType,
};
use crate::providers::{
    EntityKind, MetadataProvider, ProviderEntity, ProviderRegistry, SearchStrategy,
};
use crate::services::artwork::ArtworkFetcher;
use crate::services::candidates;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Months, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument, Span};

/// Days a signature resolution stays cached before the provider is asked again
pub const RESOLUTION_CACHE_DAYS: i64 = 7;

/// Provider whose game ids are memoized per signature game
pub const PRIMARY_SOURCE: MetadataSource = MetadataSource::IGDB;

/// Outcome of one (object, provider) search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub object_id: i64,
    pub source: MetadataSource,
    pub match_method: MatchMethod,
    pub provider_id: String,
    /// False when the link was not eligible or the caller stopped waiting
    pub searched: bool,
}

impl MatchOutcome {
    fn from_link(link: &MetadataLink, searched: bool) -> Self {
        Self {
            object_id: link.object_id,
            source: link.source,
            match_method: link.match_method,
            provider_id: link.provider_id.clone(),
            searched,
        }
    }

    /// Placeholder returned when a synchronous caller gives up waiting
    fn pending(object_id: i64, source: MetadataSource) -> Self {
        Self {
            object_id,
            source,
            match_method: MatchMethod::NoMatch,
            provider_id: String::new(),
            searched: false,
        }
    }
}

/// Counters for one bulk sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub visited: u64,
    pub matched: u64,
    pub failed: u64,
}

/// Next search time after a search starting at `now`
pub fn next_search_after(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_add_months(Months::new(1))
        .unwrap_or(now + Duration::days(30))
}

/// Whether the link may be searched now
pub fn is_eligible(link: &MetadataLink, force: bool, now: DateTime<Utc>) -> bool {
    link.match_method == MatchMethod::NoMatch && (force || link.search_due(now))
}

/// Classify company/platform hits: one hit or an exact-name hit is a match,
/// anything else with hits is ambiguous (best-similarity id kept tentatively)
pub fn classify_hits(query: &str, hits: &[ProviderEntity]) -> Option<(MatchMethod, String)> {
    match hits {
        [] => None,
        [only] => Some((MatchMethod::Automatic, only.id.clone())),
        many => {
            if let Some(exact) = many.iter().find(|h| h.name == query) {
                return Some((MatchMethod::Automatic, exact.id.clone()));
            }
            let best = most_similar(query, many)?;
            Some((MatchMethod::AutomaticTooManyMatches, best.id.clone()))
        }
    }
}

/// Hit whose name is closest to the query; ties keep the earlier hit
fn most_similar<'a>(query: &str, hits: &'a [ProviderEntity]) -> Option<&'a ProviderEntity> {
    let query = query.to_lowercase();
    let mut best: Option<(&ProviderEntity, f64)> = None;
    for hit in hits {
        let score = strsim::normalized_levenshtein(&query, &hit.name.to_lowercase());
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((hit, score));
        }
    }
    best.map(|(hit, _)| hit)
}

/// Game hits for one candidate: a single hit, or an exact-name hit among several
fn accept_game_hits(candidate: &str, hits: &[ProviderEntity]) -> Option<String> {
    match hits {
        [] => None,
        [only] => Some(only.id.clone()),
        many => many
            .iter()
            .find(|h| h.name == candidate)
            .map(|h| h.id.clone()),
    }
}

#[derive(Clone)]
pub struct MetadataMatcher {
    pool: SqlitePool,
    providers: ProviderRegistry,
    artwork: ArtworkFetcher,
    sync_timeout: std::time::Duration,
}

impl MetadataMatcher {
    pub fn new(
        pool: SqlitePool,
        providers: ProviderRegistry,
        artwork: ArtworkFetcher,
        sync_timeout: std::time::Duration,
    ) -> Self {
        Self {
            pool,
            providers,
            artwork,
            sync_timeout,
        }
    }

    /// Search one provider for one object.
    ///
    /// Ineligible links return their current state with `searched == false`.
    pub async fn search(
        &self,
        object_id: i64,
        source: MetadataSource,
        force: bool,
    ) -> Result<MatchOutcome> {
        let object = objects::load_object(&self.pool, object_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("object {}", object_id)))?;
        if !object.object_type.supports_metadata() {
            return Err(Error::InvalidInput(format!(
                "{} objects carry no metadata links",
                object.object_type
            )));
        }

        let link = links::get_or_create_link(&self.pool, object_id, source).await?;
        let now = Utc::now();
        if !is_eligible(&link, force, now) {
            debug!(object_id, %source, method = %link.match_method, "Search not due");
            return Ok(MatchOutcome::from_link(&link, false));
        }

        let Some(provider) = self.providers.get(source) else {
            debug!(object_id, %source, "No search client for provider");
            return Ok(MatchOutcome::from_link(&link, false));
        };

        links::mark_searched(&self.pool, object_id, source, now, next_search_after(now)).await?;

        let found = match object.object_type {
            ObjectType::Company | ObjectType::Platform => {
                self.search_named(provider.as_ref(), &object).await
            }
            ObjectType::Game => self.search_game(provider.as_ref(), &object, force, now).await,
            ObjectType::App | ObjectType::Rom => Ok(None),
        };

        let (method, provider_id) = match found {
            Ok(Some(hit)) => hit,
            Ok(None) => (MatchMethod::NoMatch, String::new()),
            Err(e) => {
                warn!(object_id, %source, error = %e, "Metadata search failed, unresolved this round");
                (MatchMethod::NoMatch, String::new())
            }
        };

        if method != MatchMethod::NoMatch {
            let written =
                links::record_match(&self.pool, object_id, source, method, &provider_id).await?;
            info!(object_id, %source, %method, provider_id = %provider_id, written, "Metadata match recorded");

            if written && object.object_type == ObjectType::Game && source == PRIMARY_SOURCE {
                self.artwork.spawn(source, provider_id.clone());
            }
        } else {
            debug!(object_id, %source, "No metadata match");
        }

        Ok(MatchOutcome {
            object_id,
            source,
            match_method: method,
            provider_id,
            searched: true,
        })
    }

    /// Deadline one synchronous caller waits for, counted from now
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.sync_timeout
    }

    /// Run `search` in a spawned task and wait until `deadline` at most.
    ///
    /// On timeout the caller gets a pending NoMatch outcome while the task
    /// keeps running and commits its result later.
    pub async fn search_until(
        &self,
        object_id: i64,
        source: MetadataSource,
        force: bool,
        deadline: Instant,
    ) -> Result<MatchOutcome> {
        let matcher = self.clone();
        let handle = tokio::spawn(
            async move { matcher.search(object_id, source, force).await }
                .instrument(Span::current()),
        );

        match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Fatal(format!("search task failed: {}", e))),
            Err(_) => {
                warn!(
                    object_id,
                    %source,
                    timeout_secs = self.sync_timeout.as_secs_f64(),
                    "Metadata search still running, returning without a match"
                );
                Ok(MatchOutcome::pending(object_id, source))
            }
        }
    }

    /// Search every provider with a search client within one timeout window.
    /// One provider failing does not stop the others.
    pub async fn search_all(&self, object_id: i64, force: bool) -> Vec<MatchOutcome> {
        self.search_all_until(object_id, force, self.deadline()).await
    }

    /// Like [`search_all`](Self::search_all) against a deadline shared with
    /// other searches of the same caller
    pub async fn search_all_until(
        &self,
        object_id: i64,
        force: bool,
        deadline: Instant,
    ) -> Vec<MatchOutcome> {
        let mut outcomes = Vec::new();
        for source in self.providers.sources() {
            match self.search_until(object_id, source, force, deadline).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(object_id, %source, error = %e, "Metadata search aborted"),
            }
        }
        outcomes
    }

    /// Search due objects of one type across all providers, visiting at most
    /// `limit` (object, provider) pairs
    pub async fn sweep(&self, object_type: ObjectType, limit: u32) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        if !object_type.supports_metadata() {
            return Ok(report);
        }

        for source in self.providers.sources() {
            let remaining = u64::from(limit).saturating_sub(report.visited);
            if remaining == 0 {
                break;
            }
            let ids = links::list_due_objects(
                &self.pool,
                object_type,
                source,
                Utc::now(),
                u32::try_from(remaining).unwrap_or(limit),
            )
            .await?;

            for object_id in ids {
                report.visited += 1;
                match self.search(object_id, source, false).await {
                    Ok(outcome) if outcome.match_method != MatchMethod::NoMatch => {
                        report.matched += 1
                    }
                    Ok(_) => {}
                    Err(e) => {
                        report.failed += 1;
                        warn!(object_id, %source, error = %e, "Sweep item failed");
                    }
                }
            }
        }

        info!(
            %object_type,
            visited = report.visited,
            matched = report.matched,
            failed = report.failed,
            "Metadata sweep finished"
        );
        Ok(report)
    }

    /// Exact then fuzzy name search for companies and platforms
    async fn search_named(
        &self,
        provider: &dyn MetadataProvider,
        object: &CanonicalObject,
    ) -> Result<Option<(MatchMethod, String)>> {
        let Some(kind) = EntityKind::for_object_type(object.object_type) else {
            return Ok(None);
        };

        for strategy in [SearchStrategy::ExactPhrase, SearchStrategy::Fuzzy] {
            let hits = provider
                .search_by_name(kind, &object.name, strategy, None)
                .await?;
            if let Some(hit) = classify_hits(&object.name, &hits) {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// Game search anchored on the game's platform match for the same provider
    async fn search_game(
        &self,
        provider: &dyn MetadataProvider,
        game: &CanonicalObject,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<(MatchMethod, String)>> {
        let source = provider.source();

        let Some((ObjectType::Platform, platform_id)) = game.relationship(AttributeName::Platform)
        else {
            debug!(object_id = game.id, "Game has no platform, skipping search");
            return Ok(None);
        };
        let anchor = links::get_link(&self.pool, platform_id, source).await?;
        let Some(anchor) = anchor.filter(|l| l.match_method.anchors_game_search() && l.has_provider_id())
        else {
            debug!(object_id = game.id, platform_id, %source, "Platform not matched for provider");
            return Ok(None);
        };

        let signature_ids: Vec<i64> = game
            .signature_links
            .iter()
            .filter(|l| l.signature_type == SignatureType::Game)
            .map(|l| l.signature_id)
            .collect();

        if source == PRIMARY_SOURCE {
            for signature_id in &signature_ids {
                let Some(entry) = resolution_cache::get(&self.pool, *signature_id).await? else {
                    continue;
                };
                if entry.source != source || entry.next_search <= now {
                    continue;
                }
                if entry.is_resolved() {
                    debug!(signature_id, provider_id = %entry.provider_id, "Resolution cache hit");
                    return Ok(Some((entry.match_method, entry.provider_id)));
                }
                if !force {
                    debug!(signature_id, "Resolution cache says no match, cooling down");
                    return Ok(None);
                }
            }
        }

        let found = self
            .search_game_candidates(provider, &game.name, &anchor.provider_id)
            .await?;

        if source == PRIMARY_SOURCE {
            let (method, provider_id) = found
                .clone()
                .unwrap_or((MatchMethod::NoMatch, String::new()));
            for signature_id in signature_ids {
                resolution_cache::upsert(
                    &self.pool,
                    &ResolutionCacheEntry {
                        signature_game_id: signature_id,
                        source,
                        provider_id: provider_id.clone(),
                        match_method: method,
                        last_searched: now,
                        next_search: now + Duration::days(RESOLUTION_CACHE_DAYS),
                    },
                )
                .await?;
            }
        }

        Ok(found)
    }

    /// Try every title candidate with every strategy, stopping at the first
    /// accepted hit
    async fn search_game_candidates(
        &self,
        provider: &dyn MetadataProvider,
        name: &str,
        platform_provider_id: &str,
    ) -> Result<Option<(MatchMethod, String)>> {
        for candidate in candidates::generate(name) {
            for strategy in SearchStrategy::ORDERED {
                let hits = provider
                    .search_by_name(EntityKind::Game, &candidate, strategy, Some(platform_provider_id))
                    .await?;
                if let Some(id) = accept_game_hits(&candidate, &hits) {
                    debug!(candidate = %candidate, ?strategy, provider_id = %id, "Game matched");
                    return Ok(Some((MatchMethod::Automatic, id)));
                }
            }
        }
        Ok(None)
    }
}
