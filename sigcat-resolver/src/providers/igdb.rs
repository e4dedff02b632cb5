//! IGDB API client
//!
//! Authenticates with the Twitch client-credentials flow, queries the v4 API
//! with apicalypse bodies and paginates name searches. Requests are throttled
//! with a token bucket (IGDB allows 4 req/sec).
//!
//! API Documentation: https://api-docs.igdb.com/

use super::{EntityKind, MetadataProvider, ProviderEntity, ProviderError, SearchStrategy};
use crate::models::MetadataSource;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use sigcat_common::config::IgdbConfig;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const BASE_URL: &str = "https://api.igdb.com/v4";
const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// IGDB returns at most 500 rows per request
const PAGE_SIZE: usize = 500;
/// Upper bound on pages fetched for one search
const MAX_PAGES: usize = 4;

/// Twitch token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// IGDB API client
pub struct IgdbClient {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl IgdbClient {
    /// Build a client from configuration. Both credentials are required.
    pub fn from_config(config: &IgdbConfig) -> Result<Self, ProviderError> {
        let client_id = config
            .client_id
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("IGDB client_id missing".to_string()))?;
        let client_secret = config.client_secret.clone().ok_or_else(|| {
            ProviderError::NotConfigured("IGDB client_secret missing".to_string())
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            client_id,
            client_secret,
            token: Mutex::new(None),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// Return a valid access token, refreshing it when expired
    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting IGDB access token");
        let response = self
            .client
            .post(TOKEN_URL)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api(
                status.as_u16(),
                "token request rejected".to_string(),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Token response: {}", e)))?;

        // Refresh a minute early
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        let value = token.access_token.clone();
        *guard = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime,
        });
        info!("IGDB access token refreshed");
        Ok(value)
    }

    /// POST one apicalypse query to an endpoint
    async fn query(&self, endpoint: &str, body: String) -> Result<Vec<Value>, ProviderError> {
        let token = self.access_token().await?;
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(endpoint, body = %body, "Querying IGDB");

        let response = self
            .client
            .post(&url)
            .header("Client-ID", &self.client_id)
            .header("Authorization", format!("Bearer {}", token))
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("IGDB request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(endpoint, "IGDB rate limit hit");
            return Err(ProviderError::RateLimited);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status.as_u16(), text));
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| ProviderError::Parse(format!("IGDB response: {}", e)))
    }
}

/// Endpoint serving an entity kind
pub fn endpoint(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Game => "games",
        EntityKind::Platform => "platforms",
        EntityKind::Company => "companies",
        EntityKind::Cover => "covers",
        EntityKind::Screenshot => "screenshots",
        EntityKind::Artwork => "artworks",
        EntityKind::AgeRating => "age_ratings",
        EntityKind::PlatformLogo => "platform_logos",
    }
}

/// Escape a value for use inside an apicalypse string literal
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Whether an entity kind has a `slug` field
fn has_slug(kind: EntityKind) -> bool {
    matches!(
        kind,
        EntityKind::Game | EntityKind::Platform | EntityKind::Company
    )
}

/// Build the query fetching one entity. Numeric keys are ids, anything else
/// is a slug.
pub fn build_fetch_query(kind: EntityKind, id_or_slug: &str) -> Option<String> {
    let key = id_or_slug.trim();
    if key.is_empty() {
        return None;
    }
    if key.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("fields *; where id = {}; limit 1;", key))
    } else if has_slug(kind) {
        Some(format!("fields *; where slug = \"{}\"; limit 1;", quote(key)))
    } else {
        None
    }
}

/// Build one page of a name search
pub fn build_search_query(
    query: &str,
    strategy: SearchStrategy,
    platform: Option<&str>,
    offset: usize,
) -> String {
    let name_clause = match strategy {
        SearchStrategy::ExactPhrase => format!("name = \"{}\"", quote(query)),
        SearchStrategy::Fuzzy => format!("name ~ *\"{}\"*", quote(query)),
        SearchStrategy::CaseInsensitiveExact => format!("name ~ \"{}\"", quote(query)),
    };

    let where_clause = match platform.filter(|p| p.chars().all(|c| c.is_ascii_digit())) {
        Some(p) => format!("{} & platforms = ({})", name_clause, p),
        None => name_clause,
    };

    format!(
        "fields *; where {}; sort id asc; limit {}; offset {};",
        where_clause, PAGE_SIZE, offset
    )
}

/// Convert a raw IGDB record into a provider entity
fn to_entity(value: Value) -> Option<ProviderEntity> {
    let id = match value.get("id")? {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    let slug = value
        .get("slug")
        .and_then(Value::as_str)
        .map(str::to_string);
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(ProviderEntity {
        id,
        slug,
        name,
        payload: value,
    })
}

#[async_trait]
impl MetadataProvider for IgdbClient {
    fn source(&self) -> MetadataSource {
        MetadataSource::IGDB
    }

    async fn fetch_by_id_or_slug(
        &self,
        kind: EntityKind,
        id_or_slug: &str,
    ) -> Result<Option<ProviderEntity>, ProviderError> {
        let Some(body) = build_fetch_query(kind, id_or_slug) else {
            return Ok(None);
        };
        let rows = self.query(endpoint(kind), body).await?;
        Ok(rows.into_iter().find_map(to_entity))
    }

    async fn search_by_name(
        &self,
        kind: EntityKind,
        query: &str,
        strategy: SearchStrategy,
        platform: Option<&str>,
    ) -> Result<Vec<ProviderEntity>, ProviderError> {
        if !matches!(
            kind,
            EntityKind::Game | EntityKind::Platform | EntityKind::Company
        ) {
            return Err(ProviderError::Unsupported {
                provider: MetadataSource::IGDB,
                kind,
            });
        }

        let platform = if kind == EntityKind::Game { platform } else { None };
        let mut results = Vec::new();
        for page in 0..MAX_PAGES {
            let body = build_search_query(query, strategy, platform, page * PAGE_SIZE);
            let rows = self.query(endpoint(kind), body).await?;
            let count = rows.len();
            results.extend(rows.into_iter().filter_map(to_entity));
            if count < PAGE_SIZE {
                break;
            }
        }

        debug!(%kind, query, ?strategy, hits = results.len(), "IGDB search complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fetch_query_id_vs_slug() {
        assert_eq!(
            build_fetch_query(EntityKind::Game, "1020").unwrap(),
            "fields *; where id = 1020; limit 1;"
        );
        assert_eq!(
            build_fetch_query(EntityKind::Platform, "nes").unwrap(),
            "fields *; where slug = \"nes\"; limit 1;"
        );
        // Covers have no slug
        assert!(build_fetch_query(EntityKind::Cover, "abc").is_none());
        assert!(build_fetch_query(EntityKind::Game, "  ").is_none());
    }

    #[test]
    fn test_search_query_strategies() {
        let exact = build_search_query("Contra", SearchStrategy::ExactPhrase, None, 0);
        assert!(exact.contains("where name = \"Contra\";"));
        assert!(exact.contains("limit 500; offset 0;"));

        let fuzzy = build_search_query("Contra", SearchStrategy::Fuzzy, Some("18"), 500);
        assert!(fuzzy.contains("name ~ *\"Contra\"* & platforms = (18)"));
        assert!(fuzzy.contains("offset 500;"));

        let ci = build_search_query("contra", SearchStrategy::CaseInsensitiveExact, None, 0);
        assert!(ci.contains("name ~ \"contra\""));
    }

    #[test]
    fn test_search_query_escapes_quotes() {
        let q = build_search_query("Say \"Hi\"", SearchStrategy::ExactPhrase, None, 0);
        assert!(q.contains("name = \"Say \\\"Hi\\\"\""));
    }

    #[test]
    fn test_non_numeric_platform_ignored() {
        let q = build_search_query("Contra", SearchStrategy::ExactPhrase, Some("nes"), 0);
        assert!(!q.contains("platforms"));
    }

    #[test]
    fn test_to_entity() {
        let entity = to_entity(json!({"id": 18, "name": "Nintendo Entertainment System", "slug": "nes"}))
            .unwrap();
        assert_eq!(entity.id, "18");
        assert_eq!(entity.slug.as_deref(), Some("nes"));

        let cover = to_entity(json!({"id": 5, "image_id": "co1abc"})).unwrap();
        assert_eq!(cover.name, "");
        assert!(to_entity(json!({"name": "no id"})).is_none());
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = IgdbConfig::default();
        assert!(matches!(
            IgdbClient::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));

        let config = IgdbConfig {
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            requests_per_second: 0,
        };
        let client = IgdbClient::from_config(&config).unwrap();
        assert!(client.base_url.contains("api.igdb.com"));
    }
}
