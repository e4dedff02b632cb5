//! Configuration loading
//!
//! Bootstrap configuration comes from a TOML file. Its location and a few
//! sensitive values follow this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: the service logs a warning and starts
//! with compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG_PATH: &str = "SIGCAT_CONFIG";
/// Environment variable overriding `database_path`
pub const ENV_DATABASE_PATH: &str = "SIGCAT_DATABASE";
/// Environment variable overriding `igdb.client_id`
pub const ENV_IGDB_CLIENT_ID: &str = "SIGCAT_IGDB_CLIENT_ID";
/// Environment variable overriding `igdb.client_secret`
pub const ENV_IGDB_CLIENT_SECRET: &str = "SIGCAT_IGDB_CLIENT_SECRET";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite catalog database
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Background scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Metadata matcher configuration
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// IGDB API credentials and limits
    #[serde(default)]
    pub igdb: IgdbConfig,

    /// TheGamesDb bulk dump location
    #[serde(default)]
    pub thegamesdb: DumpConfig,

    /// Provider enablement
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            logging: LoggingConfig::default(),
            scheduler: SchedulerConfig::default(),
            matcher: MatcherConfig::default(),
            igdb: IgdbConfig::default(),
            thegamesdb: DumpConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Scheduler tick and per-job intervals (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    #[serde(default = "default_metadata_sweep_seconds")]
    pub metadata_sweep_seconds: u64,
    #[serde(default = "default_vote_tally_seconds")]
    pub vote_tally_seconds: u64,
    #[serde(default = "default_link_backfill_seconds")]
    pub link_backfill_seconds: u64,
    /// Maximum objects visited by one bulk metadata sweep per object type
    #[serde(default = "default_sweep_limit")]
    pub sweep_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
            metadata_sweep_seconds: default_metadata_sweep_seconds(),
            vote_tally_seconds: default_vote_tally_seconds(),
            link_backfill_seconds: default_link_backfill_seconds(),
            sweep_limit: default_sweep_limit(),
        }
    }
}

/// Metadata matcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Upper bound a synchronous caller waits for a metadata search
    #[serde(default = "default_sync_timeout_seconds")]
    pub sync_timeout_seconds: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            sync_timeout_seconds: default_sync_timeout_seconds(),
        }
    }
}

/// IGDB credentials (Twitch client-credentials flow)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgdbConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Requests per second allowed against the IGDB API
    #[serde(default = "default_igdb_rps")]
    pub requests_per_second: u32,
}

impl Default for IgdbConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            requests_per_second: default_igdb_rps(),
        }
    }
}

/// Location of a provider's bulk dump file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DumpConfig {
    #[serde(default)]
    pub dump_path: Option<PathBuf>,
}

/// Which providers participate in automatic matching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_enabled_providers")]
    pub enabled: Vec<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_providers(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_seconds() -> u64 {
    5
}

fn default_metadata_sweep_seconds() -> u64 {
    60 * 60
}

fn default_vote_tally_seconds() -> u64 {
    15 * 60
}

fn default_link_backfill_seconds() -> u64 {
    6 * 60 * 60
}

fn default_sweep_limit() -> u32 {
    10_000
}

fn default_sync_timeout_seconds() -> u64 {
    15
}

fn default_igdb_rps() -> u32 {
    4
}

fn default_enabled_providers() -> Vec<String> {
    vec!["IGDB".to_string(), "TheGamesDb".to_string()]
}

/// Get OS-dependent default database path
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sigcat").join("sigcat.db"))
        .unwrap_or_else(|| PathBuf::from("./sigcat_data/sigcat.db"))
}

/// Candidate config file locations, most specific first
fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("sigcat").join("config.toml"));
    }
    if cfg!(unix) {
        locations.push(PathBuf::from("/etc/sigcat/config.toml"));
    }
    locations
}

/// Locate the config file: CLI argument, then `SIGCAT_CONFIG`, then default locations.
///
/// Returns `None` when no file exists; callers then fall back to defaults.
pub fn locate_config_file(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_locations().into_iter().find(|p| p.exists())
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve the effective configuration.
///
/// An explicitly named file (CLI or ENV) that fails to load is an error. A
/// missing default-location file degrades to compiled defaults.
pub fn resolve_config(cli_config: Option<&Path>, cli_database: Option<&Path>) -> Result<TomlConfig> {
    let explicit = cli_config.is_some() || std::env::var(ENV_CONFIG_PATH).is_ok();

    let mut config = match locate_config_file(cli_config) {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)?
        }
        Some(path) if explicit => {
            return Err(Error::ConfigMissing(path));
        }
        _ => {
            warn!("No config file found, using compiled defaults");
            TomlConfig::default()
        }
    };

    apply_overrides(&mut config, cli_database);
    Ok(config)
}

/// Apply CLI and environment overrides on top of the file configuration
fn apply_overrides(config: &mut TomlConfig, cli_database: Option<&Path>) {
    if let Some(path) = cli_database {
        config.database_path = path.to_path_buf();
    } else if let Some(path) = env_non_empty(ENV_DATABASE_PATH) {
        config.database_path = PathBuf::from(path);
    }

    if let Some(id) = env_non_empty(ENV_IGDB_CLIENT_ID) {
        config.igdb.client_id = Some(id);
    }
    if let Some(secret) = env_non_empty(ENV_IGDB_CLIENT_SECRET) {
        config.igdb.client_secret = Some(secret);
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}
