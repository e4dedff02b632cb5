//! Errors raised while bootstrapping: configuration, logging, database open

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Creating the database directory failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config file named on the command line or in SIGCAT_CONFIG does not exist
    #[error("Config file not found: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}
