//! # sigcat common library
//!
//! Shared code for the signature catalog services:
//! - Error type used across crates
//! - Configuration loading (CLI → ENV → TOML → defaults)
//! - Database initialization and schema creation
//! - Logging setup

pub mod config;
pub mod db;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
