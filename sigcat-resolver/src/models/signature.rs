//! Signature catalog rows (ingestion output, read-only here)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One cataloged dump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRom {
    pub id: i64,
    pub game_id: i64,
    pub name: String,
    pub size: Option<i64>,
    pub crc: Option<String>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    /// Development status ("release", "beta", "proto", ...)
    pub dev_status: Option<String>,
    /// Free-form attributes from the source file
    pub attributes: BTreeMap<String, String>,
    pub media_tags: Vec<String>,
    /// Catalog source the dump came from (No-Intro, Redump, TOSEC, ...)
    pub source: String,
    /// Precomputed source-quality score; higher wins on shared hashes
    pub score: i64,
    pub countries: Vec<String>,
    pub languages: Vec<String>,
}

/// Aggregation of roms sharing a game id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureGame {
    pub id: i64,
    pub name: String,
    pub year: Option<String>,
    pub publisher_id: Option<i64>,
    pub platform_id: Option<i64>,
    pub demo: bool,
    pub countries: Vec<String>,
    pub languages: Vec<String>,
}

/// Raw platform row referenced by signature games
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignaturePlatform {
    pub id: i64,
    pub name: String,
}

/// Raw publisher row referenced by signature games
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignaturePublisher {
    pub id: i64,
    pub name: String,
}
