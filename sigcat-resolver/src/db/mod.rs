//! Database access for sigcat-resolver
//!
//! One module per table family. Every function is a single statement (or a
//! short sequence of independent statements); concurrent writers to the same
//! row are last-writer-wins.

pub mod links;
pub mod objects;
pub mod provider_cache;
pub mod resolution_cache;
pub mod signatures;
pub mod votes;
