//! sigcat-resolver library interface
//!
//! Resolution core of the signature catalog: hash lookup, canonical object
//! creation, provider metadata matching, voting consensus and the background
//! scheduler that keeps them current.

pub mod catalog;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod providers;
pub mod scheduler;
pub mod services;

pub use crate::catalog::{Catalog, LookupResult, SearchResult};
pub use crate::context::RunContext;
pub use crate::error::{Error, ErrorClass, Result};
