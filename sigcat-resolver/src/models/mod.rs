//! Domain models

pub mod hashes;
pub mod metadata;
pub mod object;
pub mod signature;

pub use hashes::{HashQuery, ValidatedHashes};
pub use metadata::{MatchMethod, MetadataLink, MetadataSource};
pub use object::{
    Attribute, AttributeName, AttributeValue, CanonicalObject, ObjectType, SignatureLink,
    SignatureType,
};
pub use signature::{SignatureGame, SignaturePlatform, SignaturePublisher, SignatureRom};
