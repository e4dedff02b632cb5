//! Canonical catalog objects and their typed attributes

use crate::models::MetadataLink;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical object variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Company,
    Platform,
    Game,
    App,
    #[serde(rename = "ROM")]
    Rom,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Company => "Company",
            ObjectType::Platform => "Platform",
            ObjectType::Game => "Game",
            ObjectType::App => "App",
            ObjectType::Rom => "ROM",
        }
    }

    /// Object types that carry provider metadata links
    pub fn supports_metadata(&self) -> bool {
        matches!(
            self,
            ObjectType::Company | ObjectType::Platform | ObjectType::Game
        )
    }

    /// Parse a stored tag; unknown tags indicate corrupted state
    pub fn from_stored(s: &str) -> Result<Self> {
        s.parse()
            .map_err(|_| Error::Fatal(format!("invalid object type '{}'", s)))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "company" | "publisher" => Ok(ObjectType::Company),
            "platform" => Ok(ObjectType::Platform),
            "game" => Ok(ObjectType::Game),
            "app" => Ok(ObjectType::App),
            "rom" => Ok(ObjectType::Rom),
            other => Err(Error::InvalidInput(format!("unknown object type '{}'", other))),
        }
    }
}

/// Kind of raw signature row an object can be linked to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureType {
    Game,
    Platform,
    Company,
}

impl SignatureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureType::Game => "Game",
            SignatureType::Platform => "Platform",
            SignatureType::Company => "Company",
        }
    }

    pub fn from_stored(s: &str) -> Result<Self> {
        match s {
            "Game" => Ok(SignatureType::Game),
            "Platform" => Ok(SignatureType::Platform),
            "Company" => Ok(SignatureType::Company),
            other => Err(Error::Fatal(format!("invalid signature type '{}'", other))),
        }
    }
}

/// Link from a canonical object to one raw signature row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureLink {
    pub signature_type: SignatureType,
    pub signature_id: i64,
}

/// Attribute names used by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeName {
    Description,
    Manufacturer,
    Publisher,
    Platform,
    ReleaseDate,
    Year,
    Logo,
    LogoAttribution,
    Wikipedia,
    Homepage,
    Demo,
    Tags,
}

impl AttributeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeName::Description => "Description",
            AttributeName::Manufacturer => "Manufacturer",
            AttributeName::Publisher => "Publisher",
            AttributeName::Platform => "Platform",
            AttributeName::ReleaseDate => "ReleaseDate",
            AttributeName::Year => "Year",
            AttributeName::Logo => "Logo",
            AttributeName::LogoAttribution => "LogoAttribution",
            AttributeName::Wikipedia => "Wikipedia",
            AttributeName::Homepage => "Homepage",
            AttributeName::Demo => "Demo",
            AttributeName::Tags => "Tags",
        }
    }

    pub fn from_stored(s: &str) -> Result<Self> {
        let name = match s {
            "Description" => AttributeName::Description,
            "Manufacturer" => AttributeName::Manufacturer,
            "Publisher" => AttributeName::Publisher,
            "Platform" => AttributeName::Platform,
            "ReleaseDate" => AttributeName::ReleaseDate,
            "Year" => AttributeName::Year,
            "Logo" => AttributeName::Logo,
            "LogoAttribution" => AttributeName::LogoAttribution,
            "Wikipedia" => AttributeName::Wikipedia,
            "Homepage" => AttributeName::Homepage,
            "Demo" => AttributeName::Demo,
            "Tags" => AttributeName::Tags,
            other => return Err(Error::Fatal(format!("invalid attribute name '{}'", other))),
        };
        Ok(name)
    }
}

/// Image credit stored alongside an image id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttribution {
    pub source_name: String,
    pub source_url: Option<String>,
    pub license: Option<String>,
}

/// Typed attribute value; the variant is the attribute's type tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AttributeValue {
    LongString(String),
    ShortString(String),
    DateTime(DateTime<Utc>),
    ImageId(String),
    ImageAttribution(ImageAttribution),
    Link(String),
    Boolean(bool),
    ObjectRelationship { object_type: ObjectType, object_id: i64 },
    EmbeddedList(Vec<String>),
}

impl AttributeValue {
    /// Type tag stored next to the encoded value
    pub fn tag(&self) -> &'static str {
        match self {
            AttributeValue::LongString(_) => "LongString",
            AttributeValue::ShortString(_) => "ShortString",
            AttributeValue::DateTime(_) => "DateTime",
            AttributeValue::ImageId(_) => "ImageId",
            AttributeValue::ImageAttribution(_) => "ImageAttribution",
            AttributeValue::Link(_) => "Link",
            AttributeValue::Boolean(_) => "Boolean",
            AttributeValue::ObjectRelationship { .. } => "ObjectRelationship",
            AttributeValue::EmbeddedList(_) => "EmbeddedList",
        }
    }

    /// Empty values lose to non-empty ones when objects are merged
    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::LongString(s)
            | AttributeValue::ShortString(s)
            | AttributeValue::ImageId(s)
            | AttributeValue::Link(s) => s.trim().is_empty(),
            AttributeValue::ImageAttribution(a) => a.source_name.trim().is_empty(),
            AttributeValue::EmbeddedList(items) => items.is_empty(),
            AttributeValue::ObjectRelationship { object_id, .. } => *object_id <= 0,
            AttributeValue::DateTime(_) | AttributeValue::Boolean(_) => false,
        }
    }
}

/// One named attribute of a canonical object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: AttributeName,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(name: AttributeName, value: AttributeValue) -> Self {
        Self { name, value }
    }

    /// Relationship attribute pointing at another canonical object
    pub fn relationship(name: AttributeName, object_type: ObjectType, object_id: i64) -> Self {
        Self::new(
            name,
            AttributeValue::ObjectRelationship {
                object_type,
                object_id,
            },
        )
    }
}

/// The catalog's deduplicated entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalObject {
    pub id: i64,
    pub object_type: ObjectType,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ordered attributes
    pub attributes: Vec<Attribute>,
    pub signature_links: Vec<SignatureLink>,
    pub metadata_links: Vec<MetadataLink>,
}

impl CanonicalObject {
    pub fn attribute(&self, name: AttributeName) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    /// Target of a relationship attribute
    pub fn relationship(&self, name: AttributeName) -> Option<(ObjectType, i64)> {
        match self.attribute(name) {
            Some(AttributeValue::ObjectRelationship {
                object_type,
                object_id,
            }) => Some((*object_type, *object_id)),
            _ => None,
        }
    }

    pub fn metadata_link(&self, source: crate::models::MetadataSource) -> Option<&MetadataLink> {
        self.metadata_links.iter().find(|l| l.source == source)
    }
}
