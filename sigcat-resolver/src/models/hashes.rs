//! Hash query validation

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Hash values supplied by a caller; at least MD5 or SHA1 is required
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashQuery {
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub crc: Option<String>,
}

/// Normalized (lowercase, length-checked) hashes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedHashes {
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub crc: Option<String>,
}

impl HashQuery {
    pub fn md5(value: impl Into<String>) -> Self {
        Self {
            md5: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn sha1(value: impl Into<String>) -> Self {
        Self {
            sha1: Some(value.into()),
            ..Default::default()
        }
    }

    /// Normalize and validate.
    ///
    /// Blank values count as absent. A supplied value of the wrong length or with
    /// non-hex characters is rejected even when another usable hash is present.
    pub fn validate(&self) -> Result<ValidatedHashes> {
        let md5 = normalize(self.md5.as_deref(), 32, "md5")?;
        let sha1 = normalize(self.sha1.as_deref(), 40, "sha1")?;
        let sha256 = normalize(self.sha256.as_deref(), 64, "sha256")?;
        let crc = normalize(self.crc.as_deref(), 8, "crc")?;

        if md5.is_none() && sha1.is_none() {
            return Err(Error::InvalidInput(
                "an md5 (32 hex chars) or sha1 (40 hex chars) hash is required".to_string(),
            ));
        }

        Ok(ValidatedHashes {
            md5,
            sha1,
            sha256,
            crc,
        })
    }
}

fn normalize(value: Option<&str>, expected_len: usize, label: &str) -> Result<Option<String>> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if raw.len() != expected_len || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidInput(format!(
            "{} must be {} hex characters",
            label, expected_len
        )));
    }

    Ok(Some(raw.to_ascii_lowercase()))
}
