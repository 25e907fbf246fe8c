//! Semantic service versions of the form `Major.Minor[.Patch][-SNAPSHOT]`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::types::Compatibility;

const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version is empty")]
    Empty,
    #[error("invalid version format: '{0}'")]
    InvalidFormat(String),
}

/// A parsed service version
///
/// Ordering compares numeric components left to right, treating missing trailing
/// components as 0 and ignoring the `-SNAPSHOT` suffix. Equality follows the same rule,
/// so `1.45` and `1.45.0-SNAPSHOT` are equal.
#[derive(Debug, Clone)]
pub struct ServiceVersion {
    raw: String,
    components: Vec<u64>,
}

impl ServiceVersion {
    pub fn parse(version: &str) -> Result<Self, VersionError> {
        let raw = version.trim();
        if raw.is_empty() {
            return Err(VersionError::Empty);
        }

        let numeric = raw.strip_suffix(SNAPSHOT_SUFFIX).unwrap_or(raw);
        let parts: Vec<&str> = numeric.split('.').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(VersionError::InvalidFormat(raw.to_string()));
        }

        let components = parts
            .iter()
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(VersionError::InvalidFormat(raw.to_string()));
                }
                part.parse::<u64>()
                    .map_err(|_| VersionError::InvalidFormat(raw.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            components,
        })
    }

    /// The version as originally written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_snapshot(&self) -> bool {
        self.raw.ends_with(SNAPSHOT_SUFFIX)
    }

    fn component(&self, index: usize) -> u64 {
        self.components.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for ServiceVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServiceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for ServiceVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let length = self.components.len().max(other.components.len());
        (0..length)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for ServiceVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ServiceVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ServiceVersion {}

/// `Ok` iff both versions parse and `current >= min`
pub fn check_compatibility(current: Option<&str>, min: &str) -> Compatibility {
    let (Some(current), Ok(min)) = (current, ServiceVersion::parse(min)) else {
        return Compatibility::Nok;
    };

    match ServiceVersion::parse(current) {
        Ok(current) if current >= min => Compatibility::Ok,
        _ => Compatibility::Nok,
    }
}
