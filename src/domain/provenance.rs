use std::{fmt, str::FromStr};

use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};

use crate::domain::Tag;

/// The provenance reserved for the base document.
pub const BASE: &str = "base";

/// The identity of a source document, e.g. `base` or `e-commerce`.
///
/// Provenance is used to detect duplicate identifiers within one source, to
/// qualify references (`e-commerce:FR-001`) and to derive the [`Tag`] used
/// when an identifier has to be renamed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Provenance(NonEmptyString);

impl Provenance {
    /// Creates a new provenance.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidProvenanceError`] if the name is empty, contains no
    /// ASCII alphanumeric character (no tag could be derived from it), or
    /// contains `:` or whitespace (which would make qualified references
    /// ambiguous).
    pub fn new(name: String) -> Result<Self, InvalidProvenanceError> {
        if name.contains(':') || name.chars().any(char::is_whitespace) {
            return Err(InvalidProvenanceError(name));
        }
        if Tag::derive(&name).is_none() {
            return Err(InvalidProvenanceError(name));
        }
        NonEmptyString::new(name.clone())
            .map(Self)
            .map_err(|_| InvalidProvenanceError(name))
    }

    /// The provenance of the base document.
    #[must_use]
    pub fn base() -> Self {
        Self(NonEmptyString::new(BASE.to_string()).expect("'base' is non-empty"))
    }

    /// Whether this is the base provenance.
    #[must_use]
    pub fn is_base(&self) -> bool {
        self.as_str() == BASE
    }

    /// The tag derived from this provenance (`e-commerce` → `ECOMMERCE`).
    #[must_use]
    pub fn tag(&self) -> Tag {
        Tag::derive(self.as_str()).expect("validated on construction")
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = InvalidProvenanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl Serialize for Provenance {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Provenance {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// Error returned when a provenance name is unusable.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error(
    "Invalid provenance '{0}': must contain a letter or digit and no whitespace or ':'"
)]
pub struct InvalidProvenanceError(String);
