use std::{fmt, ops::Deref, str::FromStr, sync::LazyLock};

use non_empty_string::NonEmptyString;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.]+(-[A-Za-z0-9_.]+)*$").expect("identifier pattern is valid")
});

/// A validated string containing only uppercase ASCII letters and digits
/// ([A-Z0-9]+).
///
/// Tags are inserted into colliding identifiers to make them unique, so they
/// must never contain the `-` separator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tag(NonEmptyString);

impl Tag {
    /// Creates a new `Tag` from a string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTagError` if the string is empty or contains
    /// characters other than uppercase letters and digits.
    pub fn new(s: String) -> Result<Self, InvalidTagError> {
        let non_empty = NonEmptyString::new(s.clone()).map_err(|_| InvalidTagError(s.clone()))?;

        if !s
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(InvalidTagError(s));
        }

        Ok(Self(non_empty))
    }

    /// Derives a tag from a free-form category name.
    ///
    /// Keeps the ASCII alphanumeric characters and upper-cases them, so
    /// `e-commerce` becomes `ECOMMERCE` and `ai-ml` becomes `AIML`. Returns
    /// `None` if nothing is left.
    #[must_use]
    pub fn derive(name: &str) -> Option<Self> {
        let tag: String = name
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        Self::new(tag).ok()
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Deref for Tag {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0.as_str()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Tag {
    type Err = InvalidTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Tag {
    type Error = InvalidTagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl Serialize for Tag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// Error returned when a string doesn't match the required pattern [A-Z0-9]+.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid tag '{0}': must be non-empty and contain only uppercase letters and digits")]
pub struct InvalidTagError(String);

/// An identifier of a requirement or unit of work.
///
/// Format: one or more segments separated by single dashes, where each
/// segment consists of ASCII letters, digits, `_` or `.`. The first segment is
/// the *prefix* and names the entity family.
///
/// Examples: `FR-001`, `NFR-010`, `UoW-301A`, `FR-ECOMMERCE-001`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(String);

impl Id {
    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the prefix segment (everything before the first dash).
    ///
    /// ```
    /// use ssot::Id;
    ///
    /// let id: Id = "UoW-010".parse().unwrap();
    /// assert_eq!(id.prefix(), "UoW");
    /// ```
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.0.split_once('-').map_or(self.0.as_str(), |(prefix, _)| prefix)
    }

    /// Inserts a tag immediately after the prefix segment.
    ///
    /// An identifier without a dash has the tag appended instead.
    ///
    /// ```
    /// use ssot::{Id, Tag};
    ///
    /// let id: Id = "FR-001".parse().unwrap();
    /// let tag: Tag = "ECOMMERCE".parse().unwrap();
    /// assert_eq!(id.tagged(&tag).as_str(), "FR-ECOMMERCE-001");
    /// ```
    #[must_use]
    pub fn tagged(&self, tag: &Tag) -> Self {
        match self.0.split_once('-') {
            Some((prefix, rest)) => Self(format!("{prefix}-{tag}-{rest}")),
            None => Self(format!("{}-{tag}", self.0)),
        }
    }

    /// Appends a numeric disambiguation suffix, e.g. `FR-ECOMMERCE-001-2`.
    #[must_use]
    pub fn with_suffix(&self, n: usize) -> Self {
        Self(format!("{}-{n}", self.0))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::Empty);
        }

        if !ID_PATTERN.is_match(s) {
            return Err(Error::Syntax(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }
}

impl TryFrom<&str> for Id {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

impl Serialize for Id {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur during identifier parsing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The identifier was empty.
    #[error("Invalid identifier: cannot be empty")]
    Empty,

    /// The identifier contained characters or separators that are not allowed.
    #[error("Invalid identifier format: {0}")]
    Syntax(String),
}
