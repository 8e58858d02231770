// Cross-references between requirements and units of work.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::{Id, IdError, InvalidProvenanceError, Provenance};

/// An entry of a `dependencies`, `implements` or `validates` list.
///
/// In a source document a reference is written either as a bare identifier
/// (`FR-001`) or qualified with the provenance of the document that defines
/// it (`base:FR-001`). Qualification lets an extension refer to the base's
/// `FR-001` while also defining an `FR-001` of its own.
///
/// The merge engine rewrites references into [`Reference::Resolved`] final
/// identifiers. Resolved references are never rewritten again.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reference {
    /// A reference as written in a source document.
    Unresolved {
        /// The source the identifier belongs to, if qualified.
        provenance: Option<Provenance>,
        /// The identifier as written in that source.
        id: Id,
    },
    /// A final identifier in the merged document.
    Resolved(Id),
}

impl Reference {
    /// An unqualified reference to `id`.
    #[must_use]
    pub const fn to(id: Id) -> Self {
        Self::Unresolved {
            provenance: None,
            id,
        }
    }

    /// A reference to `id` as defined by `provenance`.
    #[must_use]
    pub const fn qualified(provenance: Provenance, id: Id) -> Self {
        Self::Unresolved {
            provenance: Some(provenance),
            id,
        }
    }

    /// The identifier this reference points at.
    ///
    /// For an unresolved qualified reference this is the identifier as
    /// written in the named source, which is not necessarily its final name.
    #[must_use]
    pub const fn id(&self) -> &Id {
        match self {
            Self::Unresolved { id, .. } | Self::Resolved(id) => id,
        }
    }

    /// Whether this reference has been rewritten to a final identifier.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// The target this reference can be checked against: a final id, or an
    /// unqualified id that is expected to exist as written.
    ///
    /// Returns `None` for qualified references that were never resolved.
    #[must_use]
    pub const fn target(&self) -> Option<&Id> {
        match self {
            Self::Resolved(id)
            | Self::Unresolved {
                provenance: None,
                id,
            } => Some(id),
            Self::Unresolved {
                provenance: Some(_),
                ..
            } => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unresolved {
                provenance: Some(provenance),
                id,
            } => write!(f, "{provenance}:{id}"),
            Self::Unresolved { provenance: None, id } | Self::Resolved(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for Reference {
    type Err = ParseReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((provenance, id)) => Ok(Self::qualified(provenance.parse()?, id.parse()?)),
            None => Ok(Self::to(s.parse()?)),
        }
    }
}

impl Serialize for Reference {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing a reference.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseReferenceError {
    /// The identifier part is invalid.
    #[error(transparent)]
    Id(#[from] IdError),
    /// The provenance qualifier is invalid.
    #[error(transparent)]
    Provenance(#[from] InvalidProvenanceError),
}
