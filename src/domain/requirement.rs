use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::domain::{LinkKind, Reference};

/// Free-form fields carried through the merge verbatim.
///
/// Tags, acceptance criteria, business value, measurement criteria and any
/// other field the schema does not name end up here. The merge engine never
/// interprets them.
pub type Metadata = BTreeMap<String, serde_yaml::Value>;

/// How important a requirement (or unit of work) is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Must be delivered for the system to be viable.
    Critical,
    /// Important, delivered early.
    High,
    /// Normal priority.
    Medium,
    /// Nice to have.
    Low,
}

impl Priority {
    /// All priorities, most important first.
    pub const ALL: [Self; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        };
        f.write_str(s)
    }
}

/// A functional or non-functional requirement.
///
/// The identifier is not stored here; it is the key of the section the
/// requirement lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    /// Short human-readable name.
    #[serde(alias = "name")]
    pub title: String,

    /// What the requirement demands.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Grouping used for statistics, e.g. `Security` or `Performance`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// How important the requirement is.
    pub priority: Priority,

    /// Requirements this one depends on, in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Reference>,

    /// Requirements this one validates (typically an NFR constraining FRs).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validates: Vec<Reference>,

    /// Everything else, preserved verbatim.
    #[serde(flatten)]
    pub metadata: Metadata,
}

impl Requirement {
    /// Construct a requirement with no links and no metadata.
    #[must_use]
    pub fn new(title: impl Into<String>, priority: Priority) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category: None,
            priority,
            dependencies: Vec::new(),
            validates: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// All outgoing references, dependencies first.
    pub fn links(&self) -> impl Iterator<Item = (LinkKind, &Reference)> {
        self.dependencies
            .iter()
            .map(|r| (LinkKind::Dependency, r))
            .chain(self.validates.iter().map(|r| (LinkKind::Validates, r)))
    }

    pub(crate) fn references_mut(&mut self) -> impl Iterator<Item = &mut Reference> {
        self.dependencies.iter_mut().chain(self.validates.iter_mut())
    }
}
