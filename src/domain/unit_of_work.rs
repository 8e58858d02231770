use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{LinkKind, Metadata, Priority, Reference};

/// The architectural layer a unit of work belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Layer {
    /// Project skeleton, tooling, shared domain types.
    Foundation,
    /// Persistence, messaging, external services.
    Infrastructure,
    /// Business features.
    Application,
    /// Wiring between systems.
    Integration,
    /// Packaging and release.
    Deployment,
}

impl Layer {
    /// All layers, in build order.
    pub const ALL: [Self; 5] = [
        Self::Foundation,
        Self::Infrastructure,
        Self::Application,
        Self::Integration,
        Self::Deployment,
    ];
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Foundation => "Foundation",
            Self::Infrastructure => "Infrastructure",
            Self::Application => "Application",
            Self::Integration => "Integration",
            Self::Deployment => "Deployment",
        };
        f.write_str(s)
    }
}

/// Estimated effort of a unit of work, in whole hours.
///
/// Sources write this either as a number (`24`) or as a numeric string
/// (`"24"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawEffort", into = "u32")]
pub struct Effort(u32);

impl Effort {
    /// An effort of `hours` hours.
    #[must_use]
    pub const fn hours(hours: u32) -> Self {
        Self(hours)
    }

    /// The number of hours.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<Effort> for u32 {
    fn from(effort: Effort) -> Self {
        effort.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEffort {
    Hours(u32),
    Text(String),
}

impl TryFrom<RawEffort> for Effort {
    type Error = String;

    fn try_from(raw: RawEffort) -> Result<Self, Self::Error> {
        match raw {
            RawEffort::Hours(hours) => Ok(Self(hours)),
            RawEffort::Text(text) => text
                .trim()
                .parse()
                .map(Self)
                .map_err(|_| format!("invalid effort '{text}': expected a whole number of hours")),
        }
    }
}

/// An implementation task linking requirements to engineering effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOfWork {
    /// Short human-readable name.
    pub name: String,

    /// What completing the unit of work achieves.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub goal: String,

    /// Architectural layer.
    pub layer: Layer,

    /// Scheduling priority, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    /// Units of work that must be completed first, in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Reference>,

    /// Requirements this unit of work implements, in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements: Vec<Reference>,

    /// Estimated effort.
    #[serde(
        rename = "estimated_effort_hours",
        alias = "effort",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub estimated_effort: Option<Effort>,

    /// Acceptance criteria, kept exactly as written.
    #[serde(default, skip_serializing_if = "serde_yaml::Value::is_null")]
    pub acceptance_criteria: serde_yaml::Value,

    /// Everything else, preserved verbatim.
    #[serde(flatten)]
    pub metadata: Metadata,
}

impl UnitOfWork {
    /// Construct a unit of work with no links and no metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, layer: Layer) -> Self {
        Self {
            name: name.into(),
            goal: String::new(),
            layer,
            priority: None,
            dependencies: Vec::new(),
            implements: Vec::new(),
            estimated_effort: None,
            acceptance_criteria: serde_yaml::Value::Null,
            metadata: Metadata::new(),
        }
    }

    /// All outgoing references, dependencies first.
    pub fn links(&self) -> impl Iterator<Item = (LinkKind, &Reference)> {
        self.dependencies
            .iter()
            .map(|r| (LinkKind::Dependency, r))
            .chain(self.implements.iter().map(|r| (LinkKind::Implements, r)))
    }

    pub(crate) fn references_mut(&mut self) -> impl Iterator<Item = &mut Reference> {
        self.dependencies.iter_mut().chain(self.implements.iter_mut())
    }
}
