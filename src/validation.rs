//! Checking a merged document for dangling references, dependency cycles and
//! units of work that depend on later layers.

use std::{collections::BTreeMap, fmt};

use nonempty::NonEmpty;
use petgraph::{algo::tarjan_scc, graphmap::DiGraphMap};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::domain::{
    EntityKind, Id, Layer, LinkKind, MergedDocument, Priority, Reference, Sections,
};

/// A reference to an identifier that the merged document does not define.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{from_kind} {from} {kind} {target}, which does not exist")]
pub struct DanglingReference {
    /// The referring entity.
    pub from: Id,
    /// What kind of entity the referring entity is.
    pub from_kind: EntityKind,
    /// Which list the reference sits in.
    pub kind: LinkKind,
    /// The target, as written.
    pub target: Reference,
}

/// A unit of work that depends on a unit of work in a later layer.
///
/// Layers build on each other in the order of [`Layer::ALL`]: a foundation
/// unit may not depend on an application or deployment unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{from} ({from_layer}) depends on {target} ({target_layer}), which is in a later layer")]
pub struct LayerViolation {
    /// The depending unit of work.
    pub from: Id,
    /// Its layer.
    pub from_layer: Layer,
    /// The unit of work it depends on.
    pub target: Id,
    /// The later layer that unit belongs to.
    pub target_layer: Layer,
}

/// Counts describing a merged document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Number of functional requirements.
    pub functional_requirements: usize,
    /// Number of non-functional requirements.
    pub non_functional_requirements: usize,
    /// Number of units of work.
    pub units_of_work: usize,
    /// Functional and non-functional requirements per priority. Every
    /// priority is listed, including those with no requirements.
    pub requirements_by_priority: BTreeMap<Priority, usize>,
    /// Units of work per layer. Every layer is listed.
    pub units_of_work_by_layer: BTreeMap<Layer, usize>,
    /// Requirements per category. Requirements without a category are not
    /// counted here.
    pub requirements_by_category: BTreeMap<String, usize>,
    /// Identifiers renamed to resolve conflicts.
    pub renamed_identifiers: usize,
    /// Sum of the estimated effort of all units of work.
    pub total_effort_hours: u64,
}

impl Statistics {
    /// Functional plus non-functional requirements.
    #[must_use]
    pub const fn total_requirements(&self) -> usize {
        self.functional_requirements + self.non_functional_requirements
    }

    fn collect(merged: &MergedDocument) -> Self {
        let mut statistics = Self {
            functional_requirements: merged.functional.len(),
            non_functional_requirements: merged.non_functional.len(),
            units_of_work: merged.units_of_work.len(),
            requirements_by_priority: Priority::ALL.iter().map(|&p| (p, 0)).collect(),
            units_of_work_by_layer: Layer::ALL.iter().map(|&l| (l, 0)).collect(),
            requirements_by_category: BTreeMap::new(),
            renamed_identifiers: merged.renames().len(),
            total_effort_hours: 0,
        };

        for requirement in merged
            .functional
            .values()
            .chain(merged.non_functional.values())
        {
            *statistics
                .requirements_by_priority
                .entry(requirement.priority)
                .or_default() += 1;
            if let Some(category) = &requirement.category {
                *statistics
                    .requirements_by_category
                    .entry(category.clone())
                    .or_default() += 1;
            }
        }

        for uow in merged.units_of_work.values() {
            *statistics.units_of_work_by_layer.entry(uow.layer).or_default() += 1;
            statistics.total_effort_hours += uow
                .estimated_effort
                .map_or(0, |effort| u64::from(effort.get()));
        }

        statistics
    }
}

/// The outcome of validating a merged document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Summary counts.
    pub statistics: Statistics,

    /// Every reference that does not resolve, one entry per occurrence, in
    /// document order.
    pub dangling: Vec<DanglingReference>,

    /// Dependency cycles, each listed as its sorted member identifiers. A
    /// single-member cycle is an entity that depends on itself.
    pub cycles: Vec<Vec<Id>>,

    /// Units of work depending on units of work in a later layer, in
    /// document order.
    pub layer_violations: Vec<LayerViolation>,
}

impl ValidationReport {
    /// Whether every reference resolves.
    ///
    /// Cycles and layer violations are reported but do not make a document
    /// invalid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.dangling.is_empty()
    }

    /// Converts a report with dangling references into an error.
    ///
    /// # Errors
    ///
    /// Returns [`UnresolvedReferencesError`] listing every dangling reference
    /// if there is at least one.
    pub fn into_result(self) -> Result<Self, UnresolvedReferencesError> {
        match NonEmpty::from_vec(self.dangling.clone()) {
            Some(dangling) => Err(UnresolvedReferencesError { dangling }),
            None => Ok(self),
        }
    }
}

/// A merged document references identifiers it does not define.
#[derive(Debug, thiserror::Error)]
pub struct UnresolvedReferencesError {
    dangling: NonEmpty<DanglingReference>,
}

impl UnresolvedReferencesError {
    /// The dangling references, in document order.
    #[must_use]
    pub const fn dangling(&self) -> &NonEmpty<DanglingReference> {
        &self.dangling
    }
}

impl fmt::Display for UnresolvedReferencesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX_DISPLAY: usize = 5;

        let total = self.dangling.len();
        write!(f, "{total} unresolved reference(s): ")?;

        let displayed: Vec<String> = self
            .dangling
            .iter()
            .take(MAX_DISPLAY)
            .map(|d| format!("{} -> {}", d.from, d.target))
            .collect();

        let msg = displayed.join(", ");

        if total <= MAX_DISPLAY {
            write!(f, "{msg}")
        } else {
            write!(f, "{msg}... (and {} more)", total - MAX_DISPLAY)
        }
    }
}

/// Validates a merged document.
///
/// Walks every dependency, `implements` and `validates` list, collecting
/// references that do not resolve, looks for dependency cycles and checks
/// that no unit of work depends on a later layer. Never modifies the document.
#[instrument(skip_all)]
#[must_use]
pub fn validate(merged: &MergedDocument) -> ValidationReport {
    let dangling = dangling_references(merged);
    let cycles = cycles(merged);
    let layer_violations = layer_violations(merged);
    let statistics = Statistics::collect(merged);

    debug!(
        entities = merged.len(),
        dangling = dangling.len(),
        cycles = cycles.len(),
        layer_violations = layer_violations.len(),
        "validated merged document"
    );

    ValidationReport {
        statistics,
        dangling,
        cycles,
        layer_violations,
    }
}

fn resolves<'a>(sections: &Sections, reference: &'a Reference) -> Option<&'a Id> {
    reference.target().filter(|id| sections.contains(id))
}

fn dangling_references(sections: &Sections) -> Vec<DanglingReference> {
    sections
        .links()
        .filter(|link| resolves(sections, link.reference).is_none())
        .map(|link| DanglingReference {
            from: link.from.clone(),
            from_kind: link.from_kind,
            kind: link.kind,
            target: link.reference.clone(),
        })
        .collect()
}

/// Strongly connected components of the `dependencies` graph, plus
/// self-dependencies.
fn cycles(sections: &Sections) -> Vec<Vec<Id>> {
    let mut graph: DiGraphMap<&Id, ()> = DiGraphMap::new();
    for (_, id) in sections.ids() {
        graph.add_node(id);
    }
    for link in sections.links() {
        if link.kind != LinkKind::Dependency {
            continue;
        }
        if let Some(target) = resolves(sections, link.reference) {
            graph.add_edge(link.from, target, ());
        }
    }

    let mut cycles: Vec<Vec<Id>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| match component.as_slice() {
            [single] => graph.contains_edge(*single, *single),
            _ => true,
        })
        .map(|component| {
            let mut ids: Vec<Id> = component.into_iter().cloned().collect();
            ids.sort();
            ids
        })
        .collect();
    cycles.sort();
    cycles
}

fn layer_violations(sections: &Sections) -> Vec<LayerViolation> {
    let mut violations = Vec::new();
    for (from, uow) in &sections.units_of_work {
        for reference in &uow.dependencies {
            let Some(target) = resolves(sections, reference) else {
                continue;
            };
            let Some(dependency) = sections.units_of_work.get(target) else {
                continue;
            };
            if dependency.layer > uow.layer {
                violations.push(LayerViolation {
                    from: from.clone(),
                    from_layer: uow.layer,
                    target: target.clone(),
                    target_layer: dependency.layer,
                });
            }
        }
    }
    violations
}
