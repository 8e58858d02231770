use std::{
    collections::BTreeMap,
    fmt,
    ops::{Deref, DerefMut},
};

use serde::{Deserialize, Serialize};

use crate::domain::{Id, Metadata, Provenance, Reference, Requirement, Tag, UnitOfWork};

/// The three kinds of entity a requirements document holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A functional requirement.
    Functional,
    /// A non-functional requirement.
    NonFunctional,
    /// A unit of work.
    UnitOfWork,
}

impl EntityKind {
    /// The top-level key of the section holding this kind of entity.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::Functional => "functional_requirements",
            Self::NonFunctional => "non_functional_requirements",
            Self::UnitOfWork => "units_of_work",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Functional => "functional requirement",
            Self::NonFunctional => "non-functional requirement",
            Self::UnitOfWork => "unit of work",
        };
        f.write_str(s)
    }
}

/// The kind of a cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// An entry of a `dependencies` list.
    Dependency,
    /// An entry of a unit of work's `implements` list.
    Implements,
    /// An entry of a requirement's `validates` list.
    Validates,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dependency => "depends on",
            Self::Implements => "implements",
            Self::Validates => "validates",
        };
        f.write_str(s)
    }
}

/// A borrowed cross-reference together with the entity it starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link<'a> {
    /// The identifier of the referring entity.
    pub from: &'a Id,
    /// The kind of the entity the reference starts from.
    pub from_kind: EntityKind,
    /// Which list the reference sits in.
    pub kind: LinkKind,
    /// The reference itself.
    pub reference: &'a Reference,
}

/// The three identifier-keyed sections shared by source and merged documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sections {
    /// Functional requirements.
    #[serde(
        rename = "functional_requirements",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub functional: BTreeMap<Id, Requirement>,

    /// Non-functional requirements.
    #[serde(
        rename = "non_functional_requirements",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub non_functional: BTreeMap<Id, Requirement>,

    /// Units of work.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub units_of_work: BTreeMap<Id, UnitOfWork>,
}

impl Sections {
    /// Every identifier, functional first, then non-functional, then units of
    /// work, each section in key order.
    pub fn ids(&self) -> impl Iterator<Item = (EntityKind, &Id)> {
        self.functional
            .keys()
            .map(|id| (EntityKind::Functional, id))
            .chain(
                self.non_functional
                    .keys()
                    .map(|id| (EntityKind::NonFunctional, id)),
            )
            .chain(
                self.units_of_work
                    .keys()
                    .map(|id| (EntityKind::UnitOfWork, id)),
            )
    }

    /// Which section, if any, defines `id`.
    #[must_use]
    pub fn kind_of(&self, id: &Id) -> Option<EntityKind> {
        if self.functional.contains_key(id) {
            Some(EntityKind::Functional)
        } else if self.non_functional.contains_key(id) {
            Some(EntityKind::NonFunctional)
        } else if self.units_of_work.contains_key(id) {
            Some(EntityKind::UnitOfWork)
        } else {
            None
        }
    }

    /// Whether any section defines `id`.
    #[must_use]
    pub fn contains(&self, id: &Id) -> bool {
        self.kind_of(id).is_some()
    }

    /// Total number of entities across all sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functional.len() + self.non_functional.len() + self.units_of_work.len()
    }

    /// Whether all sections are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every cross-reference in the document, in section and key order.
    pub fn links(&self) -> impl Iterator<Item = Link<'_>> {
        let requirements = self
            .functional
            .iter()
            .map(|entry| (EntityKind::Functional, entry))
            .chain(
                self.non_functional
                    .iter()
                    .map(|entry| (EntityKind::NonFunctional, entry)),
            )
            .flat_map(|(from_kind, (from, requirement))| {
                requirement.links().map(move |(kind, reference)| Link {
                    from,
                    from_kind,
                    kind,
                    reference,
                })
            });

        let units = self.units_of_work.iter().flat_map(|(from, uow)| {
            uow.links().map(move |(kind, reference)| Link {
                from,
                from_kind: EntityKind::UnitOfWork,
                kind,
                reference,
            })
        });

        requirements.chain(units)
    }

    pub(crate) fn references_mut(&mut self) -> impl Iterator<Item = &mut Reference> {
        let requirements = self
            .functional
            .values_mut()
            .chain(self.non_functional.values_mut())
            .flat_map(|requirement| requirement.references_mut());
        let units = self
            .units_of_work
            .values_mut()
            .flat_map(|uow| uow.references_mut());
        requirements.chain(units)
    }
}

/// A single loaded source: the base document or one extension.
///
/// Created once per source by the loader and never modified after its
/// references have been rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct RequirementsDocument {
    provenance: Provenance,
    tag: Option<Tag>,
    metadata: Metadata,
    sections: Sections,
}

impl RequirementsDocument {
    /// An empty document for the given source.
    #[must_use]
    pub fn new(provenance: Provenance) -> Self {
        Self::from_sections(provenance, Sections::default())
    }

    /// A document for the given source with the given contents.
    #[must_use]
    pub const fn from_sections(provenance: Provenance, sections: Sections) -> Self {
        Self {
            provenance,
            tag: None,
            metadata: Metadata::new(),
            sections,
        }
    }

    /// Override the tag used when this document's identifiers are renamed.
    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Attach the source's top-level `metadata` block.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The source's top-level `metadata` block, carried through unchanged.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The source this document was loaded from.
    #[must_use]
    pub const fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// The rename tag: the explicit override if one was given, otherwise the
    /// tag derived from the provenance.
    #[must_use]
    pub fn tag(&self) -> Tag {
        self.tag.clone().unwrap_or_else(|| self.provenance.tag())
    }

    /// The document contents.
    #[must_use]
    pub const fn sections(&self) -> &Sections {
        &self.sections
    }

    /// Consume the document, returning its contents.
    #[must_use]
    pub fn into_sections(self) -> Sections {
        self.sections
    }
}

impl Deref for RequirementsDocument {
    type Target = Sections;

    fn deref(&self) -> &Self::Target {
        &self.sections
    }
}

impl DerefMut for RequirementsDocument {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.sections
    }
}

/// One entry of the rename log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    /// The identifier as written in its source.
    pub original: Id,
    /// The source that defined it.
    pub provenance: Provenance,
    /// The identifier it has in the merged document.
    #[serde(rename = "final")]
    pub final_id: Id,
}

/// The combined document produced by a merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedDocument {
    sections: Sections,
    origins: BTreeMap<Id, Provenance>,
    sources: Vec<Provenance>,
    metadata: BTreeMap<Provenance, Metadata>,
    renames: Vec<Rename>,
}

impl MergedDocument {
    /// The merged contents.
    #[must_use]
    pub const fn sections(&self) -> &Sections {
        &self.sections
    }

    /// The source that contributed the entity now called `id`.
    #[must_use]
    pub fn provenance_of(&self, id: &Id) -> Option<&Provenance> {
        self.origins.get(id)
    }

    /// The sources folded in, in merge order (base first).
    #[must_use]
    pub fn sources(&self) -> &[Provenance] {
        &self.sources
    }

    /// The `metadata` block of every source that had one, by provenance.
    #[must_use]
    pub const fn source_metadata(&self) -> &BTreeMap<Provenance, Metadata> {
        &self.metadata
    }

    /// Every identifier that was renamed, in the order renames happened.
    #[must_use]
    pub fn renames(&self) -> &[Rename] {
        &self.renames
    }

    /// Fold a fully renamed and rewritten source into the merged document.
    ///
    /// The caller guarantees that none of the document's identifiers are
    /// already present.
    pub(crate) fn absorb(&mut self, document: RequirementsDocument, renames: Vec<Rename>) {
        let RequirementsDocument {
            provenance,
            metadata,
            sections,
            ..
        } = document;

        for (_, id) in sections.ids() {
            debug_assert!(!self.sections.contains(id), "{id} merged twice");
            self.origins.insert(id.clone(), provenance.clone());
        }

        self.sections.functional.extend(sections.functional);
        self.sections.non_functional.extend(sections.non_functional);
        self.sections.units_of_work.extend(sections.units_of_work);
        if !metadata.is_empty() {
            self.metadata.insert(provenance.clone(), metadata);
        }
        self.sources.push(provenance);
        self.renames.extend(renames);
    }

    pub(crate) fn sections_mut(&mut self) -> &mut Sections {
        &mut self.sections
    }
}

impl Deref for MergedDocument {
    type Target = Sections;

    fn deref(&self) -> &Self::Target {
        &self.sections
    }
}
