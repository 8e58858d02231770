//! Rewriting cross-references to final identifiers.

use std::collections::BTreeMap;

use crate::{
    domain::{Id, Provenance, Reference, RequirementsDocument, Sections},
    merge::registry::Claim,
};

/// A mapping from references as written to final identifiers.
///
/// Unqualified entries are keyed by identifier, qualified entries by
/// (provenance, identifier).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameMap {
    unqualified: BTreeMap<Id, Id>,
    qualified: BTreeMap<(Provenance, Id), Id>,
}

impl RenameMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map unqualified references to `original` onto `final_id`, replacing
    /// any previous entry.
    pub fn insert(&mut self, original: Id, final_id: Id) {
        self.unqualified.insert(original, final_id);
    }

    /// Map references to `original` qualified with `provenance` onto
    /// `final_id`.
    pub fn insert_qualified(&mut self, provenance: Provenance, original: Id, final_id: Id) {
        self.qualified.insert((provenance, original), final_id);
    }

    /// Record a claim from the ledger.
    ///
    /// The qualified entry is always added. The unqualified entry is only
    /// added if no earlier claim of the same original identifier exists, so
    /// recording claims in ledger order maps every bare identifier to its
    /// earliest claimer.
    pub fn record(&mut self, claim: &Claim) {
        self.unqualified
            .entry(claim.original.clone())
            .or_insert_with(|| claim.final_id.clone());
        self.qualified.insert(
            (claim.provenance.clone(), claim.original.clone()),
            claim.final_id.clone(),
        );
    }

    /// The final identifier for unqualified references to `original`.
    #[must_use]
    pub fn get(&self, original: &Id) -> Option<&Id> {
        self.unqualified.get(original)
    }

    /// The final identifier `reference` maps to, if it is unresolved and the
    /// map has an entry for it.
    #[must_use]
    pub fn lookup(&self, reference: &Reference) -> Option<&Id> {
        match reference {
            Reference::Resolved(_) => None,
            Reference::Unresolved {
                provenance: None,
                id,
            } => self.unqualified.get(id),
            Reference::Unresolved {
                provenance: Some(provenance),
                id,
            } => self.qualified.get(&(provenance.clone(), id.clone())),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.unqualified.len() + self.qualified.len()
    }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve every mapped reference in `sections` in place. Returns the
    /// number of references resolved.
    pub(crate) fn apply(&self, sections: &mut Sections) -> usize {
        let mut resolved = 0;
        for reference in sections.references_mut() {
            if let Some(final_id) = self.lookup(reference) {
                *reference = Reference::Resolved(final_id.clone());
                resolved += 1;
            }
        }
        resolved
    }
}

/// Returns a copy of `document` with every unresolved reference the map knows
/// about replaced by its final identifier.
///
/// Keys are left alone, as are references the map has no entry for.
/// Rewritten references are resolved, so rewriting twice with the same map
/// gives the same result as rewriting once.
#[must_use]
pub fn rewrite(document: &RequirementsDocument, map: &RenameMap) -> RequirementsDocument {
    let mut rewritten = document.clone();
    map.apply(&mut rewritten);
    rewritten
}
