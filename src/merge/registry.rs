//! The identifier registry.
//!
//! The [`Registry`] knows which identifiers have been claimed so far in one
//! merge run and hands out collision-free final identifiers.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::domain::{Id, Provenance, Tag};

/// One claimed identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// The identifier as written in its source.
    pub original: Id,
    /// The source that claimed it.
    pub provenance: Provenance,
    /// The identifier it was given.
    pub final_id: Id,
}

impl Claim {
    /// Whether the identifier had to be renamed.
    #[must_use]
    pub fn is_rename(&self) -> bool {
        self.original != self.final_id
    }
}

/// The same identifier was defined twice by one source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("identifier {id} is defined more than once in '{provenance}'")]
pub struct DuplicateIdentifierError {
    /// The duplicated identifier.
    pub id: Id,
    /// The source defining it twice.
    pub provenance: Provenance,
}

/// Tracks claimed identifiers for a single merge run.
///
/// Claims are recorded in order, so the ledger doubles as the cumulative
/// rename log of the run.
#[derive(Debug, Default)]
pub struct Registry {
    /// Final identifier -> index of the claim that holds it.
    claimed: BTreeMap<Id, usize>,

    /// (source, original identifier) pairs seen so far.
    originals: BTreeSet<(Provenance, Id)>,

    /// Every claim, in claim order.
    ledger: Vec<Claim>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id` on behalf of `provenance`, returning the identifier it
    /// will have in the merged document.
    ///
    /// - An unclaimed identifier is returned unchanged.
    /// - A claimed identifier gets `tag` inserted after its prefix segment
    ///   (`FR-001` → `FR-ECOMMERCE-001`). If that is taken too, `-2`, `-3`, …
    ///   is appended until the result is unique.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateIdentifierError`] if `provenance` has already
    /// claimed the same original identifier.
    pub fn claim(
        &mut self,
        id: &Id,
        provenance: &Provenance,
        tag: &Tag,
    ) -> Result<Id, DuplicateIdentifierError> {
        if !self.originals.insert((provenance.clone(), id.clone())) {
            return Err(DuplicateIdentifierError {
                id: id.clone(),
                provenance: provenance.clone(),
            });
        }

        let final_id = if self.claimed.contains_key(id) {
            let renamed = self.disambiguate(id.tagged(tag));
            debug!(%id, %provenance, %renamed, "identifier collision");
            renamed
        } else {
            id.clone()
        };

        self.claimed.insert(final_id.clone(), self.ledger.len());
        self.ledger.push(Claim {
            original: id.clone(),
            provenance: provenance.clone(),
            final_id: final_id.clone(),
        });

        Ok(final_id)
    }

    fn disambiguate(&self, candidate: Id) -> Id {
        if !self.claimed.contains_key(&candidate) {
            return candidate;
        }

        let mut n = 2;
        loop {
            let suffixed = candidate.with_suffix(n);
            if !self.claimed.contains_key(&suffixed) {
                return suffixed;
            }
            n += 1;
        }
    }

    /// Whether `id` has been handed out as a final identifier.
    #[must_use]
    pub fn is_claimed(&self, id: &Id) -> bool {
        self.claimed.contains_key(id)
    }

    /// The source holding the final identifier `id`.
    #[must_use]
    pub fn holder(&self, id: &Id) -> Option<&Provenance> {
        self.claimed
            .get(id)
            .map(|&index| &self.ledger[index].provenance)
    }

    /// The final identifier `provenance` was given for its `original`.
    #[must_use]
    pub fn final_id(&self, provenance: &Provenance, original: &Id) -> Option<&Id> {
        self.ledger
            .iter()
            .find(|claim| &claim.provenance == provenance && &claim.original == original)
            .map(|claim| &claim.final_id)
    }

    /// Every claim so far, in claim order.
    #[must_use]
    pub fn ledger(&self) -> &[Claim] {
        &self.ledger
    }

    /// The claims that renamed their identifier, in claim order.
    pub fn renames(&self) -> impl Iterator<Item = &Claim> {
        self.ledger.iter().filter(|claim| claim.is_rename())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn id(s: &str) -> Id {
        s.parse().unwrap()
    }

    fn provenance(s: &str) -> Provenance {
        s.parse().unwrap()
    }

    fn claim(registry: &mut Registry, raw: &str, source: &str) -> String {
        let provenance = provenance(source);
        let tag = provenance.tag();
        registry
            .claim(&id(raw), &provenance, &tag)
            .unwrap()
            .to_string()
    }

    #[test_case("FR-001")]
    #[test_case("NFR-042")]
    #[test_case("UoW-301A")]
    #[test_case("GLOSSARY")]
    fn unclaimed_identifier_is_unchanged(raw: &str) {
        let mut registry = Registry::new();
        assert_eq!(claim(&mut registry, raw, "e-commerce"), raw);
        assert!(registry.renames().next().is_none());
    }

    #[test]
    fn collision_inserts_tag_after_prefix() {
        let mut registry = Registry::new();
        claim(&mut registry, "FR-001", "base");
        assert_eq!(claim(&mut registry, "FR-001", "e-commerce"), "FR-ECOMMERCE-001");

        let renames: Vec<_> = registry.renames().collect();
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].original, id("FR-001"));
        assert_eq!(renames[0].provenance, provenance("e-commerce"));
        assert_eq!(renames[0].final_id, id("FR-ECOMMERCE-001"));
    }

    #[test]
    fn double_collision_appends_numeric_suffix() {
        let mut registry = Registry::new();
        claim(&mut registry, "FR-001", "base");
        // A literal identifier that happens to equal the generated one.
        claim(&mut registry, "FR-ECOMMERCE-001", "shop");
        assert_eq!(
            claim(&mut registry, "FR-001", "e-commerce"),
            "FR-ECOMMERCE-001-2"
        );
        assert_eq!(
            claim(&mut registry, "FR-ECOMMERCE-001", "ecommerce"),
            "FR-ECOMMERCE-ECOMMERCE-001"
        );
    }

    #[test]
    fn suffix_keeps_counting() {
        let mut registry = Registry::new();
        claim(&mut registry, "FR-001", "base");
        claim(&mut registry, "FR-001", "e-commerce");
        // Different provenance, same derived tag.
        assert_eq!(claim(&mut registry, "FR-001", "ecommerce"), "FR-ECOMMERCE-001-2");
        assert_eq!(claim(&mut registry, "FR-001", "E-Commerce"), "FR-ECOMMERCE-001-3");
    }

    #[test]
    fn duplicate_within_one_source_fails() {
        let mut registry = Registry::new();
        claim(&mut registry, "FR-001", "gdpr");

        let gdpr = provenance("gdpr");
        let error = registry
            .claim(&id("FR-001"), &gdpr, &gdpr.tag())
            .unwrap_err();

        assert_eq!(error.id, id("FR-001"));
        assert_eq!(error.provenance, gdpr);
        assert_eq!(
            error.to_string(),
            "identifier FR-001 is defined more than once in 'gdpr'"
        );
    }

    #[test]
    fn own_generated_name_is_a_plain_collision() {
        let mut registry = Registry::new();
        claim(&mut registry, "FR-001", "base");
        assert_eq!(claim(&mut registry, "FR-001", "e-commerce"), "FR-ECOMMERCE-001");
        assert_eq!(
            claim(&mut registry, "FR-ECOMMERCE-001", "e-commerce"),
            "FR-ECOMMERCE-ECOMMERCE-001"
        );
    }

    #[test]
    fn is_deterministic() {
        let run = || {
            let mut registry = Registry::new();
            for (raw, source) in [
                ("UoW-010", "base"),
                ("UoW-010", "ai-ml"),
                ("UoW-010", "blockchain"),
                ("UoW-AIML-010", "blockchain"),
            ] {
                claim(&mut registry, raw, source);
            }
            registry.ledger().to_vec()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn lookups() {
        let mut registry = Registry::new();
        claim(&mut registry, "FR-001", "base");
        claim(&mut registry, "FR-001", "ai-ml");

        assert!(registry.is_claimed(&id("FR-AIML-001")));
        assert_eq!(registry.holder(&id("FR-001")), Some(&provenance("base")));
        assert_eq!(registry.holder(&id("FR-AIML-001")), Some(&provenance("ai-ml")));
        assert_eq!(
            registry.final_id(&provenance("ai-ml"), &id("FR-001")),
            Some(&id("FR-AIML-001"))
        );
        assert_eq!(registry.final_id(&provenance("gdpr"), &id("FR-001")), None);
    }
}
