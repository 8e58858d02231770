//! Folding a base document and its extensions into one merged document.
//!
//! The base is merged first and never renamed. Extensions follow in the order
//! given; an extension identifier that is already taken is renamed with the
//! extension's tag, and every reference to it within that extension follows
//! the rename.
//!
//! References are resolved in three steps:
//!
//! 1. against the extension's own identifiers (bare, or qualified with the
//!    extension's own provenance);
//! 2. against the sources merged before it: qualified references by exact
//!    (provenance, identifier) lookup, bare references to the earliest source
//!    that defined the identifier (so the base wins);
//! 3. once every source is in, a final pass resolves whatever is left
//!    against all claims, which covers forward references.
//!
//! Anything still unresolved after that is reported by
//! [`crate::validation::validate`].

use std::collections::BTreeSet;

use tracing::{debug, info, instrument};

use crate::domain::{Id, MergedDocument, Provenance, Rename, RequirementsDocument, Sections};

pub mod registry;
pub use registry::{Claim, DuplicateIdentifierError, Registry};

pub mod rewrite;
pub use rewrite::{rewrite, RenameMap};

/// Errors that abort a merge.
///
/// A failed merge produces no output at all.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MergeError {
    /// A source defines the same identifier twice.
    #[error(transparent)]
    Duplicate(#[from] DuplicateIdentifierError),

    /// The base document has a provenance other than `base`.
    #[error("the base document must have provenance 'base', found '{0}'")]
    NotBase(Provenance),

    /// An extension claims to be the base.
    #[error("extension #{position} uses the reserved provenance 'base'")]
    ReservedProvenance {
        /// One-based position of the extension in the merge order.
        position: usize,
    },

    /// Two extensions share a provenance.
    #[error("provenance '{0}' is used by more than one extension")]
    RepeatedProvenance(Provenance),
}

/// Merges `extensions` onto `base`, in order.
///
/// # Errors
///
/// - [`MergeError::NotBase`] if `base` does not carry the `base` provenance.
/// - [`MergeError::ReservedProvenance`] if an extension does.
/// - [`MergeError::RepeatedProvenance`] if two extensions share a provenance.
/// - [`MergeError::Duplicate`] if any source defines an identifier twice
///   (for example in both its functional and its non-functional section).
#[instrument(skip_all, fields(extensions = extensions.len()))]
pub fn merge(
    base: RequirementsDocument,
    extensions: Vec<RequirementsDocument>,
) -> Result<MergedDocument, MergeError> {
    check_provenances(&base, &extensions)?;

    let mut registry = Registry::new();
    let mut merged = MergedDocument::default();

    // Bare and qualified references to everything merged so far.
    let mut earlier = RenameMap::new();

    seed(&mut registry, &mut merged, &mut earlier, base)?;

    for extension in extensions {
        let first_claim = registry.ledger().len();
        let local = claim_all(&mut registry, &extension)?;

        let rewritten = rewrite(&rewrite(&extension, &local), &earlier);
        let provenance = rewritten.provenance().clone();
        let renamed = rename_keys(rewritten, &local);

        let claims = &registry.ledger()[first_claim..];
        for claim in claims {
            earlier.record(claim);
        }
        let renames: Vec<Rename> = claims
            .iter()
            .filter(|claim| claim.is_rename())
            .map(|claim| Rename {
                original: claim.original.clone(),
                provenance: claim.provenance.clone(),
                final_id: claim.final_id.clone(),
            })
            .collect();

        info!(
            %provenance,
            entities = renamed.len(),
            renamed = renames.len(),
            "merged extension"
        );
        merged.absorb(renamed, renames);
    }

    let resolved = earlier.apply(merged.sections_mut());
    debug!(resolved, "resolved deferred references");

    Ok(merged)
}

fn check_provenances(
    base: &RequirementsDocument,
    extensions: &[RequirementsDocument],
) -> Result<(), MergeError> {
    if !base.provenance().is_base() {
        return Err(MergeError::NotBase(base.provenance().clone()));
    }

    let mut seen = BTreeSet::new();
    for (index, extension) in extensions.iter().enumerate() {
        let provenance = extension.provenance();
        if provenance.is_base() {
            return Err(MergeError::ReservedProvenance {
                position: index + 1,
            });
        }
        if !seen.insert(provenance) {
            return Err(MergeError::RepeatedProvenance(provenance.clone()));
        }
    }

    Ok(())
}

/// Claims every base identifier and copies the base in unchanged.
fn seed(
    registry: &mut Registry,
    merged: &mut MergedDocument,
    earlier: &mut RenameMap,
    base: RequirementsDocument,
) -> Result<(), MergeError> {
    let provenance = base.provenance().clone();
    let tag = base.tag();

    for (_, id) in base.ids() {
        registry.claim(id, &provenance, &tag)?;
    }
    for claim in registry.ledger() {
        earlier.record(claim);
    }

    info!(entities = base.len(), "merged base");
    merged.absorb(base, Vec::new());
    Ok(())
}

/// Claims every identifier `document` defines: functional, then
/// non-functional, then units of work, each in key order.
///
/// Identifiers no earlier source holds are claimed before the colliding ones,
/// so a name generated for a colliding identifier never displaces one of the
/// document's own literal identifiers.
///
/// Returns the document's local rename map: bare identifiers and identifiers
/// qualified with the document's own provenance, mapped to their final names.
fn claim_all(
    registry: &mut Registry,
    document: &RequirementsDocument,
) -> Result<RenameMap, MergeError> {
    let provenance = document.provenance();
    let tag = document.tag();
    let mut local = RenameMap::new();

    let (free, colliding): (Vec<&Id>, Vec<&Id>) = document
        .ids()
        .map(|(_, id)| id)
        .partition(|id| !registry.is_claimed(id));

    for id in free.into_iter().chain(colliding) {
        let final_id = registry.claim(id, provenance, &tag)?;
        local.insert(id.clone(), final_id.clone());
        local.insert_qualified(provenance.clone(), id.clone(), final_id);
    }

    Ok(local)
}

/// Re-keys every entry of `document` under its final identifier.
fn rename_keys(mut document: RequirementsDocument, local: &RenameMap) -> RequirementsDocument {
    let Sections {
        functional,
        non_functional,
        units_of_work,
    } = std::mem::take(&mut *document);

    let final_id = |id: Id| local.get(&id).cloned().unwrap_or(id);
    *document = Sections {
        functional: functional
            .into_iter()
            .map(|(id, entry)| (final_id(id), entry))
            .collect(),
        non_functional: non_functional
            .into_iter()
            .map(|(id, entry)| (final_id(id), entry))
            .collect(),
        units_of_work: units_of_work
            .into_iter()
            .map(|(id, entry)| (final_id(id), entry))
            .collect(),
    };

    document
}
