//! Running a whole merge plan: load, merge, validate.

use tracing::{info, instrument};

use crate::{
    domain::{Config, MergedDocument, Provenance},
    merge::{merge, DuplicateIdentifierError, MergeError},
    storage::{load, load_all, loader::Problem, LoadedSource, MalformedSourceError},
    validation::{validate, ValidationReport},
};

/// The result of running a merge plan.
#[derive(Debug, Clone)]
pub struct Composition {
    /// Every source, base first, in merge order.
    pub sources: Vec<LoadedSource>,
    /// The merged document.
    pub merged: MergedDocument,
    /// Validation of the merged document.
    pub report: ValidationReport,
}

/// Errors that prevent a merge plan from producing a document.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    /// A source could not be loaded.
    #[error(transparent)]
    Load(#[from] MalformedSourceError),
    /// The sources could not be merged.
    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl ComposeError {
    /// The duplicated identifier, if a source defines one twice.
    ///
    /// A repeated key within one section is caught while loading, the same
    /// identifier in two sections of one source while merging.
    #[must_use]
    pub const fn duplicate(&self) -> Option<&DuplicateIdentifierError> {
        match self {
            Self::Load(MalformedSourceError {
                problem: Problem::Duplicate(duplicate),
                ..
            })
            | Self::Merge(MergeError::Duplicate(duplicate)) => Some(duplicate),
            _ => None,
        }
    }
}

/// Loads the base and every extension named by `config`, merges them in
/// order and validates the result.
///
/// Nothing is written; see [`crate::storage::Artifact`] for that.
///
/// # Errors
///
/// Returns [`ComposeError`] if any source fails to load or the merge fails.
/// Dangling references are not an error here; they are listed in the
/// report.
#[instrument(skip_all, fields(project = %config.project_name))]
pub fn compose(config: &Config) -> Result<Composition, ComposeError> {
    let base = load(&config.base, Some(Provenance::base()))?;
    let extensions = load_all(&config.extensions)?;

    let merged = merge(
        base.document.clone(),
        extensions
            .iter()
            .map(|source| source.document.clone())
            .collect(),
    )?;
    let report = validate(&merged);

    info!(
        sources = extensions.len() + 1,
        entities = merged.len(),
        renames = merged.renames().len(),
        dangling = report.dangling.len(),
        "composed requirements"
    );

    let mut sources = Vec::with_capacity(extensions.len() + 1);
    sources.push(base);
    sources.extend(extensions);

    Ok(Composition {
        sources,
        merged,
        report,
    })
}
