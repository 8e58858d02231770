//! Writing the merged document to disk.
//!
//! The output artifact holds the three merged sections followed by a
//! `metadata` block recording what was merged, when, what was renamed, the
//! metadata each source carried and the validation statistics. It is itself a valid source document, so it can
//! be fed back into the loader.

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    domain::{self, Id, MergedDocument, Provenance, Rename, Sections},
    storage::loader::{LoadedSource, SourceDigest},
    validation::{LayerViolation, Statistics, ValidationReport},
};

/// Serialisation format of the output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// YAML (the default).
    Yaml,
    /// JSON.
    Json,
}

impl Format {
    /// JSON if the path ends in `.json`, YAML otherwise.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// One source as recorded in the output metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    /// The source's provenance.
    pub provenance: Provenance,
    /// Where it was loaded from.
    pub path: String,
    /// SHA-256 of its bytes.
    pub sha256: SourceDigest,
}

impl From<&LoadedSource> for SourceRecord {
    fn from(source: &LoadedSource) -> Self {
        Self {
            provenance: source.document.provenance().clone(),
            path: source.name.clone(),
            sha256: source.digest.clone(),
        }
    }
}

/// The `metadata` block of the output artifact.
#[derive(Debug, Serialize)]
pub struct Metadata<'a> {
    /// Name of the project.
    pub project_name: &'a str,
    /// When the merge ran.
    pub merge_timestamp: DateTime<Utc>,
    /// The sources, in merge order.
    pub sources: Vec<SourceRecord>,
    /// The `metadata` block of each source that had one, by provenance.
    #[serde(skip_serializing_if = "is_empty_map")]
    pub source_metadata: &'a BTreeMap<Provenance, domain::Metadata>,
    /// Every identifier that was renamed.
    pub renames: &'a [Rename],
    /// Counts from validation.
    pub statistics: &'a Statistics,
    /// Dependency cycles found by validation.
    #[serde(skip_serializing_if = "is_empty")]
    pub dependency_cycles: &'a [Vec<Id>],
    /// Units of work depending on a later layer.
    #[serde(skip_serializing_if = "is_empty")]
    pub layer_violations: &'a [LayerViolation],
}

fn is_empty<T>(items: &&[T]) -> bool {
    items.is_empty()
}

fn is_empty_map<K, V>(map: &&BTreeMap<K, V>) -> bool {
    map.is_empty()
}

/// The complete output artifact.
#[derive(Debug, Serialize)]
pub struct Artifact<'a> {
    #[serde(flatten)]
    sections: &'a Sections,
    metadata: Metadata<'a>,
}

impl<'a> Artifact<'a> {
    /// Assembles the artifact for a merged and validated document.
    #[must_use]
    pub fn new(
        project_name: &'a str,
        merged: &'a MergedDocument,
        sources: &[LoadedSource],
        report: &'a ValidationReport,
        merge_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sections: merged.sections(),
            metadata: Metadata {
                project_name,
                merge_timestamp,
                sources: sources.iter().map(SourceRecord::from).collect(),
                source_metadata: merged.source_metadata(),
                renames: merged.renames(),
                statistics: &report.statistics,
                dependency_cycles: &report.cycles,
                layer_violations: &report.layer_violations,
            },
        }
    }

    /// The metadata block.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata<'a> {
        &self.metadata
    }

    /// Renders the artifact in the given format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn render(&self, format: Format) -> Result<String, WriteError> {
        Ok(match format {
            Format::Yaml => serde_yaml::to_string(self)?,
            Format::Json => serde_json::to_string_pretty(self)?,
        })
    }

    /// Writes the artifact to `path`, creating parent directories as needed.
    ///
    /// The format is chosen from the file extension (see
    /// [`Format::from_path`]). The artifact is rendered in full before the
    /// file is touched.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails or the file cannot be written.
    #[instrument(skip(self))]
    pub fn write(&self, path: &Path) -> Result<(), WriteError> {
        let content = self.render(Format::from_path(path))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| WriteError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| WriteError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), "wrote merged document");
        Ok(())
    }
}

/// Errors that can occur when writing the output artifact.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The output file or its directory could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// The path that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// YAML serialisation failed.
    #[error("failed to serialise YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// JSON serialisation failed.
    #[error("failed to serialise JSON: {0}")]
    Json(#[from] serde_json::Error),
}
