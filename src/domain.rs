//! Domain models for requirements composition.
//!
//! This module contains the core domain types including identifiers,
//! requirements, units of work, documents and the merge plan configuration.

/// Identifier and rename-tag types and parsing.
pub mod id;
pub use id::{Error as IdError, Id, InvalidTagError, Tag};

mod provenance;
pub use provenance::{InvalidProvenanceError, Provenance, BASE};

mod reference;
pub use reference::{ParseReferenceError, Reference};

mod requirement;
pub use requirement::{Metadata, Priority, Requirement};

mod unit_of_work;
pub use unit_of_work::{Effort, Layer, UnitOfWork};

mod document;
pub use document::{
    EntityKind, Link, LinkKind, MergedDocument, Rename, RequirementsDocument, Sections,
};

/// Merge plan configuration.
pub mod config;
pub use config::Config;
