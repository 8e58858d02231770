//! Requirements Composition
//!
//! A project's requirements are composed from a base document plus an
//! ordered set of extension documents (domains, features, compliance
//! regimes). Identifier collisions are resolved by renaming, references are
//! rewritten to follow the renames, and the merged result is checked for
//! dangling references and dependency cycles.

pub mod domain;
pub use domain::{
    Config, Id, Layer, MergedDocument, Priority, Provenance, Reference, Requirement,
    RequirementsDocument, Tag, UnitOfWork,
};

pub mod merge;
pub use merge::{merge, MergeError};

pub mod validation;
pub use validation::{validate, ValidationReport};

/// Loading sources and writing the merged artifact.
pub mod storage;

mod compose;
pub use compose::{compose, ComposeError, Composition};
