/// Loading source documents from YAML files, directories and streams.
pub mod loader;
/// Writing the merged output artifact.
pub mod output;

pub use loader::{load, load_all, load_reader, LoadedSource, MalformedSourceError, SourceDigest};
pub use output::{Artifact, Format, WriteError};
