//! Loading requirements documents from YAML.
//!
//! A source is a single YAML file, a byte stream, or a directory of YAML
//! files that together form one document. Each source must contain at least
//! one of the `functional_requirements`, `non_functional_requirements` and
//! `units_of_work` sections. It may also declare its own `provenance`, rename
//! `tag` and a free-form `metadata` block. Any other top-level key is ignored.

use std::{
    collections::{btree_map::Entry, BTreeMap},
    ffi::OsStr,
    fmt, io,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::{
    domain::{
        config::ExtensionSource, Id, InvalidProvenanceError, Metadata, Provenance, Requirement,
        RequirementsDocument, Sections, Tag, UnitOfWork,
    },
    merge::DuplicateIdentifierError,
};

/// A source could not be turned into a requirements document.
#[derive(Debug, thiserror::Error)]
#[error("malformed source '{source_name}': {problem}")]
pub struct MalformedSourceError {
    /// The file, directory or stream name of the offending source.
    pub source_name: String,
    /// What is wrong with it.
    pub problem: Problem,
}

/// The ways a source can be malformed.
#[derive(Debug, thiserror::Error)]
pub enum Problem {
    /// The source could not be read.
    #[error("could not be read: {0}")]
    Io(#[from] io::Error),

    /// The source is not valid YAML, or does not fit the schema.
    #[error("{0}")]
    Yaml(#[from] serde_yaml::Error),

    /// None of the three sections is present.
    #[error(
        "expected at least one of 'functional_requirements', \
         'non_functional_requirements' or 'units_of_work'"
    )]
    NoSections,

    /// A directory source contains no YAML files.
    #[error("no YAML files found")]
    EmptyDirectory,

    /// No usable provenance could be determined.
    #[error(transparent)]
    Provenance(#[from] InvalidProvenanceError),

    /// A section defines the same identifier twice, either within one file
    /// or across the files of a directory source.
    #[error(transparent)]
    Duplicate(#[from] DuplicateIdentifierError),
}

impl MalformedSourceError {
    fn new(source_name: impl Into<String>, problem: impl Into<Problem>) -> Self {
        Self {
            source_name: source_name.into(),
            problem: problem.into(),
        }
    }
}

/// SHA-256 digest of the bytes a source was loaded from, as lowercase hex.
///
/// A directory source is hashed over the relative path and content of each
/// of its files, in load order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SourceDigest(String);

impl SourceDigest {
    /// Digest of a single byte buffer.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// The hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed source together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSource {
    /// The parsed document.
    pub document: RequirementsDocument,
    /// Path or stream name of the source.
    pub name: String,
    /// Digest of the source bytes.
    pub digest: SourceDigest,
}

/// The top-level shape of a source file.
#[derive(Debug, Deserialize)]
struct RawSource {
    #[serde(default)]
    provenance: Option<Provenance>,

    #[serde(default)]
    tag: Option<Tag>,

    #[serde(default)]
    metadata: Option<Metadata>,

    #[serde(default)]
    functional_requirements: Option<Entries<Requirement>>,

    #[serde(default)]
    non_functional_requirements: Option<Entries<Requirement>>,

    #[serde(default)]
    units_of_work: Option<Entries<UnitOfWork>>,
}

impl RawSource {
    fn parse(content: &str, name: &str) -> Result<Self, MalformedSourceError> {
        let raw: Self =
            serde_yaml::from_str(content).map_err(|e| MalformedSourceError::new(name, e))?;

        if raw.functional_requirements.is_none()
            && raw.non_functional_requirements.is_none()
            && raw.units_of_work.is_none()
        {
            return Err(MalformedSourceError::new(name, Problem::NoSections));
        }

        Ok(raw)
    }
}

/// A section exactly as written, in file order, repeated keys included.
#[derive(Debug)]
struct Entries<T>(Vec<(Id, T)>);

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Entries<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = Entries<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of identifiers to entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or_default());
                while let Some(entry) = map.next_entry()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

/// Adds the entries of one section, failing on the first identifier that is
/// already present.
fn insert_unique<T>(
    into: &mut BTreeMap<Id, T>,
    entries: Option<Entries<T>>,
    provenance: &Provenance,
) -> Result<(), DuplicateIdentifierError> {
    for (id, entry) in entries.map(|Entries(entries)| entries).unwrap_or_default() {
        match into.entry(id) {
            Entry::Occupied(occupied) => {
                return Err(DuplicateIdentifierError {
                    id: occupied.key().clone(),
                    provenance: provenance.clone(),
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
    }
    Ok(())
}

/// Builds one document from the parsed files of a source, in order.
///
/// Metadata blocks are combined key by key; a key set by more than one file
/// keeps the value from the last.
fn assemble(
    provenance: Provenance,
    tag: Option<Tag>,
    files: Vec<(String, RawSource)>,
) -> Result<RequirementsDocument, MalformedSourceError> {
    let mut sections = Sections::default();
    let mut metadata = Metadata::new();

    for (name, raw) in files {
        let duplicate = |e: DuplicateIdentifierError| MalformedSourceError::new(&name, e);
        insert_unique(
            &mut sections.functional,
            raw.functional_requirements,
            &provenance,
        )
        .map_err(duplicate)?;
        insert_unique(
            &mut sections.non_functional,
            raw.non_functional_requirements,
            &provenance,
        )
        .map_err(duplicate)?;
        insert_unique(&mut sections.units_of_work, raw.units_of_work, &provenance)
            .map_err(duplicate)?;
        metadata.extend(raw.metadata.unwrap_or_default());
    }

    let document = RequirementsDocument::from_sections(provenance, sections).with_metadata(metadata);
    Ok(match tag {
        Some(tag) => document.with_tag(tag),
        None => document,
    })
}

/// Picks the provenance of a source: the one supplied by the caller, else the
/// one the source declares, else the stem of its name.
fn choose_provenance(
    name: &str,
    supplied: Option<Provenance>,
    declared: Option<Provenance>,
) -> Result<Provenance, MalformedSourceError> {
    if let Some(provenance) = supplied.or(declared) {
        return Ok(provenance);
    }

    let stem = Path::new(name)
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or(name);
    stem.parse()
        .map_err(|e: InvalidProvenanceError| MalformedSourceError::new(name, e))
}

/// Parses a requirements document from YAML text.
///
/// `name` identifies the source in error messages and, if neither the caller
/// nor the document supplies a provenance, its stem becomes the provenance.
///
/// # Errors
///
/// Returns [`MalformedSourceError`] if the text is not valid YAML, does not
/// fit the schema, contains none of the three sections, or defines an
/// identifier twice in one section.
pub fn from_str(
    content: &str,
    name: &str,
    provenance: Option<Provenance>,
) -> Result<RequirementsDocument, MalformedSourceError> {
    let mut raw = RawSource::parse(content, name)?;
    let provenance = choose_provenance(name, provenance, raw.provenance.take())?;
    let tag = raw.tag.take();

    assemble(provenance, tag, vec![(name.to_string(), raw)])
}

/// Reads and parses a requirements document from a byte stream.
///
/// # Errors
///
/// Returns [`MalformedSourceError`] if the stream cannot be read or its
/// contents are malformed (see [`from_str`]).
pub fn load_reader<R: io::Read>(
    mut reader: R,
    name: &str,
    provenance: Option<Provenance>,
) -> Result<LoadedSource, MalformedSourceError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| MalformedSourceError::new(name, e))?;
    let content = String::from_utf8(bytes).map_err(|e| {
        MalformedSourceError::new(name, io::Error::new(io::ErrorKind::InvalidData, e))
    })?;

    let document = from_str(&content, name, provenance)?;
    Ok(LoadedSource {
        document,
        name: name.to_string(),
        digest: SourceDigest::of(content.as_bytes()),
    })
}

/// Loads a requirements document from a YAML file or a directory of YAML
/// files.
///
/// A directory is read recursively; every `.yaml` and `.yml` file beneath it
/// is parsed in sorted path order and the sections are combined into one
/// document.
///
/// # Errors
///
/// Returns [`MalformedSourceError`] if the path cannot be read, any file is
/// malformed, a directory contains no YAML files, or two files of a
/// directory define the same identifier in the same section.
#[instrument(skip(provenance))]
pub fn load(
    path: &Path,
    provenance: Option<Provenance>,
) -> Result<LoadedSource, MalformedSourceError> {
    let loaded = if path.is_dir() {
        load_directory(path, provenance)?
    } else {
        let name = path.display().to_string();
        let file = std::fs::File::open(path).map_err(|e| MalformedSourceError::new(&name, e))?;
        load_reader(io::BufReader::new(file), &name, provenance)?
    };

    debug!(
        provenance = %loaded.document.provenance(),
        entities = loaded.document.len(),
        "loaded source"
    );
    Ok(loaded)
}

fn load_directory(
    root: &Path,
    provenance: Option<Provenance>,
) -> Result<LoadedSource, MalformedSourceError> {
    let name = root.display().to_string();
    let paths = collect_yaml_paths(root);
    if paths.is_empty() {
        return Err(MalformedSourceError::new(name, Problem::EmptyDirectory));
    }

    let mut hasher = Sha256::new();
    let mut files = Vec::with_capacity(paths.len());
    let mut declared_provenance = None;
    let mut declared_tag = None;

    for path in &paths {
        let file_name = path.display().to_string();
        let content =
            std::fs::read_to_string(path).map_err(|e| MalformedSourceError::new(&file_name, e))?;

        let relative = path.strip_prefix(root).unwrap_or(path);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update(content.as_bytes());

        let mut raw = RawSource::parse(&content, &file_name)?;
        declared_provenance = declared_provenance.or_else(|| raw.provenance.take());
        declared_tag = declared_tag.or_else(|| raw.tag.take());
        files.push((file_name, raw));
    }

    let provenance = choose_provenance(&name, provenance, declared_provenance)?;
    let document = assemble(provenance, declared_tag, files)?;

    Ok(LoadedSource {
        document,
        name,
        digest: SourceDigest(format!("{:x}", hasher.finalize())),
    })
}

fn collect_yaml_paths(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            matches!(
                entry.path().extension().and_then(OsStr::to_str),
                Some("yaml" | "yml")
            )
        })
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Loads every extension of a merge plan, in parallel.
///
/// The result keeps the order of `sources`. Explicit tags in the plan
/// override tags declared in the files.
///
/// # Errors
///
/// Returns a [`MalformedSourceError`] if any source fails to load.
pub fn load_all(sources: &[ExtensionSource]) -> Result<Vec<LoadedSource>, MalformedSourceError> {
    sources
        .par_iter()
        .map(|source| {
            let mut loaded = load(&source.path, source.provenance.clone())?;
            if let Some(tag) = &source.tag {
                loaded.document = loaded.document.with_tag(tag.clone());
            }
            Ok(loaded)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use test_case::test_case;

    use super::*;

    const ECOMMERCE: &str = r"
provenance: e-commerce
metadata:
  version: 2
functional_requirements:
  FR-001:
    title: Shopping cart
    priority: High
    category: Commerce
    dependencies:
      - FR-001
      - base:FR-001
    acceptance_criteria:
      - Items persist across sessions
units_of_work:
  UoW-301:
    name: Cart service
    goal: Persist carts
    layer: Application
    implements:
      - FR-001
    estimated_effort_hours: '24'
";

    fn id(s: &str) -> Id {
        s.parse().unwrap()
    }

    #[test]
    fn parses_sections_and_metadata() {
        let document = from_str(ECOMMERCE, "e-commerce.yaml", None).unwrap();

        assert_eq!(document.provenance().as_str(), "e-commerce");
        assert_eq!(document.functional.len(), 1);
        assert!(document.non_functional.is_empty());

        let cart = &document.functional[&id("FR-001")];
        assert_eq!(cart.category.as_deref(), Some("Commerce"));
        assert_eq!(
            cart.dependencies
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec!["FR-001", "base:FR-001"]
        );
        assert!(cart.metadata.contains_key("acceptance_criteria"));

        let uow = &document.units_of_work[&id("UoW-301")];
        assert_eq!(uow.estimated_effort.map(|e| e.get()), Some(24));

        assert_eq!(
            document.metadata().get("version"),
            Some(&serde_yaml::Value::from(2))
        );
    }

    #[test]
    fn repeated_key_in_one_section_is_rejected() {
        let content = "functional_requirements:\n  \
                       FR-001: {title: A, priority: High}\n  \
                       FR-001: {title: B, priority: Low}\n";
        let error = from_str(content, "ext.yaml", Some("gdpr".parse().unwrap())).unwrap_err();

        assert_eq!(error.source_name, "ext.yaml");
        let Problem::Duplicate(duplicate) = &error.problem else {
            panic!("expected a duplicate identifier, got {error}");
        };
        assert_eq!(duplicate.id, id("FR-001"));
        assert_eq!(duplicate.provenance.as_str(), "gdpr");
        assert_eq!(
            error.to_string(),
            "malformed source 'ext.yaml': identifier FR-001 is defined more than once in 'gdpr'"
        );
    }

    #[test]
    fn same_key_in_different_sections_is_left_to_the_merge() {
        let content = "functional_requirements:\n  \
                       X-001: {title: A, priority: High}\n\
                       non_functional_requirements:\n  \
                       X-001: {title: B, priority: Low}\n";
        let document = from_str(content, "ext.yaml", None).unwrap();
        assert_eq!(document.len(), 2);
    }

    #[test_case(Some("gdpr"), "provenance: ai-ml\n", "gdpr"; "caller wins")]
    #[test_case(None, "provenance: ai-ml\n", "ai-ml"; "declared wins over stem")]
    #[test_case(None, "", "blockchain"; "stem is the fallback")]
    fn provenance_precedence(supplied: Option<&str>, header: &str, expected: &str) {
        let content = format!("{header}units_of_work: {{}}\n");
        let supplied = supplied.map(|s| s.parse().unwrap());
        let document = from_str(&content, "extensions/blockchain.yaml", supplied).unwrap();
        assert_eq!(document.provenance().as_str(), expected);
    }

    #[test]
    fn declared_tag_is_kept() {
        let document =
            from_str("tag: ECOMMERC\nfunctional_requirements: {}\n", "e-commerce", None).unwrap();
        assert_eq!(document.tag().as_str(), "ECOMMERC");
    }

    #[test]
    fn rejects_source_without_sections() {
        let error = from_str("metadata:\n  version: 1\n", "notes.yaml", None).unwrap_err();
        assert_eq!(error.source_name, "notes.yaml");
        assert!(matches!(error.problem, Problem::NoSections));
    }

    #[test_case("functional_requirements: [FR-001]\n"; "section is a list")]
    #[test_case("functional_requirements:\n  FR-001:\n    title: x\n"; "missing priority")]
    #[test_case("functional_requirements:\n  FR 001:\n    title: x\n    priority: Low\n"; "bad identifier")]
    #[test_case("functional_requirements: {\n"; "invalid yaml")]
    fn rejects_malformed_yaml(content: &str) {
        let error = from_str(content, "broken.yaml", None).unwrap_err();
        assert!(matches!(error.problem, Problem::Yaml(_)));
        assert!(error.to_string().starts_with("malformed source 'broken.yaml':"));
    }

    #[test]
    fn rejects_unusable_stem() {
        let error = from_str("units_of_work: {}\n", "--.yaml", None).unwrap_err();
        assert!(matches!(error.problem, Problem::Provenance(_)));
    }

    #[test]
    fn reader_digest_matches_content() {
        let loaded = load_reader(ECOMMERCE.as_bytes(), "stdin", None).unwrap();
        assert_eq!(loaded.digest, SourceDigest::of(ECOMMERCE.as_bytes()));
        assert_eq!(loaded.digest.as_str().len(), 64);
        assert_eq!(loaded.name, "stdin");
    }

    #[test]
    fn digest_is_sha256() {
        assert_eq!(
            SourceDigest::of(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn loads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e-commerce.yaml");
        fs::write(&path, ECOMMERCE).unwrap();

        let loaded = load(&path, None).unwrap();
        assert_eq!(loaded.document.provenance().as_str(), "e-commerce");
        assert_eq!(loaded.name, path.display().to_string());
    }

    #[test]
    fn missing_file_is_malformed_source() {
        let dir = tempfile::tempdir().unwrap();
        let error = load(&dir.path().join("missing.yaml"), None).unwrap_err();
        assert!(matches!(error.problem, Problem::Io(_)));
    }

    #[test]
    fn loads_directory_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        fs::create_dir_all(base.join("nested")).unwrap();
        fs::write(
            base.join("fr-base.yaml"),
            "functional_requirements:\n  FR-001:\n    title: Login\n    priority: High\n",
        )
        .unwrap();
        fs::write(
            base.join("nfr-base.yml"),
            "non_functional_requirements:\n  NFR-001:\n    title: TLS\n    priority: Critical\n",
        )
        .unwrap();
        fs::write(
            base.join("nested").join("uow-base.yaml"),
            "units_of_work:\n  UoW-001:\n    name: Skeleton\n    layer: Foundation\n",
        )
        .unwrap();
        fs::write(base.join("README.md"), "# not yaml").unwrap();

        let loaded = load(&base, Some(Provenance::base())).unwrap();
        let ids: Vec<_> = loaded
            .document
            .ids()
            .map(|(_, id)| id.to_string())
            .collect();
        assert_eq!(ids, vec!["FR-001", "NFR-001", "UoW-001"]);
        assert!(loaded.document.provenance().is_base());

        let again = load(&base, Some(Provenance::base())).unwrap();
        assert_eq!(loaded.digest, again.digest);
    }

    #[test]
    fn directory_provenance_defaults_to_directory_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ai-ml");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("uow.yaml"), "units_of_work: {}\n").unwrap();

        let loaded = load(&root, None).unwrap();
        assert_eq!(loaded.document.provenance().as_str(), "ai-ml");
    }

    #[test]
    fn directory_duplicate_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let entry = "functional_requirements:\n  FR-001:\n    title: Login\n    priority: High\n";
        fs::write(dir.path().join("a.yaml"), entry).unwrap();
        fs::write(dir.path().join("b.yaml"), entry).unwrap();

        let error = load(dir.path(), Some(Provenance::base())).unwrap_err();
        assert!(error.source_name.ends_with("b.yaml"));
        assert!(matches!(
            &error.problem,
            Problem::Duplicate(DuplicateIdentifierError { id, provenance })
                if id.as_str() == "FR-001" && provenance.is_base()
        ));
    }

    #[test]
    fn directory_duplicate_names_declared_provenance() {
        // The provenance is declared in a file loaded after the duplicate.
        let dir = tempfile::tempdir().unwrap();
        let entry = "units_of_work:\n  UoW-001:\n    name: Skeleton\n    layer: Foundation\n";
        fs::write(dir.path().join("a.yaml"), entry).unwrap();
        fs::write(dir.path().join("b.yaml"), entry).unwrap();
        fs::write(dir.path().join("c.yaml"), "provenance: ai-ml\nunits_of_work: {}\n").unwrap();

        let error = load(dir.path(), None).unwrap_err();
        let Problem::Duplicate(duplicate) = error.problem else {
            panic!("expected a duplicate identifier");
        };
        assert_eq!(duplicate.provenance.as_str(), "ai-ml");
    }

    #[test]
    fn directory_metadata_is_combined() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("fr-base.yaml"),
            "metadata:\n  version: '2.0'\n  owner: platform\nfunctional_requirements: {}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("uow-base.yaml"),
            "metadata:\n  owner: team\nunits_of_work: {}\n",
        )
        .unwrap();

        let loaded = load(dir.path(), Some(Provenance::base())).unwrap();
        let metadata = loaded.document.metadata();
        assert_eq!(metadata["version"], serde_yaml::Value::from("2.0"));
        assert_eq!(metadata["owner"], serde_yaml::Value::from("team"));
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let error = load(dir.path(), Some(Provenance::base())).unwrap_err();
        assert!(matches!(error.problem, Problem::EmptyDirectory));
    }

    #[test]
    fn load_all_keeps_order_and_applies_tags() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["gdpr", "ai-ml", "e-commerce", "blockchain"];
        let sources: Vec<_> = names
            .iter()
            .map(|name| {
                let path = dir.path().join(format!("{name}.yaml"));
                fs::write(&path, "units_of_work: {}\n").unwrap();
                ExtensionSource {
                    path,
                    provenance: None,
                    tag: (*name == "e-commerce").then(|| "ECOMMERC".parse().unwrap()),
                }
            })
            .collect();

        let loaded = load_all(&sources).unwrap();
        let provenances: Vec<_> = loaded
            .iter()
            .map(|source| source.document.provenance().to_string())
            .collect();
        assert_eq!(provenances, names);
        assert_eq!(loaded[2].document.tag().as_str(), "ECOMMERC");
    }

    #[test]
    fn load_all_fails_on_any_bad_source() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.yaml");
        fs::write(&good, "units_of_work: {}\n").unwrap();
        let sources = vec![
            ExtensionSource {
                path: good,
                provenance: None,
                tag: None,
            },
            ExtensionSource {
                path: dir.path().join("missing.yaml"),
                provenance: None,
                tag: None,
            },
        ];

        assert!(load_all(&sources).is_err());
    }
}
