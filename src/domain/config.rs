use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Provenance, Tag};

/// A merge plan: which sources to combine, in which order, and where to put
/// the result.
///
/// Relative paths are interpreted relative to the directory containing the
/// configuration file (see [`Config::resolve_paths`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Name of the project, recorded in the output metadata.
    pub project_name: String,

    /// The base document: a YAML file, or a directory of YAML files.
    pub base: PathBuf,

    /// Extensions, in the order they are merged.
    ///
    /// The order is significant: when two extensions define the same
    /// identifier, the one merged later is renamed.
    pub extensions: Vec<ExtensionSource>,

    /// Where the merged document is written.
    pub output: PathBuf,

    /// Whether dangling references are tolerated.
    ///
    /// When `false` (default), a merge whose result contains references to
    /// identifiers that do not exist fails and no output is written.
    pub allow_dangling: bool,
}

/// One extension entry of the merge plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionSource {
    /// Path to the extension's YAML file or directory.
    pub path: PathBuf,

    /// Source identity. Defaults to the one declared in the file, or the
    /// file stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,

    /// Rename tag. Defaults to the tag derived from the provenance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Tag>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            base: default_base(),
            extensions: Vec::new(),
            output: default_output(),
            allow_dangling: false,
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(LoadError::Read)?;
        let config: Self = toml::from_str(&content)?;
        let root = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.resolve_paths(root))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Makes every relative path in the plan relative to `root` instead.
    #[must_use]
    pub fn resolve_paths(mut self, root: &Path) -> Self {
        let resolve = |path: PathBuf| {
            if path.is_relative() {
                root.join(path)
            } else {
                path
            }
        };

        self.base = resolve(self.base);
        self.output = resolve(self.output);
        for extension in &mut self.extensions {
            extension.path = resolve(std::mem::take(&mut extension.path));
        }
        self
    }
}

/// Errors that can occur when loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("Failed to read config file: {0}")]
    Read(#[source] std::io::Error),
    /// The file is not a valid merge plan.
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_project_name() -> String {
    "Project".to_string()
}

fn default_base() -> PathBuf {
    PathBuf::from("base")
}

fn default_output() -> PathBuf {
    PathBuf::from("merged-ssot.yaml")
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_project_name")]
        project_name: String,

        #[serde(default = "default_base")]
        base: PathBuf,

        #[serde(default = "default_output")]
        output: PathBuf,

        #[serde(default)]
        allow_dangling: bool,

        /// Listed last so that TOML serialization emits the array of tables
        /// after the plain keys.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        extensions: Vec<ExtensionSource>,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                project_name,
                base,
                output,
                allow_dangling,
                extensions,
            } => Self {
                project_name,
                base,
                extensions,
                output,
                allow_dangling,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            project_name: config.project_name,
            base: config.base,
            output: config.output,
            allow_dangling: config.allow_dangling,
            extensions: config.extensions,
        }
    }
}
