use std::path::PathBuf;

mod init;
mod merge;
mod terminal;
mod validate;

use clap::ArgAction;
use ssot::{domain::config::ExtensionSource, Config, Provenance};

/// Parse an extension argument of the form `PATH` or `PATH=PROVENANCE`.
fn parse_extension(s: &str) -> Result<ExtensionSource, String> {
    let (path, provenance) = match s.split_once('=') {
        Some((path, provenance)) => (path, Some(provenance.parse().map_err(|e| format!("{e}"))?)),
        None => (s, None),
    };

    if path.is_empty() {
        return Err("extension path cannot be empty".to_string());
    }

    Ok(ExtensionSource {
        path: PathBuf::from(path),
        provenance,
        tag: None,
    })
}

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The merge plan to read
    #[arg(short, long, default_value = "ssot.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);
        self.command.run(&self.config)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false)
            .with_writer(std::io::stderr);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Merge the base document and its extensions into one document
    Merge(merge::Command),

    /// Merge in memory and report on the result without writing anything
    Validate(validate::Command),

    /// Create a merge plan and an empty base document
    Init(init::Command),
}

impl Command {
    fn run(self, config: &std::path::Path) -> anyhow::Result<()> {
        match self {
            Self::Merge(command) => command.run(config)?,
            Self::Validate(command) => command.run(config)?,
            Self::Init(command) => command.run(config)?,
        }
        Ok(())
    }
}

/// Merge plan options shared by `merge` and `validate`.
///
/// Any option given here overrides the corresponding setting of the plan
/// file.
#[derive(Debug, Default, clap::Args)]
pub struct PlanArgs {
    /// The base document (a YAML file or a directory of YAML files)
    #[arg(long, short)]
    base: Option<PathBuf>,

    /// An extension to merge, as PATH or PATH=PROVENANCE.
    ///
    /// May be given several times; extensions are merged in the order given.
    /// Replaces the extensions listed in the plan file.
    #[arg(long = "extension", short, value_name = "PATH[=PROVENANCE]", value_parser = parse_extension)]
    extensions: Vec<ExtensionSource>,

    /// Project name recorded in the output
    #[arg(long)]
    project_name: Option<String>,

    /// Accept dangling references instead of failing
    #[arg(long)]
    allow_dangling: bool,
}

impl PlanArgs {
    /// Reads the plan file (if there is one) and applies the overrides.
    fn plan(self, path: &std::path::Path) -> anyhow::Result<Config> {
        let mut config = if path.exists() {
            Config::load(path)?
        } else {
            tracing::debug!("No plan file at {}, using defaults", path.display());
            Config::default()
        };

        if let Some(base) = self.base {
            config.base = base;
        }
        if !self.extensions.is_empty() {
            config.extensions = self.extensions;
        }
        if let Some(project_name) = self.project_name {
            config.project_name = project_name;
        }
        config.allow_dangling |= self.allow_dangling;

        Ok(config)
    }
}

/// The provenances merged, in order, for display.
fn provenances<'a>(sources: impl IntoIterator<Item = &'a Provenance>) -> String {
    sources
        .into_iter()
        .map(Provenance::as_str)
        .collect::<Vec<_>>()
        .join(" → ")
}
