use std::path::{Path, PathBuf};

use ssot::{compose, storage::Artifact, Composition};
use tracing::instrument;

use super::{provenances, terminal::Colorize, PlanArgs};

#[derive(Debug, clap::Parser)]
pub struct Command {
    #[command(flatten)]
    plan: PlanArgs,

    /// Where to write the merged document (`.json` for JSON, YAML otherwise)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Suppress all output except errors
    #[arg(long, short)]
    quiet: bool,
}

impl Command {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, config: &Path) -> anyhow::Result<()> {
        let mut plan = self.plan.plan(config)?;
        if let Some(output) = self.output {
            plan.output = output;
        }

        let Composition {
            sources,
            merged,
            report,
        } = compose(&plan)?;

        let report = if plan.allow_dangling {
            report
        } else {
            report.into_result().inspect_err(|error| {
                for dangling in error.dangling().iter() {
                    eprintln!("{}", format!("✗ {dangling}").warning());
                }
                eprintln!(
                    "\n{}",
                    "Run with --allow-dangling to write the document anyway".dim()
                );
            })?
        };

        let artifact = Artifact::new(
            &plan.project_name,
            &merged,
            &sources,
            &report,
            chrono::Utc::now(),
        );
        artifact.write(&plan.output)?;

        if self.quiet {
            return Ok(());
        }

        let statistics = &report.statistics;
        println!(
            "{}",
            format!(
                "✓ Merged {} into {}",
                provenances(merged.sources()),
                plan.output.display()
            )
            .success()
        );
        println!(
            "  {} functional, {} non-functional, {} units of work",
            statistics.functional_requirements,
            statistics.non_functional_requirements,
            statistics.units_of_work
        );

        if !merged.renames().is_empty() {
            println!(
                "{}",
                format!("  {} identifiers renamed:", merged.renames().len()).info()
            );
            for rename in merged.renames() {
                println!(
                    "    {} ({}) → {}",
                    rename.original, rename.provenance, rename.final_id
                );
            }
        }

        if !report.dangling.is_empty() {
            println!(
                "{}",
                format!("  {} dangling references kept", report.dangling.len()).warning()
            );
        }
        for cycle in &report.cycles {
            let members: Vec<_> = cycle.iter().map(ToString::to_string).collect();
            println!(
                "{}",
                format!("  dependency cycle: {}", members.join(", ")).warning()
            );
        }
        for violation in &report.layer_violations {
            println!("{}", format!("  layer order: {violation}").warning());
        }

        Ok(())
    }
}
