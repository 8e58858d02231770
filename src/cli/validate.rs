use std::path::Path;

use clap::Parser;
use ssot::{compose, validation::Statistics, Composition};
use tracing::instrument;

use super::{provenances, terminal::Colorize, PlanArgs};

#[derive(Debug, Parser)]
#[command(
    about = "Merge in memory and report dangling references, cycles, layer order and statistics"
)]
pub struct Command {
    #[command(flatten)]
    plan: PlanArgs,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress all output except errors
    #[arg(long, short)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
    Summary,
}

impl Command {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, config: &Path) -> anyhow::Result<()> {
        let plan = self.plan.plan(config)?;
        let composition = compose(&plan)?;

        match self.output {
            OutputFormat::Table if self.quiet => {}
            OutputFormat::Table => Self::output_table(&composition),
            OutputFormat::Json => Self::output_json(&composition)?,
            OutputFormat::Summary => Self::output_summary(&composition),
        }

        // Exit with appropriate code
        if !composition.report.is_valid() && !plan.allow_dangling {
            std::process::exit(2);
        }

        Ok(())
    }

    fn output_table(composition: &Composition) {
        let Composition {
            merged, report, ..
        } = composition;
        let statistics = &report.statistics;

        println!("Validating {}...\n", provenances(merged.sources()));

        println!(
            "✓ Entities:   {} functional, {} non-functional, {} units of work",
            statistics.functional_requirements,
            statistics.non_functional_requirements,
            statistics.units_of_work
        );

        if merged.renames().is_empty() {
            println!("✓ Renames:    No identifier conflicts");
        } else {
            println!(
                "{}",
                format!("✓ Renames:    {} identifier conflicts resolved", merged.renames().len())
                    .info()
            );
            for rename in merged.renames() {
                println!(
                    "    {} ({}) → {}",
                    rename.original, rename.provenance, rename.final_id
                );
            }
        }

        if report.dangling.is_empty() {
            println!("✓ References: All references resolve");
        } else {
            println!(
                "{}",
                format!("✗ References: {} dangling", report.dangling.len()).warning()
            );
            for dangling in &report.dangling {
                println!("    • {dangling}");
            }
        }

        if report.cycles.is_empty() {
            println!("✓ Cycles:     No dependency cycles");
        } else {
            println!(
                "{}",
                format!("✗ Cycles:     {} dependency cycles", report.cycles.len()).warning()
            );
            for cycle in &report.cycles {
                let members: Vec<_> = cycle.iter().map(ToString::to_string).collect();
                println!("    • {}", members.join(", "));
            }
        }

        if report.layer_violations.is_empty() {
            println!("✓ Layers:     No unit of work depends on a later layer");
        } else {
            println!(
                "{}",
                format!(
                    "✗ Layers:     {} dependencies on a later layer",
                    report.layer_violations.len()
                )
                .warning()
            );
            for violation in &report.layer_violations {
                println!("    • {violation}");
            }
        }

        print_statistics(statistics);

        if report.is_valid() {
            println!("\n{}", "Merged document is consistent".success());
        } else {
            println!(
                "\n{}",
                format!("Summary: {} unresolved references", report.dangling.len()).warning()
            );
            println!(
                "{}",
                "Fix the references, or pass --allow-dangling to accept them".dim()
            );
        }
    }

    fn output_json(composition: &Composition) -> anyhow::Result<()> {
        use serde_json::json;

        let Composition {
            merged, report, ..
        } = composition;

        let output = json!({
            "status": if report.is_valid() { "valid" } else { "dangling_references" },
            "sources": merged.sources(),
            "renames": merged.renames(),
            "dangling": report.dangling,
            "cycles": report.cycles,
            "layer_violations": report.layer_violations,
            "statistics": report.statistics,
        });

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    fn output_summary(composition: &Composition) {
        let report = &composition.report;
        println!(
            "entities={} renames={} dangling={} cycles={} layer_violations={}",
            composition.merged.len(),
            report.statistics.renamed_identifiers,
            report.dangling.len(),
            report.cycles.len(),
            report.layer_violations.len()
        );
    }
}

fn print_statistics(statistics: &Statistics) {
    println!("\n{}", "Requirements by priority".dim());
    for (priority, count) in &statistics.requirements_by_priority {
        println!("  {:<15}{count:>5}", priority.to_string());
    }

    println!("{}", "Units of work by layer".dim());
    for (layer, count) in &statistics.units_of_work_by_layer {
        println!("  {:<15}{count:>5}", layer.to_string());
    }

    if !statistics.requirements_by_category.is_empty() {
        println!("{}", "Requirements by category".dim());
        for (category, count) in &statistics.requirements_by_category {
            println!("  {category:<15}{count:>5}");
        }
    }

    println!(
        "{}",
        format!("Total estimated effort: {} hours", statistics.total_effort_hours).dim()
    );
}
