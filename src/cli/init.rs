use std::{fs, path::Path};

use ssot::Config;
use tracing::instrument;

/// Starter content for the split base document.
const BASE_FILES: [(&str, &str); 3] = [
    ("fr-base.yaml", "functional_requirements: {}\n"),
    ("nfr-base.yaml", "non_functional_requirements: {}\n"),
    ("uow-base.yaml", "units_of_work: {}\n"),
];

#[derive(Debug, clap::Parser)]
pub struct Command {
    /// Project name to record in the plan
    #[arg(long, value_name = "NAME")]
    project_name: Option<String>,
}

impl Command {
    #[instrument]
    pub fn run(self, config_path: &Path) -> anyhow::Result<()> {
        if config_path.exists() {
            anyhow::bail!(
                "Merge plan already exists (found {})",
                config_path.display()
            );
        }

        let root = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut config = Config::default();
        if let Some(project_name) = self.project_name {
            config.project_name = project_name;
        }

        // Create the base directory without touching existing files
        let base_dir = root.join(&config.base);
        fs::create_dir_all(&base_dir)
            .map_err(|e| anyhow::anyhow!("Failed to create base directory: {e}"))?;

        let mut created = Vec::new();
        for (name, content) in BASE_FILES {
            let path = base_dir.join(name);
            if path.exists() {
                continue;
            }
            fs::write(&path, content)
                .map_err(|e| anyhow::anyhow!("Failed to create {name}: {e}"))?;
            created.push(name);
        }

        fs::create_dir_all(root.join("extensions"))
            .map_err(|e| anyhow::anyhow!("Failed to create extensions directory: {e}"))?;

        config
            .save(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", config_path.display()))?;

        println!("Initialized merge plan in {}", root.display());
        println!("  Created: {}", config_path.display());
        for name in &created {
            println!("  Created: {}/{name}", config.base.display());
        }
        println!();
        println!("Next steps:");
        println!("  Add requirements to the files in {}/", config.base.display());
        println!("  ssot merge --extension extensions/<name>.yaml");

        Ok(())
    }
}
