//! `ssot`: compose a requirements document from a base and its extensions.

use clap::Parser;

mod cli;

fn main() -> anyhow::Result<()> {
    cli::Cli::parse().run()
}
