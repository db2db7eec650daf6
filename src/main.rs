//! Main entry point for the zipname CLI application.

use anyhow::{Context, Result};
use clap::Parser;

use zipname::Cli;
use zipname::cli::Command;
use zipname::commands::{self, CreateOptions, ExtractOptions};

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.default_log_filter()),
    )
    .init();

    match cli.command {
        Command::Create {
            source,
            target,
            update,
            recursive,
            truncate,
        } => {
            let options = CreateOptions {
                recursive,
                truncate,
                update,
                verbose: cli.verbose,
            };
            let archive = commands::create(&source, target.as_deref(), &options)
                .with_context(|| format!("create {} failed", source.display()))?;
            if cli.verbose {
                println!("Created {}", archive.display());
            }
        }
        Command::Extract { source, target } => {
            let options = ExtractOptions {
                verbose: cli.verbose,
            };
            let restored = commands::extract(&source, target.as_deref(), &options)
                .with_context(|| format!("extract {} failed", source.display()))?;
            if cli.verbose {
                println!("Extracted {} entries", restored.len());
            }
        }
    }

    Ok(())
}
