use anyhow::Result;
use clap::Parser;

use bibitem_linker::cli::{Cli, Commands};
use bibitem_linker::commands::{run_contexts, run_resolve, run_snapshot};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve(args) => {
            run_resolve(args)?;
        }
        Commands::Contexts(args) => {
            run_contexts(args)?;
        }
        Commands::Snapshot(args) => {
            run_snapshot(args)?;
        }
    }

    Ok(())
}
