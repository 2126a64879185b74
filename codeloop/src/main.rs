use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Parse CLI arguments first to get verbosity level
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        2.. => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Run(args) => {
            info!("Run command: {:?}", args);
            runtime.block_on(cli::commands::run::execute(args))?;
        }
        Commands::Batch(args) => {
            info!("Batch command: {:?}", args);
            runtime.block_on(cli::commands::batch::execute(args))?;
        }
        Commands::Apply(args) => {
            info!("Apply command: {:?}", args);
            cli::commands::apply::execute(args)?;
        }
        Commands::Detect(args) => {
            info!("Detect command: {:?}", args);
            cli::commands::detect::execute(args)?;
        }
    }

    Ok(())
}
