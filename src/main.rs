use anyhow::Result;
use clap::Parser;

mod cli;

use cli::commands::classify::ClassifyCommand;
use cli::commands::cleanup::{CleanupCommand, PendingCommand};
use cli::commands::step::StepCommand;
use cli::commands::Engine;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Runtime::new()?.block_on(async {
        // Classification repairs records by id alone and needs no target settings.
        let validate = !matches!(cli.command, Commands::Classify { .. });
        let engine = Engine::start(cli.config.as_deref(), cli.sandbox.as_deref(), validate).await?;

        let outcome = match cli.command {
            Commands::Step { kind, input } => StepCommand::new(kind, input).execute(&engine).await,
            Commands::Cleanup { company } => CleanupCommand::new(company).execute(&engine).await,
            Commands::Pending { company } => PendingCommand::new(company).execute(&engine).await,
            Commands::Classify { input } => ClassifyCommand::new(input).execute(&engine).await,
        };

        engine.finish().await?;
        outcome
    })
}
