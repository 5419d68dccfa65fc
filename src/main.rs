//! Meovis - Main Entry Point

use clap::Parser;
use meovis::cli::{cmd_analyze, cmd_evaluate, cmd_info, cmd_inspect, cmd_train, load_config, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries JSON output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meovis=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Train { data, target, model, task, max_depth, n_estimators, seed, output } => {
            cmd_train(&data, target.as_deref(), &model, &task, max_depth, n_estimators, seed, &output)?;
        }
        Commands::Inspect { model } => {
            cmd_inspect(&model)?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
        Commands::Evaluate { model, data, target, task } => {
            cmd_evaluate(&config, &model, &data, target.as_deref(), task.as_deref())?;
        }
        Commands::Analyze { model, data, target, task, timeout, top, output } => {
            cmd_analyze(
                config,
                &model,
                &data,
                target.as_deref(),
                task.as_deref(),
                timeout,
                top,
                output.as_deref(),
            )
            .await?;
        }
    }

    Ok(())
}
