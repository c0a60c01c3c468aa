use anyhow::Context;
use clap::{Parser, Subcommand};
use county_choropleth::{config::AppConfig, dashboard::Dashboard, data, server};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the data and serve the dashboard (default)
    Serve {
        /// TOML config; ./config.toml or built-in defaults when omitted
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Load and join the data, report match counts, and exit
    Inspect {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    AppConfig::locate(path, &cwd)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve { config: None }) {
        Commands::Serve { config } => {
            let app_config = load_config(config.as_deref())?;
            info!(data_dir = ?app_config.input.data_dir, "starting dashboard");

            let table = data::load_data(&app_config)?;
            let dashboard = Dashboard::new(table, &app_config.dashboard)?;

            server::start_server(&app_config, dashboard).await?;
        }
        Commands::Inspect { config } => {
            let app_config = load_config(config.as_deref())?;
            let table = data::load_data(&app_config)?;
            let report = table.report();
            info!(
                boundaries = report.boundaries,
                statistics = report.statistics,
                matched = report.matched,
                unmatched_boundaries = report.unmatched_boundaries,
                unused_statistics = report.unused_statistics,
                columns = ?table.columns(),
                "join report"
            );
        }
    }

    Ok(())
}
