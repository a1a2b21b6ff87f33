// Folio Pulse CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Commands only render state owned by folio-pulse-core.

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use folio_pulse::{PulseConfig, DEFAULT_PAGE_SIZE};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "folio-pulse")]
#[command(about = "Folio Pulse - Live activity, service health and dashboard metrics")]
#[command(version)]
pub struct Cli {
    /// API base URL (overrides the config file)
    #[arg(long, env = "PULSE_API_URL")]
    pub api_url: Option<String>,

    /// YAML configuration file (services, endpoints, noise types)
    #[arg(long, short, env = "PULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check service health
    Health {
        /// Check only this service ID
        #[arg(long, short)]
        service: Option<String>,
    },

    /// Show one page of the activity log
    Activity {
        /// Page number (1-indexed)
        #[arg(long, default_value = "1")]
        page: u32,

        /// Rows per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,

        /// Server-side type filter (e.g. BLOG_CREATED)
        #[arg(long = "type")]
        event_type: Option<String>,

        /// Search within the fetched page
        #[arg(long)]
        search: Option<String>,
    },

    /// Follow the live activity feed (Ctrl-C to stop)
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Refresh dashboard metrics and print them as they resolve
    Dashboard {
        /// Max wait time in seconds
        #[arg(long, default_value = "15")]
        wait: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let default_filter = if cli.quiet {
        "folio_pulse=warn"
    } else {
        "folio_pulse=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli)?;
    let output_format = output::OutputFormat::from_str(&cli.output);

    match cli.command {
        Commands::Health { service } => {
            commands::health::run(&config, output_format, cli.quiet, service).await
        }
        Commands::Activity {
            page,
            limit,
            event_type,
            search,
        } => {
            commands::activity::run(
                &config,
                output_format,
                cli.quiet,
                commands::activity::ActivityArgs {
                    page,
                    limit,
                    event_type,
                    search,
                },
            )
            .await
        }
        Commands::Watch { duration } => {
            commands::watch::run(&config, output_format, cli.quiet, duration).await
        }
        Commands::Dashboard { wait } => {
            commands::dashboard::run(&config, output_format, cli.quiet, wait).await
        }
    }
}

fn load_config(cli: &Cli) -> Result<PulseConfig> {
    let config = match &cli.config {
        Some(path) => PulseConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PulseConfig::from_env(),
    };
    let config = match &cli.api_url {
        Some(url) => config.with_api_url(url.as_str()),
        None => config,
    };
    config.validate()?;
    Ok(config)
}
