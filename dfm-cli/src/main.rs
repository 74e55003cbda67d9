//! `dfmctl`: a thin operator CLI for the federation runtime — submit a
//! pipeline file, tail a request's responses, or inspect a site config.
//! Deliberately not an example-pipeline argument parser: the pipelines it
//! submits are read as data files, never constructed from flags.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dfmctl", version, about = "Operate a DFM site from a terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a Process read from a JSON or YAML file and print its request_id.
    Submit {
        /// Path to a file containing a Process node (JSON or YAML).
        pipeline: std::path::PathBuf,
        /// This site's name, used as both home_site and this_site for the submission.
        #[arg(long)]
        site: String,
        /// Target the execute stream directly instead of letting the queue route.
        #[arg(long)]
        target_site: Option<String>,
    },
    /// Poll and print a request's accumulated responses as JSON lines.
    Tail {
        /// The request_id returned by `submit`.
        request_id: uuid::Uuid,
        /// Keep polling for new responses instead of printing once and exiting.
        #[arg(long)]
        follow: bool,
    },
    /// Load a site config (and optional secrets file) and print it, validating that it parses.
    Site {
        /// Path to the site config YAML file.
        config: std::path::PathBuf,
        /// Path to a secrets YAML file to merge in.
        #[arg(long)]
        secrets: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dfm_config::load_dotenv();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Submit { pipeline, site, target_site } => commands::submit::run(&pipeline, &site, target_site).await,
        Commands::Tail { request_id, follow } => commands::tail::run(request_id, follow).await,
        Commands::Site { config, secrets } => commands::site::run(&config, secrets.as_deref()),
    }
}
