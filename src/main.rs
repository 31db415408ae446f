use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use civic_sign::config::LoggingSection;

mod cmd;

#[derive(Parser)]
#[command(name = "civic-sign")]
#[command(version, about = "Signature collection service for civic initiatives")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding .civic-sign/ (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the signing HTTP server
    Serve {
        /// Port to serve on. Overrides civic-sign.toml and CIVIC_SIGN_PORT
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (CORS permissive for a local front-end)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and its tables without starting the server
    InitDb {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Load initiative types and initiatives from a TOML fixture file
    Seed {
        file: PathBuf,

        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default civic-sign.toml file
    Init,
}

fn init_tracing(verbose: bool, logging: &LoggingSection) {
    let default_filter = if verbose {
        "debug".to_string()
    } else {
        logging.filter.clone()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let settings = cmd::load_settings(&project_dir);
    let logging = settings
        .as_ref()
        .map(|s| s.logging.clone())
        .unwrap_or_default();
    init_tracing(cli.verbose, &logging);

    match &cli.command {
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        Commands::Serve { port, db_path, dev } => {
            cmd::cmd_serve(&project_dir, settings?, *port, db_path.as_deref(), *dev).await?;
        }
        Commands::InitDb { db_path } => {
            cmd::cmd_init_db(&project_dir, &settings?, db_path.as_deref())?;
        }
        Commands::Seed { file, db_path } => {
            cmd::cmd_seed(&project_dir, &settings?, file, db_path.as_deref())?;
        }
    }

    Ok(())
}
