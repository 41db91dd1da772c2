//! Slidecast CLI: validate, preview, and encode slideshow requests.
//!
//! Usage:
//!   slidecast encode <REQUEST>     Run a request through the pipeline
//!   slidecast validate <REQUEST>   Check a request without fetching anything
//!   slidecast frame <REQUEST>      Render a single frame to PNG
//!   slidecast check                Check the configured backend
//!
//! `<REQUEST>` is a JSON file, or `-` for stdin.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use slidecast_common::config::{AppConfig, BackendKind};

mod commands;

#[derive(Parser)]
#[command(
    name = "slidecast",
    about = "Turn still images into short vertical videos",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: $XDG_CONFIG_HOME/slidecast/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured encoding backend
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a request and print the response envelope
    Encode {
        /// Request JSON file, or `-` for stdin
        request: String,

        /// Pretty-print the response
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a request
    Validate {
        /// Request JSON file, or `-` for stdin
        request: String,
    },

    /// Render the frame visible at a given time
    Frame {
        /// Request JSON file, or `-` for stdin
        request: String,

        /// Time in seconds
        #[arg(long, default_value = "0.0")]
        at: f64,

        /// Output PNG path
        #[arg(short, long, default_value = "frame.png")]
        output: PathBuf,
    },

    /// Check that the configured backend can run here
    Check,
}

/// Config from `--config` or the standard location, with secrets taken
/// from the environment when present.
fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Ok(key) = std::env::var("SLIDECAST_RENDER_API_KEY") {
        config.remote.api_key = Some(key);
    }
    if let Ok(token) = std::env::var("SLIDECAST_STORAGE_TOKEN") {
        if let slidecast_common::config::StorageConfig::Http { token: slot, .. } =
            &mut config.storage
        {
            *slot = Some(token);
        }
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // Config warnings are emitted before the configured subscriber exists.
    let config = slidecast_common::logging::with_bootstrap_logging(|| load_config(&cli))?;

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    slidecast_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Encode { request, pretty } => {
            commands::encode::run(&config, &request, pretty).await
        }
        Commands::Validate { request } => commands::validate::run(&request),
        Commands::Frame {
            request,
            at,
            output,
        } => commands::frame::run(&config, &request, at, output).await,
        Commands::Check => commands::check::run(&config),
    }
}
