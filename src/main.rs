mod replay;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ledger_core::config::AppConfig;
use ledger_core::Ledger;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mood-ledger",
    about = "Bounded per-session label history with summaries and transition detection",
    version,
    author
)]
struct Cli {
    /// Path to config file (default: ~/.config/mood-ledger/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Replay a JSON-lines event file and print markdown reports
    Report {
        /// File with one event object per line
        #[arg(short, long)]
        input: PathBuf,
        /// Only report this session group
        #[arg(short, long)]
        group: Option<String>,
        /// Print one line per participant instead of markdown
        #[arg(long)]
        brief: bool,
    },

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration file
    Init,
    /// Print config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up tracing.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "mood_ledger=info,ledger_core=info,ledger_server=info,warn".into()
        }))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    match cli.command {
        Some(Commands::Config { action }) => handle_config_command(action, &config)?,
        Some(Commands::Report {
            input,
            group,
            brief,
        }) => {
            let ledger = Ledger::new(config.ledger.clone())?;
            let output = replay::run(&ledger, &input, group.as_deref(), brief)?;
            print!("{}", output);
        }
        Some(Commands::Serve { host, port }) => {
            if let Some(h) = host {
                config.server.host = h;
            }
            if let Some(p) = port {
                config.server.port = p;
            }
            serve(config).await?;
        }
        None => serve(config).await?,
    }

    Ok(())
}

/// The process owns exactly one ledger; handlers reach it through server state.
async fn serve(config: AppConfig) -> Result<()> {
    let ledger = Arc::new(Ledger::new(config.ledger.clone())?);
    tracing::info!(
        "Ledger ready: window {}, retention cap {}",
        config.ledger.window_size,
        ledger.retention_cap()
    );
    ledger_server::serve(config, ledger).await
}

fn handle_config_command(action: Option<ConfigAction>, config: &AppConfig) -> Result<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
        }
        Some(ConfigAction::Init) => {
            let path = AppConfig::default_path();
            if path.exists() {
                println!("Config already exists at: {}", path.display());
            } else {
                AppConfig::default().save_to(&path)?;
                println!("Created default config at: {}", path.display());
            }
        }
        Some(ConfigAction::Path) => {
            println!("{}", AppConfig::default_path().display());
        }
    }
    Ok(())
}
