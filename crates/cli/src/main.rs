//! Consumer Token Sidecar CLI — the main entry point.
//!
//! Commands:
//! - `serve`        — Start the HTTP gateway
//! - `config`       — Configuration inspection
//! - `doctor`       — Diagnose configuration and upstream reachability
//! - `completions`  — Generate shell completion scripts
//! - `version`      — Show detailed version info

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

mod commands;

#[derive(Parser)]
#[command(
    name = "token-sidecar",
    about = "Consumer Token Sidecar — stateless authentication sidecar issuing signed bearer tokens",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind host (e.g. 0.0.0.0 for containers)
        #[arg(long)]
        host: Option<String>,
    },

    /// Diagnose configuration and upstream reachability
    Doctor,

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Configuration inspection
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show detailed version info
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate the current configuration
    Validate,
    /// Show the resolved configuration
    Show,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(port, host).await?,
        Commands::Doctor => commands::doctor::run().await?,

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "token-sidecar", &mut std::io::stdout());
        }

        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
        },

        Commands::Version => {
            println!("token-sidecar v{}", env!("CARGO_PKG_VERSION"));
            println!("  Arch: {}", std::env::consts::ARCH);
            println!("  OS:   {}", std::env::consts::OS);
        }
    }

    Ok(())
}
