//! Warden - an agent task runtime

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;
mod server;
mod services;

use commands::{id_command, init_command, serve_command, status_command, tools_command};

/// Warden - agent tasks over a line-delimited JSON socket
#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "◆ An agent task runtime")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and workspace
    Init,
    /// Show runtime status
    Status,
    /// Start the runtime server
    Serve {
        /// Address to listen on
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// List available tools as JSON call signatures
    Tools,
    /// Generate identifiers
    Id {
        /// How many identifiers to generate
        #[arg(short, long, default_value_t = 1)]
        count: usize,
        /// Decode an identifier instead of generating
        #[arg(long)]
        parse: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so command output on stdout stays machine-readable
    let filter = if matches!(cli.command, Commands::Serve { verbose: true, .. }) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => {
            if let Err(e) = init_command().await {
                error!("Init failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Status => {
            if let Err(e) = status_command().await {
                error!("Status failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Serve { host, port, verbose: _ } => {
            if let Err(e) = serve_command(host, port).await {
                error!("Serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Tools => {
            if let Err(e) = tools_command().await {
                error!("Tools failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Id { count, parse } => {
            if let Err(e) = id_command(count, parse).await {
                error!("Id failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}
