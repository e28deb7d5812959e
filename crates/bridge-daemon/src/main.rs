//! Qlink bridge daemon: multiplexes HTTP-driven clients onto one slow
//! ASCII-over-TCP lighting controller.

mod app;
mod handlers;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_SOCKET: &str = "/tmp/qlink-bridge.sock";

/// Bridge daemon command-line interface.
#[derive(Parser)]
#[command(name = "qlink-bridge")]
#[command(about = "Bridge between HTTP clients and a Qlink lighting controller")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Path to the JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path of the IPC socket
    #[arg(long, default_value = DEFAULT_SOCKET, global = true)]
    socket: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start,
    /// Stop a running daemon
    Stop,
    /// Query a running daemon's status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init_logging(&cli.log_level);

    match cli.command {
        Some(Commands::Start) | None => {
            let config = bridge_engine::BridgeConfig::load(cli.config.as_deref())?;
            app::run_daemon(config, &cli.socket).await?;
        }
        Some(Commands::Stop) => {
            app::stop_daemon(&cli.socket).await?;
        }
        Some(Commands::Status) => {
            app::check_status(&cli.socket).await?;
        }
    }

    Ok(())
}
