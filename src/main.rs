use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

use relay_store::Database;
use relay_telemetry::{init_telemetry, TelemetryConfig};

/// Single-room realtime chat relay.
#[derive(Parser, Debug)]
#[command(name = "relay", version, about)]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "RELAY_PORT", default_value_t = 8080)]
    port: u16,

    /// Path to the message database.
    #[arg(long, env = "RELAY_DB")]
    db_path: Option<PathBuf>,

    /// Number of messages replayed to a new joiner.
    #[arg(long, default_value_t = 50)]
    history_limit: usize,

    /// Verbose logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _telemetry = init_telemetry(TelemetryConfig {
        log_level: if args.debug { Level::DEBUG } else { Level::INFO },
        ..Default::default()
    });

    let db_path = args.db_path.unwrap_or_else(default_db_path);
    let db = Database::open(&db_path)?;

    let config = relay_server::ServerConfig {
        port: args.port,
        history_limit: args.history_limit,
        ..Default::default()
    };
    let handle = relay_server::start(config, db).await?;
    tracing::info!(port = handle.port, "relay ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}

fn default_db_path() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".relay")
        .join("messages.db")
}
