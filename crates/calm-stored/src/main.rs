//! calm-stored: realtime store server for presence clients.
//!
//! Holds the `sessions` / `dailyStats` tree in memory and serves it over
//! WebSocket. Each connection's disconnect hooks run when the socket
//! closes or when the client stays silent past the idle timeout.

mod connection;
mod server;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use calm_common::ConfigError;
use calm_config::CalmConfig;
use calm_presence::store::MemoryStore;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// How often the store size is logged at debug level.
const REPORT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "calm-stored", version, about = "Realtime store server for calm presence")]
struct Args {
    /// Address to bind (overrides `[server] bind`).
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides `[server] port`).
    #[arg(short, long)]
    port: Option<u16>,

    /// Seconds of silence before a connection is treated as lost.
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Config file path override.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log directive override (e.g. "debug", "calm_stored=trace").
    #[arg(long)]
    log_level: Option<String>,
}

/// Effective listen settings after CLI overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ListenSettings {
    addr: String,
    idle_timeout: Duration,
}

impl ListenSettings {
    /// Fold CLI overrides into the `[server]` section, re-validate, and
    /// derive the listen settings.
    fn resolve(args: &Args, mut config: CalmConfig) -> Result<Self, ConfigError> {
        if let Some(bind) = &args.bind {
            config.server.bind = bind.clone();
        }
        if let Some(port) = args.port {
            config.server.port = port;
        }
        if let Some(idle) = args.idle_timeout {
            config.server.idle_timeout_secs = idle;
        }
        calm_config::validation::validate(&config)?;

        let server = &config.server;
        Ok(Self {
            addr: format!("{}:{}", server.bind, server.port),
            idle_timeout: Duration::from_secs(server.idle_timeout_secs),
        })
    }
}

fn init_logging(directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let loaded = calm_config::load_config_from(args.config.as_deref());
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.as_directive())
        .unwrap_or("info");
    init_logging(args.log_level.as_deref().unwrap_or(level));

    let settings = match loaded.and_then(|config| ListenSettings::resolve(&args, config)) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "Config load failed");
            return ExitCode::FAILURE;
        }
    };

    let listener = match TcpListener::bind(&settings.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %settings.addr, error = %e, "Failed to bind TCP listener");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        addr = %settings.addr,
        idle_timeout_secs = settings.idle_timeout.as_secs(),
        "calm-stored v{} listening",
        env!("CARGO_PKG_VERSION")
    );

    let store = MemoryStore::new();
    tokio::spawn(server::report_loop(store.clone(), REPORT_INTERVAL));

    tokio::select! {
        () = server::serve(listener, store, settings.idle_timeout) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutting down");
        }
    }
    ExitCode::SUCCESS
}
