mod cli;
mod commands;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;

use calm_common::{Clock, SystemClock};
use calm_presence::RealtimeStore;
use tracing_subscriber::EnvFilter;

use crate::cli::Command;

fn init_logging(directive: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    // Config decides the default log level, so load it before logging is up
    // and report any failure afterwards.
    let loaded = calm_config::load_config_from(args.config.as_deref());
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.as_directive())
        .unwrap_or("info");
    init_logging(args.log_level.as_deref().unwrap_or(level));

    tracing::debug!("calm v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match loaded.and_then(|c| settings::apply_overrides(c, args.store_url.as_deref())) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Config load failed");
            return ExitCode::FAILURE;
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let result = match args.command {
        Command::Presence => commands::presence(&config, clock).await,
        Command::Sessions => match commands::connect(&config).await {
            Ok(remote) => {
                let out = commands::sessions(remote.as_ref(), clock.as_ref()).await;
                remote.disconnect().await;
                out.map(|text| println!("{text}"))
            }
            Err(e) => Err(e),
        },
        Command::Stats { date } => match commands::connect(&config).await {
            Ok(remote) => {
                let out = commands::stats(remote.as_ref(), date).await;
                remote.disconnect().await;
                out.map(|text| println!("{text}"))
            }
            Err(e) => Err(e),
        },
        Command::Reap => match commands::connect(&config).await {
            Ok(remote) => {
                let store: Arc<dyn RealtimeStore> = remote.clone();
                println!("{}", commands::reap(store, clock, &config).await);
                remote.disconnect().await;
                Ok(())
            }
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
