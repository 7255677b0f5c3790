//! `prochat-relay` binary.
//!
//! Serves the realtime relay on a single `/ws` WebSocket route.
//!
//! ```bash
//! # Listen on 0.0.0.0:5000 with defaults
//! prochat-relay
//!
//! # Smaller caps, verbose relay logs
//! prochat-relay --bind 127.0.0.1:5000 --max-rooms-per-connection 32 \
//!     --log-level warn,prochat_relay=debug
//!
//! # Everything from a file
//! RELAY_CONFIG=/etc/prochat/relay.toml prochat-relay
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use prochat_relay::config::{RelayCliArgs, RelayConfig};
use prochat_relay::relay::{self, RelayState};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match RelayConfig::load(&RelayCliArgs::parse()) {
        Ok(config) => config,
        Err(e) => {
            // Tracing is not installed yet; the filter comes from this config.
            eprintln!("prochat-relay: {e}");
            return ExitCode::from(2);
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .init();

    match serve(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, bind_addr = %config.bind_addr, "relay stopped");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: &RelayConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = Arc::new(RelayState::from_config(config));
    let (bound_addr, server) = relay::start_server_with_state(&config.bind_addr, state).await?;
    tracing::info!(
        addr = %bound_addr,
        max_payload_size = config.max_payload_size,
        max_rooms_per_connection = config.max_rooms_per_connection,
        "prochat relay listening"
    );
    server.await?;
    Ok(())
}
