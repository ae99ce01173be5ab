//! AxeShift fleet daemon
//!
//! Switches a fleet of Bitaxe miners between day and night profiles.
//!
//! # Usage
//!
//! ```bash
//! # Start with the default fleet file (axeshift.json)
//! cargo run -p axeshiftd
//!
//! # Custom fleet file, API on another port
//! AXESHIFT_CONFIG=/etc/axeshift.json AXESHIFT_API_PORT=8081 cargo run -p axeshiftd
//! ```
//!
//! # Environment Variables
//!
//! - `AXESHIFT_ENV`: Environment (test, development, production)
//! - `AXESHIFT_CONFIG`: Fleet file path (default: axeshift.json)
//! - `AXESHIFT_STATS_PATH`: Stats snapshot path (default: axeshift_stats.json)
//! - `AXESHIFT_API_ENABLED`: Serve the HTTP API (default: true)
//! - `AXESHIFT_API_HOST`: API host (default: 0.0.0.0)
//! - `AXESHIFT_API_PORT`: API port (default: 8080)

use axeshiftd::{Config, Daemon, FleetConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("axeshiftd=info".parse()?))
        .init();

    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        fleet_file = %config.fleet_path.display(),
        api_enabled = config.api.enabled,
        api_port = config.api.port,
        "AxeShift fleet daemon"
    );

    let fleet = FleetConfig::load(&config.fleet_path)?;
    let daemon = Daemon::from_config(config, fleet)?;
    daemon.run().await?;

    Ok(())
}
