//! Daemon: process-level wiring.
//!
//! The Daemon ties together:
//! - Fleet Orchestrator (control loop)
//! - API Server (HTTP endpoints)
//! - Signal handling
//!
//! # Lifecycle
//!
//! 1. Load configuration and the fleet file
//! 2. Initialize components
//! 3. Start API server
//! 4. Run the control loop
//! 5. Graceful shutdown on SIGINT/SIGTERM: drain device tasks, flush stats

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use axeshift_connectors::AxeOsClient;
use axeshift_engine::LocalClock;
use axeshift_exec::{DevicePort, HttpDevicePort};
use axeshift_store::{FileSnapshotStore, SnapshotStore};

use crate::api::{create_router, ApiState};
use crate::config::{Config, FleetConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::fleet::Fleet;
use crate::orchestrator::Orchestrator;

// =============================================================================
// Daemon
// =============================================================================

/// The fleet daemon.
pub struct Daemon<P: DevicePort + 'static, S: SnapshotStore + 'static> {
    /// Configuration
    config: Config,
    /// Control loop
    orchestrator: Arc<Orchestrator<P, S>>,
}

impl Daemon<HttpDevicePort, FileSnapshotStore> {
    /// Create a daemon that talks to real devices and writes stats to disk.
    pub fn from_config(config: Config, fleet: FleetConfig) -> DaemonResult<Self> {
        let port = Arc::new(HttpDevicePort::new(AxeOsClient::new(
            fleet.control.request_timeout,
        )));
        let store = Arc::new(FileSnapshotStore::new(config.stats_path.clone()));
        let orchestrator = Orchestrator::new(
            fleet.control,
            Arc::new(Fleet::new(fleet.devices)),
            port,
            store,
            Arc::new(LocalClock),
        )?;

        Ok(Self::new(config, Arc::new(orchestrator)))
    }
}

impl<P: DevicePort + 'static, S: SnapshotStore + 'static> Daemon<P, S> {
    /// Create a daemon around an existing orchestrator.
    pub fn new(config: Config, orchestrator: Arc<Orchestrator<P, S>>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator<P, S>> {
        &self.orchestrator
    }

    /// Run the daemon.
    ///
    /// Blocks until shutdown is requested (SIGINT/SIGTERM) or the
    /// orchestrator's token is cancelled.
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            devices = self.orchestrator.fleet().len(),
            "Starting fleet daemon"
        );

        let cancel = self.orchestrator.cancellation_token();

        let server = if self.config.api.enabled {
            let (addr, handle) = self.start_api_server(cancel.clone()).await?;
            info!(%addr, "API server started");
            Some(handle)
        } else {
            info!("API server disabled");
            None
        };

        let signals = tokio::spawn(watch_signals(cancel.clone()));

        let result = self.orchestrator.run().await;

        signals.abort();
        if let Some(handle) = server {
            if let Err(e) = handle.await {
                error!(error = %e, "API server task failed");
            }
        }

        result
    }

    /// Start the API server. It stops when `cancel` fires.
    async fn start_api_server(
        &self,
        cancel: CancellationToken,
    ) -> DaemonResult<(SocketAddr, JoinHandle<()>)> {
        let state = Arc::new(ApiState {
            orchestrator: self.orchestrator.clone(),
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        let handle = tokio::spawn(async move {
            let shutdown = async move { cancel.cancelled().await };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "API server error");
            }
        });

        Ok((local_addr, handle))
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn watch_signals(token: CancellationToken) {
    shutdown_signal().await;
    token.cancel();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, starting graceful shutdown"),
        () = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}

// =============================================================================
// Tests
// =============================================================================
