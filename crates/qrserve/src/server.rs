//! Listener lifecycle: bind, serve until cancelled, stop.

use std::future::IntoFuture;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServeError;
use crate::{AppState, routes};

/// How long open connections may keep going once shutdown is requested.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A bound, ready-to-run file server.
///
/// Holding a `Server` means the port is taken; dropping it without calling
/// [`Server::run`] releases the port again.
pub struct Server {
    listener: TcpListener,
    app: Router,
    shutdown_grace: Duration,
}

impl Server {
    /// Bind `0.0.0.0:<port>` and build the router for `config.root_dir`.
    ///
    /// A port that is already in use is reported as [`ServeError::Bind`];
    /// no other port is tried.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServeError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind {
                port: config.port,
                source,
            })?;

        info!("Serving files from: {}", config.root_dir.display());
        info!("Listening on http://{}", listener.local_addr()?);

        let app = routes::app(AppState::new(config.root_dir.clone()));
        Ok(Self {
            listener,
            app,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// In-flight requests get the shutdown grace period to finish. After that
    /// the listener is closed and `run` returns without waiting for
    /// connections still open (stalled downloads, half sent requests).
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServeError> {
        let grace = self.shutdown_grace;
        let serve = axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future();

        let deadline = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            result = serve => result?,
            () = deadline => {
                warn!("Connections still open {:?} after shutdown, closing them", grace);
            }
        }

        info!("Listener closed");
        Ok(())
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
