//! Server runtime: listener, tick loop and per-connection tasks.

use crate::config::Config;
use crate::registry::PlayerRegistry;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};

pub mod broadcast;
pub mod connection;
pub mod tick;

pub use broadcast::{BroadcastReport, broadcast};
pub use tick::{TickReport, TickScheduler};

/// How long shutdown waits for connections to acknowledge the close frame.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Process-level server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bound server that has not started serving yet.
pub struct Server {
    config: Config,
    listener: TcpListener,
    registry: Arc<PlayerRegistry>,
}

impl Server {
    /// Bind the listener. Failure here is the only fatal startup error.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        let addr = config.server.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            config,
            listener,
            registry: Arc::new(PlayerRegistry::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<PlayerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections and tick until `shutdown` resolves.
    ///
    /// On shutdown the listener stops, the tick loop is aborted, every live
    /// connection is asked to close, and this waits up to [`SHUTDOWN_GRACE`]
    /// for them to go away.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        let tick_interval = self.config.server.tick_interval();
        info!("Listening on ws://{}{}", addr, connection::WS_PATH);
        info!(
            "Game loop running at {} TPS ({:?} per tick)",
            self.config.server.tick_rate, tick_interval
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = TickScheduler::new(Arc::clone(&self.registry), tick_interval);
        let tick_task = tokio::spawn(scheduler.run());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Accept failed: {}", e);
                            sleep(Duration::from_millis(10)).await;
                            continue;
                        }
                    };

                    let registry = Arc::clone(&self.registry);
                    let shutdown_rx = shutdown_rx.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            connection::handle_connection(stream, peer, registry, shutdown_rx).await
                        {
                            warn!("Connection error from {}: {}", peer, e);
                        }
                    });
                }
                _ = &mut shutdown => break,
            }
        }

        tick_task.abort();
        info!(
            "Shutting down, closing {} connections",
            self.registry.count().await
        );
        let _ = shutdown_tx.send(true);

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while self.registry.count().await > 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(25)).await;
        }

        let remaining = self.registry.count().await;
        if remaining > 0 {
            warn!("{} connections did not close in time", remaining);
        }
        Ok(())
    }
}

/// Run the server until Ctrl+C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let server = Server::bind(config).await?;
    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C");
        })
        .await?;
    Ok(())
}
