//! Reconnect loop
//!
//! Keeps the plugin attached to the runtime: connect, run a session, wait a
//! fixed interval, repeat until shutdown is signalled.

use super::error::Result;
use super::Stub;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tokio::sync::watch;
use tracing::{debug, info};

/// Opens connections to the runtime.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    async fn connect(&self) -> std::io::Result<Self::Stream>;

    /// Human-readable peer address for logs.
    fn describe(&self) -> String;
}

/// Connects to the runtime's NRI socket.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Connector for UnixConnector {
    type Stream = UnixStream;

    async fn connect(&self) -> std::io::Result<UnixStream> {
        UnixStream::connect(&self.path).await
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub struct Supervisor<C> {
    connector: C,
    stub: Stub,
    interval: Duration,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(connector: C, stub: Stub, interval: Duration) -> Self {
        Self {
            connector,
            stub,
            interval,
        }
    }

    /// Run sessions until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut attempts: u64 = 0;

        while !*shutdown.borrow() {
            if attempts > 0 {
                self.stub.metrics.inc_reconnects();
            }
            attempts += 1;

            info!(
                plugin = %self.stub.config.plugin_name,
                socket = %self.connector.describe(),
                attempt = attempts,
                "Starting NRI plugin"
            );

            let result = tokio::select! {
                result = self.session() => result,
                _ = shutdown.changed() => break,
            };

            let reason = match &result {
                Ok(()) => {
                    self.stub.logger.log_disconnected(None);
                    "connection closed".to_string()
                }
                Err(e) => {
                    let error = e.to_string();
                    self.stub.logger.log_disconnected(Some(&error));
                    error
                }
            };
            self.stub.health.mark_disconnected(reason).await;
            self.stub.metrics.set_connected(false);

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.stub.health.mark_disconnected("shutting down").await;
        self.stub.metrics.set_connected(false);
        debug!(attempts, "Supervisor stopped");
    }

    async fn session(&self) -> Result<()> {
        let stream = self.connector.connect().await?;
        self.stub.run(stream, &self.connector.describe()).await
    }
}
