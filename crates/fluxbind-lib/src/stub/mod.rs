//! Runtime connection for the NRI plugin
//!
//! This module provides:
//! - Connection multiplexing over the runtime socket
//! - ttrpc framing with a concurrent server and a unary client
//! - Dispatch of plugin-service requests to a [`Plugin`]
//! - Registration and a supervisor that reconnects at a fixed interval

mod error;
mod mux;
mod supervisor;
mod ttrpc;

#[cfg(test)]
mod tests;

pub use error::{Result, StubError};
pub use mux::{LogicalConn, MuxSender, PLUGIN_SERVICE_CONN, RUNTIME_SERVICE_CONN};
pub use supervisor::{Connector, Supervisor, UnixConnector};
pub use ttrpc::{
    read_frame, Client, Dispatch, Frame, ResponseReader, Server, MESSAGE_LENGTH_MAX,
    MESSAGE_TYPE_REQUEST, MESSAGE_TYPE_RESPONSE,
};

use crate::health::HealthRegistry;
use crate::observability::{PluginMetrics, StructuredLogger};
use crate::plugin::Plugin;
use crate::proto::ttrpc::{code, Request, Response};
use crate::proto::{
    ConfigureRequest, ConfigureResponse, CreateContainerRequest, CreateContainerResponse, Empty,
    Event, RegisterPluginRequest, StateChangeEvent, StopContainerRequest, StopContainerResponse,
    SynchronizeRequest, SynchronizeResponse, UpdateContainerRequest, UpdateContainerResponse,
    PLUGIN_SERVICE, RUNTIME_SERVICE,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tracing::debug;

/// Identity the plugin registers under.
#[derive(Debug, Clone)]
pub struct StubConfig {
    pub plugin_name: String,
    /// Two-digit index ordering this plugin among others.
    pub plugin_idx: String,
    /// Upper bound for the RegisterPlugin round trip.
    pub registration_timeout: Duration,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            plugin_name: "fluxbind".to_string(),
            plugin_idx: "01".to_string(),
            registration_timeout: Duration::from_secs(10),
        }
    }
}

/// Routes plugin-service requests to the matching [`Plugin`] callback.
pub struct PluginDispatcher {
    plugin: Arc<dyn Plugin>,
}

impl PluginDispatcher {
    pub fn new(plugin: Arc<dyn Plugin>) -> Self {
        Self { plugin }
    }

    async fn state_change(&self, event: StateChangeEvent) -> anyhow::Result<Empty> {
        let pod = event.pod.unwrap_or_default();
        let container = event.container.unwrap_or_default();
        let plugin = self.plugin.as_ref();

        match Event::try_from(event.event).unwrap_or(Event::Unknown) {
            Event::RunPodSandbox => plugin.run_pod_sandbox(&pod).await?,
            Event::StopPodSandbox => plugin.stop_pod_sandbox(&pod).await?,
            Event::RemovePodSandbox => plugin.remove_pod_sandbox(&pod).await?,
            Event::PostCreateContainer => plugin.post_create_container(&pod, &container).await?,
            Event::StartContainer => plugin.start_container(&pod, &container).await?,
            Event::PostStartContainer => plugin.post_start_container(&pod, &container).await?,
            Event::PostUpdateContainer => plugin.post_update_container(&pod, &container).await?,
            Event::RemoveContainer => plugin.remove_container(&pod, &container).await?,
            other => debug!(event = ?other, "Ignoring state change"),
        }

        Ok(Empty {})
    }
}

#[async_trait]
impl Dispatch for PluginDispatcher {
    async fn dispatch(&self, request: Request) -> Response {
        if request.service != PLUGIN_SERVICE {
            return ttrpc::error_response(
                code::UNIMPLEMENTED,
                format!("unknown service {}", request.service),
            );
        }

        let plugin = self.plugin.as_ref();
        let payload = request.payload.as_slice();

        match request.method.as_str() {
            "Configure" => {
                ttrpc::unary(payload, |req: ConfigureRequest| async move {
                    let events = plugin.configure(&req).await?;
                    Ok(ConfigureResponse {
                        events: events.bits(),
                    })
                })
                .await
            }
            "Synchronize" => {
                ttrpc::unary(payload, |req: SynchronizeRequest| async move {
                    let update = plugin.synchronize(&req.pods, &req.containers).await?;
                    Ok(SynchronizeResponse { update, more: false })
                })
                .await
            }
            "Shutdown" => {
                ttrpc::unary(payload, |_: Empty| async move {
                    plugin.shutdown().await;
                    Ok(Empty {})
                })
                .await
            }
            "CreateContainer" => {
                ttrpc::unary(payload, |req: CreateContainerRequest| async move {
                    let pod = req.pod.unwrap_or_default();
                    let container = req.container.unwrap_or_default();
                    let (adjust, update) = plugin.create_container(&pod, &container).await?;
                    Ok(CreateContainerResponse {
                        adjust: Some(adjust),
                        update,
                        evict: Vec::new(),
                    })
                })
                .await
            }
            "UpdateContainer" => {
                ttrpc::unary(payload, |req: UpdateContainerRequest| async move {
                    let pod = req.pod.unwrap_or_default();
                    let container = req.container.unwrap_or_default();
                    let update = plugin
                        .update_container(&pod, &container, req.linux_resources.as_ref())
                        .await?;
                    Ok(UpdateContainerResponse {
                        update,
                        evict: Vec::new(),
                    })
                })
                .await
            }
            "StopContainer" => {
                ttrpc::unary(payload, |req: StopContainerRequest| async move {
                    let pod = req.pod.unwrap_or_default();
                    let container = req.container.unwrap_or_default();
                    let update = plugin.stop_container(&pod, &container).await?;
                    Ok(StopContainerResponse { update })
                })
                .await
            }
            "StateChange" => {
                ttrpc::unary(payload, |event: StateChangeEvent| self.state_change(event)).await
            }
            method => ttrpc::error_response(
                code::UNIMPLEMENTED,
                format!("unknown method {PLUGIN_SERVICE}/{method}"),
            ),
        }
    }
}

/// One plugin instance talking to one runtime connection at a time.
pub struct Stub {
    config: StubConfig,
    dispatcher: Arc<PluginDispatcher>,
    health: HealthRegistry,
    metrics: PluginMetrics,
    logger: StructuredLogger,
}

impl Stub {
    pub fn new(
        config: StubConfig,
        plugin: Arc<dyn Plugin>,
        health: HealthRegistry,
        metrics: PluginMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            config,
            dispatcher: Arc::new(PluginDispatcher::new(plugin)),
            health,
            metrics,
            logger,
        }
    }

    /// Run one session over an established connection.
    ///
    /// Serves the plugin service, registers with the runtime, then returns
    /// when the runtime closes the connection or asks the plugin to shut
    /// down. Dropping the returned future tears the session down.
    pub async fn run<S>(&self, stream: S, peer: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (demux, plugin_conn, runtime_conn) = mux::open(stream);
        let (client, responses) = Client::new(runtime_conn);

        let mut tasks = JoinSet::new();
        tasks.spawn(demux.run());
        tasks.spawn(Server::new(plugin_conn, self.dispatcher.clone()).serve());
        tasks.spawn(responses.run());

        self.register(&client).await?;
        self.health.mark_registered().await;
        self.metrics.set_connected(true);
        self.logger.log_connected(peer);

        match tasks.join_next().await {
            Some(result) => result?,
            None => Ok(()),
        }
    }

    async fn register(&self, client: &Client) -> Result<()> {
        let request = RegisterPluginRequest {
            plugin_name: self.config.plugin_name.clone(),
            plugin_idx: self.config.plugin_idx.clone(),
        };

        let _: Empty = client
            .call(
                RUNTIME_SERVICE,
                "RegisterPlugin",
                &request,
                self.config.registration_timeout,
            )
            .await?;

        Ok(())
    }
}
