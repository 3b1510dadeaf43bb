//! NRI plugin callbacks
//!
//! [`Plugin`] mirrors the callbacks a runtime delivers to an NRI plugin. Only
//! [`Plugin::configure`] and [`Plugin::create_container`] must be provided;
//! every other callback defaults to doing nothing.

mod driver;

pub use driver::Driver;

use crate::proto::{
    ConfigureRequest, Container, ContainerAdjustment, ContainerUpdate, EventMask, LinuxResources,
    PodSandbox,
};
use anyhow::Result;

pub use async_trait::async_trait;

#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Called once per connection; returns the events to subscribe to.
    async fn configure(&self, request: &ConfigureRequest) -> Result<EventMask>;

    /// Called with the runtime's current pods and containers after registration.
    async fn synchronize(
        &self,
        _pods: &[PodSandbox],
        _containers: &[Container],
    ) -> Result<Vec<ContainerUpdate>> {
        Ok(Vec::new())
    }

    /// The runtime is about to drop the connection.
    async fn shutdown(&self) {}

    async fn run_pod_sandbox(&self, _pod: &PodSandbox) -> Result<()> {
        Ok(())
    }

    async fn stop_pod_sandbox(&self, _pod: &PodSandbox) -> Result<()> {
        Ok(())
    }

    async fn remove_pod_sandbox(&self, _pod: &PodSandbox) -> Result<()> {
        Ok(())
    }

    /// Adjust a container before it is created.
    async fn create_container(
        &self,
        pod: &PodSandbox,
        container: &Container,
    ) -> Result<(ContainerAdjustment, Vec<ContainerUpdate>)>;

    async fn post_create_container(&self, _pod: &PodSandbox, _container: &Container) -> Result<()> {
        Ok(())
    }

    async fn start_container(&self, _pod: &PodSandbox, _container: &Container) -> Result<()> {
        Ok(())
    }

    async fn post_start_container(&self, _pod: &PodSandbox, _container: &Container) -> Result<()> {
        Ok(())
    }

    async fn update_container(
        &self,
        _pod: &PodSandbox,
        _container: &Container,
        _resources: Option<&LinuxResources>,
    ) -> Result<Vec<ContainerUpdate>> {
        Ok(Vec::new())
    }

    async fn post_update_container(&self, _pod: &PodSandbox, _container: &Container) -> Result<()> {
        Ok(())
    }

    async fn stop_container(
        &self,
        _pod: &PodSandbox,
        _container: &Container,
    ) -> Result<Vec<ContainerUpdate>> {
        Ok(Vec::new())
    }

    async fn remove_container(&self, _pod: &PodSandbox, _container: &Container) -> Result<()> {
        Ok(())
    }
}
