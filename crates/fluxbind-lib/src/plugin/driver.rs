//! The fluxbind plugin: pins containers to the CPUs named by their cpuset hint.

use super::{async_trait, Plugin};
use crate::affinity::{AdjustmentBuilder, SkipReason};
use crate::observability::{PluginMetrics, StructuredLogger};
use crate::proto::{
    ConfigureRequest, Container, ContainerAdjustment, ContainerUpdate, Event, EventMask,
    PodSandbox,
};
use anyhow::Result;
use std::time::Instant;

/// Runtime-facing adapter around [`AdjustmentBuilder`].
///
/// Holds no per-container state; concurrent CreateContainer calls only share
/// the immutable builder and the metric handles.
#[derive(Clone)]
pub struct Driver {
    builder: AdjustmentBuilder,
    metrics: PluginMetrics,
    logger: StructuredLogger,
}

impl Driver {
    pub fn new(builder: AdjustmentBuilder, metrics: PluginMetrics, logger: StructuredLogger) -> Self {
        Self {
            builder,
            metrics,
            logger,
        }
    }

    /// Events this driver acts on.
    pub fn subscriptions() -> EventMask {
        EventMask::from_events(&[Event::CreateContainer])
    }

    fn adjust(&self, pod: &PodSandbox, container: &Container) -> ContainerAdjustment {
        let pod_ref = format!("{}/{}", pod.namespace, pod.name);
        let outcome = self.builder.build(container.env.as_slice());

        match &outcome.result {
            Ok(affinity) => {
                self.metrics.inc_adjustment("applied");
                self.logger.log_affinity_applied(
                    &pod_ref,
                    &container.name,
                    &affinity.cpu_list,
                    affinity.reversed,
                );
            }
            Err(reason @ SkipReason::NoHint) => {
                self.metrics.inc_adjustment(reason.outcome());
                self.logger.log_hint_missing(
                    &pod_ref,
                    &container.name,
                    self.builder.variables().mask(),
                );
            }
            Err(reason @ SkipReason::Rejected { hex_mask, error }) => {
                self.metrics.inc_adjustment(reason.outcome());
                self.metrics.inc_hint_error(error.kind());
                self.logger.log_hint_rejected(
                    &pod_ref,
                    &container.name,
                    hex_mask,
                    error.kind(),
                    &error.to_string(),
                );
            }
        }

        outcome.adjustment
    }
}

#[async_trait]
impl Plugin for Driver {
    async fn configure(&self, request: &ConfigureRequest) -> Result<EventMask> {
        self.logger
            .log_configure(&request.runtime_name, &request.runtime_version);
        Ok(Self::subscriptions())
    }

    async fn create_container(
        &self,
        pod: &PodSandbox,
        container: &Container,
    ) -> Result<(ContainerAdjustment, Vec<ContainerUpdate>)> {
        let started = Instant::now();
        let adjustment = self.adjust(pod, container);
        self.metrics
            .observe_create_container_latency(started.elapsed().as_secs_f64());

        Ok((adjustment, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> Driver {
        Driver::new(
            AdjustmentBuilder::default(),
            PluginMetrics::new(),
            StructuredLogger::new("fluxbind-test"),
        )
    }

    fn container(env: &[&str]) -> Container {
        Container {
            id: "c1".to_string(),
            name: "worker".to_string(),
            env: env.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn pod() -> PodSandbox {
        PodSandbox {
            name: "job-0".to_string(),
            namespace: "default".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_configure_subscribes_to_create_container() {
        let mask = driver()
            .configure(&ConfigureRequest {
                runtime_name: "containerd".to_string(),
                runtime_version: "2.0.0".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(mask.contains(Event::CreateContainer));
        assert!(!mask.contains(Event::StartContainer));
    }

    #[tokio::test]
    async fn test_create_container_applies_cpuset() {
        let metrics = PluginMetrics::new();
        let before = metrics.adjustments("applied");

        let (adjustment, updates) = driver()
            .create_container(&pod(), &container(&["FLUXBIND_CPUSET=0x30"]))
            .await
            .unwrap();

        let cpus = adjustment.linux.unwrap().resources.unwrap().cpu.unwrap().cpus;
        assert_eq!(cpus, "4-5");
        assert!(updates.is_empty());
        assert!(metrics.adjustments("applied") > before);
    }

    #[tokio::test]
    async fn test_create_container_fails_open() {
        let metrics = PluginMetrics::new();
        let before = metrics.adjustments("rejected");

        let (adjustment, updates) = driver()
            .create_container(&pod(), &container(&["FLUXBIND_CPUSET=garbage"]))
            .await
            .unwrap();

        assert_eq!(adjustment, ContainerAdjustment::default());
        assert!(updates.is_empty());
        assert!(metrics.adjustments("rejected") > before);
    }

    #[tokio::test]
    async fn test_lifecycle_defaults_are_noops() {
        let driver = driver();
        let pod = pod();
        let ctr = container(&[]);

        driver.run_pod_sandbox(&pod).await.unwrap();
        driver.start_container(&pod, &ctr).await.unwrap();
        driver.remove_container(&pod, &ctr).await.unwrap();
        assert!(driver.stop_container(&pod, &ctr).await.unwrap().is_empty());
        assert!(driver
            .synchronize(&[pod.clone()], &[ctr.clone()])
            .await
            .unwrap()
            .is_empty());
        driver.shutdown().await;
    }
}
