//! Core library for the fluxbind NRI plugin
//!
//! This crate provides:
//! - Decoding of hex CPU-bitmask hints into cgroup cpu lists
//! - The container adjustment returned to the runtime
//! - NRI message types and the runtime transport
//! - Health checks, metrics and the HTTP endpoint serving them

pub mod affinity;
pub mod api;
pub mod health;
pub mod observability;
pub mod plugin;
pub mod proto;
pub mod stub;

pub use affinity::{AdjustmentBuilder, AdjustmentOutcome, Affinity, AffinityError, SkipReason};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use observability::{PluginMetrics, StructuredLogger};
pub use plugin::{Driver, Plugin};
