//! CPU affinity from environment hints
//!
//! A container asks for pinning by carrying `FLUXBIND_CPUSET=0x<mask>` (and
//! optionally `FLUXBIND_CPUSET_REVERSED=yes`) in its environment. This module
//! turns that hint into the cgroup CPU list the runtime applies:
//!
//! extract → decode → reverse (optional) → format → embed
//!
//! Every stage is a pure function. Failures are collected as a typed
//! [`AffinityError`] and collapsed into "no adjustment" in exactly one place,
//! [`AdjustmentBuilder::build`]; a bad hint never blocks container creation.

mod cpulist;
mod env;
mod error;
mod mask;


pub use cpulist::{apply_order, format_cpu_list};
pub use env::{extract_hint, AffinityHint, HintVariables, DEFAULT_ENV_PREFIX};
pub use error::{AffinityError, Result};
pub use mask::{decode_mask, CpuIndexSet, MAX_CPUS};

use crate::proto::{ContainerAdjustment, LinuxContainerAdjustment, LinuxCpu, LinuxResources};
use serde::Serialize;

/// A successfully resolved CPU affinity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Affinity {
    /// The mask as found in the environment.
    pub hex_mask: String,
    /// CPU indices in processing order (descending when reversed).
    pub cpus: CpuIndexSet,
    pub reversed: bool,
    /// The cgroup CPU list handed to the runtime.
    pub cpu_list: String,
}

/// Why no adjustment was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The container carries no mask variable.
    NoHint,
    /// The mask was present but could not be turned into a CPU list.
    Rejected { hex_mask: String, error: AffinityError },
}

impl SkipReason {
    /// Label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            SkipReason::NoHint => "no_hint",
            SkipReason::Rejected { error, .. } if error.is_internal_fault() => "internal_fault",
            SkipReason::Rejected { .. } => "rejected",
        }
    }
}

/// Result of evaluating one container's environment.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentOutcome {
    pub adjustment: ContainerAdjustment,
    pub result: std::result::Result<Affinity, SkipReason>,
}

impl AdjustmentOutcome {
    /// True when a CPU list was embedded into the adjustment.
    pub fn applied(&self) -> bool {
        self.result.is_ok()
    }
}

/// Resolve a hint into an affinity, or the first stage error.
pub fn resolve_hint(hint: &AffinityHint) -> Result<Affinity> {
    let mut cpus = decode_mask(&hint.hex_mask)?;
    apply_order(&mut cpus, hint.reverse);
    let cpu_list = format_cpu_list(cpus.as_slice())?;

    Ok(Affinity {
        hex_mask: hint.hex_mask.clone(),
        cpus,
        reversed: hint.reverse,
        cpu_list,
    })
}

/// Place `cpu_list` at `linux.resources.cpu.cpus`, leaving everything else default.
pub fn cpuset_adjustment(cpu_list: impl Into<String>) -> ContainerAdjustment {
    ContainerAdjustment {
        linux: Some(LinuxContainerAdjustment {
            resources: Some(LinuxResources {
                cpu: Some(LinuxCpu {
                    cpus: cpu_list.into(),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Turns container environments into resource adjustments.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentBuilder {
    variables: HintVariables,
}

impl AdjustmentBuilder {
    pub fn new(variables: HintVariables) -> Self {
        Self { variables }
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self::new(HintVariables::from_prefix(prefix))
    }

    pub fn variables(&self) -> &HintVariables {
        &self.variables
    }

    /// Evaluate `env`, failing open: any problem yields an empty adjustment.
    pub fn build<S: AsRef<str>>(&self, env: &[S]) -> AdjustmentOutcome {
        let hint = self.variables.extract(env);
        if hint.is_empty() {
            return AdjustmentOutcome {
                adjustment: ContainerAdjustment::default(),
                result: Err(SkipReason::NoHint),
            };
        }

        match resolve_hint(&hint) {
            Ok(affinity) => AdjustmentOutcome {
                adjustment: cpuset_adjustment(affinity.cpu_list.clone()),
                result: Ok(affinity),
            },
            Err(error) => AdjustmentOutcome {
                adjustment: ContainerAdjustment::default(),
                result: Err(SkipReason::Rejected {
                    hex_mask: hint.hex_mask,
                    error,
                }),
            },
        }
    }
}
