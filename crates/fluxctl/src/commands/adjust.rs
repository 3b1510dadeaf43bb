//! Show the adjustment the plugin would return for a container environment

use anyhow::Result;
use colored::Colorize;
use fluxbind_lib::affinity::{AdjustmentBuilder, SkipReason};
use fluxbind_lib::proto::ContainerAdjustment;
use serde::Serialize;

use crate::output::{color_outcome, print_json, print_success, print_warning, OutputFormat};

#[derive(Debug, Serialize)]
pub struct AdjustReport {
    pub outcome: &'static str,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hex_mask: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_list: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reversed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub adjustment: ContainerAdjustment,
}

/// Validate a `NAME=VALUE` argument.
pub fn parse_env_entry(entry: &str) -> std::result::Result<String, String> {
    match entry.split_once('=') {
        Some((name, _)) if !name.is_empty() => Ok(entry.to_string()),
        _ => Err(format!("expected NAME=VALUE, got {entry:?}")),
    }
}

pub fn report(builder: &AdjustmentBuilder, env: &[String]) -> AdjustReport {
    let outcome = builder.build(env);

    match outcome.result {
        Ok(affinity) => AdjustReport {
            outcome: "applied",
            applied: true,
            hex_mask: Some(affinity.hex_mask),
            cpu_list: Some(affinity.cpu_list),
            reversed: Some(affinity.reversed),
            error: None,
            adjustment: outcome.adjustment,
        },
        Err(reason) => {
            let label = reason.outcome();
            let (hex_mask, error) = match reason {
                SkipReason::NoHint => (None, None),
                SkipReason::Rejected { hex_mask, error } => (Some(hex_mask), Some(error.to_string())),
            };
            AdjustReport {
                outcome: label,
                applied: false,
                hex_mask,
                cpu_list: None,
                reversed: None,
                error,
                adjustment: outcome.adjustment,
            }
        }
    }
}

/// Evaluate `env` (optionally on top of this process's environment)
pub fn adjust(env: Vec<String>, prefix: &str, inherit: bool, format: OutputFormat) -> Result<()> {
    let builder = AdjustmentBuilder::with_prefix(prefix);

    let mut entries: Vec<String> = if inherit {
        std::env::vars().map(|(k, v)| format!("{k}={v}")).collect()
    } else {
        Vec::new()
    };
    entries.extend(env);

    let report = report(&builder, &entries);

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{}", "Container Adjustment".bold());
            println!("{}", "=".repeat(40));
            println!("Outcome:  {}", color_outcome(report.outcome));
            if let Some(mask) = &report.hex_mask {
                println!("Mask:     {}", mask.cyan());
            }
            println!();

            match (&report.cpu_list, &report.error) {
                (Some(cpus), _) => {
                    print_success(&format!("linux.resources.cpu.cpus = {}", cpus.green()));
                }
                (None, Some(error)) => {
                    print_warning(&format!("Hint rejected: {error}"));
                    print_warning("The container would start without a cpuset");
                }
                (None, None) => {
                    print_warning(&format!(
                        "No {} variable; the container would start without a cpuset",
                        builder.variables().mask()
                    ));
                }
            }
        }
    }

    Ok(())
}
