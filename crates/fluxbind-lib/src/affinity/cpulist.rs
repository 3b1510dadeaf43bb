//! Ordering and cgroup CPU list rendering.

use super::error::{AffinityError, Result};
use super::mask::CpuIndexSet;

/// Reverse `cpus` when `reverse` is set, leave it untouched otherwise.
pub fn apply_order(cpus: &mut CpuIndexSet, reverse: bool) {
    if reverse {
        cpus.reverse();
    }
}

/// Render CPU indices in cgroup list syntax, e.g. `0-3,7`.
///
/// The input is treated as a set: output is always ascending and every run
/// of two or more consecutive indices collapses to `low-high`.
pub fn format_cpu_list(cpus: &[u32]) -> Result<String> {
    if cpus.is_empty() {
        return Err(AffinityError::EmptyCpuSet);
    }

    let mut sorted = cpus.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut tokens = Vec::new();
    let mut start = sorted[0];
    let mut end = start;

    for &cpu in &sorted[1..] {
        if cpu == end + 1 {
            end = cpu;
            continue;
        }
        tokens.push(render_run(start, end));
        start = cpu;
        end = cpu;
    }
    tokens.push(render_run(start, end));

    Ok(tokens.join(","))
}

fn render_run(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}
