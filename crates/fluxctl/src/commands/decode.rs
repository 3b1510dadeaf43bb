//! Decode a cpuset mask the way the plugin does

use anyhow::{Context, Result};
use colored::Colorize;
use fluxbind_lib::affinity::{resolve_hint, Affinity, AffinityHint};
use tabled::Tabled;

use crate::output::{format_bits, print_info, print_json, print_success, OutputFormat};

/// Row for the CPU table
#[derive(Tabled)]
struct CpuRow {
    #[tabled(rename = "Order")]
    order: usize,
    #[tabled(rename = "CPU")]
    cpu: u32,
}

pub fn resolve(mask: &str, reverse: bool) -> Result<Affinity> {
    resolve_hint(&AffinityHint {
        hex_mask: mask.to_string(),
        reverse,
    })
    .with_context(|| format!("Cannot decode mask {mask:?}"))
}

/// Print the CPU indices and cpu list for `mask`
pub fn decode(mask: &str, reverse: bool, format: OutputFormat) -> Result<()> {
    let affinity = resolve(mask, reverse)?;

    match format {
        OutputFormat::Json => print_json(&affinity)?,
        OutputFormat::Table => {
            println!("{}", "Cpuset Mask".bold());
            println!("{}", "=".repeat(40));
            println!("Mask:     {}", affinity.hex_mask.cyan());
            println!("Bits:     {}", format_bits(affinity.cpus.as_slice()));
            println!("Reversed: {}", affinity.reversed);
            println!();

            let rows: Vec<CpuRow> = affinity
                .cpus
                .iter()
                .enumerate()
                .map(|(order, &cpu)| CpuRow { order, cpu })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!();

            print_success(&format!("CPU list: {}", affinity.cpu_list.green()));
            if affinity.reversed {
                print_info("Reversal only changes processing order; the CPU list is always ascending");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_contiguous() {
        let affinity = resolve("0xf0", false).unwrap();
        assert_eq!(affinity.cpus.as_slice(), &[4, 5, 6, 7]);
        assert_eq!(affinity.cpu_list, "4-7");
    }

    #[test]
    fn test_resolve_reversed_keeps_list() {
        let affinity = resolve("0x5", true).unwrap();
        assert_eq!(affinity.cpus.as_slice(), &[2, 0]);
        assert_eq!(affinity.cpu_list, "0,2");
    }

    #[test]
    fn test_resolve_error_names_mask() {
        let err = resolve("ff", false).unwrap_err();
        assert!(format!("{err:#}").contains("\"ff\""));
    }
}
