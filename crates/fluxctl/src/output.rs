//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Coloured text and tables (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color an adjustment outcome label
pub fn color_outcome(outcome: &str) -> String {
    match outcome {
        "applied" => outcome.green().to_string(),
        "no_hint" => outcome.yellow().to_string(),
        "rejected" | "internal_fault" => outcome.red().to_string(),
        _ => outcome.to_string(),
    }
}

/// Render a mask with its set bits underneath, most significant first.
pub fn format_bits(cpus: &[u32]) -> String {
    let Some(&highest) = cpus.iter().max() else {
        return String::new();
    };

    (0..=highest)
        .rev()
        .map(|bit| if cpus.contains(&bit) { '1' } else { '0' })
        .collect()
}
