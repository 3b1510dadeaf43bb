//! fluxctl - debugging CLI for fluxbind cpuset hints
//!
//! Decodes masks and shows the container adjustment the NRI plugin would
//! return for a given environment, without a runtime in the loop.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{adjust, decode};
use fluxbind_lib::affinity::DEFAULT_ENV_PREFIX;

/// fluxbind cpuset hint CLI
#[derive(Parser)]
#[command(name = "fluxctl")]
#[command(author, version, about = "Debugging CLI for fluxbind cpuset hints", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a hex CPU mask into CPU indices and a cpu list
    Decode {
        /// Mask with a lowercase 0x prefix, e.g. 0xf0
        mask: String,

        /// Process CPUs in descending order
        #[arg(long)]
        reverse: bool,
    },

    /// Show the adjustment the plugin would return for a container environment
    Adjust {
        /// Container environment entry (NAME=VALUE), repeatable
        #[arg(long = "env", short = 'e', value_parser = adjust::parse_env_entry)]
        env: Vec<String>,

        /// Prefix of the hint variables
        #[arg(long, env = "FLUXBIND_NRI_ENV_PREFIX", default_value = DEFAULT_ENV_PREFIX)]
        prefix: String,

        /// Start from this process's environment
        #[arg(long)]
        inherit: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { mask, reverse } => {
            decode::decode(&mask, reverse, cli.format)?;
        }
        Commands::Adjust {
            env,
            prefix,
            inherit,
        } => {
            adjust::adjust(env, &prefix, inherit, cli.format)?;
        }
    }

    Ok(())
}
