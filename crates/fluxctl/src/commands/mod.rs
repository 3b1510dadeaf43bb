//! fluxctl subcommands

pub mod adjust;
pub mod decode;
