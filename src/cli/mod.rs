//! Command-line interface for parfor
//!
//! A thin driver around the parallel-for engine: run a synthetic loop, show
//! the merged configuration, or report the machine profile.

pub mod commands;
pub mod output;

pub use commands::Cli;
pub use output::Output;
