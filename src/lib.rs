//! # parfor - Parallel-for over a shared thread pool
//!
//! Runs a per-index loop body over an inclusive integer range on a fixed-size,
//! process-wide thread pool. Results are collected without ordering guarantees,
//! progress is forwarded to an optional reporter, and the loop stops cleanly on
//! cancellation or on the first failing index.
//!
//! ## Features
//!
//! - **Shared pool**: One pool sized from the CPU count, safe for nested loops
//! - **Dynamic load balancing**: Workers claim indices from an atomic cursor
//! - **First failure wins**: One error aborts the loop and is reported as the cause
//! - **Cooperative cancellation**: Interrupts are observed every K iterations
//!
//! ## Quick Start
//!
//! ```rust
//! use parfor::parallel::ParFor;
//!
//! let squares = ParFor::new(1, 10)
//!     .run(|index, _worker_id| Ok(Some(index * index)))
//!     .into_result()
//!     .unwrap();
//! assert_eq!(squares.iter().sum::<i64>(), 385);
//! ```

pub mod cli;
pub mod config;
pub mod parallel;

pub use cli::{Cli, Output};
pub use config::ParForConfig;

/// Result type alias for parfor operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
