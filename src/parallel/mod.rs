//! Generic parallel-for execution engine
//!
//! This module fans one bounded index range out across a shared, fixed-size
//! thread pool, collects the results, reports progress and stops cleanly on
//! cancellation or on the first failure. Plugins that compute per pixel, per
//! slice or per cell depend on this one abstraction instead of managing
//! threads themselves.
//!
//! # Architecture Responsibilities
//!
//! ## What This Module Does:
//! - **Thread Pool**: Owns a process-wide pool sized from the CPU count
//! - **Work Distribution**: Hands out indices through an atomic cursor, so
//!   workers load-balance when per-index cost varies
//! - **Result Collection**: Gathers non-empty results without locks
//! - **Progress**: Forwards monotonic, debounced progress to an optional reporter
//! - **Cancellation**: Turns an interrupt or a body error into one clean stop
//!
//! ## What This Module Does NOT Do:
//! - **Domain Logic**: The loop body is supplied by the caller
//! - **Ordering**: Results are unordered; callers key and sort them if needed
//! - **Scheduling**: One invocation handles exactly one integer range
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │   Caller        │    │   ParFor         │    │   ThreadPool    │
//! │   (plugin)      │───▶│   controller     │───▶│   (shared)      │
//! │                 │    │                  │    │                 │
//! │ • Loop body     │    │ • Work cursor    │    │ • Fixed threads │
//! │ • Progress sink │    │ • Abort signal   │    │ • FIFO queue    │
//! │ • Cancel token  │    │ • Aggregator     │    │ • Panic capture │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use parfor::parallel::{ParFor, RunOutcome};
//!
//! let outcome = ParFor::new(0, 999)
//!     .name("even-doubles")
//!     .workers(8)
//!     .run(|index, _worker_id| Ok((index % 2 == 0).then_some(2 * index)));
//!
//! match outcome {
//!     RunOutcome::Success(results) => assert_eq!(results.len(), 500),
//!     other => panic!("unexpected outcome: {other:?}"),
//! }
//! ```
//!
//! Per-worker scratch space is indexed by the worker id:
//!
//! ```rust
//! use parfor::parallel::ParFor;
//! use std::sync::{Arc, Mutex};
//!
//! let parfor = ParFor::new(0, 63).workers(4);
//! let scratch: Arc<Vec<Mutex<Vec<u8>>>> =
//!     Arc::new((0..parfor.worker_count()).map(|_| Mutex::new(Vec::new())).collect());
//!
//! let sums = parfor
//!     .run(move |index, worker_id| {
//!         let mut buffer = scratch[worker_id].lock().unwrap();
//!         buffer.clear();
//!         buffer.extend((0..8).map(|k| (index as u8).wrapping_add(k)));
//!         Ok(Some(buffer.iter().map(|&b| b as u64).sum::<u64>()))
//!     })
//!     .into_result()
//!     .unwrap();
//! assert_eq!(sums.len(), 64);
//! ```

pub mod aggregator;
pub mod cancel;
pub mod controller;
pub mod cursor;
pub mod pool;
pub mod progress;
pub mod worker;

// Re-export main types for easier access
pub use aggregator::ResultAggregator;
pub use cancel::{CancellationToken, Cancelled, is_cancellation};
pub use controller::{ParFor, RunHandle, RunOutcome, run};
pub use cursor::WorkCursor;
pub use pool::{TaskHandle, ThreadPool};
pub use progress::{
    AtomicProgress, BarProgress, CadenceSettings, ProgressReporter, ProgressSubrange, set_indeterminate,
    set_value_if_larger,
};
pub use worker::{LoopBody, WorkerExit};
