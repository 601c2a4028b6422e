//! Configuration management for parfor
//!
//! Settings for the shared thread pool, for individual loops and for progress
//! reporting. Values are layered with figment (see [`core`]) and extracted
//! into the structs below.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use system_profile::SystemProfile;

use crate::parallel::CadenceSettings;

pub mod core;

#[cfg(test)]
mod tests;

/// Main configuration structure for parfor
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ParForConfig {
    /// Shared thread pool sizing
    pub pool: PoolConfig,

    /// Per-loop defaults
    pub run: RunConfig,

    /// Progress reporting cadence
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Fixed thread count (0 = derive from CPUs)
    pub threads: usize,

    /// Share of logical CPUs used when deriving the thread count
    pub thread_percentage: u8,

    /// Extra threads kept for nested loops
    pub spare_threads: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            thread_percentage: 100,
            spare_threads: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Iterations between interruption checks
    pub check_interval: usize,

    /// Default workers per loop as a multiple of the CPU count
    pub oversubscription: f64,

    /// Cap on the default worker count (0 = none)
    pub max_workers: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            check_interval: 8,
            oversubscription: 1.5,
            max_workers: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProgressConfig {
    pub fast_update_ms: u64,
    pub slow_update_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            fast_update_ms: 500,
            slow_update_ms: 3000,
        }
    }
}

impl ParForConfig {
    /// Threads in the shared pool on this machine
    pub fn pool_capacity(&self) -> usize {
        SystemProfile::get().pool_capacity(
            self.pool.threads,
            self.pool.thread_percentage as usize,
            self.pool.spare_threads,
        )
    }

    /// Workers a loop uses when the caller does not ask for a count
    pub fn default_workers(&self) -> usize {
        SystemProfile::get().loop_workers(self.run.oversubscription, self.run.max_workers)
    }

    pub fn cadence(&self) -> CadenceSettings {
        CadenceSettings {
            fast: Duration::from_millis(self.progress.fast_update_ms),
            slow: Duration::from_millis(self.progress.slow_update_ms),
        }
    }
}
