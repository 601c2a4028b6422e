//! System Profile Crate
//!
//! Detects the CPU and memory resources of the host once and caches them for
//! the lifetime of the process. The parallel-for engine sizes its shared
//! thread pool and its default worker counts from this profile.
//!
//! Uses std::sync::LazyLock (Rust 1.80+) for lazy initialization.

use std::sync::{Arc, LazyLock};

/// Global system profile instance - computed once, cached forever
pub static SYSTEM: LazyLock<Arc<SystemProfile>> = LazyLock::new(|| Arc::new(SystemProfile::detect()));

/// Hardware resources relevant to thread-pool sizing
#[derive(Debug, Clone)]
pub struct SystemProfile {
    /// Logical CPUs (including hyperthreading)
    pub cpu_count: usize,

    /// Physical CPU cores
    pub physical_cpu_count: usize,

    /// Total system memory in bytes
    pub total_memory: u64,

    /// Available system memory in bytes at startup
    pub available_memory: u64,

    /// Operating system name
    pub os_name: String,
}

impl SystemProfile {
    /// Detect system profile (called once via LazyLock)
    fn detect() -> Self {
        use sysinfo::System;

        let cpu_count = num_cpus::get().max(1);
        let physical_cpu_count = num_cpus::get_physical().max(1);

        let mut sys = System::new_with_specifics(
            sysinfo::RefreshKind::new().with_memory(sysinfo::MemoryRefreshKind::everything()),
        );
        sys.refresh_memory();

        Self {
            cpu_count,
            physical_cpu_count,
            total_memory: sys.total_memory(),
            available_memory: sys.available_memory(),
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
        }
    }

    /// Build a profile for a fixed CPU count (tests and benchmarks)
    pub fn with_cpus(cpu_count: usize) -> Self {
        let cpu_count = cpu_count.max(1);
        Self {
            cpu_count,
            physical_cpu_count: cpu_count,
            total_memory: 0,
            available_memory: 0,
            os_name: "Synthetic".to_string(),
        }
    }

    /// Get the global system profile instance
    pub fn get() -> Arc<SystemProfile> {
        SYSTEM.clone()
    }

    /// Threads covering `percentage` of the logical CPUs, never fewer than one
    pub fn calculate_workers(&self, percentage: usize) -> usize {
        let percentage = percentage.min(100) as f32 / 100.0;
        ((self.cpu_count as f32 * percentage).ceil() as usize).max(1)
    }

    /// Capacity of a long-lived pool: a share of the CPUs plus spare threads
    /// kept free for nested loops, or an explicit thread count when non-zero
    pub fn pool_capacity(&self, threads: usize, percentage: usize, spare_threads: usize) -> usize {
        if threads > 0 {
            threads
        } else {
            self.calculate_workers(percentage) + spare_threads
        }
    }

    /// Default worker count for one parallel loop: CPUs scaled by
    /// `oversubscription`, capped by `max_workers` when non-zero
    pub fn loop_workers(&self, oversubscription: f64, max_workers: usize) -> usize {
        let scaled = ((self.cpu_count as f64 * oversubscription).ceil() as usize).max(1);
        if max_workers > 0 { scaled.min(max_workers) } else { scaled }
    }

    /// Get a human-readable summary of system resources
    pub fn summary(&self) -> String {
        format!(
            "System: {}\n\
             CPUs: {} ({} physical)\n\
             Memory: {:.2} GB ({:.2} GB available)",
            self.os_name,
            self.cpu_count,
            self.physical_cpu_count,
            self.total_memory_gb(),
            self.available_memory_gb(),
        )
    }

    pub fn total_memory_gb(&self) -> f64 {
        self.total_memory as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    pub fn available_memory_gb(&self) -> f64 {
        self.available_memory as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    /// Get CPU count directly
    pub fn cpu_count() -> usize {
        SYSTEM.cpu_count
    }
}
