//! Host resource sampling.
//!
//! # Formulas
//! - CPU: 1-minute load average ÷ logical CPU count × 100, rounded. Not capped
//!   at 100; an oversubscribed host reports more than 100.
//! - Memory: (total − free) ÷ total × 100, rounded. Never above 100. "Free"
//!   is memory available to new processes without swapping (`MemAvailable` on
//!   Linux), so reclaimable page cache does not count as used.

use std::sync::Mutex;
use sysinfo::System;
use thiserror::Error;

/// Errors that can occur while sampling the host.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("no logical CPUs reported")]
    NoCpus,

    #[error("total memory reported as zero")]
    NoMemoryInfo,

    #[error("invalid load average {0}")]
    InvalidLoad(f64),
}

/// Raw host figures read at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostReading {
    pub load_one: f64,
    pub logical_cpus: usize,
    pub total_memory: u64,
    /// Memory available for new allocations, reclaimable cache included.
    pub free_memory: u64,
}

impl HostReading {
    pub fn cpu_usage_percent(&self) -> Result<i64, SampleError> {
        cpu_usage_percent(self.load_one, self.logical_cpus)
    }

    pub fn memory_usage_percent(&self) -> Result<i64, SampleError> {
        memory_usage_percent(self.total_memory, self.free_memory)
    }
}

/// Source of host readings.
pub trait HostSampler: Send + Sync + 'static {
    fn sample(&self) -> Result<HostReading, SampleError>;
}

pub fn cpu_usage_percent(load_one: f64, logical_cpus: usize) -> Result<i64, SampleError> {
    if logical_cpus == 0 {
        return Err(SampleError::NoCpus);
    }
    if !load_one.is_finite() {
        return Err(SampleError::InvalidLoad(load_one));
    }
    let percent = (load_one / logical_cpus as f64 * 100.0).round();
    Ok(percent.max(0.0) as i64)
}

pub fn memory_usage_percent(total: u64, free: u64) -> Result<i64, SampleError> {
    if total == 0 {
        return Err(SampleError::NoMemoryInfo);
    }
    let used = total.saturating_sub(free);
    Ok((used as f64 / total as f64 * 100.0).round() as i64)
}

/// Samples the machine the service runs on via `sysinfo`.
pub struct SystemSampler {
    system: Mutex<System>,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler for SystemSampler {
    fn sample(&self) -> Result<HostReading, SampleError> {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_memory();
        if system.cpus().is_empty() {
            system.refresh_cpu();
        }

        let reading = HostReading {
            load_one: System::load_average().one,
            logical_cpus: system.cpus().len(),
            total_memory: system.total_memory(),
            free_memory: system.available_memory(),
        };

        if reading.logical_cpus == 0 {
            return Err(SampleError::NoCpus);
        }
        if reading.total_memory == 0 {
            return Err(SampleError::NoMemoryInfo);
        }
        Ok(reading)
    }
}
