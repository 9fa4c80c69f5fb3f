//! Process memory and CPU sampling

use std::sync::{Mutex, PoisonError};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

use crate::types::ResourceSample;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Source of process resource readings, shared by every send adapter
pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> ResourceSample;
}

/// Samples the current process through sysinfo.
///
/// Refreshes only our own PID on every call. The first CPU reading is 0 since
/// sysinfo needs two refreshes to compute a load.
pub struct SystemSampler {
    inner: Mutex<Option<(System, Pid)>>,
    cores: f64,
}

impl SystemSampler {
    pub fn new() -> Self {
        let inner = sysinfo::get_current_pid().ok().map(|pid| {
            let mut system = System::new_with_specifics(
                RefreshKind::nothing().with_processes(ProcessRefreshKind::everything()),
            );
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            (system, pid)
        });

        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1) as f64;

        Self {
            inner: Mutex::new(inner),
            cores,
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SystemSampler {
    fn sample(&self) -> ResourceSample {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some((system, pid)) = guard.as_mut() else {
            return ResourceSample::default();
        };

        system.refresh_processes(ProcessesToUpdate::Some(&[*pid]), true);
        match system.process(*pid) {
            Some(process) => ResourceSample {
                memory_mb: process.memory() as f64 / BYTES_PER_MB,
                cpu_percent: normalize_cpu(process.cpu_usage() as f64, self.cores),
            },
            None => ResourceSample::default(),
        }
    }
}

/// sysinfo reports load per core (up to `cores * 100`); scale to 0..=100
fn normalize_cpu(raw: f64, cores: f64) -> f64 {
    if !raw.is_finite() || cores <= 0.0 {
        return 0.0;
    }
    (raw / cores).clamp(0.0, 100.0)
}

/// Fixed readings, for tests and dry runs
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSampler(pub ResourceSample);

impl ResourceSampler for FixedSampler {
    fn sample(&self) -> ResourceSample {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_current_process() {
        let sampler = SystemSampler::new();
        let first = sampler.sample();
        let second = sampler.sample();

        assert!(first.memory_mb > 0.0);
        assert!(second.memory_mb > 0.0);
        assert!((0.0..=100.0).contains(&second.cpu_percent));
    }

    #[test]
    fn test_normalize_cpu() {
        assert_eq!(normalize_cpu(400.0, 4.0), 100.0);
        assert_eq!(normalize_cpu(50.0, 2.0), 25.0);
        assert_eq!(normalize_cpu(f64::NAN, 2.0), 0.0);
        assert_eq!(normalize_cpu(-1.0, 2.0), 0.0);
        assert_eq!(normalize_cpu(900.0, 4.0), 100.0);
    }
}
