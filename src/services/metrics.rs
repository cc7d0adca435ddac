//! Process-wide health counters and host resource sampling
//!
//! Feeds the periodic `system_health` snapshots: CPU, memory and disk usage
//! from `sysinfo`, plus request and error counters bumped by the API layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use sysinfo::{Disks, System};

/// Host resource usage, each as a percentage (0-100)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: Option<f64>,
}

/// Counters drained by each health snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub last_error: String,
}

pub struct MetricsCollector {
    sys: Mutex<System>,
    requests: AtomicU64,
    errors: AtomicU64,
    last_error: RwLock<String>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();

        Self {
            sys: Mutex::new(sys),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_error: RwLock::new(String::new()),
            start_time: Instant::now(),
        }
    }

    /// Count one API operation
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed operation and remember its message
    pub fn record_error(&self, message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write() = message.chars().take(500).collect();
    }

    /// Read and reset the counters
    pub fn take_counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            requests: self.requests.swap(0, Ordering::Relaxed),
            errors: self.errors.swap(0, Ordering::Relaxed),
            last_error: std::mem::take(&mut *self.last_error.write()),
        }
    }

    /// Sample CPU, memory and disk usage
    pub fn sample_resources(&self) -> ResourceUsage {
        let (cpu_percent, memory_percent) = {
            let mut sys = self.sys.lock();
            sys.refresh_cpu_all();
            sys.refresh_memory();

            let total = sys.total_memory();
            let memory_percent = if total > 0 {
                sys.used_memory() as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            (sys.global_cpu_usage() as f64, memory_percent)
        };

        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks.list().iter().fold((0u64, 0u64), |(t, a), disk| {
            (t + disk.total_space(), a + disk.available_space())
        });
        let disk_percent =
            (total > 0).then(|| (total - available.min(total)) as f64 / total as f64 * 100.0);

        ResourceUsage {
            cpu_percent,
            memory_percent,
            disk_percent,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics collector for use across the application
pub type SharedMetrics = Arc<MetricsCollector>;

pub fn create_metrics_collector() -> SharedMetrics {
    Arc::new(MetricsCollector::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_reset_when_taken() {
        let collector = MetricsCollector::new();
        collector.record_request();
        collector.record_request();
        collector.record_error("database is locked");

        let first = collector.take_counters();
        assert_eq!(first.requests, 2);
        assert_eq!(first.errors, 1);
        assert_eq!(first.last_error, "database is locked");

        let second = collector.take_counters();
        assert_eq!(second.requests, 0);
        assert_eq!(second.errors, 0);
        assert!(second.last_error.is_empty());
    }

    #[test]
    fn test_resource_sample_is_bounded() {
        let usage = MetricsCollector::new().sample_resources();
        assert!((0.0..=100.0).contains(&usage.memory_percent));
        if let Some(disk) = usage.disk_percent {
            assert!((0.0..=100.0).contains(&disk));
        }
    }
}
