//! Process diagnostics logged periodically by the tick loop.

use std::thread;
use tracing::info;

/// Point-in-time process statistics.
#[derive(Debug, Clone, Default)]
pub struct ProcessStats {
    /// Resident set size in KiB, when the platform exposes it.
    pub resident_kib: Option<u64>,
    /// Peak resident set size in KiB.
    pub peak_resident_kib: Option<u64>,
    /// Logical CPUs available to the process.
    pub cpu_cores: usize,
    /// Tokio worker threads, when sampled from inside a runtime.
    pub runtime_workers: Option<usize>,
    /// Tasks currently alive on the runtime.
    pub alive_tasks: Option<usize>,
}

impl ProcessStats {
    /// Sample the current process.
    pub fn sample() -> Self {
        let (resident_kib, peak_resident_kib) = read_memory();
        let (runtime_workers, alive_tasks) = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let metrics = handle.metrics();
                (Some(metrics.num_workers()), Some(metrics.num_alive_tasks()))
            }
            Err(_) => (None, None),
        };

        Self {
            resident_kib,
            peak_resident_kib,
            cpu_cores: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            runtime_workers,
            alive_tasks,
        }
    }

    pub fn log(&self, tick: u64) {
        info!(
            "Stats @ tick {}: RSS = {} MiB, peak RSS = {} MiB, CPU cores = {}, workers = {}, tasks = {}",
            tick,
            fmt_mib(self.resident_kib),
            fmt_mib(self.peak_resident_kib),
            self.cpu_cores,
            fmt_opt(self.runtime_workers),
            fmt_opt(self.alive_tasks),
        );
    }
}

fn fmt_mib(kib: Option<u64>) -> String {
    kib.map(|k| (k / 1024).to_string()).unwrap_or_else(|| "n/a".to_string())
}

fn fmt_opt(value: Option<usize>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

#[cfg(target_os = "linux")]
fn read_memory() -> (Option<u64>, Option<u64>) {
    match std::fs::read_to_string("/proc/self/status") {
        Ok(status) => (
            parse_status_kib(&status, "VmRSS:"),
            parse_status_kib(&status, "VmHWM:"),
        ),
        Err(_) => (None, None),
    }
}

#[cfg(not(target_os = "linux"))]
fn read_memory() -> (Option<u64>, Option<u64>) {
    (None, None)
}

/// Parse a `Key:   1234 kB` line from `/proc/self/status`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_status_kib(status: &str, key: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_kib() {
        let status = "Name:\tworldcast\nVmHWM:\t   20480 kB\nVmRSS:\t   10240 kB\n";
        assert_eq!(parse_status_kib(status, "VmRSS:"), Some(10240));
        assert_eq!(parse_status_kib(status, "VmHWM:"), Some(20480));
        assert_eq!(parse_status_kib(status, "VmSwap:"), None);
    }

    #[test]
    fn test_sample_outside_runtime() {
        let stats = ProcessStats::sample();
        assert!(stats.cpu_cores >= 1);
        assert!(stats.runtime_workers.is_none());
    }

    #[test]
    fn test_fmt_mib() {
        assert_eq!(fmt_mib(Some(2048)), "2");
        assert_eq!(fmt_mib(None), "n/a");
    }
}
