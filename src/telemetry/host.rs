//! Host and process resource queries
//!
//! Thin synchronous wrapper over `sysinfo`. Each query refreshes only what
//! it reads. Calls may block briefly, so async callers go through
//! `spawn_blocking`.

use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use sysinfo::{Disks, Networks, Pid, System, MINIMUM_CPU_UPDATE_INTERVAL};

use super::instruments;
use super::registry::{MetricsRegistry, ResourceQueryError, RATE_SENTINEL};

pub struct HostResources {
    system: Mutex<System>,
    disks: Mutex<Disks>,
    networks: Mutex<Networks>,
    cpu: Mutex<CpuReading>,
    pid: Option<Pid>,
}

/// Last global CPU usage and when it was taken
struct CpuReading {
    taken_at: Instant,
    percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CpuStats {
    pub usage_percent: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkStats {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

/// Full host picture served by `GET /metrics/system`
#[derive(Debug, Clone, Serialize)]
pub struct SystemOverview {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub network: NetworkStats,
}

impl Default for HostResources {
    fn default() -> Self {
        Self::new()
    }
}

impl HostResources {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = e, "Cannot resolve current pid, process I/O gauges disabled");
                None
            }
        };

        let cpu = CpuReading {
            taken_at: Instant::now(),
            percent: f64::from(system.global_cpu_info().cpu_usage()),
        };

        Self {
            system: Mutex::new(system),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            cpu: Mutex::new(cpu),
            pid,
        }
    }

    /// Global CPU usage
    ///
    /// sysinfo needs `MINIMUM_CPU_UPDATE_INTERVAL` between two refreshes to
    /// compute usage, so calls inside that interval return the last reading.
    pub fn cpu_percent(&self) -> Result<f64, ResourceQueryError> {
        let mut cached = lock(&self.cpu);
        if cached.taken_at.elapsed() < MINIMUM_CPU_UPDATE_INTERVAL {
            return Ok(cached.percent);
        }

        let mut system = lock(&self.system);
        system.refresh_cpu();
        if system.cpus().is_empty() {
            return Err(ResourceQueryError::Unavailable("cpu"));
        }
        cached.percent = f64::from(system.global_cpu_info().cpu_usage());
        cached.taken_at = Instant::now();
        Ok(cached.percent)
    }

    pub fn cpu_count(&self) -> usize {
        lock(&self.system).cpus().len()
    }

    pub fn memory(&self) -> Result<MemoryStats, ResourceQueryError> {
        let mut system = lock(&self.system);
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return Err(ResourceQueryError::Unavailable("memory"));
        }
        let used = system.used_memory();
        Ok(MemoryStats {
            total,
            available: system.available_memory(),
            used,
            percent: percent(used, total),
        })
    }

    pub fn memory_percent(&self) -> Result<f64, ResourceQueryError> {
        self.memory().map(|m| m.percent)
    }

    /// Usage of the disk mounted at `/`, or of all disks when there is none
    pub fn disk(&self) -> Result<DiskStats, ResourceQueryError> {
        let mut disks = lock(&self.disks);
        disks.refresh_list();

        let root = disks.list().iter().find(|d| d.mount_point() == Path::new("/"));
        let (total, free) = match root {
            Some(disk) => (disk.total_space(), disk.available_space()),
            None => disks.list().iter().fold((0, 0), |(t, f), d| {
                (t + d.total_space(), f + d.available_space())
            }),
        };

        if total == 0 {
            return Err(ResourceQueryError::Unavailable("disk"));
        }

        let used = total.saturating_sub(free);
        Ok(DiskStats {
            total,
            used,
            free,
            percent: percent(used, total),
        })
    }

    pub fn disk_percent(&self) -> Result<f64, ResourceQueryError> {
        self.disk().map(|d| d.percent)
    }

    /// Cumulative `(read, written)` bytes of this process
    pub fn process_disk_io(&self) -> Result<(u64, u64), ResourceQueryError> {
        let pid = self.pid.ok_or(ResourceQueryError::Unavailable("process"))?;
        let mut system = lock(&self.system);
        if !system.refresh_process(pid) {
            return Err(ResourceQueryError::Failed {
                resource: "process",
                reason: format!("pid {} not found", pid),
            });
        }
        let process = system
            .process(pid)
            .ok_or(ResourceQueryError::Unavailable("process"))?;
        let usage = process.disk_usage();
        Ok((usage.total_read_bytes, usage.total_written_bytes))
    }

    /// Cumulative traffic summed over every interface
    pub fn network(&self) -> Result<NetworkStats, ResourceQueryError> {
        let mut networks = lock(&self.networks);
        networks.refresh();
        if networks.iter().next().is_none() {
            return Err(ResourceQueryError::Unavailable("network"));
        }

        let mut stats = NetworkStats {
            bytes_sent: 0,
            bytes_recv: 0,
            packets_sent: 0,
            packets_recv: 0,
        };
        for (_name, data) in networks.iter() {
            stats.bytes_sent += data.total_transmitted();
            stats.bytes_recv += data.total_received();
            stats.packets_sent += data.total_packets_transmitted();
            stats.packets_recv += data.total_packets_received();
        }
        Ok(stats)
    }

    pub fn overview(&self) -> Result<SystemOverview, ResourceQueryError> {
        Ok(SystemOverview {
            cpu: CpuStats {
                usage_percent: self.cpu_percent()?,
                count: self.cpu_count(),
            },
            memory: self.memory()?,
            disk: self.disk()?,
            network: self.network()?,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn percent(part: u64, total: u64) -> f64 {
    part as f64 / total as f64 * 100.0
}

/// Register host resource gauges backed by `host`
pub fn register_host_gauges(registry: &MetricsRegistry, host: Arc<HostResources>) {
    let p = host.clone();
    registry.register_gauge(instruments::SYSTEM_CPU_USAGE, "%", RATE_SENTINEL, move || {
        p.cpu_percent()
    });

    let p = host.clone();
    registry.register_gauge(instruments::SYSTEM_MEMORY_USAGE, "%", RATE_SENTINEL, move || {
        p.memory_percent()
    });

    let p = host.clone();
    registry.register_gauge(instruments::SYSTEM_DISK_USAGE, "%", RATE_SENTINEL, move || {
        p.disk_percent()
    });

    let p = host.clone();
    registry.register_gauge(instruments::PROCESS_DISK_READ_BYTES, "By", RATE_SENTINEL, move || {
        p.process_disk_io().map(|(read, _)| read as f64)
    });

    let p = host.clone();
    registry.register_gauge(instruments::PROCESS_DISK_WRITTEN_BYTES, "By", RATE_SENTINEL, move || {
        p.process_disk_io().map(|(_, written)| written as f64)
    });

    let p = host.clone();
    registry.register_gauge(instruments::SYSTEM_NETWORK_SENT_BYTES, "By", RATE_SENTINEL, move || {
        p.network().map(|n| n.bytes_sent as f64)
    });

    registry.register_gauge(instruments::SYSTEM_NETWORK_RECEIVED_BYTES, "By", RATE_SENTINEL, move || {
        host.network().map(|n| n.bytes_recv as f64)
    });
}
