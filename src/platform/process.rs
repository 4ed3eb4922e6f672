use crate::platform::ProcessQuery;
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, System};

const BYTES_PER_MB: f64 = 1_048_576.0;

/// [`ProcessQuery`] backed by the system process table.
pub struct SystemProcessQuery {
    system: Mutex<System>,
}

impl SystemProcessQuery {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProcessQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessQuery for SystemProcessQuery {
    fn is_process_running(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        let mut system = self.system.lock();
        system.refresh_process_specifics(Pid::from_u32(pid), ProcessRefreshKind::new())
    }
}

/// Memory and CPU usage of this process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub memory_mb: f64,
    pub cpu_percent: f64,
}

/// Samples resource usage of the current process.
///
/// CPU usage is computed between two refreshes, so the first sample after
/// construction reports 0%.
pub struct SystemResources {
    system: System,
    pid: Option<Pid>,
}

impl SystemResources {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Cannot resolve own process id, resource sampling disabled: {}", e);
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    pub fn sample(&mut self) -> Option<ResourceSample> {
        let pid = self.pid?;
        let refresh = ProcessRefreshKind::new().with_cpu().with_memory();
        if !self.system.refresh_process_specifics(pid, refresh) {
            return None;
        }

        let process = self.system.process(pid)?;
        Some(ResourceSample {
            memory_mb: process.memory() as f64 / BYTES_PER_MB,
            cpu_percent: f64::from(process.cpu_usage()),
        })
    }
}

impl Default for SystemResources {
    fn default() -> Self {
        Self::new()
    }
}
