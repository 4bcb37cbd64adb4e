use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::worker::Worker;

// app's shared state, one per worker
pub struct AppState {
    pub worker: Worker,
    system: Mutex<System>, // for /stats memory readings
    pid: Option<Pid>,
}

impl AppState {
    pub fn new(worker: Worker) -> Self {
        Self {
            worker,
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    // Resident memory of the whole process in bytes
    pub fn resident_memory(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        system.process(pid).map(|p| p.memory())
    }
}
