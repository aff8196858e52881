//! Registry of kernel gateway pids spawned by this application
//!
//! If a sandbox loses its process handle (for example after a crash during
//! a restart) the pids recorded here are the only way to reach its kernels.
//! One registry is shared by every sandbox of the application through an
//! `Arc` and torn down explicitly on exit.

use std::sync::{Arc, Mutex, MutexGuard};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct PidRegistry {
    pids: Mutex<Vec<u32>>,
}

impl PidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry wrapped for sharing between sandboxes
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn record(&self, pid: u32) {
        let mut pids = self.lock();
        if !pids.contains(&pid) {
            pids.push(pid);
        }
    }

    /// Drop a pid whose process has been reaped
    pub fn forget(&self, pid: u32) {
        self.lock().retain(|p| *p != pid);
    }

    pub fn pids(&self) -> Vec<u32> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Send SIGTERM to every recorded pid and clear the registry
    ///
    /// Pids that no longer exist are skipped silently. Returns how many
    /// processes were signalled.
    pub fn teardown(&self) -> usize {
        let pids: Vec<u32> = std::mem::take(&mut *self.lock());
        let mut signalled = 0;
        for pid in pids {
            if terminate_pid(pid) {
                signalled += 1;
            }
        }
        signalled
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u32>> {
        // A poisoned list of integers is still a valid list
        self.pids.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// SIGTERM a pid; true if the signal was delivered
pub(crate) fn terminate_pid(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => {
            debug!(pid, "sent SIGTERM");
            true
        }
        Err(Errno::ESRCH) => false,
        Err(e) => {
            warn!(pid, error = %e, "failed to signal kernel process");
            false
        }
    }
}
