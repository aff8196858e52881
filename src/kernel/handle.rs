//! Kernel process handle
//!
//! Tracks one kernel gateway process through its lifecycle:
//! Unstarted -> Starting -> Running -> Stopping -> Stopped
//! with `Starting -> Failed` when the executable cannot be found.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tracing::{info, warn};

use super::lifecycle::{spawn_gateway, wait_for_gateway};
use super::registry::{terminate_pid, PidRegistry};
use crate::error::{Result, SandboxError};

/// Status of the kernel gateway process
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessState {
    /// No process has been spawned yet
    Unstarted,
    /// Spawned, liveness endpoint not yet answering
    Starting,
    /// Gateway answered its liveness endpoint
    Running,
    /// Termination in progress
    Stopping,
    /// Process exited and was reaped
    Stopped,
    /// Launch failed
    Failed(String),
}

/// Owns the gateway child process of one sandbox
pub struct KernelProcess {
    python: PathBuf,
    workspace: PathBuf,
    child: Option<Child>,
    pid: Option<u32>,
    state: ProcessState,
    registry: Arc<PidRegistry>,
    terminate_grace: Duration,
}

impl KernelProcess {
    /// Create a handle; nothing is spawned until [`spawn`](Self::spawn)
    ///
    /// # Arguments
    /// * `python` - Interpreter used to run the gateway module
    /// * `workspace` - Working directory of the kernel
    /// * `registry` - Application-wide pid registry
    /// * `terminate_grace` - Wait after SIGTERM before SIGKILL
    pub fn new(
        python: PathBuf,
        workspace: PathBuf,
        registry: Arc<PidRegistry>,
        terminate_grace: Duration,
    ) -> Self {
        Self {
            python,
            workspace,
            child: None,
            pid: None,
            state: ProcessState::Unstarted,
            registry,
            terminate_grace,
        }
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether a gateway process is (believed to be) alive
    pub fn is_live(&self) -> bool {
        matches!(self.state, ProcessState::Starting | ProcessState::Running)
    }

    /// Launch the gateway bound to `port` and record its pid
    pub fn spawn(&mut self, port: u16) -> Result<()> {
        self.state = ProcessState::Starting;
        match spawn_gateway(&self.python, &self.workspace, port) {
            Ok(child) => {
                self.pid = child.id();
                if let Some(pid) = self.pid {
                    self.registry.record(pid);
                }
                self.child = Some(child);
                Ok(())
            }
            Err(e) => {
                self.state = ProcessState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Block until the gateway on `port` answers its liveness endpoint
    pub async fn await_healthy(
        &mut self,
        client: &reqwest::Client,
        port: u16,
        timeout: Duration,
        interval: Duration,
    ) -> Result<()> {
        let child = self.child.as_mut().ok_or(SandboxError::NotStarted)?;
        match wait_for_gateway(client, child, port, timeout, interval).await {
            Ok(()) => {
                self.state = ProcessState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = ProcessState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Stop the gateway
    ///
    /// Sends SIGTERM and waits for exit, escalating to SIGKILL after the
    /// grace period. If the child handle is gone while a process may still be
    /// alive, every pid in the registry is signalled instead. Calling this on
    /// a stopped or never-started process does nothing.
    pub async fn terminate(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            if self.is_live() {
                let signalled = self.registry.teardown();
                warn!(signalled, "kernel handle lost, signalled recorded pids");
                self.state = ProcessState::Stopped;
            }
            return Ok(());
        };

        self.state = ProcessState::Stopping;
        if let Some(pid) = child.id() {
            terminate_pid(pid);
        }

        match tokio::time::timeout(self.terminate_grace, child.wait()).await {
            Ok(Ok(status)) => info!(pid = self.pid, %status, "kernel gateway exited"),
            Ok(Err(e)) => warn!(pid = self.pid, error = %e, "failed waiting for kernel gateway"),
            Err(_) => {
                warn!(pid = self.pid, "kernel gateway ignored SIGTERM, killing");
                if let Err(e) = child.kill().await {
                    warn!(pid = self.pid, error = %e, "failed to kill kernel gateway");
                }
            }
        }

        if let Some(pid) = self.pid.take() {
            self.registry.forget(pid);
        }
        self.state = ProcessState::Stopped;
        Ok(())
    }
}

impl std::fmt::Debug for KernelProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelProcess")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("workspace", &self.workspace)
            .finish()
    }
}
