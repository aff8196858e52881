//! Local kernel backend
//!
//! Runs `jupyter kernelgateway` as a child process on this host:
//! port allocation → spawn → health wait on launch, kernel registration and
//! WebSocket on connect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use super::handle::KernelProcess;
use super::port::PortAllocator;
use super::registry::PidRegistry;
use crate::channel::GatewayChannel;
use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::metrics::{KERNEL_STARTS, KERNEL_START_DURATION};
use crate::sandbox::KernelBackend;
use crate::workspace::Workspace;

/// Kernel gateway running as a local subprocess
pub struct LocalKernel {
    allocator: PortAllocator,
    process: KernelProcess,
    workspace: Workspace,
    http: reqwest::Client,
    preferred_port: u16,
    health_timeout: Duration,
    health_interval: Duration,
    receive_timeout: Option<Duration>,
}

impl LocalKernel {
    /// Create the backend; opens (and creates) the workspace directory
    ///
    /// # Arguments
    /// * `config` - Sandbox configuration
    /// * `registry` - Pid registry shared by every sandbox of the application
    pub fn new(config: &SandboxConfig, registry: Arc<PidRegistry>) -> Result<Self> {
        let workspace = Workspace::open(&config.workspace_dir)?;
        let http = reqwest::Client::builder()
            .timeout(config.health_timeout)
            .build()?;

        Ok(Self {
            allocator: PortAllocator::http(config.probe_timeout),
            process: KernelProcess::new(
                config.python.clone(),
                workspace.root().to_path_buf(),
                registry,
                config.terminate_grace,
            ),
            workspace,
            http,
            preferred_port: config.preferred_port,
            health_timeout: config.health_timeout,
            health_interval: config.health_interval,
            receive_timeout: config.receive_timeout,
        })
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn process(&self) -> &KernelProcess {
        &self.process
    }
}

#[async_trait]
impl KernelBackend for LocalKernel {
    type Channel = GatewayChannel;

    async fn launch(&mut self) -> Result<u16> {
        let start_time = Instant::now();
        let port = self.allocator.allocate(self.preferred_port).await?;

        info!(port, "starting kernel...");
        self.process.spawn(port)?;

        if let Err(e) = self
            .process
            .await_healthy(&self.http, port, self.health_timeout, self.health_interval)
            .await
        {
            warn!(port, error = %e, "kernel gateway failed to become healthy");
            if let Err(stop_err) = self.process.terminate().await {
                warn!(port, error = %stop_err, "failed to clean up unhealthy gateway");
            }
            return Err(e);
        }

        let boot = start_time.elapsed();
        KERNEL_STARTS.inc();
        KERNEL_START_DURATION.observe(boot.as_secs_f64());
        info!(
            port,
            pid = self.process.pid(),
            boot_ms = boot.as_millis() as u64,
            "kernel gateway ready"
        );
        Ok(port)
    }

    async fn connect(&mut self, port: u16) -> Result<GatewayChannel> {
        if !self.process.is_live() {
            return Err(SandboxError::NotStarted);
        }
        GatewayChannel::connect(&self.http, port, self.receive_timeout).await
    }

    async fn terminate(&mut self) -> Result<()> {
        self.process.terminate().await
    }
}
