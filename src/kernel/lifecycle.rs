//! Kernel gateway lifecycle
//!
//! Functions for spawning `jupyter kernelgateway` and waiting for its
//! liveness endpoint.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::{Result, SandboxError};

/// Base URL of the gateway REST API on a local port
pub fn api_url(port: u16) -> String {
    format!("http://localhost:{}/api", port)
}

/// Base URL of the gateway WebSocket API on a local port
pub fn ws_url(port: u16) -> String {
    format!("ws://localhost:{}/api", port)
}

/// Spawn a kernel gateway bound to `port`
///
/// The process runs with `workspace` as its working directory so that files
/// written with relative paths by user code land in the blob store.
///
/// # Arguments
/// * `python` - Interpreter with `jupyter-kernel-gateway` installed
/// * `workspace` - Working directory for the kernel
/// * `port` - Port the gateway binds on all interfaces
///
/// # Errors
/// `ExecutableNotFound` if `python` cannot be executed at all.
pub fn spawn_gateway(python: &Path, workspace: &Path, port: u16) -> Result<Child> {
    let mut child = Command::new(python)
        .arg("-m")
        .arg("jupyter")
        .arg("kernelgateway")
        .arg("--KernelGatewayApp.ip=0.0.0.0")
        .arg(format!("--KernelGatewayApp.port={}", port))
        .current_dir(workspace)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SandboxError::ExecutableNotFound {
                program: python.display().to_string(),
            },
            _ => SandboxError::Spawn(e),
        })?;

    // The gateway logs to stderr; drain it so the pipe never fills up
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "codebox::gateway", port, "{}", line);
            }
        });
    }

    info!(port, pid = child.id(), "kernel gateway spawned");
    Ok(child)
}

/// Poll the gateway's liveness endpoint until it answers 200
///
/// Fails early with `KernelExited` if the child dies while we wait, which is
/// what happens when python exists but the gateway package does not.
///
/// # Arguments
/// * `client` - HTTP client used for the polls
/// * `child` - The gateway process being waited on
/// * `port` - Port the gateway was told to bind
/// * `timeout` - Total time to wait
/// * `interval` - Delay between polls
pub async fn wait_for_gateway(
    client: &reqwest::Client,
    child: &mut Child,
    port: u16,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let start_time = Instant::now();
    let url = api_url(port);

    loop {
        if let Some(status) = child.try_wait().map_err(SandboxError::Spawn)? {
            return Err(SandboxError::KernelExited {
                status: status.to_string(),
            });
        }

        match client.get(&url).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => return Ok(()),
            Ok(response) => debug!(port, status = %response.status(), "gateway not ready"),
            Err(_) => debug!(port, "waiting for kernel to start..."),
        }

        if start_time.elapsed() > timeout {
            return Err(SandboxError::HealthTimeout { port, timeout });
        }

        tokio::time::sleep(interval).await;
    }
}
