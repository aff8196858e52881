use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, info_span, warn, Instrument};

use super::backend::KernelBackend;
use super::dependency::{install_failure, is_valid_package_name, missing_module, retry_hint};
use super::session::SandboxSession;
use crate::channel::{ExecuteRequest, KernelChannel};
use crate::classifier::ResultClassifier;
use crate::config::SandboxConfig;
use crate::error::{ChannelError, Result, SandboxError};
use crate::kernel::{LocalKernel, PidRegistry};
use crate::metrics::{EXECUTIONS, EXECUTION_DURATION, KERNEL_RESTARTS, PACKAGES_INSTALLED};
use crate::outcome::ExecutionOutcome;
use crate::workspace::Workspace;

/// A code-execution sandbox backed by one kernel
///
/// At most one `run` is in flight at a time; every operation takes
/// `&mut self`. Interpreter state persists between runs until the kernel is
/// restarted, either by [`stop`](Self::stop) + [`start`](Self::start) or by
/// the automatic restart after a closed channel.
pub struct Sandbox<B: KernelBackend = LocalKernel> {
    backend: B,
    retry_budget: u32,
    session: Option<SandboxSession>,
    channel: Option<B::Channel>,
}

impl Sandbox<LocalKernel> {
    /// Create a sandbox running a local kernel gateway
    ///
    /// The sandbox gets its own pid registry; use
    /// [`with_registry`](Self::with_registry) to share one across sandboxes.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        Self::with_registry(config, PidRegistry::shared())
    }

    /// Create a sandbox whose kernel pids are recorded in `registry`
    ///
    /// # Arguments
    /// * `config` - Sandbox configuration, validated here
    /// * `registry` - Registry the application tears down on exit
    pub fn with_registry(config: SandboxConfig, registry: Arc<PidRegistry>) -> Result<Self> {
        config.validate()?;
        let backend = LocalKernel::new(&config, registry)?;
        Ok(Self::with_backend(backend, config.retry_budget))
    }

    /// The shared workspace directory of this sandbox
    pub fn workspace(&self) -> &Workspace {
        self.backend.workspace()
    }
}

impl<B: KernelBackend> Sandbox<B> {
    /// Create a sandbox over any kernel backend
    pub fn with_backend(backend: B, retry_budget: u32) -> Self {
        Self {
            backend,
            retry_budget: retry_budget.max(1),
            session: None,
            channel: None,
        }
    }

    pub fn session(&self) -> Option<&SandboxSession> {
        self.session.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Launch the kernel and open its channel
    ///
    /// Fails fast: any error during launch or connect is returned as is and
    /// the partially started kernel is torn down.
    pub async fn start(&mut self) -> Result<SandboxSession> {
        if let Some(session) = &self.session {
            return Err(SandboxError::AlreadyStarted {
                session_id: session.session_id.clone(),
            });
        }

        let span = info_span!("sandbox_start", otel.name = "sandbox_start");
        async {
            let port = self.backend.launch().await?;
            let channel = match self.backend.connect(port).await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(port, error = %e, "failed to connect to kernel; tearing it down");
                    if let Err(stop_err) = self.backend.terminate().await {
                        warn!(port, error = %stop_err, "failed to terminate kernel");
                    }
                    return Err(e);
                }
            };

            let session = SandboxSession::new(port, channel.kernel_id());
            info!(
                session_id = %session.session_id,
                port,
                kernel_id = %session.kernel_id,
                "sandbox started"
            );
            self.channel = Some(channel);
            self.session = Some(session.clone());
            Ok(session)
        }
        .instrument(span)
        .await
    }

    /// Run `code` and return its outcome
    ///
    /// A `ModuleNotFoundError` outcome installs the missing module and
    /// returns a hint asking the caller to run the code again; the code itself
    /// is not resubmitted. Module names pip cannot take (`_private`) and
    /// failed installs come back as `Error` outcomes.
    pub async fn run(&mut self, code: &str) -> Result<ExecutionOutcome> {
        let outcome = self.execute(code).await?;

        let module = match &outcome {
            ExecutionOutcome::Error { message } => missing_module(message)
                .filter(|m| is_valid_package_name(m))
                .map(str::to_string),
            _ => None,
        };
        let Some(module) = module else {
            return Ok(outcome);
        };

        info!(module = %module, "module missing; installing");
        match self.install(&module).await? {
            ExecutionOutcome::Error { message } => {
                warn!(module = %module, error = %message, "install reported an error");
                Ok(ExecutionOutcome::error(install_failure(&module, &message)))
            }
            _ => Ok(ExecutionOutcome::text(retry_hint(&module))),
        }
    }

    /// Read a UTF-8 source file and [`run`](Self::run) it
    pub async fn run_file(&mut self, path: impl AsRef<Path>) -> Result<ExecutionOutcome> {
        let path = path.as_ref();
        let code = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SandboxError::io(path, e))?;
        self.run(&code).await
    }

    /// Install a package into the kernel's environment with pip
    pub async fn install(&mut self, package: &str) -> Result<ExecutionOutcome> {
        if !is_valid_package_name(package) {
            return Err(SandboxError::InvalidPackageName(package.to_string()));
        }

        let outcome = self.execute(&format!("!pip install -q {}", package)).await?;
        if outcome.is_error() {
            return Ok(outcome);
        }
        PACKAGES_INSTALLED.inc();
        info!(package, "package installed");
        Ok(ExecutionOutcome::text(format!("{} installed successfully", package)))
    }

    /// Close the channel and terminate the kernel
    ///
    /// Safe to call on a sandbox that never started or was already stopped.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!(error = %e, "channel close failed");
            }
        }
        self.backend.terminate().await?;
        if let Some(session) = self.session.take() {
            info!(session_id = %session.session_id, "sandbox stopped");
        }
        Ok(())
    }

    /// Submit `code`, restarting the kernel on a closed channel
    async fn execute(&mut self, code: &str) -> Result<ExecutionOutcome> {
        if code.trim().is_empty() {
            return Err(SandboxError::EmptyCode);
        }
        let session_id = match &self.session {
            Some(session) => session.session_id.clone(),
            None => return Err(SandboxError::NotStarted),
        };

        let span = info_span!(
            "sandbox_run",
            session_id = %session_id,
            code_len = code.len(),
            otel.name = "sandbox_run"
        );
        async {
            let start_time = Instant::now();
            let mut attempt: u32 = 0;

            loop {
                attempt += 1;

                if self.channel.is_none() {
                    self.reconnect().await?;
                }

                match self.submit(code).await {
                    Ok(outcome) => {
                        EXECUTIONS.with_label_values(&[outcome.kind()]).inc();
                        EXECUTION_DURATION.observe(start_time.elapsed().as_secs_f64());
                        debug!(attempt, kind = outcome.kind(), "run finished");
                        return Ok(outcome);
                    }
                    Err(ChannelError::Closed) => {
                        self.channel = None;
                        warn!(
                            attempt,
                            budget = self.retry_budget,
                            "kernel channel closed during run"
                        );
                        if attempt >= self.retry_budget {
                            EXECUTIONS.with_label_values(&["failed"]).inc();
                            return Err(SandboxError::RetriesExhausted { attempts: attempt });
                        }
                        self.restart().await?;
                    }
                    Err(e) => {
                        EXECUTIONS.with_label_values(&["failed"]).inc();
                        return Err(e.into());
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Send one request and classify replies until a terminal message
    async fn submit(&mut self, code: &str) -> Result<ExecutionOutcome, ChannelError> {
        let channel = self.channel.as_mut().ok_or(ChannelError::Closed)?;

        let request = ExecuteRequest::new(code);
        let mut classifier = ResultClassifier::new(request.msg_id());
        channel.send(&request).await?;
        debug!(msg_id = request.msg_id(), "execute_request sent");

        loop {
            match channel.receive().await {
                Ok(message) => {
                    if let Some(outcome) = classifier.observe(message) {
                        return Ok(outcome);
                    }
                }
                Err(ChannelError::Decode(e)) => {
                    warn!(msg_id = classifier.msg_id(), error = %e, "skipping undecodable frame");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reopen the channel to the running kernel
    async fn reconnect(&mut self) -> Result<()> {
        let port = self
            .session
            .as_ref()
            .map(|s| s.port)
            .ok_or(SandboxError::NotStarted)?;
        let channel = self.backend.connect(port).await?;
        info!(port, kernel_id = channel.kernel_id(), "kernel channel reopened");
        self.set_channel(port, channel);
        Ok(())
    }

    /// Terminate and relaunch the kernel; interpreter state is lost
    async fn restart(&mut self) -> Result<()> {
        KERNEL_RESTARTS.inc();
        self.backend.terminate().await?;
        let port = self.backend.launch().await?;
        let channel = self.backend.connect(port).await?;
        info!(port, kernel_id = channel.kernel_id(), "kernel restarted");
        self.set_channel(port, channel);
        Ok(())
    }

    fn set_channel(&mut self, port: u16, channel: B::Channel) {
        if let Some(session) = self.session.as_mut() {
            session.port = port;
            session.kernel_id = channel.kernel_id().to_string();
        }
        self.channel = Some(channel);
    }
}
