//! Error types for the sandbox client
//!
//! Two layers:
//! - [`ChannelError`] - failures on the WebSocket channel to a kernel
//! - [`SandboxError`] - everything a caller of the facade can see
//!
//! Exceptions raised by user code are *not* errors here; they come back as
//! `ExecutionOutcome::Error` inside an `Ok`.

use std::path::PathBuf;
use std::time::Duration;

/// Failures on the duplex channel to a running kernel
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Could not open the WebSocket
    #[error("failed to open kernel channel {url}: {message}")]
    Connect { url: String, message: String },

    /// The peer closed the connection (kernel crashed or was restarted)
    #[error("kernel channel closed")]
    Closed,

    /// No message arrived within the receive timeout
    #[error("no message from kernel within {0:?}")]
    Timeout(Duration),

    /// WebSocket failure other than a closed connection
    #[error("kernel channel transport error: {0}")]
    Transport(String),

    /// An inbound frame was not valid JSON or lacked a header
    #[error("failed to decode kernel frame: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ChannelError {
    /// Whether this error means the connection is gone and a restart may help
    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelError::Closed)
    }
}

/// Error type for sandbox operations
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The interpreter executable could not be found. Fatal, never retried.
    #[error(
        "kernel executable `{program}` not found; install it with \
         `pip install jupyter_kernel_gateway`"
    )]
    ExecutableNotFound { program: String },

    /// Spawning the gateway failed for another OS reason
    #[error("failed to spawn kernel gateway: {0}")]
    Spawn(std::io::Error),

    /// The gateway process exited before it became healthy
    #[error("kernel gateway exited during startup ({status})")]
    KernelExited { status: String },

    /// The liveness endpoint never answered 200
    #[error("kernel gateway on port {port} not healthy after {timeout:?}")]
    HealthTimeout { port: u16, timeout: Duration },

    /// Every port from the preferred one upward is already serving
    #[error("no free port at or above {preferred}")]
    PortsExhausted { preferred: u16 },

    /// `POST /api/kernels` did not yield a kernel id
    #[error("could not start kernel: {0}")]
    KernelRegistration(String),

    #[error("http request to kernel gateway failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The channel kept closing and the retry budget ran out
    #[error("could not connect to kernel after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("sandbox not running; call start() first")]
    NotStarted,

    #[error("sandbox already started (session {session_id})")]
    AlreadyStarted { session_id: String },

    #[error("no code to run")]
    EmptyCode,

    /// Package names are spliced into a `pip install` line and must be plain
    #[error("invalid package name {0:?}")]
    InvalidPackageName(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Blob names must be plain file names inside the workspace
    #[error("invalid blob name {0:?}")]
    InvalidBlobName(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SandboxError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SandboxError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = SandboxError> = std::result::Result<T, E>;
