//! codebox - local Python code sandbox on a Jupyter kernel gateway
//!
//! Runs Python snippets in a `jupyter kernelgateway` subprocess on this host
//! (no isolation beyond the process boundary) and turns the kernel's message
//! stream into one outcome per run: text, a PNG image, or an error.
//!
//! # Modules
//!
//! - `sandbox` - The facade: start, run, install, stop
//! - `kernel` - Gateway process lifecycle, port allocation, pid registry
//! - `channel` - Kernel registration and the WebSocket message channel
//! - `classifier` - Folds kernel messages into an `ExecutionOutcome`
//! - `workspace` - Shared working directory as a named-blob store
//! - `config` - `SandboxConfig` defaults and env overrides
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - Subscriber and OpenTelemetry setup
//!
//! # Quick Start
//!
//! ```ignore
//! use codebox::{Sandbox, SandboxConfig};
//!
//! let mut sandbox = Sandbox::new(SandboxConfig::from_env()?)?;
//! sandbox.start().await?;
//! let outcome = sandbox.run("1 + 1").await?;
//! assert_eq!(outcome.content(), "2");
//! sandbox.stop().await?;
//! ```

pub mod channel;
pub mod classifier;
pub mod config;
pub mod error;
pub mod kernel;
pub mod metrics;
pub mod outcome;
pub mod sandbox;
pub mod tracing;
pub mod workspace;

// Re-export commonly used types at crate root for convenience
pub use config::SandboxConfig;
pub use error::{ChannelError, Result, SandboxError};
pub use kernel::{LocalKernel, PidRegistry};
pub use outcome::{ExecutionOutcome, ImageEncoding};
pub use sandbox::{KernelBackend, Sandbox, SandboxSession};
pub use workspace::{NamedBlob, Workspace};
