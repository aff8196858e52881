//! The seam between the sandbox facade and a concrete kernel

use async_trait::async_trait;

use crate::channel::KernelChannel;
use crate::error::Result;

/// Something that can launch a kernel, connect to it and tear it down
///
/// [`LocalKernel`](crate::kernel::LocalKernel) is the production
/// implementation; tests drive the facade with scripted backends.
#[async_trait]
pub trait KernelBackend: Send {
    type Channel: KernelChannel;

    /// Start a kernel process and wait until it is healthy; returns its port
    async fn launch(&mut self) -> Result<u16>;

    /// Register a kernel on the gateway at `port` and open its channel
    async fn connect(&mut self, port: u16) -> Result<Self::Channel>;

    /// Stop the kernel process; a no-op when nothing is running
    async fn terminate(&mut self) -> Result<()>;
}
