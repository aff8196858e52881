//! Kernel gateway process management
//!
//! This module provides:
//! - Port allocation for new gateways (`port`)
//! - Spawning and health-waiting (`lifecycle`)
//! - The per-sandbox process handle and its state machine (`handle`)
//! - The application-wide pid registry used to reap orphans (`registry`)
//! - `LocalKernel`, the backend that wires these to the channel client (`local`)

pub mod handle;
pub mod lifecycle;
pub mod local;
pub mod port;
pub mod registry;

pub use handle::{KernelProcess, ProcessState};
pub use lifecycle::{api_url, spawn_gateway, wait_for_gateway, ws_url};
pub use local::LocalKernel;
pub use port::{HttpPortProbe, PortAllocator, PortProbe};
pub use registry::PidRegistry;
