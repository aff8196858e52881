//! Code sandbox facade
//!
//! [`Sandbox`] owns one kernel process and its channel and turns a source
//! string into exactly one [`ExecutionOutcome`](crate::outcome::ExecutionOutcome).
//! Closed channels are healed by restarting the kernel (bounded by the retry
//! budget) and `ModuleNotFoundError`s trigger a `pip install` of the module.

pub mod backend;
pub mod dependency;
pub mod facade;
pub mod session;

pub use backend::KernelBackend;
pub use dependency::{install_failure, is_valid_package_name, missing_module, retry_hint};
pub use facade::Sandbox;
pub use session::SandboxSession;
