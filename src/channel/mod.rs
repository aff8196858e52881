//! Duplex channel to a running kernel
//!
//! - `protocol` - `execute_request` frames out, decoded `KernelMessage`s in
//! - `client` - the `KernelChannel` trait and its WebSocket implementation

pub mod client;
pub mod protocol;

pub use client::{register_kernel, GatewayChannel, KernelChannel};
pub use protocol::{
    new_msg_id, ExecuteRequest, ExecutionState, KernelMessage, MessageKind, MimeBundle,
};
