use serde::Serialize;
use uuid::Uuid;

/// Identity of a started sandbox
///
/// `session_id` is fixed for the sandbox's lifetime; `port` and `kernel_id`
/// change when the kernel is restarted behind the caller's back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxSession {
    pub session_id: String,
    pub port: u16,
    pub kernel_id: String,
}

impl SandboxSession {
    pub(crate) fn new(port: u16, kernel_id: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::now_v7().to_string(),
            port,
            kernel_id: kernel_id.into(),
        }
    }
}
