//! Kernel wire protocol (Jupyter messaging over the gateway WebSocket)
//!
//! Outbound we only ever send `execute_request` on the shell channel.
//! Inbound frames are decoded into the closed [`KernelMessage`] enum so the
//! classifier can match on them exhaustively.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An `execute_request` frame
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteRequest {
    pub header: RequestHeader,
    pub parent_header: Map<String, Value>,
    pub metadata: Map<String, Value>,
    pub content: ExecuteContent,
    pub channel: &'static str,
    pub buffers: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestHeader {
    pub msg_id: String,
    pub msg_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteContent {
    pub code: String,
    pub silent: bool,
    pub store_history: bool,
    pub user_expressions: Map<String, Value>,
    pub allow_stdin: bool,
    pub stop_on_error: bool,
}

impl ExecuteRequest {
    /// Build a request for `code` with a fresh request id
    pub fn new(code: impl Into<String>) -> Self {
        Self::with_msg_id(code, new_msg_id())
    }

    pub fn with_msg_id(code: impl Into<String>, msg_id: impl Into<String>) -> Self {
        Self {
            header: RequestHeader {
                msg_id: msg_id.into(),
                msg_type: "execute_request",
            },
            parent_header: Map::new(),
            metadata: Map::new(),
            content: ExecuteContent {
                code: code.into(),
                silent: false,
                store_history: true,
                user_expressions: Map::new(),
                allow_stdin: false,
                stop_on_error: true,
            },
            channel: "shell",
            buffers: Vec::new(),
        }
    }

    pub fn msg_id(&self) -> &str {
        &self.header.msg_id
    }
}

/// Unique request id (32 hex chars, time-ordered)
pub fn new_msg_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

/// Raw inbound frame; only the fields we read
#[derive(Debug, Deserialize)]
struct RawFrame {
    header: RawHeader,
    #[serde(default)]
    parent_header: Option<RawParent>,
    #[serde(default)]
    content: Value,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    msg_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawParent {
    #[serde(default)]
    msg_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct DataContent {
    #[serde(default)]
    data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct StatusContent {
    execution_state: ExecutionState,
}

#[derive(Debug, Deserialize)]
struct ErrorContent {
    #[serde(default)]
    ename: String,
    #[serde(default)]
    evalue: String,
}

/// Kernel execution state carried by `status` messages
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Busy,
    Idle,
    Starting,
    #[serde(other)]
    Other,
}

/// Payload of `execute_result` / `display_data`, keyed by MIME type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MimeBundle(pub Map<String, Value>);

impl MimeBundle {
    pub fn get(&self, mime: &str) -> Option<&str> {
        self.0.get(mime).and_then(Value::as_str)
    }

    pub fn png(&self) -> Option<&str> {
        self.get("image/png")
    }

    pub fn text(&self) -> Option<&str> {
        self.get("text/plain")
    }
}

/// Decoded inbound message kind
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    /// stdout/stderr text
    Stream { text: String },
    /// Value of the last expression
    ExecuteResult(MimeBundle),
    /// Rich output (plots, HTML, ...)
    DisplayData(MimeBundle),
    Status(ExecutionState),
    /// Exception raised by the submitted code
    Error { ename: String, evalue: String },
    /// Any other message type (execute_input, execute_reply, ...)
    Other(String),
}

/// One decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct KernelMessage {
    /// `parent_header.msg_id`; absent for the kernel's own broadcasts
    pub parent_msg_id: Option<String>,
    pub kind: MessageKind,
}

impl KernelMessage {
    pub fn new(parent_msg_id: Option<&str>, kind: MessageKind) -> Self {
        Self {
            parent_msg_id: parent_msg_id.map(str::to_string),
            kind,
        }
    }

    /// Decode one JSON text frame
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        let raw: RawFrame = serde_json::from_str(frame)?;
        let parent_msg_id = raw
            .parent_header
            .and_then(|p| p.msg_id)
            .filter(|id| !id.is_empty());

        let kind = match raw.header.msg_type.as_str() {
            "stream" => {
                let c: StreamContent = serde_json::from_value(raw.content)?;
                MessageKind::Stream { text: c.text }
            }
            "execute_result" => {
                let c: DataContent = serde_json::from_value(raw.content)?;
                MessageKind::ExecuteResult(MimeBundle(c.data))
            }
            "display_data" => {
                let c: DataContent = serde_json::from_value(raw.content)?;
                MessageKind::DisplayData(MimeBundle(c.data))
            }
            "status" => {
                let c: StatusContent = serde_json::from_value(raw.content)?;
                MessageKind::Status(c.execution_state)
            }
            "error" => {
                let c: ErrorContent = serde_json::from_value(raw.content)?;
                MessageKind::Error {
                    ename: c.ename,
                    evalue: c.evalue,
                }
            }
            other => MessageKind::Other(other.to_string()),
        };

        Ok(Self {
            parent_msg_id,
            kind,
        })
    }

    /// Whether this message answers the request `msg_id`
    pub fn is_reply_to(&self, msg_id: &str) -> bool {
        self.parent_msg_id.as_deref() == Some(msg_id)
    }
}
