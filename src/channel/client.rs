//! Channel client for a kernel gateway
//!
//! Connecting is a two step handshake:
//! 1. `POST /api/kernels` registers a kernel and returns its id
//! 2. `ws://.../api/kernels/{id}/channels` opens the duplex message channel
//!
//! After that, [`KernelChannel::send`] writes one `execute_request` frame and
//! [`KernelChannel::receive`] yields decoded frames one at a time.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::protocol::{ExecuteRequest, KernelMessage};
use crate::error::{ChannelError, SandboxError};
use crate::kernel::{api_url, ws_url};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A duplex message channel to one kernel
///
/// Exactly one reader at a time; the `&mut self` receivers enforce it.
#[async_trait]
pub trait KernelChannel: Send {
    /// Id the gateway assigned to the kernel behind this channel
    fn kernel_id(&self) -> &str;

    async fn send(&mut self, request: &ExecuteRequest) -> Result<(), ChannelError>;

    /// Next inbound message; `ChannelError::Closed` once the peer is gone
    async fn receive(&mut self) -> Result<KernelMessage, ChannelError>;

    /// Close the channel; closing an already closed channel is not an error
    async fn close(&mut self) -> Result<(), ChannelError>;
}

/// Register a new kernel with the gateway on `port` and return its id
pub async fn register_kernel(client: &reqwest::Client, port: u16) -> Result<String, SandboxError> {
    let response = client
        .post(format!("{}/kernels", api_url(port)))
        .json(&serde_json::json!({}))
        .send()
        .await?
        .error_for_status()?;

    let body: Value = response.json().await?;
    body.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SandboxError::KernelRegistration(format!("no kernel id in {}", body)))
}

/// WebSocket channel to a kernel behind `jupyter kernelgateway`
pub struct GatewayChannel {
    kernel_id: String,
    socket: WsStream,
    receive_timeout: Option<Duration>,
}

impl GatewayChannel {
    /// Register a kernel on `port` and open its channel
    ///
    /// # Arguments
    /// * `client` - HTTP client for the registration request
    /// * `port` - Port of a healthy gateway
    /// * `receive_timeout` - Bound on each `receive`; `None` waits forever
    pub async fn connect(
        client: &reqwest::Client,
        port: u16,
        receive_timeout: Option<Duration>,
    ) -> Result<Self, SandboxError> {
        let kernel_id = register_kernel(client, port).await?;
        let url = format!("{}/kernels/{}/channels", ws_url(port), kernel_id);
        let channel = Self::open(&url, kernel_id, receive_timeout).await?;
        info!(port, kernel_id = %channel.kernel_id, "kernel channel open");
        Ok(channel)
    }

    /// Open a channel on an explicit WebSocket URL
    pub async fn open(
        url: &str,
        kernel_id: impl Into<String>,
        receive_timeout: Option<Duration>,
    ) -> Result<Self, ChannelError> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| ChannelError::Connect {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            kernel_id: kernel_id.into(),
            socket,
            receive_timeout,
        })
    }

    /// Next text payload, answering pings on the way
    async fn next_frame(&mut self) -> Result<String, ChannelError> {
        loop {
            let Some(message) = self.socket.next().await else {
                return Err(ChannelError::Closed);
            };

            match message {
                Ok(Message::Text(payload)) => return Ok(payload),
                Ok(Message::Binary(payload)) => {
                    return Ok(String::from_utf8_lossy(&payload).into_owned())
                }
                Ok(Message::Ping(payload)) => {
                    self.socket
                        .send(Message::Pong(payload))
                        .await
                        .map_err(map_ws_error)?;
                }
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    debug!(kernel_id = %self.kernel_id, ?frame, "kernel closed channel");
                    return Err(ChannelError::Closed);
                }
                Err(e) => return Err(map_ws_error(e)),
            }
        }
    }
}

#[async_trait]
impl KernelChannel for GatewayChannel {
    fn kernel_id(&self) -> &str {
        &self.kernel_id
    }

    async fn send(&mut self, request: &ExecuteRequest) -> Result<(), ChannelError> {
        let payload = serde_json::to_string(request)?;
        self.socket
            .send(Message::Text(payload))
            .await
            .map_err(map_ws_error)
    }

    async fn receive(&mut self) -> Result<KernelMessage, ChannelError> {
        let frame = match self.receive_timeout {
            Some(limit) => tokio::time::timeout(limit, self.next_frame())
                .await
                .map_err(|_| ChannelError::Timeout(limit))??,
            None => self.next_frame().await?,
        };
        Ok(KernelMessage::decode(&frame)?)
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        match self.socket.close(None).await {
            Ok(()) => Ok(()),
            Err(e) => match map_ws_error(e) {
                ChannelError::Closed => Ok(()),
                other => Err(other),
            },
        }
    }
}

/// Collapse the ways a socket can die into `ChannelError::Closed`
fn map_ws_error(error: WsError) -> ChannelError {
    match error {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Io(_)
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
        | WsError::Protocol(ProtocolError::SendAfterClosing) => ChannelError::Closed,
        other => ChannelError::Transport(other.to_string()),
    }
}
