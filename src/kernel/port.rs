//! Port allocation for kernel gateways
//!
//! A port counts as taken when anything accepts a connection on it: an HTTP
//! answer of any status (a kernel gateway returns 404 on `/`), or a listener
//! that speaks something else. Only a refused connection means free. The
//! allocator never binds the port itself; the gateway does that when it
//! starts.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, SandboxError};

/// Checks whether a local port already has a live responder
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn is_serving(&self, port: u16) -> bool;
}

/// Probe that sends `GET http://localhost:{port}` and treats any answer as serving
#[derive(Clone)]
pub struct HttpPortProbe {
    client: reqwest::Client,
}

impl HttpPortProbe {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

#[async_trait]
impl PortProbe for HttpPortProbe {
    async fn is_serving(&self, port: u16) -> bool {
        match self
            .client
            .get(format!("http://localhost:{}", port))
            .send()
            .await
        {
            Ok(response) => {
                debug!(port, status = %response.status(), "port answered");
                true
            }
            // Refused: nobody is listening. Anything else got past connect.
            Err(e) => !e.is_connect(),
        }
    }
}

/// Finds the first port at or above a preferred one with no live responder
pub struct PortAllocator<P = HttpPortProbe> {
    probe: P,
}

impl PortAllocator<HttpPortProbe> {
    /// Allocator using HTTP probes with the given per-probe timeout
    pub fn http(probe_timeout: Duration) -> Self {
        Self::new(HttpPortProbe::new(probe_timeout))
    }
}

impl<P: PortProbe> PortAllocator<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    /// Return `preferred` if it is free, otherwise the next free port above it
    ///
    /// # Errors
    /// `PortsExhausted` if every port up to 65535 is serving.
    pub async fn allocate(&self, preferred: u16) -> Result<u16> {
        let mut port = preferred;
        loop {
            if !self.probe.is_serving(port).await {
                debug!(port, "port is free");
                return Ok(port);
            }
            debug!(port, "port already serving, trying next");
            port = port
                .checked_add(1)
                .ok_or(SandboxError::PortsExhausted { preferred })?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct BusyPorts(HashSet<u16>);

    #[async_trait]
    impl PortProbe for BusyPorts {
        async fn is_serving(&self, port: u16) -> bool {
            self.0.contains(&port)
        }
    }

    #[tokio::test]
    async fn test_preferred_port_when_free() {
        let allocator = PortAllocator::new(BusyPorts(HashSet::new()));
        assert_eq!(allocator.allocate(8888).await.unwrap(), 8888);
    }

    #[tokio::test]
    async fn test_skips_serving_ports() {
        let allocator = PortAllocator::new(BusyPorts([8888, 8889, 8890].into_iter().collect()));
        assert_eq!(allocator.allocate(8888).await.unwrap(), 8891);
    }

    #[tokio::test]
    async fn test_single_busy_port() {
        let allocator = PortAllocator::new(BusyPorts([9001].into_iter().collect()));
        assert_eq!(allocator.allocate(9001).await.unwrap(), 9002);
    }

    #[tokio::test]
    async fn test_exhausts_at_top_of_range() {
        let allocator = PortAllocator::new(BusyPorts([65534, 65535].into_iter().collect()));
        let err = allocator.allocate(65534).await.unwrap_err();
        assert!(matches!(err, SandboxError::PortsExhausted { preferred: 65534 }));
    }
}
