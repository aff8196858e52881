//! Sandbox configuration
//!
//! [`SandboxConfig::default`] gives working values for a local
//! `jupyter kernelgateway`; [`SandboxConfig::from_env`] layers `CODEBOX_*`
//! environment variables on top.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SandboxError};

/// First port tried when starting a kernel gateway
pub const DEFAULT_PORT: u16 = 8888;

/// Number of submissions `run` makes before giving up on a closing channel
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Configuration for a [`Sandbox`](crate::Sandbox)
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Python interpreter that has `jupyter-kernel-gateway` installed
    pub python: PathBuf,
    /// Shared workspace directory; the kernel's working directory
    pub workspace_dir: PathBuf,
    /// Port probed first by the port allocator
    pub preferred_port: u16,
    /// Maximum submissions per `run` when the channel keeps closing
    pub retry_budget: u32,
    /// How long to wait for the gateway's liveness endpoint
    pub health_timeout: Duration,
    /// Delay between liveness polls
    pub health_interval: Duration,
    /// Upper bound on waiting for a single kernel message (None = wait forever)
    pub receive_timeout: Option<Duration>,
    /// Timeout for one port probe request
    pub probe_timeout: Duration,
    /// How long `terminate` waits after SIGTERM before sending SIGKILL
    pub terminate_grace: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self {
            python: PathBuf::from("python3"),
            workspace_dir: PathBuf::from(home).join(".codebox").join("workspace"),
            preferred_port: DEFAULT_PORT,
            retry_budget: DEFAULT_RETRY_BUDGET,
            health_timeout: Duration::from_secs(270),
            health_interval: Duration::from_secs(1),
            receive_timeout: Some(Duration::from_secs(300)),
            probe_timeout: Duration::from_secs(2),
            terminate_grace: Duration::from_secs(5),
        }
    }
}

impl SandboxConfig {
    /// Build a config from defaults plus `CODEBOX_*` environment variables
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `CODEBOX_PYTHON` | `python` |
    /// | `CODEBOX_WORKSPACE` | `workspace_dir` |
    /// | `CODEBOX_PORT` | `preferred_port` |
    /// | `CODEBOX_RETRIES` | `retry_budget` |
    /// | `CODEBOX_HEALTH_TIMEOUT_SECS` | `health_timeout` |
    /// | `CODEBOX_RECEIVE_TIMEOUT_SECS` | `receive_timeout` (0 disables) |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(python) = lookup("CODEBOX_PYTHON") {
            config.python = PathBuf::from(python);
        }
        if let Some(dir) = lookup("CODEBOX_WORKSPACE") {
            config.workspace_dir = PathBuf::from(dir);
        }
        if let Some(port) = parse_var::<u16>(&lookup, "CODEBOX_PORT")? {
            config.preferred_port = port;
        }
        if let Some(retries) = parse_var::<u32>(&lookup, "CODEBOX_RETRIES")? {
            config.retry_budget = retries;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CODEBOX_HEALTH_TIMEOUT_SECS")? {
            config.health_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CODEBOX_RECEIVE_TIMEOUT_SECS")? {
            config.receive_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the sandbox cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.retry_budget == 0 {
            return Err(SandboxError::Config(
                "retry budget must allow at least one submission".into(),
            ));
        }
        if self.preferred_port == 0 {
            return Err(SandboxError::Config("preferred port must be non-zero".into()));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| SandboxError::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.preferred_port, 8888);
        assert_eq!(config.retry_budget, 3);
        assert_eq!(config.health_interval, Duration::from_secs(1));
        assert!(config.receive_timeout.is_some());
        assert!(config.workspace_dir.ends_with(".codebox/workspace"));
    }

    #[test]
    fn test_env_overrides() {
        let config = SandboxConfig::from_lookup(lookup_from(&[
            ("CODEBOX_PYTHON", "/opt/py/bin/python"),
            ("CODEBOX_WORKSPACE", "/tmp/ws"),
            ("CODEBOX_PORT", "9000"),
            ("CODEBOX_RETRIES", "5"),
            ("CODEBOX_RECEIVE_TIMEOUT_SECS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.python, PathBuf::from("/opt/py/bin/python"));
        assert_eq!(config.workspace_dir, PathBuf::from("/tmp/ws"));
        assert_eq!(config.preferred_port, 9000);
        assert_eq!(config.retry_budget, 5);
        assert_eq!(config.receive_timeout, None);
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let err = SandboxConfig::from_lookup(lookup_from(&[("CODEBOX_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));
    }

    #[test]
    fn test_zero_retry_budget_rejected() {
        let err = SandboxConfig::from_lookup(lookup_from(&[("CODEBOX_RETRIES", "0")]))
            .unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));
    }
}
