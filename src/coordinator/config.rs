//! Coordinator configuration

use crate::{Result, X402Error};
use std::time::Duration;

/// Default listen host
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default listen port
pub const DEFAULT_PORT: u16 = 4021;
/// Default WebSocket path
pub const DEFAULT_PATH: &str = "/x402/ws";
/// Default per-request signing budget
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline `timeout` from now, or `None` when it is past what the clock can represent
pub(crate) fn deadline_after(timeout: Duration) -> Option<tokio::time::Instant> {
    tokio::time::Instant::now().checked_add(timeout)
}

/// Which connected signer(s) receive a sign request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// The longest-connected signer
    #[default]
    FirstAvailable,
    /// Rotate through connected signers in connection order
    RoundRobin,
    /// Send to every signer; the first response resolves the request
    BroadcastFirstWins,
}

impl std::str::FromStr for SelectionPolicy {
    type Err = X402Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "first-available" | "first" => Ok(Self::FirstAvailable),
            "round-robin" => Ok(Self::RoundRobin),
            "broadcast" | "broadcast-first-wins" => Ok(Self::BroadcastFirstWins),
            other => Err(X402Error::config(format!(
                "Unknown selection policy: {}",
                other
            ))),
        }
    }
}

/// Signing coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind; 0 picks a free port
    pub port: u16,
    /// Path the WebSocket endpoint is served on
    pub path: String,
    /// How long a sign request may wait for a response
    pub timeout: Duration,
    /// Target selection for sign requests
    pub policy: SelectionPolicy,
    /// Fail pending requests once every signer they were sent to has gone
    pub cancel_on_disconnect: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT,
            policy: SelectionPolicy::default(),
            cancel_on_disconnect: false,
        }
    }
}

impl CoordinatorConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the bind port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the WebSocket path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the selection policy
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fail pending requests fast when their signers disconnect
    pub fn with_cancel_on_disconnect(mut self, enabled: bool) -> Self {
        self.cancel_on_disconnect = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(X402Error::config("Coordinator host cannot be empty"));
        }
        if !self.path.starts_with('/') {
            return Err(X402Error::config(format!(
                "Coordinator path must start with '/': {}",
                self.path
            )));
        }
        let has_parameter = self.path.contains(['{', '}'])
            || self
                .path
                .split('/')
                .any(|segment| segment.starts_with(':') || segment.starts_with('*'));
        if has_parameter {
            return Err(X402Error::config(format!(
                "Coordinator path cannot contain route parameters: {}",
                self.path
            )));
        }
        if self.timeout.is_zero() {
            return Err(X402Error::config("Sign timeout must be greater than zero"));
        }
        if deadline_after(self.timeout).is_none() {
            return Err(X402Error::config(format!(
                "Sign timeout is too large: {}s",
                self.timeout.as_secs_f64()
            )));
        }
        Ok(())
    }

    /// Load from `X402_WS_HOST`, `X402_WS_PORT`, `X402_WS_PATH`,
    /// `X402_SIGN_TIMEOUT_SECS` and `X402_WS_POLICY`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source, defaulting anything missing
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("X402_WS_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("X402_WS_PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| X402Error::config(format!("Invalid X402_WS_PORT: {}", port)))?;
        }
        if let Some(path) = lookup("X402_WS_PATH") {
            config.path = path;
        }
        if let Some(secs) = lookup("X402_SIGN_TIMEOUT_SECS") {
            let value: f64 = secs.trim().parse().map_err(|_| {
                X402Error::config(format!("Invalid X402_SIGN_TIMEOUT_SECS: {}", secs))
            })?;
            config.timeout = Duration::try_from_secs_f64(value).map_err(|_| {
                X402Error::config(format!("Invalid X402_SIGN_TIMEOUT_SECS: {}", secs))
            })?;
        }
        if let Some(policy) = lookup("X402_WS_POLICY") {
            config.policy = policy.parse()?;
        }

        config.validate()?;
        Ok(config)
    }
}
