use std::time::Duration;

use pyramids_shared::config::{same_origin_url, DEFAULT_WS_URL};
use url::Url;

use crate::error::ClientError;

/// Fixed-delay retry after a failed connect or a dropped session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    /// `None` disables reconnection: the first failure ends the connection
    /// until `connect()` is called again.
    pub reconnect: Option<ReconnectPolicy>,
    /// Events buffered per subscriber before slow consumers start lagging.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            reconnect: Some(ReconnectPolicy::default()),
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Relay served by the same host as the page, on the default path.
    pub fn same_origin(host: &str, secure: bool) -> Self {
        Self::new(same_origin_url(host, secure))
    }

    /// `PYRAMIDS_WS_URL` if set, the local default otherwise.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup("PYRAMIDS_WS_URL") {
            Some(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: Option<ReconnectPolicy>) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn validate(&self) -> Result<Url, ClientError> {
        let url = Url::parse(&self.url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(ClientError::UnsupportedScheme(other.to_string())),
        }
        if self.event_capacity == 0 {
            return Err(ClientError::InvalidConfig(
                "event_capacity must be > 0".to_string(),
            ));
        }
        if let Some(policy) = self.reconnect {
            if policy.max_attempts == 0 {
                return Err(ClientError::InvalidConfig(
                    "reconnect.max_attempts must be > 0".to_string(),
                ));
            }
        }
        Ok(url)
    }
}
