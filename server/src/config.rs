use pyramids_shared::config::{DEFAULT_LISTEN_ADDR, WS_PATH};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Path the WebSocket upgrade is served on.
    pub ws_path: String,
    pub max_connections: usize,
    /// Frames above this size close the connection.
    pub max_message_bytes: usize,
    /// Browser origins allowed to connect. Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub command_capacity: usize,
    pub broadcast_capacity: usize,
    /// Fixed seed for player ids. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            ws_path: WS_PATH.to_string(),
            max_connections: 1000,
            max_message_bytes: 4096,
            allowed_origins: Vec::new(),
            command_capacity: 256,
            broadcast_capacity: 256,
            rng_seed: None,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `PYRAMIDS_*` environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(addr) = lookup("PYRAMIDS_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(path) = lookup("PYRAMIDS_WS_PATH") {
            config.ws_path = path;
        }
        if let Some(raw) = lookup("PYRAMIDS_MAX_CONNECTIONS") {
            config.max_connections = parse_var("PYRAMIDS_MAX_CONNECTIONS", &raw)?;
        }
        if let Some(raw) = lookup("PYRAMIDS_MAX_MESSAGE_BYTES") {
            config.max_message_bytes = parse_var("PYRAMIDS_MAX_MESSAGE_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("PYRAMIDS_ALLOWED_ORIGINS") {
            config.allowed_origins = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup("PYRAMIDS_RNG_SEED") {
            config.rng_seed = Some(parse_var("PYRAMIDS_RNG_SEED", &raw)?);
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("listen_addr is not a socket address: {}", self.listen_addr));
        }
        if !self.ws_path.starts_with('/') {
            return Err("ws_path must start with '/'".to_string());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }
        if self.max_message_bytes < 64 {
            return Err("max_message_bytes must be >= 64".to_string());
        }
        if self.command_capacity == 0 || self.broadcast_capacity == 0 {
            return Err("channel capacities must be > 0".to_string());
        }
        for origin in &self.allowed_origins {
            if axum::http::HeaderValue::from_str(origin).is_err() {
                return Err(format!("allowed origin is not a valid header value: {origin}"));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{key} has an invalid value: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn env_overrides_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PYRAMIDS_LISTEN_ADDR", "127.0.0.1:4000"),
            ("PYRAMIDS_MAX_CONNECTIONS", "12"),
            ("PYRAMIDS_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("PYRAMIDS_RNG_SEED", "7"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:4000");
        assert_eq!(config.max_connections, 12);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.ws_path, "/ws");
    }

    #[test]
    fn unparsable_number_is_an_error() {
        let err = ServerConfig::from_lookup(lookup(&[("PYRAMIDS_MAX_CONNECTIONS", "lots")]))
            .unwrap_err();
        assert!(err.contains("PYRAMIDS_MAX_CONNECTIONS"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad_addr = ServerConfig {
            listen_addr: "nowhere".to_string(),
            ..Default::default()
        };
        assert!(bad_addr.validate().is_err());

        let bad_path = ServerConfig {
            ws_path: "ws".to_string(),
            ..Default::default()
        };
        assert!(bad_path.validate().is_err());

        let no_room = ServerConfig {
            max_connections: 0,
            ..Default::default()
        };
        assert!(no_room.validate().is_err());
    }
}
