//! Endpoint defaults shared by server and client.

/// Path the relay upgrades to WebSocket on.
pub const WS_PATH: &str = "/ws";

/// Address the server binds when nothing else is configured.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9001";

/// URL a native client uses when nothing else is configured.
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:9001/ws";

/// Build the relay URL for a page served from `host` (e.g. `example.com:8080`).
/// `secure` selects `wss` for pages loaded over https.
pub fn same_origin_url(host: &str, secure: bool) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{host}{WS_PATH}")
}
