/// Errors raised while setting up a relay client. Runtime transport
/// failures are logged, not returned.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid relay url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported relay url scheme `{0}` (expected ws or wss)")]
    UnsupportedScheme(String),

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}
