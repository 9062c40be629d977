/// Errors from the router connection manager.
#[derive(thiserror::Error, Debug)]
pub enum LinkError {
    #[error("config: {0}")]
    Config(String),
    #[error("connect: {0}")]
    Connect(String),
    #[error("handshake: {0}")]
    Handshake(String),
    #[error("reconnect exhausted after {0} attempts, no more endpoints to fail over to")]
    ReconnectExhausted(u32),
    #[error("shutdown")]
    Shutdown,
    #[error("wire: {0}")]
    Wire(#[from] i3g_wire::WireError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
