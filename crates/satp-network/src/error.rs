//! Network error types for the gateway-to-gateway layer.

use libp2p::{noise, TransportError};

/// Errors that can occur in the gateway network layer.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Transport-level error (TCP, Noise, Yamux).
    #[error("transport error: {0}")]
    Transport(String),

    /// Failed to dial a counterparty gateway.
    #[error("dial error: {0}")]
    Dial(String),

    /// Error listening on an address.
    #[error("listen error: {0}")]
    Listen(String),

    /// Serialization / deserialization error.
    #[error("codec error: {0}")]
    Codec(String),

    /// An outbound request to a counterparty failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// No channel is connected for the requested counterparty or network.
    #[error("no channel for {0}")]
    ChannelNotFound(String),

    /// No RPC client registered under the requested protocol handler name.
    #[error("no client for protocol handler {0}")]
    ClientNotFound(String),

    /// The network has not been started yet.
    #[error("network not started")]
    NotStarted,

    /// The network is already running.
    #[error("network already running")]
    AlreadyRunning,

    /// Channel send/receive failure.
    #[error("channel error: {0}")]
    Channel(String),

    /// Error from the core layer.
    #[error("core error: {0}")]
    Core(#[from] satp_core::SatpError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic / catchall error.
    #[error("{0}")]
    Other(String),
}

impl From<noise::Error> for NetworkError {
    fn from(err: noise::Error) -> Self {
        NetworkError::Transport(err.to_string())
    }
}

impl<T: std::fmt::Debug> From<TransportError<T>> for NetworkError {
    fn from(err: TransportError<T>) -> Self {
        NetworkError::Transport(format!("{:?}", err))
    }
}

impl From<libp2p::multiaddr::Error> for NetworkError {
    fn from(err: libp2p::multiaddr::Error) -> Self {
        NetworkError::Transport(err.to_string())
    }
}
