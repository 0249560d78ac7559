use satp_core::SatpError;
use satp_crypto::CryptoError;
use satp_network::NetworkError;

/// Errors raised by the crash-recovery subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// Protocol-level failure from the core layer.
    #[error(transparent)]
    Core(#[from] SatpError),

    /// Cryptographic failure while signing or hashing.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Gateway channel failure.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Wire message could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A session snapshot could not be parsed.
    #[error("invalid session snapshot: {0}")]
    InvalidSnapshot(String),

    /// A compensating ledger operation failed.
    #[error("bridge error: {0}")]
    Bridge(String),
}

impl From<prost::DecodeError> for RecoveryError {
    fn from(err: prost::DecodeError) -> Self {
        RecoveryError::Codec(err.to_string())
    }
}
