/// Cryptographic operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("canonical serialization failed: {0}")]
    Canonicalization(String),
}
