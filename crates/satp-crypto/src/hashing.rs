use serde::Serialize;

use crate::error::CryptoError;

/// BLAKE3 hash (32 bytes).
pub type Hash = [u8; 32];

/// Hash arbitrary data using BLAKE3.
pub fn hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Hex-encoded BLAKE3 digest of a message's stable JSON serialization.
///
/// This is the value stored in the session's per-slot hash records and
/// chained into the next message's hash-of-predecessor field. The digest
/// covers the complete message, signature included.
pub fn message_hash<T: Serialize>(message: &T) -> Result<String, CryptoError> {
    let bytes = serde_json::to_vec(message)
        .map_err(|e| CryptoError::Canonicalization(e.to_string()))?;
    Ok(hex::encode(hash(&bytes)))
}
