use ed25519_dalek::Signer;
use ed25519_dalek::Verifier;

use satp_core::error::SatpError;
use satp_core::session::SessionData;
use satp_core::verifier::SignedMessage;

use crate::error::CryptoError;
use crate::keys::{KeyPair, PublicKey};

/// Ed25519 signature (64 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

impl Signature {
    /// Get the raw bytes (64 bytes).
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }

    /// Create from raw bytes (64 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 64 {
            return Err(CryptoError::InvalidInput(format!(
                "signature must be 64 bytes, got {}",
                bytes.len()
            )));
        }
        let bytes_arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("invalid signature length".into()))?;
        let inner = ed25519_dalek::Signature::from_bytes(&bytes_arr);
        Ok(Self { inner })
    }

    /// Encode as hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Decode from hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| CryptoError::InvalidInput(format!("invalid hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

/// Sign a message using Ed25519.
pub fn sign(message: &[u8], keypair: &KeyPair) -> Signature {
    let sig = keypair.signing_key().sign(message);
    Signature { inner: sig }
}

/// Verify an Ed25519 signature.
pub fn verify(
    message: &[u8],
    signature: &Signature,
    pubkey: &PublicKey,
) -> Result<(), CryptoError> {
    pubkey
        .verifying_key()
        .verify(message, &signature.inner)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

/// The canonical signing payload of a wire message: its stable JSON
/// serialization with every signature field blanked.
pub fn canonical_payload<T: SignedMessage>(message: &T) -> Result<Vec<u8>, CryptoError> {
    let mut copy = message.clone();
    copy.clear_signatures();
    serde_json::to_vec(&copy).map_err(|e| CryptoError::Canonicalization(e.to_string()))
}

/// Sign a wire message's canonical payload, returning the hex signature to
/// place into the message's signature field.
pub fn sign_message<T: SignedMessage>(message: &T, keypair: &KeyPair) -> Result<String, CryptoError> {
    let payload = canonical_payload(message)?;
    Ok(sign(&payload, keypair).to_hex())
}

/// Verify whichever signature field a message carries against an explicit
/// hex-encoded public key.
pub fn verify_signed_with_key<T: SignedMessage>(
    message: &T,
    pubkey_hex: &str,
) -> Result<(), SatpError> {
    let (client_sig, server_sig) = (message.client_signature(), message.server_signature());
    let sig_hex = match (client_sig.is_empty(), server_sig.is_empty()) {
        (false, true) => client_sig,
        (true, false) => server_sig,
        // Both empty or both populated: no single usable signature.
        _ => return Err(SatpError::SignatureMissing),
    };

    let signature =
        Signature::from_hex(sig_hex).map_err(|_| SatpError::SignatureVerification)?;
    let pubkey = PublicKey::from_hex(pubkey_hex).map_err(|_| SatpError::SignatureVerification)?;
    let payload = canonical_payload(message).map_err(|_| SatpError::SignatureVerification)?;

    verify(&payload, &signature, &pubkey).map_err(|_| SatpError::SignatureVerification)
}

/// Verify a message's signature against the session's stored pubkeys.
///
/// Exactly one of the client/server signature fields must be populated; the
/// populated field selects which stored pubkey to verify against. Both-empty
/// and both-present fail before any cryptographic work.
pub fn signature_verifier<T: SignedMessage>(
    message: &T,
    session_data: &SessionData,
) -> Result<(), SatpError> {
    let (client_sig, server_sig) = (message.client_signature(), message.server_signature());
    let pubkey_hex = match (client_sig.is_empty(), server_sig.is_empty()) {
        (false, true) => &session_data.client_gateway_pubkey,
        (true, false) => &session_data.server_gateway_pubkey,
        _ => return Err(SatpError::SignatureMissing),
    };
    verify_signed_with_key(message, pubkey_hex)
}
