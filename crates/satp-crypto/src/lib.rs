pub mod error;
pub mod hashing;
pub mod keys;
pub mod signing;

pub use error::CryptoError;
pub use hashing::{hash, message_hash, Hash};
pub use keys::{KeyPair, PublicKey};
pub use signing::{
    canonical_payload, sign, sign_message, signature_verifier, verify, verify_signed_with_key,
    Signature,
};
