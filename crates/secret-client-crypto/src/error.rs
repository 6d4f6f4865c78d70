use thiserror::Error;

/// Errors produced while negotiating session keys or transforming secret payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The peer public key is empty, too long, or outside `(1, p - 1)`.
    #[error("The peer public key is invalid")]
    InvalidPublicKey,
    /// HKDF refused to produce the requested key length.
    #[error("Failed to derive the session key")]
    KeyDerivation,
    #[error("Invalid key or IV length, expected {expected} bytes but got {got}")]
    #[allow(missing_docs)]
    InvalidLength { expected: usize, got: usize },
    /// The ciphertext did not decrypt to a correctly padded plaintext.
    #[error("Failed to decrypt the payload")]
    Decrypt,
}

pub(crate) type Result<T, E = CryptoError> = std::result::Result<T, E>;
