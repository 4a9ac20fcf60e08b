use thiserror::Error;

/// Errors produced by the primitives in this crate.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key")]
    InvalidKey,
    #[error("Invalid key length")]
    InvalidKeyLen,
    #[error("Error while decrypting EncString")]
    KeyDecrypt,
    #[error("MAC comparison failed")]
    InvalidMac,
    #[error("Invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("EncString error, {0}")]
    EncString(String),
    #[error(transparent)]
    Rsa(#[from] RsaError),
}

/// RSA specific failures, kept separate so callers can distinguish key
/// generation problems from padding/decryption problems.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum RsaError {
    #[error("Unable to create public key")]
    CreatePublicKey,
    #[error("Unable to create private key")]
    CreatePrivateKey,
    #[error(transparent)]
    Rsa(#[from] rsa::Error),
}

/// Alias for `Result<T, CryptoError>`.
pub type Result<T, E = CryptoError> = std::result::Result<T, E>;
