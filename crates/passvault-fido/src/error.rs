use thiserror::Error;

/// The WebAuthn-facing error taxonomy. These are the only errors that cross
/// the relying-party boundary; internal causes are logged and collapsed into
/// [`Fido2AuthenticatorError::Unknown`] so storage details never leak out.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Fido2AuthenticatorError {
    /// None of the requested algorithms are supported by this authenticator.
    #[error("No supported algorithms were found")]
    NotSupported,
    /// Invalid input or an internal persistence/crypto failure.
    #[error("An unknown error occurred")]
    Unknown,
    /// The user declined, the operation was cancelled, or a referenced
    /// credential was not usable.
    #[error("Operation was not allowed")]
    NotAllowed,
    /// User verification was required but cannot be performed. Declared for
    /// completeness; no code path produces it while verification is
    /// software-emulated.
    #[error("Constraint was not satisfied")]
    Constraint,
}

/// Failures while encoding binary authenticator structures.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("CBOR serialization failed")]
    Cbor,
    #[error("COSE key serialization failed")]
    Cose,
    #[error("Invalid key material")]
    InvalidKey,
    #[error("Signing failed")]
    Signing,
}

impl From<EncodingError> for Fido2AuthenticatorError {
    fn from(error: EncodingError) -> Self {
        log::error!("attestation encoding failed: {error}");
        Fido2AuthenticatorError::Unknown
    }
}
