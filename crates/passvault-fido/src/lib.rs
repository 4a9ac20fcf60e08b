//! A software FIDO2 authenticator backed by a password-vault credential
//! store.
//!
//! The authenticator emulates the CTAP2 `makeCredential` and `getAssertion`
//! operations against vault items instead of secure-element key slots. The
//! vault itself and the user-consent surface are external collaborators,
//! abstracted behind [`Fido2CredentialStore`] and [`Fido2UserInterface`].

mod abort;
mod attestation;
mod authenticator;
mod credential;
mod error;
mod keys;
mod store;
mod types;
mod user_interface;

pub use abort::{AbortController, AbortSignal};
pub use attestation::{
    build_attestation_object, build_authenticator_data, AttestedCredentialData, Flags,
};
pub use authenticator::Fido2Authenticator;
pub use credential::{EncryptedVaultItem, Fido2CredentialView, VaultItem, VaultItemContent};
pub use error::{EncodingError, Fido2AuthenticatorError};
pub use store::{CredentialStoreError, Fido2CredentialStore};
pub use types::*;
pub use user_interface::{
    Fido2UserInterface, NewCredentialConsent, NewCredentialParams, PickCredentialParams,
    PickedCredential,
};

/// AAGUID of this authenticator. Identifies the implementation to relying
/// parties in attestation objects; fixed for all installs.
pub const AAGUID: [u8; 16] = [
    0xb1, 0xc9, 0xb7, 0xa2, 0x3d, 0x55, 0x4a, 0x8e, 0x9c, 0x41, 0x6f, 0x2a, 0x77, 0xe0, 0xd5,
    0xb8,
];

/// Key type string shared by credential parameters and descriptors.
pub(crate) const PUBLIC_KEY_TYPE: &str = "public-key";
