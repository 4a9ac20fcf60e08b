use coset::iana::{self, EnumI64};

use crate::PUBLIC_KEY_TYPE;

/// The relying party requesting the operation.
#[derive(Debug, Clone)]
pub struct PublicKeyCredentialRpEntity {
    #[allow(missing_docs)]
    pub id: String,
    #[allow(missing_docs)]
    pub name: Option<String>,
}

/// The user account a new credential will be bound to.
#[derive(Debug, Clone)]
pub struct PublicKeyCredentialUserEntity {
    #[allow(missing_docs)]
    pub id: Vec<u8>,
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub display_name: String,
}

/// A `(type, algorithm)` pair requested by the relying party.
#[derive(Debug, Clone)]
pub struct PublicKeyCredentialParameters {
    #[allow(missing_docs)]
    pub ty: String,
    #[allow(missing_docs)]
    pub alg: i64,
}

impl PublicKeyCredentialParameters {
    /// Whether this entry names the one algorithm this authenticator
    /// implements: ECDSA over P-256 (COSE `ES256`, -7).
    pub fn is_es256(&self) -> bool {
        self.ty == PUBLIC_KEY_TYPE && self.alg == iana::Algorithm::ES256.to_i64()
    }
}

/// Reference to an existing credential, as sent in exclude/allow lists.
#[derive(Debug, Clone)]
pub struct PublicKeyCredentialDescriptor {
    #[allow(missing_docs)]
    pub ty: String,
    /// Raw 16-byte credential id.
    pub id: Vec<u8>,
    #[allow(missing_docs)]
    pub transports: Option<Vec<String>>,
}

/// Parameters for `makeCredential`.
///
/// The two option booleans arrive untyped from the WebAuthn layer and are
/// validated before anything else happens; a non-boolean value fails the
/// whole operation.
#[derive(Debug, Clone)]
pub struct MakeCredentialRequest {
    /// Pre-computed SHA-256 of the client data.
    pub client_data_hash: Vec<u8>,
    #[allow(missing_docs)]
    pub rp: PublicKeyCredentialRpEntity,
    #[allow(missing_docs)]
    pub user: PublicKeyCredentialUserEntity,
    #[allow(missing_docs)]
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    #[allow(missing_docs)]
    pub exclude_list: Option<Vec<PublicKeyCredentialDescriptor>>,
    #[allow(missing_docs)]
    pub require_resident_key: serde_json::Value,
    #[allow(missing_docs)]
    pub require_user_verification: serde_json::Value,
}

/// Output of `makeCredential`.
#[derive(Debug, Clone)]
pub struct MakeCredentialResult {
    /// The authenticator data embedded in `attestation_object`, exposed
    /// separately for convenience.
    pub authenticator_data: Vec<u8>,
    /// CBOR attestation object (`fmt`/`attStmt`/`authData`).
    pub attestation_object: Vec<u8>,
    /// Raw 16-byte id of the created credential.
    pub credential_id: Vec<u8>,
    /// COSE encoding of the new credential's public key.
    pub public_key: Vec<u8>,
}

/// Parameters for `getAssertion`.
#[derive(Debug, Clone)]
pub struct GetAssertionRequest {
    #[allow(missing_docs)]
    pub rp_id: String,
    /// Pre-computed SHA-256 of the client data.
    pub client_data_hash: Vec<u8>,
    #[allow(missing_docs)]
    pub allow_list: Option<Vec<PublicKeyCredentialDescriptor>>,
    /// Untyped for the same reason as in [`MakeCredentialRequest`].
    pub require_user_verification: serde_json::Value,
}

/// Output of `getAssertion`.
#[derive(Debug, Clone)]
pub struct GetAssertionResult {
    #[allow(missing_docs)]
    pub authenticator_data: Vec<u8>,
    /// DER-encoded ECDSA signature over
    /// `authenticator_data || client_data_hash`.
    pub signature: Vec<u8>,
    /// Raw 16-byte id of the credential that produced the signature.
    pub selected_credential_id: Vec<u8>,
    #[allow(missing_docs)]
    pub user_handle: Vec<u8>,
}
