//! Binary encoding of authenticator data and attestation objects.
//!
//! Layout of authenticator data (WebAuthn §6.1):
//!
//! ```text
//! rpIdHash (32) || flags (1) || signCount (4, big-endian)
//!   [ || aaguid (16) || credentialIdLength (2, big-endian)
//!     || credentialId || credentialPublicKey (COSE) ]
//! ```
//!
//! The bracketed attested credential data is present only when flag bit 6
//! is set. Credential ids are always 16 bytes here because they are GUIDs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{error::EncodingError, AAGUID};

/// Authenticator data flag bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    /// Bit 0
    pub user_present: bool,
    /// Bit 2
    pub user_verified: bool,
    /// Bit 6
    pub attested_credential_data: bool,
}

impl Flags {
    const USER_PRESENT: u8 = 1 << 0;
    const USER_VERIFIED: u8 = 1 << 2;
    const ATTESTED_CREDENTIAL_DATA: u8 = 1 << 6;

    #[allow(missing_docs)]
    pub fn to_byte(self) -> u8 {
        let mut byte = 0;
        if self.user_present {
            byte |= Self::USER_PRESENT;
        }
        if self.user_verified {
            byte |= Self::USER_VERIFIED;
        }
        if self.attested_credential_data {
            byte |= Self::ATTESTED_CREDENTIAL_DATA;
        }
        byte
    }
}

/// The attested credential data section of authenticator data.
#[derive(Debug, Clone)]
pub struct AttestedCredentialData {
    #[allow(missing_docs)]
    pub credential_id: [u8; 16],
    /// COSE_Key encoding of the credential public key.
    pub cose_public_key: Vec<u8>,
}

/// Build the authenticator data byte string.
pub fn build_authenticator_data(
    rp_id: &str,
    flags: Flags,
    counter: u32,
    attested: Option<&AttestedCredentialData>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(37 + attested.map_or(0, |a| 34 + a.cose_public_key.len()));
    out.extend_from_slice(&Sha256::digest(rp_id.as_bytes()));
    out.push(flags.to_byte());
    out.extend_from_slice(&counter.to_be_bytes());

    if let Some(attested) = attested {
        out.extend_from_slice(&AAGUID);
        out.extend_from_slice(&(attested.credential_id.len() as u16).to_be_bytes());
        out.extend_from_slice(&attested.credential_id);
        out.extend_from_slice(&attested.cose_public_key);
    }

    out
}

#[derive(Serialize, Deserialize)]
struct AttestationObject {
    fmt: String,
    #[serde(rename = "attStmt")]
    att_stmt: BTreeMap<String, ciborium::Value>,
    #[serde(rename = "authData", with = "serde_bytes")]
    auth_data: Vec<u8>,
}

/// Wrap authenticator data in a CBOR attestation object with the `none`
/// attestation format (this authenticator does not attest to hardware).
pub fn build_attestation_object(auth_data: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let object = AttestationObject {
        fmt: "none".to_owned(),
        att_stmt: BTreeMap::new(),
        auth_data: auth_data.to_vec(),
    };

    let mut out = Vec::new();
    ciborium::into_writer(&object, &mut out).map_err(|_| EncodingError::Cbor)?;
    Ok(out)
}
