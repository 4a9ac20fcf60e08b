//! Canonical cryptographic fingerprints for public keys.
//!
//! A fingerprint is derived from a set of parts of a public key in canonical
//! form (for RSA: the modulus and exponent, separately). Hashing each part
//! on its own and then hashing the concatenation of the digests keeps the
//! mapping injective: concatenating the raw parts would allow two different
//! part lists to produce the same input bytes.

use sha2::{Digest, Sha256};

/// A short, canonical representation of a public key, shown to users when a
/// key has to be verified out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    digest: [u8; 32],
}

impl Fingerprint {
    /// The raw SHA-256 digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Render the leading digest bytes as grouped lowercase hex, the form
    /// used in verification dialogs. Ten bytes in five groups is short
    /// enough to compare by eye while keeping 80 bits of the digest.
    pub fn phrase(&self) -> String {
        self.digest[..10]
            .chunks(2)
            .map(|pair| format!("{:02x}{:02x}", pair[0], pair[1]))
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// Derives a fingerprint from a canonical set of public-key parts.
pub fn derive_fingerprint(parts: &[&[u8]]) -> Fingerprint {
    let concat: Vec<u8> = parts
        .iter()
        .flat_map(|part| Sha256::digest(part).to_vec())
        .collect();

    Fingerprint {
        digest: Sha256::digest(&concat).into(),
    }
}
