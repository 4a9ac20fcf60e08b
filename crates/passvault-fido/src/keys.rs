use coset::{iana, CborSerializable, CoseKeyBuilder};
use p256::{
    ecdsa::{signature::RandomizedSigner, Signature, SigningKey},
    elliptic_curve::sec1::ToEncodedPoint,
    pkcs8::{DecodePrivateKey, EncodePrivateKey},
    SecretKey,
};

use crate::error::EncodingError;

/// The ECDSA P-256 key pair behind a single credential.
pub(crate) struct CredentialKeyPair {
    secret: SecretKey,
}

impl CredentialKeyPair {
    pub(crate) fn generate() -> Self {
        CredentialKeyPair {
            secret: SecretKey::random(&mut rand::thread_rng()),
        }
    }

    pub(crate) fn from_pkcs8_der(der: &[u8]) -> Result<Self, EncodingError> {
        Ok(CredentialKeyPair {
            secret: SecretKey::from_pkcs8_der(der).map_err(|_| EncodingError::InvalidKey)?,
        })
    }

    pub(crate) fn to_pkcs8_der(&self) -> Result<Vec<u8>, EncodingError> {
        Ok(self
            .secret
            .to_pkcs8_der()
            .map_err(|_| EncodingError::InvalidKey)?
            .as_bytes()
            .to_vec())
    }

    /// COSE_Key encoding of the public half: EC2, P-256, ES256, with
    /// uncompressed x and y coordinates. This is the 77-byte form embedded
    /// in attested credential data.
    pub(crate) fn cose_public_key(&self) -> Result<Vec<u8>, EncodingError> {
        let point = self.secret.public_key().to_encoded_point(false);
        let x = point.x().ok_or(EncodingError::InvalidKey)?.to_vec();
        let y = point.y().ok_or(EncodingError::InvalidKey)?.to_vec();

        CoseKeyBuilder::new_ec2_pub_key(iana::EllipticCurve::P_256, x, y)
            .algorithm(iana::Algorithm::ES256)
            .build()
            .to_vec()
            .map_err(|_| EncodingError::Cose)
    }

    /// Sign with a randomized (hedged) nonce, so signing identical input
    /// twice never yields the same signature. Returns the DER encoding.
    pub(crate) fn sign(&self, message: &[u8]) -> Result<Vec<u8>, EncodingError> {
        let signing_key = SigningKey::from(&self.secret);
        let signature: Signature = signing_key
            .try_sign_with_rng(&mut rand::thread_rng(), message)
            .map_err(|_| EncodingError::Signing)?;
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::{signature::Verifier, VerifyingKey};

    use super::*;

    #[test]
    fn test_pkcs8_round_trip() {
        let key_pair = CredentialKeyPair::generate();

        let der = key_pair.to_pkcs8_der().unwrap();
        let restored = CredentialKeyPair::from_pkcs8_der(&der).unwrap();

        assert_eq!(
            key_pair.cose_public_key().unwrap(),
            restored.cose_public_key().unwrap()
        );
    }

    #[test]
    fn test_cose_public_key_is_77_bytes() {
        let key_pair = CredentialKeyPair::generate();
        assert_eq!(key_pair.cose_public_key().unwrap().len(), 77);
    }

    #[test]
    fn test_signature_verifies() {
        let key_pair = CredentialKeyPair::generate();
        let message = b"authenticator data || client data hash";

        let der = key_pair.sign(message).unwrap();

        let verifying_key = VerifyingKey::from(&SigningKey::from(&key_pair.secret));
        let signature = Signature::from_der(&der).unwrap();
        verifying_key.verify(message, &signature).unwrap();
    }

    #[test]
    fn test_signatures_are_randomized() {
        let key_pair = CredentialKeyPair::generate();
        let message = b"same input";

        let first = key_pair.sign(message).unwrap();
        let second = key_pair.sign(message).unwrap();

        assert_ne!(first, second);
    }
}
