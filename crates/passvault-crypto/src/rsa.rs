use rsa::{pkcs8::EncodePublicKey, Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use crate::{
    error::{Result, RsaError},
    CryptoError,
};

/// Ephemeral RSA key pair used for a single key-exchange handshake.
///
/// The private half never leaves the process; the public half is the DER
/// (SPKI) encoding that gets published to the peer.
pub struct RsaKeyPair {
    /// DER (SPKI) representation of the public key
    pub public: Vec<u8>,
    /// The in-memory private key; discard after the shared secret has been
    /// established.
    pub private: RsaPrivateKey,
}

/// Generate a new RSA key pair of 2048 bits
pub fn make_ephemeral_key_pair() -> Result<RsaKeyPair> {
    let mut rng = rand::thread_rng();
    let bits = 2048;
    let priv_key = RsaPrivateKey::new(&mut rng, bits).map_err(|_| RsaError::CreatePrivateKey)?;
    let pub_key = RsaPublicKey::from(&priv_key);

    let spki = pub_key
        .to_public_key_der()
        .map_err(|_| RsaError::CreatePublicKey)?;

    Ok(RsaKeyPair {
        public: spki.as_ref().to_vec(),
        private: priv_key,
    })
}

/// Encrypt data using RSA-OAEP-SHA1 with a 2048 bit key
pub fn encrypt_rsa2048_oaep_sha1(public_key: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>> {
    let mut rng = rand::thread_rng();

    let padding = Oaep::new::<Sha1>();
    public_key
        .encrypt(&mut rng, padding, data)
        .map_err(|e| CryptoError::Rsa(e.into()))
}

/// Decrypt data using RSA-OAEP-SHA1 with a 2048 bit key
pub fn decrypt_rsa2048_oaep_sha1(private_key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    let padding = Oaep::new::<Sha1>();
    private_key
        .decrypt(padding, data)
        .map_err(|e| CryptoError::Rsa(e.into()))
}
