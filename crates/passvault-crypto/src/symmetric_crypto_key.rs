use std::pin::Pin;

use aes::cipher::typenum::U32;
use base64::{engine::general_purpose::STANDARD, Engine};
use generic_array::GenericArray;
use rand::Rng;
use subtle::{Choice, ConstantTimeEq};
use zeroize::ZeroizeOnDrop;

use crate::CryptoError;

/// Aes256CbcHmacKey is a symmetric encryption key consisting
/// of two 256-bit keys, one for encryption and one for MAC
#[derive(ZeroizeOnDrop, Clone)]
pub struct Aes256CbcHmacKey {
    /// Pinned to the heap so key material is not left behind in moved-out
    /// stack frames before zeroization runs.
    pub(crate) enc_key: Pin<Box<GenericArray<u8, U32>>>,
    pub(crate) mac_key: Pin<Box<GenericArray<u8, U32>>>,
}

impl ConstantTimeEq for Aes256CbcHmacKey {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.enc_key.ct_eq(&other.enc_key) & self.mac_key.ct_eq(&other.mac_key)
    }
}

impl PartialEq for Aes256CbcHmacKey {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

/// A symmetric encryption key. Used to encrypt and decrypt
/// [`EncString`](crate::EncString)
#[derive(ZeroizeOnDrop, Clone, PartialEq)]
pub enum SymmetricCryptoKey {
    #[allow(missing_docs)]
    Aes256CbcHmacKey(Aes256CbcHmacKey),
}

impl SymmetricCryptoKey {
    const AES256_CBC_HMAC_KEY_LEN: usize = 64;

    /// Generate a new random [SymmetricCryptoKey]
    pub fn generate(mut rng: impl rand::RngCore) -> Self {
        let mut enc_key = Box::pin(GenericArray::<u8, U32>::default());
        let mut mac_key = Box::pin(GenericArray::<u8, U32>::default());

        rng.fill(enc_key.as_mut_slice());
        rng.fill(mac_key.as_mut_slice());

        SymmetricCryptoKey::Aes256CbcHmacKey(Aes256CbcHmacKey { enc_key, mac_key })
    }

    /// Concatenated `enc_key || mac_key` form, as exchanged with the peer.
    pub fn to_encoded(&self) -> Vec<u8> {
        match self {
            SymmetricCryptoKey::Aes256CbcHmacKey(key) => {
                let mut buf = Vec::with_capacity(Self::AES256_CBC_HMAC_KEY_LEN);
                buf.extend_from_slice(&key.enc_key);
                buf.extend_from_slice(&key.mac_key);
                buf
            }
        }
    }

    #[allow(missing_docs)]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_encoded())
    }

    #[allow(missing_docs)]
    pub fn from_base64(value: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(value)?;
        Self::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for SymmetricCryptoKey {
    type Error = CryptoError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != Self::AES256_CBC_HMAC_KEY_LEN {
            return Err(CryptoError::InvalidKeyLen);
        }

        let mut enc_key = Box::pin(GenericArray::<u8, U32>::default());
        let mut mac_key = Box::pin(GenericArray::<u8, U32>::default());
        enc_key.as_mut_slice().copy_from_slice(&value[..32]);
        mac_key.as_mut_slice().copy_from_slice(&value[32..]);

        Ok(SymmetricCryptoKey::Aes256CbcHmacKey(Aes256CbcHmacKey {
            enc_key,
            mac_key,
        }))
    }
}

impl std::fmt::Debug for SymmetricCryptoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricCryptoKey").finish()
    }
}
