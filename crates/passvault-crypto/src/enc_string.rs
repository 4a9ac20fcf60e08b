use std::{fmt::Display, str::FromStr};

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{de::Error as _, Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::{Aes256CbcHmacKey, CryptoError, Result, SymmetricCryptoKey};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<sha2::Sha256>;

/// # Encrypted string envelope
///
/// The authenticated encryption envelope exchanged between processes. The
/// only supported variant is type 2: AES-256-CBC with an HMAC-SHA256 over
/// `iv || data`, using independent encryption and MAC keys.
///
/// The text form is `"2.<iv_b64>|<data_b64>|<mac_b64>"`, which is also the
/// serde representation so envelopes embed directly into JSON messages.
#[derive(Clone, PartialEq)]
#[allow(non_camel_case_types)]
pub enum EncString {
    /// 2
    Aes256Cbc_HmacSha256_B64 {
        #[allow(missing_docs)]
        iv: [u8; 16],
        #[allow(missing_docs)]
        mac: [u8; 32],
        #[allow(missing_docs)]
        data: Vec<u8>,
    },
}

impl EncString {
    const ENC_TYPE: u8 = 2;

    /// Encrypt `data_dec` with AES-256-CBC and authenticate `iv || data`
    /// with HMAC-SHA256.
    pub fn encrypt_aes256_hmac(data_dec: &[u8], key: &Aes256CbcHmacKey) -> EncString {
        let mut iv = [0u8; 16];
        rand::thread_rng().fill(&mut iv);

        let data = Aes256CbcEnc::new(&key.enc_key, &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(data_dec);

        let mac = mac_iv_and_data(&key.mac_key, &iv, &data);

        EncString::Aes256Cbc_HmacSha256_B64 { iv, mac, data }
    }

    /// Verify the MAC and decrypt. The MAC is checked in constant time
    /// before any decryption is attempted.
    pub fn decrypt_with_key(&self, key: &SymmetricCryptoKey) -> Result<Vec<u8>> {
        let SymmetricCryptoKey::Aes256CbcHmacKey(key) = key;
        match self {
            EncString::Aes256Cbc_HmacSha256_B64 { iv, mac, data } => {
                let expected = mac_iv_and_data(&key.mac_key, iv, data);
                if !bool::from(expected.ct_eq(mac)) {
                    return Err(CryptoError::InvalidMac);
                }

                Aes256CbcDec::new(&key.enc_key, iv.into())
                    .decrypt_padded_vec_mut::<Pkcs7>(data)
                    .map_err(|_| CryptoError::KeyDecrypt)
            }
        }
    }
}

fn mac_iv_and_data(mac_key: &[u8], iv: &[u8], data: &[u8]) -> [u8; 32] {
    let mut hmac =
        HmacSha256::new_from_slice(mac_key).expect("HMAC can take keys of any size");
    hmac.update(iv);
    hmac.update(data);
    hmac.finalize().into_bytes().into()
}

impl FromStr for EncString {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (enc_type, rest) = s
            .split_once('.')
            .ok_or_else(|| CryptoError::EncString("missing type separator".to_owned()))?;
        if enc_type != Self::ENC_TYPE.to_string() {
            return Err(CryptoError::EncString(format!(
                "unsupported type: {enc_type}"
            )));
        }

        let parts: Vec<&str> = rest.split('|').collect();
        let [iv_b64, data_b64, mac_b64] = parts.as_slice() else {
            return Err(CryptoError::EncString(format!(
                "expected 3 parts, got {}",
                parts.len()
            )));
        };

        let iv: [u8; 16] = STANDARD
            .decode(iv_b64)?
            .try_into()
            .map_err(|_| CryptoError::EncString("invalid iv length".to_owned()))?;
        let data = STANDARD.decode(data_b64)?;
        let mac: [u8; 32] = STANDARD
            .decode(mac_b64)?
            .try_into()
            .map_err(|_| CryptoError::EncString("invalid mac length".to_owned()))?;

        Ok(EncString::Aes256Cbc_HmacSha256_B64 { iv, mac, data })
    }
}

impl Display for EncString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncString::Aes256Cbc_HmacSha256_B64 { iv, mac, data } => {
                write!(
                    f,
                    "{}.{}|{}|{}",
                    Self::ENC_TYPE,
                    STANDARD.encode(iv),
                    STANDARD.encode(data),
                    STANDARD.encode(mac)
                )
            }
        }
    }
}

impl std::fmt::Debug for EncString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncString").finish()
    }
}

impl Serialize for EncString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EncString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(D::Error::custom)
    }
}
