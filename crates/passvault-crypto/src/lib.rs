//! Cryptographic primitives shared by the passvault crates.
//!
//! This crate deliberately exposes a small surface: the symmetric key and
//! encrypted-string envelope used to protect messages between processes, the
//! ephemeral RSA key exchange used to establish those symmetric keys, and a
//! canonical public-key fingerprint for user-facing verification.

mod enc_string;
mod error;
mod fingerprint;
mod rsa;
mod symmetric_crypto_key;

pub use enc_string::EncString;
pub use error::{CryptoError, Result, RsaError};
pub use fingerprint::{derive_fingerprint, Fingerprint};
pub use self::rsa::{
    decrypt_rsa2048_oaep_sha1, encrypt_rsa2048_oaep_sha1, make_ephemeral_key_pair, RsaKeyPair,
};
pub use symmetric_crypto_key::{Aes256CbcHmacKey, SymmetricCryptoKey};
