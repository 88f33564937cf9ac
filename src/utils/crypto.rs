//! XChaCha20-Poly1305 sealing used by the cipher layer.

use crate::error::{Error, Result};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use zeroize::Zeroize;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;

pub struct Crypto {
    cipher: XChaCha20Poly1305,
}

impl Crypto {
    /// Build a cipher; the caller's copy of the key is zeroized.
    pub fn new(key: &mut [u8; KEY_SIZE]) -> Self {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
        key.zeroize();
        Self { cipher }
    }

    pub fn generate_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut key);
        key
    }

    pub fn generate_nonce() -> Result<[u8; NONCE_SIZE]> {
        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::fill(&mut nonce).map_err(|_| Error::EncryptionFailure)?;
        Ok(nonce)
    }

    pub fn encrypt(&self, plaintext: &[u8], nonce: &[u8; NONCE_SIZE]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(XNonce::from_slice(nonce), plaintext)
            .map_err(|_| Error::EncryptionFailure)
    }

    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8; NONCE_SIZE]) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::DecryptionFailure)
    }
}

impl std::fmt::Debug for Crypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Crypto { .. }")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_seal_open() {
        let mut key = Crypto::generate_key();
        let copy = key;
        let crypto = Crypto::new(&mut key);
        assert_eq!(key, [0u8; KEY_SIZE]);
        assert_ne!(copy, [0u8; KEY_SIZE]);

        let nonce = Crypto::generate_nonce().unwrap();
        let sealed = crypto.encrypt(b"secret", &nonce).unwrap();
        assert_eq!(crypto.decrypt(&sealed, &nonce).unwrap(), b"secret");
    }

    #[test]
    fn test_tamper_detected() {
        let mut key = Crypto::generate_key();
        let crypto = Crypto::new(&mut key);
        let nonce = Crypto::generate_nonce().unwrap();
        let mut sealed = crypto.encrypt(b"secret", &nonce).unwrap();
        sealed[0] ^= 0x01;
        assert!(matches!(
            crypto.decrypt(&sealed, &nonce),
            Err(Error::DecryptionFailure)
        ));
    }
}
