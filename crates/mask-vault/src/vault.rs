//! Secret encryption and decryption.
//!
//! Ciphertext layout: base64(nonce || aead_ciphertext). A fresh random
//! 24-byte nonce is drawn per encryption, so encrypting the same plaintext
//! twice yields different ciphertexts.

use crate::{MasterKey, VaultError};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;

const NONCE_LEN: usize = 24;

/// Authenticated encryption for secret fields, bound to the process-wide
/// master key.
pub struct Vault {
    cipher: XChaCha20Poly1305,
}

impl Vault {
    /// Create a vault from a loaded master key.
    pub fn new(key: MasterKey) -> Self {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Encrypt a secret for persistence.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        // Encryption with a valid key and fresh nonce cannot fail.
        let ciphertext = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
            .expect("AEAD encryption is infallible with a valid key");

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        BASE64.encode(blob)
    }

    /// Decrypt a persisted secret.
    ///
    /// Fails with [`VaultError::CorruptedSecret`] if the input is malformed,
    /// has been tampered with, or was produced under a different key.
    pub fn decrypt(&self, encoded: &str) -> Result<String, VaultError> {
        let blob = BASE64
            .decode(encoded)
            .map_err(|_| VaultError::CorruptedSecret)?;
        if blob.len() < NONCE_LEN {
            return Err(VaultError::CorruptedSecret);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::CorruptedSecret)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::CorruptedSecret)
    }
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vault([redacted])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> Vault {
        Vault::new(MasterKey::generate())
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let v = vault();
        for secret in ["hunter2", "", "pässwörd \u{1F511}", "a:b@c:d"] {
            let ct = v.encrypt(secret);
            assert_eq!(v.decrypt(&ct).unwrap(), secret);
        }
    }

    #[test]
    fn test_ciphertext_differs_from_plaintext() {
        let v = vault();
        let ct = v.encrypt("hunter2");
        assert_ne!(ct, "hunter2");
        assert!(!ct.contains("hunter2"));
    }

    #[test]
    fn test_nonce_freshness() {
        let v = vault();
        assert_ne!(v.encrypt("same"), v.encrypt("same"));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let v = vault();
        let mut ct = v.encrypt("hunter2").into_bytes();
        let last = ct.len() - 1;
        ct[last] = if ct[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(ct).unwrap();

        assert!(matches!(
            v.decrypt(&tampered),
            Err(VaultError::CorruptedSecret)
        ));
    }

    #[test]
    fn test_foreign_key_fails() {
        let a = vault();
        let b = vault();
        let ct = a.encrypt("hunter2");

        assert!(matches!(b.decrypt(&ct), Err(VaultError::CorruptedSecret)));
    }

    #[test]
    fn test_garbage_input_fails() {
        let v = vault();
        assert!(matches!(
            v.decrypt("not base64 at all!!!"),
            Err(VaultError::CorruptedSecret)
        ));
        assert!(matches!(
            v.decrypt("dG9vc2hvcnQ="),
            Err(VaultError::CorruptedSecret)
        ));
    }
}
