//! Symmetric message codec.
//!
//! Message bodies are encrypted with XChaCha20-Poly1305 under one shared
//! 256-bit key supplied as configuration.  A fresh random 24-byte nonce is
//! prepended to every ciphertext and the whole envelope is base64-encoded so
//! it can live in a text column.
//!
//! Note: every participant holds the same key, so the cipher authenticates
//! against outsiders but not against other participants.  That key model
//! comes from the surrounding system; this codec does not attempt to change
//! it.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

use crate::constants::{KDF_CONTEXT_MESSAGE_KEY, MAX_MESSAGE_SIZE, NONCE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::error::CodecError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

/// What `decrypt` does when the stored text cannot be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecryptPolicy {
    /// Return the stored text unchanged.  Records written before encryption
    /// was enabled (or with a different key) render as their literal stored
    /// text instead of wedging the thread view.
    #[default]
    Passthrough,

    /// Surface [`CodecError::DecryptionFailed`] to the caller.
    Reject,
}

/// Stateless encrypt/decrypt of message bodies.
///
/// The key is injected at construction time; there is no ambient process-wide
/// secret, so tests and environments can each carry their own codec.
#[derive(Clone)]
pub struct MessageCodec {
    key: SymmetricKey,
    policy: DecryptPolicy,
}

impl MessageCodec {
    /// Build a codec from a shared secret passphrase, stretched to a 256-bit
    /// key with the BLAKE3 KDF.
    pub fn from_secret(secret: &str, policy: DecryptPolicy) -> Self {
        let key = blake3::derive_key(KDF_CONTEXT_MESSAGE_KEY, secret.as_bytes());
        Self { key, policy }
    }

    /// Build a codec from raw key bytes.
    pub fn from_key(key: SymmetricKey, policy: DecryptPolicy) -> Self {
        Self { key, policy }
    }

    pub fn policy(&self) -> DecryptPolicy {
        self.policy
    }

    /// Encrypt a plaintext message body.
    ///
    /// Returns `base64(nonce || ciphertext)` with a random nonce per call.
    /// Fails if the plaintext exceeds [`MAX_MESSAGE_SIZE`].
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CodecError> {
        if plaintext.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(plaintext.len(), MAX_MESSAGE_SIZE));
        }

        let cipher = XChaCha20Poly1305::new(&self.key.into());
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CodecError::EncryptionFailed)?;

        let mut envelope = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(envelope))
    }

    /// Decrypt a stored message body.
    ///
    /// Under [`DecryptPolicy::Passthrough`] this never fails: anything that
    /// does not decode as a valid envelope under the configured key is
    /// returned unchanged.  Under [`DecryptPolicy::Reject`] such input is an
    /// error.
    pub fn decrypt(&self, stored: &str) -> Result<String, CodecError> {
        match self.try_open(stored) {
            Ok(plaintext) => Ok(plaintext),
            Err(err) => match self.policy {
                DecryptPolicy::Passthrough => Ok(stored.to_string()),
                DecryptPolicy::Reject => Err(err),
            },
        }
    }

    fn try_open(&self, stored: &str) -> Result<String, CodecError> {
        let envelope = BASE64
            .decode(stored)
            .map_err(|_| CodecError::DecryptionFailed)?;
        if envelope.len() < NONCE_SIZE {
            return Err(CodecError::DecryptionFailed);
        }

        let (nonce_bytes, ciphertext) = envelope.split_at(NONCE_SIZE);
        let cipher = XChaCha20Poly1305::new(&self.key.into());
        let nonce = XNonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CodecError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CodecError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(policy: DecryptPolicy) -> MessageCodec {
        MessageCodec::from_secret("k", policy)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let codec = codec(DecryptPolicy::Passthrough);
        let stored = codec.encrypt("hello").unwrap();
        assert_ne!(stored, "hello");
        assert_eq!(codec.decrypt(&stored).unwrap(), "hello");
    }

    #[test]
    fn test_unicode_roundtrip() {
        let codec = codec(DecryptPolicy::Reject);
        let stored = codec.encrypt("sécurisé ✓").unwrap();
        assert_eq!(codec.decrypt(&stored).unwrap(), "sécurisé ✓");
    }

    #[test]
    fn test_invalid_input_passes_through() {
        let codec = codec(DecryptPolicy::Passthrough);
        assert_eq!(
            codec.decrypt("not-valid-ciphertext").unwrap(),
            "not-valid-ciphertext"
        );
    }

    #[test]
    fn test_invalid_input_rejected_under_reject_policy() {
        let codec = codec(DecryptPolicy::Reject);
        assert!(matches!(
            codec.decrypt("not-valid-ciphertext"),
            Err(CodecError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_wrong_key_degrades_per_policy() {
        let stored = MessageCodec::from_secret("k1", DecryptPolicy::Passthrough)
            .encrypt("secret")
            .unwrap();

        let tolerant = MessageCodec::from_secret("k2", DecryptPolicy::Passthrough);
        assert_eq!(tolerant.decrypt(&stored).unwrap(), stored);

        let strict = MessageCodec::from_secret("k2", DecryptPolicy::Reject);
        assert!(strict.decrypt(&stored).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_detected() {
        let codec = codec(DecryptPolicy::Reject);
        let stored = codec.encrypt("important").unwrap();
        let mut envelope = BASE64.decode(&stored).unwrap();
        let len = envelope.len();
        envelope[len - 1] ^= 0xFF;
        let tampered = BASE64.encode(envelope);
        assert!(codec.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_size_bound_enforced() {
        let codec = codec(DecryptPolicy::Passthrough);
        let oversized = "x".repeat(MAX_MESSAGE_SIZE + 1);
        assert!(matches!(
            codec.encrypt(&oversized),
            Err(CodecError::MessageTooLarge(..))
        ));
    }

    #[test]
    fn test_key_derivation_deterministic() {
        let a = MessageCodec::from_secret("shared", DecryptPolicy::Reject);
        let b = MessageCodec::from_secret("shared", DecryptPolicy::Reject);
        let stored = a.encrypt("ping").unwrap();
        assert_eq!(b.decrypt(&stored).unwrap(), "ping");
    }

    #[test]
    fn test_nonce_is_random_per_message() {
        let codec = codec(DecryptPolicy::Passthrough);
        let first = codec.encrypt("same text").unwrap();
        let second = codec.encrypt("same text").unwrap();
        assert_ne!(first, second);
    }
}
