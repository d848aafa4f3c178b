use thiserror::Error;

/// Errors produced by the message codec.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Plaintext exceeds the configured size bound.
    #[error("Message too large: {0} bytes (limit {1})")]
    MessageTooLarge(usize, usize),

    /// AEAD encryption failed.
    #[error("Encryption failed")]
    EncryptionFailed,

    /// Ciphertext could not be decoded or authenticated.
    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,
}

/// Errors produced when resolving a thread key from an identity pair.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// One of the identity ids was empty.
    #[error("Identity id must not be empty")]
    EmptyId,
}
