/// Application name
pub const APP_NAME: &str = "Aparte";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Maximum message plaintext size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Key derivation context (BLAKE3)
pub const KDF_CONTEXT_MESSAGE_KEY: &str = "aparte-message-key-v1";
