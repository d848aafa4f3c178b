//! Engine configuration loaded from environment variables.
//!
//! Everything except the shared secret has a sensible default so the engine
//! can come up with zero configuration in development.

use std::path::PathBuf;

use aparte_shared::DecryptPolicy;

/// Sync engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Shared codec secret, known to every client of the deployment.
    /// Env: `APARTE_SECRET`
    /// No default; [`SyncEngine::open`] refuses to start without it.
    ///
    /// [`SyncEngine::open`]: crate::SyncEngine::open
    pub secret: Option<String>,

    /// Directory holding the message database.
    /// Env: `APARTE_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// What to do with records that fail to decrypt.
    /// Env: `APARTE_DECRYPT_POLICY` (`passthrough` / `reject`)
    /// Default: `passthrough`.
    pub decrypt_policy: DecryptPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            secret: None,
            data_dir: None,
            decrypt_policy: DecryptPolicy::Passthrough,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(secret) = std::env::var("APARTE_SECRET") {
            if !secret.is_empty() {
                config.secret = Some(secret);
            }
        }

        if let Ok(dir) = std::env::var("APARTE_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }

        if let Ok(val) = std::env::var("APARTE_DECRYPT_POLICY") {
            match parse_policy(&val) {
                Some(policy) => config.decrypt_policy = policy,
                None => {
                    tracing::warn!(
                        value = %val,
                        "Invalid APARTE_DECRYPT_POLICY, using default"
                    );
                }
            }
        }

        config
    }
}

/// Parse a decrypt policy name.
fn parse_policy(value: &str) -> Option<DecryptPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "passthrough" => Some(DecryptPolicy::Passthrough),
        "reject" => Some(DecryptPolicy::Reject),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.secret.is_none());
        assert!(config.data_dir.is_none());
        assert_eq!(config.decrypt_policy, DecryptPolicy::Passthrough);
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!(parse_policy("passthrough"), Some(DecryptPolicy::Passthrough));
        assert_eq!(parse_policy(" Reject "), Some(DecryptPolicy::Reject));
        assert_eq!(parse_policy("mark-corrupt"), None);
    }
}
