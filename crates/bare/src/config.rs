//! Client configuration.
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `max_redirects` | 20 | Redirect hops a `follow` fetch may take |
//! | `max_header_value_len` | 3072 | Largest transport header value the envelope emits |
//!
//! The struct deserialises with every field optional, so hosts can embed it
//! in their own configuration files.

use serde::{Deserialize, Serialize};

use crate::{BareClientError, Result};

/// Default bound on redirect hops.
pub const DEFAULT_MAX_REDIRECTS: usize = 20;

/// Default per-field limit for envelope header values.
pub const DEFAULT_MAX_HEADER_VALUE_LEN: usize = 3072;

/// Smallest usable per-field limit: the chunk prefix plus the widest UTF-8
/// character, so every chunk fits.
pub const MIN_HEADER_VALUE_LEN: usize = 5;

/// Configuration shared by every protocol variant of one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Maximum redirect hops before a `follow` fetch fails.
    pub max_redirects: usize,

    /// Maximum length of a single transport header value.
    ///
    /// Longer JSON header blobs are split into indexed chunks. Must fit the
    /// chunk prefix and one character, so values below
    /// [`MIN_HEADER_VALUE_LEN`] are rejected.
    pub max_header_value_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_header_value_len: DEFAULT_MAX_HEADER_VALUE_LEN,
        }
    }
}

impl ClientConfig {
    /// Checks the configuration; a client never starts with an invalid one.
    pub fn validate(&self) -> Result<()> {
        if self.max_header_value_len < MIN_HEADER_VALUE_LEN {
            return Err(BareClientError::Configuration {
                message: format!(
                    "max_header_value_len must be at least {MIN_HEADER_VALUE_LEN}, got {}",
                    self.max_header_value_len
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_redirects, 20);
        assert_eq!(config.max_header_value_len, 3072);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"max_redirects": 5}"#).unwrap();
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.max_header_value_len, DEFAULT_MAX_HEADER_VALUE_LEN);
    }

    #[test]
    fn tiny_header_limit_is_rejected() {
        for len in [1, 2, MIN_HEADER_VALUE_LEN - 1] {
            let config = ClientConfig {
                max_header_value_len: len,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(BareClientError::Configuration { .. })));
        }
        let config = ClientConfig {
            max_header_value_len: MIN_HEADER_VALUE_LEN,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
