use serde::Deserialize;

use crate::error::{IsolateError, IsolateResult};

/// Length of generated namespace names
pub const NAMESPACE_ID_LENGTH: usize = 10;

/// Characters used for namespace names; none of them needs escaping in SQL
pub const NAMESPACE_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1)
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Connection string used by the client backend
pub const DATABASE_URL_ENV: &str = "PG_ISOLATE_DATABASE_URL";

/// Overrides `IsolatorConfig::id_length`
pub const ID_LENGTH_ENV: &str = "PG_ISOLATE_ID_LENGTH";

/// Seeds the namespace generator, for reproducible runs
pub const SEED_ENV: &str = "PG_ISOLATE_SEED";

/// Settings for an `Isolator`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IsolatorConfig {
    /// Number of characters in generated namespace names
    pub id_length: usize,
    /// Fixed RNG seed; `None` seeds from OS entropy
    pub seed: Option<u64>,
}

impl Default for IsolatorConfig {
    fn default() -> Self {
        Self {
            id_length: NAMESPACE_ID_LENGTH,
            seed: None,
        }
    }
}

impl IsolatorConfig {
    /// Read settings from `PG_ISOLATE_ID_LENGTH` and `PG_ISOLATE_SEED`
    pub fn from_env() -> IsolateResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> IsolateResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ID_LENGTH_ENV) {
            config.id_length = raw.trim().parse().map_err(|e| IsolateError::ConfigError {
                setting: ID_LENGTH_ENV.to_string(),
                value: raw.clone(),
                reason: format!("not a number: {e}"),
            })?;
        }

        if let Some(raw) = lookup(SEED_ENV) {
            let seed = raw.trim().parse().map_err(|e| IsolateError::ConfigError {
                setting: SEED_ENV.to_string(),
                value: raw.clone(),
                reason: format!("not an unsigned integer: {e}"),
            })?;
            config.seed = Some(seed);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a usable namespace name
    pub fn validate(&self) -> IsolateResult<()> {
        if self.id_length == 0 || self.id_length > MAX_IDENTIFIER_LENGTH {
            return Err(IsolateError::ConfigError {
                setting: "id_length".to_string(),
                value: self.id_length.to_string(),
                reason: format!("must be between 1 and {MAX_IDENTIFIER_LENGTH}"),
            });
        }
        Ok(())
    }
}

/// Connection string for the client backend, from `PG_ISOLATE_DATABASE_URL`
pub fn database_url() -> IsolateResult<String> {
    std::env::var(DATABASE_URL_ENV).map_err(|e| IsolateError::ConfigError {
        setting: DATABASE_URL_ENV.to_string(),
        value: String::new(),
        reason: e.to_string(),
    })
}
