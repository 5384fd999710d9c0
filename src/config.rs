//! Environment-driven configuration (A3), options per spec.md §9.

use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}")]
    InvalidValue { var: &'static str, expected: &'static str },
}

/// Recognized options: `storage_path`, `busy_retry_max`,
/// `busy_retry_initial_ms`, `equity_account_code`,
/// `default_protocol_series`.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: String,
    pub busy_retry_max: u32,
    pub busy_retry_initial_ms: u64,
    pub equity_account_code: String,
    pub default_protocol_series: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: "ledger.db".to_string(),
            busy_retry_max: 5,
            busy_retry_initial_ms: 150,
            equity_account_code: "9999".to_string(),
            default_protocol_series: "GEN".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Config::default();

        let storage_path = env::var("STORAGE_PATH").unwrap_or(default.storage_path);

        let busy_retry_max = match env::var("BUSY_RETRY_MAX") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                var: "BUSY_RETRY_MAX",
                expected: "u32",
            })?,
            Err(_) => default.busy_retry_max,
        };

        let busy_retry_initial_ms = match env::var("BUSY_RETRY_INITIAL_MS") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                var: "BUSY_RETRY_INITIAL_MS",
                expected: "u64",
            })?,
            Err(_) => default.busy_retry_initial_ms,
        };

        let equity_account_code =
            env::var("EQUITY_ACCOUNT_CODE").unwrap_or(default.equity_account_code);

        let default_protocol_series =
            env::var("DEFAULT_PROTOCOL_SERIES").unwrap_or(default.default_protocol_series);

        Ok(Config {
            storage_path,
            busy_retry_max,
            busy_retry_initial_ms,
            equity_account_code,
            default_protocol_series,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.storage_path, "ledger.db");
        assert_eq!(c.busy_retry_max, 5);
        assert_eq!(c.busy_retry_initial_ms, 150);
        assert_eq!(c.equity_account_code, "9999");
        assert_eq!(c.default_protocol_series, "GEN");
    }
}
