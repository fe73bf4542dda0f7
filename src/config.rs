//! Persistence configuration.
//!
//! Supplies the defaults a unit of work opens its transaction with. The
//! defaults are passed explicitly into construction; nothing is read from
//! process-wide state.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::{IsolationLevel, TransactionOptions, DEFAULT_TRANSACTION_TIMEOUT};

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transaction timeout must not be negative, got {0}ms")]
    NegativeTimeout(i64),

    #[error("max degree of parallelism must be at least 1")]
    ZeroParallelism,
}

/// Persistence options, usually loaded from a JSON configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistenceOptions {
    /// Transaction timeout in milliseconds. Unset means the default.
    pub transaction_timeout_ms: Option<i64>,
    /// Workers used when committing several units at once. Unset means 1.
    pub max_degree_of_parallelism: Option<usize>,
    /// Isolation level for units opened from these options.
    pub isolation_level: IsolationLevel,
}

impl PersistenceOptions {
    /// Parse and validate options from JSON.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Check that configured values are usable.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(ms) = self.transaction_timeout_ms {
            if ms < 0 {
                return Err(ConfigError::NegativeTimeout(ms));
            }
        }
        if self.max_degree_of_parallelism == Some(0) {
            return Err(ConfigError::ZeroParallelism);
        }
        Ok(())
    }

    /// Set the transaction timeout.
    pub fn transaction_timeout(mut self, value: TimeDelta) -> Self {
        self.transaction_timeout_ms = Some(value.num_milliseconds());
        self
    }

    /// Set the max degree of parallelism.
    pub fn max_degree_of_parallelism(mut self, value: usize) -> Self {
        self.max_degree_of_parallelism = Some(value);
        self
    }

    /// Set the isolation level.
    pub fn isolation_level(mut self, value: IsolationLevel) -> Self {
        self.isolation_level = value;
        self
    }

    /// Effective timeout.
    pub fn effective_timeout(&self) -> TimeDelta {
        self.transaction_timeout_ms
            .map(TimeDelta::milliseconds)
            .unwrap_or(DEFAULT_TRANSACTION_TIMEOUT)
    }

    /// Effective max degree of parallelism.
    pub fn effective_max_degree_of_parallelism(&self) -> usize {
        self.max_degree_of_parallelism.unwrap_or(1)
    }

    /// Transaction options derived from these settings.
    pub fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions::new(self.isolation_level, self.effective_timeout())
            .with_max_degree_of_parallelism(self.effective_max_degree_of_parallelism())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = PersistenceOptions::default();
        assert_eq!(options.effective_timeout(), DEFAULT_TRANSACTION_TIMEOUT);
        assert_eq!(options.effective_max_degree_of_parallelism(), 1);
        assert_eq!(options.transaction_options(), TransactionOptions::default());
    }

    #[test]
    fn test_from_json() {
        let options = PersistenceOptions::from_json_str(
            r#"{"transactionTimeoutMs": 1500, "maxDegreeOfParallelism": 4, "isolationLevel": "read committed"}"#,
        )
        .unwrap();

        let tx = options.transaction_options();
        assert_eq!(tx.timeout(), TimeDelta::milliseconds(1500));
        assert_eq!(tx.max_degree_of_parallelism(), 4);
        assert_eq!(tx.isolation_level(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let options = PersistenceOptions::from_json_str("{}").unwrap();
        assert_eq!(options, PersistenceOptions::default());
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            PersistenceOptions::from_json_str(r#"{"transactionTimeoutMs": -1}"#),
            Err(ConfigError::NegativeTimeout(-1))
        ));
        assert!(matches!(
            PersistenceOptions::from_json_str(r#"{"maxDegreeOfParallelism": 0}"#),
            Err(ConfigError::ZeroParallelism)
        ));
        assert!(matches!(
            PersistenceOptions::from_json_str("not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_builder_setters() {
        let options = PersistenceOptions::default()
            .transaction_timeout(TimeDelta::seconds(2))
            .max_degree_of_parallelism(3)
            .isolation_level(IsolationLevel::Snapshot);
        assert_eq!(options.transaction_timeout_ms, Some(2000));
        assert_eq!(options.transaction_options().isolation_level(), IsolationLevel::Snapshot);
    }
}
