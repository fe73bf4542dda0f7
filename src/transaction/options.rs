//! Immutable transaction options.

use chrono::TimeDelta;

use crate::transaction::isolation::IsolationLevel;

/// Timeout used when none is configured.
pub const DEFAULT_TRANSACTION_TIMEOUT: TimeDelta = TimeDelta::seconds(60);

/// Options a unit of work opens its transaction with.
///
/// The timeout is signed so an invalid (negative) value coming from
/// configuration survives until construction validates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    isolation_level: IsolationLevel,
    timeout: TimeDelta,
    max_degree_of_parallelism: usize,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation_level: IsolationLevel::default(),
            timeout: DEFAULT_TRANSACTION_TIMEOUT,
            max_degree_of_parallelism: 1,
        }
    }
}

impl TransactionOptions {
    pub fn new(isolation_level: IsolationLevel, timeout: TimeDelta) -> Self {
        Self {
            isolation_level,
            timeout,
            ..Default::default()
        }
    }

    /// Set the isolation level.
    pub fn with_isolation_level(mut self, value: IsolationLevel) -> Self {
        self.isolation_level = value;
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, value: TimeDelta) -> Self {
        self.timeout = value;
        self
    }

    /// Set the max degree of parallelism. Zero is treated as one.
    pub fn with_max_degree_of_parallelism(mut self, value: usize) -> Self {
        self.max_degree_of_parallelism = value.max(1);
        self
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn timeout(&self) -> TimeDelta {
        self.timeout
    }

    pub fn max_degree_of_parallelism(&self) -> usize {
        self.max_degree_of_parallelism
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = TransactionOptions::default();
        assert_eq!(options.isolation_level(), IsolationLevel::Serializable);
        assert_eq!(options.timeout(), TimeDelta::seconds(60));
        assert_eq!(options.max_degree_of_parallelism(), 1);
    }

    #[test]
    fn test_builder_setters() {
        let options = TransactionOptions::new(IsolationLevel::Snapshot, TimeDelta::seconds(5))
            .with_max_degree_of_parallelism(0);
        assert_eq!(options.isolation_level(), IsolationLevel::Snapshot);
        assert_eq!(options.max_degree_of_parallelism(), 1);
        assert_eq!(options.timeout(), TimeDelta::seconds(5));
    }
}
