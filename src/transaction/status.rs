//! Transaction and unit-of-work status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a transaction or of a unit of work.
///
/// Units start `InDoubt`; a transaction handle starts `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Not yet committing (unit of work) or outcome unknown.
    InDoubt = 0,
    /// Commit in progress (unit of work) or still open (transaction).
    Active = 1,
    Committed = 2,
    Aborted = 3,
}

impl TransactionStatus {
    /// Check if no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::Aborted)
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TransactionStatus::Active,
            2 => TransactionStatus::Committed,
            3 => TransactionStatus::Aborted,
            _ => TransactionStatus::InDoubt,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::InDoubt => write!(f, "in doubt"),
            TransactionStatus::Active => write!(f, "active"),
            TransactionStatus::Committed => write!(f, "committed"),
            TransactionStatus::Aborted => write!(f, "aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_conversion() {
        for status in [
            TransactionStatus::InDoubt,
            TransactionStatus::Active,
            TransactionStatus::Committed,
            TransactionStatus::Aborted,
        ] {
            assert_eq!(TransactionStatus::from_u8(status.as_u8()), status);
        }
    }

    #[test]
    fn test_terminal() {
        assert!(TransactionStatus::Committed.is_terminal());
        assert!(TransactionStatus::Aborted.is_terminal());
        assert!(!TransactionStatus::Active.is_terminal());
        assert!(!TransactionStatus::InDoubt.is_terminal());
    }
}
