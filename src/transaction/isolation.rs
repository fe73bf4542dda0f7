//! Transaction isolation levels.
//!
//! Nested units of work join one ambient transaction, so every unit in a
//! chain must request the same level.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Volatile data can be read but not modified, and no new data can be added.
    #[default]
    Serializable,

    /// Volatile data can be read but not modified.
    RepeatableRead,

    /// Volatile data cannot be read during the transaction, but can be modified.
    ReadCommitted,

    /// Volatile data can be read and modified during the transaction.
    ReadUncommitted,

    /// Reads see a snapshot taken when the transaction started.
    Snapshot,

    /// Pending changes from more highly isolated transactions cannot be overwritten.
    Chaos,

    /// The resource decides.
    Unspecified,
}

impl IsolationLevel {
    /// All levels, in declaration order.
    pub const ALL: [IsolationLevel; 7] = [
        IsolationLevel::Serializable,
        IsolationLevel::RepeatableRead,
        IsolationLevel::ReadCommitted,
        IsolationLevel::ReadUncommitted,
        IsolationLevel::Snapshot,
        IsolationLevel::Chaos,
        IsolationLevel::Unspecified,
    ];
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::Serializable => write!(f, "SERIALIZABLE"),
            IsolationLevel::RepeatableRead => write!(f, "REPEATABLE READ"),
            IsolationLevel::ReadCommitted => write!(f, "READ COMMITTED"),
            IsolationLevel::ReadUncommitted => write!(f, "READ UNCOMMITTED"),
            IsolationLevel::Snapshot => write!(f, "SNAPSHOT"),
            IsolationLevel::Chaos => write!(f, "CHAOS"),
            IsolationLevel::Unspecified => write!(f, "UNSPECIFIED"),
        }
    }
}

/// Parse isolation level from string (SQL syntax).
impl std::str::FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            "REPEATABLE READ" | "REPEATABLE_READ" | "REPEATABLEREAD" => {
                Ok(IsolationLevel::RepeatableRead)
            }
            "READ COMMITTED" | "READ_COMMITTED" | "READCOMMITTED" => {
                Ok(IsolationLevel::ReadCommitted)
            }
            "READ UNCOMMITTED" | "READ_UNCOMMITTED" | "READUNCOMMITTED" => {
                Ok(IsolationLevel::ReadUncommitted)
            }
            "SNAPSHOT" => Ok(IsolationLevel::Snapshot),
            "CHAOS" => Ok(IsolationLevel::Chaos),
            "UNSPECIFIED" => Ok(IsolationLevel::Unspecified),
            _ => Err(format!("unknown isolation level: {}", s)),
        }
    }
}

impl Serialize for IsolationLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IsolationLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_isolation() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::Serializable);
    }

    #[test]
    fn test_parse_isolation() {
        assert_eq!(
            "READ COMMITTED".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            "repeatable_read".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert!("eventually".parse::<IsolationLevel>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        for level in IsolationLevel::ALL {
            assert_eq!(level.to_string().parse::<IsolationLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_serde_uses_sql_names() {
        let json = serde_json::to_string(&IsolationLevel::ReadUncommitted).unwrap();
        assert_eq!(json, "\"READ UNCOMMITTED\"");
        let level: IsolationLevel = serde_json::from_str("\"snapshot\"").unwrap();
        assert_eq!(level, IsolationLevel::Snapshot);
    }
}
