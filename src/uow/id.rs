//! Unit of work identity.

use std::fmt;

use ulid::Ulid;

/// Opaque identifier assigned to a unit of work at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitOfWorkId(Ulid);

impl UnitOfWorkId {
    /// Generate a new unique id.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for UnitOfWorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UnitOfWorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_string().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = UnitOfWorkId::new();
        let b = UnitOfWorkId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 26);
        assert_eq!(a.to_string(), a.to_string().to_lowercase());
    }
}
