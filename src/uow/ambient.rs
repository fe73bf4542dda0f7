//! Ambient context management.
//!
//! A unit of work never decides alone whether it may commit or release its
//! resources: nested units share the root's transaction, so the decision
//! belongs to whoever tracks the whole chain.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::uow::id::UnitOfWorkId;
use crate::uow::scope::UnitScope;

/// Policy deciding when a unit of work may commit or be disposed.
///
/// Implementations are shared by every unit of a chain and must tolerate
/// concurrent calls from the threads holding sibling units.
pub trait AmbientContextManager: Send + Sync {
    fn can_commit_unit_of_work(&self, unit: &UnitScope) -> bool;

    fn can_dispose_unit_of_work(&self, unit: &UnitScope) -> bool;

    /// Called once the unit has been constructed.
    fn unit_created(&self, _unit: &UnitScope) {}

    /// Called once the unit has released its resources.
    fn unit_disposed(&self, _unit: &UnitScope) {}
}

/// Reference-tracking ambient context manager.
///
/// Keeps every live unit and refuses to let a unit commit while one of its
/// descendants is still open, or be disposed while one of its descendants is
/// still alive.
#[derive(Default)]
pub struct ScopeRegistry {
    live: RwLock<HashMap<UnitOfWorkId, UnitScope>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units created and not yet disposed.
    pub fn live_count(&self) -> usize {
        self.live.read().len()
    }

    pub fn contains(&self, id: UnitOfWorkId) -> bool {
        self.live.read().contains_key(&id)
    }

    fn descendants_of<'a>(
        live: &'a HashMap<UnitOfWorkId, UnitScope>,
        id: UnitOfWorkId,
    ) -> impl Iterator<Item = &'a UnitScope> {
        live.values().filter(move |scope| scope.has_ancestor(id))
    }
}

impl AmbientContextManager for ScopeRegistry {
    fn can_commit_unit_of_work(&self, unit: &UnitScope) -> bool {
        let live = self.live.read();
        let pending = Self::descendants_of(&live, unit.id())
            .filter(|scope| !scope.status().is_terminal())
            .count();
        if pending > 0 {
            tracing::debug!(unit_id = %unit.id(), pending, "descendants still open");
        }
        pending == 0
    }

    fn can_dispose_unit_of_work(&self, unit: &UnitScope) -> bool {
        let live = self.live.read();
        let alive = Self::descendants_of(&live, unit.id()).count();
        if alive > 0 {
            tracing::debug!(unit_id = %unit.id(), alive, "descendants still alive");
        }
        alive == 0
    }

    fn unit_created(&self, unit: &UnitScope) {
        self.live.write().insert(unit.id(), unit.clone());
    }

    fn unit_disposed(&self, unit: &UnitScope) {
        self.live.write().remove(&unit.id());
    }
}

impl std::fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("live_count", &self.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TransactionOptions, TransactionStatus};

    fn register(registry: &ScopeRegistry, parent: Option<&UnitScope>) -> UnitScope {
        let scope = UnitScope::new(parent.cloned(), TransactionOptions::default());
        registry.unit_created(&scope);
        scope
    }

    #[test]
    fn test_parent_waits_for_open_children() {
        let registry = ScopeRegistry::new();
        let root = register(&registry, None);
        let child = register(&registry, Some(&root));
        let grandchild = register(&registry, Some(&child));

        assert!(!registry.can_commit_unit_of_work(&root));
        assert!(!registry.can_commit_unit_of_work(&child));
        assert!(registry.can_commit_unit_of_work(&grandchild));

        grandchild.set_status(TransactionStatus::Committed);
        assert!(registry.can_commit_unit_of_work(&child));
        assert!(!registry.can_commit_unit_of_work(&root));

        child.set_status(TransactionStatus::Aborted);
        assert!(registry.can_commit_unit_of_work(&root));
    }

    #[test]
    fn test_dispose_waits_for_live_children() {
        let registry = ScopeRegistry::new();
        let root = register(&registry, None);
        let child = register(&registry, Some(&root));
        assert_eq!(registry.live_count(), 2);

        assert!(!registry.can_dispose_unit_of_work(&root));
        assert!(registry.can_dispose_unit_of_work(&child));

        registry.unit_disposed(&child);
        assert!(!registry.contains(child.id()));
        assert!(registry.can_dispose_unit_of_work(&root));
    }

    #[test]
    fn test_siblings_do_not_block_each_other() {
        let registry = ScopeRegistry::new();
        let root = register(&registry, None);
        let a = register(&registry, Some(&root));
        let b = register(&registry, Some(&root));

        assert!(registry.can_commit_unit_of_work(&a));
        assert!(registry.can_commit_unit_of_work(&b));
        assert!(registry.can_dispose_unit_of_work(&a));
    }
}
