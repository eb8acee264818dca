//! Per-entity advisory locks.
//!
//! Appends to one entity's state history must be serialized so two ingest
//! threads cannot interleave their read-merge-append cycles; appends to
//! unrelated entities proceed in parallel. Locks are acquired for the
//! duration of one append and never held across collaborator calls.

use crate::models::EntityId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Registry handing out one advisory lock per entity id.
///
/// Lock handles are `Arc<Mutex<()>>`; two callers asking for the same
/// entity get the same mutex. Entries are never evicted, entity ids are
/// few relative to states.
#[derive(Debug, Default)]
pub struct EntityLockRegistry {
    locks: Mutex<HashMap<EntityId, Arc<Mutex<()>>>>,
}

impl EntityLockRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock handle for an entity, creating it on first use.
    #[must_use]
    pub fn lock_for(&self, entity_id: EntityId) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(entity_id).or_default())
    }

    /// Runs `f` while holding the entity's lock.
    ///
    /// A poisoned lock is recovered rather than propagated; the protected
    /// section only orders appends and holds no invariant of its own.
    pub fn with_entity<R>(&self, entity_id: EntityId, f: impl FnOnce() -> R) -> R {
        let handle = self.lock_for(entity_id);
        let _guard = match handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_same_entity_gets_same_lock() {
        let registry = EntityLockRegistry::new();
        let id = EntityId::generate();
        let a = registry.lock_for(id);
        let b = registry.lock_for(id);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &registry.lock_for(EntityId::generate())));
    }

    #[test]
    fn test_with_entity_serializes_appends() {
        let registry = Arc::new(EntityLockRegistry::new());
        let id = EntityId::generate();
        let counter = Arc::new(Mutex::new(0u32));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    registry.with_entity(id, || {
                        let mut count = counter.lock().unwrap();
                        *count += 1;
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 8);
    }
}
