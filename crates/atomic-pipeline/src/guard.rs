//! In-process exclusion of concurrent runs against the same note.
//!
//! This only covers runs inside one process. Two processes sharing a
//! database can still race on the same note.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

/// Set of notes with an active run. Clones share the set.
#[derive(Clone, Default)]
pub struct RunRegistry {
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark `note_id` as running. `None` if a run already holds it.
    pub fn try_acquire(&self, note_id: Uuid) -> Option<RunLease> {
        if self.active().insert(note_id) {
            Some(RunLease {
                registry: self.clone(),
                note_id,
            })
        } else {
            None
        }
    }

    pub fn is_running(&self, note_id: Uuid) -> bool {
        self.active().contains(&note_id)
    }

    pub fn active_count(&self) -> usize {
        self.active().len()
    }
}

/// Held for the duration of a run; releases the note on drop.
pub struct RunLease {
    registry: RunRegistry,
    note_id: Uuid,
}

impl RunLease {
    pub fn note_id(&self) -> Uuid {
        self.note_id
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        self.registry.active().remove(&self.note_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let registry = RunRegistry::new();
        let id = Uuid::new_v4();

        let lease = registry.try_acquire(id).unwrap();
        assert_eq!(lease.note_id(), id);
        assert!(registry.is_running(id));
        assert!(registry.try_acquire(id).is_none());

        drop(lease);
        assert!(!registry.is_running(id));
        assert!(registry.try_acquire(id).is_some());
    }

    #[test]
    fn test_distinct_notes_run_independently() {
        let registry = RunRegistry::new();
        let _a = registry.try_acquire(Uuid::new_v4()).unwrap();
        let _b = registry.try_acquire(Uuid::new_v4()).unwrap();
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = RunRegistry::new();
        let id = Uuid::new_v4();
        let _lease = registry.try_acquire(id).unwrap();
        assert!(registry.clone().try_acquire(id).is_none());
    }
}
