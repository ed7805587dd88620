// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Typed per-party storage for in-flight round state.
//!
//! Each participant owns a [`LocalStorage`] that maps a (type tag, party)
//! pair to a value. Type tags are zero-sized marker types implementing
//! [`TypeTag`]; the associated `Value` is what gets stored. This gives each
//! round a namespaced, type-checked place to put received material without
//! threading dozens of fields through the participant struct.

use crate::{
    errors::{InternalError, Result},
    protocol::ParticipantIdentifier,
};
use std::{
    any::{Any, TypeId},
    collections::{HashMap, HashSet},
};
use tracing::error;

/// A marker type naming a storage slot.
pub(crate) trait TypeTag: 'static {
    /// The value stored under this tag.
    type Value: Send + Sync;
}

/// Typed storage indexed by (tag, party).
#[derive(Default)]
pub(crate) struct LocalStorage {
    storage: HashMap<(TypeId, ParticipantIdentifier), Box<dyn Any + Send + Sync>>,
    completed: HashSet<&'static str>,
}

impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values are type-erased (and often secret); print the shape only.
        f.debug_struct("LocalStorage")
            .field("entries", &self.storage.len())
            .field("completed", &self.completed)
            .finish()
    }
}

impl LocalStorage {
    /// Store a value, overwriting any previous value under the same
    /// (tag, party) pair.
    pub(crate) fn store<T: TypeTag>(&mut self, pid: ParticipantIdentifier, value: T::Value) {
        let _ = self
            .storage
            .insert((TypeId::of::<T>(), pid), Box::new(value));
    }

    /// Store a value, failing if one is already present.
    ///
    /// Used for values received from other parties, where a duplicate
    /// indicates a protocol violation.
    pub(crate) fn store_once<T: TypeTag>(
        &mut self,
        pid: ParticipantIdentifier,
        value: T::Value,
    ) -> Result<()> {
        if self.contains::<T>(pid) {
            error!("tried to store a second value under an existing tag for {pid}");
            return Err(InternalError::InternalInvariantFailed);
        }
        self.store::<T>(pid, value);
        Ok(())
    }

    /// Retrieve a reference to a stored value, failing if absent.
    pub(crate) fn retrieve<T: TypeTag>(&self, pid: ParticipantIdentifier) -> Result<&T::Value> {
        self.storage
            .get(&(TypeId::of::<T>(), pid))
            .and_then(|any| any.downcast_ref::<T::Value>())
            .ok_or_else(|| {
                error!("expected a stored value for {pid} but found none");
                InternalError::InternalInvariantFailed
            })
    }

    /// Retrieve a mutable reference to a stored value, failing if absent.
    pub(crate) fn retrieve_mut<T: TypeTag>(
        &mut self,
        pid: ParticipantIdentifier,
    ) -> Result<&mut T::Value> {
        self.storage
            .get_mut(&(TypeId::of::<T>(), pid))
            .and_then(|any| any.downcast_mut::<T::Value>())
            .ok_or_else(|| {
                error!("expected a stored value for {pid} but found none");
                InternalError::InternalInvariantFailed
            })
    }

    /// Remove and return a stored value, failing if absent.
    pub(crate) fn remove<T: TypeTag>(&mut self, pid: ParticipantIdentifier) -> Result<T::Value> {
        self.storage
            .remove(&(TypeId::of::<T>(), pid))
            .and_then(|any| any.downcast::<T::Value>().ok())
            .map(|boxed| *boxed)
            .ok_or_else(|| {
                error!("expected a stored value for {pid} but found none");
                InternalError::InternalInvariantFailed
            })
    }

    /// Whether a value is stored for the given (tag, party) pair.
    pub(crate) fn contains<T: TypeTag>(&self, pid: ParticipantIdentifier) -> bool {
        self.storage.contains_key(&(TypeId::of::<T>(), pid))
    }

    /// Whether a value is stored under the tag for _every_ listed party.
    pub(crate) fn contains_for_all_ids<T: TypeTag>(&self, pids: &[ParticipantIdentifier]) -> bool {
        pids.iter().all(|pid| self.contains::<T>(*pid))
    }

    /// Record that a once-only step ran; returns `true` the first time.
    ///
    /// Backs the `run_only_once!` macro.
    pub(crate) fn mark_done_once(&mut self, step: &'static str) -> bool {
        self.completed.insert(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Share;
    impl TypeTag for Share {
        type Value = u64;
    }

    #[test]
    fn store_and_retrieve() {
        let mut storage = LocalStorage::default();
        let pid = ParticipantIdentifier::from_u128(1);
        assert!(!storage.contains::<Share>(pid));
        assert!(storage.retrieve::<Share>(pid).is_err());

        storage.store::<Share>(pid, 42);
        assert!(storage.contains::<Share>(pid));
        assert_eq!(*storage.retrieve::<Share>(pid).unwrap(), 42);
        assert_eq!(storage.remove::<Share>(pid).unwrap(), 42);
        assert!(!storage.contains::<Share>(pid));
    }

    #[test]
    fn store_once_rejects_duplicates() {
        let mut storage = LocalStorage::default();
        let pid = ParticipantIdentifier::from_u128(2);
        assert!(storage.store_once::<Share>(pid, 1).is_ok());
        assert!(storage.store_once::<Share>(pid, 2).is_err());
    }

    #[test]
    fn contains_for_all_ids_requires_every_party() {
        let mut storage = LocalStorage::default();
        let pids: Vec<_> = (0..3).map(ParticipantIdentifier::from_u128).collect();
        for pid in &pids[..2] {
            storage.store::<Share>(*pid, 0);
        }
        assert!(!storage.contains_for_all_ids::<Share>(&pids));
        storage.store::<Share>(pids[2], 0);
        assert!(storage.contains_for_all_ids::<Share>(&pids));
    }

    #[test]
    fn mark_done_once_is_sticky() {
        let mut storage = LocalStorage::default();
        assert!(storage.mark_done_once("step"));
        assert!(!storage.mark_done_once("step"));
        assert!(storage.mark_done_once("other_step"));
    }
}
