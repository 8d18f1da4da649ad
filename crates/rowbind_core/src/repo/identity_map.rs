//! Per-binding identity map: row id to live instance.
//!
//! # Invariants
//! - At most one instance per row id.
//! - The map never touches storage; clearing it only drops references.

use crate::model::record::Shared;
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;

pub struct IdentityMap<T> {
    record: &'static str,
    entries: HashMap<i64, Shared<T>>,
}

impl<T> IdentityMap<T> {
    pub fn new() -> Self {
        Self {
            record: std::any::type_name::<T>(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, id: i64) -> Option<Shared<T>> {
        self.entries.get(&id).cloned()
    }

    /// Installs `instance` under `id`, or evicts `id` when `instance` is `None`.
    ///
    /// Returns the previously cached instance, if any.
    pub fn set(&mut self, id: i64, instance: Option<Shared<T>>) -> Option<Shared<T>> {
        match instance {
            Some(instance) => {
                let previous = self.entries.insert(id, Rc::clone(&instance));
                let replaced = previous
                    .as_ref()
                    .is_some_and(|previous| !Rc::ptr_eq(previous, &instance));
                debug!(
                    "event=identity_cache_set module=repo record={} id={} replaced={}",
                    self.record, id, replaced
                );
                previous
            }
            None => {
                let previous = self.entries.remove(&id);
                debug!(
                    "event=identity_cache_evict module=repo record={} id={} present={}",
                    self.record,
                    id,
                    previous.is_some()
                );
                previous
            }
        }
    }

    /// Drops every entry and returns how many were cached.
    pub fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        debug!(
            "event=identity_cache_clear module=repo record={} cleared={}",
            self.record, cleared
        );
        cleared
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for IdentityMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
