//! Durable mirror of one domain's saved tier.
//!
//! The whole collection lives under a single key as one JSON array of
//! snapshots. Every mutation reads the durable copy, applies the same
//! upsert/filter rules as the in-memory slice, and writes the full array back.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use ratedesk_core::{Draftable, Saved, merge_saved, remove_saved_ids};
use tracing::{info, warn};

use crate::StoreError;
use crate::kv::KeyValueStore;

pub struct SavedMirror<T, S> {
    store: S,
    key: &'static str,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Draftable, S: KeyValueStore> SavedMirror<T, S> {
    /// Mirror `T`'s saved tier under its domain's storage key.
    pub fn new(store: S) -> Self {
        Self {
            store,
            key: T::storage_key(),
            _entity: PhantomData,
        }
    }

    /// Read the durable copy for display or seeding.
    ///
    /// Missing keys, unreadable storage, malformed JSON and snapshots that no
    /// longer match the entity shape all load as an empty collection.
    pub fn load(&self) -> Vec<Saved<T>> {
        self.read().unwrap_or_else(|e| {
            warn!(key = self.key, error = %e, "could not read saved changes, starting empty");
            Vec::new()
        })
    }

    /// Read the durable copy before rewriting it. Storage errors propagate so
    /// a failed read is never mistaken for an empty collection; only
    /// unparseable content is treated as empty.
    fn read(&self) -> Result<Vec<Saved<T>>, StoreError> {
        let Some(raw) = self.store.get(self.key)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<Saved<T>>>(&raw) {
            Ok(saved) => Ok(saved),
            Err(e) => {
                warn!(key = self.key, error = %e, "discarding unparseable saved changes");
                Ok(Vec::new())
            }
        }
    }

    pub fn merge_and_persist(&self, entities: Vec<T>) -> Result<Vec<Saved<T>>, StoreError> {
        self.merge_and_persist_at(entities, Utc::now())
    }

    /// Upsert `entities` by id into the durable copy, stamped with `now`, and
    /// write the result back. Returns the resulting collection.
    pub fn merge_and_persist_at(
        &self,
        entities: Vec<T>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Saved<T>>, StoreError> {
        let count = entities.len();
        let mut saved = self.read()?;
        merge_saved(&mut saved, entities, now);
        self.write(&saved)?;
        info!(key = self.key, merged = count, total = saved.len(), "persisted saved changes");
        Ok(saved)
    }

    /// Drop `ids` from the durable copy and write the result back.
    pub fn remove_and_persist(&self, ids: &[T::Id]) -> Result<Vec<Saved<T>>, StoreError> {
        let mut saved = self.read()?;
        let removed = remove_saved_ids(&mut saved, ids);
        self.write(&saved)?;
        info!(key = self.key, removed, total = saved.len(), "removed saved changes");
        Ok(saved)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(self.key)?;
        info!(key = self.key, "cleared saved changes");
        Ok(())
    }

    fn write(&self, saved: &[Saved<T>]) -> Result<(), StoreError> {
        let json = serde_json::to_string(saved)?;
        self.store.set(self.key, &json)
    }
}
