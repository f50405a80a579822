//! Draft slice plus durable mirror, kept in lock-step.

use std::ops::Deref;

use chrono::Utc;
use ratedesk_core::{DraftSlice, Draftable, FacilityId};
use tracing::info;

use crate::StoreError;
use crate::kv::KeyValueStore;
use crate::mirror::SavedMirror;

/// The draft state for one domain, with the saved tier written through to
/// durable storage on every change.
///
/// Read access goes through [`Deref`] to the underlying [`DraftSlice`]; the
/// methods here are the only way to mutate it.
pub struct DraftStore<T: Draftable, S> {
    slice: DraftSlice<T>,
    mirror: SavedMirror<T, S>,
}

impl<T: Draftable, S: KeyValueStore> DraftStore<T, S> {
    /// Seed the saved tier from the durable copy.
    pub fn open(store: S) -> Self {
        Self::from_mirror(SavedMirror::new(store))
    }

    pub fn from_mirror(mirror: SavedMirror<T, S>) -> Self {
        let saved = mirror.load();
        info!(domain = %T::DOMAIN, saved = saved.len(), "loaded saved changes");
        Self {
            slice: DraftSlice::with_saved(saved),
            mirror,
        }
    }

    pub fn slice(&self) -> &DraftSlice<T> {
        &self.slice
    }

    pub fn mirror(&self) -> &SavedMirror<T, S> {
        &self.mirror
    }

    pub fn record_edit(&mut self, facility_id: FacilityId, entity: T, field: T::Field) {
        self.slice.record_edit(facility_id, entity, field);
    }

    pub fn clear_facility_drafts(&mut self, facility_id: FacilityId) -> usize {
        self.slice.clear_facility_drafts(facility_id)
    }

    /// Close a facility without saving; its unsaved edits are dropped.
    pub fn discard_facility(&mut self, facility_id: FacilityId) -> usize {
        let dropped = self.slice.clear_facility_drafts(facility_id);
        info!(domain = %T::DOMAIN, facility_id, dropped, "discarded unsaved changes");
        dropped
    }

    pub fn clear_all_drafts(&mut self) {
        self.slice.clear_all_drafts();
    }

    /// Persist `entities` into the durable saved tier, then sync memory to it.
    ///
    /// If the durable write fails neither tier changes.
    pub fn promote_to_saved(&mut self, entities: Vec<T>) -> Result<(), StoreError> {
        let now = Utc::now();
        let saved = self.mirror.merge_and_persist_at(entities.clone(), now)?;
        self.slice.sync_saved(saved);
        self.slice.promote_to_saved_at(entities, now);
        Ok(())
    }

    /// Drop published ids from the durable saved tier and from memory.
    pub fn remove_saved(&mut self, ids: &[T::Id]) -> Result<(), StoreError> {
        let saved = self.mirror.remove_and_persist(ids)?;
        self.slice.sync_saved(saved);
        self.slice.remove_saved(ids);
        Ok(())
    }

    /// Delete the durable saved tier and empty the in-memory one.
    pub fn clear_saved(&mut self) -> Result<(), StoreError> {
        self.mirror.clear()?;
        self.slice.sync_saved(Vec::new());
        Ok(())
    }
}

impl<T: Draftable, S> Deref for DraftStore<T, S> {
    type Target = DraftSlice<T>;

    fn deref(&self) -> &DraftSlice<T> {
        &self.slice
    }
}
