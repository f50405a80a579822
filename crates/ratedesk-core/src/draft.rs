//! In-memory draft state for one pricing domain.
//!
//! Per entity id the lifecycle is
//!
//! ```text
//! Unedited --record_edit--> Unsaved --promote_to_saved--> Saved --remove_saved--> (published)
//!     ^                        |
//!     +--clear_facility_drafts-+
//! ```
//!
//! There is no direct edge between `Unedited` and `Saved`. Every operation is
//! a pure reducer; none of them can fail.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::entity::{Draftable, FacilityId};
use crate::saved::{Saved, merge_saved, remove_saved_ids};

/// An unsaved snapshot plus every field edited since the last save.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft<T: Draftable> {
    pub facility_id: FacilityId,
    pub entity: T,
    pub fields: BTreeSet<T::Field>,
}

impl<T: Draftable> Draft<T> {
    pub fn id(&self) -> T::Id {
        self.entity.id()
    }

    /// Whether any edited field affects what gets published.
    pub fn touches_rate(&self) -> bool {
        self.fields.iter().any(|f| T::is_rate_field(*f))
    }
}

/// A facility with the entities that currently carry unsaved edits.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedFacility<T> {
    pub facility_id: FacilityId,
    pub entities: Vec<T>,
}

/// Where an entity id sits in the staging lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStatus {
    Unedited,
    Unsaved,
    Saved,
    /// Saved earlier, then edited again without saving.
    UnsavedOverSaved,
}

#[derive(Debug, Clone)]
pub struct DraftSlice<T: Draftable> {
    new_changes: Vec<Draft<T>>,
    saved_changes: Vec<Saved<T>>,
    changed_facilities: Vec<ChangedFacility<T>>,
}

impl<T: Draftable> Default for DraftSlice<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Draftable> DraftSlice<T> {
    pub fn new() -> Self {
        Self::with_saved(Vec::new())
    }

    /// Start from a saved tier loaded from durable storage.
    pub fn with_saved(saved_changes: Vec<Saved<T>>) -> Self {
        Self {
            new_changes: Vec::new(),
            saved_changes,
            changed_facilities: Vec::new(),
        }
    }

    // ── Reducers ──

    /// Record an edit of `field` on `entity`, a full snapshot with the edit
    /// already applied.
    ///
    /// An entity belongs to one facility aggregate at a time: editing it under
    /// a different facility moves it out of the old aggregate, which is
    /// dropped once empty.
    pub fn record_edit(&mut self, facility_id: FacilityId, entity: T, field: T::Field) {
        let id = entity.id();
        debug!(domain = %T::DOMAIN, facility_id, %id, ?field, "recording edit");

        for changed in self
            .changed_facilities
            .iter_mut()
            .filter(|c| c.facility_id != facility_id)
        {
            let before = changed.entities.len();
            changed.entities.retain(|e| e.id() != id);
            if changed.entities.len() != before {
                debug!(
                    domain = %T::DOMAIN,
                    from = changed.facility_id,
                    to = facility_id,
                    %id,
                    "moved draft between facilities"
                );
            }
        }
        self.changed_facilities
            .retain(|c| c.facility_id == facility_id || !c.entities.is_empty());

        match self.new_changes.iter_mut().find(|d| d.id() == id) {
            Some(draft) => {
                draft.facility_id = facility_id;
                draft.entity = entity.clone();
                draft.fields.insert(field);
            }
            None => self.new_changes.push(Draft {
                facility_id,
                entity: entity.clone(),
                fields: BTreeSet::from([field]),
            }),
        }

        match self
            .changed_facilities
            .iter_mut()
            .find(|c| c.facility_id == facility_id)
        {
            Some(changed) => match changed.entities.iter_mut().find(|e| e.id() == id) {
                Some(existing) => *existing = entity,
                None => changed.entities.push(entity),
            },
            None => self.changed_facilities.push(ChangedFacility {
                facility_id,
                entities: vec![entity],
            }),
        }
    }

    /// Forget a facility's unsaved edits. Returns the number of drafts dropped.
    pub fn clear_facility_drafts(&mut self, facility_id: FacilityId) -> usize {
        let Some(pos) = self
            .changed_facilities
            .iter()
            .position(|c| c.facility_id == facility_id)
        else {
            return 0;
        };
        let changed = self.changed_facilities.remove(pos);
        let ids: HashSet<T::Id> = changed.entities.iter().map(|e| e.id()).collect();
        let before = self.new_changes.len();
        self.new_changes.retain(|d| !ids.contains(&d.id()));
        before - self.new_changes.len()
    }

    pub fn promote_to_saved(&mut self, entities: Vec<T>) {
        self.promote_to_saved_at(entities, Utc::now());
    }

    /// Upsert `entities` into the saved tier stamped with `now`, then drop
    /// them from the unsaved tier.
    pub fn promote_to_saved_at(&mut self, entities: Vec<T>, now: DateTime<Utc>) {
        let ids: HashSet<T::Id> = entities.iter().map(|e| e.id()).collect();
        merge_saved(&mut self.saved_changes, entities, now);
        self.new_changes.retain(|d| !ids.contains(&d.id()));
    }

    pub fn remove_saved(&mut self, ids: &[T::Id]) -> usize {
        remove_saved_ids(&mut self.saved_changes, ids)
    }

    /// Domain-wide reset of the unsaved tier.
    pub fn clear_all_drafts(&mut self) {
        self.new_changes.clear();
        self.changed_facilities.clear();
    }

    /// Replace the saved tier with the collection returned by the durable mirror.
    pub fn sync_saved(&mut self, saved: Vec<Saved<T>>) {
        self.saved_changes = saved;
    }

    // ── Selectors ──

    pub fn new_changes(&self) -> &[Draft<T>] {
        &self.new_changes
    }

    pub fn saved_changes(&self) -> &[Saved<T>] {
        &self.saved_changes
    }

    pub fn changed_facilities(&self) -> &[ChangedFacility<T>] {
        &self.changed_facilities
    }

    pub fn changed_facility(&self, facility_id: FacilityId) -> Option<&ChangedFacility<T>> {
        self.changed_facilities
            .iter()
            .find(|c| c.facility_id == facility_id)
    }

    pub fn unsaved_for(&self, facility_id: FacilityId) -> Vec<&Draft<T>> {
        self.new_changes
            .iter()
            .filter(|d| d.facility_id == facility_id)
            .collect()
    }

    pub fn saved_for(&self, facility_id: FacilityId) -> Vec<&Saved<T>> {
        self.saved_changes
            .iter()
            .filter(|s| s.facility_id() == facility_id)
            .collect()
    }

    /// Number of entities with unsaved edits in `facility_id`.
    pub fn pending_count(&self, facility_id: FacilityId) -> usize {
        self.changed_facility(facility_id)
            .map_or(0, |c| c.entities.len())
    }

    pub fn unsaved_count(&self) -> usize {
        self.new_changes.len()
    }

    pub fn saved_count(&self) -> usize {
        self.saved_changes.len()
    }

    /// Latest known snapshot of `id`: unsaved first, then saved.
    pub fn snapshot(&self, id: T::Id) -> Option<&T> {
        self.new_changes
            .iter()
            .find(|d| d.id() == id)
            .map(|d| &d.entity)
            .or_else(|| {
                self.saved_changes
                    .iter()
                    .find(|s| s.id() == id)
                    .map(|s| &s.entity)
            })
    }

    pub fn status(&self, id: T::Id) -> DraftStatus {
        let unsaved = self.new_changes.iter().any(|d| d.id() == id);
        let saved = self.saved_changes.iter().any(|s| s.id() == id);
        match (unsaved, saved) {
            (false, false) => DraftStatus::Unedited,
            (true, false) => DraftStatus::Unsaved,
            (false, true) => DraftStatus::Saved,
            (true, true) => DraftStatus::UnsavedOverSaved,
        }
    }
}
