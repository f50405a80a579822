//! The saved (publish-ready) tier: timestamped full snapshots.
//!
//! The merge and removal helpers here are shared by the in-memory draft slice
//! and the durable mirror, so both apply exactly the same upsert/filter rules.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Draftable, FacilityId};

/// A full entity snapshot stamped with the time it entered the saved tier.
///
/// Serialises as the entity's own fields plus `saved_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saved<T> {
    #[serde(flatten)]
    pub entity: T,
    pub saved_at: DateTime<Utc>,
}

impl<T: Draftable> Saved<T> {
    pub fn new(entity: T, saved_at: DateTime<Utc>) -> Self {
        Self { entity, saved_at }
    }

    pub fn id(&self) -> T::Id {
        self.entity.id()
    }

    pub fn facility_id(&self) -> FacilityId {
        self.entity.facility_id()
    }
}

/// Upsert `entities` into `saved` by id, stamping each with `now`.
///
/// Existing entries keep their position; new ids are appended in input
/// order. Duplicate ids within `entities` collapse to the last one.
pub fn merge_saved<T: Draftable>(saved: &mut Vec<Saved<T>>, entities: Vec<T>, now: DateTime<Utc>) {
    for entity in entities {
        let id = entity.id();
        match saved.iter_mut().find(|s| s.id() == id) {
            Some(existing) => {
                existing.entity = entity;
                existing.saved_at = now;
            }
            None => saved.push(Saved::new(entity, now)),
        }
    }
}

/// Drop every saved entry whose id is in `ids`. Returns how many were removed.
pub fn remove_saved_ids<T: Draftable>(saved: &mut Vec<Saved<T>>, ids: &[T::Id]) -> usize {
    let ids: HashSet<T::Id> = ids.iter().copied().collect();
    let before = saved.len();
    saved.retain(|s| !ids.contains(&s.id()));
    before - saved.len()
}
