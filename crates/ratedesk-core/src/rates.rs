//! Street-rate unit types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Domain, Draftable, FacilityId};

/// A priced unit type within a facility.
///
/// Fetched read-only from the backend; a local snapshot becomes a draft once
/// one of its fields is edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateUnit {
    pub ut_id: i64,
    pub facility_id: FacilityId,
    #[serde(default)]
    pub unit_type: String,
    /// Current street rate.
    pub std_rate: f64,
    /// Model-recommended rate.
    #[serde(default)]
    pub rec_rate: Option<f64>,
    /// Proposed rate, `None` until edited.
    #[serde(default)]
    pub new_std_rate: Option<f64>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub lock_expiration: Option<DateTime<Utc>>,
    /// Anchor unit type this one is priced relative to.
    #[serde(default)]
    pub master_ut_id: Option<i64>,
    #[serde(default)]
    pub adjustment_pct: Option<f64>,
    #[serde(default)]
    pub category_guide: Option<String>,
    #[serde(default)]
    pub variance: Option<f64>,
}

impl RateUnit {
    pub fn new(ut_id: i64, facility_id: FacilityId, std_rate: f64) -> Self {
        Self {
            ut_id,
            facility_id,
            unit_type: String::new(),
            std_rate,
            rec_rate: None,
            new_std_rate: None,
            locked: false,
            lock_expiration: None,
            master_ut_id: None,
            adjustment_pct: None,
            category_guide: None,
            variance: None,
        }
    }

    /// The rate that would go live on publish.
    pub fn effective_rate(&self) -> f64 {
        self.new_std_rate.unwrap_or(self.std_rate)
    }

    /// Locked and the lock has not yet expired at `now`.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked && self.lock_expiration.is_none_or(|exp| exp > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RateField {
    NewStdRate,
    Locked,
    LockExpiration,
    /// Master unit type or adjustment percentage.
    Anchor,
}

impl Draftable for RateUnit {
    type Id = i64;
    type Field = RateField;

    const DOMAIN: Domain = Domain::StreetRates;

    fn id(&self) -> i64 {
        self.ut_id
    }

    fn facility_id(&self) -> FacilityId {
        self.facility_id
    }

    fn is_rate_field(field: RateField) -> bool {
        matches!(field, RateField::NewStdRate | RateField::Anchor)
    }
}
