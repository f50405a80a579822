//! ECRI tenant rate changes.

use serde::{Deserialize, Serialize};

use crate::entity::{Domain, Draftable, FacilityId};

/// A proposed rate increase for an occupied unit's tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRateChange {
    pub ecri_id: i64,
    pub facility_id: FacilityId,
    #[serde(default)]
    pub tenant_name: String,
    pub current_rate: f64,
    #[serde(default)]
    pub new_rate: Option<f64>,
    /// Keep the edit but leave this tenant out of the next publish.
    #[serde(default)]
    pub exclude_submit: bool,
}

impl TenantRateChange {
    pub fn new(ecri_id: i64, facility_id: FacilityId, current_rate: f64) -> Self {
        Self {
            ecri_id,
            facility_id,
            tenant_name: String::new(),
            current_rate,
            new_rate: None,
            exclude_submit: false,
        }
    }

    /// Increase over the current rate as a fraction, if a new rate is set.
    pub fn increase_pct(&self) -> Option<f64> {
        let new_rate = self.new_rate?;
        if self.current_rate == 0.0 {
            return None;
        }
        Some((new_rate - self.current_rate) / self.current_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TenantField {
    NewRate,
    ExcludeSubmit,
}

impl Draftable for TenantRateChange {
    type Id = i64;
    type Field = TenantField;

    const DOMAIN: Domain = Domain::Ecri;

    fn id(&self) -> i64 {
        self.ecri_id
    }

    fn facility_id(&self) -> FacilityId {
        self.facility_id
    }

    fn is_rate_field(field: TenantField) -> bool {
        matches!(field, TenantField::NewRate | TenantField::ExcludeSubmit)
    }

    fn excluded_from_publish(&self) -> bool {
        self.exclude_submit
    }
}
