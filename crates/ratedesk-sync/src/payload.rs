//! Wire payloads for the bulk-update and publish endpoints, per domain.

use ratedesk_core::{Domain, Draftable, FacilityId, RateUnit, TenantRateChange};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    BulkUpdate,
    PublishAll,
    PublishFacility,
    RefreshModel,
}

impl Endpoint {
    pub fn path(&self, domain: Domain) -> String {
        let op = match self {
            Endpoint::BulkUpdate => "bulk-update",
            Endpoint::PublishAll => "publish",
            Endpoint::PublishFacility => "publish-facility",
            Endpoint::RefreshModel => "refresh-model",
        };
        format!("/{domain}/{op}")
    }
}

/// How a domain's entities are shaped on the wire.
pub trait Publishable: Draftable {
    /// Plural noun used in user-facing notices ("rate changes").
    const NOUN: &'static str;

    fn bulk_update_body(facility_id: FacilityId, entities: &[Self]) -> serde_json::Result<Value>;

    fn publish_all_body(entities: &[Self]) -> serde_json::Result<Value>;

    fn publish_facility_body(
        facility_id: FacilityId,
        entities: &[Self],
    ) -> serde_json::Result<Value>;
}

// ── Street rates ──

#[derive(Serialize)]
struct RateBulkUpdate<'a> {
    facility_id: FacilityId,
    units: &'a [RateUnit],
}

/// Per-unit statistics sent when publishing street rates.
#[derive(Debug, Serialize)]
pub struct ChangedUnitStatistic {
    pub ut_id: i64,
    pub facility_id: FacilityId,
    pub std_rate: f64,
    pub new_std_rate: f64,
    pub rec_rate: Option<f64>,
    pub variance: Option<f64>,
}

impl From<&RateUnit> for ChangedUnitStatistic {
    fn from(unit: &RateUnit) -> Self {
        Self {
            ut_id: unit.ut_id,
            facility_id: unit.facility_id,
            std_rate: unit.std_rate,
            new_std_rate: unit.effective_rate(),
            rec_rate: unit.rec_rate,
            variance: unit.variance,
        }
    }
}

#[derive(Serialize)]
struct RateFacilityPublish {
    facility_id: FacilityId,
    changed_unit_statistics: Vec<ChangedUnitStatistic>,
}

impl Publishable for RateUnit {
    const NOUN: &'static str = "rate changes";

    fn bulk_update_body(facility_id: FacilityId, entities: &[Self]) -> serde_json::Result<Value> {
        serde_json::to_value(RateBulkUpdate {
            facility_id,
            units: entities,
        })
    }

    fn publish_all_body(entities: &[Self]) -> serde_json::Result<Value> {
        let stats: Vec<ChangedUnitStatistic> = entities.iter().map(Into::into).collect();
        serde_json::to_value(stats)
    }

    fn publish_facility_body(
        facility_id: FacilityId,
        entities: &[Self],
    ) -> serde_json::Result<Value> {
        serde_json::to_value(RateFacilityPublish {
            facility_id,
            changed_unit_statistics: entities.iter().map(Into::into).collect(),
        })
    }
}

// ── ECRI ──

#[derive(Serialize)]
struct TenantBulkUpdate<'a> {
    facility_id: FacilityId,
    tenants: &'a [TenantRateChange],
}

/// Per-tenant statistics sent when publishing all ECRI changes.
#[derive(Debug, Serialize)]
pub struct TenantStatistic {
    pub ecri_id: i64,
    pub facility_id: FacilityId,
    pub current_rate: f64,
    pub new_rate: Option<f64>,
}

impl From<&TenantRateChange> for TenantStatistic {
    fn from(change: &TenantRateChange) -> Self {
        Self {
            ecri_id: change.ecri_id,
            facility_id: change.facility_id,
            current_rate: change.current_rate,
            new_rate: change.new_rate,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TenantFacilityPublish {
    facility_id: FacilityId,
    ecri_ids: Vec<i64>,
}

impl Publishable for TenantRateChange {
    const NOUN: &'static str = "tenant changes";

    fn bulk_update_body(facility_id: FacilityId, entities: &[Self]) -> serde_json::Result<Value> {
        serde_json::to_value(TenantBulkUpdate {
            facility_id,
            tenants: entities,
        })
    }

    fn publish_all_body(entities: &[Self]) -> serde_json::Result<Value> {
        let stats: Vec<TenantStatistic> = entities.iter().map(Into::into).collect();
        serde_json::to_value(stats)
    }

    fn publish_facility_body(
        facility_id: FacilityId,
        entities: &[Self],
    ) -> serde_json::Result<Value> {
        serde_json::to_value(TenantFacilityPublish {
            facility_id,
            ecri_ids: entities.iter().map(|c| c.ecri_id).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(ut_id: i64, rate: Option<f64>) -> RateUnit {
        let mut unit = RateUnit::new(ut_id, 7, 120.0);
        unit.new_std_rate = rate;
        unit
    }

    #[test]
    fn endpoint_paths() {
        assert_eq!(
            Endpoint::BulkUpdate.path(Domain::StreetRates),
            "/street-rates/bulk-update"
        );
        assert_eq!(
            Endpoint::PublishFacility.path(Domain::Ecri),
            "/ecri/publish-facility"
        );
        assert_eq!(Endpoint::PublishAll.path(Domain::Ecri), "/ecri/publish");
        assert_eq!(
            Endpoint::RefreshModel.path(Domain::StreetRates),
            "/street-rates/refresh-model"
        );
    }

    #[test]
    fn rate_bulk_update_carries_full_units() {
        let body = RateUnit::bulk_update_body(7, &[unit(42, Some(150.0))]).unwrap();
        assert_eq!(body["facility_id"], 7);
        assert_eq!(body["units"][0]["ut_id"], 42);
        assert_eq!(body["units"][0]["new_std_rate"], 150.0);
        assert_eq!(body["units"][0]["locked"], false);
    }

    #[test]
    fn rate_publish_shapes() {
        let units = [unit(42, Some(150.0)), unit(43, None)];
        let all = RateUnit::publish_all_body(&units).unwrap();
        assert!(all.is_array());
        assert_eq!(all[0]["new_std_rate"], 150.0);
        assert_eq!(all[1]["new_std_rate"], 120.0);

        let one = RateUnit::publish_facility_body(7, &units).unwrap();
        assert_eq!(one["facility_id"], 7);
        assert_eq!(one["changed_unit_statistics"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn tenant_publish_facility_uses_camel_case() {
        let changes = [TenantRateChange::new(5, 3, 80.0), TenantRateChange::new(6, 3, 90.0)];
        let body = TenantRateChange::publish_facility_body(3, &changes).unwrap();
        assert_eq!(body, serde_json::json!({ "facilityId": 3, "ecriIds": [5, 6] }));
    }

    #[test]
    fn tenant_bulk_update_lists_tenants() {
        let mut change = TenantRateChange::new(5, 3, 80.0);
        change.new_rate = Some(88.0);
        let body = TenantRateChange::bulk_update_body(3, &[change]).unwrap();
        assert_eq!(body["facility_id"], 3);
        assert_eq!(body["tenants"][0]["ecri_id"], 5);
        assert_eq!(body["tenants"][0]["new_rate"], 88.0);
    }
}
