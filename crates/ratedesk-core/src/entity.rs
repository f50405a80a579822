//! The domain trait shared by every draftable pricing record.

use std::fmt::{self, Debug, Display};
use std::hash::Hash;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend identifier of a storage facility.
pub type FacilityId = i64;

/// A storage facility as the coordinator sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub facility_id: FacilityId,
    #[serde(default)]
    pub name: String,
}

impl Facility {
    pub fn new(facility_id: FacilityId, name: impl Into<String>) -> Self {
        Self {
            facility_id,
            name: name.into(),
        }
    }
}

/// The two pricing domains that stage edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    /// Public asking prices per unit type.
    StreetRates,
    /// Existing customer rate increases, per tenant.
    Ecri,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::StreetRates => "street-rates",
            Domain::Ecri => "ecri",
        }
    }

    /// Durable-store key holding this domain's saved tier.
    pub fn storage_key(&self) -> &'static str {
        match self {
            Domain::StreetRates => "savedRateUnits",
            Domain::Ecri => "savedTenantChanges",
        }
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown domain {0:?} (expected \"street-rates\" or \"ecri\")")]
pub struct ParseDomainError(pub String);

impl FromStr for Domain {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "street-rates" | "street_rates" | "rates" => Ok(Domain::StreetRates),
            "ecri" | "tenants" | "existing-customers" => Ok(Domain::Ecri),
            other => Err(ParseDomainError(other.to_string())),
        }
    }
}

/// A record that can be edited locally, saved, and published.
///
/// Implemented once per domain; the draft state machine, the persistence
/// mirror and the publish coordinator are all generic over it.
pub trait Draftable: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable entity key (`ut_id`, `ecri_id`).
    type Id: Copy + Eq + Ord + Hash + Debug + Display + Serialize + DeserializeOwned + Send + Sync;

    /// Closed set of fields a user can edit.
    type Field: Copy + Eq + Ord + Hash + Debug + Send + Sync;

    const DOMAIN: Domain;

    fn id(&self) -> Self::Id;

    fn facility_id(&self) -> FacilityId;

    /// Whether an edit to `field` changes what gets published.
    ///
    /// Only entities with at least one such field are promoted into the saved
    /// tier after a successful bulk update.
    fn is_rate_field(field: Self::Field) -> bool;

    /// Whether this snapshot should be left out of the next publish.
    fn excluded_from_publish(&self) -> bool {
        false
    }

    fn storage_key() -> &'static str {
        Self::DOMAIN.storage_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_parses_cli_spellings() {
        assert_eq!("street-rates".parse::<Domain>(), Ok(Domain::StreetRates));
        assert_eq!("ECRI".parse::<Domain>(), Ok(Domain::Ecri));
        assert_eq!(" tenants ".parse::<Domain>(), Ok(Domain::Ecri));
        assert!("competitors".parse::<Domain>().is_err());
    }

    #[test]
    fn storage_keys_are_fixed() {
        assert_eq!(Domain::StreetRates.storage_key(), "savedRateUnits");
        assert_eq!(Domain::Ecri.storage_key(), "savedTenantChanges");
    }

    #[test]
    fn domain_display_matches_serde() {
        let json = serde_json::to_string(&Domain::StreetRates).unwrap();
        assert_eq!(json, format!("\"{}\"", Domain::StreetRates));
    }
}
