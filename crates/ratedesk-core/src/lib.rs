pub mod draft;
pub mod entity;
pub mod rates;
pub mod saved;
pub mod tenants;

pub use draft::{ChangedFacility, Draft, DraftSlice, DraftStatus};
pub use entity::{Domain, Draftable, Facility, FacilityId, ParseDomainError};
pub use rates::{RateField, RateUnit};
pub use saved::{Saved, merge_saved, remove_saved_ids};
pub use tenants::{TenantField, TenantRateChange};
