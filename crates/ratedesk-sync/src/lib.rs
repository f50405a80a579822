//! Backend sync: the pricing API client, wire payloads, and the save/publish
//! coordinator.

pub mod coordinator;
pub mod http;
pub mod notice;
pub mod payload;

pub use coordinator::{
    CoordinatorError, Operation, Outcome, PublishCoordinator, PublishReport, SaveReport, Scope,
};
pub use http::{Backend, BackendError, ClientConfig, ErrorBody, HttpBackend};
pub use notice::{Level, Notice};
pub use payload::{Endpoint, Publishable};
