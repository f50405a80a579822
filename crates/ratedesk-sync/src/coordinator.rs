//! Save and publish orchestration.
//!
//! Local state only moves after the backend confirms: a failed call leaves
//! both tiers exactly as they were.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use ratedesk_core::{DraftSlice, Facility, FacilityId};
use ratedesk_store::{DraftStore, KeyValueStore, StoreError};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::http::{Backend, BackendError};
use crate::notice::Notice;
use crate::payload::{Endpoint, Publishable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Save,
    Publish,
    Refresh,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Save => "save",
            Operation::Publish => "publish",
            Operation::Refresh => "refresh",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Facility(FacilityId),
    All,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Facility(id) => write!(f, "facility {id}"),
            Scope::All => f.write_str("all facilities"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("{operation} already in progress for {scope}")]
    Busy { operation: Operation, scope: Scope },
    #[error("{operation} failed: {source}")]
    Backend {
        operation: Operation,
        #[source]
        source: BackendError,
    },
    #[error("server accepted the {operation} but local storage failed: {source}")]
    Store {
        operation: Operation,
        #[source]
        source: StoreError,
    },
}

impl CoordinatorError {
    pub fn notice(&self) -> Notice {
        match self {
            CoordinatorError::Busy { .. } => Notice::warning(self.to_string()),
            CoordinatorError::Backend { operation, source } => {
                let fallback = match operation {
                    Operation::Save => "Failed to save changes. Please try again.",
                    Operation::Publish => "Failed to publish changes. Please try again.",
                    Operation::Refresh => "Failed to refresh the pricing model.",
                };
                Notice::from_backend_error(fallback, source)
            }
            CoordinatorError::Store { .. } => Notice::error(self.to_string()),
        }
    }
}

/// Either the operation ran, or there was nothing to send.
#[derive(Debug)]
pub enum Outcome<R> {
    Done(R),
    Nothing(Notice),
}

impl<R> Outcome<R> {
    pub fn done(self) -> Option<R> {
        match self {
            Outcome::Done(report) => Some(report),
            Outcome::Nothing(_) => None,
        }
    }

    pub fn map_done<U>(self, f: impl FnOnce(R) -> U) -> Outcome<U> {
        match self {
            Outcome::Done(report) => Outcome::Done(f(report)),
            Outcome::Nothing(notice) => Outcome::Nothing(notice),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub facility_id: FacilityId,
    /// Entities sent in the bulk update.
    pub sent: usize,
    /// Entities with rate edits that entered the saved tier.
    pub promoted: usize,
}

impl SaveReport {
    pub fn notice(&self) -> Notice {
        Notice::success(format!(
            "Saved {} change(s) for facility {}; {} ready to publish.",
            self.sent, self.facility_id, self.promoted
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishReport<Id> {
    pub scope: Scope,
    pub published: Vec<Id>,
    /// Saved entities left out because they opted out of submission.
    pub excluded: usize,
    pub published_at: DateTime<Utc>,
}

impl<Id> PublishReport<Id> {
    pub fn notice(&self) -> Notice {
        let mut message = format!("Published {} change(s) for {}.", self.published.len(), self.scope);
        if self.excluded > 0 {
            message.push_str(&format!(" {} excluded change(s) kept.", self.excluded));
        }
        Notice::success(message)
    }
}

/// Moves one domain's edits through save and publish against the backend.
pub struct PublishCoordinator<T: Publishable, S, B> {
    drafts: Mutex<DraftStore<T, S>>,
    backend: B,
    in_flight: Mutex<HashSet<(Operation, Scope)>>,
    last_published: Mutex<Option<DateTime<Utc>>>,
}

/// Marks an operation in flight until dropped.
struct FlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<(Operation, Scope)>>,
    key: (Operation, Scope),
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(&self.key);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, S, B> PublishCoordinator<T, S, B>
where
    T: Publishable,
    S: KeyValueStore,
    B: Backend,
{
    pub fn new(drafts: DraftStore<T, S>, backend: B) -> Self {
        Self {
            drafts: Mutex::new(drafts),
            backend,
            in_flight: Mutex::new(HashSet::new()),
            last_published: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run `f` against the current draft state.
    pub fn read<R>(&self, f: impl FnOnce(&DraftSlice<T>) -> R) -> R {
        f(lock(&self.drafts).slice())
    }

    pub fn last_published(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_published)
    }

    pub fn is_in_flight(&self, operation: Operation, scope: Scope) -> bool {
        lock(&self.in_flight).contains(&(operation, scope))
    }

    // ── Local edits ──

    pub fn record_edit(&self, facility_id: FacilityId, entity: T, field: T::Field) {
        lock(&self.drafts).record_edit(facility_id, entity, field);
    }

    /// Close a facility row without saving.
    pub fn discard_facility(&self, facility_id: FacilityId) -> usize {
        lock(&self.drafts).discard_facility(facility_id)
    }

    // ── Backend round-trips ──

    /// Send a facility's unsaved edits in one bulk update, then promote the
    /// rate-affecting ones into the saved tier.
    pub async fn save_facility_changes(
        &self,
        facility: &Facility,
    ) -> Result<Outcome<SaveReport>, CoordinatorError> {
        let facility_id = facility.facility_id;
        let _guard = self.begin(Operation::Save, Scope::Facility(facility_id))?;

        let drafts: Vec<_> = self.read(|s| s.unsaved_for(facility_id).into_iter().cloned().collect());
        if drafts.is_empty() {
            info!(domain = %T::DOMAIN, facility_id, "nothing to save");
            return Ok(Outcome::Nothing(Notice::info(format!(
                "No changes to save for {}.",
                display_name(facility)
            ))));
        }

        let entities: Vec<T> = drafts.iter().map(|d| d.entity.clone()).collect();
        let body = T::bulk_update_body(facility_id, &entities)
            .map_err(|e| backend_err(Operation::Save, e.into()))?;
        info!(domain = %T::DOMAIN, facility_id, count = entities.len(), "saving facility changes");
        self.backend
            .post(&Endpoint::BulkUpdate.path(T::DOMAIN), &body)
            .await
            .map_err(|e| {
                warn!(domain = %T::DOMAIN, facility_id, error = %e, "save failed, drafts kept");
                backend_err(Operation::Save, e)
            })?;

        let rate_changes: Vec<T> = drafts
            .into_iter()
            .filter(|d| d.touches_rate())
            .map(|d| d.entity)
            .collect();
        let promoted = rate_changes.len();

        let mut store = lock(&self.drafts);
        store
            .promote_to_saved(rate_changes)
            .map_err(|source| CoordinatorError::Store {
                operation: Operation::Save,
                source,
            })?;
        store.clear_facility_drafts(facility_id);
        info!(domain = %T::DOMAIN, facility_id, sent = entities.len(), promoted, "saved facility changes");

        Ok(Outcome::Done(SaveReport {
            facility_id,
            sent: entities.len(),
            promoted,
        }))
    }

    /// Publish one facility's saved changes.
    pub async fn publish_facility(
        &self,
        facility: &Facility,
    ) -> Result<Outcome<PublishReport<T::Id>>, CoordinatorError> {
        self.publish(Scope::Facility(facility.facility_id)).await
    }

    /// Publish every saved change in the domain.
    pub async fn publish_all(&self) -> Result<Outcome<PublishReport<T::Id>>, CoordinatorError> {
        self.publish(Scope::All).await
    }

    async fn publish(
        &self,
        scope: Scope,
    ) -> Result<Outcome<PublishReport<T::Id>>, CoordinatorError> {
        let _guard = self.begin(Operation::Publish, scope)?;

        let (entities, excluded): (Vec<T>, Vec<T>) = self.read(|s| {
            let saved = match scope {
                Scope::Facility(id) => s.saved_for(id),
                Scope::All => s.saved_changes().iter().collect(),
            };
            saved
                .into_iter()
                .map(|s| s.entity.clone())
                .partition(|e| !e.excluded_from_publish())
        });

        if entities.is_empty() {
            warn!(domain = %T::DOMAIN, %scope, excluded = excluded.len(), "nothing to publish");
            return Ok(Outcome::Nothing(Notice::warning(empty_publish_message::<T>(
                scope,
                excluded.len(),
            ))));
        }

        let (path, body) = match scope {
            Scope::Facility(id) => (
                Endpoint::PublishFacility.path(T::DOMAIN),
                T::publish_facility_body(id, &entities),
            ),
            Scope::All => (
                Endpoint::PublishAll.path(T::DOMAIN),
                T::publish_all_body(&entities),
            ),
        };
        let body = body.map_err(|e| backend_err(Operation::Publish, e.into()))?;

        info!(domain = %T::DOMAIN, %scope, count = entities.len(), "publishing saved changes");
        self.backend.post(&path, &body).await.map_err(|e| {
            warn!(domain = %T::DOMAIN, %scope, error = %e, "publish failed, saved changes kept");
            backend_err(Operation::Publish, e)
        })?;

        let published: Vec<T::Id> = entities.iter().map(|e| e.id()).collect();
        lock(&self.drafts)
            .remove_saved(&published)
            .map_err(|source| CoordinatorError::Store {
                operation: Operation::Publish,
                source,
            })?;

        let published_at = Utc::now();
        *lock(&self.last_published) = Some(published_at);
        info!(domain = %T::DOMAIN, %scope, published = published.len(), "published changes");

        Ok(Outcome::Done(PublishReport {
            scope,
            published,
            excluded: excluded.len(),
            published_at,
        }))
    }

    /// Ask the backend to rerun its pricing model, then drop every unsaved
    /// edit in the domain. The saved tier is kept.
    pub async fn refresh_model(&self) -> Result<(), CoordinatorError> {
        let _guard = self.begin(Operation::Refresh, Scope::All)?;
        info!(domain = %T::DOMAIN, "refreshing pricing model");
        self.backend
            .post(&Endpoint::RefreshModel.path(T::DOMAIN), &json!({}))
            .await
            .map_err(|e| backend_err(Operation::Refresh, e))?;
        lock(&self.drafts).clear_all_drafts();
        Ok(())
    }

    fn begin(&self, operation: Operation, scope: Scope) -> Result<FlightGuard<'_>, CoordinatorError> {
        let key = (operation, scope);
        if !lock(&self.in_flight).insert(key) {
            warn!(domain = %T::DOMAIN, %operation, %scope, "rejected duplicate submission");
            return Err(CoordinatorError::Busy { operation, scope });
        }
        Ok(FlightGuard {
            in_flight: &self.in_flight,
            key,
        })
    }
}

fn backend_err(operation: Operation, source: BackendError) -> CoordinatorError {
    CoordinatorError::Backend { operation, source }
}

fn display_name(facility: &Facility) -> String {
    if facility.name.is_empty() {
        format!("facility {}", facility.facility_id)
    } else {
        facility.name.clone()
    }
}

fn empty_publish_message<T: Publishable>(scope: Scope, excluded: usize) -> String {
    let target = match scope {
        Scope::Facility(_) => " for this facility",
        Scope::All => "",
    };
    if excluded > 0 {
        format!(
            "All saved {}{target} are excluded from submission.",
            T::NOUN
        )
    } else {
        format!(
            "No saved {} to publish{target}. Please save changes first.",
            T::NOUN
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ratedesk_core::{DraftStatus, RateField, RateUnit, TenantField, TenantRateChange};
    use ratedesk_store::{MemoryStore, SavedMirror};
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Records every call; fails with `failure` when set; waits on `gate`
    /// after recording when set.
    #[derive(Clone, Default)]
    struct FakeBackend {
        calls: Arc<Mutex<Vec<(String, Value)>>>,
        failure: Option<(u16, String)>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeBackend {
        fn failing(status: u16, body: &str) -> Self {
            Self {
                failure: Some((status, body.to_string())),
                ..Self::default()
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, Value)> {
            lock(&self.calls).clone()
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn post(&self, path: &str, body: &Value) -> Result<(), BackendError> {
            lock(&self.calls).push((path.to_string(), body.clone()));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.failure {
                Some((status, body)) => Err(BackendError::server(*status, body.clone())),
                None => Ok(()),
            }
        }
    }

    type RateCoordinator = PublishCoordinator<RateUnit, MemoryStore, FakeBackend>;

    fn coordinator(store: &MemoryStore, backend: FakeBackend) -> RateCoordinator {
        PublishCoordinator::new(DraftStore::open(store.clone()), backend)
    }

    fn facility(id: FacilityId) -> Facility {
        Facility::new(id, format!("Facility {id}"))
    }

    fn unit(ut_id: i64, facility_id: FacilityId, rate: f64) -> RateUnit {
        let mut unit = RateUnit::new(ut_id, facility_id, 120.0);
        unit.new_std_rate = Some(rate);
        unit
    }

    fn durable_ids(store: &MemoryStore) -> Vec<i64> {
        SavedMirror::<RateUnit, _>::new(store.clone())
            .load()
            .iter()
            .map(|s| s.id())
            .collect()
    }

    #[tokio::test]
    async fn save_promotes_rate_edits_and_clears_facility() {
        let store = MemoryStore::new();
        let c = coordinator(&store, FakeBackend::default());
        c.record_edit(7, unit(42, 7, 150.0), RateField::NewStdRate);

        let before = Utc::now();
        let report = c.save_facility_changes(&facility(7)).await.unwrap().done().unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.promoted, 1);

        c.read(|s| {
            assert!(s.unsaved_for(7).is_empty());
            assert!(s.changed_facility(7).is_none());
            let saved = s.saved_for(7);
            assert_eq!(saved.len(), 1);
            assert_eq!(saved[0].entity.new_std_rate, Some(150.0));
            assert!(saved[0].saved_at >= before);
        });
        assert_eq!(durable_ids(&store), vec![42]);

        let calls = c.backend().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "/street-rates/bulk-update");
        assert_eq!(calls[0].1["facility_id"], 7);
        assert_eq!(calls[0].1["units"][0]["ut_id"], 42);
    }

    #[tokio::test]
    async fn save_sends_lock_toggles_but_does_not_promote_them() {
        let store = MemoryStore::new();
        let c = coordinator(&store, FakeBackend::default());
        c.record_edit(7, unit(42, 7, 150.0), RateField::NewStdRate);
        let mut locked = RateUnit::new(43, 7, 99.0);
        locked.locked = true;
        c.record_edit(7, locked, RateField::Locked);

        let report = c.save_facility_changes(&facility(7)).await.unwrap().done().unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(report.promoted, 1);
        assert_eq!(c.backend().calls()[0].1["units"].as_array().unwrap().len(), 2);
        c.read(|s| {
            assert_eq!(s.status(43), DraftStatus::Unedited);
            assert_eq!(s.status(42), DraftStatus::Saved);
        });
    }

    #[tokio::test]
    async fn save_only_sends_own_facility() {
        let store = MemoryStore::new();
        let c = coordinator(&store, FakeBackend::default());
        c.record_edit(1, unit(10, 1, 50.0), RateField::NewStdRate);
        c.record_edit(2, unit(20, 2, 60.0), RateField::NewStdRate);

        c.save_facility_changes(&facility(2)).await.unwrap();
        let units = c.backend().calls()[0].1["units"].clone();
        assert_eq!(units.as_array().unwrap().len(), 1);
        assert_eq!(units[0]["ut_id"], 20);
        c.read(|s| {
            assert_eq!(s.pending_count(1), 1);
            assert_eq!(s.status(10), DraftStatus::Unsaved);
        });
    }

    #[tokio::test]
    async fn save_with_nothing_pending_makes_no_call() {
        let store = MemoryStore::new();
        let c = coordinator(&store, FakeBackend::default());
        let outcome = c.save_facility_changes(&facility(7)).await.unwrap();
        assert!(matches!(outcome, Outcome::Nothing(_)));
        assert!(c.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn failed_save_keeps_drafts_and_reports_server_errors() {
        let store = MemoryStore::new();
        let c = coordinator(
            &store,
            FakeBackend::failing(422, r#"{"errors": ["rate exceeds cap"]}"#),
        );
        c.record_edit(7, unit(42, 7, 150.0), RateField::NewStdRate);

        let err = c.save_facility_changes(&facility(7)).await.unwrap_err();
        let notice = err.notice();
        assert!(notice.is_modal());
        assert_eq!(notice.detail, vec!["rate exceeds cap"]);

        c.read(|s| {
            assert_eq!(s.unsaved_for(7).len(), 1);
            assert_eq!(s.saved_count(), 0);
        });
        assert!(store.is_empty());
        assert!(!c.is_in_flight(Operation::Save, Scope::Facility(7)));
    }

    #[tokio::test]
    async fn publish_facility_removes_published_ids_everywhere() {
        let store = MemoryStore::new();
        let c = coordinator(&store, FakeBackend::default());
        c.record_edit(7, unit(42, 7, 150.0), RateField::NewStdRate);
        c.record_edit(8, unit(50, 8, 70.0), RateField::NewStdRate);
        c.save_facility_changes(&facility(7)).await.unwrap();
        c.save_facility_changes(&facility(8)).await.unwrap();

        let report = c.publish_facility(&facility(7)).await.unwrap().done().unwrap();
        assert_eq!(report.published, vec![42]);
        assert_eq!(c.last_published(), Some(report.published_at));

        c.read(|s| {
            assert_eq!(s.status(42), DraftStatus::Unedited);
            assert_eq!(s.saved_for(8).len(), 1);
        });
        assert_eq!(durable_ids(&store), vec![50]);

        let (path, body) = c.backend().calls().pop().unwrap();
        assert_eq!(path, "/street-rates/publish-facility");
        assert_eq!(body["facility_id"], 7);
        assert_eq!(body["changed_unit_statistics"][0]["ut_id"], 42);
        assert_eq!(body["changed_unit_statistics"][0]["new_std_rate"], 150.0);
    }

    #[tokio::test]
    async fn publish_all_sends_flat_statistics() {
        let store = MemoryStore::new();
        let c = coordinator(&store, FakeBackend::default());
        c.record_edit(7, unit(42, 7, 150.0), RateField::NewStdRate);
        c.record_edit(8, unit(50, 8, 70.0), RateField::NewStdRate);
        c.save_facility_changes(&facility(7)).await.unwrap();
        c.save_facility_changes(&facility(8)).await.unwrap();

        let report = c.publish_all().await.unwrap().done().unwrap();
        assert_eq!(report.scope, Scope::All);
        assert_eq!(report.published.len(), 2);
        assert!(durable_ids(&store).is_empty());

        let (path, body) = c.backend().calls().pop().unwrap();
        assert_eq!(path, "/street-rates/publish");
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_publish_warns_without_calling_backend() {
        let store = MemoryStore::new();
        let c = coordinator(&store, FakeBackend::default());
        c.record_edit(8, unit(50, 8, 70.0), RateField::NewStdRate);
        c.save_facility_changes(&facility(8)).await.unwrap();
        let calls_before = c.backend().calls().len();

        let outcome = c.publish_facility(&facility(7)).await.unwrap();
        let Outcome::Nothing(notice) = outcome else {
            panic!("expected nothing to publish");
        };
        assert_eq!(
            notice.message,
            "No saved rate changes to publish for this facility. Please save changes first."
        );
        assert_eq!(c.backend().calls().len(), calls_before);
        c.read(|s| assert_eq!(s.saved_count(), 1));
        assert_eq!(durable_ids(&store), vec![50]);
    }

    #[tokio::test]
    async fn failed_publish_keeps_saved_tier() {
        let store = MemoryStore::new();
        let mut drafts = DraftStore::open(store.clone());
        drafts.promote_to_saved(vec![unit(42, 7, 150.0)]).unwrap();
        let c: RateCoordinator = PublishCoordinator::new(
            drafts,
            FakeBackend::failing(500, r#"{"errors": ["a", "b", "c", "d"]}"#),
        );

        let err = c.publish_facility(&facility(7)).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Backend {
                operation: Operation::Publish,
                ..
            }
        ));
        assert_eq!(err.notice().detail, vec!["a", "b", "c", "... and 1 more"]);
        c.read(|s| assert_eq!(s.saved_count(), 1));
        assert_eq!(durable_ids(&store), vec![42]);
        assert_eq!(c.last_published(), None);
    }

    #[tokio::test]
    async fn reload_restores_saved_tier() {
        let store = MemoryStore::new();
        {
            let c = coordinator(&store, FakeBackend::default());
            c.record_edit(7, unit(42, 7, 150.0), RateField::NewStdRate);
            c.save_facility_changes(&facility(7)).await.unwrap();
        }
        let reloaded = coordinator(&store, FakeBackend::default());
        reloaded.read(|s| {
            assert_eq!(s.status(42), DraftStatus::Saved);
            assert_eq!(s.unsaved_count(), 0);
        });
        let report = reloaded
            .publish_facility(&facility(7))
            .await
            .unwrap()
            .done()
            .unwrap();
        assert_eq!(report.published, vec![42]);
    }

    #[tokio::test]
    async fn excluded_tenants_stay_saved() {
        let store = MemoryStore::new();
        let c: PublishCoordinator<TenantRateChange, _, _> =
            PublishCoordinator::new(DraftStore::open(store.clone()), FakeBackend::default());
        let mut keep = TenantRateChange::new(5, 3, 80.0);
        keep.new_rate = Some(88.0);
        let mut skip = TenantRateChange::new(6, 3, 90.0);
        skip.exclude_submit = true;
        c.record_edit(3, keep, TenantField::NewRate);
        c.record_edit(3, skip, TenantField::ExcludeSubmit);
        c.save_facility_changes(&facility(3)).await.unwrap();

        let report = c.publish_facility(&facility(3)).await.unwrap().done().unwrap();
        assert_eq!(report.published, vec![5]);
        assert_eq!(report.excluded, 1);

        let (path, body) = c.backend().calls().pop().unwrap();
        assert_eq!(path, "/ecri/publish-facility");
        assert_eq!(body, json!({ "facilityId": 3, "ecriIds": [5] }));
        c.read(|s| assert_eq!(s.status(6), DraftStatus::Saved));

        let outcome = c.publish_facility(&facility(3)).await.unwrap();
        let Outcome::Nothing(notice) = outcome else {
            panic!("expected nothing to publish");
        };
        assert_eq!(
            notice.message,
            "All saved tenant changes for this facility are excluded from submission."
        );
    }

    #[tokio::test]
    async fn duplicate_submission_is_rejected_while_in_flight() {
        let store = MemoryStore::new();
        let gate = Arc::new(Notify::new());
        let c = coordinator(&store, FakeBackend::gated(gate.clone()));
        c.record_edit(7, unit(42, 7, 150.0), RateField::NewStdRate);

        let f7 = facility(7);
        let first = c.save_facility_changes(&f7);
        let second = async {
            while c.backend().calls().is_empty() {
                tokio::task::yield_now().await;
            }
            let result = c.save_facility_changes(&f7).await;
            gate.notify_one();
            result
        };
        let (first, second) = tokio::join!(first, second);

        assert!(matches!(first, Ok(Outcome::Done(_))));
        assert!(matches!(
            second,
            Err(CoordinatorError::Busy {
                operation: Operation::Save,
                scope: Scope::Facility(7)
            })
        ));
        assert_eq!(c.backend().calls().len(), 1);
        assert!(!c.is_in_flight(Operation::Save, Scope::Facility(7)));
    }

    #[tokio::test]
    async fn different_facilities_save_concurrently() {
        let store = MemoryStore::new();
        let c = coordinator(&store, FakeBackend::default());
        c.record_edit(1, unit(10, 1, 50.0), RateField::NewStdRate);
        c.record_edit(2, unit(20, 2, 60.0), RateField::NewStdRate);

        let (f1, f2) = (facility(1), facility(2));
        let (a, b) = tokio::join!(c.save_facility_changes(&f1), c.save_facility_changes(&f2));
        assert!(a.is_ok() && b.is_ok());
        c.read(|s| {
            assert_eq!(s.unsaved_count(), 0);
            assert_eq!(s.saved_count(), 2);
        });
        let mut ids = durable_ids(&store);
        ids.sort();
        assert_eq!(ids, vec![10, 20]);
    }

    #[tokio::test]
    async fn refresh_clears_unsaved_but_keeps_saved() {
        let store = MemoryStore::new();
        let c = coordinator(&store, FakeBackend::default());
        c.record_edit(7, unit(42, 7, 150.0), RateField::NewStdRate);
        c.save_facility_changes(&facility(7)).await.unwrap();
        c.record_edit(8, unit(50, 8, 70.0), RateField::NewStdRate);

        c.refresh_model().await.unwrap();
        c.read(|s| {
            assert_eq!(s.unsaved_count(), 0);
            assert!(s.changed_facilities().is_empty());
            assert_eq!(s.saved_count(), 1);
        });
        assert_eq!(
            c.backend().calls().last().unwrap().0,
            "/street-rates/refresh-model"
        );
    }

    #[tokio::test]
    async fn discard_drops_unsaved_without_network() {
        let store = MemoryStore::new();
        let c = coordinator(&store, FakeBackend::default());
        c.record_edit(7, unit(42, 7, 150.0), RateField::NewStdRate);
        assert_eq!(c.discard_facility(7), 1);
        c.read(|s| assert_eq!(s.status(42), DraftStatus::Unedited));
        assert!(c.backend().calls().is_empty());
        assert!(store.is_empty());
    }
}
