//! Tick scheduling and status persistence.
//!
//! A `Scheduler` owns the orchestrator, the status store and the failure
//! tracker. Each call to `tick` loads the instance's status, runs the stage
//! list once under a fresh deadline, writes the status back in one write and
//! tells the caller when to come back.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::convergence::orchestrator::{Orchestrator, TickResult};
use crate::convergence::retry::{FailureTracker, RetryPolicy};
use crate::error::{ErrorClass, ReconcileError, ReconcileResult};
use crate::store::ObjectStore;
use crate::types::config::Settings;
use crate::types::context::Context;
use crate::types::spec::Observability;
use crate::types::status::{ObservabilityStatus, StageOutcome};

/// Key under which an instance's status is stored.
pub fn instance_key(cr: &Observability) -> String {
    format!("{}/{}", cr.namespace, cr.name)
}

// ---------------------------------------------------------------------------
// Status stores
// ---------------------------------------------------------------------------

pub trait StatusStore {
    /// The stored status, or the default status if none was saved yet.
    fn load(&self, key: &str) -> ReconcileResult<ObservabilityStatus>;
    fn save(&self, key: &str, status: &ObservabilityStatus) -> ReconcileResult<()>;
}

/// Statuses kept in one JSON document, keyed by instance.
///
/// Writes go to a sibling temp file which is then renamed over the document,
/// so a reader never sees a partial write.
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    path: PathBuf,
}

impl FileStatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStatusStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored status.
    pub fn load_all(&self) -> ReconcileResult<BTreeMap<String, ObservabilityStatus>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            ReconcileError::Status(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            ReconcileError::Status(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn write_all(&self, all: &BTreeMap<String, ObservabilityStatus>) -> ReconcileResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ReconcileError::Status(format!("failed to create {}: {}", parent.display(), e))
                })?;
            }
        }
        let json = serde_json::to_string_pretty(all)
            .map_err(|e| ReconcileError::Status(format!("failed to serialize status: {}", e)))?;

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, &json).map_err(|e| {
            ReconcileError::Status(format!("failed to write {}: {}", tmp_path.display(), e))
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            ReconcileError::Status(format!(
                "failed to rename {} to {}: {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StatusStore for FileStatusStore {
    fn load(&self, key: &str) -> ReconcileResult<ObservabilityStatus> {
        Ok(self.load_all()?.remove(key).unwrap_or_default())
    }

    fn save(&self, key: &str, status: &ObservabilityStatus) -> ReconcileResult<()> {
        let mut all = self.load_all()?;
        all.insert(key.to_string(), status.clone());
        self.write_all(&all)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    statuses: RefCell<BTreeMap<String, ObservabilityStatus>>,
    saves: Cell<usize>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(key: &str, status: ObservabilityStatus) -> Self {
        let store = Self::default();
        store.statuses.borrow_mut().insert(key.to_string(), status);
        store
    }

    pub fn get(&self, key: &str) -> Option<ObservabilityStatus> {
        self.statuses.borrow().get(key).cloned()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.get()
    }
}

impl StatusStore for MemoryStatusStore {
    fn load(&self, key: &str) -> ReconcileResult<ObservabilityStatus> {
        Ok(self.get(key).unwrap_or_default())
    }

    fn save(&self, key: &str, status: &ObservabilityStatus) -> ReconcileResult<()> {
        self.saves.set(self.saves.get() + 1);
        self.statuses
            .borrow_mut()
            .insert(key.to_string(), status.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// When the caller should invoke the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Converged; wait for the desired specification or a watched object to change.
    AwaitChange,
    After(Duration),
}

impl fmt::Display for Requeue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requeue::AwaitChange => write!(f, "await change"),
            Requeue::After(d) => write!(f, "after {}ms", d.as_millis()),
        }
    }
}

#[derive(Debug)]
pub struct TickReport {
    pub outcome: StageOutcome,
    pub stage: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub message: Option<String>,
    pub requeue: Requeue,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.outcome)?;
        if let Some(stage) = &self.stage {
            write!(f, " at {}", stage)?;
        }
        if let Some(class) = self.error_class {
            write!(f, " [{}]", class)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        write!(f, "; requeue {}", self.requeue)
    }
}

pub struct Scheduler<S: StatusStore> {
    orchestrator: Orchestrator,
    statuses: S,
    tracker: FailureTracker,
    store_timeout: Duration,
    poll_interval: Duration,
}

impl<S: StatusStore> Scheduler<S> {
    pub fn new(orchestrator: Orchestrator, statuses: S, settings: &Settings) -> Self {
        Scheduler {
            orchestrator,
            statuses,
            tracker: FailureTracker::new(RetryPolicy::from_settings(settings)),
            store_timeout: Duration::from_millis(settings.store_timeout_ms),
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
        }
    }

    /// A scheduler running the production stage list.
    pub fn standard(statuses: S, settings: &Settings) -> Self {
        Self::new(Orchestrator::standard(settings), statuses, settings)
    }

    pub fn statuses(&self) -> &S {
        &self.statuses
    }

    pub fn failure_count(&self, cr: &Observability) -> u32 {
        self.tracker.failure_count(&instance_key(cr))
    }

    /// Run one reconcile tick for `cr`.
    ///
    /// Errors are returned only when the status cannot be loaded or saved;
    /// stage failures are reported through the `TickReport`.
    pub fn tick(
        &mut self,
        store: &dyn ObjectStore,
        cr: &Observability,
    ) -> ReconcileResult<TickReport> {
        let key = instance_key(cr);
        let mut status = self.statuses.load(&key)?;
        let ctx = Context::with_timeout(self.store_timeout);
        let result = self.orchestrator.reconcile(store, &ctx, cr, &mut status);
        self.statuses.save(&key, &status)?;
        Ok(self.report(&key, result))
    }

    /// Run one teardown tick for `cr`.
    pub fn cleanup(
        &mut self,
        store: &dyn ObjectStore,
        cr: &Observability,
    ) -> ReconcileResult<TickReport> {
        let key = instance_key(cr);
        let mut status = self.statuses.load(&key)?;
        let ctx = Context::with_timeout(self.store_timeout);
        let result = self.orchestrator.cleanup(store, &ctx, cr, &mut status);
        self.statuses.save(&key, &status)?;
        Ok(self.report(&key, result))
    }

    fn report(&mut self, key: &str, result: TickResult) -> TickReport {
        let error_class = result.error_class();
        let requeue = match (result.outcome, error_class) {
            (StageOutcome::Success, _) => {
                self.tracker.record_success(key);
                Requeue::AwaitChange
            }
            (StageOutcome::InProgress, _) => {
                self.tracker.record_success(key);
                Requeue::After(self.poll_interval)
            }
            (StageOutcome::Failed, Some(ErrorClass::Fatal)) => {
                self.tracker.record_failure(key);
                error!(
                    instance = key,
                    stage = result.stage.as_deref().unwrap_or("-"),
                    error = %display_error(&result),
                    "unrecoverable reconcile failure"
                );
                Requeue::After(self.tracker.policy().max_delay())
            }
            (StageOutcome::Failed, _) => {
                let delay = self.tracker.record_failure(key);
                let failures = self.tracker.failure_count(key);
                if self.tracker.exhausted(key) {
                    error!(
                        instance = key,
                        failures,
                        error = %display_error(&result),
                        "reconcile keeps failing"
                    );
                } else {
                    warn!(
                        instance = key,
                        failures,
                        delay_ms = delay.as_millis() as u64,
                        "reconcile failed, backing off"
                    );
                }
                Requeue::After(delay)
            }
        };

        info!(instance = key, outcome = %result.outcome, %requeue, "tick finished");
        TickReport {
            outcome: result.outcome,
            stage: result.stage,
            error_class,
            message: result.error.as_ref().map(|e| e.to_string()),
            requeue,
        }
    }
}

fn display_error(result: &TickResult) -> String {
    result
        .error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "stage reported failure".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::model;
    use crate::stages::Stage;
    use crate::store::memory::{MemoryStore, Op};
    use crate::types::config::BackoffStrategy;
    use crate::types::object::{Kind, ManagedObject, ObjectRef};
    use serde_json::json;
    use std::time::Duration;

    fn settings() -> Settings {
        Settings {
            poll_interval_ms: 50,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            max_retries: 3,
            backoff_strategy: BackoffStrategy::Exponential,
            ..Settings::default()
        }
    }

    fn cr() -> Observability {
        Observability::new("stack", "obs")
    }

    fn ready_operator() -> ManagedObject {
        ManagedObject::empty(ObjectRef::namespaced(
            Kind::Deployment,
            "obs",
            model::PROMETHEUS_OPERATOR_DEPLOYMENT,
        ))
        .with_status(json!({ "readyReplicas": 1 }))
    }

    /// Always fails with a transient store error.
    struct Flaky;

    impl Stage for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn reconcile(
            &self,
            _store: &dyn ObjectStore,
            _ctx: &Context,
            _cr: &Observability,
            _status: &mut ObservabilityStatus,
        ) -> ReconcileResult<StageOutcome> {
            Err(StoreError::Unavailable("store offline".into()).into())
        }

        fn cleanup(
            &self,
            _: &dyn ObjectStore,
            _: &Context,
            _: &Observability,
        ) -> ReconcileResult<StageOutcome> {
            Ok(StageOutcome::Success)
        }
    }

    #[test]
    fn in_progress_requeues_at_poll_interval() {
        let mut scheduler = Scheduler::standard(MemoryStatusStore::new(), &settings());
        let report = scheduler.tick(&MemoryStore::new(), &cr()).unwrap();
        assert_eq!(report.outcome, StageOutcome::InProgress);
        assert_eq!(report.stage.as_deref(), Some("installation"));
        assert_eq!(report.requeue, Requeue::After(Duration::from_millis(50)));
    }

    #[test]
    fn converged_awaits_change() {
        let store = MemoryStore::with_objects(vec![ready_operator()]);
        let mut scheduler = Scheduler::standard(MemoryStatusStore::new(), &settings());
        let report = scheduler.tick(&store, &cr()).unwrap();
        assert_eq!(report.outcome, StageOutcome::Success);
        assert_eq!(report.requeue, Requeue::AwaitChange);
        let status = scheduler.statuses().get("obs/stack").unwrap();
        assert!(status.is_migrated());
        assert_eq!(status.stage_status, Some(StageOutcome::Success));
    }

    #[test]
    fn status_saved_once_per_tick() {
        let store = MemoryStore::with_objects(vec![ready_operator()]);
        let mut scheduler = Scheduler::standard(MemoryStatusStore::new(), &settings());
        scheduler.tick(&store, &cr()).unwrap();
        scheduler.tick(&store, &cr()).unwrap();
        assert_eq!(scheduler.statuses().save_count(), 2);
    }

    #[test]
    fn backoff_grows_and_resets() {
        let mut scheduler = Scheduler::new(
            Orchestrator::new(vec![Box::new(Flaky)]),
            MemoryStatusStore::new(),
            &settings(),
        );
        let store = MemoryStore::new();
        let delays: Vec<Requeue> = (0..5)
            .map(|_| scheduler.tick(&store, &cr()).unwrap().requeue)
            .collect();
        assert_eq!(
            delays,
            vec![
                Requeue::After(Duration::from_millis(100)),
                Requeue::After(Duration::from_millis(200)),
                Requeue::After(Duration::from_millis(400)),
                Requeue::After(Duration::from_millis(800)),
                Requeue::After(Duration::from_millis(1_000)),
            ]
        );
        assert_eq!(scheduler.failure_count(&cr()), 5);

        // a tick that gets past the failure clears the count
        let mut healthy = Scheduler::standard(MemoryStatusStore::new(), &settings());
        let store = MemoryStore::new();
        store.fail_next(Op::Get, None, StoreError::Unavailable("blip".into()));
        let first = healthy.tick(&store, &cr()).unwrap();
        assert_eq!(first.error_class, Some(ErrorClass::Transient));
        assert_eq!(healthy.failure_count(&cr()), 1);
        let second = healthy.tick(&store, &cr()).unwrap();
        assert_eq!(second.outcome, StageOutcome::InProgress);
        assert_eq!(healthy.failure_count(&cr()), 0);
    }

    #[test]
    fn zero_delays_never_requeue_immediately() {
        let zero = Settings {
            poll_interval_ms: 0,
            base_delay_ms: 0,
            ..settings()
        };
        let mut scheduler = Scheduler::standard(MemoryStatusStore::new(), &zero);
        let store = MemoryStore::new();
        store.fail_next(Op::Get, None, StoreError::Unavailable("blip".into()));
        let failed = scheduler.tick(&store, &cr()).unwrap();
        assert_eq!(failed.requeue, Requeue::After(Duration::from_millis(1)));
        let pending = scheduler.tick(&store, &cr()).unwrap();
        assert_eq!(pending.outcome, StageOutcome::InProgress);
        assert_eq!(pending.requeue, Requeue::After(Duration::from_millis(1)));
    }

    #[test]
    fn fatal_requeues_at_max_delay() {
        let mut scheduler = Scheduler::standard(MemoryStatusStore::new(), &settings());
        let bad = Observability::new("", "obs");
        let report = scheduler.tick(&MemoryStore::new(), &bad).unwrap();
        assert_eq!(report.outcome, StageOutcome::Failed);
        assert_eq!(report.error_class, Some(ErrorClass::Fatal));
        assert_eq!(report.requeue, Requeue::After(Duration::from_millis(1_000)));
    }

    #[test]
    fn deadline_expiry_is_transient_and_keeps_status() {
        let mut migrated = ObservabilityStatus::default();
        migrated.mark_migrated();
        let statuses = MemoryStatusStore::with_status("obs/stack", migrated);
        let expired = Settings {
            store_timeout_ms: 0,
            ..settings()
        };
        let mut scheduler = Scheduler::standard(statuses, &expired);
        let store = MemoryStore::new();

        let report = scheduler.tick(&store, &cr()).unwrap();
        assert_eq!(report.outcome, StageOutcome::Failed);
        assert_eq!(report.error_class, Some(ErrorClass::Transient));
        assert!(store.objects().is_empty());
        let status = scheduler.statuses().get("obs/stack").unwrap();
        assert!(status.is_migrated());
        assert_eq!(status.stage_status, Some(StageOutcome::Failed));
    }

    #[test]
    fn cleanup_tick_tears_down() {
        let store = MemoryStore::with_objects(vec![ready_operator()]);
        let mut scheduler = Scheduler::standard(MemoryStatusStore::new(), &settings());
        scheduler.tick(&store, &cr()).unwrap();
        let report = scheduler.cleanup(&store, &cr()).unwrap();
        assert_eq!(report.outcome, StageOutcome::Success);
        assert!(!store.contains(&model::prometheus(&cr())));
        assert!(!store.contains(&model::prometheus_subscription(&cr())));
        // the operator workload belongs to the operator, not to us
        assert!(store.contains(&ready_operator().identity));
    }

    #[test]
    fn file_store_round_trips_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("status.json");
        let store = FileStatusStore::new(&path);

        assert_eq!(store.load("obs/stack").unwrap(), ObservabilityStatus::default());

        let mut status = ObservabilityStatus::default();
        status.record_stage("installation", StageOutcome::Success);
        status.record_stage("migration", StageOutcome::InProgress);
        status.stage_status = Some(StageOutcome::InProgress);
        status.last_message = Some("waiting".into());
        status.mark_migrated();
        store.save("obs/stack", &status).unwrap();
        store.save("other/stack", &ObservabilityStatus::default()).unwrap();

        assert_eq!(store.load("obs/stack").unwrap(), status);
        assert_eq!(store.load_all().unwrap().len(), 2);
        assert!(!store.tmp_path().exists());

        let first = fs::read_to_string(&path).unwrap();
        store.save("obs/stack", &status).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        fs::write(&path, "{ not json").unwrap();
        let err = FileStatusStore::new(&path).load("obs/stack").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn report_display() {
        let report = TickReport {
            outcome: StageOutcome::Failed,
            stage: Some("grafana".into()),
            error_class: Some(ErrorClass::Conflict),
            message: Some("gave up".into()),
            requeue: Requeue::After(Duration::from_millis(200)),
        };
        assert_eq!(
            report.to_string(),
            "failed at grafana [conflict]: gave up; requeue after 200ms"
        );
    }
}
