//! Desired-state applier: fetch, mutate, submit, retry on conflict.
//!
//! The applier is the only path by which stages write objects. It never
//! trusts a previously fetched copy: every attempt starts from a fresh `get`,
//! so a concurrent edit is detected through the concurrency token and the
//! mutation is replayed on top of it instead of overwriting it.

use tracing::{debug, warn};

use crate::error::{ErrorClass, ReconcileError, ReconcileResult, StoreError};
use crate::store::ObjectStore;
use crate::types::context::Context;
use crate::types::object::{ManagedObject, ObjectRef};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What a successful apply did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    Created,
    Updated,
    /// The live object already matched; nothing was submitted.
    Unchanged,
}

/// Idempotent create-or-update with a bounded number of conflict retries.
#[derive(Debug, Clone, Copy)]
pub struct Applier {
    max_attempts: u32,
}

impl Default for Applier {
    fn default() -> Self {
        Applier::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl Applier {
    pub fn new(max_attempts: u32) -> Self {
        Applier {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Drive the object at `identity` to the shape produced by `mutate`.
    ///
    /// `mutate` receives the live object, or an empty one carrying only the
    /// identity when absent, and edits it in place. It may be called once per
    /// attempt and must produce the same result for the same input. An error
    /// from `mutate` aborts without submitting anything.
    pub fn apply<F>(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        identity: &ObjectRef,
        mut mutate: F,
    ) -> ReconcileResult<ApplyResult>
    where
        F: FnMut(&mut ManagedObject) -> ReconcileResult<()>,
    {
        for attempt in 1..=self.max_attempts {
            let (mut object, existing) = match store.get(ctx, identity) {
                Ok(live) => (live, true),
                Err(StoreError::NotFound(_)) => (ManagedObject::empty(identity.clone()), false),
                Err(e) => return Err(e.into()),
            };
            let token = object.resource_version;
            let before = if existing { Some(object.clone()) } else { None };

            mutate(&mut object)?;
            if object.identity != *identity {
                return Err(ReconcileError::render(
                    identity,
                    format!("mutation moved object to {}", object.identity),
                ));
            }
            object.resource_version = token;

            let submitted = match before {
                None => store.create(ctx, object).map(|_| ApplyResult::Created),
                Some(prev) if prev == object => return Ok(ApplyResult::Unchanged),
                Some(_) => store.update(ctx, object).map(|_| ApplyResult::Updated),
            };

            match submitted {
                Ok(result) => {
                    debug!(object = %identity, ?result, attempt, "applied");
                    return Ok(result);
                }
                Err(e) if e.class() == ErrorClass::Conflict => {
                    debug!(object = %identity, attempt, error = %e, "conflict, refetching");
                }
                // deleted under us between get and update; the refetch recreates it
                Err(StoreError::NotFound(_)) => {
                    debug!(object = %identity, attempt, "vanished before update, refetching");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(object = %identity, attempts = self.max_attempts, "conflict retries exhausted");
        Err(ReconcileError::ConflictRetriesExhausted {
            identity: identity.clone(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, Op, StoreCall};
    use crate::types::object::Kind;
    use serde_json::json;

    fn id() -> ObjectRef {
        ObjectRef::namespaced(Kind::Grafana, "obs", "observability-grafana")
    }

    fn set_replicas(n: u64) -> impl FnMut(&mut ManagedObject) -> ReconcileResult<()> {
        move |obj| {
            obj.set_spec_field("replicas", json!(n));
            Ok(())
        }
    }

    fn stale(identity: ObjectRef) -> StoreError {
        StoreError::StaleToken { identity, submitted: 1, current: 2 }
    }

    #[test]
    fn creates_when_absent() {
        let store = MemoryStore::new();
        let result = Applier::default()
            .apply(&store, &Context::background(), &id(), set_replicas(1))
            .unwrap();
        assert_eq!(result, ApplyResult::Created);
        assert_eq!(store.object(&id()).unwrap().spec, json!({"replicas": 1}));
    }

    #[test]
    fn second_apply_is_a_no_op() {
        let store = MemoryStore::new();
        let applier = Applier::default();
        let ctx = Context::background();
        applier.apply(&store, &ctx, &id(), set_replicas(1)).unwrap();
        let after_first = store.object(&id()).unwrap();
        store.clear_calls();

        let result = applier.apply(&store, &ctx, &id(), set_replicas(1)).unwrap();
        assert_eq!(result, ApplyResult::Unchanged);
        assert_eq!(store.object(&id()).unwrap(), after_first);
        assert_eq!(store.calls(), vec![StoreCall::Get(id())]);
    }

    #[test]
    fn updates_changed_object_with_fetched_token() {
        let store = MemoryStore::with_objects(vec![
            ManagedObject::empty(id()).with_spec(json!({"replicas": 3, "foreign": "kept"})),
        ]);
        let result = Applier::default()
            .apply(&store, &Context::background(), &id(), set_replicas(1))
            .unwrap();
        assert_eq!(result, ApplyResult::Updated);
        assert_eq!(
            store.object(&id()).unwrap().spec,
            json!({"replicas": 1, "foreign": "kept"})
        );
    }

    #[test]
    fn conflict_is_retried_from_fresh_fetch() {
        let store = MemoryStore::with_objects(vec![ManagedObject::empty(id())]);
        store.fail_next(Op::Update, Some(id()), stale(id()));
        let result = Applier::new(3)
            .apply(&store, &Context::background(), &id(), set_replicas(2))
            .unwrap();
        assert_eq!(result, ApplyResult::Updated);
        let gets = store.calls().iter().filter(|c| c.op() == Op::Get).count();
        assert_eq!(gets, 2);
    }

    #[test]
    fn create_race_is_retried_from_fresh_fetch() {
        let store = MemoryStore::new();
        store.fail_next(Op::Create, Some(id()), StoreError::AlreadyExists(id()));
        let result = Applier::default()
            .apply(&store, &Context::background(), &id(), set_replicas(2))
            .unwrap();
        // the injected fault left the store empty, so the retry creates again
        assert_eq!(result, ApplyResult::Created);
    }

    #[test]
    fn not_found_on_update_is_retried_from_fresh_fetch() {
        let store = MemoryStore::with_objects(vec![ManagedObject::empty(id())]);
        store.fail_next(Op::Update, Some(id()), StoreError::NotFound(id()));
        let result = Applier::default()
            .apply(&store, &Context::background(), &id(), set_replicas(2))
            .unwrap();
        // the store still holds the object, so the second attempt updates it
        assert_eq!(result, ApplyResult::Updated);
        assert_eq!(store.object(&id()).unwrap().spec_field("replicas"), Some(&json!(2)));
        let gets = store.calls().iter().filter(|c| c.op() == Op::Get).count();
        assert_eq!(gets, 2);
    }

    /// Deletes the object out from under the first update.
    struct DeletedOnUpdate {
        inner: MemoryStore,
        fired: std::cell::Cell<bool>,
    }

    impl ObjectStore for DeletedOnUpdate {
        fn get(&self, ctx: &Context, identity: &ObjectRef) -> Result<ManagedObject, StoreError> {
            self.inner.get(ctx, identity)
        }

        fn create(
            &self,
            ctx: &Context,
            object: ManagedObject,
        ) -> Result<ManagedObject, StoreError> {
            self.inner.create(ctx, object)
        }

        fn update(
            &self,
            ctx: &Context,
            object: ManagedObject,
        ) -> Result<ManagedObject, StoreError> {
            if !self.fired.replace(true) {
                self.inner.remove(&object.identity);
            }
            self.inner.update(ctx, object)
        }

        fn delete(&self, ctx: &Context, identity: &ObjectRef) -> Result<(), StoreError> {
            self.inner.delete(ctx, identity)
        }

        fn list(
            &self,
            ctx: &Context,
            selector: &crate::types::object::Selector,
        ) -> Result<Vec<ManagedObject>, StoreError> {
            self.inner.list(ctx, selector)
        }
    }

    #[test]
    fn object_deleted_concurrently_is_created_again() {
        let store = DeletedOnUpdate {
            inner: MemoryStore::with_objects(vec![ManagedObject::empty(id())]),
            fired: std::cell::Cell::new(false),
        };
        let result = Applier::default()
            .apply(&store, &Context::background(), &id(), set_replicas(3))
            .unwrap();
        assert_eq!(result, ApplyResult::Created);
        assert_eq!(
            store.inner.object(&id()).unwrap().spec_field("replicas"),
            Some(&json!(3))
        );
    }

    #[test]
    fn vanishing_object_beyond_bound_fails_as_conflict() {
        let store = MemoryStore::with_objects(vec![ManagedObject::empty(id())]);
        for _ in 0..2 {
            store.fail_next(Op::Update, Some(id()), StoreError::NotFound(id()));
        }
        let err = Applier::new(2)
            .apply(&store, &Context::background(), &id(), set_replicas(2))
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Conflict);
    }

    #[test]
    fn conflicts_beyond_bound_fail() {
        let store = MemoryStore::with_objects(vec![ManagedObject::empty(id())]);
        for _ in 0..3 {
            store.fail_next(Op::Update, Some(id()), stale(id()));
        }
        let err = Applier::new(3)
            .apply(&store, &Context::background(), &id(), set_replicas(2))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::ConflictRetriesExhausted { attempts: 3, .. }));
        assert_eq!(store.object(&id()).unwrap().spec, serde_json::Value::Null);
    }

    #[test]
    fn external_edit_between_applies_is_restored() {
        let store = MemoryStore::new();
        let applier = Applier::default();
        let ctx = Context::background();
        applier.apply(&store, &ctx, &id(), set_replicas(1)).unwrap();

        let mut drifted = store.object(&id()).unwrap();
        drifted.set_spec_field("replicas", json!(7));
        store.insert(drifted);

        let result = applier.apply(&store, &ctx, &id(), set_replicas(1)).unwrap();
        assert_eq!(result, ApplyResult::Updated);
        assert_eq!(store.object(&id()).unwrap().spec_field("replicas"), Some(&json!(1)));
    }

    #[test]
    fn mutate_error_submits_nothing() {
        let store = MemoryStore::new();
        let err = Applier::default()
            .apply(&store, &Context::background(), &id(), |obj| {
                Err(ReconcileError::render(&obj.identity, "bad template"))
            })
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(store.identities().is_empty());
    }

    #[test]
    fn mutate_may_not_change_identity() {
        let store = MemoryStore::new();
        let err = Applier::default()
            .apply(&store, &Context::background(), &id(), |obj| {
                obj.identity.name = "elsewhere".into();
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Render { .. }));
    }

    #[test]
    fn transient_errors_are_not_retried() {
        let store = MemoryStore::new();
        store.fail_next(Op::Get, None, StoreError::Unavailable("eof".into()));
        let err = Applier::default()
            .apply(&store, &Context::background(), &id(), set_replicas(1))
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(store.call_count(), 1);
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        assert_eq!(Applier::new(0).max_attempts(), 1);
    }
}
