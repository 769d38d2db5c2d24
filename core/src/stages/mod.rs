//! Reconciliation stages.
//!
//! Every stage exposes the same two operations. Stages hold no store handle
//! and no memory of earlier ticks: each call re-reads live state and works
//! out what remains to be done.

pub mod installation;
pub mod migration;
pub mod sync;
pub mod token;

use crate::error::ReconcileResult;
use crate::store::{self, ObjectStore};
use crate::types::context::Context;
use crate::types::object::ObjectRef;
use crate::types::spec::Observability;
use crate::types::status::{ObservabilityStatus, StageOutcome};

/// A unit of reconciliation run by the orchestrator.
pub trait Stage {
    /// Stable name, used as the status marker key.
    fn name(&self) -> &str;

    /// Drive live state toward `cr`. Safe to call on every tick.
    fn reconcile(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
        status: &mut ObservabilityStatus,
    ) -> ReconcileResult<StageOutcome>;

    /// Remove what this stage created. Already-absent objects are fine.
    fn cleanup(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
    ) -> ReconcileResult<StageOutcome>;
}

/// Delete each identity in order, skipping ones already gone.
pub(crate) fn delete_in_order(
    store: &dyn ObjectStore,
    ctx: &Context,
    identities: &[ObjectRef],
) -> ReconcileResult<()> {
    for id in identities {
        store::delete_if_present(store, ctx, id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::memory::{MemoryStore, Op, StoreCall};
    use crate::types::object::{Kind, ManagedObject};

    #[test]
    fn delete_in_order_preserves_order_and_skips_absent() {
        let a = ObjectRef::namespaced(Kind::Route, "obs", "a");
        let b = ObjectRef::namespaced(Kind::Service, "obs", "b");
        let store = MemoryStore::with_objects(vec![ManagedObject::empty(b.clone())]);
        delete_in_order(&store, &Context::background(), &[a.clone(), b.clone()]).unwrap();
        assert_eq!(store.calls(), vec![StoreCall::Delete(a), StoreCall::Delete(b)]);
        assert!(store.identities().is_empty());
    }

    #[test]
    fn delete_in_order_stops_at_first_error() {
        let a = ObjectRef::namespaced(Kind::Route, "obs", "a");
        let b = ObjectRef::namespaced(Kind::Service, "obs", "b");
        let store = MemoryStore::with_objects(vec![
            ManagedObject::empty(a.clone()),
            ManagedObject::empty(b.clone()),
        ]);
        store.fail_next(Op::Delete, Some(a.clone()), StoreError::Unavailable("reset".into()));
        assert!(delete_in_order(&store, &Context::background(), &[a, b.clone()]).is_err());
        assert!(store.contains(&b));
    }
}
