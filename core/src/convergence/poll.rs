//! Readiness poller: one observation per call, never waits.
//!
//! A stage that needs a downstream system to converge calls one of these
//! checks and returns `InProgress` when the condition does not hold yet. The
//! scheduler invokes the stage again on a later tick; nothing here sleeps.

use serde_json::Value;
use tracing::debug;

use crate::error::ReconcileResult;
use crate::store::ObjectStore;
use crate::types::context::Context;
use crate::types::object::{Kind, ManagedObject, Selector};
use crate::types::status::StageOutcome;

/// List the objects matching `selector` once and evaluate `condition`.
pub fn check<F>(
    store: &dyn ObjectStore,
    ctx: &Context,
    selector: &Selector,
    condition: F,
) -> ReconcileResult<StageOutcome>
where
    F: FnOnce(&[ManagedObject]) -> bool,
{
    let items = store.list(ctx, selector)?;
    if condition(&items) {
        Ok(StageOutcome::Success)
    } else {
        debug!(selector = %selector, matched = items.len(), "condition not met yet");
        Ok(StageOutcome::InProgress)
    }
}

/// Success once the workload `name` in `namespace` reports a ready replica.
pub fn workload_ready(
    store: &dyn ObjectStore,
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> ReconcileResult<StageOutcome> {
    let selector = Selector::kind(Kind::Deployment).in_namespace(namespace);
    check(store, ctx, &selector, |items| {
        items
            .iter()
            .any(|d| d.identity.name == name && ready_replicas(d) > 0)
    })
}

/// Success once nothing matches `selector`.
pub fn all_absent(
    store: &dyn ObjectStore,
    ctx: &Context,
    selector: &Selector,
) -> ReconcileResult<StageOutcome> {
    check(store, ctx, selector, |items| items.is_empty())
}

fn ready_replicas(object: &ManagedObject) -> i64 {
    object
        .status
        .get("readyReplicas")
        .and_then(Value::as_i64)
        .unwrap_or(0)
}
