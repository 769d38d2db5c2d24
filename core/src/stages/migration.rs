//! Migration gate: one-time removal of objects under the legacy names.
//!
//! Runs only while `status.is_migrated()` is false. Legacy objects are
//! deleted per subsystem in dependency order: primary workload, then its
//! exposure, then its service account, then its cluster permissions. After a
//! workload is deleted, a removal barrier holds the sequence until its pods
//! are gone so running instances never lose their credentials mid-teardown.
//!
//! The barrier does not wait in-process. When pods remain the gate returns
//! `InProgress`, and the next tick replays the plan from the top: deletes of
//! objects already removed are no-ops and the barrier re-reads live state.
//! The sticky flag is set only after every subsystem completes.

use tracing::{debug, info};

use crate::convergence::poll;
use crate::error::ReconcileResult;
use crate::model;
use crate::store::{self, ObjectStore};
use crate::types::context::Context;
use crate::types::object::{ObjectRef, Selector};
use crate::types::spec::Observability;
use crate::types::status::{ObservabilityStatus, StageOutcome};

use super::Stage;

/// One action of a subsystem's legacy teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Delete the object, tolerating absence.
    Delete(ObjectRef),
    /// Hold until nothing matches the selector.
    AwaitRemoval(Selector),
}

/// The ordered teardown for one subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemPlan {
    pub subsystem: &'static str,
    pub steps: Vec<Step>,
}

/// Build the teardown plan for every subsystem that has left the legacy
/// naming scheme, in execution order.
pub fn plan(cr: &Observability) -> Vec<SubsystemPlan> {
    let mut plans = Vec::new();

    if cr.spec.prometheus_default_name.is_empty() {
        let legacy = model::PROMETHEUS_OLD_DEFAULT_NAME;
        plans.push(SubsystemPlan {
            subsystem: "prometheus",
            steps: vec![
                Step::Delete(model::prometheus(cr).renamed(legacy)),
                Step::AwaitRemoval(model::prometheus_pods(cr, legacy)),
                Step::Delete(model::prometheus_route(cr).renamed(legacy)),
                Step::Delete(model::prometheus_service(cr).renamed(legacy)),
                Step::Delete(model::prometheus_service_account(cr).renamed(legacy)),
                Step::Delete(model::prometheus_cluster_role(cr).renamed(legacy)),
                Step::Delete(model::prometheus_cluster_role_binding(cr).renamed(legacy)),
            ],
        });
    }

    if cr.spec.alertmanager_default_name.is_empty() {
        let legacy = model::ALERTMANAGER_OLD_DEFAULT_NAME;
        let mut steps = Vec::new();
        // the generated routing secret exists only when no override is
        // configured and the repository sync produced it
        if cr.alertmanager_config_secret().is_none() && !cr.external_sync_disabled() {
            steps.push(Step::Delete(
                model::alertmanager_secret(cr).renamed(&model::alertmanager_secret_name(legacy)),
            ));
        }
        steps.extend([
            Step::Delete(model::alertmanager(cr).renamed(legacy)),
            Step::AwaitRemoval(model::alertmanager_pods(cr, legacy)),
            Step::Delete(model::alertmanager_route(cr).renamed(legacy)),
            Step::Delete(model::alertmanager_service(cr).renamed(legacy)),
            Step::Delete(model::alertmanager_service_account(cr).renamed(legacy)),
            Step::Delete(model::alertmanager_cluster_role(cr).renamed(legacy)),
            Step::Delete(model::alertmanager_cluster_role_binding(cr).renamed(legacy)),
        ]);
        plans.push(SubsystemPlan {
            subsystem: "alertmanager",
            steps,
        });
    }

    if cr.spec.grafana_default_name.is_empty() {
        let legacy = model::GRAFANA_OLD_DEFAULT_NAME;
        plans.push(SubsystemPlan {
            subsystem: "grafana",
            steps: vec![
                Step::Delete(model::grafana(cr).renamed(legacy)),
                Step::AwaitRemoval(model::grafana_pods(cr, legacy)),
            ],
        });
    }

    if !cr.external_sync_disabled() || !cr.observatorium_disabled() {
        let legacy = model::PROMTAIL_OLD_DEFAULT_NAME;
        plans.push(SubsystemPlan {
            subsystem: "promtail",
            steps: vec![
                Step::Delete(model::promtail_service_account(cr).renamed(legacy)),
                Step::Delete(model::promtail_cluster_role(cr).renamed(legacy)),
                Step::Delete(model::promtail_cluster_role_binding(cr).renamed(legacy)),
            ],
        });
    }

    plans
}

/// Sticky one-time migration from the `kafka-*` names.
#[derive(Debug, Default)]
pub struct MigrationGate;

impl MigrationGate {
    pub fn new() -> Self {
        MigrationGate
    }
}

impl Stage for MigrationGate {
    fn name(&self) -> &str {
        "migration"
    }

    fn reconcile(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
        status: &mut ObservabilityStatus,
    ) -> ReconcileResult<StageOutcome> {
        if status.is_migrated() {
            return Ok(StageOutcome::Success);
        }

        for subsystem in plan(cr) {
            for step in &subsystem.steps {
                match step {
                    Step::Delete(id) => {
                        if store::delete_if_present(store, ctx, id)? {
                            info!(
                                subsystem = subsystem.subsystem,
                                object = %id,
                                "removed legacy object"
                            );
                        }
                    }
                    Step::AwaitRemoval(selector) => {
                        let outcome = poll::all_absent(store, ctx, selector)?;
                        if !outcome.is_success() {
                            info!(
                                subsystem = subsystem.subsystem,
                                selector = %selector,
                                "legacy workload still terminating"
                            );
                            return Ok(outcome);
                        }
                    }
                }
            }
            debug!(subsystem = subsystem.subsystem, "legacy teardown complete");
        }

        status.mark_migrated();
        info!(name = %cr.name, namespace = %cr.namespace, "legacy name migration complete");
        Ok(StageOutcome::Success)
    }

    fn cleanup(
        &self,
        _store: &dyn ObjectStore,
        _ctx: &Context,
        _cr: &Observability,
    ) -> ReconcileResult<StageOutcome> {
        Ok(StageOutcome::Success)
    }
}
