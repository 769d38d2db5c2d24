//! Metrics operator installation.
//!
//! Establishes the catalog source, subscription and operator group that
//! install the metrics operator, then waits for the operator workload to
//! report a ready replica. Before establishing the catalog source it clears
//! out a known stale installation left by an earlier release.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::convergence::apply::Applier;
use crate::convergence::poll;
use crate::error::ReconcileResult;
use crate::model;
use crate::store::ObjectStore;
use crate::types::context::Context;
use crate::types::object::{Kind, Selector};
use crate::types::spec::Observability;
use crate::types::status::{ObservabilityStatus, StageOutcome};

use super::{delete_in_order, Stage};

#[derive(Debug, Default)]
pub struct InstallationStage {
    applier: Applier,
}

impl InstallationStage {
    pub fn new(applier: Applier) -> Self {
        InstallationStage { applier }
    }

    fn reconcile_namespace(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
    ) -> ReconcileResult<()> {
        self.applier
            .apply(store, ctx, &model::prometheus_namespace(cr), |_| Ok(()))?;
        Ok(())
    }

    fn reconcile_catalog_source(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
    ) -> ReconcileResult<()> {
        let source = model::prometheus_catalog_source(cr);
        match store.get(ctx, &source) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => remove_stale_installation(store, ctx, cr)?,
            Err(e) => return Err(e.into()),
        }

        self.applier.apply(store, ctx, &source, |obj| {
            obj.spec = json!({
                "sourceType": "grpc",
                "image": model::PROMETHEUS_CATALOG_IMAGE,
            });
            Ok(())
        })?;
        Ok(())
    }

    fn reconcile_subscription(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
    ) -> ReconcileResult<()> {
        let namespace = cr.prometheus_operator_namespace().to_string();
        let resources = cr
            .spec
            .prometheus_operator_resources
            .clone()
            .unwrap_or(Value::Null);
        self.applier
            .apply(store, ctx, &model::prometheus_subscription(cr), |obj| {
                obj.spec = json!({
                    "source": model::PROMETHEUS_CATALOG_SOURCE,
                    "sourceNamespace": namespace,
                    "name": "prometheus",
                    "channel": "preview",
                    "installPlanApproval": "Automatic",
                    "config": { "resources": resources },
                });
                Ok(())
            })?;
        Ok(())
    }

    fn reconcile_operator_group(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
    ) -> ReconcileResult<()> {
        let namespace = cr.prometheus_operator_namespace();
        // a namespace may hold a single operator group; adopt whatever exists
        let selector = Selector::kind(Kind::OperatorGroup).in_namespace(namespace);
        let existing = store.list(ctx, &selector)?;
        if !existing.is_empty() {
            debug!(namespace, "operator group already present");
            return Ok(());
        }
        self.applier
            .apply(store, ctx, &model::prometheus_operator_group(cr), |obj| {
                obj.spec = json!({ "targetNamespaces": [namespace] });
                Ok(())
            })?;
        Ok(())
    }
}

/// Remove the subscription and cluster service version of the one stale
/// metrics operator release known to block a clean install.
fn remove_stale_installation(
    store: &dyn ObjectStore,
    ctx: &Context,
    cr: &Observability,
) -> ReconcileResult<()> {
    info!(
        namespace = cr.prometheus_operator_namespace(),
        csv = model::STALE_PROMETHEUS_CSV,
        "catalog source missing, clearing stale operator installation"
    );
    delete_in_order(
        store,
        ctx,
        &[
            model::prometheus_subscription(cr),
            model::stale_prometheus_csv(cr),
        ],
    )
}

impl Stage for InstallationStage {
    fn name(&self) -> &str {
        "installation"
    }

    fn reconcile(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
        _status: &mut ObservabilityStatus,
    ) -> ReconcileResult<StageOutcome> {
        if cr.descoped_mode_enabled() {
            self.reconcile_namespace(store, ctx, cr)?;
        }
        self.reconcile_catalog_source(store, ctx, cr)?;
        self.reconcile_subscription(store, ctx, cr)?;
        self.reconcile_operator_group(store, ctx, cr)?;

        poll::workload_ready(
            store,
            ctx,
            cr.prometheus_operator_namespace(),
            model::PROMETHEUS_OPERATOR_DEPLOYMENT,
        )
    }

    fn cleanup(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
    ) -> ReconcileResult<StageOutcome> {
        let mut ids = vec![
            model::prometheus_subscription(cr),
            model::prometheus_operator_group(cr),
            model::prometheus_catalog_source(cr),
        ];
        if cr.descoped_mode_enabled() {
            ids.push(model::prometheus_namespace(cr));
        }
        delete_in_order(store, ctx, &ids)?;
        Ok(StageOutcome::Success)
    }
}
