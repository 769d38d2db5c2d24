//! Stage orchestrator: runs the stage list once per tick.
//!
//! Stages run in declared order. The first stage that does not report
//! `Success` ends the tick and its outcome becomes the tick's outcome; later
//! stages are not attempted. Every stage runs again on the next tick, so drift
//! introduced by other actors after a stage succeeded is repaired.

use tracing::{debug, info, warn};

use crate::convergence::apply::Applier;
use crate::error::{ErrorClass, ReconcileError, ReconcileResult};
use crate::stages::installation::InstallationStage;
use crate::stages::migration::MigrationGate;
use crate::stages::sync::ResourceSyncStage;
use crate::stages::token::TokenStage;
use crate::stages::Stage;
use crate::store::ObjectStore;
use crate::types::config::Settings;
use crate::types::context::Context;
use crate::types::spec::Observability;
use crate::types::status::{ObservabilityStatus, StageOutcome};

/// Outcome of one orchestrator pass.
#[derive(Debug)]
pub struct TickResult {
    pub outcome: StageOutcome,
    /// The stage that produced `outcome`, if any stage ran.
    pub stage: Option<String>,
    pub error: Option<ReconcileError>,
}

impl TickResult {
    pub fn error_class(&self) -> Option<ErrorClass> {
        self.error.as_ref().map(ReconcileError::class)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Reconcile,
    Cleanup,
}

/// Sequences a fixed list of stages.
pub struct Orchestrator {
    stages: Vec<Box<dyn Stage>>,
}

impl Orchestrator {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Orchestrator { stages }
    }

    /// The production stage list.
    pub fn standard(settings: &Settings) -> Self {
        let applier = Applier::new(settings.max_apply_attempts);
        Orchestrator::new(vec![
            Box::new(InstallationStage::new(applier)),
            Box::new(MigrationGate::new()),
            Box::new(ResourceSyncStage::prometheus(applier)),
            Box::new(ResourceSyncStage::alertmanager(applier)),
            Box::new(ResourceSyncStage::grafana(applier)),
            Box::new(ResourceSyncStage::promtail(applier)),
            Box::new(TokenStage),
        ])
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage's `reconcile` until one does not succeed.
    pub fn reconcile(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
        status: &mut ObservabilityStatus,
    ) -> TickResult {
        self.run(Pass::Reconcile, cr, status, |stage, status| {
            stage.reconcile(store, ctx, cr, status)
        })
    }

    /// Run every stage's `cleanup` until one does not succeed.
    pub fn cleanup(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
        status: &mut ObservabilityStatus,
    ) -> TickResult {
        self.run(Pass::Cleanup, cr, status, |stage, _| stage.cleanup(store, ctx, cr))
    }

    fn run<F>(
        &self,
        pass: Pass,
        cr: &Observability,
        status: &mut ObservabilityStatus,
        mut invoke: F,
    ) -> TickResult
    where
        F: FnMut(&dyn Stage, &mut ObservabilityStatus) -> ReconcileResult<StageOutcome>,
    {
        if let Err(e) = cr.validate() {
            warn!(name = %cr.name, error = %e, "rejecting desired specification");
            return finish(status, StageOutcome::Failed, None, Some(e));
        }

        let mut last = None;
        for stage in &self.stages {
            let name = stage.name().to_string();
            let (outcome, error) = match invoke(stage.as_ref(), status) {
                Ok(outcome) => (outcome, None),
                Err(e) => (StageOutcome::Failed, Some(e)),
            };
            match pass {
                Pass::Reconcile => status.record_stage(&name, outcome),
                Pass::Cleanup => status.stage = Some(name.clone()),
            }

            if !outcome.is_success() {
                match &error {
                    Some(e) => {
                        warn!(stage = %name, ?pass, class = %e.class(), error = %e, "stage failed")
                    }
                    None => debug!(stage = %name, ?pass, %outcome, "stage not ready"),
                }
                return finish(status, outcome, Some(name), error);
            }
            last = Some(name);
        }

        info!(name = %cr.name, namespace = %cr.namespace, ?pass, "all stages succeeded");
        finish(status, StageOutcome::Success, last, None)
    }
}

fn finish(
    status: &mut ObservabilityStatus,
    outcome: StageOutcome,
    stage: Option<String>,
    error: Option<ReconcileError>,
) -> TickResult {
    status.stage_status = Some(outcome);
    status.last_message = error.as_ref().map(|e| e.to_string());
    TickResult {
        outcome,
        stage,
        error,
    }
}
