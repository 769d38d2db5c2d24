//! Remote-write credentials. Nothing to converge; teardown removes the secret.

use crate::error::ReconcileResult;
use crate::model;
use crate::store::{self, ObjectStore};
use crate::types::context::Context;
use crate::types::spec::Observability;
use crate::types::status::{ObservabilityStatus, StageOutcome};

use super::Stage;

#[derive(Debug, Default)]
pub struct TokenStage;

impl Stage for TokenStage {
    fn name(&self) -> &str {
        "token"
    }

    fn reconcile(
        &self,
        _store: &dyn ObjectStore,
        _ctx: &Context,
        _cr: &Observability,
        _status: &mut ObservabilityStatus,
    ) -> ReconcileResult<StageOutcome> {
        Ok(StageOutcome::Success)
    }

    fn cleanup(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
    ) -> ReconcileResult<StageOutcome> {
        store::delete_if_present(store, ctx, &model::token_secret(cr))?;
        Ok(StageOutcome::Success)
    }
}
