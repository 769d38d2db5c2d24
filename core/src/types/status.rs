use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of one stage invocation, or of a whole tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    InProgress,
    Failed,
}

impl StageOutcome {
    pub fn is_success(self) -> bool {
        self == StageOutcome::Success
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Success => write!(f, "success"),
            StageOutcome::InProgress => write!(f, "in_progress"),
            StageOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Durable record of the controller's progress, written back once per tick.
///
/// `migrated` is sticky: it can be set through `mark_migrated` and has no
/// setter that clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObservabilityStatus {
    /// The stage attempted last in the most recent tick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Aggregate outcome of the most recent tick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_status: Option<StageOutcome>,
    /// Per-stage outcome markers. Stages not reached in the last tick keep
    /// their previous marker.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stages: BTreeMap<String, StageOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default)]
    migrated: bool,
}

impl ObservabilityStatus {
    pub fn is_migrated(&self) -> bool {
        self.migrated
    }

    /// Record that the one-time legacy name migration has completed.
    pub fn mark_migrated(&mut self) {
        self.migrated = true;
    }

    pub fn record_stage(&mut self, stage: &str, outcome: StageOutcome) {
        self.stage = Some(stage.to_string());
        self.stages.insert(stage.to_string(), outcome);
    }

    pub fn stage_outcome(&self, stage: &str) -> Option<StageOutcome> {
        self.stages.get(stage).copied()
    }
}
