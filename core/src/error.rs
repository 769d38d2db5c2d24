//! Error types for the convergence loop.
//!
//! Every error a stage can return maps onto one `ErrorClass`, so the caller
//! can apply a single backoff policy instead of per-stage handling.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::object::ObjectRef;

/// Coarse classification used by the scheduler to pick a requeue policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The object is already absent. Absorbed at delete sites.
    NotFound,
    /// Concurrent mutation detected.
    Conflict,
    /// Network trouble, timeouts, expired deadlines.
    Transient,
    /// Malformed input or an irrecoverable store error. Needs an operator.
    Fatal,
}

impl ErrorClass {
    /// Whether retrying the whole tick later can succeed without outside help.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::Fatal)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::NotFound => write!(f, "not_found"),
            ErrorClass::Conflict => write!(f, "conflict"),
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Fatal => write!(f, "fatal"),
        }
    }
}

/// Outcomes reported by an `ObjectStore` implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ObjectRef),

    #[error("{0} already exists")]
    AlreadyExists(ObjectRef),

    #[error("stale token for {identity}: submitted {submitted}, current {current}")]
    StaleToken {
        identity: ObjectRef,
        submitted: u64,
        current: u64,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("store rejected {identity}: {reason}")]
    Rejected { identity: ObjectRef, reason: String },
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::NotFound(_) => ErrorClass::NotFound,
            StoreError::AlreadyExists(_) | StoreError::StaleToken { .. } => ErrorClass::Conflict,
            StoreError::Unavailable(_) | StoreError::DeadlineExceeded => ErrorClass::Transient,
            StoreError::Rejected { .. } => ErrorClass::Fatal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors returned by stages, the orchestrator and the scheduler.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("gave up on {identity} after {attempts} conflicting attempts")]
    ConflictRetriesExhausted { identity: ObjectRef, attempts: u32 },

    #[error("invalid desired specification: {0}")]
    InvalidSpec(String),

    #[error("cannot render {identity}: {reason}")]
    Render { identity: ObjectRef, reason: String },

    #[error("status store: {0}")]
    Status(String),
}

impl ReconcileError {
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        ReconcileError::InvalidSpec(reason.into())
    }

    pub fn render(identity: &ObjectRef, reason: impl Into<String>) -> Self {
        ReconcileError::Render {
            identity: identity.clone(),
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcileError::Store(e) => e.class(),
            ReconcileError::ConflictRetriesExhausted { .. } => ErrorClass::Conflict,
            ReconcileError::InvalidSpec(_) | ReconcileError::Render { .. } => ErrorClass::Fatal,
            ReconcileError::Status(_) => ErrorClass::Transient,
        }
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
