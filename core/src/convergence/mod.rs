//! Convergence engine: brings live objects to the desired state.
//!
//! The `apply` module performs fetch-mutate-submit for one object, `poll`
//! answers readiness questions without blocking, `orchestrator` runs the
//! stage list once per tick and `retry` computes requeue backoff.

pub mod apply;
pub mod orchestrator;
pub mod poll;
pub mod retry;
