//! obsconv: staged convergence for a self-contained observability stack.
//!
//! A periodic controller that brings a live object store in line with one
//! desired `Observability` specification: install the metrics operator,
//! migrate objects away from legacy names once, keep the metrics,
//! alerting, dashboard and log shipping objects in sync, and tear all of it
//! down again on request.
//!
//! # Modules
//!
//! - [`store`]: Object store client trait and the in-memory store
//! - [`convergence`]: Applier, readiness polling, stage orchestrator, backoff
//! - [`stages`]: Installation, migration gate, resource sync, token cleanup
//! - [`scheduler`]: Tick loop, status persistence, requeue decisions
//! - [`model`]: Well-known object names and identities
//! - [`settings`]: Loading controller settings from YAML
//! - [`types`]: Objects, desired specification, status, context, settings
//! - [`error`]: Error types and their retry classes

pub mod convergence;
pub mod error;
pub mod model;
pub mod scheduler;
pub mod settings;
pub mod stages;
pub mod store;
pub mod types;
