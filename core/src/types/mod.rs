//! Data model shared by the store, the stages and the scheduler.

pub mod config;
pub mod context;
pub mod object;
pub mod spec;
pub mod status;
