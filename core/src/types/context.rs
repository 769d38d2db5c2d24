use std::time::{Duration, Instant};

use crate::error::StoreError;

/// Per-tick call context carrying an optional deadline.
///
/// Passed to every store call. Once the deadline has passed, store calls fail
/// with `StoreError::DeadlineExceeded` instead of touching the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    deadline: Option<Instant>,
}

impl Context {
    /// A context that never expires.
    pub fn background() -> Self {
        Context { deadline: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Context {
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Context {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        match self.deadline {
            Some(d) => Instant::now() >= d,
            None => false,
        }
    }

    /// Time left before the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail fast when the deadline has passed.
    pub fn check(&self) -> Result<(), StoreError> {
        if self.is_expired() {
            Err(StoreError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}
