//! Object store client boundary.
//!
//! Provides the `ObjectStore` trait the stages talk to and an in-memory
//! implementation with call recording and fault injection for tests and the
//! CLI harness.

pub mod memory;

use crate::error::StoreError;
use crate::types::context::Context;
use crate::types::object::{ManagedObject, ObjectRef, Selector};

/// A remote, eventually-consistent object store with optimistic concurrency.
///
/// Every call takes the tick's `Context`; implementations must fail with
/// `StoreError::DeadlineExceeded` once its deadline has passed.
pub trait ObjectStore {
    /// Fetch one object. `StoreError::NotFound` when absent.
    fn get(&self, ctx: &Context, identity: &ObjectRef) -> Result<ManagedObject, StoreError>;

    /// Store a new object. `StoreError::AlreadyExists` when the identity is taken.
    /// Returns the stored object with its assigned token.
    fn create(&self, ctx: &Context, object: ManagedObject) -> Result<ManagedObject, StoreError>;

    /// Replace an object. The submitted `resource_version` must match the
    /// stored one, otherwise `StoreError::StaleToken`.
    fn update(&self, ctx: &Context, object: ManagedObject) -> Result<ManagedObject, StoreError>;

    /// Remove an object. `StoreError::NotFound` when already absent.
    fn delete(&self, ctx: &Context, identity: &ObjectRef) -> Result<(), StoreError>;

    /// All objects matching the selector, in a stable order.
    fn list(&self, ctx: &Context, selector: &Selector) -> Result<Vec<ManagedObject>, StoreError>;
}

/// Delete an object, treating an already-absent object as success.
///
/// Returns whether an object was actually removed.
pub fn delete_if_present(
    store: &dyn ObjectStore,
    ctx: &Context,
    identity: &ObjectRef,
) -> Result<bool, StoreError> {
    match store.delete(ctx, identity) {
        Ok(()) => {
            tracing::debug!(object = %identity, "deleted");
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
