//! In-memory object store.
//!
//! Records every call and serves injected faults, making it easy to write
//! deterministic tests for the stages and the orchestrator. Also backs the CLI
//! harness when run against a seeded object file.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::types::context::Context;
use crate::types::object::{ManagedObject, ObjectRef, Selector};

use super::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Create,
    Update,
    Delete,
    List,
}

/// One call made against the store, in the order received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get(ObjectRef),
    Create(ObjectRef),
    Update(ObjectRef),
    Delete(ObjectRef),
    List(Selector),
}

impl StoreCall {
    pub fn op(&self) -> Op {
        match self {
            StoreCall::Get(_) => Op::Get,
            StoreCall::Create(_) => Op::Create,
            StoreCall::Update(_) => Op::Update,
            StoreCall::Delete(_) => Op::Delete,
            StoreCall::List(_) => Op::List,
        }
    }

    pub fn target(&self) -> Option<&ObjectRef> {
        match self {
            StoreCall::Get(id)
            | StoreCall::Create(id)
            | StoreCall::Update(id)
            | StoreCall::Delete(id) => Some(id),
            StoreCall::List(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Fault {
    op: Op,
    target: Option<ObjectRef>,
    error: StoreError,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<ObjectRef, ManagedObject>,
    next_version: u64,
    calls: Vec<StoreCall>,
    faults: Vec<Fault>,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    /// Record the call, then hand back an injected fault if one matches.
    fn enter(&mut self, call: StoreCall) -> Result<(), StoreError> {
        let op = call.op();
        let pos = self.faults.iter().position(|f| {
            f.op == op
                && match (&f.target, call.target()) {
                    (None, _) => true,
                    (Some(want), Some(got)) => want == got,
                    (Some(_), None) => false,
                }
        });
        self.calls.push(call);
        match pos {
            Some(i) => Err(self.faults.remove(i).error),
            None => Ok(()),
        }
    }
}

/// A single-process object store with optimistic concurrency tokens.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RefCell<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Create a store seeded with objects. Tokens are reassigned.
    pub fn with_objects(objects: Vec<ManagedObject>) -> Self {
        let store = MemoryStore::new();
        for obj in objects {
            store.insert(obj);
        }
        store
    }

    /// Write an object as an outside actor would: no token check, no call
    /// recorded. Returns the assigned token.
    pub fn insert(&self, mut object: ManagedObject) -> u64 {
        let mut inner = self.inner.borrow_mut();
        let version = inner.bump();
        object.resource_version = version;
        inner.objects.insert(object.identity.clone(), object);
        version
    }

    /// Remove an object as an outside actor would.
    pub fn remove(&self, identity: &ObjectRef) -> Option<ManagedObject> {
        self.inner.borrow_mut().objects.remove(identity)
    }

    pub fn object(&self, identity: &ObjectRef) -> Option<ManagedObject> {
        self.inner.borrow().objects.get(identity).cloned()
    }

    pub fn contains(&self, identity: &ObjectRef) -> bool {
        self.inner.borrow().objects.contains_key(identity)
    }

    /// All stored objects in identity order.
    pub fn objects(&self) -> Vec<ManagedObject> {
        self.inner.borrow().objects.values().cloned().collect()
    }

    pub fn identities(&self) -> Vec<ObjectRef> {
        self.inner.borrow().objects.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.borrow().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.borrow().calls.len()
    }

    pub fn clear_calls(&self) {
        self.inner.borrow_mut().calls.clear();
    }

    /// Make the next matching call fail with `error`. `target: None` matches
    /// any object. Faults are consumed in the order they were added.
    pub fn fail_next(&self, op: Op, target: Option<ObjectRef>, error: StoreError) {
        self.inner
            .borrow_mut()
            .faults
            .push(Fault { op, target, error });
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, ctx: &Context, identity: &ObjectRef) -> Result<ManagedObject, StoreError> {
        let mut inner = self.inner.borrow_mut();
        inner.enter(StoreCall::Get(identity.clone()))?;
        ctx.check()?;
        inner
            .objects
            .get(identity)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(identity.clone()))
    }

    fn create(
        &self,
        ctx: &Context,
        mut object: ManagedObject,
    ) -> Result<ManagedObject, StoreError> {
        let mut inner = self.inner.borrow_mut();
        inner.enter(StoreCall::Create(object.identity.clone()))?;
        ctx.check()?;
        if inner.objects.contains_key(&object.identity) {
            return Err(StoreError::AlreadyExists(object.identity));
        }
        object.resource_version = inner.bump();
        inner.objects.insert(object.identity.clone(), object.clone());
        Ok(object)
    }

    fn update(
        &self,
        ctx: &Context,
        mut object: ManagedObject,
    ) -> Result<ManagedObject, StoreError> {
        let mut inner = self.inner.borrow_mut();
        inner.enter(StoreCall::Update(object.identity.clone()))?;
        ctx.check()?;
        let current = match inner.objects.get(&object.identity) {
            Some(existing) => existing.resource_version,
            None => return Err(StoreError::NotFound(object.identity)),
        };
        if current != object.resource_version {
            return Err(StoreError::StaleToken {
                identity: object.identity,
                submitted: object.resource_version,
                current,
            });
        }
        object.resource_version = inner.bump();
        inner.objects.insert(object.identity.clone(), object.clone());
        Ok(object)
    }

    fn delete(&self, ctx: &Context, identity: &ObjectRef) -> Result<(), StoreError> {
        let mut inner = self.inner.borrow_mut();
        inner.enter(StoreCall::Delete(identity.clone()))?;
        ctx.check()?;
        inner
            .objects
            .remove(identity)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(identity.clone()))
    }

    fn list(&self, ctx: &Context, selector: &Selector) -> Result<Vec<ManagedObject>, StoreError> {
        let mut inner = self.inner.borrow_mut();
        inner.enter(StoreCall::List(selector.clone()))?;
        ctx.check()?;
        Ok(inner
            .objects
            .values()
            .filter(|o| o.matches(selector))
            .cloned()
            .collect())
    }
}
