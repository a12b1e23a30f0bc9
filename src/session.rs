//! Host-facing facade. A session owns one router for its whole lifetime;
//! dropping the session drops every registered method with it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::call::{JitTrampoline, Trampoline};
use crate::error::{BridgeError, Result};
use crate::registry::loader::{ModuleLoader, SystemLoader};
use crate::registry::{MemberId, NameTable};
use crate::router::Router;
use crate::value::TaggedValue;

/// How the host wants a member invoked. Only method calls are supported;
/// members expose no properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Method,
    PropertyGet,
    PropertyPut,
}

pub struct Session<T = JitTrampoline, L = SystemLoader> {
    router: Router<T, L>,
}

impl Session {
    pub fn open() -> Result<Self> {
        Ok(Session { router: Router::new()? })
    }
}

impl<T: Trampoline, L: ModuleLoader> Session<T, L> {
    pub fn with_router(router: Router<T, L>) -> Self {
        Session { router }
    }

    pub fn router(&self) -> &Router<T, L> {
        &self.router
    }

    pub fn names(&self) -> &NameTable {
        self.router.names()
    }

    pub fn id_of_name(&self, name: &str) -> Result<MemberId> {
        self.router.find_id(name)
    }

    /// # Safety
    ///
    /// See [`Router::route`].
    pub unsafe fn invoke(&mut self, id: MemberId, kind: InvokeKind, args: &[TaggedValue]) -> Result<TaggedValue> {
        if kind != InvokeKind::Method {
            return Err(BridgeError::NotAMethod(id));
        }
        unsafe { self.router.route(id, args) }
    }
}

/// A session shared between threads. Every operation runs under one lock,
/// so name lookup plus registration is a single atomic step.
pub struct SharedSession<T = JitTrampoline, L = SystemLoader> {
    inner: Mutex<Session<T, L>>,
}

impl SharedSession {
    pub fn open() -> Result<Self> {
        Ok(SharedSession::new(Session::open()?))
    }
}

impl<T: Trampoline, L: ModuleLoader> SharedSession<T, L> {
    pub fn new(session: Session<T, L>) -> Self {
        SharedSession { inner: Mutex::new(session) }
    }

    // Registration is append-only, so a panic mid-call cannot leave the
    // tables half-written; a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Session<T, L>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id_of_name(&self, name: &str) -> Result<MemberId> {
        self.lock().id_of_name(name)
    }

    /// Id of the first member named `function`, registering it from `module`
    /// when no such member exists yet.
    pub fn resolve_or_register(&self, module: &str, function: &str) -> Result<MemberId> {
        let mut session = self.lock();
        match session.router.find_id(function) {
            Ok(id) => Ok(id),
            Err(BridgeError::NotFound(_)) => session.router.register(module, function),
            Err(e) => Err(e),
        }
    }

    /// # Safety
    ///
    /// See [`Router::route`].
    pub unsafe fn invoke(&self, id: MemberId, kind: InvokeKind, args: &[TaggedValue]) -> Result<TaggedValue> {
        unsafe { self.lock().invoke(id, kind, args) }
    }

    pub fn into_inner(self) -> Session<T, L> {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
