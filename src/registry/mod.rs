//! Method registry: name resolution, dense id allocation and the name table.

use std::fmt;

use serde::Serialize;

use crate::error::{BridgeError, Result};
use crate::method::DynamicMethod;

pub mod loader;

use crate::call::FnAddr;
use loader::{LoadError, ModuleLoader};

/// Member id handed to the host. Built-ins occupy `0..builtin_count`,
/// registered methods follow densely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MemberId(pub u32);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameEntry {
    pub id: MemberId,
    pub name: String,
}

/// (id, name) pairs in registration order. Lookups scan linearly and the
/// first exact, case-sensitive match wins.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct NameTable {
    entries: Vec<NameEntry>,
}

impl NameTable {
    fn push(&mut self, id: MemberId, name: &str) {
        self.entries.push(NameEntry { id, name: name.to_string() });
    }

    pub fn find(&self, name: &str) -> Option<MemberId> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.id)
    }

    pub fn entries(&self) -> &[NameEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct MethodRegistry<L> {
    loader: L,
    builtin_count: u32,
    methods: Vec<DynamicMethod>,
    names: NameTable,
}

impl<L: ModuleLoader> MethodRegistry<L> {
    /// Create a registry whose first ids belong to `builtins`, in order.
    pub fn new(loader: L, builtins: &[&str]) -> Self {
        let mut names = NameTable::default();
        for (id, name) in builtins.iter().enumerate() {
            names.push(MemberId(id as u32), name);
        }
        MethodRegistry { loader, builtin_count: builtins.len() as u32, methods: Vec::new(), names }
    }

    pub fn builtin_count(&self) -> u32 {
        self.builtin_count
    }

    pub fn dynamic_count(&self) -> usize {
        self.methods.len()
    }

    /// Id the next successful registration will receive.
    pub fn next_id(&self) -> MemberId {
        MemberId(self.builtin_count + self.methods.len() as u32)
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    pub fn find_id(&self, name: &str) -> Result<MemberId> {
        self.names.find(name).ok_or_else(|| BridgeError::NotFound(name.to_string()))
    }

    /// Method at dynamic slot `index` (its id minus the built-in count).
    pub fn method(&self, index: usize) -> Option<&DynamicMethod> {
        self.methods.get(index)
    }

    pub fn methods(&self) -> &[DynamicMethod] {
        &self.methods
    }

    /// Resolve `function` inside `module` and register it under the next id.
    /// A failed registration leaves the registry untouched.
    pub fn register(&mut self, module: &str, function: &str) -> Result<MemberId> {
        if module.is_empty() || function.is_empty() {
            return Err(BridgeError::InvalidArgument("module and function names must not be empty".into()));
        }
        let resolved = self
            .resolve(module, function)
            .map_err(|source| BridgeError::ResolutionFailed {
                module: module.to_string(),
                function: function.to_string(),
                source,
            })?;

        let id = self.next_id();
        self.methods.push(DynamicMethod::new(id, function, resolved));
        self.names.push(id, function);
        log::debug!("registered {}!{} as member {} at {:?}", module, function, id, resolved);
        Ok(id)
    }

    fn resolve(&mut self, module: &str, function: &str) -> std::result::Result<FnAddr, LoadError> {
        let handle = self.loader.load_module(module)?;
        self.loader.resolve_symbol(&handle, function)
    }
}
