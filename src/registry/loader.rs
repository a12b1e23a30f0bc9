//! Module loading: the only facility the registry consumes from the host.

use std::collections::HashMap;
use std::ffi::c_void;

use libloading::{Library, Symbol};

use crate::call::FnAddr;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("module not found: {0}")]
    Module(String),
    #[error("symbol not found: {0}")]
    Symbol(String),
}

pub trait ModuleLoader {
    type Module;

    /// Load or locate `name`. A loaded module stays resident for the rest of
    /// the process.
    fn load_module(&mut self, name: &str) -> Result<Self::Module, LoadError>;

    fn resolve_symbol(&mut self, module: &Self::Module, name: &str) -> Result<FnAddr, LoadError>;
}

/// Loads shared libraries through the platform dynamic loader.
///
/// Libraries are leaked on purpose: every address handed out must stay valid
/// for as long as a method refers to it, and nothing is ever unregistered.
/// Loading the same library again only bumps the loader's reference count.
#[derive(Debug, Default)]
pub struct SystemLoader;

impl ModuleLoader for SystemLoader {
    type Module = &'static Library;

    fn load_module(&mut self, name: &str) -> Result<Self::Module, LoadError> {
        let library = unsafe { Library::new(name) }.map_err(|e| LoadError::Module(e.to_string()))?;
        log::debug!("loaded module '{}'", name);
        Ok(Box::leak(Box::new(library)))
    }

    fn resolve_symbol(&mut self, module: &Self::Module, name: &str) -> Result<FnAddr, LoadError> {
        let symbol: Symbol<*const c_void> =
            unsafe { module.get(name.as_bytes()) }.map_err(|e| LoadError::Symbol(e.to_string()))?;
        FnAddr::new(*symbol).ok_or_else(|| LoadError::Symbol(format!("'{}' resolved to null", name)))
    }
}

/// In-process symbol table, for hosts that expose their own `extern "C"`
/// functions under a module name.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    modules: HashMap<String, HashMap<String, FnAddr>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn insert(&mut self, module: &str, symbol: &str, function: FnAddr) -> &mut Self {
        self.modules.entry(module.to_string()).or_default().insert(symbol.to_string(), function);
        self
    }

    pub fn with(mut self, module: &str, symbol: &str, function: FnAddr) -> Self {
        self.insert(module, symbol, function);
        self
    }
}

impl ModuleLoader for SymbolTable {
    type Module = String;

    fn load_module(&mut self, name: &str) -> Result<Self::Module, LoadError> {
        if self.modules.contains_key(name) {
            Ok(name.to_string())
        } else {
            Err(LoadError::Module(name.to_string()))
        }
    }

    fn resolve_symbol(&mut self, module: &Self::Module, name: &str) -> Result<FnAddr, LoadError> {
        self.modules
            .get(module)
            .and_then(|symbols| symbols.get(name))
            .copied()
            .ok_or_else(|| LoadError::Symbol(name.to_string()))
    }
}
