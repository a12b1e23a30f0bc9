//! Dispatch router: maps a member id to a built-in operation or a
//! registered dynamic method.

use crate::call::{JitTrampoline, Trampoline};
use crate::error::{BridgeError, Result};
use crate::poke;
use crate::registry::loader::{ModuleLoader, SystemLoader};
use crate::registry::{MemberId, MethodRegistry, NameTable};
use crate::value::TaggedValue;

/// Built-in members, in id order.
pub const BUILTIN_NAMES: [&str; 2] = ["DwRegister", "WriteByte"];
pub const BUILTIN_COUNT: u32 = BUILTIN_NAMES.len() as u32;

pub const REGISTER_ID: MemberId = MemberId(0);
pub const WRITE_BYTE_ID: MemberId = MemberId(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Register,
    WriteByte,
    /// Index into the registry's dynamic methods.
    Dynamic(usize),
}

impl Dispatch {
    pub fn resolve(id: MemberId, dynamic_count: usize) -> Result<Dispatch> {
        match id {
            REGISTER_ID => Ok(Dispatch::Register),
            WRITE_BYTE_ID => Ok(Dispatch::WriteByte),
            MemberId(n) => {
                let index = (n - BUILTIN_COUNT) as usize;
                if index < dynamic_count {
                    Ok(Dispatch::Dynamic(index))
                } else {
                    Err(BridgeError::UnknownId(id))
                }
            }
        }
    }
}

pub struct Router<T = JitTrampoline, L = SystemLoader> {
    registry: MethodRegistry<L>,
    trampoline: T,
}

impl Router {
    /// Router over the system dynamic loader and the Cranelift trampoline.
    pub fn new() -> Result<Self> {
        Ok(Router::with_parts(JitTrampoline::new()?, SystemLoader))
    }
}

impl<T: Trampoline, L: ModuleLoader> Router<T, L> {
    pub fn with_parts(trampoline: T, loader: L) -> Self {
        Router { registry: MethodRegistry::new(loader, &BUILTIN_NAMES), trampoline }
    }

    pub fn registry(&self) -> &MethodRegistry<L> {
        &self.registry
    }

    pub fn trampoline(&self) -> &T {
        &self.trampoline
    }

    pub fn names(&self) -> &NameTable {
        self.registry.names()
    }

    pub fn find_id(&self, name: &str) -> Result<MemberId> {
        self.registry.find_id(name)
    }

    pub fn register(&mut self, module: &str, function: &str) -> Result<MemberId> {
        self.registry.register(module, function)
    }

    pub fn dispatch(&self, id: MemberId) -> Result<Dispatch> {
        Dispatch::resolve(id, self.registry.dynamic_count())
    }

    /// Execute member `id` with `args` in caller order.
    ///
    /// # Safety
    ///
    /// Dynamic members call native code with caller-classified arguments and
    /// `WriteByte` writes to an arbitrary address. The caller vouches for both.
    pub unsafe fn route(&mut self, id: MemberId, args: &[TaggedValue]) -> Result<TaggedValue> {
        let target = self.dispatch(id)?;
        log::trace!("route member {} -> {:?} with {} argument(s)", id, target, args.len());
        match target {
            Dispatch::Register => self.register_method(args),
            Dispatch::WriteByte => unsafe { builtin_write_byte(args) },
            Dispatch::Dynamic(index) => {
                let method = self.registry.method(index).ok_or(BridgeError::UnknownId(id))?;
                unsafe { method.invoke(&mut self.trampoline, args) }
            }
        }
    }

    /// `DwRegister(function, module)`.
    fn register_method(&mut self, args: &[TaggedValue]) -> Result<TaggedValue> {
        match args {
            [TaggedValue::Str(function), TaggedValue::Str(module)] => {
                self.registry.register(module, function)?;
                Ok(TaggedValue::Bool(true))
            }
            _ => Err(BridgeError::InvalidArgument(format!(
                "DwRegister expects (function: str, module: str), got {} argument(s)",
                args.len()
            ))),
        }
    }
}

/// `WriteByte(offset, base, value)`.
unsafe fn builtin_write_byte(args: &[TaggedValue]) -> Result<TaggedValue> {
    let [offset, base, value] = args else {
        return Err(BridgeError::InvalidArgument(format!("WriteByte expects 3 arguments, got {}", args.len())));
    };
    let integer = |v: &TaggedValue, what: &str| {
        v.widened().ok_or_else(|| BridgeError::InvalidArgument(format!("WriteByte {} must be an integer, got {}", what, v.kind())))
    };
    let offset = integer(offset, "offset")? as i32;
    let base = integer(base, "base address")?;
    let value = integer(value, "value")? as u8;
    unsafe { poke::write_byte(base, offset, value) };
    Ok(TaggedValue::Bool(true))
}
