//! dynwrap: resolve native functions by name at runtime, register them under
//! dense numeric ids and call them with late-bound, tagged arguments.
//!
//! ```text
//! host ─▶ Session ─▶ Router ─┬─▶ DwRegister ─▶ MethodRegistry ─▶ ModuleLoader
//!                            ├─▶ WriteByte  ─▶ poke::write_byte
//!                            └─▶ DynamicMethod ─▶ Trampoline ─▶ native code
//! ```

pub mod call;
pub mod error;
pub mod method;
pub mod poke;
pub mod registry;
pub mod router;
pub mod session;
pub mod value;

pub use call::{CallResult, CallSlot, CallTable, FnAddr, JitTrampoline, SlotClass, Trampoline};
pub use error::{BridgeError, Result};
pub use method::DynamicMethod;
pub use registry::loader::{LoadError, ModuleLoader, SymbolTable, SystemLoader};
pub use registry::{MemberId, MethodRegistry, NameEntry, NameTable};
pub use router::{BUILTIN_NAMES, Dispatch, Router};
pub use session::{InvokeKind, Session, SharedSession};
pub use value::{TaggedValue, ValueKind};
