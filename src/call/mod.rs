//! Native call slots and the trampoline contract.
//!
//! A `CallTable` stores its slots last-argument-first: slot `0` holds the
//! rightmost argument of the native call and slot `len - 1` the leftmost.
//! Every `Trampoline` consumes the table in that order.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use crate::error::Result;

pub mod jit_cranelift;

pub use jit_cranelift::JitTrampoline;

/// Register class a slot (or the return value) travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SlotClass {
    Standard = 0,
    Floating = 2,
}

/// One native-call-ready argument. Layout is fixed because generated call
/// stubs read `payload` at byte offset 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CallSlot {
    pub class: SlotClass,
    pub size: u32,
    /// Integer or pointer value, or the IEEE-754 bits of a double.
    pub payload: u64,
}

impl CallSlot {
    pub const EMPTY: CallSlot = CallSlot { class: SlotClass::Standard, size: 0, payload: 0 };
    pub(crate) const PAYLOAD_OFFSET: i32 = 8;
    pub(crate) const STRIDE: usize = std::mem::size_of::<CallSlot>();

    pub fn standard(payload: u64, size: u32) -> Self {
        CallSlot { class: SlotClass::Standard, size, payload }
    }

    pub fn floating(value: f64) -> Self {
        CallSlot { class: SlotClass::Floating, size: 8, payload: value.to_bits() }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.class {
            SlotClass::Floating => Some(f64::from_bits(self.payload)),
            SlotClass::Standard => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallTable {
    slots: Vec<CallSlot>,
}

impl CallTable {
    pub fn with_len(len: usize) -> Self {
        CallTable { slots: vec![CallSlot::EMPTY; len] }
    }

    /// Wrap slots that are already in table (reversed) order.
    pub fn from_slots(slots: Vec<CallSlot>) -> Self {
        CallTable { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[CallSlot] {
        &self.slots
    }

    pub fn set(&mut self, index: usize, slot: CallSlot) {
        self.slots[index] = slot;
    }

    /// Slot classes in native argument order (leftmost argument first).
    pub fn native_classes(&self) -> Vec<SlotClass> {
        self.slots.iter().rev().map(|s| s.class).collect()
    }

    pub(crate) fn as_ptr(&self) -> *const CallSlot {
        self.slots.as_ptr()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallResult {
    Standard(u64),
    Floating(f64),
}

/// Address of a resolved native function. Never null.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FnAddr(NonNull<c_void>);

// The address is plain immutable code; it carries no thread affinity.
unsafe impl Send for FnAddr {}
unsafe impl Sync for FnAddr {}

impl FnAddr {
    pub fn new(ptr: *const c_void) -> Option<Self> {
        NonNull::new(ptr as *mut c_void).map(FnAddr)
    }

    pub fn as_ptr(self) -> *const u8 {
        self.0.as_ptr() as *const u8
    }

    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for FnAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnAddr({:#x})", self.addr())
    }
}

/// Performs one native call from a prepared table.
pub trait Trampoline {
    /// Call `function` with the arguments in `table`, capturing the return
    /// register selected by `ret`.
    ///
    /// # Safety
    ///
    /// `function` must be callable with exactly the slots in `table`, in the
    /// register classes they carry, under the host's C calling convention.
    /// Any mismatch is undefined behavior and is not detected.
    unsafe fn call(&mut self, table: &CallTable, function: FnAddr, ret: SlotClass) -> Result<CallResult>;
}
