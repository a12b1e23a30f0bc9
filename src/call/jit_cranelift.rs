//! Cranelift-generated native call stubs.
//!
//! One stub is compiled per call shape (argument register classes plus the
//! return class), using the host's default C calling convention:
//!
//! ```text
//! extern "C" fn(table: *const CallSlot, target: *const u8, out: *mut u64)
//! ```
//!
//! The stub loads native argument `j` from table slot `n - 1 - j`, calls
//! `target` indirectly and stores the selected return register into `out`.
//! Cranelift decides which arguments land in registers and which spill to
//! the stack.

use std::collections::HashMap;

use cranelift_codegen::Context;
use cranelift_codegen::ir::{AbiParam, InstBuilder, MemFlags, Type, types};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module, default_libcall_names};

use super::{CallResult, CallSlot, CallTable, FnAddr, SlotClass, Trampoline};
use crate::error::{BridgeError, Result};

type Stub = unsafe extern "C" fn(*const CallSlot, *const u8, *mut u64);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StubKey {
    params: Vec<SlotClass>,
    ret: SlotClass,
}

pub struct JitTrampoline {
    module: JITModule,
    ctx: Context,
    builder_ctx: FunctionBuilderContext,
    stubs: HashMap<StubKey, Stub>,
}

// Finalized stubs are immutable code and the module is only touched through &mut self.
unsafe impl Send for JitTrampoline {}

fn failed(e: impl std::fmt::Display) -> BridgeError {
    BridgeError::CallFailed(e.to_string())
}

fn value_type(class: SlotClass) -> Type {
    match class {
        SlotClass::Standard => types::I64,
        SlotClass::Floating => types::F64,
    }
}

impl JitTrampoline {
    pub fn new() -> Result<Self> {
        let mut flag_builder = settings::builder();
        flag_builder.set("opt_level", "speed").map_err(failed)?;
        let isa_builder = cranelift_native::builder().map_err(failed)?;
        let isa = isa_builder.finish(settings::Flags::new(flag_builder)).map_err(failed)?;

        let module = JITModule::new(JITBuilder::with_isa(isa, default_libcall_names()));
        let ctx = module.make_context();
        Ok(JitTrampoline {
            module,
            ctx,
            builder_ctx: FunctionBuilderContext::new(),
            stubs: HashMap::new(),
        })
    }

    /// Number of distinct call shapes compiled so far.
    pub fn stub_count(&self) -> usize {
        self.stubs.len()
    }

    fn stub_for(&mut self, key: StubKey) -> Result<Stub> {
        if let Some(stub) = self.stubs.get(&key) {
            return Ok(*stub);
        }
        let stub = self.compile(&key)?;
        log::debug!("compiled call stub #{} for {:?} -> {:?}", self.stubs.len(), key.params, key.ret);
        self.stubs.insert(key, stub);
        Ok(stub)
    }

    fn compile(&mut self, key: &StubKey) -> Result<Stub> {
        let ptr = self.module.target_config().pointer_type();

        // (table, target, out)
        let mut stub_sig = self.module.make_signature();
        for _ in 0..3 {
            stub_sig.params.push(AbiParam::new(ptr));
        }

        let mut target_sig = self.module.make_signature();
        for class in &key.params {
            target_sig.params.push(AbiParam::new(value_type(*class)));
        }
        target_sig.returns.push(AbiParam::new(value_type(key.ret)));

        let name = format!("dynwrap_stub_{}", self.stubs.len());
        let func_id = self.module.declare_function(&name, Linkage::Local, &stub_sig).map_err(failed)?;

        self.ctx.func.signature = stub_sig;
        {
            let mut builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx);
            let entry = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            builder.seal_block(entry);

            let params = builder.block_params(entry).to_vec();
            let (table, target, out) = (params[0], params[1], params[2]);

            let n = key.params.len();
            let mut args = Vec::with_capacity(n);
            for (j, class) in key.params.iter().enumerate() {
                let offset = ((n - 1 - j) * CallSlot::STRIDE) as i32 + CallSlot::PAYLOAD_OFFSET;
                args.push(builder.ins().load(value_type(*class), MemFlags::trusted(), table, offset));
            }

            let sig_ref = builder.import_signature(target_sig);
            let call = builder.ins().call_indirect(sig_ref, target, &args);
            let result = builder.inst_results(call)[0];
            builder.ins().store(MemFlags::trusted(), result, out, 0);
            builder.ins().return_(&[]);
            builder.finalize();
        }

        let defined = self.module.define_function(func_id, &mut self.ctx);
        self.module.clear_context(&mut self.ctx);
        defined.map_err(failed)?;
        self.module.finalize_definitions().map_err(failed)?;

        let code = self.module.get_finalized_function(func_id);
        Ok(unsafe { std::mem::transmute::<*const u8, Stub>(code) })
    }
}

impl Trampoline for JitTrampoline {
    unsafe fn call(&mut self, table: &CallTable, function: FnAddr, ret: SlotClass) -> Result<CallResult> {
        let stub = self.stub_for(StubKey { params: table.native_classes(), ret })?;
        let mut out = 0u64;
        unsafe { stub(table.as_ptr(), function.as_ptr(), &mut out) };
        Ok(match ret {
            SlotClass::Standard => CallResult::Standard(out),
            SlotClass::Floating => CallResult::Floating(f64::from_bits(out)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;

    extern "C" fn sub3(a: i64, b: i64, c: i64) -> i64 {
        a - b - c
    }

    extern "C" fn mixed(a: i64, x: f64, b: i64, y: f64) -> f64 {
        a as f64 * x - b as f64 * y
    }

    #[allow(clippy::too_many_arguments)]
    extern "C" fn weigh10(a0: i64, a1: i64, a2: i64, a3: i64, a4: i64, a5: i64, a6: i64, a7: i64, a8: i64, a9: i64) -> i64 {
        a0 + 2 * a1 + 3 * a2 + 4 * a3 + 5 * a4 + 6 * a5 + 7 * a6 + 8 * a7 + 9 * a8 + 10 * a9
    }

    extern "C" fn answer() -> i64 {
        42
    }

    fn addr(f: *const ()) -> FnAddr {
        FnAddr::new(f as *const c_void).unwrap()
    }

    fn ints_reversed(values: &[i64]) -> CallTable {
        CallTable::from_slots(values.iter().rev().map(|&v| CallSlot::standard(v as u64, 8)).collect())
    }

    #[test]
    fn integer_arguments_arrive_in_order() {
        let mut tramp = JitTrampoline::new().unwrap();
        let table = ints_reversed(&[10, 3, 2]);
        assert_eq!(table.slots()[0].payload, 2);
        let res = unsafe { tramp.call(&table, addr(sub3 as *const ()), SlotClass::Standard) }.unwrap();
        assert_eq!(res, CallResult::Standard(5));
    }

    #[test]
    fn mixed_classes_and_floating_return() {
        let mut tramp = JitTrampoline::new().unwrap();
        // mixed(3, 0.5, 4, 0.25), stored last argument first
        let table = CallTable::from_slots(vec![
            CallSlot::floating(0.25),
            CallSlot::standard(4, 8),
            CallSlot::floating(0.5),
            CallSlot::standard(3, 8),
        ]);
        let res = unsafe { tramp.call(&table, addr(mixed as *const ()), SlotClass::Floating) }.unwrap();
        assert_eq!(res, CallResult::Floating(0.5));
    }

    #[test]
    fn stack_arguments_keep_their_positions() {
        let mut tramp = JitTrampoline::new().unwrap();
        let args: Vec<i64> = (1..=10).collect();
        let res = unsafe { tramp.call(&ints_reversed(&args), addr(weigh10 as *const ()), SlotClass::Standard) }.unwrap();
        assert_eq!(res, CallResult::Standard(385));
    }

    #[test]
    fn empty_table_calls_nullary_function() {
        let mut tramp = JitTrampoline::new().unwrap();
        let res = unsafe { tramp.call(&CallTable::default(), addr(answer as *const ()), SlotClass::Standard) }.unwrap();
        assert_eq!(res, CallResult::Standard(42));
    }

    #[test]
    fn stubs_are_cached_per_shape() {
        let mut tramp = JitTrampoline::new().unwrap();
        let f = addr(sub3 as *const ());
        unsafe {
            tramp.call(&ints_reversed(&[1, 2, 3]), f, SlotClass::Standard).unwrap();
            tramp.call(&ints_reversed(&[7, 8, 9]), f, SlotClass::Standard).unwrap();
        }
        assert_eq!(tramp.stub_count(), 1);
        unsafe { tramp.call(&CallTable::default(), addr(answer as *const ()), SlotClass::Standard) }.unwrap();
        assert_eq!(tramp.stub_count(), 2);
    }
}
