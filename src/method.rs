use std::ffi::CString;

use crate::call::{CallResult, CallSlot, CallTable, FnAddr, SlotClass, Trampoline};
use crate::error::{BridgeError, Result};
use crate::registry::MemberId;
use crate::value::TaggedValue;

/// A registered native function: id, display name and resolved address.
#[derive(Debug, Clone)]
pub struct DynamicMethod {
    id: MemberId,
    name: String,
    function: FnAddr,
}

/// A call table plus the C strings its `Str` slots point into. The strings
/// must outlive the native call.
#[derive(Debug)]
pub struct Marshalled {
    pub table: CallTable,
    strings: Vec<CString>,
}

impl Marshalled {
    pub fn string_count(&self) -> usize {
        self.strings.len()
    }
}

/// Convert one tagged argument into its call slot.
pub fn classify(value: &TaggedValue, strings: &mut Vec<CString>) -> Result<CallSlot> {
    Ok(match value {
        TaggedValue::F32(x) => CallSlot::floating(*x as f64),
        TaggedValue::F64(x) | TaggedValue::Decimal(x) => CallSlot::floating(*x),
        TaggedValue::Null | TaggedValue::Void => CallSlot::standard(0, 8),
        TaggedValue::Record(raw) => CallSlot::standard(*raw, 8),
        TaggedValue::Str(s) => {
            let c = CString::new(s.as_str())
                .map_err(|_| BridgeError::InvalidArgument(format!("string argument {:?} contains a NUL byte", s)))?;
            let slot = CallSlot::standard(c.as_ptr() as u64, 8);
            strings.push(c);
            slot
        }
        // every remaining kind is integer-like
        other => CallSlot::standard(other.widened().unwrap_or(0), other.kind().size()),
    })
}

/// Build the reversed call table for `args` (caller order, left to right).
pub fn marshal(args: &[TaggedValue]) -> Result<Marshalled> {
    let n = args.len();
    let mut table = CallTable::with_len(n);
    let mut strings = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        table.set(n - 1 - i, classify(arg, &mut strings)?);
    }
    Ok(Marshalled { table, strings })
}

impl DynamicMethod {
    pub fn new(id: MemberId, name: impl Into<String>, function: FnAddr) -> Self {
        DynamicMethod { id, name: name.into(), function }
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> FnAddr {
        self.function
    }

    /// Call the native function with `args` and report the integer return
    /// register as `U64`.
    ///
    /// # Safety
    ///
    /// The argument kinds must match the native signature; see
    /// [`Trampoline::call`].
    pub unsafe fn invoke<T: Trampoline + ?Sized>(&self, trampoline: &mut T, args: &[TaggedValue]) -> Result<TaggedValue> {
        let marshalled = marshal(args)?;
        let result = unsafe { trampoline.call(&marshalled.table, self.function, SlotClass::Standard) }?;
        Ok(match result {
            CallResult::Standard(bits) => TaggedValue::U64(bits),
            CallResult::Floating(x) => TaggedValue::F64(x),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::ffi::{CStr, c_void};

    /// Records every table it is asked to call and answers with a fixed result.
    pub(crate) struct RecordingTrampoline {
        pub calls: Vec<(Vec<CallSlot>, FnAddr, SlotClass)>,
        pub reply: CallResult,
    }

    impl RecordingTrampoline {
        pub fn new(reply: CallResult) -> Self {
            RecordingTrampoline { calls: Vec::new(), reply }
        }
    }

    impl Trampoline for RecordingTrampoline {
        unsafe fn call(&mut self, table: &CallTable, function: FnAddr, ret: SlotClass) -> Result<CallResult> {
            self.calls.push((table.slots().to_vec(), function, ret));
            Ok(self.reply)
        }
    }

    fn fake_fn() -> FnAddr {
        FnAddr::new(0x1000 as *const c_void).unwrap()
    }

    #[test]
    fn table_is_built_last_argument_first() {
        let m = marshal(&[TaggedValue::I64(1), TaggedValue::I64(2), TaggedValue::I64(3)]).unwrap();
        let payloads: Vec<u64> = m.table.slots().iter().map(|s| s.payload).collect();
        assert_eq!(payloads, vec![3, 2, 1]);
    }

    #[test]
    fn float_kinds_are_floating() {
        let mut strings = Vec::new();
        let slot = classify(&TaggedValue::F64(6.5), &mut strings).unwrap();
        assert_eq!(slot.class, SlotClass::Floating);
        assert_eq!(slot.payload, 6.5f64.to_bits());
        let slot = classify(&TaggedValue::F32(0.25), &mut strings).unwrap();
        assert_eq!(slot.as_f64(), Some(0.25));
        let slot = classify(&TaggedValue::Decimal(1.5), &mut strings).unwrap();
        assert_eq!(slot.class, SlotClass::Floating);
    }

    #[test]
    fn integer_kinds_extend_by_signedness() {
        let mut strings = Vec::new();
        let slot = classify(&TaggedValue::I16(-2), &mut strings).unwrap();
        assert_eq!((slot.class, slot.payload, slot.size), (SlotClass::Standard, -2i64 as u64, 2));
        let slot = classify(&TaggedValue::U32(0xFFFF_FFFF), &mut strings).unwrap();
        assert_eq!(slot.payload, 0xFFFF_FFFF);
        let slot = classify(&TaggedValue::Ptr(0xdead_beef), &mut strings).unwrap();
        assert_eq!(slot.payload, 0xdead_beef);
    }

    #[test]
    fn null_and_records_are_standard() {
        let mut strings = Vec::new();
        assert_eq!(classify(&TaggedValue::Null, &mut strings).unwrap(), CallSlot::standard(0, 8));
        assert_eq!(classify(&TaggedValue::Void, &mut strings).unwrap().payload, 0);
        assert_eq!(classify(&TaggedValue::Record(0x77), &mut strings).unwrap(), CallSlot::standard(0x77, 8));
    }

    #[test]
    fn strings_point_at_live_c_copies() {
        let m = marshal(&[TaggedValue::Str("hello".into()), TaggedValue::I32(1)]).unwrap();
        assert_eq!(m.string_count(), 1);
        let ptr = m.table.slots()[1].payload as *const std::ffi::c_char;
        let text = unsafe { CStr::from_ptr(ptr) };
        assert_eq!(text.to_str().unwrap(), "hello");
    }

    #[test]
    fn interior_nul_is_rejected() {
        let err = marshal(&[TaggedValue::Str("a\0b".into())]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn invoke_requests_standard_return_as_u64() {
        let method = DynamicMethod::new(MemberId(2), "f", fake_fn());
        let mut tramp = RecordingTrampoline::new(CallResult::Standard(99));
        let out = unsafe { method.invoke(&mut tramp, &[TaggedValue::I32(5), TaggedValue::F64(1.0)]) }.unwrap();
        assert_eq!(out, TaggedValue::U64(99));

        let (slots, function, ret) = &tramp.calls[0];
        assert_eq!(*function, fake_fn());
        assert_eq!(*ret, SlotClass::Standard);
        assert_eq!(slots[0], CallSlot::floating(1.0));
        assert_eq!(slots[1], CallSlot::standard(5, 4));
    }

    proptest! {
        #[test]
        fn reversal_holds_for_any_arity(values in prop::collection::vec(any::<i64>(), 0..16)) {
            let args: Vec<TaggedValue> = values.iter().copied().map(TaggedValue::I64).collect();
            let m = marshal(&args).unwrap();
            let n = values.len();
            prop_assert_eq!(m.table.len(), n);
            for (i, v) in values.iter().enumerate() {
                prop_assert_eq!(m.table.slots()[n - 1 - i], CallSlot::standard(*v as u64, 8));
            }
        }

        #[test]
        fn float_bits_survive_classification(x in any::<f64>()) {
            let slot = classify(&TaggedValue::F64(x), &mut Vec::new()).unwrap();
            prop_assert_eq!(slot.class, SlotClass::Floating);
            prop_assert_eq!(slot.payload, x.to_bits());
        }
    }
}
