//! Tagged values exchanged with the late-bound host.
//!
//! Every argument and return value carries its kind as the enum variant, so
//! the stored representation can never disagree with the tag.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Void,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Ptr,
    F32,
    F64,
    Decimal,
    Str,
    Record,
}

impl ValueKind {
    pub const ALL: [ValueKind; 17] = [
        ValueKind::Null, ValueKind::Void, ValueKind::Bool,
        ValueKind::I8, ValueKind::U8, ValueKind::I16, ValueKind::U16,
        ValueKind::I32, ValueKind::U32, ValueKind::I64, ValueKind::U64,
        ValueKind::Ptr, ValueKind::F32, ValueKind::F64, ValueKind::Decimal,
        ValueKind::Str, ValueKind::Record,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Void => "void",
            ValueKind::Bool => "bool",
            ValueKind::I8 => "i8",
            ValueKind::U8 => "u8",
            ValueKind::I16 => "i16",
            ValueKind::U16 => "u16",
            ValueKind::I32 => "i32",
            ValueKind::U32 => "u32",
            ValueKind::I64 => "i64",
            ValueKind::U64 => "u64",
            ValueKind::Ptr => "ptr",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::Decimal => "decimal",
            ValueKind::Str => "str",
            ValueKind::Record => "record",
        }
    }

    pub fn from_name(name: &str) -> Option<ValueKind> {
        ValueKind::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, ValueKind::F32 | ValueKind::F64 | ValueKind::Decimal)
    }

    /// Width in bytes of the value as the host supplied it.
    pub fn size(self) -> u32 {
        match self {
            ValueKind::Null | ValueKind::Void => 0,
            ValueKind::Bool | ValueKind::I8 | ValueKind::U8 => 1,
            ValueKind::I16 | ValueKind::U16 => 2,
            ValueKind::I32 | ValueKind::U32 | ValueKind::F32 => 4,
            _ => 8,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum TaggedValue {
    Null,
    Void,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Ptr(u64),
    F32(f32),
    F64(f64),
    /// Decimal value already carried as a double.
    Decimal(f64),
    Str(String),
    /// Opaque pointer to a host-owned record, passed through untouched.
    Record(u64),
}

impl TaggedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            TaggedValue::Null => ValueKind::Null,
            TaggedValue::Void => ValueKind::Void,
            TaggedValue::Bool(_) => ValueKind::Bool,
            TaggedValue::I8(_) => ValueKind::I8,
            TaggedValue::U8(_) => ValueKind::U8,
            TaggedValue::I16(_) => ValueKind::I16,
            TaggedValue::U16(_) => ValueKind::U16,
            TaggedValue::I32(_) => ValueKind::I32,
            TaggedValue::U32(_) => ValueKind::U32,
            TaggedValue::I64(_) => ValueKind::I64,
            TaggedValue::U64(_) => ValueKind::U64,
            TaggedValue::Ptr(_) => ValueKind::Ptr,
            TaggedValue::F32(_) => ValueKind::F32,
            TaggedValue::F64(_) => ValueKind::F64,
            TaggedValue::Decimal(_) => ValueKind::Decimal,
            TaggedValue::Str(_) => ValueKind::Str,
            TaggedValue::Record(_) => ValueKind::Record,
        }
    }

    /// Integer-like value widened to 64 bits: signed kinds sign-extend,
    /// unsigned kinds zero-extend. `None` for every other kind.
    pub fn widened(&self) -> Option<u64> {
        Some(match *self {
            TaggedValue::Bool(b) => b as u64,
            TaggedValue::I8(v) => v as i64 as u64,
            TaggedValue::U8(v) => v as u64,
            TaggedValue::I16(v) => v as i64 as u64,
            TaggedValue::U16(v) => v as u64,
            TaggedValue::I32(v) => v as i64 as u64,
            TaggedValue::U32(v) => v as u64,
            TaggedValue::I64(v) => v as u64,
            TaggedValue::U64(v) | TaggedValue::Ptr(v) => v,
            _ => return None,
        })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            TaggedValue::F32(v) => Some(v as f64),
            TaggedValue::F64(v) | TaggedValue::Decimal(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaggedValue::Null => write!(f, "null"),
            TaggedValue::Void => write!(f, "void"),
            TaggedValue::Bool(b) => write!(f, "bool:{}", b),
            TaggedValue::I8(v) => write!(f, "i8:{}", v),
            TaggedValue::U8(v) => write!(f, "u8:{}", v),
            TaggedValue::I16(v) => write!(f, "i16:{}", v),
            TaggedValue::U16(v) => write!(f, "u16:{}", v),
            TaggedValue::I32(v) => write!(f, "i32:{}", v),
            TaggedValue::U32(v) => write!(f, "u32:{}", v),
            TaggedValue::I64(v) => write!(f, "i64:{}", v),
            TaggedValue::U64(v) => write!(f, "u64:{}", v),
            TaggedValue::Ptr(v) => write!(f, "ptr:{:#x}", v),
            TaggedValue::F32(v) => write!(f, "f32:{}", v),
            TaggedValue::F64(v) => write!(f, "f64:{}", v),
            TaggedValue::Decimal(v) => write!(f, "decimal:{}", v),
            TaggedValue::Str(s) => write!(f, "str:{}", s),
            TaggedValue::Record(v) => write!(f, "record:{:#x}", v),
        }
    }
}

// ── Textual form: `kind:literal` ─────────────────────────────────────

impl FromStr for TaggedValue {
    type Err = BridgeError;

    fn from_str(text: &str) -> Result<Self> {
        let bad = |reason: String| BridgeError::ParseValue { text: text.to_string(), reason };
        let (kind_name, literal) = text.split_once(':').unwrap_or((text, ""));
        let kind = ValueKind::from_name(kind_name)
            .ok_or_else(|| bad(format!("unknown kind '{}'", kind_name)))?;

        let value = match kind {
            ValueKind::Null | ValueKind::Void if !literal.is_empty() => {
                return Err(bad(format!("{} takes no literal", kind)));
            }
            ValueKind::Null => TaggedValue::Null,
            ValueKind::Void => TaggedValue::Void,
            ValueKind::Bool => TaggedValue::Bool(literal.parse().map_err(|_| bad("expected true or false".into()))?),
            ValueKind::I8 => TaggedValue::I8(narrow(parse_signed(literal).map_err(bad)?).map_err(bad)?),
            ValueKind::I16 => TaggedValue::I16(narrow(parse_signed(literal).map_err(bad)?).map_err(bad)?),
            ValueKind::I32 => TaggedValue::I32(narrow(parse_signed(literal).map_err(bad)?).map_err(bad)?),
            ValueKind::I64 => TaggedValue::I64(parse_signed(literal).map_err(bad)?),
            ValueKind::U8 => TaggedValue::U8(narrow(parse_unsigned(literal).map_err(bad)?).map_err(bad)?),
            ValueKind::U16 => TaggedValue::U16(narrow(parse_unsigned(literal).map_err(bad)?).map_err(bad)?),
            ValueKind::U32 => TaggedValue::U32(narrow(parse_unsigned(literal).map_err(bad)?).map_err(bad)?),
            ValueKind::U64 => TaggedValue::U64(parse_unsigned(literal).map_err(bad)?),
            ValueKind::Ptr => TaggedValue::Ptr(parse_unsigned(literal).map_err(bad)?),
            ValueKind::Record => TaggedValue::Record(parse_unsigned(literal).map_err(bad)?),
            ValueKind::F32 => TaggedValue::F32(literal.parse().map_err(|e: std::num::ParseFloatError| bad(e.to_string()))?),
            ValueKind::F64 => TaggedValue::F64(literal.parse().map_err(|e: std::num::ParseFloatError| bad(e.to_string()))?),
            ValueKind::Decimal => TaggedValue::Decimal(literal.parse().map_err(|e: std::num::ParseFloatError| bad(e.to_string()))?),
            ValueKind::Str => TaggedValue::Str(literal.to_string()),
        };
        Ok(value)
    }
}

fn parse_unsigned(literal: &str) -> std::result::Result<u64, String> {
    let parsed = match literal.strip_prefix("0x").or_else(|| literal.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => literal.parse(),
    };
    parsed.map_err(|e| e.to_string())
}

fn parse_signed(literal: &str) -> std::result::Result<i64, String> {
    let (negative, digits) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal),
    };
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        let magnitude = i64::from_str_radix(hex, 16).map_err(|e| e.to_string())?;
        return Ok(if negative { -magnitude } else { magnitude });
    }
    literal.parse().map_err(|e: std::num::ParseIntError| e.to_string())
}

fn narrow<T, S>(value: S) -> std::result::Result<T, String>
where
    T: TryFrom<S>,
    S: Copy + fmt::Display,
{
    T::try_from(value).map_err(|_| format!("{} is out of range", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> TaggedValue {
        text.parse().unwrap()
    }

    #[test]
    fn parses_integer_kinds() {
        assert_eq!(parse("i32:-7"), TaggedValue::I32(-7));
        assert_eq!(parse("u16:65535"), TaggedValue::U16(65535));
        assert_eq!(parse("u64:0xff"), TaggedValue::U64(255));
        assert_eq!(parse("i64:-0x10"), TaggedValue::I64(-16));
        assert_eq!(parse("ptr:0x1000"), TaggedValue::Ptr(0x1000));
    }

    #[test]
    fn parses_float_and_text_kinds() {
        assert_eq!(parse("f64:2.5"), TaggedValue::F64(2.5));
        assert_eq!(parse("decimal:1.25"), TaggedValue::Decimal(1.25));
        assert_eq!(parse("str:a:b"), TaggedValue::Str("a:b".into()));
        assert_eq!(parse("null"), TaggedValue::Null);
        assert_eq!(parse("bool:true"), TaggedValue::Bool(true));
    }

    #[test]
    fn rejects_out_of_range_and_unknown() {
        assert!("u8:256".parse::<TaggedValue>().is_err());
        assert!("i8:-129".parse::<TaggedValue>().is_err());
        assert!("q32:1".parse::<TaggedValue>().is_err());
        assert!("null:0".parse::<TaggedValue>().is_err());
        let err = "i32:abc".parse::<TaggedValue>().unwrap_err();
        assert!(err.to_string().contains("i32:abc"));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for v in [TaggedValue::I16(-3), TaggedValue::Ptr(0xdead), TaggedValue::Null, TaggedValue::F64(0.5)] {
            assert_eq!(parse(&v.to_string()), v);
        }
    }

    #[test]
    fn widening_respects_signedness() {
        assert_eq!(TaggedValue::I16(-1).widened(), Some(u64::MAX));
        assert_eq!(TaggedValue::U16(0xFFFF).widened(), Some(0xFFFF));
        assert_eq!(TaggedValue::I32(-2).widened(), Some(-2i64 as u64));
        assert_eq!(TaggedValue::U32(u32::MAX).widened(), Some(u32::MAX as u64));
        assert_eq!(TaggedValue::F64(1.0).widened(), None);
        assert_eq!(TaggedValue::Null.widened(), None);
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(TaggedValue::Decimal(1.0).kind(), ValueKind::Decimal);
        assert!(ValueKind::F32.is_floating());
        assert!(!ValueKind::Ptr.is_floating());
        assert_eq!(ValueKind::I16.size(), 2);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_string(&TaggedValue::U64(42)).unwrap();
        assert_eq!(json, r#"{"kind":"u64","value":42}"#);
        let json = serde_json::to_string(&TaggedValue::Null).unwrap();
        assert_eq!(json, r#"{"kind":"null"}"#);
    }
}
