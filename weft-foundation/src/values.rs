// Weft - weft-foundation
// Module: value representation
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! The tagged value representation and host interop marshalling.
//!
//! A [`Value`] is one of the four numeric kinds or the two reference kinds.
//! Floats are stored as bit patterns ([`FloatBits32`]/[`FloatBits64`]) so
//! NaN payloads survive marshalling. Reference kinds are `Option`s: `None`
//! is the null reference and is distinct from every non-null reference,
//! including the host's "reference zero" (`ExternRef(Some(ExternAddr(0)))`).

use core::any::Any;
use core::fmt;
use std::rc::Rc;

use weft_error::{codes, Error, ErrorCategory, Result};

use crate::float_bits::{FloatBits32, FloatBits64};
use crate::types::ValueType;

/// An opaque host-chosen external reference value.
///
/// The engine never interprets the payload; equality is payload equality.
/// `ExternAddr(0)` is a valid non-null reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternAddr(pub u64);

/// A non-owning, opaque reference to a function instance.
///
/// The runtime stores its function instances behind this handle; the value
/// model only needs identity (for equality) and cloneability. Identity is
/// the shared allocation, never a bit pattern.
#[derive(Clone)]
pub struct FuncRef(Rc<dyn Any>);

impl FuncRef {
    /// Wraps a shared function instance.
    pub fn new<T: 'static>(inner: Rc<T>) -> Self {
        Self(inner)
    }

    /// Recovers the concrete function instance, if `T` matches.
    #[must_use]
    pub fn downcast<T: 'static>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.0).downcast::<T>().ok()
    }

    /// A stable identifier for display purposes.
    #[must_use]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FuncRef({:#x})", self.id())
    }
}

impl PartialEq for FuncRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for FuncRef {}

/// A WebAssembly value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 32-bit integer. Sign interpretation is per-instruction.
    I32(i32),
    /// 64-bit integer. Sign interpretation is per-instruction.
    I64(i64),
    /// 32-bit float, stored as bits.
    F32(FloatBits32),
    /// 64-bit float, stored as bits.
    F64(FloatBits64),
    /// Function reference; `None` is null.
    FuncRef(Option<FuncRef>),
    /// External reference; `None` is null.
    ExternRef(Option<ExternAddr>),
}

impl Value {
    /// The zero/null value of the given type, used for locals and table
    /// initialization.
    #[must_use]
    pub fn default_for(ty: ValueType) -> Self {
        match ty {
            ValueType::I32 => Value::I32(0),
            ValueType::I64 => Value::I64(0),
            ValueType::F32 => Value::F32(FloatBits32(0)),
            ValueType::F64 => Value::F64(FloatBits64(0)),
            ValueType::FuncRef => Value::FuncRef(None),
            ValueType::ExternRef => Value::ExternRef(None),
        }
    }

    /// The value's type tag.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::FuncRef(_) => ValueType::FuncRef,
            Value::ExternRef(_) => ValueType::ExternRef,
        }
    }

    /// Parses a textual argument into a value of the requested type.
    ///
    /// Numeric arguments are raw bit patterns in decimal or `0x` hex, with
    /// an optional leading `-` (two's complement); float arguments are
    /// likewise given as integer bit patterns. Reference arguments accept
    /// `null`; external references additionally accept a numeric host
    /// address, where `0` is the host's non-null reference zero. Non-null
    /// function references cannot be synthesized from text.
    pub fn parse(ty: ValueType, s: &str) -> Result<Self> {
        match ty {
            ValueType::I32 | ValueType::F32 => {
                let bits = parse_bits(s)? as u32;
                Ok(if ty == ValueType::I32 {
                    Value::I32(bits as i32)
                } else {
                    Value::F32(FloatBits32(bits))
                })
            }
            ValueType::I64 | ValueType::F64 => {
                let bits = parse_bits(s)?;
                Ok(if ty == ValueType::I64 {
                    Value::I64(bits as i64)
                } else {
                    Value::F64(FloatBits64(bits))
                })
            }
            ValueType::FuncRef => {
                if s == "null" {
                    Ok(Value::FuncRef(None))
                } else {
                    Err(Error::new(
                        ErrorCategory::Contract,
                        codes::CONTRACT_VIOLATION,
                        "cannot synthesize a non-null funcref from text",
                    ))
                }
            }
            ValueType::ExternRef => {
                if s == "null" {
                    Ok(Value::ExternRef(None))
                } else {
                    let addr = parse_bits(s)?;
                    Ok(Value::ExternRef(Some(ExternAddr(addr))))
                }
            }
        }
    }
}

/// Parses a raw bit pattern: decimal or `0x` hex, optional leading `-`.
fn parse_bits(s: &str) -> Result<u64> {
    let bad = |_| {
        Error::new(
            ErrorCategory::Contract,
            codes::CONTRACT_VIOLATION,
            format!("malformed numeric argument {s:?}"),
        )
    };
    let (neg, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let mag = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(bad)?
    } else {
        body.parse::<u64>().map_err(bad)?
    };
    Ok(if neg { mag.wrapping_neg() } else { mag })
}

// Display matches the driver's result formatting: the numeric kinds print
// their raw bits, floats included.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{}:i32", *v as u32),
            Value::F32(v) => write!(f, "{}:f32", v.to_bits()),
            Value::I64(v) => write!(f, "{}:i64", *v as u64),
            Value::F64(v) => write!(f, "{}:f64", v.to_bits()),
            Value::FuncRef(None) => write!(f, "null:funcref"),
            Value::FuncRef(Some(r)) => write!(f, "{}:funcref", r.id()),
            Value::ExternRef(None) => write!(f, "null:externref"),
            Value::ExternRef(Some(a)) => write!(f, "{}:externref", a.0),
        }
    }
}
