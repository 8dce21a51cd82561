// Weft - weft-foundation
// Module: type descriptors
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! WebAssembly type descriptors: value types, function signatures, limits
//! and the resource types used by import/export linking.

use core::fmt;

use weft_error::{codes, Error, ErrorCategory, Result};

/// Index into the type section.
pub type TypeIdx = u32;
/// Index into the function index space (imports first, then locals).
pub type FuncIdx = u32;
/// Index into the table index space.
pub type TableIdx = u32;
/// Index into the memory index space.
pub type MemIdx = u32;
/// Index into the global index space.
pub type GlobalIdx = u32;
/// Index into the element segment space.
pub type ElemIdx = u32;
/// Index into the data segment space.
pub type DataIdx = u32;
/// Index of a local within a function.
pub type LocalIdx = u32;
/// Relative branch label depth.
pub type LabelIdx = u32;

/// WebAssembly value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
    /// Function reference.
    FuncRef,
    /// External (host-owned) reference.
    ExternRef,
}

impl ValueType {
    /// Creates a value type from its binary representation.
    pub fn from_binary(byte: u8) -> Result<Self> {
        match byte {
            0x7F => Ok(ValueType::I32),
            0x7E => Ok(ValueType::I64),
            0x7D => Ok(ValueType::F32),
            0x7C => Ok(ValueType::F64),
            0x70 => Ok(ValueType::FuncRef),
            0x6F => Ok(ValueType::ExternRef),
            _ => Err(Error::new(
                ErrorCategory::Parse,
                codes::PARSE_ERROR,
                format!("invalid value type byte 0x{byte:02x}"),
            )),
        }
    }

    /// Converts to the WebAssembly binary format byte.
    #[must_use]
    pub fn to_binary(self) -> u8 {
        match self {
            ValueType::I32 => 0x7F,
            ValueType::I64 => 0x7E,
            ValueType::F32 => 0x7D,
            ValueType::F64 => 0x7C,
            ValueType::FuncRef => 0x70,
            ValueType::ExternRef => 0x6F,
        }
    }

    /// True for the two reference types.
    #[must_use]
    pub fn is_ref(self) -> bool {
        matches!(self, ValueType::FuncRef | ValueType::ExternRef)
    }

    /// True for the four numeric types.
    #[must_use]
    pub fn is_num(self) -> bool {
        !self.is_ref()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::FuncRef => "funcref",
            ValueType::ExternRef => "externref",
        };
        f.write_str(s)
    }
}

/// A function signature: parameter and result types in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    /// Parameter types.
    pub params: Vec<ValueType>,
    /// Result types.
    pub results: Vec<ValueType>,
}

impl FuncType {
    /// Creates a new function type.
    #[must_use]
    pub fn new(params: Vec<ValueType>, results: Vec<ValueType>) -> Self {
        Self { params, results }
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ") -> (")?;
        for (i, r) in self.results.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{r}")?;
        }
        write!(f, ")")
    }
}

/// Size limits for memories and tables, in pages or elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Limits {
    /// Minimum size.
    pub min: u32,
    /// Optional maximum size; `None` is unbounded.
    pub max: Option<u32>,
}

impl Limits {
    /// Creates new limits.
    #[must_use]
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Validates the limits against a format-imposed cap.
    pub fn validate(&self, cap: u32, what: &str) -> Result<()> {
        if u64::from(self.min) > u64::from(cap) {
            return Err(Error::new(
                ErrorCategory::Validation,
                codes::INVALID_LIMITS,
                format!("{what} minimum {} exceeds limit {cap}", self.min),
            ));
        }
        if let Some(max) = self.max {
            if max < self.min {
                return Err(Error::new(
                    ErrorCategory::Validation,
                    codes::INVALID_LIMITS,
                    format!("{what} minimum {} exceeds maximum {max}", self.min),
                ));
            }
            if u64::from(max) > u64::from(cap) {
                return Err(Error::new(
                    ErrorCategory::Validation,
                    codes::INVALID_LIMITS,
                    format!("{what} maximum {max} exceeds limit {cap}"),
                ));
            }
        }
        Ok(())
    }

    /// Import compatibility: the provided limits must be at least as
    /// constrained as the required ones (`provided.min >= required.min`,
    /// `provided.max <= required.max`, absent maximum is unbounded).
    #[must_use]
    pub fn is_compatible_with(&self, required: &Limits) -> bool {
        if self.min < required.min {
            return false;
        }
        match (required.max, self.max) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(req), Some(prov)) => prov <= req,
        }
    }
}

/// Global mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    /// Immutable after initialization.
    Const,
    /// Mutable via `global.set`.
    Var,
}

/// The type of a global: value type plus mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalType {
    /// Value type of the global cell.
    pub value_type: ValueType,
    /// Whether the global may be written.
    pub mutability: Mutability,
}

/// The type of a table: element type plus limits in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableType {
    /// Element type; always a reference type.
    pub element: ValueType,
    /// Table size limits.
    pub limits: Limits,
}

/// The type of a memory: limits in 64KiB pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryType {
    /// Memory size limits, in pages.
    pub limits: Limits,
}

/// The type of an importable/exportable item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternType {
    /// A function with the given signature.
    Func(FuncType),
    /// A table.
    Table(TableType),
    /// A memory.
    Memory(MemoryType),
    /// A global.
    Global(GlobalType),
}

impl ExternType {
    /// Short kind name for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExternType::Func(_) => "function",
            ExternType::Table(_) => "table",
            ExternType::Memory(_) => "memory",
            ExternType::Global(_) => "global",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_binary_round_trip() {
        for vt in [
            ValueType::I32,
            ValueType::I64,
            ValueType::F32,
            ValueType::F64,
            ValueType::FuncRef,
            ValueType::ExternRef,
        ] {
            assert_eq!(ValueType::from_binary(vt.to_binary()).unwrap(), vt);
        }
        assert!(ValueType::from_binary(0x7B).is_err());
    }

    #[test]
    fn limits_validation() {
        assert!(Limits::new(1, Some(2)).validate(10, "memory").is_ok());
        assert!(Limits::new(3, Some(2)).validate(10, "memory").is_err());
        assert!(Limits::new(11, None).validate(10, "memory").is_err());
    }

    #[test]
    fn limits_import_compatibility() {
        let required = Limits::new(1, Some(4));
        assert!(Limits::new(1, Some(4)).is_compatible_with(&required));
        assert!(Limits::new(2, Some(3)).is_compatible_with(&required));
        assert!(!Limits::new(0, Some(4)).is_compatible_with(&required));
        assert!(!Limits::new(1, None).is_compatible_with(&required));
        assert!(!Limits::new(1, Some(5)).is_compatible_with(&required));
        // Unbounded requirement accepts anything with a big enough minimum.
        let unbounded = Limits::new(1, None);
        assert!(Limits::new(1, None).is_compatible_with(&unbounded));
        assert!(Limits::new(1, Some(2)).is_compatible_with(&unbounded));
    }
}
