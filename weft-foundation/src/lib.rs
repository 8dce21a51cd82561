// Weft - weft-foundation
// Module: core types and value model
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Foundation library providing the core types for the Weft WebAssembly
//! engine: value types, the tagged value representation, bit-pattern float
//! wrappers, function signatures and resource type descriptors.

#![forbid(unsafe_code)]

pub mod float_bits;
pub mod types;
pub mod values;

pub use float_bits::{FloatBits32, FloatBits64};
pub use types::{
    ExternType, FuncType, GlobalType, Limits, MemoryType, Mutability, TableType, ValueType,
};
pub use values::{ExternAddr, FuncRef, Value};
