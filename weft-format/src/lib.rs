// Weft - weft-format
// Module: binary format
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! WebAssembly binary format support for the Weft engine.
//!
//! This crate owns the pieces shared by the decoder and the writer: the
//! binary constants and LEB128 codecs ([`binary`]), the in-memory module
//! descriptor ([`module`]), the decoded instruction representation
//! ([`instructions`]) and the module writer ([`writer`]) that re-encodes a
//! descriptor back to the binary format.

#![forbid(unsafe_code)]

pub mod binary;
pub mod instructions;
pub mod module;
pub mod writer;

pub use instructions::{BlockType, BrTableData, Instruction, MemArg};
pub use module::{
    ConstExpr, CustomSection, DataMode, DataSegment, ElementMode, ElementSegment, Export,
    ExportKind, FuncBody, Global, Import, ImportDesc, JumpTarget, Module,
};
pub use writer::encode_module;
