// Weft - weft-decoder
// Module: decoder and validator
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! WebAssembly module decoder and validator.
//!
//! [`decode_module`] takes a byte range and produces either a fully
//! validated [`weft_format::Module`] or a parse/validation error with a
//! diagnostic; no partial module is ever returned and the input is never
//! mutated. Decoding is driven by an explicit [`DecodeConfig`] rather than
//! ambient state, so differently configured decoders can coexist.
//!
//! Validation performs full static checking: section structure, index
//! ranges for every index space, limits consistency, and complete
//! value-stack type checking of every function body including
//! unreachable-code polymorphism. When
//! [`DecodeConfig::generate_jump_table`] is set, validation additionally
//! precomputes a per-function side table that resolves structured control
//! targets in O(1); with the flag clear the interpreter re-scans at branch
//! time. The flag is purely a time/space tradeoff and both modes are
//! behaviorally identical.

#![forbid(unsafe_code)]

mod instructions;
mod parse;
mod validation;

pub use parse::parse_module;
pub use validation::validate_module;

use weft_error::Result;
use weft_format::Module;

/// Decoder configuration, threaded explicitly through every decode call.
#[derive(Debug, Clone, Copy)]
pub struct DecodeConfig {
    /// Precompute per-function branch targets for O(1) dispatch.
    pub generate_jump_table: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            generate_jump_table: true,
        }
    }
}

/// Decodes and validates a WebAssembly binary module.
///
/// # Errors
///
/// Returns a `Parse` or `Validation` error with a diagnostic when the
/// binary is malformed or statically invalid.
pub fn decode_module(data: &[u8], config: &DecodeConfig) -> Result<Module> {
    let mut module = parse::parse_module(data)?;
    validation::validate_module(&mut module, config)?;
    log::debug!(
        "decoded module: {} funcs, {} imports, {} exports",
        module.num_funcs(),
        module.imports.len(),
        module.exports.len()
    );
    Ok(module)
}
