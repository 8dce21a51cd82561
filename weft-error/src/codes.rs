// Weft - weft-error
// Module: error codes
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Numeric error codes, grouped by concern.
//!
//! Parse errors are 1000-1099, validation errors 1100-1199, link errors
//! 1200-1299, runtime errors 1300-1399 and contract violations 1400-1499.

/// Generic parse failure.
pub const PARSE_ERROR: u16 = 1000;
/// Input ended before a complete item was read.
pub const UNEXPECTED_EOF: u16 = 1001;
/// Bad magic bytes at the start of the binary.
pub const INVALID_MAGIC: u16 = 1002;
/// Unsupported binary format version.
pub const INVALID_VERSION: u16 = 1003;
/// Malformed or non-minimal LEB128 encoding.
pub const INVALID_LEB128: u16 = 1004;
/// Malformed section structure (bad id, size, ordering).
pub const INVALID_SECTION: u16 = 1005;
/// Name is not valid UTF-8.
pub const INVALID_UTF8: u16 = 1006;
/// Unknown or unsupported opcode.
pub const INVALID_OPCODE: u16 = 1007;

/// Generic validation failure.
pub const VALIDATION_ERROR: u16 = 1100;
/// An index is out of range for its index space.
pub const INVALID_INDEX: u16 = 1101;
/// Operand stack type mismatch in a function body.
pub const TYPE_MISMATCH: u16 = 1102;
/// Declared limits are inconsistent (min > max) or exceed the format cap.
pub const INVALID_LIMITS: u16 = 1103;
/// More memories or tables than the format allows.
pub const MULTIPLE_RESOURCES: u16 = 1104;
/// A constant expression used a non-constant instruction.
pub const INVALID_CONST_EXPR: u16 = 1105;
/// Global mutability constraint violated.
pub const INVALID_MUTABILITY: u16 = 1106;

/// Generic link failure.
pub const LINK_ERROR: u16 = 1200;
/// No provider in the chain satisfies the import name.
pub const UNKNOWN_IMPORT: u16 = 1201;
/// A provider item exists but its type is incompatible.
pub const INCOMPATIBLE_IMPORT: u16 = 1202;

/// Generic runtime failure.
pub const RUNTIME_ERROR: u16 = 1300;
/// An export lookup by name failed.
pub const UNKNOWN_EXPORT: u16 = 1301;
/// A resource allocation failed.
pub const ALLOCATION_FAILED: u16 = 1302;

/// Generic contract violation.
pub const CONTRACT_VIOLATION: u16 = 1400;
/// Caller-supplied argument count or types disagree with the signature.
pub const ARITY_MISMATCH: u16 = 1401;
