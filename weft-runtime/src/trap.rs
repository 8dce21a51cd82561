// Weft - weft-runtime
// Module: trap taxonomy
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! The runtime fault model.
//!
//! A [`Trap`] aborts the current execution context unconditionally; it is
//! not an [`weft_error::Error`] because a trap is a specified machine
//! behavior, not an engine failure. The instance survives a trap and prior
//! side effects are retained.

use core::fmt;

/// Why execution stopped.
///
/// Every kind except [`TrapKind::VoluntaryExit`] is a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapKind {
    /// Integer division or remainder by zero.
    DivideByZero,
    /// Signed division overflow (`MIN / -1`) or a float-to-int
    /// conversion of an out-of-range value.
    IntegerOverflow,
    /// Linear-memory access outside current bounds, including bulk
    /// memory and data-segment operations.
    OutOfBoundsMemoryAccess,
    /// Table access outside current bounds, including bulk table and
    /// element-segment operations.
    OutOfBoundsTableAccess,
    /// Indirect call through a null table slot.
    UninitializedElement,
    /// Indirect call index outside table bounds.
    UndefinedElement,
    /// Indirect callee's signature differs from the call site's type.
    IndirectCallTypeMismatch,
    /// The `unreachable` instruction.
    Unreachable,
    /// Float-to-int conversion of NaN.
    InvalidConversionToInteger,
    /// Call-frame stack exceeded the configured maximum.
    CallStackExhausted,
    /// Operand stack exceeded the configured maximum.
    ValueStackExhausted,
    /// A host import requested termination with an exit code. An
    /// intentional halt, not a fault; callers must surface the code.
    VoluntaryExit(u32),
}

impl TrapKind {
    /// The wast-compatible trap message.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            TrapKind::DivideByZero => "integer divide by zero",
            TrapKind::IntegerOverflow => "integer overflow",
            TrapKind::OutOfBoundsMemoryAccess => "out of bounds memory access",
            TrapKind::OutOfBoundsTableAccess => "out of bounds table access",
            TrapKind::UninitializedElement => "uninitialized element",
            TrapKind::UndefinedElement => "undefined element",
            TrapKind::IndirectCallTypeMismatch => "indirect call type mismatch",
            TrapKind::Unreachable => "unreachable executed",
            TrapKind::InvalidConversionToInteger => "invalid conversion to integer",
            TrapKind::CallStackExhausted => "call stack exhausted",
            TrapKind::ValueStackExhausted => "value stack exhausted",
            TrapKind::VoluntaryExit(_) => "voluntary exit",
        }
    }

    /// A stable numeric identifier for driver output.
    #[must_use]
    pub fn id(&self) -> u32 {
        match self {
            TrapKind::DivideByZero => 1,
            TrapKind::IntegerOverflow => 2,
            TrapKind::OutOfBoundsMemoryAccess => 3,
            TrapKind::OutOfBoundsTableAccess => 4,
            TrapKind::UninitializedElement => 5,
            TrapKind::UndefinedElement => 6,
            TrapKind::IndirectCallTypeMismatch => 7,
            TrapKind::Unreachable => 8,
            TrapKind::InvalidConversionToInteger => 9,
            TrapKind::CallStackExhausted => 10,
            TrapKind::ValueStackExhausted => 11,
            TrapKind::VoluntaryExit(_) => 12,
        }
    }
}

/// A runtime fault (or voluntary exit) with an optional diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trap {
    /// What happened.
    pub kind: TrapKind,
    /// Extra context beyond the canonical message, when available.
    pub detail: Option<String>,
}

impl Trap {
    /// A trap with the canonical message only.
    #[must_use]
    pub fn new(kind: TrapKind) -> Self {
        Self { kind, detail: None }
    }

    /// A trap with extra diagnostic context.
    pub fn with_detail(kind: TrapKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }

    /// The exit code of a voluntary exit, `None` for faults.
    #[must_use]
    pub fn exit_code(&self) -> Option<u32> {
        match self.kind {
            TrapKind::VoluntaryExit(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.kind.message()),
            None => f.write_str(self.kind.message()),
        }
    }
}

impl std::error::Error for Trap {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_wast_compatible() {
        assert_eq!(
            Trap::new(TrapKind::DivideByZero).to_string(),
            "integer divide by zero"
        );
        assert_eq!(
            Trap::new(TrapKind::Unreachable).to_string(),
            "unreachable executed"
        );
        assert_eq!(
            Trap::new(TrapKind::IndirectCallTypeMismatch).to_string(),
            "indirect call type mismatch"
        );
    }

    #[test]
    fn exit_code_only_for_voluntary_exit() {
        assert_eq!(Trap::new(TrapKind::VoluntaryExit(7)).exit_code(), Some(7));
        assert_eq!(Trap::new(TrapKind::Unreachable).exit_code(), None);
    }

    #[test]
    fn detail_is_appended() {
        let trap = Trap::with_detail(TrapKind::OutOfBoundsMemoryAccess, "at 65536");
        assert_eq!(trap.to_string(), "out of bounds memory access: at 65536");
    }
}
