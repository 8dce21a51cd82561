// Weft - weft-runtime
// Module: global cells
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Global variable cells.

use weft_error::{codes, Error, ErrorCategory, Result};
use weft_foundation::{GlobalType, Mutability, Value};

/// A single global cell.
#[derive(Debug)]
pub struct Global {
    ty: GlobalType,
    value: Value,
}

impl Global {
    /// Creates a cell holding `value`. The value's type must match the
    /// declared type; validation guarantees this for module-defined
    /// globals, so a mismatch is a contract violation.
    pub fn new(ty: GlobalType, value: Value) -> Result<Self> {
        if value.value_type() != ty.value_type {
            return Err(Error::new(
                ErrorCategory::Contract,
                codes::CONTRACT_VIOLATION,
                format!(
                    "global initialized with {} but declared {}",
                    value.value_type(),
                    ty.value_type
                ),
            ));
        }
        Ok(Self { ty, value })
    }

    /// Creates a cell without the type check, for initializers the
    /// validator has already proven well typed.
    pub(crate) fn new_unchecked(ty: GlobalType, value: Value) -> Self {
        Self { ty, value }
    }

    /// The declared type.
    #[must_use]
    pub fn ty(&self) -> &GlobalType {
        &self.ty
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> Value {
        self.value.clone()
    }

    /// Replaces the value. Writing an immutable or wrongly typed cell is
    /// a contract violation; `global.set` sites are checked statically,
    /// so this only fires on host misuse.
    pub fn set(&mut self, value: Value) -> Result<()> {
        if self.ty.mutability != Mutability::Var {
            return Err(Error::new(
                ErrorCategory::Contract,
                codes::CONTRACT_VIOLATION,
                "write to immutable global",
            ));
        }
        if value.value_type() != self.ty.value_type {
            return Err(Error::new(
                ErrorCategory::Contract,
                codes::CONTRACT_VIOLATION,
                format!(
                    "global of {} written with {}",
                    self.ty.value_type,
                    value.value_type()
                ),
            ));
        }
        self.value = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_foundation::ValueType;

    #[test]
    fn mutability_is_enforced() {
        let ty = GlobalType {
            value_type: ValueType::I32,
            mutability: Mutability::Const,
        };
        let mut g = Global::new(ty, Value::I32(1)).unwrap();
        assert!(g.set(Value::I32(2)).is_err());
        assert_eq!(g.get(), Value::I32(1));

        let ty = GlobalType {
            value_type: ValueType::I32,
            mutability: Mutability::Var,
        };
        let mut g = Global::new(ty, Value::I32(1)).unwrap();
        g.set(Value::I32(2)).unwrap();
        assert_eq!(g.get(), Value::I32(2));
        assert!(g.set(Value::I64(3)).is_err());
    }

    #[test]
    fn type_checked_at_creation() {
        let ty = GlobalType {
            value_type: ValueType::F64,
            mutability: Mutability::Const,
        };
        assert!(Global::new(ty, Value::I32(0)).is_err());
    }
}
