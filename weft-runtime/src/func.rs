// Weft - weft-runtime
// Module: function instances
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Function instances: module-defined code bound to its instance, or a
//! host closure.
//!
//! A function holds a weak reference back to its instance so that the
//! instance (which owns the function list) and its functions do not keep
//! each other alive in a cycle.

use core::fmt;
use std::rc::{Rc, Weak};

use weft_foundation::{FuncType, Value};

use crate::instance::InstanceData;
use crate::trap::Trap;

/// A host function: positional type-tagged arguments in, results or a
/// trap out. May re-enter the engine through a fresh invocation.
pub type HostFn = Box<dyn Fn(&[Value]) -> core::result::Result<Vec<Value>, Trap>>;

pub(crate) enum FuncKind {
    /// Code from the owning instance's module, named by function index.
    Wasm {
        instance: Weak<InstanceData>,
        func_idx: u32,
    },
    /// A host closure.
    Host(HostFn),
}

/// A callable function instance.
pub struct FuncInstance {
    ty: FuncType,
    pub(crate) kind: FuncKind,
}

impl FuncInstance {
    pub(crate) fn wasm(ty: FuncType, instance: Weak<InstanceData>, func_idx: u32) -> Rc<Self> {
        Rc::new(Self {
            ty,
            kind: FuncKind::Wasm { instance, func_idx },
        })
    }

    /// Wraps a host closure as a callable function.
    pub fn host(ty: FuncType, call: HostFn) -> Rc<Self> {
        Rc::new(Self {
            ty,
            kind: FuncKind::Host(call),
        })
    }

    /// The function's signature.
    #[must_use]
    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    /// True for host-implemented functions.
    #[must_use]
    pub fn is_host(&self) -> bool {
        matches!(self.kind, FuncKind::Host(_))
    }
}

impl fmt::Debug for FuncInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FuncKind::Wasm { func_idx, .. } => {
                write!(f, "FuncInstance::Wasm({func_idx}, {})", self.ty)
            }
            FuncKind::Host(_) => write!(f, "FuncInstance::Host({})", self.ty),
        }
    }
}
