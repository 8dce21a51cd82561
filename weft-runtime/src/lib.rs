// Weft - weft-runtime
// Module: crate root
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Instantiation, linking, and execution of decoded modules.
//!
//! The runtime takes a validated [`weft_format::Module`], resolves its
//! imports against a chain of [`Provider`]s, and produces an
//! [`Instance`] whose exported functions can be invoked through the
//! interpreter. The whole object graph is single-threaded and
//! reference-counted; instances, providers, and the values flowing
//! between them are not `Send`.
//!
//! ```no_run
//! use std::rc::Rc;
//! use weft_foundation::Value;
//! use weft_runtime::{invoke_func, EngineConfig, Instance};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let module: Rc<weft_format::Module> = unimplemented!();
//! let config = EngineConfig::default();
//! let instance = Instance::instantiate_no_init(&module, &[])?;
//! instance.run_start(&config)?;
//! let add = instance.export_func("add")?;
//! let results = invoke_func(&add, &[Value::I32(2), Value::I32(3)], &config)?;
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod func;
mod global;
mod instance;
mod interpreter;
mod memory;
mod num;
mod provider;
mod table;
mod trap;

pub use func::{FuncInstance, HostFn};
pub use global::Global;
pub use instance::{Instance, InstantiationError};
pub use interpreter::{invoke_func, InvokeError};
pub use memory::{Memory, PAGE_SIZE};
pub use provider::{resolve, ExternVal, Provider};
pub use table::Table;
pub use trap::{Trap, TrapKind};

/// Per-invocation resource limits.
///
/// Both limits are checked per call frame, not per instruction: the
/// frame count when a call is entered, the operand budget against the
/// callee's validation-computed stack maximum.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Maximum call depth, counting the frame being entered.
    pub max_frames: usize,
    /// Maximum operand-stack slots across all live frames.
    pub max_values: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_frames: 1024,
            max_values: 65536,
        }
    }
}
