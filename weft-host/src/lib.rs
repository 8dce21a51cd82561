// Weft - weft-host
// Module: crate root
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Host-function registration.
//!
//! A [`HostBuilder`] collects named closures under one namespace and
//! turns them into a [`Provider`] that instantiation can resolve
//! imports against. Host functions run inline inside the interpreter
//! loop; returning a [`Trap`] unwinds the calling wasm context.
//!
//! The [`base_namespace`] provider stands in for a real system
//! interface: it exposes `exit`, which terminates execution through the
//! voluntary-exit trap channel, and `print_i32` for quick diagnostics.

#![forbid(unsafe_code)]

use std::rc::Rc;

use weft_foundation::{FuncType, Value, ValueType};
use weft_runtime::{ExternVal, FuncInstance, Provider, Trap, TrapKind};

/// Builds a [`Provider`] from host closures, one namespace per builder.
///
/// ```
/// use weft_foundation::{FuncType, Value, ValueType};
/// use weft_host::HostBuilder;
///
/// let provider = HostBuilder::new("env")
///     .func(
///         "answer",
///         FuncType::new(vec![], vec![ValueType::I32]),
///         |_| Ok(vec![Value::I32(42)]),
///     )
///     .build();
/// assert_eq!(provider.namespace(), "env");
/// ```
pub struct HostBuilder {
    namespace: String,
    items: Vec<(String, ExternVal)>,
}

impl HostBuilder {
    /// Starts an empty builder for `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            items: Vec::new(),
        }
    }

    /// Registers a host function under `name`.
    ///
    /// The closure receives the arguments the wasm caller pushed, in
    /// declared order, and must return values matching `ty`'s results.
    pub fn func<F>(mut self, name: impl Into<String>, ty: FuncType, call: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Vec<Value>, Trap> + 'static,
    {
        self.items
            .push((name.into(), ExternVal::Func(FuncInstance::host(ty, Box::new(call)))));
        self
    }

    /// Registers a non-function external under `name`. Useful for
    /// sharing a memory or global with guest modules.
    pub fn item(mut self, name: impl Into<String>, value: ExternVal) -> Self {
        self.items.push((name.into(), value));
        self
    }

    /// Finishes the provider.
    pub fn build(self) -> Rc<Provider> {
        log::debug!(
            "host namespace {:?} with {} items",
            self.namespace,
            self.items.len()
        );
        Rc::new(Provider::new(self.namespace, self.items))
    }
}

/// The built-in `weft` namespace.
///
/// `exit(code: i32)` never returns to the caller: it raises the
/// voluntary-exit trap, which the driver turns into a process exit
/// code. `print_i32(v: i32)` writes the value to stdout.
pub fn base_namespace() -> Rc<Provider> {
    HostBuilder::new("weft")
        .func(
            "exit",
            FuncType::new(vec![ValueType::I32], vec![]),
            |args| match args {
                [Value::I32(code)] => Err(Trap::new(TrapKind::VoluntaryExit(*code as u32))),
                _ => Err(Trap::new(TrapKind::Unreachable)),
            },
        )
        .func(
            "print_i32",
            FuncType::new(vec![ValueType::I32], vec![]),
            |args| {
                if let [Value::I32(v)] = args {
                    println!("{v}");
                }
                Ok(vec![])
            },
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_decoder::{decode_module, DecodeConfig};
    use weft_runtime::{invoke_func, EngineConfig, Instance, InvokeError};

    fn instantiate(source: &str, providers: &[Rc<Provider>]) -> Instance {
        let bytes = wat::parse_str(source).unwrap();
        let module = Rc::new(decode_module(&bytes, &DecodeConfig::default()).unwrap());
        Instance::instantiate_no_init(&module, providers).unwrap()
    }

    #[test]
    fn builder_provider_satisfies_imports() {
        let provider = HostBuilder::new("env")
            .func(
                "seven",
                FuncType::new(vec![], vec![ValueType::I32]),
                |_| Ok(vec![Value::I32(7)]),
            )
            .build();
        let inst = instantiate(
            r#"(module
                 (import "env" "seven" (func $seven (result i32)))
                 (func (export "get") (result i32) call $seven))"#,
            &[provider],
        );
        let func = inst.export_func("get").unwrap();
        let results = invoke_func(&func, &[], &EngineConfig::default()).unwrap();
        assert_eq!(results, vec![Value::I32(7)]);
    }

    #[test]
    fn exit_surfaces_the_voluntary_exit_code() {
        let inst = instantiate(
            r#"(module
                 (import "weft" "exit" (func $exit (param i32)))
                 (func (export "quit") i32.const 3 call $exit))"#,
            &[base_namespace()],
        );
        let func = inst.export_func("quit").unwrap();
        match invoke_func(&func, &[], &EngineConfig::default()) {
            Err(InvokeError::Trap(t)) => assert_eq!(t.exit_code(), Some(3)),
            other => panic!("expected voluntary exit, got {other:?}"),
        }
    }
}
