// Weft - weft-runtime
// Module: import/export linkage
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Import providers and import resolution.
//!
//! A [`Provider`] is a named namespace of runtime items. Providers form a
//! most-recently-registered-first chain; [`resolve`] walks the chain
//! front-to-back and uses the first provider whose namespace matches,
//! then the first item-name match within it. A later registration under
//! an already present namespace is shadowed and never observed.
//!
//! Providers are shared handles: the same provider may sit in several
//! chains and must outlive all of them, so chains hold `Rc<Provider>`.

use std::cell::RefCell;
use std::rc::Rc;

use weft_error::{codes, Error, ErrorCategory, Result};
use weft_foundation::ExternType;
use weft_format::{ImportDesc, Module};

use crate::func::FuncInstance;
use crate::global::Global;
use crate::memory::Memory;
use crate::table::Table;

/// A runtime item, as exported by an instance or contributed by a host.
#[derive(Debug, Clone)]
pub enum ExternVal {
    Func(Rc<FuncInstance>),
    Table(Rc<RefCell<Table>>),
    Memory(Rc<RefCell<Memory>>),
    Global(Rc<RefCell<Global>>),
}

impl ExternVal {
    /// The item's current runtime type. Table and memory minimums
    /// reflect the current size, so growth since export widens what the
    /// item can satisfy.
    #[must_use]
    pub fn extern_type(&self) -> ExternType {
        match self {
            ExternVal::Func(f) => ExternType::Func(f.ty().clone()),
            ExternVal::Table(t) => {
                let t = t.borrow();
                let mut ty = *t.ty();
                ty.limits.min = t.size();
                ExternType::Table(ty)
            }
            ExternVal::Memory(m) => {
                let m = m.borrow();
                let mut ty = *m.ty();
                ty.limits.min = m.size_pages();
                ExternType::Memory(ty)
            }
            ExternVal::Global(g) => ExternType::Global(*g.borrow().ty()),
        }
    }
}

/// A named export namespace used to satisfy imports.
#[derive(Debug)]
pub struct Provider {
    namespace: String,
    items: Vec<(String, ExternVal)>,
}

impl Provider {
    /// Creates a provider from an explicit item list. Later duplicates
    /// of an item name are shadowed, matching the chain rule.
    pub fn new(namespace: impl Into<String>, items: Vec<(String, ExternVal)>) -> Self {
        Self {
            namespace: namespace.into(),
            items,
        }
    }

    /// The namespace this provider answers for.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// First item registered under `name`, if any.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ExternVal> {
        self.items
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Enumerates the provider's items.
    pub fn items(&self) -> impl Iterator<Item = (&str, &ExternVal)> {
        self.items.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// Checks that a provided item can satisfy a required import type.
fn is_compatible(provided: &ExternType, required: &ExternType) -> bool {
    match (provided, required) {
        (ExternType::Func(p), ExternType::Func(r)) => p == r,
        (ExternType::Table(p), ExternType::Table(r)) => {
            p.element == r.element && p.limits.is_compatible_with(&r.limits)
        }
        (ExternType::Memory(p), ExternType::Memory(r)) => {
            p.limits.is_compatible_with(&r.limits)
        }
        (ExternType::Global(p), ExternType::Global(r)) => p == r,
        _ => false,
    }
}

fn required_type(desc: &ImportDesc, module: &Module) -> Result<ExternType> {
    Ok(match desc {
        ImportDesc::Func(typeidx) => ExternType::Func(
            module
                .types
                .get(*typeidx as usize)
                .ok_or_else(|| {
                    Error::new(
                        ErrorCategory::Contract,
                        codes::CONTRACT_VIOLATION,
                        format!("import references missing type {typeidx}"),
                    )
                })?
                .clone(),
        ),
        ImportDesc::Table(ty) => ExternType::Table(*ty),
        ImportDesc::Memory(ty) => ExternType::Memory(*ty),
        ImportDesc::Global(ty) => ExternType::Global(*ty),
    })
}

/// Resolves every import of `module` against `chain`.
///
/// Returns the bound items in import declaration order.
///
/// # Errors
///
/// A `Link` error when a namespace or item is missing or its type is
/// incompatible; raised before any code runs.
pub fn resolve(module: &Module, chain: &[Rc<Provider>]) -> Result<Vec<ExternVal>> {
    let mut bound = Vec::with_capacity(module.imports.len());
    for import in &module.imports {
        let provider = chain
            .iter()
            .find(|p| p.namespace() == import.module)
            .ok_or_else(|| {
                Error::new(
                    ErrorCategory::Link,
                    codes::UNKNOWN_IMPORT,
                    format!("unknown import namespace {:?}", import.module),
                )
            })?;
        let item = provider.lookup(&import.name).ok_or_else(|| {
            Error::new(
                ErrorCategory::Link,
                codes::UNKNOWN_IMPORT,
                format!(
                    "unknown import {:?} in namespace {:?}",
                    import.name, import.module
                ),
            )
        })?;
        let required = required_type(&import.desc, module)?;
        let provided = item.extern_type();
        if !is_compatible(&provided, &required) {
            return Err(Error::new(
                ErrorCategory::Link,
                codes::INCOMPATIBLE_IMPORT,
                format!(
                    "import {:?}.{:?}: provided {provided:?} is incompatible with required {required:?}",
                    import.module, import.name,
                ),
            ));
        }
        bound.push(item.clone());
    }
    log::debug!(
        "resolved {} imports against a chain of {} providers",
        bound.len(),
        chain.len()
    );
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_foundation::{GlobalType, Limits, MemoryType, Mutability, Value, ValueType};

    fn global_item(value: Value, mutability: Mutability) -> ExternVal {
        let ty = GlobalType {
            value_type: value.value_type(),
            mutability,
        };
        ExternVal::Global(Rc::new(RefCell::new(Global::new(ty, value).unwrap())))
    }

    #[test]
    fn first_namespace_match_wins() {
        let older = Rc::new(Provider::new(
            "env",
            vec![("g".into(), global_item(Value::I32(1), Mutability::Const))],
        ));
        let newer = Rc::new(Provider::new(
            "env",
            vec![("h".into(), global_item(Value::I32(2), Mutability::Const))],
        ));
        // Newest first. "env"."g" only exists in the shadowed provider,
        // so the lookup must fail rather than fall through.
        let chain = vec![Rc::clone(&newer), older];

        let mut module = Module::new();
        module.imports.push(weft_format::Import {
            module: "env".into(),
            name: "g".into(),
            desc: ImportDesc::Global(GlobalType {
                value_type: ValueType::I32,
                mutability: Mutability::Const,
            }),
        });
        let err = resolve(&module, &chain).unwrap_err();
        assert_eq!(err.code, codes::UNKNOWN_IMPORT);

        // The item the newest provider does carry resolves fine.
        module.imports[0].name = "h".into();
        assert_eq!(resolve(&module, &chain).unwrap().len(), 1);
    }

    #[test]
    fn global_mutability_must_match() {
        let chain = vec![Rc::new(Provider::new(
            "env",
            vec![("g".into(), global_item(Value::I32(1), Mutability::Var))],
        ))];
        let mut module = Module::new();
        module.imports.push(weft_format::Import {
            module: "env".into(),
            name: "g".into(),
            desc: ImportDesc::Global(GlobalType {
                value_type: ValueType::I32,
                mutability: Mutability::Const,
            }),
        });
        let err = resolve(&module, &chain).unwrap_err();
        assert_eq!(err.code, codes::INCOMPATIBLE_IMPORT);
    }

    #[test]
    fn memory_limits_compatibility() {
        let mem = Memory::new(MemoryType {
            limits: Limits::new(2, Some(4)),
        })
        .unwrap();
        let chain = vec![Rc::new(Provider::new(
            "env",
            vec![("m".into(), ExternVal::Memory(Rc::new(RefCell::new(mem))))],
        ))];

        let mut module = Module::new();
        module.imports.push(weft_format::Import {
            module: "env".into(),
            name: "m".into(),
            desc: ImportDesc::Memory(MemoryType {
                limits: Limits::new(1, Some(8)),
            }),
        });
        assert!(resolve(&module, &chain).is_ok());

        // Required min higher than provided size.
        module.imports[0].desc = ImportDesc::Memory(MemoryType {
            limits: Limits::new(3, None),
        });
        assert!(resolve(&module, &chain).is_err());

        // Required max tighter than provided max.
        module.imports[0].desc = ImportDesc::Memory(MemoryType {
            limits: Limits::new(1, Some(3)),
        });
        assert!(resolve(&module, &chain).is_err());
    }
}
