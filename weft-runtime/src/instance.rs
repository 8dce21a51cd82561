// Weft - weft-runtime
// Module: instances
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! The runtime image of a module.
//!
//! Instantiation is two-phase. Phase 1 ([`Instance::instantiate_no_init`])
//! binds imports, allocates memories/tables/globals, and installs active
//! element and data segments; any link failure aborts before code runs,
//! and an out-of-bounds active segment fails with a trap-class error.
//! Phase 2 ([`Instance::run_start`]) executes the declared start function,
//! if any, in a fresh execution context; the caller decides whether a
//! start trap is fatal to their use of the instance.
//!
//! The module descriptor is shared read-only across all instances and
//! survives any of them, so re-instantiation never re-decodes.

use core::fmt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use weft_error::{codes, Error, ErrorCategory, Result};
use weft_foundation::{FuncRef, FuncType, Value};
use weft_format::{ConstExpr, DataMode, ElementMode, ExportKind, ImportDesc, Module};

use crate::func::FuncInstance;
use crate::global::Global;
use crate::interpreter::{invoke_func, InvokeError};
use crate::memory::Memory;
use crate::provider::{resolve, ExternVal, Provider};
use crate::table::Table;
use crate::trap::Trap;
use crate::EngineConfig;

/// Why instantiation failed.
#[derive(Debug)]
pub enum InstantiationError {
    /// Imports could not be satisfied, or allocation failed. The module
    /// stays valid and reusable with a different chain.
    Link(Error),
    /// An active element or data segment fell outside its target's
    /// bounds. Trap-class: the module was linkable, its contents were
    /// not installable.
    Trap(Trap),
}

impl fmt::Display for InstantiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstantiationError::Link(e) => write!(f, "link error: {e}"),
            InstantiationError::Trap(t) => write!(f, "trap during instantiation: {t}"),
        }
    }
}

impl std::error::Error for InstantiationError {}

/// The shared body of an instance. Functions hold a weak handle back to
/// this; everything else holds it strongly through [`Instance`].
pub struct InstanceData {
    pub(crate) module: Rc<Module>,
    pub(crate) funcs: Vec<Rc<FuncInstance>>,
    pub(crate) memories: Vec<Rc<RefCell<Memory>>>,
    pub(crate) tables: Vec<Rc<RefCell<Table>>>,
    pub(crate) globals: Vec<Rc<RefCell<Global>>>,
    /// Resolved element-segment values; `None` once dropped. Active and
    /// declared segments are dropped during instantiation.
    pub(crate) elem_values: Vec<RefCell<Option<Vec<Value>>>>,
    /// Per data segment; dropped segments read as empty.
    pub(crate) data_dropped: Vec<Cell<bool>>,
}

/// A live instance handle.
#[derive(Clone)]
pub struct Instance {
    pub(crate) data: Rc<InstanceData>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("funcs", &self.data.funcs.len())
            .field("memories", &self.data.memories.len())
            .field("tables", &self.data.tables.len())
            .field("globals", &self.data.globals.len())
            .finish()
    }
}

/// Evaluates a constant initializer against already-built parts of an
/// instance. Infallible on validated modules.
pub(crate) fn eval_const(
    expr: &ConstExpr,
    funcs: &[Rc<FuncInstance>],
    globals: &[Rc<RefCell<Global>>],
) -> Value {
    match expr {
        ConstExpr::I32(v) => Value::I32(*v),
        ConstExpr::I64(v) => Value::I64(*v),
        ConstExpr::F32(bits) => Value::F32(weft_foundation::FloatBits32(*bits)),
        ConstExpr::F64(bits) => Value::F64(weft_foundation::FloatBits64(*bits)),
        ConstExpr::RefNull(ty) => Value::default_for(*ty),
        ConstExpr::RefFunc(idx) => {
            Value::FuncRef(funcs.get(*idx as usize).map(|f| FuncRef::new(Rc::clone(f))))
        }
        ConstExpr::GlobalGet(idx) => globals
            .get(*idx as usize)
            .map(|g| g.borrow().get())
            .unwrap_or(Value::I32(0)),
    }
}

impl Instance {
    /// Phase 1: links imports, allocates state, installs segments. Does
    /// not run the start function.
    pub fn instantiate_no_init(
        module: &Rc<Module>,
        chain: &[Rc<Provider>],
    ) -> core::result::Result<Self, InstantiationError> {
        let bound = resolve(module, chain).map_err(InstantiationError::Link)?;

        // Split the bound imports by kind, in declaration order.
        let mut imported_funcs = Vec::new();
        let mut imported_tables = Vec::new();
        let mut imported_memories = Vec::new();
        let mut imported_globals = Vec::new();
        for (import, item) in module.imports.iter().zip(bound) {
            match (&import.desc, item) {
                (ImportDesc::Func(_), ExternVal::Func(f)) => imported_funcs.push(f),
                (ImportDesc::Table(_), ExternVal::Table(t)) => imported_tables.push(t),
                (ImportDesc::Memory(_), ExternVal::Memory(m)) => imported_memories.push(m),
                (ImportDesc::Global(_), ExternVal::Global(g)) => imported_globals.push(g),
                _ => {
                    return Err(InstantiationError::Link(Error::new(
                        ErrorCategory::Contract,
                        codes::CONTRACT_VIOLATION,
                        "resolved import kind does not match its declaration",
                    )));
                }
            }
        }

        // Locally defined memories and tables can be allocated before the
        // instance exists; only functions and globals may refer back to it.
        let mut memories = imported_memories;
        for ty in &module.memories {
            memories.push(Rc::new(RefCell::new(
                Memory::new(*ty).map_err(InstantiationError::Link)?,
            )));
        }
        let mut tables = imported_tables;
        for ty in &module.tables {
            tables.push(Rc::new(RefCell::new(Table::new(*ty))));
        }

        let module = Rc::clone(module);
        let data = Rc::new_cyclic(|weak| {
            let mut funcs = imported_funcs;
            for typeidx in &module.funcs {
                let func_idx = funcs.len() as u32;
                let ty = module
                    .types
                    .get(*typeidx as usize)
                    .cloned()
                    .unwrap_or_else(FuncType::default);
                funcs.push(FuncInstance::wasm(ty, weak.clone(), func_idx));
            }

            // Globals next: initializers may read imported globals and
            // take references to any declared function.
            let mut globals = imported_globals;
            for decl in &module.globals {
                let value = eval_const(&decl.init, &funcs, &globals);
                globals.push(Rc::new(RefCell::new(Global::new_unchecked(
                    decl.ty, value,
                ))));
            }

            let elem_values = module
                .elements
                .iter()
                .map(|seg| {
                    let values: Vec<Value> = seg
                        .items
                        .iter()
                        .map(|item| eval_const(item, &funcs, &globals))
                        .collect();
                    RefCell::new(match seg.mode {
                        // Declared segments exist only to whitelist
                        // ref.func targets; they are never readable.
                        ElementMode::Declared => None,
                        _ => Some(values),
                    })
                })
                .collect();

            let data_dropped = module.datas.iter().map(|_| Cell::new(false)).collect();

            InstanceData {
                module: Rc::clone(&module),
                funcs,
                memories,
                tables,
                globals,
                elem_values,
                data_dropped,
            }
        });

        let instance = Instance { data };
        instance.install_segments().map_err(InstantiationError::Trap)?;
        log::debug!(
            "instantiated module: {} funcs, {} memories, {} tables, {} globals",
            instance.data.funcs.len(),
            instance.data.memories.len(),
            instance.data.tables.len(),
            instance.data.globals.len()
        );
        Ok(instance)
    }

    /// Installs active element then data segments; each segment is
    /// bounds-checked in full before any of it is written, but segments
    /// already installed stay installed on failure.
    fn install_segments(&self) -> core::result::Result<(), Trap> {
        let data = &self.data;
        for (i, seg) in data.module.elements.iter().enumerate() {
            let ElementMode::Active { table, offset } = &seg.mode else {
                continue;
            };
            let offset = match eval_const(offset, &data.funcs, &data.globals) {
                Value::I32(v) => v as u32,
                _ => 0,
            };
            let slot = &data.elem_values[i];
            {
                let values = slot.borrow();
                let values = values.as_deref().unwrap_or(&[]);
                data.tables[*table as usize].borrow_mut().init(
                    offset,
                    values,
                    0,
                    values.len() as u32,
                )?;
            }
            // Active segments are spent after installation.
            *slot.borrow_mut() = None;
        }
        for (i, seg) in data.module.datas.iter().enumerate() {
            let DataMode::Active { memory, offset } = &seg.mode else {
                continue;
            };
            let offset = match eval_const(offset, &data.funcs, &data.globals) {
                Value::I32(v) => v as u32,
                _ => 0,
            };
            data.memories[*memory as usize].borrow_mut().init(
                offset,
                &seg.bytes,
                0,
                seg.bytes.len() as u32,
            )?;
            data.data_dropped[i].set(true);
        }
        Ok(())
    }

    /// Phase 2: runs the declared start function, if any, in a fresh
    /// execution context. A trap leaves the instance in whatever state
    /// the start function reached; the caller chooses whether to keep it.
    pub fn run_start(&self, config: &EngineConfig) -> core::result::Result<(), Trap> {
        let Some(start) = self.data.module.start else {
            return Ok(());
        };
        let func = Rc::clone(&self.data.funcs[start as usize]);
        match invoke_func(&func, &[], config) {
            Ok(_) => Ok(()),
            Err(InvokeError::Trap(trap)) => Err(trap),
            // Start has type [] -> [], so a contract failure here means
            // the engine itself is inconsistent; surface it as a trap
            // with the diagnostic preserved.
            Err(InvokeError::Contract(e)) => Err(Trap::with_detail(
                crate::trap::TrapKind::Unreachable,
                format!("internal error running start: {e}"),
            )),
        }
    }

    /// The module this instance was created from.
    #[must_use]
    pub fn module(&self) -> &Rc<Module> {
        &self.data.module
    }

    /// A function by index in the module's function index space.
    #[must_use]
    pub fn func(&self, funcidx: u32) -> Option<Rc<FuncInstance>> {
        self.data.funcs.get(funcidx as usize).cloned()
    }

    /// An exported function by name.
    pub fn export_func(&self, name: &str) -> Result<Rc<FuncInstance>> {
        let idx = self
            .data
            .module
            .find_export(name, ExportKind::Func)
            .ok_or_else(|| unknown_export(name))?;
        self.func(idx).ok_or_else(|| unknown_export(name))
    }

    /// The current value of an exported global.
    pub fn export_global_value(&self, name: &str) -> Result<Value> {
        let idx = self
            .data
            .module
            .find_export(name, ExportKind::Global)
            .ok_or_else(|| unknown_export(name))?;
        self.data
            .globals
            .get(idx as usize)
            .map(|g| g.borrow().get())
            .ok_or_else(|| unknown_export(name))
    }

    /// Any export by name and kind, as a runtime item.
    #[must_use]
    pub fn export(&self, name: &str, kind: ExportKind) -> Option<ExternVal> {
        let idx = self.data.module.find_export(name, kind)? as usize;
        match kind {
            ExportKind::Func => self.data.funcs.get(idx).cloned().map(ExternVal::Func),
            ExportKind::Table => self.data.tables.get(idx).cloned().map(ExternVal::Table),
            ExportKind::Memory => self.data.memories.get(idx).cloned().map(ExternVal::Memory),
            ExportKind::Global => self.data.globals.get(idx).cloned().map(ExternVal::Global),
        }
    }

    /// Snapshots this instance's exports as a provider under `namespace`.
    #[must_use]
    pub fn export_provider(&self, namespace: impl Into<String>) -> Provider {
        let items = self
            .data
            .module
            .exports
            .iter()
            .filter_map(|e| Some((e.name.clone(), self.export(&e.name, e.kind)?)))
            .collect();
        Provider::new(namespace, items)
    }
}

fn unknown_export(name: &str) -> Error {
    Error::new(
        ErrorCategory::Runtime,
        codes::UNKNOWN_EXPORT,
        format!("no export named {name:?}"),
    )
}
