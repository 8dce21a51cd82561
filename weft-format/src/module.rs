// Weft - weft-format
// Module: module descriptor
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! The in-memory module descriptor.
//!
//! Produced once by the decoder and then immutable. A module may be shared
//! read-only by any number of instances and outlives all of them, so
//! re-instantiation never re-decodes.

use weft_foundation::{FuncType, GlobalType, MemoryType, TableType, ValueType};

use crate::instructions::Instruction;

/// A constant initializer expression.
///
/// Only the constant instruction forms are representable; the decoder
/// rejects anything else in an initializer position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstExpr {
    /// `i32.const`
    I32(i32),
    /// `i64.const`
    I64(i64),
    /// `f32.const` (bit pattern)
    F32(u32),
    /// `f64.const` (bit pattern)
    F64(u64),
    /// `global.get` of an imported immutable global.
    GlobalGet(u32),
    /// `ref.null` of the given reference type.
    RefNull(ValueType),
    /// `ref.func`
    RefFunc(u32),
}

/// An import declaration: namespace, item name and expected type.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    /// Namespace (module) name.
    pub module: String,
    /// Item name within the namespace.
    pub name: String,
    /// Expected item type.
    pub desc: ImportDesc,
}

/// The declared type of an imported item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportDesc {
    /// Function with a signature from the type section.
    Func(u32),
    /// Table with the given type.
    Table(TableType),
    /// Memory with the given type.
    Memory(MemoryType),
    /// Global with the given type.
    Global(GlobalType),
}

/// The kind of an exported item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Function export.
    Func,
    /// Table export.
    Table,
    /// Memory export.
    Memory,
    /// Global export.
    Global,
}

/// An export declaration: name to index within the kind's index space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    /// Export name, unique within the module.
    pub name: String,
    /// Item kind.
    pub kind: ExportKind,
    /// Index into the kind's index space (imports first).
    pub index: u32,
}

/// A global declaration: type plus constant initializer.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    /// Declared type and mutability.
    pub ty: GlobalType,
    /// Initializer, evaluated at instantiation.
    pub init: ConstExpr,
}

/// Element segment placement.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementMode {
    /// Copied into a table at instantiation.
    Active {
        /// Destination table.
        table: u32,
        /// Start offset, a constant expression.
        offset: ConstExpr,
    },
    /// Available to `table.init` until dropped.
    Passive,
    /// Only makes its functions referenceable via `ref.func`.
    Declared,
}

/// An element segment: a typed list of reference initializers.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSegment {
    /// Element type; a reference type.
    pub ty: ValueType,
    /// Placement mode.
    pub mode: ElementMode,
    /// Item initializers (`RefFunc` or `RefNull`).
    pub items: Vec<ConstExpr>,
}

/// Data segment placement.
#[derive(Debug, Clone, PartialEq)]
pub enum DataMode {
    /// Copied into a memory at instantiation.
    Active {
        /// Destination memory.
        memory: u32,
        /// Start offset, a constant expression.
        offset: ConstExpr,
    },
    /// Available to `memory.init` until dropped.
    Passive,
}

/// A data segment: raw bytes plus placement.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSegment {
    /// Placement mode.
    pub mode: DataMode,
    /// Segment contents.
    pub bytes: Vec<u8>,
}

/// Jump-table entry for one instruction, produced when the decoder's
/// fast-dispatch flag is set.
///
/// For `Block`/`Loop`/`If` the `end_pc` is the index one past the matching
/// `End`; for `If` the `else_pc` is the index one past the matching `Else`
/// (or equal to `end_pc` when there is no else arm). Other instructions
/// keep both fields zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JumpTarget {
    /// One past the matching `Else`, for `If` only.
    pub else_pc: u32,
    /// One past the matching `End`.
    pub end_pc: u32,
}

/// A decoded function body.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncBody {
    /// Local declarations beyond the parameters, run-length encoded as in
    /// the binary.
    pub locals: Vec<(u32, ValueType)>,
    /// Flat instruction sequence, terminated by a final `End`.
    pub instrs: Vec<Instruction>,
    /// Optional precomputed control targets, aligned with `instrs`.
    /// `None` when fast dispatch was not requested; the interpreter then
    /// resolves targets by scanning. Both modes behave identically.
    pub jump_table: Option<Vec<JumpTarget>>,
    /// Maximum operand-stack height this body can reach, computed by
    /// validation. Lets the interpreter bound the stack with one check per
    /// call instead of one per push.
    pub max_stack: u32,
    /// The raw code-entry payload (locals plus expression), kept so the
    /// writer can re-encode the body byte-exactly.
    pub raw: Vec<u8>,
}

/// A custom section, preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection {
    /// Section name.
    pub name: String,
    /// Payload bytes after the name.
    pub bytes: Vec<u8>,
}

/// An immutable, validated module descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    /// Function type signatures.
    pub types: Vec<FuncType>,
    /// Import declarations, in declaration order.
    pub imports: Vec<Import>,
    /// Type indices of locally defined functions.
    pub funcs: Vec<u32>,
    /// Locally defined tables.
    pub tables: Vec<TableType>,
    /// Locally defined memories.
    pub memories: Vec<MemoryType>,
    /// Locally defined globals.
    pub globals: Vec<Global>,
    /// Export declarations.
    pub exports: Vec<Export>,
    /// Optional start function, run at instantiation.
    pub start: Option<u32>,
    /// Element segments.
    pub elements: Vec<ElementSegment>,
    /// Data segments.
    pub datas: Vec<DataSegment>,
    /// Declared data-segment count, when the section was present.
    pub data_count: Option<u32>,
    /// Bodies of locally defined functions, aligned with `funcs`.
    pub bodies: Vec<FuncBody>,
    /// Custom sections, in order of appearance.
    pub custom_sections: Vec<CustomSection>,
}

impl Module {
    /// Creates an empty module descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of imported functions; local function index space starts here.
    #[must_use]
    pub fn num_imported_funcs(&self) -> u32 {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Func(_)))
            .count() as u32
    }

    /// Number of imported tables.
    #[must_use]
    pub fn num_imported_tables(&self) -> u32 {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Table(_)))
            .count() as u32
    }

    /// Number of imported memories.
    #[must_use]
    pub fn num_imported_memories(&self) -> u32 {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Memory(_)))
            .count() as u32
    }

    /// Number of imported globals.
    #[must_use]
    pub fn num_imported_globals(&self) -> u32 {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Global(_)))
            .count() as u32
    }

    /// Total function count, imports first.
    #[must_use]
    pub fn num_funcs(&self) -> u32 {
        self.num_imported_funcs() + self.funcs.len() as u32
    }

    /// Total table count.
    #[must_use]
    pub fn num_tables(&self) -> u32 {
        self.num_imported_tables() + self.tables.len() as u32
    }

    /// Total memory count.
    #[must_use]
    pub fn num_memories(&self) -> u32 {
        self.num_imported_memories() + self.memories.len() as u32
    }

    /// Total global count.
    #[must_use]
    pub fn num_globals(&self) -> u32 {
        self.num_imported_globals() + self.globals.len() as u32
    }

    /// The signature of a function in the unified index space, imports
    /// first. `None` when the index is out of range.
    #[must_use]
    pub fn func_type(&self, funcidx: u32) -> Option<&FuncType> {
        let typeidx = self.func_type_index(funcidx)?;
        self.types.get(typeidx as usize)
    }

    /// The type index of a function in the unified index space.
    #[must_use]
    pub fn func_type_index(&self, funcidx: u32) -> Option<u32> {
        let imported = self.num_imported_funcs();
        if funcidx < imported {
            self.imports
                .iter()
                .filter_map(|i| match i.desc {
                    ImportDesc::Func(t) => Some(t),
                    _ => None,
                })
                .nth(funcidx as usize)
        } else {
            self.funcs.get((funcidx - imported) as usize).copied()
        }
    }

    /// Looks up an export by name and kind, returning its index.
    #[must_use]
    pub fn find_export(&self, name: &str, kind: ExportKind) -> Option<u32> {
        self.exports
            .iter()
            .find(|e| e.kind == kind && e.name == name)
            .map(|e| e.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_foundation::{Limits, Mutability};

    fn module_with_imports() -> Module {
        let mut m = Module::new();
        m.types.push(FuncType::new(vec![ValueType::I32], vec![]));
        m.types.push(FuncType::new(vec![], vec![ValueType::I64]));
        m.imports.push(Import {
            module: "env".into(),
            name: "f".into(),
            desc: ImportDesc::Func(1),
        });
        m.imports.push(Import {
            module: "env".into(),
            name: "g".into(),
            desc: ImportDesc::Global(GlobalType {
                value_type: ValueType::I32,
                mutability: Mutability::Const,
            }),
        });
        m.imports.push(Import {
            module: "env".into(),
            name: "m".into(),
            desc: ImportDesc::Memory(MemoryType {
                limits: Limits::new(1, None),
            }),
        });
        m.funcs.push(0);
        m
    }

    #[test]
    fn index_spaces_are_imports_first() {
        let m = module_with_imports();
        assert_eq!(m.num_imported_funcs(), 1);
        assert_eq!(m.num_funcs(), 2);
        // Function 0 is the import with type 1; function 1 is local type 0.
        assert_eq!(m.func_type_index(0), Some(1));
        assert_eq!(m.func_type_index(1), Some(0));
        assert_eq!(m.func_type_index(2), None);
    }

    #[test]
    fn export_lookup_is_kind_scoped() {
        let mut m = module_with_imports();
        m.exports.push(Export {
            name: "x".into(),
            kind: ExportKind::Func,
            index: 1,
        });
        assert_eq!(m.find_export("x", ExportKind::Func), Some(1));
        assert_eq!(m.find_export("x", ExportKind::Global), None);
        assert_eq!(m.find_export("y", ExportKind::Func), None);
    }
}
