// Weft - weft-decoder
// Module: static validation
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Static validation of a parsed module.
//!
//! Module-level checks (index ranges, limits, constant initializers,
//! export uniqueness) run first, then every function body goes through
//! the standard type-checking algorithm: a value stack of possibly
//! unknown types plus a control-frame stack, with the stack becoming
//! polymorphic after unconditional branches.
//!
//! Validation also precomputes per-function metadata the interpreter
//! relies on: the maximum operand-stack depth, and (optionally) a jump
//! table mapping each `block`/`loop`/`if` to the instruction after its
//! matching `else`/`end`.

use std::collections::HashSet;

use weft_error::{codes, Error, ErrorCategory, Result};
use weft_foundation::{
    FuncType, GlobalType, MemoryType, Mutability, TableType, ValueType,
};
use weft_format::binary::MAX_MEMORY_PAGES;
use weft_format::{
    BlockType, ConstExpr, DataMode, ElementMode, ExportKind, Instruction, JumpTarget, MemArg,
    Module,
};

use crate::DecodeConfig;

fn invalid(code: u16, msg: impl Into<String>) -> Error {
    Error::new(ErrorCategory::Validation, code, msg)
}

/// Validates `module` in place, filling in each body's jump table and
/// operand-stack maximum.
pub fn validate_module(module: &mut Module, config: &DecodeConfig) -> Result<()> {
    let ctx = ModuleContext::build(module)?;
    ctx.check_module(module)?;

    let num_imported = module.num_imported_funcs() as usize;
    let mut bodies = std::mem::take(&mut module.bodies);
    for (i, body) in bodies.iter_mut().enumerate() {
        let funcidx = (num_imported + i) as u32;
        let typeidx = module.funcs[i];
        let func_type = module
            .types
            .get(typeidx as usize)
            .ok_or_else(|| invalid(codes::INVALID_INDEX, format!("type index {typeidx}")))?
            .clone();
        let mut checker = BodyChecker::new(&ctx, module, &func_type, &body.locals, config);
        checker.run(&body.instrs).map_err(|e| {
            Error::new(
                e.category,
                e.code,
                format!("function {funcidx}: {}", e.message),
            )
        })?;
        body.jump_table = checker.jump_table;
        body.max_stack = checker.max_stack as u32;
    }
    module.bodies = bodies;
    Ok(())
}

/// Flattened index spaces (imports first, then local definitions) plus
/// the set of function indices that may appear in `ref.func`.
struct ModuleContext {
    func_types: Vec<u32>,
    tables: Vec<TableType>,
    memories: Vec<MemoryType>,
    globals: Vec<GlobalType>,
    num_imported_globals: u32,
    declared_funcs: HashSet<u32>,
}

impl ModuleContext {
    fn build(module: &Module) -> Result<Self> {
        let mut func_types = Vec::new();
        let mut tables = Vec::new();
        let mut memories = Vec::new();
        let mut globals = Vec::new();
        for import in &module.imports {
            match &import.desc {
                weft_format::ImportDesc::Func(typeidx) => func_types.push(*typeidx),
                weft_format::ImportDesc::Table(ty) => tables.push(*ty),
                weft_format::ImportDesc::Memory(ty) => memories.push(*ty),
                weft_format::ImportDesc::Global(ty) => globals.push(*ty),
            }
        }
        let num_imported_globals = globals.len() as u32;
        func_types.extend_from_slice(&module.funcs);
        tables.extend_from_slice(&module.tables);
        memories.extend_from_slice(&module.memories);
        globals.extend(module.globals.iter().map(|g| g.ty));

        // A funcref constant is only allowed to name functions that are
        // "declared": mentioned by an export, an element segment, or a
        // global initializer.
        let mut declared_funcs = HashSet::new();
        for export in &module.exports {
            if export.kind == ExportKind::Func {
                declared_funcs.insert(export.index);
            }
        }
        for segment in &module.elements {
            for item in &segment.items {
                if let ConstExpr::RefFunc(idx) = item {
                    declared_funcs.insert(*idx);
                }
            }
        }
        for global in &module.globals {
            if let ConstExpr::RefFunc(idx) = &global.init {
                declared_funcs.insert(*idx);
            }
        }

        Ok(Self {
            func_types,
            tables,
            memories,
            globals,
            num_imported_globals,
            declared_funcs,
        })
    }

    fn func_type<'m>(&self, module: &'m Module, funcidx: u32) -> Result<&'m FuncType> {
        let typeidx = *self
            .func_types
            .get(funcidx as usize)
            .ok_or_else(|| invalid(codes::INVALID_INDEX, format!("function index {funcidx}")))?;
        module
            .types
            .get(typeidx as usize)
            .ok_or_else(|| invalid(codes::INVALID_INDEX, format!("type index {typeidx}")))
    }

    fn table(&self, idx: u32) -> Result<&TableType> {
        self.tables
            .get(idx as usize)
            .ok_or_else(|| invalid(codes::INVALID_INDEX, format!("table index {idx}")))
    }

    fn global(&self, idx: u32) -> Result<&GlobalType> {
        self.globals
            .get(idx as usize)
            .ok_or_else(|| invalid(codes::INVALID_INDEX, format!("global index {idx}")))
    }

    fn require_memory(&self) -> Result<()> {
        if self.memories.is_empty() {
            return Err(invalid(codes::INVALID_INDEX, "memory index 0"));
        }
        Ok(())
    }

    /// Checks all module-level constructs except function bodies.
    fn check_module(&self, module: &Module) -> Result<()> {
        for typeidx in &self.func_types {
            if *typeidx as usize >= module.types.len() {
                return Err(invalid(
                    codes::INVALID_INDEX,
                    format!("type index {typeidx}"),
                ));
            }
        }
        for table in &self.tables {
            table.limits.validate(u32::MAX, "table")?;
        }
        for memory in &self.memories {
            memory.limits.validate(MAX_MEMORY_PAGES, "memory")?;
        }
        if self.memories.len() > 1 {
            return Err(invalid(
                codes::MULTIPLE_RESOURCES,
                format!("{} memories declared, at most 1 allowed", self.memories.len()),
            ));
        }

        // Locally defined globals; their initializers may only read
        // imported (hence already initialized) immutable globals.
        for (i, global) in module.globals.iter().enumerate() {
            let got = self.const_expr_type(&global.init)?;
            if got != global.ty.value_type {
                return Err(invalid(
                    codes::TYPE_MISMATCH,
                    format!(
                        "global {} initializer has type {got}, expected {}",
                        self.num_imported_globals as usize + i,
                        global.ty.value_type
                    ),
                ));
            }
        }

        let mut seen = HashSet::new();
        for export in &module.exports {
            if !seen.insert(export.name.as_str()) {
                return Err(invalid(
                    codes::VALIDATION_ERROR,
                    format!("duplicate export name {:?}", export.name),
                ));
            }
            let bound = match export.kind {
                ExportKind::Func => self.func_types.len(),
                ExportKind::Table => self.tables.len(),
                ExportKind::Memory => self.memories.len(),
                ExportKind::Global => self.globals.len(),
            };
            if export.index as usize >= bound {
                return Err(invalid(
                    codes::INVALID_INDEX,
                    format!("export {:?} refers to index {}", export.name, export.index),
                ));
            }
        }

        if let Some(start) = module.start {
            let ty = self.func_type(module, start)?;
            if !ty.params.is_empty() || !ty.results.is_empty() {
                return Err(invalid(
                    codes::TYPE_MISMATCH,
                    "start function must have type [] -> []",
                ));
            }
        }

        for (i, segment) in module.elements.iter().enumerate() {
            if let ElementMode::Active { table, offset } = &segment.mode {
                let table_ty = self.table(*table)?;
                if table_ty.element != segment.ty {
                    return Err(invalid(
                        codes::TYPE_MISMATCH,
                        format!(
                            "element segment {i} has type {} but table {table} holds {}",
                            segment.ty, table_ty.element
                        ),
                    ));
                }
                let got = self.const_expr_type(offset)?;
                if got != ValueType::I32 {
                    return Err(invalid(
                        codes::TYPE_MISMATCH,
                        format!("element segment {i} offset has type {got}, expected i32"),
                    ));
                }
            }
            for item in &segment.items {
                let got = self.const_expr_type(item)?;
                if got != segment.ty {
                    return Err(invalid(
                        codes::TYPE_MISMATCH,
                        format!("element segment {i} item has type {got}, expected {}", segment.ty),
                    ));
                }
            }
        }

        for (i, segment) in module.datas.iter().enumerate() {
            if let DataMode::Active { memory, offset } = &segment.mode {
                if *memory as usize >= self.memories.len() {
                    return Err(invalid(
                        codes::INVALID_INDEX,
                        format!("data segment {i} refers to memory {memory}"),
                    ));
                }
                let got = self.const_expr_type(offset)?;
                if got != ValueType::I32 {
                    return Err(invalid(
                        codes::TYPE_MISMATCH,
                        format!("data segment {i} offset has type {got}, expected i32"),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Type of a constant initializer expression, with the constraints
    /// that apply outside function bodies.
    fn const_expr_type(&self, expr: &ConstExpr) -> Result<ValueType> {
        Ok(match expr {
            ConstExpr::I32(_) => ValueType::I32,
            ConstExpr::I64(_) => ValueType::I64,
            ConstExpr::F32(_) => ValueType::F32,
            ConstExpr::F64(_) => ValueType::F64,
            ConstExpr::RefNull(ty) => *ty,
            ConstExpr::RefFunc(idx) => {
                if *idx as usize >= self.func_types.len() {
                    return Err(invalid(
                        codes::INVALID_INDEX,
                        format!("function index {idx}"),
                    ));
                }
                ValueType::FuncRef
            }
            ConstExpr::GlobalGet(idx) => {
                if *idx >= self.num_imported_globals {
                    return Err(invalid(
                        codes::INVALID_CONST_EXPR,
                        format!("initializer reads non-imported global {idx}"),
                    ));
                }
                let ty = self.global(*idx)?;
                if ty.mutability != Mutability::Const {
                    return Err(invalid(
                        codes::INVALID_CONST_EXPR,
                        format!("initializer reads mutable global {idx}"),
                    ));
                }
                ty.value_type
            }
        })
    }
}

/// A value whose type may be unknown on a polymorphic stack.
type MaybeType = Option<ValueType>;

struct CtrlFrame {
    start_types: Vec<ValueType>,
    end_types: Vec<ValueType>,
    /// Value-stack height on entry.
    height: usize,
    unreachable: bool,
    is_loop: bool,
    is_if: bool,
    /// Instruction index of the opening `block`/`loop`/`if`, or `None`
    /// for the implicit function frame.
    opened_at: Option<usize>,
}

impl CtrlFrame {
    /// Types a branch to this frame expects: a loop re-enters at its
    /// start, everything else jumps past its end.
    fn label_types(&self) -> &[ValueType] {
        if self.is_loop {
            &self.start_types
        } else {
            &self.end_types
        }
    }
}

struct BodyChecker<'a> {
    ctx: &'a ModuleContext,
    module: &'a Module,
    locals: Vec<ValueType>,
    results: Vec<ValueType>,
    vals: Vec<MaybeType>,
    ctrls: Vec<CtrlFrame>,
    jump_table: Option<Vec<JumpTarget>>,
    max_stack: usize,
}

impl<'a> BodyChecker<'a> {
    fn new(
        ctx: &'a ModuleContext,
        module: &'a Module,
        func_type: &FuncType,
        local_groups: &[(u32, ValueType)],
        config: &DecodeConfig,
    ) -> Self {
        let mut locals = func_type.params.clone();
        for (n, ty) in local_groups {
            locals.extend(std::iter::repeat(*ty).take(*n as usize));
        }
        Self {
            ctx,
            module,
            locals,
            results: func_type.results.clone(),
            vals: Vec::new(),
            ctrls: Vec::new(),
            jump_table: config.generate_jump_table.then(Vec::new),
            max_stack: 0,
        }
    }

    fn push(&mut self, ty: MaybeType) {
        self.vals.push(ty);
        self.max_stack = self.max_stack.max(self.vals.len());
    }

    fn push_ty(&mut self, ty: ValueType) {
        self.push(Some(ty));
    }

    fn pop(&mut self) -> Result<MaybeType> {
        let frame = self
            .ctrls
            .last()
            .ok_or_else(|| invalid(codes::TYPE_MISMATCH, "value stack underflow"))?;
        if self.vals.len() == frame.height {
            if frame.unreachable {
                return Ok(None);
            }
            return Err(invalid(codes::TYPE_MISMATCH, "value stack underflow"));
        }
        Ok(self.vals.pop().flatten())
    }

    fn pop_expect(&mut self, expect: ValueType) -> Result<()> {
        match self.pop()? {
            None => Ok(()),
            Some(got) if got == expect => Ok(()),
            Some(got) => Err(invalid(
                codes::TYPE_MISMATCH,
                format!("expected {expect}, found {got}"),
            )),
        }
    }

    fn pop_types(&mut self, types: &[ValueType]) -> Result<()> {
        for ty in types.iter().rev() {
            self.pop_expect(*ty)?;
        }
        Ok(())
    }

    fn push_types(&mut self, types: &[ValueType]) {
        for ty in types {
            self.push_ty(*ty);
        }
    }

    /// Pops the expected types and returns the actual entries popped, so
    /// that a polymorphic Unknown slot can be restored as Unknown rather
    /// than refined to a concrete type. Entries come back in stack order.
    fn pop_entries(&mut self, types: &[ValueType]) -> Result<Vec<MaybeType>> {
        let mut entries = Vec::with_capacity(types.len());
        for ty in types.iter().rev() {
            let got = self.pop()?;
            if let Some(found) = got {
                if found != *ty {
                    return Err(invalid(
                        codes::TYPE_MISMATCH,
                        format!("expected {ty}, found {found}"),
                    ));
                }
            }
            entries.push(got);
        }
        entries.reverse();
        Ok(entries)
    }

    fn push_frame(
        &mut self,
        start_types: Vec<ValueType>,
        end_types: Vec<ValueType>,
        is_loop: bool,
        is_if: bool,
        opened_at: Option<usize>,
    ) {
        let height = self.vals.len();
        self.push_types(&start_types);
        self.ctrls.push(CtrlFrame {
            start_types,
            end_types,
            height,
            unreachable: false,
            is_loop,
            is_if,
            opened_at,
        });
    }

    fn pop_frame(&mut self) -> Result<CtrlFrame> {
        let end_types = self
            .ctrls
            .last()
            .ok_or_else(|| invalid(codes::TYPE_MISMATCH, "control stack underflow"))?
            .end_types
            .clone();
        self.pop_types(&end_types)?;
        let frame = self
            .ctrls
            .pop()
            .ok_or_else(|| invalid(codes::TYPE_MISMATCH, "control stack underflow"))?;
        if self.vals.len() != frame.height {
            return Err(invalid(
                codes::TYPE_MISMATCH,
                format!(
                    "{} values left on the stack at block end",
                    self.vals.len() - frame.height
                ),
            ));
        }
        Ok(frame)
    }

    /// Marks the rest of the current block unreachable.
    fn set_unreachable(&mut self) -> Result<()> {
        let frame = self
            .ctrls
            .last_mut()
            .ok_or_else(|| invalid(codes::TYPE_MISMATCH, "control stack underflow"))?;
        self.vals.truncate(frame.height);
        frame.unreachable = true;
        Ok(())
    }

    fn label(&self, depth: u32) -> Result<&CtrlFrame> {
        let len = self.ctrls.len();
        if depth as usize >= len {
            return Err(invalid(
                codes::INVALID_INDEX,
                format!("label depth {depth} exceeds nesting {len}"),
            ));
        }
        Ok(&self.ctrls[len - 1 - depth as usize])
    }

    fn local(&self, idx: u32) -> Result<ValueType> {
        self.locals
            .get(idx as usize)
            .copied()
            .ok_or_else(|| invalid(codes::INVALID_INDEX, format!("local index {idx}")))
    }

    fn block_signature(&self, bt: BlockType) -> Result<(Vec<ValueType>, Vec<ValueType>)> {
        Ok(match bt {
            BlockType::Empty => (Vec::new(), Vec::new()),
            BlockType::Value(ty) => (Vec::new(), vec![ty]),
            BlockType::Func(idx) => {
                let ty = self
                    .module
                    .types
                    .get(idx as usize)
                    .ok_or_else(|| invalid(codes::INVALID_INDEX, format!("type index {idx}")))?;
                (ty.params.clone(), ty.results.clone())
            }
        })
    }

    fn check_mem_arg(&self, arg: MemArg, width: u32) -> Result<()> {
        self.ctx.require_memory()?;
        // width is the access size in bytes; align is log2.
        if arg.align > width.trailing_zeros() {
            return Err(invalid(
                codes::VALIDATION_ERROR,
                format!("alignment 2^{} larger than access width {width}", arg.align),
            ));
        }
        Ok(())
    }

    fn check_data_idx(&self, idx: u32) -> Result<()> {
        let Some(count) = self.module.data_count else {
            return Err(invalid(
                codes::VALIDATION_ERROR,
                "bulk data instruction requires a data count section",
            ));
        };
        if idx >= count {
            return Err(invalid(
                codes::INVALID_INDEX,
                format!("data segment index {idx}"),
            ));
        }
        Ok(())
    }

    fn check_elem_idx(&self, idx: u32) -> Result<ValueType> {
        self.module
            .elements
            .get(idx as usize)
            .map(|s| s.ty)
            .ok_or_else(|| invalid(codes::INVALID_INDEX, format!("element segment index {idx}")))
    }

    fn record_jump(&mut self, opened_at: Option<usize>, pc: usize, is_else: bool) {
        let (Some(table), Some(open)) = (self.jump_table.as_mut(), opened_at) else {
            return;
        };
        if is_else {
            table[open].else_pc = (pc + 1) as u32;
        } else {
            table[open].end_pc = (pc + 1) as u32;
        }
    }

    fn run(&mut self, instrs: &[Instruction]) -> Result<()> {
        if let Some(table) = self.jump_table.as_mut() {
            table.resize(instrs.len(), JumpTarget::default());
        }
        self.push_frame(Vec::new(), self.results.clone(), false, false, None);

        for (pc, instr) in instrs.iter().enumerate() {
            self.step(pc, instr)?;
        }
        if !self.ctrls.is_empty() {
            return Err(invalid(
                codes::TYPE_MISMATCH,
                "function body not terminated by end",
            ));
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn step(&mut self, pc: usize, instr: &Instruction) -> Result<()> {
        use Instruction as I;
        use ValueType as T;
        match instr {
            I::Unreachable => self.set_unreachable()?,
            I::Nop => {}

            I::Block(bt) | I::Loop(bt) => {
                let (params, results) = self.block_signature(*bt)?;
                self.pop_types(&params)?;
                let is_loop = matches!(instr, I::Loop(_));
                self.push_frame(params, results, is_loop, false, Some(pc));
            }
            I::If(bt) => {
                self.pop_expect(T::I32)?;
                let (params, results) = self.block_signature(*bt)?;
                self.pop_types(&params)?;
                self.push_frame(params, results, false, true, Some(pc));
            }
            I::Else => {
                let frame = self.pop_frame()?;
                if !frame.is_if {
                    return Err(invalid(codes::TYPE_MISMATCH, "else without matching if"));
                }
                self.record_jump(frame.opened_at, pc, true);
                self.push_frame(
                    frame.start_types,
                    frame.end_types,
                    false,
                    false,
                    frame.opened_at,
                );
            }
            I::End => {
                let frame = self.pop_frame()?;
                // An if without an else must not produce more than it
                // consumes, since the implicit else is empty.
                if frame.is_if && frame.start_types != frame.end_types {
                    return Err(invalid(
                        codes::TYPE_MISMATCH,
                        "if without else must have matching parameter and result types",
                    ));
                }
                self.record_jump(frame.opened_at, pc, false);
                self.push_types(&frame.end_types);
            }

            I::Br(depth) => {
                let types = self.label(*depth)?.label_types().to_vec();
                self.pop_types(&types)?;
                self.set_unreachable()?;
            }
            I::BrIf(depth) => {
                self.pop_expect(T::I32)?;
                let types = self.label(*depth)?.label_types().to_vec();
                self.pop_types(&types)?;
                self.push_types(&types);
            }
            I::BrTable(data) => {
                self.pop_expect(T::I32)?;
                let default_types = self.label(data.default)?.label_types().to_vec();
                for target in &data.targets {
                    let types = self.label(*target)?.label_types();
                    if types.len() != default_types.len() {
                        return Err(invalid(
                            codes::TYPE_MISMATCH,
                            "br_table targets have mismatched arities",
                        ));
                    }
                    // Push back what was actually popped: on a polymorphic
                    // stack the targets may disagree on concrete types, and
                    // Unknown must stay Unknown across targets.
                    let types = types.to_vec();
                    let entries = self.pop_entries(&types)?;
                    for entry in entries {
                        self.push(entry);
                    }
                }
                self.pop_types(&default_types)?;
                self.set_unreachable()?;
            }
            I::Return => {
                let types = self.results.clone();
                self.pop_types(&types)?;
                self.set_unreachable()?;
            }
            I::Call(funcidx) => {
                let ty = self.ctx.func_type(self.module, *funcidx)?.clone();
                self.pop_types(&ty.params)?;
                self.push_types(&ty.results);
            }
            I::CallIndirect {
                type_idx,
                table_idx,
            } => {
                let table = self.ctx.table(*table_idx)?;
                if table.element != T::FuncRef {
                    return Err(invalid(
                        codes::TYPE_MISMATCH,
                        format!("call_indirect through a table of {}", table.element),
                    ));
                }
                let ty = self
                    .module
                    .types
                    .get(*type_idx as usize)
                    .ok_or_else(|| {
                        invalid(codes::INVALID_INDEX, format!("type index {type_idx}"))
                    })?
                    .clone();
                self.pop_expect(T::I32)?;
                self.pop_types(&ty.params)?;
                self.push_types(&ty.results);
            }

            I::Drop => {
                self.pop()?;
            }
            I::Select => {
                self.pop_expect(T::I32)?;
                let a = self.pop()?;
                let b = self.pop()?;
                let ty = match (a, b) {
                    (Some(a), Some(b)) if a == b => Some(a),
                    (Some(a), None) => Some(a),
                    (None, Some(b)) => Some(b),
                    (None, None) => None,
                    (Some(a), Some(b)) => {
                        return Err(invalid(
                            codes::TYPE_MISMATCH,
                            format!("select operands {a} and {b} differ"),
                        ));
                    }
                };
                if let Some(ty) = ty {
                    if ty.is_ref() {
                        return Err(invalid(
                            codes::TYPE_MISMATCH,
                            "untyped select cannot pick reference values",
                        ));
                    }
                }
                self.push(ty);
            }
            I::SelectT(ty) => {
                self.pop_expect(T::I32)?;
                self.pop_expect(*ty)?;
                self.pop_expect(*ty)?;
                self.push_ty(*ty);
            }

            I::LocalGet(idx) => {
                let ty = self.local(*idx)?;
                self.push_ty(ty);
            }
            I::LocalSet(idx) => {
                let ty = self.local(*idx)?;
                self.pop_expect(ty)?;
            }
            I::LocalTee(idx) => {
                let ty = self.local(*idx)?;
                self.pop_expect(ty)?;
                self.push_ty(ty);
            }
            I::GlobalGet(idx) => {
                let ty = self.ctx.global(*idx)?.value_type;
                self.push_ty(ty);
            }
            I::GlobalSet(idx) => {
                let global = self.ctx.global(*idx)?;
                if global.mutability != Mutability::Var {
                    return Err(invalid(
                        codes::INVALID_MUTABILITY,
                        format!("global {idx} is immutable"),
                    ));
                }
                let ty = global.value_type;
                self.pop_expect(ty)?;
            }

            I::TableGet(idx) => {
                let elem = self.ctx.table(*idx)?.element;
                self.pop_expect(T::I32)?;
                self.push_ty(elem);
            }
            I::TableSet(idx) => {
                let elem = self.ctx.table(*idx)?.element;
                self.pop_expect(elem)?;
                self.pop_expect(T::I32)?;
            }

            I::I32Load(arg) => self.load(*arg, 4, T::I32)?,
            I::I64Load(arg) => self.load(*arg, 8, T::I64)?,
            I::F32Load(arg) => self.load(*arg, 4, T::F32)?,
            I::F64Load(arg) => self.load(*arg, 8, T::F64)?,
            I::I32Load8S(arg) | I::I32Load8U(arg) => self.load(*arg, 1, T::I32)?,
            I::I32Load16S(arg) | I::I32Load16U(arg) => self.load(*arg, 2, T::I32)?,
            I::I64Load8S(arg) | I::I64Load8U(arg) => self.load(*arg, 1, T::I64)?,
            I::I64Load16S(arg) | I::I64Load16U(arg) => self.load(*arg, 2, T::I64)?,
            I::I64Load32S(arg) | I::I64Load32U(arg) => self.load(*arg, 4, T::I64)?,
            I::I32Store(arg) => self.store(*arg, 4, T::I32)?,
            I::I64Store(arg) => self.store(*arg, 8, T::I64)?,
            I::F32Store(arg) => self.store(*arg, 4, T::F32)?,
            I::F64Store(arg) => self.store(*arg, 8, T::F64)?,
            I::I32Store8(arg) => self.store(*arg, 1, T::I32)?,
            I::I32Store16(arg) => self.store(*arg, 2, T::I32)?,
            I::I64Store8(arg) => self.store(*arg, 1, T::I64)?,
            I::I64Store16(arg) => self.store(*arg, 2, T::I64)?,
            I::I64Store32(arg) => self.store(*arg, 4, T::I64)?,
            I::MemorySize => {
                self.ctx.require_memory()?;
                self.push_ty(T::I32);
            }
            I::MemoryGrow => {
                self.ctx.require_memory()?;
                self.pop_expect(T::I32)?;
                self.push_ty(T::I32);
            }

            I::I32Const(_) => self.push_ty(T::I32),
            I::I64Const(_) => self.push_ty(T::I64),
            I::F32Const(_) => self.push_ty(T::F32),
            I::F64Const(_) => self.push_ty(T::F64),

            I::I32Eqz => self.unop(T::I32, T::I32)?,
            I::I32Eq | I::I32Ne | I::I32LtS | I::I32LtU | I::I32GtS | I::I32GtU | I::I32LeS
            | I::I32LeU | I::I32GeS | I::I32GeU => self.binop(T::I32, T::I32)?,
            I::I64Eqz => self.unop(T::I64, T::I32)?,
            I::I64Eq | I::I64Ne | I::I64LtS | I::I64LtU | I::I64GtS | I::I64GtU | I::I64LeS
            | I::I64LeU | I::I64GeS | I::I64GeU => self.binop(T::I64, T::I32)?,
            I::F32Eq | I::F32Ne | I::F32Lt | I::F32Gt | I::F32Le | I::F32Ge => {
                self.binop(T::F32, T::I32)?;
            }
            I::F64Eq | I::F64Ne | I::F64Lt | I::F64Gt | I::F64Le | I::F64Ge => {
                self.binop(T::F64, T::I32)?;
            }

            I::I32Clz | I::I32Ctz | I::I32Popcnt | I::I32Extend8S | I::I32Extend16S => {
                self.unop(T::I32, T::I32)?;
            }
            I::I32Add | I::I32Sub | I::I32Mul | I::I32DivS | I::I32DivU | I::I32RemS
            | I::I32RemU | I::I32And | I::I32Or | I::I32Xor | I::I32Shl | I::I32ShrS
            | I::I32ShrU | I::I32Rotl | I::I32Rotr => self.binop(T::I32, T::I32)?,
            I::I64Clz | I::I64Ctz | I::I64Popcnt | I::I64Extend8S | I::I64Extend16S
            | I::I64Extend32S => self.unop(T::I64, T::I64)?,
            I::I64Add | I::I64Sub | I::I64Mul | I::I64DivS | I::I64DivU | I::I64RemS
            | I::I64RemU | I::I64And | I::I64Or | I::I64Xor | I::I64Shl | I::I64ShrS
            | I::I64ShrU | I::I64Rotl | I::I64Rotr => self.binop(T::I64, T::I64)?,
            I::F32Abs | I::F32Neg | I::F32Ceil | I::F32Floor | I::F32Trunc | I::F32Nearest
            | I::F32Sqrt => self.unop(T::F32, T::F32)?,
            I::F32Add | I::F32Sub | I::F32Mul | I::F32Div | I::F32Min | I::F32Max
            | I::F32Copysign => self.binop(T::F32, T::F32)?,
            I::F64Abs | I::F64Neg | I::F64Ceil | I::F64Floor | I::F64Trunc | I::F64Nearest
            | I::F64Sqrt => self.unop(T::F64, T::F64)?,
            I::F64Add | I::F64Sub | I::F64Mul | I::F64Div | I::F64Min | I::F64Max
            | I::F64Copysign => self.binop(T::F64, T::F64)?,

            I::I32WrapI64 => self.unop(T::I64, T::I32)?,
            I::I32TruncF32S | I::I32TruncF32U | I::I32TruncSatF32S | I::I32TruncSatF32U
            | I::I32ReinterpretF32 => self.unop(T::F32, T::I32)?,
            I::I32TruncF64S | I::I32TruncF64U | I::I32TruncSatF64S | I::I32TruncSatF64U => {
                self.unop(T::F64, T::I32)?;
            }
            I::I64ExtendI32S | I::I64ExtendI32U => self.unop(T::I32, T::I64)?,
            I::I64TruncF32S | I::I64TruncF32U | I::I64TruncSatF32S | I::I64TruncSatF32U => {
                self.unop(T::F32, T::I64)?;
            }
            I::I64TruncF64S | I::I64TruncF64U | I::I64TruncSatF64S | I::I64TruncSatF64U
            | I::I64ReinterpretF64 => self.unop(T::F64, T::I64)?,
            I::F32ConvertI32S | I::F32ConvertI32U | I::F32ReinterpretI32 => {
                self.unop(T::I32, T::F32)?;
            }
            I::F32ConvertI64S | I::F32ConvertI64U => self.unop(T::I64, T::F32)?,
            I::F32DemoteF64 => self.unop(T::F64, T::F32)?,
            I::F64ConvertI32S | I::F64ConvertI32U => self.unop(T::I32, T::F64)?,
            I::F64ConvertI64S | I::F64ConvertI64U | I::F64ReinterpretI64 => {
                self.unop(T::I64, T::F64)?;
            }
            I::F64PromoteF32 => self.unop(T::F32, T::F64)?,

            I::RefNull(ty) => self.push_ty(*ty),
            I::RefIsNull => {
                match self.pop()? {
                    None => {}
                    Some(ty) if ty.is_ref() => {}
                    Some(ty) => {
                        return Err(invalid(
                            codes::TYPE_MISMATCH,
                            format!("ref.is_null on non-reference {ty}"),
                        ));
                    }
                }
                self.push_ty(T::I32);
            }
            I::RefFunc(idx) => {
                if *idx as usize >= self.ctx.func_types.len() {
                    return Err(invalid(
                        codes::INVALID_INDEX,
                        format!("function index {idx}"),
                    ));
                }
                if !self.ctx.declared_funcs.contains(idx) {
                    return Err(invalid(
                        codes::VALIDATION_ERROR,
                        format!("ref.func names undeclared function {idx}"),
                    ));
                }
                self.push_ty(T::FuncRef);
            }

            I::MemoryInit(idx) => {
                self.ctx.require_memory()?;
                self.check_data_idx(*idx)?;
                self.pop_expect(T::I32)?;
                self.pop_expect(T::I32)?;
                self.pop_expect(T::I32)?;
            }
            I::DataDrop(idx) => {
                self.check_data_idx(*idx)?;
            }
            I::MemoryCopy | I::MemoryFill => {
                self.ctx.require_memory()?;
                self.pop_expect(T::I32)?;
                self.pop_expect(T::I32)?;
                self.pop_expect(T::I32)?;
            }
            I::TableInit {
                elem_idx,
                table_idx,
            } => {
                let table_elem = self.ctx.table(*table_idx)?.element;
                let seg_ty = self.check_elem_idx(*elem_idx)?;
                if seg_ty != table_elem {
                    return Err(invalid(
                        codes::TYPE_MISMATCH,
                        format!("table.init of {table_elem} table from {seg_ty} segment"),
                    ));
                }
                self.pop_expect(T::I32)?;
                self.pop_expect(T::I32)?;
                self.pop_expect(T::I32)?;
            }
            I::ElemDrop(idx) => {
                self.check_elem_idx(*idx)?;
            }
            I::TableCopy {
                dst_table,
                src_table,
            } => {
                let dst = self.ctx.table(*dst_table)?.element;
                let src = self.ctx.table(*src_table)?.element;
                if dst != src {
                    return Err(invalid(
                        codes::TYPE_MISMATCH,
                        format!("table.copy from {src} table into {dst} table"),
                    ));
                }
                self.pop_expect(T::I32)?;
                self.pop_expect(T::I32)?;
                self.pop_expect(T::I32)?;
            }
            I::TableGrow(idx) => {
                let elem = self.ctx.table(*idx)?.element;
                self.pop_expect(T::I32)?;
                self.pop_expect(elem)?;
                self.push_ty(T::I32);
            }
            I::TableSize(idx) => {
                self.ctx.table(*idx)?;
                self.push_ty(T::I32);
            }
            I::TableFill(idx) => {
                let elem = self.ctx.table(*idx)?.element;
                self.pop_expect(T::I32)?;
                self.pop_expect(elem)?;
                self.pop_expect(T::I32)?;
            }
        }
        Ok(())
    }

    fn unop(&mut self, input: ValueType, output: ValueType) -> Result<()> {
        self.pop_expect(input)?;
        self.push_ty(output);
        Ok(())
    }

    fn binop(&mut self, input: ValueType, output: ValueType) -> Result<()> {
        self.pop_expect(input)?;
        self.pop_expect(input)?;
        self.push_ty(output);
        Ok(())
    }

    fn load(&mut self, arg: MemArg, width: u32, result: ValueType) -> Result<()> {
        self.check_mem_arg(arg, width)?;
        self.pop_expect(ValueType::I32)?;
        self.push_ty(result);
        Ok(())
    }

    fn store(&mut self, arg: MemArg, width: u32, operand: ValueType) -> Result<()> {
        self.check_mem_arg(arg, width)?;
        self.pop_expect(operand)?;
        self.pop_expect(ValueType::I32)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode_module;

    fn decode(wat: &str) -> Result<Module> {
        let bytes = wat::parse_str(wat).unwrap();
        decode_module(&bytes, &DecodeConfig::default())
    }

    #[test]
    fn validates_simple_add() {
        let module = decode(
            r#"(module
                (func (export "add") (param i32 i32) (result i32)
                    local.get 0
                    local.get 1
                    i32.add))"#,
        )
        .unwrap();
        assert_eq!(module.num_funcs(), 1);
        assert_eq!(module.bodies[0].max_stack, 2);
    }

    #[test]
    fn rejects_type_mismatch() {
        // Hand-assembled: type () -> (i32), body: i64.const 1, end.
        let mut m = Vec::new();
        m.extend_from_slice(b"\0asm\x01\0\0\0");
        m.extend_from_slice(&[0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7F]); // type
        m.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]); // function
        m.extend_from_slice(&[0x0A, 0x06, 0x01, 0x04, 0x00, 0x42, 0x01, 0x0B]); // code
        let err = decode_module(&m, &DecodeConfig::default()).unwrap_err();
        assert_eq!(err.code, codes::TYPE_MISMATCH);
    }

    #[test]
    fn rejects_stack_underflow() {
        let mut m = Vec::new();
        m.extend_from_slice(b"\0asm\x01\0\0\0");
        m.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]); // type () -> ()
        m.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]); // function
        m.extend_from_slice(&[0x0A, 0x05, 0x01, 0x03, 0x00, 0x6A, 0x0B]); // i32.add on empty stack
        let err = decode_module(&m, &DecodeConfig::default()).unwrap_err();
        assert_eq!(err.code, codes::TYPE_MISMATCH);
    }

    #[test]
    fn unreachable_makes_stack_polymorphic() {
        let module = decode(
            r#"(module
                (func (result i32)
                    unreachable
                    i32.add))"#,
        )
        .unwrap();
        assert_eq!(module.bodies.len(), 1);
    }

    #[test]
    fn br_table_keeps_the_polymorphic_stack_polymorphic() {
        // After unreachable, the br_table operand is Unknown and the two
        // targets expect different (same-arity) result types. Checking one
        // target must not refine the slot and fail the other.
        let module = decode(
            r#"(module
                (func
                    (block (result f64)
                        (block (result f32)
                            unreachable
                            (br_table 0 1 1 (i32.const 1)))
                        drop
                        (f64.const 0))
                    drop))"#,
        );
        assert!(module.is_ok(), "valid module rejected: {module:?}");
    }

    #[test]
    fn br_table_still_checks_reachable_operands() {
        let module = decode(
            r#"(module
                (func (result i32)
                    (block (result i32)
                        (block (result f32)
                            (f32.const 0)
                            (br_table 0 1 (i32.const 0)))
                        drop
                        (i32.const 0))))"#,
        );
        assert!(module.is_err());
    }

    #[test]
    fn rejects_duplicate_export_names() {
        let module = decode(
            r#"(module
                (func (export "f"))
                (global (export "f") i32 (i32.const 0)))"#,
        );
        assert!(module.is_err());
    }

    #[test]
    fn rejects_mutable_global_in_initializer() {
        let module = decode(
            r#"(module
                (import "env" "g" (global (mut i32)))
                (global i32 (global.get 0)))"#,
        );
        let err = module.unwrap_err();
        assert_eq!(err.code, codes::INVALID_CONST_EXPR);
    }

    #[test]
    fn rejects_global_set_of_immutable() {
        let module = decode(
            r#"(module
                (global $g i32 (i32.const 0))
                (func i32.const 1 global.set $g))"#,
        );
        let err = module.unwrap_err();
        assert_eq!(err.code, codes::INVALID_MUTABILITY);
    }

    #[test]
    fn rejects_second_memory() {
        let mut m = Vec::new();
        m.extend_from_slice(b"\0asm\x01\0\0\0");
        m.extend_from_slice(&[0x05, 0x05, 0x02, 0x00, 0x01, 0x00, 0x01]); // two memories
        let err = decode_module(&m, &DecodeConfig::default()).unwrap_err();
        assert_eq!(err.code, codes::MULTIPLE_RESOURCES);
    }

    #[test]
    fn rejects_overaligned_access() {
        let module = decode(
            r#"(module
                (memory 1)
                (func (result i32)
                    i32.const 0
                    i32.load align=8))"#,
        );
        assert!(module.is_err());
    }

    #[test]
    fn rejects_start_with_params() {
        let mut m = Vec::new();
        m.extend_from_slice(b"\0asm\x01\0\0\0");
        m.extend_from_slice(&[0x01, 0x05, 0x01, 0x60, 0x01, 0x7F, 0x00]); // (i32) -> ()
        m.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
        m.extend_from_slice(&[0x08, 0x01, 0x00]); // start = func 0
        m.extend_from_slice(&[0x0A, 0x04, 0x01, 0x02, 0x00, 0x0B]);
        let err = decode_module(&m, &DecodeConfig::default()).unwrap_err();
        assert_eq!(err.code, codes::TYPE_MISMATCH);
    }

    #[test]
    fn jump_table_maps_if_to_else_and_end() {
        let module = decode(
            r#"(module
                (func (param i32) (result i32)
                    local.get 0
                    if (result i32)
                        i32.const 1
                    else
                        i32.const 2
                    end))"#,
        )
        .unwrap();
        let body = &module.bodies[0];
        let table = body.jump_table.as_ref().unwrap();
        assert_eq!(table.len(), body.instrs.len());
        // Instruction 1 is the `if`; find its recorded targets.
        let entry = table[1];
        assert_eq!(body.instrs[entry.else_pc as usize - 1], Instruction::Else);
        assert_eq!(body.instrs[entry.end_pc as usize - 1], Instruction::End);
    }

    #[test]
    fn jump_table_skipped_when_disabled() {
        let bytes = wat::parse_str(r#"(module (func (block)))"#).unwrap();
        let config = DecodeConfig {
            generate_jump_table: false,
        };
        let module = decode_module(&bytes, &config).unwrap();
        assert!(module.bodies[0].jump_table.is_none());
    }

    #[test]
    fn rejects_undeclared_ref_func() {
        let mut m = Vec::new();
        m.extend_from_slice(b"\0asm\x01\0\0\0");
        m.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]); // () -> ()
        m.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
        // body: ref.func 0, drop, end
        m.extend_from_slice(&[0x0A, 0x07, 0x01, 0x05, 0x00, 0xD2, 0x00, 0x1A, 0x0B]);
        let err = decode_module(&m, &DecodeConfig::default()).unwrap_err();
        assert_eq!(err.code, codes::VALIDATION_ERROR);
    }

    #[test]
    fn rejects_memory_init_without_data_count() {
        let mut m = Vec::new();
        m.extend_from_slice(b"\0asm\x01\0\0\0");
        m.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]);
        m.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
        m.extend_from_slice(&[0x05, 0x03, 0x01, 0x00, 0x01]); // memory 1
        // body: i32.const 0 x3, memory.init 0, end
        m.extend_from_slice(&[
            0x0A, 0x0E, 0x01, 0x0C, 0x00, 0x41, 0x00, 0x41, 0x00, 0x41, 0x00, 0xFC, 0x08, 0x00,
            0x00, 0x0B,
        ]);
        let err = decode_module(&m, &DecodeConfig::default()).unwrap_err();
        assert_eq!(err.code, codes::VALIDATION_ERROR);
    }
}
