// Weft - weft-runtime
// Module: execution context and interpreter
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! The operand-stack machine.
//!
//! The interpreter is a stackless loop: instead of recursing into the
//! host stack on every wasm call, it keeps an explicit stack of
//! suspended call frames plus one active frame, all sharing one operand
//! stack. Frame and value counts are bounded by [`EngineConfig`], the
//! two exhaustions trapping with distinct kinds.
//!
//! Structured control flow is resolved either through the jump table
//! computed at validation time or, when the module was decoded without
//! one, by scanning forward for the matching `else`/`end`. The two modes
//! are observably identical.
//!
//! Wasm-level faults become [`Trap`]s. Misuse by the embedding (wrong
//! argument arity/types, host functions returning the wrong shape) is a
//! `Contract` error, deliberately kept apart from the trap channel.

use std::rc::Rc;

use weft_error::{codes, Error, ErrorCategory};
use weft_foundation::{FloatBits32, FloatBits64, FuncRef, FuncType, Value};
use weft_format::{BlockType, FuncBody, Instruction, Module};

use crate::func::{FuncInstance, FuncKind};
use crate::instance::InstanceData;
use crate::num;
use crate::trap::{Trap, TrapKind};
use crate::EngineConfig;

/// Why an invocation failed.
#[derive(Debug)]
pub enum InvokeError {
    /// Wasm-level fault or voluntary exit; the instance stays usable.
    Trap(Trap),
    /// The embedding misused the API (arity/type mismatch, dead
    /// instance, misbehaving host function). Never a wasm fault.
    Contract(Error),
}

impl core::fmt::Display for InvokeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InvokeError::Trap(t) => write!(f, "trap: {t}"),
            InvokeError::Contract(e) => write!(f, "contract violation: {e}"),
        }
    }
}

impl std::error::Error for InvokeError {}

/// Internal unwinding channel; split into the public classes at the
/// invocation boundary.
pub(crate) enum Exception {
    Trap(Trap),
    Contract(Error),
}

impl From<Trap> for Exception {
    fn from(trap: Trap) -> Self {
        Exception::Trap(trap)
    }
}

fn contract(msg: impl Into<String>) -> Exception {
    Exception::Contract(Error::new(
        ErrorCategory::Contract,
        codes::CONTRACT_VIOLATION,
        msg,
    ))
}

/// An entered control structure.
#[derive(Clone, Copy)]
struct Label {
    /// pc of the opening `block`/`loop`/`if`.
    opened_at: usize,
    is_loop: bool,
    /// Values a branch to this label carries.
    arity: usize,
    /// Operand height underneath the structure's operands.
    height: usize,
}

/// One activation: locals, program counter, entered labels, and the
/// operand-stack region belonging to the caller.
struct Frame {
    instance: Rc<InstanceData>,
    body_idx: usize,
    locals: Vec<Value>,
    pc: usize,
    labels: Vec<Label>,
    value_base: usize,
    n_results: usize,
}

/// Per-invocation machine state. Created fresh for every top-level
/// invocation and never reused.
pub struct ExecContext {
    config: EngineConfig,
    values: Vec<Value>,
    frames: Vec<Frame>,
}

/// The `(else_pc, end_pc)` targets of the structure opened at `pc`, both
/// one past the marker; `else_pc` 0 means no else arm. Reads the
/// precomputed jump table when present, otherwise scans.
fn control_targets(body: &FuncBody, pc: usize) -> (usize, usize) {
    if let Some(table) = &body.jump_table {
        let t = table[pc];
        return (t.else_pc as usize, t.end_pc as usize);
    }
    let mut depth = 0u32;
    let mut else_pc = 0;
    for (i, instr) in body.instrs.iter().enumerate().skip(pc + 1) {
        match instr {
            _ if instr.opens_block() => depth += 1,
            Instruction::Else if depth == 0 => else_pc = i + 1,
            Instruction::End => {
                if depth == 0 {
                    return (else_pc, i + 1);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    // Validated bodies always close every structure.
    (else_pc, body.instrs.len())
}

fn block_arity(module: &Module, bt: BlockType) -> (usize, usize) {
    match bt {
        BlockType::Empty => (0, 0),
        BlockType::Value(_) => (0, 1),
        BlockType::Func(idx) => module
            .types
            .get(idx as usize)
            .map_or((0, 0), |t| (t.params.len(), t.results.len())),
    }
}

/// Checks host-function results against the declared signature.
fn check_host_results(ty: &FuncType, results: &[Value]) -> Result<(), Exception> {
    if results.len() != ty.results.len() {
        return Err(contract(format!(
            "host function returned {} values, signature declares {}",
            results.len(),
            ty.results.len()
        )));
    }
    for (value, expected) in results.iter().zip(&ty.results) {
        if value.value_type() != *expected {
            return Err(contract(format!(
                "host function returned {}, signature declares {expected}",
                value.value_type()
            )));
        }
    }
    Ok(())
}

/// Invokes a function with positional type-tagged arguments.
///
/// Arity or type mismatch against the true signature is a
/// [`InvokeError::Contract`] error, never a trap.
pub fn invoke_func(
    func: &Rc<FuncInstance>,
    args: &[Value],
    config: &EngineConfig,
) -> Result<Vec<Value>, InvokeError> {
    let ty = func.ty();
    if args.len() != ty.params.len() {
        return Err(InvokeError::Contract(Error::new(
            ErrorCategory::Contract,
            codes::ARITY_MISMATCH,
            format!(
                "called with {} arguments, signature {ty} takes {}",
                args.len(),
                ty.params.len()
            ),
        )));
    }
    for (arg, expected) in args.iter().zip(&ty.params) {
        if arg.value_type() != *expected {
            return Err(InvokeError::Contract(Error::new(
                ErrorCategory::Contract,
                codes::CONTRACT_VIOLATION,
                format!("argument of type {}, expected {expected}", arg.value_type()),
            )));
        }
    }

    match &func.kind {
        FuncKind::Host(call) => {
            let results = call(args).map_err(InvokeError::Trap)?;
            match check_host_results(ty, &results) {
                Ok(()) => Ok(results),
                Err(Exception::Contract(e)) => Err(InvokeError::Contract(e)),
                Err(Exception::Trap(t)) => Err(InvokeError::Trap(t)),
            }
        }
        FuncKind::Wasm { instance, func_idx } => {
            let instance = instance
                .upgrade()
                .ok_or_else(|| {
                    InvokeError::Contract(Error::new(
                        ErrorCategory::Contract,
                        codes::CONTRACT_VIOLATION,
                        "function's instance has been dropped",
                    ))
                })?;
            let mut ctx = ExecContext {
                config: *config,
                values: args.to_vec(),
                frames: Vec::new(),
            };
            let frame = match ctx.new_wasm_frame(instance, *func_idx) {
                Ok(frame) => frame,
                Err(Exception::Trap(t)) => return Err(InvokeError::Trap(t)),
                Err(Exception::Contract(e)) => return Err(InvokeError::Contract(e)),
            };
            match ctx.run(frame) {
                Ok(()) => Ok(ctx.values),
                Err(Exception::Trap(t)) => Err(InvokeError::Trap(t)),
                Err(Exception::Contract(e)) => Err(InvokeError::Contract(e)),
            }
        }
    }
}

impl ExecContext {
    /// Pops the callee's parameters into a fresh frame. The operand
    /// budget is checked once per call using the validation-computed
    /// per-body maximum.
    fn new_wasm_frame(
        &mut self,
        instance: Rc<InstanceData>,
        func_idx: u32,
    ) -> Result<Frame, Exception> {
        let module = Rc::clone(&instance.module);
        let imported = module.num_imported_funcs();
        let ty = module
            .func_type(func_idx)
            .ok_or_else(|| contract(format!("no function at index {func_idx}")))?;
        let body_idx = (func_idx - imported) as usize;
        let body = module
            .bodies
            .get(body_idx)
            .ok_or_else(|| contract(format!("no body for function {func_idx}")))?;

        let n_params = ty.params.len();
        if self.values.len() < n_params {
            return Err(contract("operand stack underflow at call"));
        }
        let mut locals = self.values.split_off(self.values.len() - n_params);
        for (n, decl_ty) in &body.locals {
            for _ in 0..*n {
                locals.push(Value::default_for(*decl_ty));
            }
        }

        let value_base = self.values.len();
        if value_base + body.max_stack as usize > self.config.max_values {
            return Err(Trap::new(TrapKind::ValueStackExhausted).into());
        }

        Ok(Frame {
            instance,
            body_idx,
            locals,
            pc: 0,
            labels: Vec::new(),
            value_base,
            n_results: ty.results.len(),
        })
    }

    /// Unwinds one frame on normal return: the callee's results replace
    /// its operand region.
    fn finish_frame(&mut self, frame: &Frame) -> Result<Option<Frame>, Exception> {
        if self.values.len() < frame.n_results {
            return Err(contract("operand stack underflow at return"));
        }
        let results = self.values.split_off(self.values.len() - frame.n_results);
        self.values.truncate(frame.value_base);
        self.values.extend(results);
        Ok(self.frames.pop())
    }

    /// Either starts a wasm callee (returning its frame) or runs a host
    /// callee to completion in place.
    fn call(&mut self, callee: &Rc<FuncInstance>) -> Result<Option<Frame>, Exception> {
        match &callee.kind {
            FuncKind::Host(call) => {
                let ty = callee.ty();
                let n_params = ty.params.len();
                if self.values.len() < n_params {
                    return Err(contract("operand stack underflow at host call"));
                }
                let args = self.values.split_off(self.values.len() - n_params);
                let results = call(&args)?;
                check_host_results(ty, &results)?;
                self.values.extend(results);
                Ok(None)
            }
            FuncKind::Wasm { instance, func_idx } => {
                if self.frames.len() + 2 > self.config.max_frames {
                    return Err(Trap::new(TrapKind::CallStackExhausted).into());
                }
                let instance = instance
                    .upgrade()
                    .ok_or_else(|| contract("callee's instance has been dropped"))?;
                Ok(Some(self.new_wasm_frame(instance, *func_idx)?))
            }
        }
    }

    /// Branch to relative label `depth`; `true` means branch out of the
    /// function itself.
    fn branch(&mut self, frame: &mut Frame, body: &FuncBody, depth: u32) -> bool {
        let d = depth as usize;
        if d >= frame.labels.len() {
            return true;
        }
        let idx = frame.labels.len() - 1 - d;
        let label = frame.labels[idx];
        let kept = self.values.split_off(self.values.len() - label.arity);
        self.values.truncate(label.height);
        self.values.extend(kept);
        if label.is_loop {
            frame.labels.truncate(idx + 1);
            frame.pc = label.opened_at + 1;
        } else {
            frame.labels.truncate(idx);
            let (_, end_pc) = control_targets(body, label.opened_at);
            frame.pc = end_pc;
        }
        false
    }

    fn run(&mut self, frame: Frame) -> Result<(), Exception> {
        let mut frame = frame;
        'frames: loop {
            let instance = Rc::clone(&frame.instance);
            let module = Rc::clone(&instance.module);
            let body = &module.bodies[frame.body_idx];

            loop {
                let instr = &body.instrs[frame.pc];
                frame.pc += 1;
                match self.step(&mut frame, &instance, &module, body, instr)? {
                    Flow::Next => {}
                    Flow::Return => match self.finish_frame(&frame)? {
                        Some(parent) => {
                            frame = parent;
                            continue 'frames;
                        }
                        None => return Ok(()),
                    },
                    Flow::Call(callee) => {
                        if let Some(new_frame) = self.call(&callee)? {
                            self.frames.push(frame);
                            frame = new_frame;
                            continue 'frames;
                        }
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn step(
        &mut self,
        frame: &mut Frame,
        instance: &Rc<InstanceData>,
        module: &Rc<Module>,
        body: &FuncBody,
        instr: &Instruction,
    ) -> Result<Flow, Exception> {
        use Instruction as I;
        match instr {
            I::Unreachable => return Err(Trap::new(TrapKind::Unreachable).into()),
            I::Nop => {}

            I::Block(bt) => {
                let (np, nr) = block_arity(module, *bt);
                frame.labels.push(Label {
                    opened_at: frame.pc - 1,
                    is_loop: false,
                    arity: nr,
                    height: self.values.len() - np,
                });
            }
            I::Loop(bt) => {
                let (np, _) = block_arity(module, *bt);
                frame.labels.push(Label {
                    opened_at: frame.pc - 1,
                    is_loop: true,
                    arity: np,
                    height: self.values.len() - np,
                });
            }
            I::If(bt) => {
                let cond = self.pop_i32()?;
                let (np, nr) = block_arity(module, *bt);
                let opened_at = frame.pc - 1;
                let label = Label {
                    opened_at,
                    is_loop: false,
                    arity: nr,
                    height: self.values.len() - np,
                };
                if cond != 0 {
                    frame.labels.push(label);
                } else {
                    let (else_pc, end_pc) = control_targets(body, opened_at);
                    if else_pc != 0 {
                        frame.labels.push(label);
                        frame.pc = else_pc;
                    } else {
                        frame.pc = end_pc;
                    }
                }
            }
            I::Else => {
                // Falling out of the then-arm: skip the else-arm.
                let label = frame
                    .labels
                    .pop()
                    .ok_or_else(|| contract("else outside a control structure"))?;
                let (_, end_pc) = control_targets(body, label.opened_at);
                frame.pc = end_pc;
            }
            I::End => {
                if frame.labels.pop().is_none() {
                    return Ok(Flow::Return);
                }
            }

            I::Br(depth) => {
                if self.branch(frame, body, *depth) {
                    return Ok(Flow::Return);
                }
            }
            I::BrIf(depth) => {
                if self.pop_i32()? != 0 && self.branch(frame, body, *depth) {
                    return Ok(Flow::Return);
                }
            }
            I::BrTable(data) => {
                let idx = self.pop_u32()? as usize;
                let depth = data.targets.get(idx).copied().unwrap_or(data.default);
                if self.branch(frame, body, depth) {
                    return Ok(Flow::Return);
                }
            }
            I::Return => return Ok(Flow::Return),

            I::Call(idx) => {
                let callee = instance
                    .funcs
                    .get(*idx as usize)
                    .cloned()
                    .ok_or_else(|| contract(format!("no function at index {idx}")))?;
                return Ok(Flow::Call(callee));
            }
            I::CallIndirect {
                type_idx,
                table_idx,
            } => {
                let idx = self.pop_u32()?;
                let table = instance
                    .tables
                    .get(*table_idx as usize)
                    .ok_or_else(|| contract("call_indirect through missing table"))?;
                let slot = {
                    let table = table.borrow();
                    if idx >= table.size() {
                        return Err(Trap::new(TrapKind::UndefinedElement).into());
                    }
                    table.get(idx)?
                };
                let func_ref = match slot {
                    Value::FuncRef(Some(r)) => r,
                    Value::FuncRef(None) => {
                        return Err(Trap::new(TrapKind::UninitializedElement).into());
                    }
                    other => {
                        return Err(contract(format!(
                            "call_indirect through a {} slot",
                            other.value_type()
                        )));
                    }
                };
                let callee = func_ref
                    .downcast::<FuncInstance>()
                    .ok_or_else(|| contract("funcref does not belong to this engine"))?;
                let expected = module
                    .types
                    .get(*type_idx as usize)
                    .ok_or_else(|| contract("call_indirect against missing type"))?;
                if callee.ty() != expected {
                    return Err(Trap::new(TrapKind::IndirectCallTypeMismatch).into());
                }
                return Ok(Flow::Call(callee));
            }

            I::Drop => {
                self.pop()?;
            }
            I::Select | I::SelectT(_) => {
                let cond = self.pop_i32()?;
                let on_false = self.pop()?;
                let on_true = self.pop()?;
                self.values.push(if cond != 0 { on_true } else { on_false });
            }

            I::LocalGet(idx) => {
                let value = frame
                    .locals
                    .get(*idx as usize)
                    .cloned()
                    .ok_or_else(|| contract("local index out of range"))?;
                self.values.push(value);
            }
            I::LocalSet(idx) => {
                let value = self.pop()?;
                let slot = frame
                    .locals
                    .get_mut(*idx as usize)
                    .ok_or_else(|| contract("local index out of range"))?;
                *slot = value;
            }
            I::LocalTee(idx) => {
                let value = self
                    .values
                    .last()
                    .cloned()
                    .ok_or_else(|| contract("operand stack underflow"))?;
                let slot = frame
                    .locals
                    .get_mut(*idx as usize)
                    .ok_or_else(|| contract("local index out of range"))?;
                *slot = value;
            }
            I::GlobalGet(idx) => {
                let value = instance
                    .globals
                    .get(*idx as usize)
                    .map(|g| g.borrow().get())
                    .ok_or_else(|| contract("global index out of range"))?;
                self.values.push(value);
            }
            I::GlobalSet(idx) => {
                let value = self.pop()?;
                let cell = instance
                    .globals
                    .get(*idx as usize)
                    .ok_or_else(|| contract("global index out of range"))?;
                cell.borrow_mut()
                    .set(value)
                    .map_err(Exception::Contract)?;
            }

            I::TableGet(idx) => {
                let i = self.pop_u32()?;
                let value = self.table(instance, *idx)?.borrow().get(i)?;
                self.values.push(value);
            }
            I::TableSet(idx) => {
                let value = self.pop()?;
                let i = self.pop_u32()?;
                self.table(instance, *idx)?.borrow_mut().set(i, value)?;
            }

            I::I32Load(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<4>(a, arg.offset)?;
                self.push_i32(i32::from_le_bytes(b));
            }
            I::I64Load(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<8>(a, arg.offset)?;
                self.push_i64(i64::from_le_bytes(b));
            }
            I::F32Load(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<4>(a, arg.offset)?;
                self.values
                    .push(Value::F32(FloatBits32(u32::from_le_bytes(b))));
            }
            I::F64Load(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<8>(a, arg.offset)?;
                self.values
                    .push(Value::F64(FloatBits64(u64::from_le_bytes(b))));
            }
            I::I32Load8S(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<1>(a, arg.offset)?;
                self.push_i32(i32::from(b[0] as i8));
            }
            I::I32Load8U(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<1>(a, arg.offset)?;
                self.push_i32(i32::from(b[0]));
            }
            I::I32Load16S(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<2>(a, arg.offset)?;
                self.push_i32(i32::from(i16::from_le_bytes(b)));
            }
            I::I32Load16U(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<2>(a, arg.offset)?;
                self.push_i32(i32::from(u16::from_le_bytes(b)));
            }
            I::I64Load8S(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<1>(a, arg.offset)?;
                self.push_i64(i64::from(b[0] as i8));
            }
            I::I64Load8U(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<1>(a, arg.offset)?;
                self.push_i64(i64::from(b[0]));
            }
            I::I64Load16S(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<2>(a, arg.offset)?;
                self.push_i64(i64::from(i16::from_le_bytes(b)));
            }
            I::I64Load16U(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<2>(a, arg.offset)?;
                self.push_i64(i64::from(u16::from_le_bytes(b)));
            }
            I::I64Load32S(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<4>(a, arg.offset)?;
                self.push_i64(i64::from(i32::from_le_bytes(b)));
            }
            I::I64Load32U(arg) => {
                let a = self.pop_u32()?;
                let b = self.memory(instance)?.borrow().load::<4>(a, arg.offset)?;
                self.push_i64(i64::from(u32::from_le_bytes(b)));
            }

            I::I32Store(arg) => {
                let v = self.pop_i32()?;
                let a = self.pop_u32()?;
                self.memory(instance)?
                    .borrow_mut()
                    .store(a, arg.offset, v.to_le_bytes())?;
            }
            I::I64Store(arg) => {
                let v = self.pop_i64()?;
                let a = self.pop_u32()?;
                self.memory(instance)?
                    .borrow_mut()
                    .store(a, arg.offset, v.to_le_bytes())?;
            }
            I::F32Store(arg) => {
                let v = self.pop_f32_bits()?;
                let a = self.pop_u32()?;
                self.memory(instance)?
                    .borrow_mut()
                    .store(a, arg.offset, v.to_le_bytes())?;
            }
            I::F64Store(arg) => {
                let v = self.pop_f64_bits()?;
                let a = self.pop_u32()?;
                self.memory(instance)?
                    .borrow_mut()
                    .store(a, arg.offset, v.to_le_bytes())?;
            }
            I::I32Store8(arg) => {
                let v = self.pop_i32()?;
                let a = self.pop_u32()?;
                self.memory(instance)?
                    .borrow_mut()
                    .store(a, arg.offset, [v as u8])?;
            }
            I::I32Store16(arg) => {
                let v = self.pop_i32()?;
                let a = self.pop_u32()?;
                self.memory(instance)?
                    .borrow_mut()
                    .store(a, arg.offset, (v as u16).to_le_bytes())?;
            }
            I::I64Store8(arg) => {
                let v = self.pop_i64()?;
                let a = self.pop_u32()?;
                self.memory(instance)?
                    .borrow_mut()
                    .store(a, arg.offset, [v as u8])?;
            }
            I::I64Store16(arg) => {
                let v = self.pop_i64()?;
                let a = self.pop_u32()?;
                self.memory(instance)?
                    .borrow_mut()
                    .store(a, arg.offset, (v as u16).to_le_bytes())?;
            }
            I::I64Store32(arg) => {
                let v = self.pop_i64()?;
                let a = self.pop_u32()?;
                self.memory(instance)?
                    .borrow_mut()
                    .store(a, arg.offset, (v as u32).to_le_bytes())?;
            }

            I::MemorySize => {
                let pages = self.memory(instance)?.borrow().size_pages();
                self.push_i32(pages as i32);
            }
            I::MemoryGrow => {
                let delta = self.pop_u32()?;
                let result = self.memory(instance)?.borrow_mut().grow(delta);
                self.push_i32(result);
            }

            I::I32Const(v) => self.push_i32(*v),
            I::I64Const(v) => self.push_i64(*v),
            I::F32Const(bits) => self.values.push(Value::F32(*bits)),
            I::F64Const(bits) => self.values.push(Value::F64(*bits)),

            I::I32Eqz => {
                let a = self.pop_i32()?;
                self.push_bool(a == 0);
            }
            I::I32Eq => self.cmp_i32(|a, b| a == b)?,
            I::I32Ne => self.cmp_i32(|a, b| a != b)?,
            I::I32LtS => self.cmp_i32(|a, b| a < b)?,
            I::I32LtU => self.cmp_u32(|a, b| a < b)?,
            I::I32GtS => self.cmp_i32(|a, b| a > b)?,
            I::I32GtU => self.cmp_u32(|a, b| a > b)?,
            I::I32LeS => self.cmp_i32(|a, b| a <= b)?,
            I::I32LeU => self.cmp_u32(|a, b| a <= b)?,
            I::I32GeS => self.cmp_i32(|a, b| a >= b)?,
            I::I32GeU => self.cmp_u32(|a, b| a >= b)?,

            I::I64Eqz => {
                let a = self.pop_i64()?;
                self.push_bool(a == 0);
            }
            I::I64Eq => self.cmp_i64(|a, b| a == b)?,
            I::I64Ne => self.cmp_i64(|a, b| a != b)?,
            I::I64LtS => self.cmp_i64(|a, b| a < b)?,
            I::I64LtU => self.cmp_u64(|a, b| a < b)?,
            I::I64GtS => self.cmp_i64(|a, b| a > b)?,
            I::I64GtU => self.cmp_u64(|a, b| a > b)?,
            I::I64LeS => self.cmp_i64(|a, b| a <= b)?,
            I::I64LeU => self.cmp_u64(|a, b| a <= b)?,
            I::I64GeS => self.cmp_i64(|a, b| a >= b)?,
            I::I64GeU => self.cmp_u64(|a, b| a >= b)?,

            I::F32Eq => self.cmp_f32(|a, b| a == b)?,
            I::F32Ne => self.cmp_f32(|a, b| a != b)?,
            I::F32Lt => self.cmp_f32(|a, b| a < b)?,
            I::F32Gt => self.cmp_f32(|a, b| a > b)?,
            I::F32Le => self.cmp_f32(|a, b| a <= b)?,
            I::F32Ge => self.cmp_f32(|a, b| a >= b)?,
            I::F64Eq => self.cmp_f64(|a, b| a == b)?,
            I::F64Ne => self.cmp_f64(|a, b| a != b)?,
            I::F64Lt => self.cmp_f64(|a, b| a < b)?,
            I::F64Gt => self.cmp_f64(|a, b| a > b)?,
            I::F64Le => self.cmp_f64(|a, b| a <= b)?,
            I::F64Ge => self.cmp_f64(|a, b| a >= b)?,

            I::I32Clz => self.un_i32(|a| a.leading_zeros() as i32)?,
            I::I32Ctz => self.un_i32(|a| a.trailing_zeros() as i32)?,
            I::I32Popcnt => self.un_i32(|a| a.count_ones() as i32)?,
            I::I32Add => self.bin_i32(i32::wrapping_add)?,
            I::I32Sub => self.bin_i32(i32::wrapping_sub)?,
            I::I32Mul => self.bin_i32(i32::wrapping_mul)?,
            I::I32DivS => self.bin_i32_trap(num::div_s32)?,
            I::I32DivU => self.bin_u32_trap(num::div_u32)?,
            I::I32RemS => self.bin_i32_trap(num::rem_s32)?,
            I::I32RemU => self.bin_u32_trap(num::rem_u32)?,
            I::I32And => self.bin_i32(|a, b| a & b)?,
            I::I32Or => self.bin_i32(|a, b| a | b)?,
            I::I32Xor => self.bin_i32(|a, b| a ^ b)?,
            I::I32Shl => self.bin_i32(|a, b| a.wrapping_shl(b as u32))?,
            I::I32ShrS => self.bin_i32(|a, b| a.wrapping_shr(b as u32))?,
            I::I32ShrU => self.bin_i32(|a, b| ((a as u32).wrapping_shr(b as u32)) as i32)?,
            I::I32Rotl => self.bin_i32(|a, b| a.rotate_left(b as u32 & 31))?,
            I::I32Rotr => self.bin_i32(|a, b| a.rotate_right(b as u32 & 31))?,

            I::I64Clz => self.un_i64(|a| i64::from(a.leading_zeros()))?,
            I::I64Ctz => self.un_i64(|a| i64::from(a.trailing_zeros()))?,
            I::I64Popcnt => self.un_i64(|a| i64::from(a.count_ones()))?,
            I::I64Add => self.bin_i64(i64::wrapping_add)?,
            I::I64Sub => self.bin_i64(i64::wrapping_sub)?,
            I::I64Mul => self.bin_i64(i64::wrapping_mul)?,
            I::I64DivS => self.bin_i64_trap(num::div_s64)?,
            I::I64DivU => self.bin_u64_trap(num::div_u64)?,
            I::I64RemS => self.bin_i64_trap(num::rem_s64)?,
            I::I64RemU => self.bin_u64_trap(num::rem_u64)?,
            I::I64And => self.bin_i64(|a, b| a & b)?,
            I::I64Or => self.bin_i64(|a, b| a | b)?,
            I::I64Xor => self.bin_i64(|a, b| a ^ b)?,
            I::I64Shl => self.bin_i64(|a, b| a.wrapping_shl(b as u32))?,
            I::I64ShrS => self.bin_i64(|a, b| a.wrapping_shr(b as u32))?,
            I::I64ShrU => self.bin_i64(|a, b| ((a as u64).wrapping_shr(b as u32)) as i64)?,
            I::I64Rotl => self.bin_i64(|a, b| a.rotate_left(b as u32 & 63))?,
            I::I64Rotr => self.bin_i64(|a, b| a.rotate_right(b as u32 & 63))?,

            I::F32Abs => self.un_f32(f32::abs)?,
            I::F32Neg => self.un_f32(|a| -a)?,
            I::F32Ceil => self.un_f32(f32::ceil)?,
            I::F32Floor => self.un_f32(f32::floor)?,
            I::F32Trunc => self.un_f32(f32::trunc)?,
            I::F32Nearest => self.un_f32(num::nearest32)?,
            I::F32Sqrt => self.un_f32(f32::sqrt)?,
            I::F32Add => self.bin_f32(|a, b| a + b)?,
            I::F32Sub => self.bin_f32(|a, b| a - b)?,
            I::F32Mul => self.bin_f32(|a, b| a * b)?,
            I::F32Div => self.bin_f32(|a, b| a / b)?,
            I::F32Min => self.bin_f32(num::fmin32)?,
            I::F32Max => self.bin_f32(num::fmax32)?,
            I::F32Copysign => self.bin_f32(f32::copysign)?,

            I::F64Abs => self.un_f64(f64::abs)?,
            I::F64Neg => self.un_f64(|a| -a)?,
            I::F64Ceil => self.un_f64(f64::ceil)?,
            I::F64Floor => self.un_f64(f64::floor)?,
            I::F64Trunc => self.un_f64(f64::trunc)?,
            I::F64Nearest => self.un_f64(num::nearest64)?,
            I::F64Sqrt => self.un_f64(f64::sqrt)?,
            I::F64Add => self.bin_f64(|a, b| a + b)?,
            I::F64Sub => self.bin_f64(|a, b| a - b)?,
            I::F64Mul => self.bin_f64(|a, b| a * b)?,
            I::F64Div => self.bin_f64(|a, b| a / b)?,
            I::F64Min => self.bin_f64(num::fmin64)?,
            I::F64Max => self.bin_f64(num::fmax64)?,
            I::F64Copysign => self.bin_f64(f64::copysign)?,

            I::I32WrapI64 => {
                let a = self.pop_i64()?;
                self.push_i32(a as i32);
            }
            I::I32TruncF32S => {
                let a = self.pop_f32()?;
                self.push_i32(num::trunc_f32_to_i32(a)?);
            }
            I::I32TruncF32U => {
                let a = self.pop_f32()?;
                self.push_i32(num::trunc_f32_to_u32(a)? as i32);
            }
            I::I32TruncF64S => {
                let a = self.pop_f64()?;
                self.push_i32(num::trunc_f64_to_i32(a)?);
            }
            I::I32TruncF64U => {
                let a = self.pop_f64()?;
                self.push_i32(num::trunc_f64_to_u32(a)? as i32);
            }
            I::I64ExtendI32S => {
                let a = self.pop_i32()?;
                self.push_i64(i64::from(a));
            }
            I::I64ExtendI32U => {
                let a = self.pop_i32()?;
                self.push_i64(i64::from(a as u32));
            }
            I::I64TruncF32S => {
                let a = self.pop_f32()?;
                self.push_i64(num::trunc_f32_to_i64(a)?);
            }
            I::I64TruncF32U => {
                let a = self.pop_f32()?;
                self.push_i64(num::trunc_f32_to_u64(a)? as i64);
            }
            I::I64TruncF64S => {
                let a = self.pop_f64()?;
                self.push_i64(num::trunc_f64_to_i64(a)?);
            }
            I::I64TruncF64U => {
                let a = self.pop_f64()?;
                self.push_i64(num::trunc_f64_to_u64(a)? as i64);
            }
            I::F32ConvertI32S => {
                let a = self.pop_i32()?;
                self.push_f32(a as f32);
            }
            I::F32ConvertI32U => {
                let a = self.pop_i32()?;
                self.push_f32(a as u32 as f32);
            }
            I::F32ConvertI64S => {
                let a = self.pop_i64()?;
                self.push_f32(a as f32);
            }
            I::F32ConvertI64U => {
                let a = self.pop_i64()?;
                self.push_f32(a as u64 as f32);
            }
            I::F32DemoteF64 => {
                let a = self.pop_f64()?;
                self.push_f32(a as f32);
            }
            I::F64ConvertI32S => {
                let a = self.pop_i32()?;
                self.push_f64(f64::from(a));
            }
            I::F64ConvertI32U => {
                let a = self.pop_i32()?;
                self.push_f64(f64::from(a as u32));
            }
            I::F64ConvertI64S => {
                let a = self.pop_i64()?;
                self.push_f64(a as f64);
            }
            I::F64ConvertI64U => {
                let a = self.pop_i64()?;
                self.push_f64(a as u64 as f64);
            }
            I::F64PromoteF32 => {
                let a = self.pop_f32()?;
                self.push_f64(f64::from(a));
            }
            I::I32ReinterpretF32 => {
                let bits = self.pop_f32_bits()?;
                self.push_i32(bits as i32);
            }
            I::I64ReinterpretF64 => {
                let bits = self.pop_f64_bits()?;
                self.push_i64(bits as i64);
            }
            I::F32ReinterpretI32 => {
                let a = self.pop_i32()?;
                self.values.push(Value::F32(FloatBits32(a as u32)));
            }
            I::F64ReinterpretI64 => {
                let a = self.pop_i64()?;
                self.values.push(Value::F64(FloatBits64(a as u64)));
            }

            I::I32Extend8S => self.un_i32(|a| i32::from(a as i8))?,
            I::I32Extend16S => self.un_i32(|a| i32::from(a as i16))?,
            I::I64Extend8S => self.un_i64(|a| i64::from(a as i8))?,
            I::I64Extend16S => self.un_i64(|a| i64::from(a as i16))?,
            I::I64Extend32S => self.un_i64(|a| i64::from(a as i32))?,

            I::RefNull(ty) => self.values.push(Value::default_for(*ty)),
            I::RefIsNull => {
                let is_null = matches!(
                    self.pop()?,
                    Value::FuncRef(None) | Value::ExternRef(None)
                );
                self.push_bool(is_null);
            }
            I::RefFunc(idx) => {
                let func = instance
                    .funcs
                    .get(*idx as usize)
                    .cloned()
                    .ok_or_else(|| contract("ref.func index out of range"))?;
                self.values.push(Value::FuncRef(Some(FuncRef::new(func))));
            }

            I::I32TruncSatF32S => {
                let a = self.pop_f32()?;
                self.push_i32(num::trunc_sat_f32_to_i32(a));
            }
            I::I32TruncSatF32U => {
                let a = self.pop_f32()?;
                self.push_i32(num::trunc_sat_f32_to_u32(a) as i32);
            }
            I::I32TruncSatF64S => {
                let a = self.pop_f64()?;
                self.push_i32(num::trunc_sat_f64_to_i32(a));
            }
            I::I32TruncSatF64U => {
                let a = self.pop_f64()?;
                self.push_i32(num::trunc_sat_f64_to_u32(a) as i32);
            }
            I::I64TruncSatF32S => {
                let a = self.pop_f32()?;
                self.push_i64(num::trunc_sat_f32_to_i64(a));
            }
            I::I64TruncSatF32U => {
                let a = self.pop_f32()?;
                self.push_i64(num::trunc_sat_f32_to_u64(a) as i64);
            }
            I::I64TruncSatF64S => {
                let a = self.pop_f64()?;
                self.push_i64(num::trunc_sat_f64_to_i64(a));
            }
            I::I64TruncSatF64U => {
                let a = self.pop_f64()?;
                self.push_i64(num::trunc_sat_f64_to_u64(a) as i64);
            }

            I::MemoryInit(idx) => {
                let n = self.pop_u32()?;
                let s = self.pop_u32()?;
                let d = self.pop_u32()?;
                let dropped = instance.data_dropped[*idx as usize].get();
                let bytes: &[u8] = if dropped {
                    &[]
                } else {
                    instance.module.datas[*idx as usize].bytes.as_slice()
                };
                self.memory(instance)?.borrow_mut().init(d, bytes, s, n)?;
            }
            I::DataDrop(idx) => {
                instance.data_dropped[*idx as usize].set(true);
            }
            I::MemoryCopy => {
                let n = self.pop_u32()?;
                let s = self.pop_u32()?;
                let d = self.pop_u32()?;
                self.memory(instance)?.borrow_mut().copy(d, s, n)?;
            }
            I::MemoryFill => {
                let n = self.pop_u32()?;
                let v = self.pop_i32()?;
                let d = self.pop_u32()?;
                self.memory(instance)?.borrow_mut().fill(d, v as u8, n)?;
            }
            I::TableInit {
                elem_idx,
                table_idx,
            } => {
                let n = self.pop_u32()?;
                let s = self.pop_u32()?;
                let d = self.pop_u32()?;
                let slot = instance.elem_values[*elem_idx as usize].borrow();
                let values = slot.as_deref().unwrap_or(&[]);
                self.table(instance, *table_idx)?
                    .borrow_mut()
                    .init(d, values, s, n)?;
            }
            I::ElemDrop(idx) => {
                *instance.elem_values[*idx as usize].borrow_mut() = None;
            }
            I::TableCopy {
                dst_table,
                src_table,
            } => {
                let n = self.pop_u32()?;
                let s = self.pop_u32()?;
                let d = self.pop_u32()?;
                if dst_table == src_table {
                    self.table(instance, *dst_table)?
                        .borrow_mut()
                        .copy_within(d, s, n)?;
                } else {
                    let snapshot = self.table(instance, *src_table)?.borrow().slice(s, n)?;
                    self.table(instance, *dst_table)?
                        .borrow_mut()
                        .init(d, &snapshot, 0, n)?;
                }
            }
            I::TableGrow(idx) => {
                let delta = self.pop_u32()?;
                let init = self.pop()?;
                let result = self.table(instance, *idx)?.borrow_mut().grow(delta, init);
                self.push_i32(result);
            }
            I::TableSize(idx) => {
                let size = self.table(instance, *idx)?.borrow().size();
                self.push_i32(size as i32);
            }
            I::TableFill(idx) => {
                let n = self.pop_u32()?;
                let value = self.pop()?;
                let d = self.pop_u32()?;
                self.table(instance, *idx)?
                    .borrow_mut()
                    .fill(d, &value, n)?;
            }
        }
        Ok(Flow::Next)
    }

    // Operand-stack helpers. The validator has proven that the value on
    // top has the expected type; a mismatch here is an engine bug and
    // surfaces as a contract violation.

    fn pop(&mut self) -> Result<Value, Exception> {
        self.values
            .pop()
            .ok_or_else(|| contract("operand stack underflow"))
    }

    fn pop_i32(&mut self) -> Result<i32, Exception> {
        match self.pop()? {
            Value::I32(v) => Ok(v),
            other => Err(contract(format!("expected i32, found {}", other.value_type()))),
        }
    }

    fn pop_u32(&mut self) -> Result<u32, Exception> {
        Ok(self.pop_i32()? as u32)
    }

    fn pop_i64(&mut self) -> Result<i64, Exception> {
        match self.pop()? {
            Value::I64(v) => Ok(v),
            other => Err(contract(format!("expected i64, found {}", other.value_type()))),
        }
    }

    fn pop_f32(&mut self) -> Result<f32, Exception> {
        Ok(f32::from_bits(self.pop_f32_bits()?))
    }

    fn pop_f32_bits(&mut self) -> Result<u32, Exception> {
        match self.pop()? {
            Value::F32(bits) => Ok(bits.to_bits()),
            other => Err(contract(format!("expected f32, found {}", other.value_type()))),
        }
    }

    fn pop_f64(&mut self) -> Result<f64, Exception> {
        Ok(f64::from_bits(self.pop_f64_bits()?))
    }

    fn pop_f64_bits(&mut self) -> Result<u64, Exception> {
        match self.pop()? {
            Value::F64(bits) => Ok(bits.to_bits()),
            other => Err(contract(format!("expected f64, found {}", other.value_type()))),
        }
    }

    fn push_i32(&mut self, v: i32) {
        self.values.push(Value::I32(v));
    }

    fn push_i64(&mut self, v: i64) {
        self.values.push(Value::I64(v));
    }

    fn push_f32(&mut self, v: f32) {
        self.values.push(Value::F32(FloatBits32::from_float(v)));
    }

    fn push_f64(&mut self, v: f64) {
        self.values.push(Value::F64(FloatBits64::from_float(v)));
    }

    fn push_bool(&mut self, v: bool) {
        self.push_i32(i32::from(v));
    }

    fn memory<'i>(
        &self,
        instance: &'i InstanceData,
    ) -> Result<&'i std::cell::RefCell<crate::memory::Memory>, Exception> {
        instance
            .memories
            .first()
            .map(|m| m.as_ref())
            .ok_or_else(|| contract("instance has no memory"))
    }

    fn table<'i>(
        &self,
        instance: &'i InstanceData,
        idx: u32,
    ) -> Result<&'i std::cell::RefCell<crate::table::Table>, Exception> {
        instance
            .tables
            .get(idx as usize)
            .map(|t| t.as_ref())
            .ok_or_else(|| contract("table index out of range"))
    }

    fn un_i32(&mut self, op: impl Fn(i32) -> i32) -> Result<(), Exception> {
        let a = self.pop_i32()?;
        self.push_i32(op(a));
        Ok(())
    }

    fn un_i64(&mut self, op: impl Fn(i64) -> i64) -> Result<(), Exception> {
        let a = self.pop_i64()?;
        self.push_i64(op(a));
        Ok(())
    }

    fn un_f32(&mut self, op: impl Fn(f32) -> f32) -> Result<(), Exception> {
        let a = self.pop_f32()?;
        self.push_f32(op(a));
        Ok(())
    }

    fn un_f64(&mut self, op: impl Fn(f64) -> f64) -> Result<(), Exception> {
        let a = self.pop_f64()?;
        self.push_f64(op(a));
        Ok(())
    }

    fn bin_i32(&mut self, op: impl Fn(i32, i32) -> i32) -> Result<(), Exception> {
        let b = self.pop_i32()?;
        let a = self.pop_i32()?;
        self.push_i32(op(a, b));
        Ok(())
    }

    fn bin_i64(&mut self, op: impl Fn(i64, i64) -> i64) -> Result<(), Exception> {
        let b = self.pop_i64()?;
        let a = self.pop_i64()?;
        self.push_i64(op(a, b));
        Ok(())
    }

    fn bin_f32(&mut self, op: impl Fn(f32, f32) -> f32) -> Result<(), Exception> {
        let b = self.pop_f32()?;
        let a = self.pop_f32()?;
        self.push_f32(op(a, b));
        Ok(())
    }

    fn bin_f64(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<(), Exception> {
        let b = self.pop_f64()?;
        let a = self.pop_f64()?;
        self.push_f64(op(a, b));
        Ok(())
    }

    fn bin_i32_trap(
        &mut self,
        op: impl Fn(i32, i32) -> Result<i32, Trap>,
    ) -> Result<(), Exception> {
        let b = self.pop_i32()?;
        let a = self.pop_i32()?;
        self.push_i32(op(a, b)?);
        Ok(())
    }

    fn bin_u32_trap(
        &mut self,
        op: impl Fn(u32, u32) -> Result<u32, Trap>,
    ) -> Result<(), Exception> {
        let b = self.pop_u32()?;
        let a = self.pop_u32()?;
        self.push_i32(op(a, b)? as i32);
        Ok(())
    }

    fn bin_i64_trap(
        &mut self,
        op: impl Fn(i64, i64) -> Result<i64, Trap>,
    ) -> Result<(), Exception> {
        let b = self.pop_i64()?;
        let a = self.pop_i64()?;
        self.push_i64(op(a, b)?);
        Ok(())
    }

    fn bin_u64_trap(
        &mut self,
        op: impl Fn(u64, u64) -> Result<u64, Trap>,
    ) -> Result<(), Exception> {
        let b = self.pop_i64()? as u64;
        let a = self.pop_i64()? as u64;
        self.push_i64(op(a, b)? as i64);
        Ok(())
    }

    fn cmp_i32(&mut self, op: impl Fn(i32, i32) -> bool) -> Result<(), Exception> {
        let b = self.pop_i32()?;
        let a = self.pop_i32()?;
        self.push_bool(op(a, b));
        Ok(())
    }

    fn cmp_u32(&mut self, op: impl Fn(u32, u32) -> bool) -> Result<(), Exception> {
        let b = self.pop_u32()?;
        let a = self.pop_u32()?;
        self.push_bool(op(a, b));
        Ok(())
    }

    fn cmp_i64(&mut self, op: impl Fn(i64, i64) -> bool) -> Result<(), Exception> {
        let b = self.pop_i64()?;
        let a = self.pop_i64()?;
        self.push_bool(op(a, b));
        Ok(())
    }

    fn cmp_u64(&mut self, op: impl Fn(u64, u64) -> bool) -> Result<(), Exception> {
        let b = self.pop_i64()? as u64;
        let a = self.pop_i64()? as u64;
        self.push_bool(op(a, b));
        Ok(())
    }

    fn cmp_f32(&mut self, op: impl Fn(f32, f32) -> bool) -> Result<(), Exception> {
        let b = self.pop_f32()?;
        let a = self.pop_f32()?;
        self.push_bool(op(a, b));
        Ok(())
    }

    fn cmp_f64(&mut self, op: impl Fn(f64, f64) -> bool) -> Result<(), Exception> {
        let b = self.pop_f64()?;
        let a = self.pop_f64()?;
        self.push_bool(op(a, b));
        Ok(())
    }
}

/// What an instruction step asks the frame loop to do next.
enum Flow {
    Next,
    Return,
    Call(Rc<FuncInstance>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use crate::Instance;
    use weft_decoder::{decode_module, DecodeConfig};
    use weft_foundation::ValueType;

    fn instantiate(source: &str) -> Instance {
        instantiate_with(source, &DecodeConfig::default(), &[])
    }

    fn instantiate_with(
        source: &str,
        decode: &DecodeConfig,
        providers: &[Rc<Provider>],
    ) -> Instance {
        let bytes = wat::parse_str(source).unwrap();
        let module = Rc::new(decode_module(&bytes, decode).unwrap());
        Instance::instantiate_no_init(&module, providers).unwrap()
    }

    fn call(instance: &Instance, name: &str, args: &[Value]) -> Result<Vec<Value>, InvokeError> {
        let func = instance.export_func(name).unwrap();
        invoke_func(&func, args, &EngineConfig::default())
    }

    #[test]
    fn adds_two_i32s() {
        let inst = instantiate(
            r#"(module (func (export "add") (param i32 i32) (result i32)
                 local.get 0 local.get 1 i32.add))"#,
        );
        let results = call(&inst, "add", &[Value::I32(1), Value::I32(2)]).unwrap();
        assert_eq!(results, vec![Value::I32(3)]);
    }

    #[test]
    fn loop_branch_repeats_body() {
        // Sums 1..=5 with br_if back to the loop header.
        let inst = instantiate(
            r#"(module (func (export "sum") (result i32) (local $i i32) (local $acc i32)
                 (loop $l
                   (local.set $i (i32.add (local.get $i) (i32.const 1)))
                   (local.set $acc (i32.add (local.get $acc) (local.get $i)))
                   (br_if $l (i32.lt_s (local.get $i) (i32.const 5))))
                 local.get $acc))"#,
        );
        let results = call(&inst, "sum", &[]).unwrap();
        assert_eq!(results, vec![Value::I32(15)]);
    }

    #[test]
    fn if_takes_both_arms() {
        let src = r#"(module (func (export "pick") (param i32) (result i32)
             (if (result i32) (local.get 0)
               (then (i32.const 10))
               (else (i32.const 20)))))"#;
        let inst = instantiate(src);
        assert_eq!(
            call(&inst, "pick", &[Value::I32(1)]).unwrap(),
            vec![Value::I32(10)]
        );
        assert_eq!(
            call(&inst, "pick", &[Value::I32(0)]).unwrap(),
            vec![Value::I32(20)]
        );
    }

    #[test]
    fn scan_mode_matches_jump_table_mode() {
        let src = r#"(module (func (export "pick") (param i32) (result i32)
             (if (result i32) (local.get 0)
               (then (i32.const 10))
               (else (i32.const 20)))))"#;
        let with_table = instantiate(src);
        let without = instantiate_with(
            src,
            &DecodeConfig {
                generate_jump_table: false,
            },
            &[],
        );
        for arg in [0, 1] {
            assert_eq!(
                call(&with_table, "pick", &[Value::I32(arg)]).unwrap(),
                call(&without, "pick", &[Value::I32(arg)]).unwrap(),
            );
        }
    }

    #[test]
    fn unreachable_traps() {
        let inst = instantiate(r#"(module (func (export "boom") unreachable))"#);
        match call(&inst, "boom", &[]) {
            Err(InvokeError::Trap(t)) => assert_eq!(t.kind, TrapKind::Unreachable),
            other => panic!("expected trap, got {other:?}"),
        }
    }

    #[test]
    fn division_by_zero_traps() {
        let inst = instantiate(
            r#"(module (func (export "div") (param i32 i32) (result i32)
                 local.get 0 local.get 1 i32.div_s))"#,
        );
        match call(&inst, "div", &[Value::I32(7), Value::I32(0)]) {
            Err(InvokeError::Trap(t)) => {
                assert_eq!(t.kind, TrapKind::DivideByZero);
                assert_eq!(t.to_string(), "integer divide by zero");
            }
            other => panic!("expected trap, got {other:?}"),
        }
    }

    #[test]
    fn deep_recursion_exhausts_call_stack() {
        let inst = instantiate(r#"(module (func $f (export "f") call $f))"#);
        let func = inst.export_func("f").unwrap();
        let config = EngineConfig {
            max_frames: 16,
            ..EngineConfig::default()
        };
        match invoke_func(&func, &[], &config) {
            Err(InvokeError::Trap(t)) => assert_eq!(t.kind, TrapKind::CallStackExhausted),
            other => panic!("expected trap, got {other:?}"),
        }
    }

    #[test]
    fn memory_store_then_load() {
        let inst = instantiate(
            r#"(module (memory 1)
                 (func (export "roundtrip") (param i32 i32) (result i32)
                   local.get 0 local.get 1 i32.store
                   local.get 0 i32.load))"#,
        );
        let results = call(&inst, "roundtrip", &[Value::I32(100), Value::I32(-5)]).unwrap();
        assert_eq!(results, vec![Value::I32(-5)]);
    }

    #[test]
    fn out_of_bounds_load_traps() {
        let inst = instantiate(
            r#"(module (memory 1)
                 (func (export "peek") (param i32) (result i32)
                   local.get 0 i32.load))"#,
        );
        match call(&inst, "peek", &[Value::I32(65536 - 3)]) {
            Err(InvokeError::Trap(t)) => {
                assert_eq!(t.kind, TrapKind::OutOfBoundsMemoryAccess);
            }
            other => panic!("expected trap, got {other:?}"),
        }
    }

    #[test]
    fn indirect_call_checks_signature() {
        let inst = instantiate(
            r#"(module
                 (table 2 funcref)
                 (func $i64one (result i64) i64.const 1)
                 (elem (i32.const 0) $i64one)
                 (func (export "go") (param i32) (result i32)
                   local.get 0 (call_indirect (result i32))))"#,
        );
        match call(&inst, "go", &[Value::I32(0)]) {
            Err(InvokeError::Trap(t)) => {
                assert_eq!(t.kind, TrapKind::IndirectCallTypeMismatch);
            }
            other => panic!("expected trap, got {other:?}"),
        }
        match call(&inst, "go", &[Value::I32(1)]) {
            Err(InvokeError::Trap(t)) => assert_eq!(t.kind, TrapKind::UninitializedElement),
            other => panic!("expected trap, got {other:?}"),
        }
        match call(&inst, "go", &[Value::I32(9)]) {
            Err(InvokeError::Trap(t)) => assert_eq!(t.kind, TrapKind::UndefinedElement),
            other => panic!("expected trap, got {other:?}"),
        }
    }

    #[test]
    fn host_function_runs_inline() {
        let ty = FuncType::new(vec![ValueType::I32], vec![ValueType::I32]);
        let double = FuncInstance::host(
            ty,
            Box::new(|args| match args {
                [Value::I32(v)] => Ok(vec![Value::I32(v * 2)]),
                _ => unreachable!(),
            }),
        );
        let provider = Rc::new(Provider::new(
            "env",
            vec![("double".to_string(), crate::ExternVal::Func(double))],
        ));
        let inst = instantiate_with(
            r#"(module
                 (import "env" "double" (func $double (param i32) (result i32)))
                 (func (export "quad") (param i32) (result i32)
                   local.get 0 call $double call $double))"#,
            &DecodeConfig::default(),
            &[provider],
        );
        let results = call(&inst, "quad", &[Value::I32(3)]).unwrap();
        assert_eq!(results, vec![Value::I32(12)]);
    }

    #[test]
    fn wrong_arity_is_a_contract_error() {
        let inst = instantiate(
            r#"(module (func (export "id") (param i32) (result i32) local.get 0))"#,
        );
        match call(&inst, "id", &[]) {
            Err(InvokeError::Contract(e)) => {
                assert_eq!(e.code, weft_error::codes::ARITY_MISMATCH);
            }
            other => panic!("expected contract error, got {other:?}"),
        }
    }
}
