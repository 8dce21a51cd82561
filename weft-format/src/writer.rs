// Weft - weft-format
// Module: module writer
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Re-encodes a module descriptor to the binary format.
//!
//! Round-trip fidelity with the decoder is a correctness requirement:
//! decoding the written bytes must produce a behaviorally equivalent
//! module. Function bodies are written back from the raw payload captured
//! at decode time, so code round-trips byte-exactly; the surrounding
//! sections are re-encoded from the descriptor.

use weft_error::Result;
use weft_foundation::{GlobalType, Limits, Mutability, TableType, ValueType};

use crate::binary::{self, Writer};
use crate::module::{
    ConstExpr, DataMode, ElementMode, ExportKind, ImportDesc, Module,
};

/// Opcode bytes needed for constant expressions.
const OP_GLOBAL_GET: u8 = 0x23;
const OP_I32_CONST: u8 = 0x41;
const OP_I64_CONST: u8 = 0x42;
const OP_F32_CONST: u8 = 0x43;
const OP_F64_CONST: u8 = 0x44;
const OP_REF_NULL: u8 = 0xD0;
const OP_REF_FUNC: u8 = 0xD2;
const OP_END: u8 = 0x0B;

/// Encodes a module descriptor back to WebAssembly binary format.
pub fn encode_module(module: &Module) -> Result<Vec<u8>> {
    let mut w = Writer::new();
    w.bytes(&binary::WASM_MAGIC);
    w.bytes(&binary::WASM_VERSION);

    if !module.types.is_empty() {
        let mut s = Writer::new();
        s.leb_u32(module.types.len() as u32);
        for ft in &module.types {
            s.u8(binary::FUNC_TYPE_TAG);
            s.leb_u32(ft.params.len() as u32);
            for p in &ft.params {
                s.u8(p.to_binary());
            }
            s.leb_u32(ft.results.len() as u32);
            for r in &ft.results {
                s.u8(r.to_binary());
            }
        }
        w.section(binary::TYPE_SECTION_ID, &s);
    }

    if !module.imports.is_empty() {
        let mut s = Writer::new();
        s.leb_u32(module.imports.len() as u32);
        for imp in &module.imports {
            s.name(&imp.module);
            s.name(&imp.name);
            match &imp.desc {
                ImportDesc::Func(typeidx) => {
                    s.u8(binary::EXTERNAL_KIND_FUNC);
                    s.leb_u32(*typeidx);
                }
                ImportDesc::Table(tt) => {
                    s.u8(binary::EXTERNAL_KIND_TABLE);
                    encode_table_type(&mut s, tt);
                }
                ImportDesc::Memory(mt) => {
                    s.u8(binary::EXTERNAL_KIND_MEMORY);
                    encode_limits(&mut s, &mt.limits);
                }
                ImportDesc::Global(gt) => {
                    s.u8(binary::EXTERNAL_KIND_GLOBAL);
                    encode_global_type(&mut s, gt);
                }
            }
        }
        w.section(binary::IMPORT_SECTION_ID, &s);
    }

    if !module.funcs.is_empty() {
        let mut s = Writer::new();
        s.leb_u32(module.funcs.len() as u32);
        for typeidx in &module.funcs {
            s.leb_u32(*typeidx);
        }
        w.section(binary::FUNCTION_SECTION_ID, &s);
    }

    if !module.tables.is_empty() {
        let mut s = Writer::new();
        s.leb_u32(module.tables.len() as u32);
        for tt in &module.tables {
            encode_table_type(&mut s, tt);
        }
        w.section(binary::TABLE_SECTION_ID, &s);
    }

    if !module.memories.is_empty() {
        let mut s = Writer::new();
        s.leb_u32(module.memories.len() as u32);
        for mt in &module.memories {
            encode_limits(&mut s, &mt.limits);
        }
        w.section(binary::MEMORY_SECTION_ID, &s);
    }

    if !module.globals.is_empty() {
        let mut s = Writer::new();
        s.leb_u32(module.globals.len() as u32);
        for g in &module.globals {
            encode_global_type(&mut s, &g.ty);
            encode_const_expr(&mut s, &g.init);
        }
        w.section(binary::GLOBAL_SECTION_ID, &s);
    }

    if !module.exports.is_empty() {
        let mut s = Writer::new();
        s.leb_u32(module.exports.len() as u32);
        for e in &module.exports {
            s.name(&e.name);
            s.u8(match e.kind {
                ExportKind::Func => binary::EXTERNAL_KIND_FUNC,
                ExportKind::Table => binary::EXTERNAL_KIND_TABLE,
                ExportKind::Memory => binary::EXTERNAL_KIND_MEMORY,
                ExportKind::Global => binary::EXTERNAL_KIND_GLOBAL,
            });
            s.leb_u32(e.index);
        }
        w.section(binary::EXPORT_SECTION_ID, &s);
    }

    if let Some(start) = module.start {
        let mut s = Writer::new();
        s.leb_u32(start);
        w.section(binary::START_SECTION_ID, &s);
    }

    if !module.elements.is_empty() {
        let mut s = Writer::new();
        s.leb_u32(module.elements.len() as u32);
        for seg in &module.elements {
            encode_element_segment(&mut s, seg)?;
        }
        w.section(binary::ELEMENT_SECTION_ID, &s);
    }

    if let Some(count) = module.data_count {
        let mut s = Writer::new();
        s.leb_u32(count);
        w.section(binary::DATA_COUNT_SECTION_ID, &s);
    }

    if !module.bodies.is_empty() {
        let mut s = Writer::new();
        s.leb_u32(module.bodies.len() as u32);
        for body in &module.bodies {
            s.leb_u32(body.raw.len() as u32);
            s.bytes(&body.raw);
        }
        w.section(binary::CODE_SECTION_ID, &s);
    }

    if !module.datas.is_empty() {
        let mut s = Writer::new();
        s.leb_u32(module.datas.len() as u32);
        for seg in &module.datas {
            match &seg.mode {
                DataMode::Active { memory: 0, offset } => {
                    s.leb_u32(0);
                    encode_const_expr(&mut s, offset);
                }
                DataMode::Active { memory, offset } => {
                    s.leb_u32(2);
                    s.leb_u32(*memory);
                    encode_const_expr(&mut s, offset);
                }
                DataMode::Passive => s.leb_u32(1),
            }
            s.leb_u32(seg.bytes.len() as u32);
            s.bytes(&seg.bytes);
        }
        w.section(binary::DATA_SECTION_ID, &s);
    }

    for custom in &module.custom_sections {
        let mut s = Writer::new();
        s.name(&custom.name);
        s.bytes(&custom.bytes);
        w.section(binary::CUSTOM_SECTION_ID, &s);
    }

    Ok(w.into_bytes())
}

fn encode_limits(w: &mut Writer, limits: &Limits) {
    match limits.max {
        None => {
            w.u8(0x00);
            w.leb_u32(limits.min);
        }
        Some(max) => {
            w.u8(0x01);
            w.leb_u32(limits.min);
            w.leb_u32(max);
        }
    }
}

fn encode_table_type(w: &mut Writer, tt: &TableType) {
    w.u8(tt.element.to_binary());
    encode_limits(w, &tt.limits);
}

fn encode_global_type(w: &mut Writer, gt: &GlobalType) {
    w.u8(gt.value_type.to_binary());
    w.u8(match gt.mutability {
        Mutability::Const => 0x00,
        Mutability::Var => 0x01,
    });
}

fn encode_const_expr(w: &mut Writer, expr: &ConstExpr) {
    match expr {
        ConstExpr::I32(v) => {
            w.u8(OP_I32_CONST);
            w.leb_i32(*v);
        }
        ConstExpr::I64(v) => {
            w.u8(OP_I64_CONST);
            w.leb_i64(*v);
        }
        ConstExpr::F32(bits) => {
            w.u8(OP_F32_CONST);
            w.bytes(&bits.to_le_bytes());
        }
        ConstExpr::F64(bits) => {
            w.u8(OP_F64_CONST);
            w.bytes(&bits.to_le_bytes());
        }
        ConstExpr::GlobalGet(idx) => {
            w.u8(OP_GLOBAL_GET);
            w.leb_u32(*idx);
        }
        ConstExpr::RefNull(ty) => {
            w.u8(OP_REF_NULL);
            w.u8(ty.to_binary());
        }
        ConstExpr::RefFunc(idx) => {
            w.u8(OP_REF_FUNC);
            w.leb_u32(*idx);
        }
    }
    w.u8(OP_END);
}

fn encode_element_segment(
    w: &mut Writer,
    seg: &crate::module::ElementSegment,
) -> Result<()> {
    // The funcidx forms (flags 0-3) are only expressible when every item is
    // a plain function reference; otherwise fall back to the expression
    // forms (flags 4-7).
    let func_indices: Option<Vec<u32>> = if seg.ty == ValueType::FuncRef {
        seg.items
            .iter()
            .map(|e| match e {
                ConstExpr::RefFunc(idx) => Some(*idx),
                _ => None,
            })
            .collect()
    } else {
        None
    };

    match (&seg.mode, func_indices) {
        (ElementMode::Active { table: 0, offset }, Some(idxs)) => {
            w.leb_u32(0);
            encode_const_expr(w, offset);
            w.leb_u32(idxs.len() as u32);
            for idx in idxs {
                w.leb_u32(idx);
            }
        }
        (ElementMode::Passive, Some(idxs)) => {
            w.leb_u32(1);
            w.u8(0x00); // elemkind: funcref
            w.leb_u32(idxs.len() as u32);
            for idx in idxs {
                w.leb_u32(idx);
            }
        }
        (ElementMode::Active { table, offset }, Some(idxs)) => {
            w.leb_u32(2);
            w.leb_u32(*table);
            encode_const_expr(w, offset);
            w.u8(0x00);
            w.leb_u32(idxs.len() as u32);
            for idx in idxs {
                w.leb_u32(idx);
            }
        }
        (ElementMode::Declared, Some(idxs)) => {
            w.leb_u32(3);
            w.u8(0x00);
            w.leb_u32(idxs.len() as u32);
            for idx in idxs {
                w.leb_u32(idx);
            }
        }
        (ElementMode::Active { table: 0, offset }, None) => {
            w.leb_u32(4);
            encode_const_expr(w, offset);
            w.leb_u32(seg.items.len() as u32);
            for item in &seg.items {
                encode_const_expr(w, item);
            }
        }
        (ElementMode::Passive, None) => {
            w.leb_u32(5);
            w.u8(seg.ty.to_binary());
            w.leb_u32(seg.items.len() as u32);
            for item in &seg.items {
                encode_const_expr(w, item);
            }
        }
        (ElementMode::Active { table, offset }, None) => {
            w.leb_u32(6);
            w.leb_u32(*table);
            encode_const_expr(w, offset);
            w.u8(seg.ty.to_binary());
            w.leb_u32(seg.items.len() as u32);
            for item in &seg.items {
                encode_const_expr(w, item);
            }
        }
        (ElementMode::Declared, None) => {
            w.leb_u32(7);
            w.u8(seg.ty.to_binary());
            w.leb_u32(seg.items.len() as u32);
            for item in &seg.items {
                encode_const_expr(w, item);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_foundation::{FuncType, MemoryType};

    #[test]
    fn empty_module_is_header_only() {
        let bytes = encode_module(&Module::new()).unwrap();
        assert_eq!(&bytes[..4], &binary::WASM_MAGIC);
        assert_eq!(&bytes[4..8], &binary::WASM_VERSION);
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn sections_appear_in_order() {
        let mut m = Module::new();
        m.types.push(FuncType::default());
        m.memories.push(MemoryType {
            limits: Limits::new(1, Some(2)),
        });
        let bytes = encode_module(&m).unwrap();
        let type_pos = bytes
            .iter()
            .position(|&b| b == binary::TYPE_SECTION_ID)
            .unwrap();
        let mem_pos = bytes
            .iter()
            .rposition(|&b| b == binary::MEMORY_SECTION_ID)
            .unwrap();
        assert!(type_pos < mem_pos);
    }
}
