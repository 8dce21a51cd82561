// Weft - weft-decoder
// Module: binary parser
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Section-level parsing of the binary format into a module descriptor.
//!
//! Parsing is strictly structural; cross-section checks (index ranges,
//! body typing) happen in the validation pass. The parser still rejects
//! everything that is malformed at the byte level: bad magic, broken
//! LEB128, out-of-order or oversized sections, truncated payloads.

use weft_error::{codes, Error, ErrorCategory, Result};
use weft_foundation::{
    FuncType, GlobalType, Limits, MemoryType, Mutability, TableType, ValueType,
};
use weft_format::binary::{self, Reader};
use weft_format::{
    ConstExpr, CustomSection, DataMode, DataSegment, ElementMode, ElementSegment, Export,
    ExportKind, FuncBody, Global, Import, ImportDesc, Module,
};

use crate::instructions::decode_body;

/// Functions may not declare more locals than this, matching the limit
/// common across engines.
const MAX_LOCALS: u64 = 50_000;

fn parse_err(code: u16, msg: impl Into<String>) -> Error {
    Error::new(ErrorCategory::Parse, code, msg)
}

/// Parses a WebAssembly binary into an unvalidated module descriptor.
///
/// # Errors
///
/// Returns a `Parse` error when the bytes are not a structurally
/// well-formed module.
pub fn parse_module(data: &[u8]) -> Result<Module> {
    if data.len() < 8 {
        return Err(parse_err(
            codes::UNEXPECTED_EOF,
            "module shorter than the 8-byte header",
        ));
    }
    if data[0..4] != binary::WASM_MAGIC {
        return Err(parse_err(codes::INVALID_MAGIC, "bad magic number"));
    }
    if data[4..8] != binary::WASM_VERSION {
        return Err(parse_err(
            codes::INVALID_VERSION,
            "unsupported binary format version",
        ));
    }

    let mut module = Module::new();
    let mut r = Reader::new(&data[8..]);
    let mut last_rank: u8 = 0;

    while !r.is_empty() {
        let id = r.u8()?;
        let size = r.leb_u32()? as usize;
        let mut section = r.sub_reader(size, "section payload")?;

        if id != binary::CUSTOM_SECTION_ID {
            let rank = section_rank(id)?;
            if rank <= last_rank {
                return Err(parse_err(
                    codes::INVALID_SECTION,
                    format!("section id {id} out of order"),
                ));
            }
            last_rank = rank;
        }

        match id {
            binary::CUSTOM_SECTION_ID => {
                let name = section.name()?;
                let bytes = section.bytes(section.remaining())?.to_vec();
                module.custom_sections.push(CustomSection { name, bytes });
            }
            binary::TYPE_SECTION_ID => parse_type_section(&mut section, &mut module)?,
            binary::IMPORT_SECTION_ID => parse_import_section(&mut section, &mut module)?,
            binary::FUNCTION_SECTION_ID => {
                let count = section.leb_u32()?;
                for _ in 0..count {
                    module.funcs.push(section.leb_u32()?);
                }
            }
            binary::TABLE_SECTION_ID => {
                let count = section.leb_u32()?;
                for _ in 0..count {
                    module.tables.push(parse_table_type(&mut section)?);
                }
            }
            binary::MEMORY_SECTION_ID => {
                let count = section.leb_u32()?;
                for _ in 0..count {
                    let limits = parse_limits(&mut section)?;
                    module.memories.push(MemoryType { limits });
                }
            }
            binary::GLOBAL_SECTION_ID => {
                let count = section.leb_u32()?;
                for _ in 0..count {
                    let ty = parse_global_type(&mut section)?;
                    let init = parse_const_expr(&mut section)?;
                    module.globals.push(Global { ty, init });
                }
            }
            binary::EXPORT_SECTION_ID => parse_export_section(&mut section, &mut module)?,
            binary::START_SECTION_ID => {
                module.start = Some(section.leb_u32()?);
            }
            binary::ELEMENT_SECTION_ID => {
                let count = section.leb_u32()?;
                for _ in 0..count {
                    module.elements.push(parse_element_segment(&mut section)?);
                }
            }
            binary::DATA_COUNT_SECTION_ID => {
                module.data_count = Some(section.leb_u32()?);
            }
            binary::CODE_SECTION_ID => parse_code_section(&mut section, &mut module)?,
            binary::DATA_SECTION_ID => {
                let count = section.leb_u32()?;
                for _ in 0..count {
                    module.datas.push(parse_data_segment(&mut section)?);
                }
            }
            other => {
                return Err(parse_err(
                    codes::INVALID_SECTION,
                    format!("unknown section id {other}"),
                ));
            }
        }

        if !section.is_empty() {
            return Err(parse_err(
                codes::INVALID_SECTION,
                format!("section id {id} has {} trailing bytes", section.remaining()),
            ));
        }
    }

    if module.funcs.len() != module.bodies.len() {
        return Err(parse_err(
            codes::INVALID_SECTION,
            format!(
                "function section declares {} functions but code section has {}",
                module.funcs.len(),
                module.bodies.len()
            ),
        ));
    }
    if let Some(count) = module.data_count {
        if count as usize != module.datas.len() {
            return Err(parse_err(
                codes::INVALID_SECTION,
                format!(
                    "data count section declares {count} segments but data section has {}",
                    module.datas.len()
                ),
            ));
        }
    }

    Ok(module)
}

/// Non-custom sections must appear in this order; the data-count section
/// slots between element and code.
fn section_rank(id: u8) -> Result<u8> {
    Ok(match id {
        binary::TYPE_SECTION_ID => 1,
        binary::IMPORT_SECTION_ID => 2,
        binary::FUNCTION_SECTION_ID => 3,
        binary::TABLE_SECTION_ID => 4,
        binary::MEMORY_SECTION_ID => 5,
        binary::GLOBAL_SECTION_ID => 6,
        binary::EXPORT_SECTION_ID => 7,
        binary::START_SECTION_ID => 8,
        binary::ELEMENT_SECTION_ID => 9,
        binary::DATA_COUNT_SECTION_ID => 10,
        binary::CODE_SECTION_ID => 11,
        binary::DATA_SECTION_ID => 12,
        other => {
            return Err(parse_err(
                codes::INVALID_SECTION,
                format!("unknown section id {other}"),
            ))
        }
    })
}

fn parse_type_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = r.leb_u32()?;
    for _ in 0..count {
        let tag = r.u8()?;
        if tag != binary::FUNC_TYPE_TAG {
            return Err(parse_err(
                codes::PARSE_ERROR,
                format!("expected func type (0x60), got 0x{tag:02x}"),
            ));
        }
        let nparams = r.leb_u32()?;
        let mut params = Vec::with_capacity(nparams.min(64) as usize);
        for _ in 0..nparams {
            params.push(ValueType::from_binary(r.u8()?)?);
        }
        let nresults = r.leb_u32()?;
        let mut results = Vec::with_capacity(nresults.min(64) as usize);
        for _ in 0..nresults {
            results.push(ValueType::from_binary(r.u8()?)?);
        }
        module.types.push(FuncType::new(params, results));
    }
    Ok(())
}

fn parse_import_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = r.leb_u32()?;
    for _ in 0..count {
        let module_name = r.name()?;
        let item_name = r.name()?;
        let kind = r.u8()?;
        let desc = match kind {
            binary::EXTERNAL_KIND_FUNC => ImportDesc::Func(r.leb_u32()?),
            binary::EXTERNAL_KIND_TABLE => ImportDesc::Table(parse_table_type(r)?),
            binary::EXTERNAL_KIND_MEMORY => ImportDesc::Memory(MemoryType {
                limits: parse_limits(r)?,
            }),
            binary::EXTERNAL_KIND_GLOBAL => ImportDesc::Global(parse_global_type(r)?),
            other => {
                // A malformed import declaration is a decode-time failure,
                // not a link failure.
                return Err(parse_err(
                    codes::PARSE_ERROR,
                    format!("invalid import kind 0x{other:02x}"),
                ));
            }
        };
        module.imports.push(Import {
            module: module_name,
            name: item_name,
            desc,
        });
    }
    Ok(())
}

fn parse_export_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = r.leb_u32()?;
    for _ in 0..count {
        let name = r.name()?;
        let kind = match r.u8()? {
            binary::EXTERNAL_KIND_FUNC => ExportKind::Func,
            binary::EXTERNAL_KIND_TABLE => ExportKind::Table,
            binary::EXTERNAL_KIND_MEMORY => ExportKind::Memory,
            binary::EXTERNAL_KIND_GLOBAL => ExportKind::Global,
            other => {
                return Err(parse_err(
                    codes::PARSE_ERROR,
                    format!("invalid export kind 0x{other:02x}"),
                ));
            }
        };
        let index = r.leb_u32()?;
        module.exports.push(Export { name, kind, index });
    }
    Ok(())
}

fn parse_limits(r: &mut Reader<'_>) -> Result<Limits> {
    match r.u8()? {
        0x00 => Ok(Limits::new(r.leb_u32()?, None)),
        0x01 => {
            let min = r.leb_u32()?;
            let max = r.leb_u32()?;
            Ok(Limits::new(min, Some(max)))
        }
        other => Err(parse_err(
            codes::PARSE_ERROR,
            format!("invalid limits flag 0x{other:02x}"),
        )),
    }
}

fn parse_table_type(r: &mut Reader<'_>) -> Result<TableType> {
    let element = ValueType::from_binary(r.u8()?)?;
    if !element.is_ref() {
        return Err(parse_err(
            codes::PARSE_ERROR,
            format!("table element type {element} is not a reference type"),
        ));
    }
    let limits = parse_limits(r)?;
    Ok(TableType { element, limits })
}

fn parse_global_type(r: &mut Reader<'_>) -> Result<GlobalType> {
    let value_type = ValueType::from_binary(r.u8()?)?;
    let mutability = match r.u8()? {
        0x00 => Mutability::Const,
        0x01 => Mutability::Var,
        other => {
            return Err(parse_err(
                codes::PARSE_ERROR,
                format!("invalid mutability flag 0x{other:02x}"),
            ));
        }
    };
    Ok(GlobalType {
        value_type,
        mutability,
    })
}

/// Parses a constant initializer expression terminated by `end`.
pub(crate) fn parse_const_expr(r: &mut Reader<'_>) -> Result<ConstExpr> {
    let opcode = r.u8()?;
    let expr = match opcode {
        0x41 => ConstExpr::I32(r.leb_i32()?),
        0x42 => ConstExpr::I64(r.leb_i64()?),
        0x43 => ConstExpr::F32(r.f32_bits()?),
        0x44 => ConstExpr::F64(r.f64_bits()?),
        0x23 => ConstExpr::GlobalGet(r.leb_u32()?),
        0xD0 => {
            let ty = ValueType::from_binary(r.u8()?)?;
            if !ty.is_ref() {
                return Err(parse_err(
                    codes::PARSE_ERROR,
                    format!("ref.null of non-reference type {ty}"),
                ));
            }
            ConstExpr::RefNull(ty)
        }
        0xD2 => ConstExpr::RefFunc(r.leb_u32()?),
        other => {
            // Non-constant instruction in an initializer: statically
            // invalid rather than malformed.
            return Err(Error::new(
                ErrorCategory::Validation,
                codes::INVALID_CONST_EXPR,
                format!("non-constant opcode 0x{other:02x} in initializer expression"),
            ));
        }
    };
    let end = r.u8()?;
    if end != 0x0B {
        return Err(Error::new(
            ErrorCategory::Validation,
            codes::INVALID_CONST_EXPR,
            "initializer expression must be a single constant instruction",
        ));
    }
    Ok(expr)
}

fn parse_element_segment(r: &mut Reader<'_>) -> Result<ElementSegment> {
    let flags = r.leb_u32()?;
    if flags > 7 {
        return Err(parse_err(
            codes::PARSE_ERROR,
            format!("invalid element segment flags {flags}"),
        ));
    }
    let active = flags & 0x1 == 0;
    let explicit_index = flags & 0x2 != 0;
    let use_exprs = flags & 0x4 != 0;

    let table = if active && explicit_index {
        r.leb_u32()?
    } else {
        0
    };
    let offset = if active {
        Some(parse_const_expr(r)?)
    } else {
        None
    };

    // flags 1/2/3 carry an elemkind byte, flags 5/6/7 a reference type.
    let ty = if flags == 0 || flags == 4 {
        ValueType::FuncRef
    } else if use_exprs {
        let ty = ValueType::from_binary(r.u8()?)?;
        if !ty.is_ref() {
            return Err(parse_err(
                codes::PARSE_ERROR,
                format!("element type {ty} is not a reference type"),
            ));
        }
        ty
    } else {
        let kind = r.u8()?;
        if kind != 0x00 {
            return Err(parse_err(
                codes::PARSE_ERROR,
                format!("invalid elemkind 0x{kind:02x}"),
            ));
        }
        ValueType::FuncRef
    };

    let count = r.leb_u32()?;
    let mut items = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        if use_exprs {
            items.push(parse_const_expr(r)?);
        } else {
            items.push(ConstExpr::RefFunc(r.leb_u32()?));
        }
    }

    let mode = if active {
        ElementMode::Active {
            table,
            offset: offset.unwrap_or(ConstExpr::I32(0)),
        }
    } else if explicit_index {
        ElementMode::Declared
    } else {
        ElementMode::Passive
    };

    Ok(ElementSegment { ty, mode, items })
}

fn parse_data_segment(r: &mut Reader<'_>) -> Result<DataSegment> {
    let flags = r.leb_u32()?;
    let mode = match flags {
        0 => DataMode::Active {
            memory: 0,
            offset: parse_const_expr(r)?,
        },
        1 => DataMode::Passive,
        2 => {
            let memory = r.leb_u32()?;
            DataMode::Active {
                memory,
                offset: parse_const_expr(r)?,
            }
        }
        other => {
            return Err(parse_err(
                codes::PARSE_ERROR,
                format!("invalid data segment flags {other}"),
            ));
        }
    };
    let len = r.leb_u32()? as usize;
    let bytes = r.bytes(len)?.to_vec();
    Ok(DataSegment { mode, bytes })
}

fn parse_code_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = r.leb_u32()?;
    for _ in 0..count {
        let size = r.leb_u32()? as usize;
        // Keep the whole payload for byte-exact re-encoding.
        let raw = r.bytes(size)?.to_vec();
        let mut body_reader = Reader::new(&raw);

        let ngroups = body_reader.leb_u32()?;
        let mut locals = Vec::with_capacity(ngroups.min(64) as usize);
        let mut total: u64 = 0;
        for _ in 0..ngroups {
            let n = body_reader.leb_u32()?;
            let ty = ValueType::from_binary(body_reader.u8()?)?;
            total += u64::from(n);
            if total > MAX_LOCALS {
                return Err(Error::new(
                    ErrorCategory::Validation,
                    codes::VALIDATION_ERROR,
                    format!("function declares more than {MAX_LOCALS} locals"),
                ));
            }
            locals.push((n, ty));
        }

        let instrs = decode_body(&mut body_reader)?;
        if !body_reader.is_empty() {
            return Err(parse_err(
                codes::PARSE_ERROR,
                format!(
                    "code entry has {} bytes after the final end",
                    body_reader.remaining()
                ),
            ));
        }

        module.bodies.push(FuncBody {
            locals,
            instrs,
            jump_table: None,
            max_stack: 0,
            raw,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&binary::WASM_MAGIC);
        v.extend_from_slice(&binary::WASM_VERSION);
        v
    }

    #[test]
    fn rejects_bad_magic() {
        let err = parse_module(b"\0asX\x01\0\0\0").unwrap_err();
        assert_eq!(err.code, codes::INVALID_MAGIC);
    }

    #[test]
    fn rejects_bad_version() {
        let err = parse_module(b"\0asm\x02\0\0\0").unwrap_err();
        assert_eq!(err.code, codes::INVALID_VERSION);
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(parse_module(b"\0asm").is_err());
    }

    #[test]
    fn accepts_empty_module() {
        let m = parse_module(&header()).unwrap();
        assert_eq!(m.num_funcs(), 0);
    }

    #[test]
    fn rejects_out_of_order_sections() {
        let mut bytes = header();
        // Memory section (5) then type section (1).
        bytes.extend_from_slice(&[0x05, 0x01, 0x00]); // empty memory vec
        bytes.extend_from_slice(&[0x01, 0x01, 0x00]); // empty type vec
        let err = parse_module(&bytes).unwrap_err();
        assert_eq!(err.code, codes::INVALID_SECTION);
    }

    #[test]
    fn rejects_section_trailing_bytes() {
        let mut bytes = header();
        // Type section claiming 2 payload bytes but the vec is empty.
        bytes.extend_from_slice(&[0x01, 0x02, 0x00, 0x00]);
        let err = parse_module(&bytes).unwrap_err();
        assert_eq!(err.code, codes::INVALID_SECTION);
    }

    #[test]
    fn rejects_function_code_count_mismatch() {
        let mut bytes = header();
        // One type: () -> ().
        bytes.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]);
        // One function referencing type 0, but no code section.
        bytes.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
        let err = parse_module(&bytes).unwrap_err();
        assert_eq!(err.code, codes::INVALID_SECTION);
    }
}
