// Weft - weft-decoder
// Module: instruction decoding
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Decoding of function-body instruction streams.

use weft_error::{codes, Error, ErrorCategory, Result};
use weft_foundation::{FloatBits32, FloatBits64, ValueType};
use weft_format::binary::Reader;
use weft_format::{BlockType, BrTableData, Instruction, MemArg};

fn bad_opcode(msg: impl Into<String>) -> Error {
    Error::new(ErrorCategory::Parse, codes::INVALID_OPCODE, msg)
}

/// Decodes the instruction sequence of a function body, up to and
/// including the `end` that closes the implicit function block.
pub fn decode_body(r: &mut Reader<'_>) -> Result<Vec<Instruction>> {
    let mut instrs = Vec::new();
    let mut depth: u32 = 1;
    loop {
        let instr = decode_instr(r)?;
        if instr.opens_block() {
            depth += 1;
        } else if instr == Instruction::End {
            depth -= 1;
        }
        instrs.push(instr);
        if depth == 0 {
            return Ok(instrs);
        }
    }
}

fn decode_block_type(r: &mut Reader<'_>) -> Result<BlockType> {
    let b = r.peek_u8()?;
    if b == 0x40 {
        r.u8()?;
        return Ok(BlockType::Empty);
    }
    if let Ok(ty) = ValueType::from_binary(b) {
        r.u8()?;
        return Ok(BlockType::Value(ty));
    }
    let idx = r.leb_s33()?;
    if idx < 0 {
        return Err(bad_opcode(format!("invalid block type 0x{b:02x}")));
    }
    Ok(BlockType::Func(idx as u32))
}

fn decode_mem_arg(r: &mut Reader<'_>) -> Result<MemArg> {
    let align = r.leb_u32()?;
    let offset = r.leb_u32()?;
    Ok(MemArg { align, offset })
}

/// The zero byte reserved for a future memory index.
fn expect_zero(r: &mut Reader<'_>, what: &str) -> Result<()> {
    let b = r.u8()?;
    if b != 0x00 {
        return Err(bad_opcode(format!("nonzero reserved byte in {what}")));
    }
    Ok(())
}

fn decode_ref_type(r: &mut Reader<'_>) -> Result<ValueType> {
    let ty = ValueType::from_binary(r.u8()?)?;
    if !ty.is_ref() {
        return Err(bad_opcode(format!("{ty} is not a reference type")));
    }
    Ok(ty)
}

#[allow(clippy::too_many_lines)]
pub(crate) fn decode_instr(r: &mut Reader<'_>) -> Result<Instruction> {
    use Instruction as I;
    let opcode = r.u8()?;
    Ok(match opcode {
        0x00 => I::Unreachable,
        0x01 => I::Nop,
        0x02 => I::Block(decode_block_type(r)?),
        0x03 => I::Loop(decode_block_type(r)?),
        0x04 => I::If(decode_block_type(r)?),
        0x05 => I::Else,
        0x0B => I::End,
        0x0C => I::Br(r.leb_u32()?),
        0x0D => I::BrIf(r.leb_u32()?),
        0x0E => {
            let count = r.leb_u32()?;
            let mut targets = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                targets.push(r.leb_u32()?);
            }
            let default = r.leb_u32()?;
            I::BrTable(Box::new(BrTableData { targets, default }))
        }
        0x0F => I::Return,
        0x10 => I::Call(r.leb_u32()?),
        0x11 => {
            let type_idx = r.leb_u32()?;
            let table_idx = r.leb_u32()?;
            I::CallIndirect {
                type_idx,
                table_idx,
            }
        }

        0x1A => I::Drop,
        0x1B => I::Select,
        0x1C => {
            let arity = r.leb_u32()?;
            if arity != 1 {
                return Err(Error::new(
                    ErrorCategory::Validation,
                    codes::TYPE_MISMATCH,
                    format!("select result arity must be 1, got {arity}"),
                ));
            }
            I::SelectT(ValueType::from_binary(r.u8()?)?)
        }

        0x20 => I::LocalGet(r.leb_u32()?),
        0x21 => I::LocalSet(r.leb_u32()?),
        0x22 => I::LocalTee(r.leb_u32()?),
        0x23 => I::GlobalGet(r.leb_u32()?),
        0x24 => I::GlobalSet(r.leb_u32()?),

        0x25 => I::TableGet(r.leb_u32()?),
        0x26 => I::TableSet(r.leb_u32()?),

        0x28 => I::I32Load(decode_mem_arg(r)?),
        0x29 => I::I64Load(decode_mem_arg(r)?),
        0x2A => I::F32Load(decode_mem_arg(r)?),
        0x2B => I::F64Load(decode_mem_arg(r)?),
        0x2C => I::I32Load8S(decode_mem_arg(r)?),
        0x2D => I::I32Load8U(decode_mem_arg(r)?),
        0x2E => I::I32Load16S(decode_mem_arg(r)?),
        0x2F => I::I32Load16U(decode_mem_arg(r)?),
        0x30 => I::I64Load8S(decode_mem_arg(r)?),
        0x31 => I::I64Load8U(decode_mem_arg(r)?),
        0x32 => I::I64Load16S(decode_mem_arg(r)?),
        0x33 => I::I64Load16U(decode_mem_arg(r)?),
        0x34 => I::I64Load32S(decode_mem_arg(r)?),
        0x35 => I::I64Load32U(decode_mem_arg(r)?),
        0x36 => I::I32Store(decode_mem_arg(r)?),
        0x37 => I::I64Store(decode_mem_arg(r)?),
        0x38 => I::F32Store(decode_mem_arg(r)?),
        0x39 => I::F64Store(decode_mem_arg(r)?),
        0x3A => I::I32Store8(decode_mem_arg(r)?),
        0x3B => I::I32Store16(decode_mem_arg(r)?),
        0x3C => I::I64Store8(decode_mem_arg(r)?),
        0x3D => I::I64Store16(decode_mem_arg(r)?),
        0x3E => I::I64Store32(decode_mem_arg(r)?),
        0x3F => {
            expect_zero(r, "memory.size")?;
            I::MemorySize
        }
        0x40 => {
            expect_zero(r, "memory.grow")?;
            I::MemoryGrow
        }

        0x41 => I::I32Const(r.leb_i32()?),
        0x42 => I::I64Const(r.leb_i64()?),
        0x43 => I::F32Const(FloatBits32(r.f32_bits()?)),
        0x44 => I::F64Const(FloatBits64(r.f64_bits()?)),

        0x45 => I::I32Eqz,
        0x46 => I::I32Eq,
        0x47 => I::I32Ne,
        0x48 => I::I32LtS,
        0x49 => I::I32LtU,
        0x4A => I::I32GtS,
        0x4B => I::I32GtU,
        0x4C => I::I32LeS,
        0x4D => I::I32LeU,
        0x4E => I::I32GeS,
        0x4F => I::I32GeU,

        0x50 => I::I64Eqz,
        0x51 => I::I64Eq,
        0x52 => I::I64Ne,
        0x53 => I::I64LtS,
        0x54 => I::I64LtU,
        0x55 => I::I64GtS,
        0x56 => I::I64GtU,
        0x57 => I::I64LeS,
        0x58 => I::I64LeU,
        0x59 => I::I64GeS,
        0x5A => I::I64GeU,

        0x5B => I::F32Eq,
        0x5C => I::F32Ne,
        0x5D => I::F32Lt,
        0x5E => I::F32Gt,
        0x5F => I::F32Le,
        0x60 => I::F32Ge,

        0x61 => I::F64Eq,
        0x62 => I::F64Ne,
        0x63 => I::F64Lt,
        0x64 => I::F64Gt,
        0x65 => I::F64Le,
        0x66 => I::F64Ge,

        0x67 => I::I32Clz,
        0x68 => I::I32Ctz,
        0x69 => I::I32Popcnt,
        0x6A => I::I32Add,
        0x6B => I::I32Sub,
        0x6C => I::I32Mul,
        0x6D => I::I32DivS,
        0x6E => I::I32DivU,
        0x6F => I::I32RemS,
        0x70 => I::I32RemU,
        0x71 => I::I32And,
        0x72 => I::I32Or,
        0x73 => I::I32Xor,
        0x74 => I::I32Shl,
        0x75 => I::I32ShrS,
        0x76 => I::I32ShrU,
        0x77 => I::I32Rotl,
        0x78 => I::I32Rotr,

        0x79 => I::I64Clz,
        0x7A => I::I64Ctz,
        0x7B => I::I64Popcnt,
        0x7C => I::I64Add,
        0x7D => I::I64Sub,
        0x7E => I::I64Mul,
        0x7F => I::I64DivS,
        0x80 => I::I64DivU,
        0x81 => I::I64RemS,
        0x82 => I::I64RemU,
        0x83 => I::I64And,
        0x84 => I::I64Or,
        0x85 => I::I64Xor,
        0x86 => I::I64Shl,
        0x87 => I::I64ShrS,
        0x88 => I::I64ShrU,
        0x89 => I::I64Rotl,
        0x8A => I::I64Rotr,

        0x8B => I::F32Abs,
        0x8C => I::F32Neg,
        0x8D => I::F32Ceil,
        0x8E => I::F32Floor,
        0x8F => I::F32Trunc,
        0x90 => I::F32Nearest,
        0x91 => I::F32Sqrt,
        0x92 => I::F32Add,
        0x93 => I::F32Sub,
        0x94 => I::F32Mul,
        0x95 => I::F32Div,
        0x96 => I::F32Min,
        0x97 => I::F32Max,
        0x98 => I::F32Copysign,

        0x99 => I::F64Abs,
        0x9A => I::F64Neg,
        0x9B => I::F64Ceil,
        0x9C => I::F64Floor,
        0x9D => I::F64Trunc,
        0x9E => I::F64Nearest,
        0x9F => I::F64Sqrt,
        0xA0 => I::F64Add,
        0xA1 => I::F64Sub,
        0xA2 => I::F64Mul,
        0xA3 => I::F64Div,
        0xA4 => I::F64Min,
        0xA5 => I::F64Max,
        0xA6 => I::F64Copysign,

        0xA7 => I::I32WrapI64,
        0xA8 => I::I32TruncF32S,
        0xA9 => I::I32TruncF32U,
        0xAA => I::I32TruncF64S,
        0xAB => I::I32TruncF64U,
        0xAC => I::I64ExtendI32S,
        0xAD => I::I64ExtendI32U,
        0xAE => I::I64TruncF32S,
        0xAF => I::I64TruncF32U,
        0xB0 => I::I64TruncF64S,
        0xB1 => I::I64TruncF64U,
        0xB2 => I::F32ConvertI32S,
        0xB3 => I::F32ConvertI32U,
        0xB4 => I::F32ConvertI64S,
        0xB5 => I::F32ConvertI64U,
        0xB6 => I::F32DemoteF64,
        0xB7 => I::F64ConvertI32S,
        0xB8 => I::F64ConvertI32U,
        0xB9 => I::F64ConvertI64S,
        0xBA => I::F64ConvertI64U,
        0xBB => I::F64PromoteF32,
        0xBC => I::I32ReinterpretF32,
        0xBD => I::I64ReinterpretF64,
        0xBE => I::F32ReinterpretI32,
        0xBF => I::F64ReinterpretI64,

        0xC0 => I::I32Extend8S,
        0xC1 => I::I32Extend16S,
        0xC2 => I::I64Extend8S,
        0xC3 => I::I64Extend16S,
        0xC4 => I::I64Extend32S,

        0xD0 => I::RefNull(decode_ref_type(r)?),
        0xD1 => I::RefIsNull,
        0xD2 => I::RefFunc(r.leb_u32()?),

        0xFC => decode_fc(r)?,

        other => {
            return Err(bad_opcode(format!("unknown opcode 0x{other:02x}")));
        }
    })
}

fn decode_fc(r: &mut Reader<'_>) -> Result<Instruction> {
    use Instruction as I;
    let sub = r.leb_u32()?;
    Ok(match sub {
        0 => I::I32TruncSatF32S,
        1 => I::I32TruncSatF32U,
        2 => I::I32TruncSatF64S,
        3 => I::I32TruncSatF64U,
        4 => I::I64TruncSatF32S,
        5 => I::I64TruncSatF32U,
        6 => I::I64TruncSatF64S,
        7 => I::I64TruncSatF64U,
        8 => {
            let data_idx = r.leb_u32()?;
            expect_zero(r, "memory.init")?;
            I::MemoryInit(data_idx)
        }
        9 => I::DataDrop(r.leb_u32()?),
        10 => {
            expect_zero(r, "memory.copy")?;
            expect_zero(r, "memory.copy")?;
            I::MemoryCopy
        }
        11 => {
            expect_zero(r, "memory.fill")?;
            I::MemoryFill
        }
        12 => {
            let elem_idx = r.leb_u32()?;
            let table_idx = r.leb_u32()?;
            I::TableInit {
                elem_idx,
                table_idx,
            }
        }
        13 => I::ElemDrop(r.leb_u32()?),
        14 => {
            let dst_table = r.leb_u32()?;
            let src_table = r.leb_u32()?;
            I::TableCopy {
                dst_table,
                src_table,
            }
        }
        15 => I::TableGrow(r.leb_u32()?),
        16 => I::TableSize(r.leb_u32()?),
        17 => I::TableFill(r.leb_u32()?),
        other => {
            return Err(bad_opcode(format!("unknown 0xFC subopcode {other}")));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Instruction> {
        let mut r = Reader::new(bytes);
        let instrs = decode_body(&mut r).unwrap();
        assert!(r.is_empty());
        instrs
    }

    #[test]
    fn decodes_simple_body() {
        // local.get 0, i32.const 1, i32.add, end
        let instrs = decode_all(&[0x20, 0x00, 0x41, 0x01, 0x6A, 0x0B]);
        assert_eq!(
            instrs,
            vec![
                Instruction::LocalGet(0),
                Instruction::I32Const(1),
                Instruction::I32Add,
                Instruction::End,
            ]
        );
    }

    #[test]
    fn tracks_nesting_to_the_matching_end() {
        // block (if ... end) end end -- outer body end is the third one
        let instrs = decode_all(&[
            0x02, 0x40, // block (empty)
            0x41, 0x00, // i32.const 0
            0x04, 0x40, // if (empty)
            0x0B, // end (if)
            0x0B, // end (block)
            0x0B, // end (function)
        ]);
        assert_eq!(instrs.len(), 6);
        assert_eq!(instrs[0], Instruction::Block(BlockType::Empty));
    }

    #[test]
    fn decodes_block_type_forms() {
        let mut r = Reader::new(&[0x02, 0x7F, 0x0B, 0x0B]);
        let instrs = decode_body(&mut r).unwrap();
        assert_eq!(
            instrs[0],
            Instruction::Block(BlockType::Value(ValueType::I32))
        );

        let mut r = Reader::new(&[0x02, 0x03, 0x0B, 0x0B]);
        let instrs = decode_body(&mut r).unwrap();
        assert_eq!(instrs[0], Instruction::Block(BlockType::Func(3)));
    }

    #[test]
    fn rejects_nonzero_reserved_byte() {
        let mut r = Reader::new(&[0x3F, 0x01, 0x0B]);
        assert!(decode_body(&mut r).is_err());
    }

    #[test]
    fn rejects_unknown_opcode() {
        let mut r = Reader::new(&[0xFE, 0x0B]);
        let err = decode_body(&mut r).unwrap_err();
        assert_eq!(err.code, codes::INVALID_OPCODE);
    }

    #[test]
    fn decodes_br_table() {
        let mut r = Reader::new(&[0x0E, 0x02, 0x00, 0x01, 0x02, 0x0B]);
        let instrs = decode_body(&mut r).unwrap();
        match &instrs[0] {
            Instruction::BrTable(data) => {
                assert_eq!(data.targets, vec![0, 1]);
                assert_eq!(data.default, 2);
            }
            other => panic!("unexpected instruction {other:?}"),
        }
    }

    #[test]
    fn decodes_trunc_sat() {
        let mut r = Reader::new(&[0xFC, 0x00, 0x0B]);
        let instrs = decode_body(&mut r).unwrap();
        assert_eq!(instrs[0], Instruction::I32TruncSatF32S);
    }
}
