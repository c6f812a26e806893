//! Pass 2 (§4.8): evaluate every operand expression now that the full
//! symbol table exists (so forward references to labels resolve), and emit
//! each instruction's bytes with endianness chosen by its own opcode's
//! parity (§4.5/§4.6) — directives have no opcode, so their multi-cell
//! entries (`da`) use the canonical little-endian in-memory word format
//! instead (§4.2), matching how `lda`/`ldw` will read them back at runtime.

use std::collections::HashMap;

use crate::asm::expr::{eval, Expr};
use crate::asm::symtab::{Pass1Result, SizedStmt};
use crate::endian::pack;
use crate::error::{AsmError, AsmResult, Pos};
use crate::isa::{InstrTable, OperandClass};
use crate::numerical::to_unsigned;
use crate::registers::RegId;
use crate::asm::ast::Operand;

/// Reject a value that does not fit a `bits`-wide field, signed or
/// unsigned (§7 `OUT_OF_RANGE`). Fields at or beyond 127 bits are treated as
/// unbounded: i128 cannot usefully represent the full range of an
/// arbitrarily wide configured word, and configured widths stay well under
/// that in practice.
fn check_range(value: i128, bits: u32, pos: Pos) -> AsmResult<()> {
    if bits == 0 || bits >= 127 {
        return Ok(());
    }
    let max_unsigned = (1i128 << bits) - 1;
    let min_signed = -(1i128 << (bits - 1));
    if value > max_unsigned || value < min_signed {
        Err(AsmError::OutOfRange { pos, value, bits })
    } else {
        Ok(())
    }
}

fn write_cells(image: &mut [u64], at: usize, cells: &[u64]) {
    image[at..at + cells.len()].copy_from_slice(cells);
}

pub fn pass2(
    pass1: &Pass1Result,
    char_bit: u32,
    word_size: usize,
    addr_size: usize,
    table: &InstrTable,
) -> AsmResult<Vec<u64>> {
    let mut image = vec![0u64; pass1.image_size];

    for line in &pass1.lines {
        match &line.stmt {
            None => {}
            Some(SizedStmt::Db(exprs)) => {
                emit_db(&mut image, line.offset, exprs, &pass1.symbols, char_bit, word_size, addr_size, line.pos)?;
            }
            Some(SizedStmt::Da(exprs)) => {
                emit_da(&mut image, line.offset, exprs, &pass1.symbols, char_bit, word_size, addr_size, line.pos)?;
            }
            Some(SizedStmt::Instruction { opcode, operands, relative }) => {
                emit_instruction(
                    &mut image,
                    line.offset,
                    *opcode,
                    operands,
                    *relative,
                    &pass1.symbols,
                    char_bit,
                    word_size,
                    addr_size,
                    table,
                    line.pos,
                )?;
            }
        }
    }

    Ok(image)
}

#[allow(clippy::too_many_arguments)]
fn emit_db(
    image: &mut [u64],
    offset: usize,
    exprs: &[Expr],
    symbols: &HashMap<String, i128>,
    char_bit: u32,
    word_size: usize,
    addr_size: usize,
    pos: Pos,
) -> AsmResult<()> {
    for (i, expr) in exprs.iter().enumerate() {
        let value = eval(expr, symbols, word_size, addr_size, pos)?;
        check_range(value, char_bit, pos)?;
        let cell = to_unsigned(value, char_bit) as u64;
        image[offset + i] = cell;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_da(
    image: &mut [u64],
    offset: usize,
    exprs: &[Expr],
    symbols: &HashMap<String, i128>,
    char_bit: u32,
    word_size: usize,
    addr_size: usize,
    pos: Pos,
) -> AsmResult<()> {
    let bits = addr_size as u32 * char_bit;
    let mut cursor = offset;
    for expr in exprs {
        let value = eval(expr, symbols, word_size, addr_size, pos)?;
        check_range(value, bits, pos)?;
        let cells = pack(to_unsigned(value, bits), addr_size, char_bit, true);
        write_cells(image, cursor, &cells);
        cursor += addr_size;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_instruction(
    image: &mut [u64],
    offset: usize,
    opcode: u8,
    operands: &[Operand],
    relative: bool,
    symbols: &HashMap<String, i128>,
    char_bit: u32,
    word_size: usize,
    addr_size: usize,
    table: &InstrTable,
    pos: Pos,
) -> AsmResult<()> {
    let little_endian = opcode % 2 == 0;
    let def = table.get(opcode).expect("opcode resolved in pass 1 exists in the table");

    image[offset] = opcode as u64;
    let mut cursor = offset + 1;

    for (idx, (class, operand)) in def.operands.iter().zip(operands.iter()).enumerate() {
        let cell_count = class.cell_count(word_size, addr_size);
        match operand {
            Operand::Register(reg) => {
                let cells = pack(register_code(*reg), cell_count, char_bit, little_endian);
                write_cells(image, cursor, &cells);
            }
            Operand::Value(expr) => {
                let mut value = eval(expr, symbols, word_size, addr_size, pos)?;
                if relative && idx == 0 {
                    // target - (address_of_operand + addr_size), §4.8.
                    value -= (cursor + addr_size) as i128;
                }
                let bits = match class {
                    OperandClass::ImmByte => char_bit,
                    OperandClass::ImmWord => word_size as u32 * char_bit,
                    OperandClass::ImmAddr => addr_size as u32 * char_bit,
                    OperandClass::Reg => unreachable!("register operands use the Register arm above"),
                };
                check_range(value, bits, pos)?;
                let cells = pack(to_unsigned(value, bits), cell_count, char_bit, little_endian);
                write_cells(image, cursor, &cells);
            }
        }
        cursor += cell_count;
    }
    Ok(())
}

fn register_code(reg: RegId) -> u128 {
    reg.code() as u128
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::lexer::parse_line;
    use crate::asm::symtab::pass1;
    use crate::config::VmConfig;
    use crate::isa::build_table;

    fn assemble(source: &str, cfg: &VmConfig) -> AsmResult<Vec<u64>> {
        let table = build_table();
        let mut parsed = Vec::new();
        for (i, raw) in source.lines().enumerate() {
            let pos = Pos { line: i + 1, col: 1 };
            parsed.push((pos, parse_line(i + 1, raw)?));
        }
        let p1 = pass1(&parsed, cfg.word_size, cfg.addr_size, &table)?;
        pass2(&p1, cfg.char_bit, cfg.word_size, cfg.addr_size, &table)
    }

    fn cfg() -> VmConfig {
        VmConfig {
            char_bit: 8,
            word_size: 2,
            addr_size: 2,
            ram_size: 64,
            stack_size: 64,
            program_size: 0,
            aliases: Vec::new(),
        }
    }

    #[test]
    fn assembles_mov_and_halt() {
        let image = assemble("movw.i2r a, 5\nhalt", &cfg()).unwrap();
        assert!(!image.is_empty());
    }

    #[test]
    fn forward_label_reference_resolves() {
        let src = "jmp target\nhalt\ntarget: halt";
        let image = assemble(src, &cfg()).unwrap();
        assert!(!image.is_empty());
    }

    #[test]
    fn undefined_symbol_is_fatal() {
        let err = assemble("jmp nowhere", &cfg()).unwrap_err();
        assert!(matches!(err, AsmError::UndefinedSymbol { .. }));
    }

    #[test]
    fn out_of_range_immediate_is_fatal() {
        let err = assemble("movb.i2r a, 0x1FF", &cfg()).unwrap_err();
        assert!(matches!(err, AsmError::OutOfRange { .. }));
    }
}
