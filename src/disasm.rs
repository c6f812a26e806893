//! Disassembler.
//!
//! Walks a program image one instruction at a time with the same [`decode`]
//! step the CPU's fetch stage uses, and renders each into a line of text:
//! offset, raw cells, mnemonic, operands. Grounded on
//! `other_examples/25c003ba_romatthe-mudkip__src-cpu-disassembler.rs.rs`'s
//! shape — an opcode table paired with a per-instruction textual renderer —
//! adapted here to a data-driven table instead of a hand-matched opcode
//! switch, and to operand values instead of fixed 6502 addressing modes.

use std::fmt;

use crate::decode::decode;
use crate::isa::{InstrDef, InstrTable, OperandClass};
use crate::memmap::{MemoryMap, SpaceName};
use crate::registers::RegId;

/// One disassembled instruction: its address, the raw cells it occupies,
/// and its rendered text (`mnemonic operand, operand`).
#[derive(Debug, Clone)]
pub struct DisasmLine {
    pub address: u64,
    pub raw: Vec<u64>,
    pub text: String,
}

impl fmt::Display for DisasmLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.raw.iter().map(|c| format!("{c:02x}")).collect::<Vec<_>>().join(" ");
        write!(f, "{:04x}:  {:<24}  {}", self.address, raw, self.text)
    }
}

/// Disassemble `len` cells of program space starting at offset 0, stopping
/// early at the first cell decode can't turn into an instruction (an
/// unknown opcode or a truncated operand at the end of the image).
pub fn disassemble(
    map: &MemoryMap,
    table: &InstrTable,
    word_size: usize,
    addr_size: usize,
    char_bit: u32,
    len: u64,
) -> Vec<DisasmLine> {
    let mut lines = Vec::new();
    let mut ip = 0u64;
    while ip < len {
        let decoded = match decode(map, table, ip, word_size, addr_size, char_bit) {
            Ok(d) => d,
            Err(_) => break,
        };
        let program = map.space(SpaceName::Program);
        let raw = (ip..decoded.next_ip)
            .map(|addr| program.load_cell(addr).unwrap_or(0))
            .collect();
        drop(program);
        lines.push(DisasmLine {
            address: ip,
            raw,
            text: render(decoded.instr, &decoded.operands),
        });
        ip = decoded.next_ip;
    }
    lines
}

fn render(instr: &InstrDef, operands: &[u128]) -> String {
    let rendered: Vec<String> = instr
        .operands
        .iter()
        .zip(operands)
        .map(|(class, value)| match class {
            OperandClass::Reg => register_name(*value as u8).to_string(),
            OperandClass::ImmByte | OperandClass::ImmWord | OperandClass::ImmAddr => format!("0x{value:x}"),
        })
        .collect();
    if rendered.is_empty() {
        instr.text.to_string()
    } else {
        format!("{} {}", instr.text, rendered.join(", "))
    }
}

fn register_name(code: u8) -> &'static str {
    match RegId::from_code(code) {
        Some(RegId::A) => "a",
        Some(RegId::C) => "c",
        Some(RegId::F) => "f",
        Some(RegId::Ip) => "ip",
        Some(RegId::Sp) => "sp",
        None => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::build_table;
    use crate::memmap::MemoryMap;

    #[test]
    fn renders_register_and_immediate_operands() {
        let table = build_table();
        let image = crate::asm::assemble(
            "movw.i2r a, 0x0102\nhalt",
            &crate::config::VmConfig {
                char_bit: 8,
                word_size: 2,
                addr_size: 2,
                ram_size: 16,
                stack_size: 16,
                program_size: 0,
                aliases: Vec::new(),
            },
            &table,
        )
        .unwrap();
        let map = MemoryMap::build(16, image.len(), 16, 8, &[]);
        map.space(SpaceName::Program).store_bytes(0, &image).unwrap();

        let lines = disassemble(&map, &table, 2, 2, 8, image.len() as u64);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].address, 0);
        assert_eq!(lines[0].text, "movw.i2r a, 0x102");
        assert_eq!(lines[1].text, "halt");
    }

    #[test]
    fn stops_cleanly_at_an_unknown_opcode() {
        let table = build_table();
        let map = MemoryMap::build(16, 4, 16, 8, &[]);
        map.space(SpaceName::Program).store_cell(0, 250).unwrap();
        let lines = disassemble(&map, &table, 1, 1, 8, 4);
        assert!(lines.is_empty());
    }
}
