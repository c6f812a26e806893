//! Evil VM: a virtual machine for an invented, parametric architecture.
//!
//! Byte width (`char_bit`), word width (`word_size`, in cells) and address
//! width (`addr_size`, in cells) are all chosen at VM construction time
//! (see [`config::VmConfig`]), and the byte order used to serialize each
//! instruction's operands depends on the parity of that instruction's
//! opcode byte — even opcodes decode little-endian, odd opcodes big-endian
//! (§4.5/§4.6).
//!
//! Module map mirrors the system's components: [`numerical`]/[`endian`] are
//! the width-parametric integer plumbing (C1), [`space`]/[`memmap`] are the
//! three address spaces and their aliasing (C2/C3), [`registers`] is the
//! register file (C4), [`isa`] is the closed instruction table (C5),
//! [`decode`] is the fetch/decode step (C6), [`cpu`] is the
//! fetch-decode-execute loop (C7), [`asm`] is the two-pass assembler (C8),
//! and [`io`] is the blocking byte-channel abstraction (C9).

pub mod asm;
pub mod config;
pub mod cpu;
pub mod decode;
pub mod disasm;
pub mod endian;
pub mod error;
pub mod io;
pub mod isa;
pub mod memmap;
pub mod numerical;
pub mod registers;
pub mod space;

pub use config::VmConfig;
pub use cpu::{Machine, StopReason};
pub use error::{AsmError, MemoryErr, VmFault};
pub use io::{BufferChannel, IoChannel, StdIoChannel};

/// Assemble `source` and load it into a freshly constructed [`Machine`] in
/// one call — the common case for a CLI front end or an embedding test.
pub fn assemble_and_load(source: &str, config: VmConfig) -> Result<Machine, error::AsmError> {
    let table = isa::build_table();
    let image = asm::assemble(source, &config, &table)?;
    let mut machine = Machine::new(config);
    machine.load(&image);
    Ok(machine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_and_runs_a_tiny_program() {
        let config = VmConfig {
            char_bit: 8,
            word_size: 2,
            addr_size: 2,
            ram_size: 32,
            stack_size: 32,
            program_size: 0,
            aliases: Vec::new(),
        };
        let mut machine = assemble_and_load("movw.i2r a, 41\nadd.w a, 1\nhalt", config).unwrap();
        let mut io = BufferChannel::new(Vec::new());
        let reason = machine.run(&mut io).unwrap();
        assert_eq!(reason, StopReason::Halted);
        assert_eq!(machine.registers().read(registers::RegId::A, registers::Width::Word), 42);
    }
}
