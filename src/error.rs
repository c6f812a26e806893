//! error handling and fallable return values stuff

use thiserror::Error;

/// Errors raised by an address space (§4.2). One of these travels with every
/// load/store that crosses a space boundary.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum MemoryErr {
    #[error("address {addr} out of bounds (space size {size})")]
    OutOfBounds { addr: u64, size: u64 },
    #[error("write to read-only space at address {addr}")]
    ReadOnly { addr: u64 },
}

pub type MemResult<T> = Result<T, MemoryErr>;

/// Execution faults (§7). Each stops the CPU loop and is reported with the
/// instruction pointer at the moment of fault.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum VmFault {
    #[error("unknown opcode {opcode} at ip={ip}")]
    UnknownOpcode { opcode: u8, ip: u64 },
    #[error("memory access fault at ip={ip}: {source}")]
    Memory {
        ip: u64,
        #[source]
        source: MemoryErr,
    },
    #[error("division by zero at ip={ip}")]
    DivByZero { ip: u64 },
    #[error("call stack overflow at ip={ip}")]
    StackOverflow { ip: u64 },
    #[error("call stack underflow at ip={ip}")]
    StackUnderflow { ip: u64 },
}

impl VmFault {
    pub fn ip(&self) -> u64 {
        match *self {
            VmFault::UnknownOpcode { ip, .. }
            | VmFault::Memory { ip, .. }
            | VmFault::DivByZero { ip }
            | VmFault::StackOverflow { ip }
            | VmFault::StackUnderflow { ip } => ip,
        }
    }
}

pub type VmResult<T> = Result<T, VmFault>;

/// A source position for assembly diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Assembly-time errors (§4.8, §7). Carried with the line/column at which
/// they were detected; fatal to the assembly pass that raised them.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AsmError {
    #[error("{pos}: syntax error: {message}")]
    Syntax { pos: Pos, message: String },

    #[error("{pos}: undefined symbol `{name}`")]
    UndefinedSymbol { pos: Pos, name: String },

    #[error("{pos}: symbol `{name}` redefined (first defined at {first})")]
    RedefinedSymbol {
        pos: Pos,
        name: String,
        first: Pos,
    },

    #[error("{pos}: ambiguous instruction `{mnemonic}` for the given operands")]
    AmbiguousInstruction { pos: Pos, mnemonic: String },

    #[error("{pos}: value {value} does not fit in {bits}-bit field")]
    OutOfRange { pos: Pos, value: i128, bits: u32 },

    #[error("{pos}: division by zero in constant expression")]
    DivByZeroInConstExpr { pos: Pos },
}

pub type AsmResult<T> = Result<T, AsmError>;
