//! C8: the assembler. Two passes over a UTF-8 text source (§4.8): pass 1
//! ([`symtab`]) walks the parsed lines once, assigning label offsets and
//! evaluating `NAME = expr` bindings; pass 2 ([`emit`]) evaluates every
//! operand expression against the now-complete symbol table and emits the
//! program image. [`lexer`] turns each source line into a [`ast::ParsedLine`];
//! [`expr`] is the constant-expression AST and evaluator shared by both
//! passes.

pub mod ast;
pub mod emit;
pub mod expr;
pub mod lexer;
pub mod symtab;

use crate::config::VmConfig;
use crate::error::{AsmResult, Pos};
use crate::isa::InstrTable;

/// Assemble `source` into a program image (a sequence of `char_bit`-wide
/// cells, per §3 "program image") using `config`'s widths and `table`'s
/// mnemonic-to-opcode mapping.
pub fn assemble(source: &str, config: &VmConfig, table: &InstrTable) -> AsmResult<Vec<u64>> {
    let mut parsed = Vec::new();
    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw_line.trim_end_matches('\r');
        let pos = Pos { line: line_no, col: 1 };
        let parsed_line = lexer::parse_line(line_no, trimmed)?;
        parsed.push((pos, parsed_line));
    }
    let pass1 = symtab::pass1(&parsed, config.word_size, config.addr_size, table)?;
    emit::pass2(&pass1, config.char_bit, config.word_size, config.addr_size, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::build_table;

    fn cfg() -> VmConfig {
        VmConfig {
            char_bit: 9,
            word_size: 2,
            addr_size: 2,
            ram_size: 64,
            stack_size: 32,
            program_size: 0,
            aliases: Vec::new(),
        }
    }

    #[test]
    fn assembles_hello_style_program() {
        let src = "\
            msg: db 'H', 'i', 0x0a\n\
            len = 3\n\
            movw.i2r c, len\n\
            loop_top:\n\
            movw.i2r a, msg\n\
            halt\n\
        ";
        let table = build_table();
        let image = assemble(src, &cfg(), &table).unwrap();
        assert!(!image.is_empty());
    }

    #[test]
    fn undefined_jump_target_names_the_symbol() {
        let table = build_table();
        let err = assemble("jmp does_not_exist", &cfg(), &table).unwrap_err();
        match err {
            crate::error::AsmError::UndefinedSymbol { name, .. } => assert_eq!(name, "does_not_exist"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn redefined_label_is_fatal() {
        let table = build_table();
        let err = assemble("here: halt\nhere: halt", &cfg(), &table).unwrap_err();
        assert!(matches!(err, crate::error::AsmError::RedefinedSymbol { .. }));
    }
}
