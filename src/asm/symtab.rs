//! Pass 1 (§4.8): walk the parsed lines once, assigning every label its
//! byte offset, evaluating `NAME = expr` bindings against symbols seen so
//! far, and sizing every directive/instruction so pass 2 knows exactly
//! where each line's bytes land without re-deriving any of this.

use std::collections::HashMap;

use crate::asm::ast::{Directive, Operand, ParsedLine, Stmt};
use crate::asm::expr::{eval, Expr};
use crate::decode::encoded_len;
use crate::error::{AsmError, AsmResult, Pos};
use crate::isa::{Action, InstrDef, InstrTable, OperandClass};

#[derive(Debug, Clone)]
pub enum SizedStmt {
    Instruction {
        opcode: u8,
        operands: Vec<Operand>,
        /// True for `.rel` control-flow variants, whose sole operand (index
        /// 0) is encoded as a displacement rather than an absolute address
        /// (§4.5, §4.8 "Relative operands").
        relative: bool,
    },
    Db(Vec<Expr>),
    Da(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub struct SizedLine {
    pub pos: Pos,
    pub offset: usize,
    pub stmt: Option<SizedStmt>,
}

pub struct Pass1Result {
    pub symbols: HashMap<String, i128>,
    pub lines: Vec<SizedLine>,
    pub image_size: usize,
}

/// Find the unique instruction variant matching `mnemonic` whose
/// operand-class tuple matches the *shape* of the parsed operands (each
/// position is a register iff the parsed operand is a register) — suffixes
/// are already folded into `mnemonic` by the lexer, so this only needs to
/// disambiguate the handful of mnemonics overloaded on operand shape (the
/// arithmetic/shift/compare register-vs-immediate pairs, `seek`).
fn resolve_opcode<'a>(
    table: &'a InstrTable,
    mnemonic: &str,
    operands: &[Operand],
    pos: Pos,
) -> AsmResult<(&'a InstrDef, bool)> {
    let candidates: Vec<&InstrDef> = table
        .variants_of(mnemonic)
        .into_iter()
        .filter(|def| {
            def.operands.len() == operands.len()
                && def.operands.iter().zip(operands.iter()).all(|(class, operand)| {
                    matches!(class, OperandClass::Reg) == matches!(operand, Operand::Register(_))
                })
        })
        .collect();

    match candidates.len() {
        0 => Err(AsmError::Syntax {
            pos,
            message: format!("no variant of `{mnemonic}` accepts the given operands"),
        }),
        1 => {
            let def = candidates[0];
            let relative = matches!(
                def.action,
                Action::Jump(_, true) | Action::Call(true) | Action::Loop(true)
            );
            Ok((def, relative))
        }
        _ => Err(AsmError::AmbiguousInstruction {
            pos,
            mnemonic: mnemonic.to_string(),
        }),
    }
}

pub fn pass1(
    parsed: &[(Pos, ParsedLine)],
    word_size: usize,
    addr_size: usize,
    table: &InstrTable,
) -> AsmResult<Pass1Result> {
    let mut symbols: HashMap<String, i128> = HashMap::new();
    let mut first_def: HashMap<String, Pos> = HashMap::new();
    let mut offset: usize = 0;
    let mut lines = Vec::with_capacity(parsed.len());

    for (pos, line) in parsed {
        if let Some(label) = &line.label {
            if let Some(&first) = first_def.get(label) {
                return Err(AsmError::RedefinedSymbol {
                    pos: *pos,
                    name: label.clone(),
                    first,
                });
            }
            symbols.insert(label.clone(), offset as i128);
            first_def.insert(label.clone(), *pos);
        }

        let start_offset = offset;
        let sized_stmt = match &line.stmt {
            None => None,
            Some(Stmt::ConstDef { name, expr }) => {
                if let Some(&first) = first_def.get(name) {
                    return Err(AsmError::RedefinedSymbol {
                        pos: *pos,
                        name: name.clone(),
                        first,
                    });
                }
                let value = eval(expr, &symbols, word_size, addr_size, *pos)?;
                symbols.insert(name.clone(), value);
                first_def.insert(name.clone(), *pos);
                None
            }
            Some(Stmt::Directive(Directive::Db(exprs))) => {
                offset += exprs.len();
                Some(SizedStmt::Db(exprs.clone()))
            }
            Some(Stmt::Directive(Directive::Da(exprs))) => {
                offset += exprs.len() * addr_size;
                Some(SizedStmt::Da(exprs.clone()))
            }
            Some(Stmt::Instruction { mnemonic, operands }) => {
                let (def, relative) = resolve_opcode(table, mnemonic, operands, *pos)?;
                offset += encoded_len(def, word_size, addr_size);
                Some(SizedStmt::Instruction {
                    opcode: def.opcode,
                    operands: operands.clone(),
                    relative,
                })
            }
        };

        lines.push(SizedLine {
            pos: *pos,
            offset: start_offset,
            stmt: sized_stmt,
        });
    }

    Ok(Pass1Result {
        symbols,
        lines,
        image_size: offset,
    })
}
