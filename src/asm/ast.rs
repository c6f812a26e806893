//! Parsed-line AST (§4.8 syntax block): one [`ParsedLine`] per source line,
//! holding an optional label and an optional statement body.

use crate::asm::expr::Expr;
use crate::registers::RegId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Register(RegId),
    Value(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Db(Vec<Expr>),
    Da(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Instruction { mnemonic: String, operands: Vec<Operand> },
    Directive(Directive),
    ConstDef { name: String, expr: Expr },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLine {
    pub label: Option<String>,
    pub stmt: Option<Stmt>,
}
