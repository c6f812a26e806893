//! Per-line tokeniser/parser (§4.8). Evil VM's assembly syntax is strictly
//! line-oriented (no statement ever spans a newline), so rather than
//! running one chumsky parser over the whole file with explicit newline
//! tokens, each line is parsed independently with its own span, using the
//! `text::ident`/`just`/`choice`/`.padded()` combinator style common to
//! chumsky-based line grammars, applied here to the mnemonic/operand/
//! directive grammar of §4.8.

use chumsky::prelude::*;

use crate::asm::ast::{Directive, Operand, ParsedLine, Stmt};
use crate::asm::expr::{BinOp, Expr, SizeOfClass, UnOp};
use crate::error::{AsmError, AsmResult, Pos};
use crate::registers::RegId;

fn digits_with_separators(pred: fn(char) -> bool) -> impl Parser<char, String, Error = Simple<char>> {
    filter(move |c: &char| pred(*c) || *c == '_')
        .repeated()
        .at_least(1)
        .collect::<String>()
        .map(|s| s.chars().filter(|c| *c != '_').collect())
}

fn number_literal() -> impl Parser<char, i128, Error = Simple<char>> {
    let hex = just('0')
        .then(just('x').or(just('X')))
        .ignore_then(digits_with_separators(|c| c.is_ascii_hexdigit()))
        .try_map(|s, span| {
            i128::from_str_radix(&s, 16).map_err(|e| Simple::custom(span, e.to_string()))
        });
    let bin = just('0')
        .then(just('b').or(just('B')))
        .ignore_then(digits_with_separators(|c| c == '0' || c == '1'))
        .try_map(|s, span| {
            i128::from_str_radix(&s, 2).map_err(|e| Simple::custom(span, e.to_string()))
        });
    let dec = digits_with_separators(|c| c.is_ascii_digit()).try_map(|s, span| {
        s.parse::<i128>().map_err(|e| Simple::custom(span, e.to_string()))
    });
    let char_lit = just('\'').ignore_then(none_of('\'')).then_ignore(just('\'')).map(|c: char| c as i128);
    choice((hex, bin, char_lit, dec))
}

fn register() -> impl Parser<char, RegId, Error = Simple<char>> {
    text::ident().try_map(|s: String, span| {
        RegId::parse(&s).ok_or_else(|| Simple::custom(span, format!("`{s}` is not a register")))
    })
}

fn expr_parser() -> impl Parser<char, Expr, Error = Simple<char>> {
    recursive(|expr| {
        let sizeof = text::keyword("sizeof")
            .padded()
            .ignore_then(
                choice((
                    text::keyword("byte").to(SizeOfClass::Byte),
                    text::keyword("word").to(SizeOfClass::Word),
                    text::keyword("addr").to(SizeOfClass::Addr),
                ))
                .padded()
                .delimited_by(just('('), just(')')),
            )
            .map(Expr::SizeOf);

        let parenthesised = expr.clone().padded().delimited_by(just('('), just(')'));

        let atom = choice((
            number_literal().map(Expr::Number),
            sizeof,
            parenthesised,
            text::ident().map(Expr::Symbol),
        ))
        .padded();

        let unary = recursive(|unary| {
            choice((
                just('~').padded().ignore_then(unary.clone()).map(|e| Expr::Unary(UnOp::Not, Box::new(e))),
                just('-').padded().ignore_then(unary).map(|e| Expr::Unary(UnOp::Neg, Box::new(e))),
                atom.clone(),
            ))
        });

        fn fold_left(first: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
            rest.into_iter()
                .fold(first, |acc, (op, rhs)| Expr::Binary(op, Box::new(acc), Box::new(rhs)))
        }

        let mul = unary
            .clone()
            .then(
                choice((
                    just('*').to(BinOp::Mul),
                    just('/').to(BinOp::Div),
                    just('%').to(BinOp::Mod),
                ))
                .padded()
                .then(unary)
                .repeated(),
            )
            .map(|(first, rest)| fold_left(first, rest));

        let add = mul
            .clone()
            .then(
                choice((just('+').to(BinOp::Add), just('-').to(BinOp::Sub)))
                    .padded()
                    .then(mul)
                    .repeated(),
            )
            .map(|(first, rest)| fold_left(first, rest));

        let shift = add
            .clone()
            .then(
                choice((just("<<").to(BinOp::Shl), just(">>").to(BinOp::Shr)))
                    .padded()
                    .then(add)
                    .repeated(),
            )
            .map(|(first, rest)| fold_left(first, rest));

        let band = shift
            .clone()
            .then(just('&').padded().to(BinOp::And).then(shift).repeated())
            .map(|(first, rest)| fold_left(first, rest));

        let bxor = band
            .clone()
            .then(just('^').padded().to(BinOp::Xor).then(band).repeated())
            .map(|(first, rest)| fold_left(first, rest));

        bxor.clone()
            .then(just('|').padded().to(BinOp::Or).then(bxor).repeated())
            .map(|(first, rest)| fold_left(first, rest))
    })
}

fn operand() -> impl Parser<char, Operand, Error = Simple<char>> {
    register().map(Operand::Register).or(expr_parser().map(Operand::Value))
}

fn mnemonic() -> impl Parser<char, String, Error = Simple<char>> {
    text::ident()
        .then(just('.').ignore_then(text::ident()).or_not())
        .map(|(base, suffix)| match suffix {
            Some(s) => format!("{base}.{s}"),
            None => base,
        })
}

fn instruction() -> impl Parser<char, Stmt, Error = Simple<char>> {
    mnemonic()
        .then(
            operand()
                .padded()
                .separated_by(just(','))
                .at_most(3),
        )
        .map(|(mnemonic, operands)| Stmt::Instruction { mnemonic, operands })
}

fn const_def() -> impl Parser<char, Stmt, Error = Simple<char>> {
    text::ident()
        .padded()
        .then_ignore(just('='))
        .padded()
        .then(expr_parser())
        .map(|(name, expr)| Stmt::ConstDef { name, expr })
}

fn directive() -> impl Parser<char, Stmt, Error = Simple<char>> {
    choice((text::keyword("db").to(false), text::keyword("da").to(true)))
        .padded()
        .then(expr_parser().padded().separated_by(just(',')).at_least(1))
        .map(|(is_da, exprs)| {
            Stmt::Directive(if is_da { Directive::Da(exprs) } else { Directive::Db(exprs) })
        })
}

fn label() -> impl Parser<char, String, Error = Simple<char>> {
    text::ident().then_ignore(just(':'))
}

fn comment() -> impl Parser<char, (), Error = Simple<char>> {
    just(';').then(none_of('\n').repeated()).ignored()
}

fn line() -> impl Parser<char, ParsedLine, Error = Simple<char>> {
    label()
        .padded()
        .or_not()
        .then(choice((const_def(), directive(), instruction())).or_not())
        .then_ignore(comment().or_not())
        .padded()
        .then_ignore(end())
        .map(|(label, stmt)| ParsedLine { label, stmt })
}

/// Parse one already-trimmed-of-newline source line. `line_no` is 1-based,
/// used only to annotate a syntax error's position.
pub fn parse_line(line_no: usize, text: &str) -> AsmResult<ParsedLine> {
    line().parse(text).map_err(|errs| {
        let first = errs.into_iter().next();
        let col = first.as_ref().map(|e| e.span().start + 1).unwrap_or(1);
        let message = first.map(|e| e.to_string()).unwrap_or_else(|| "could not parse line".into());
        AsmError::Syntax {
            pos: Pos { line: line_no, col },
            message,
        }
    })
}
