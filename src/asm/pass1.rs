//! Address resolution (the first assembler pass).
//!
//! Pass 1 turns the raw lines of one control section into [`Statement`]s, assigning
//! each its address and byte length, and builds the section's symbol table and literal pool.

use std::collections::HashMap;

use crate::ast::{Directive, Literal, Operand, Operator, Statement};
use crate::inst::InstTable;
use crate::parse::lex::WORD_MAX;
use crate::parse::{parse_operands, parse_operator, ParseErr, SourceLine};

use super::label::LabelTable;
use super::{AsmErr, AsmErrKind, Section, MEMORY_SIZE};

impl Section {
    /// Creates a new section.
    ///
    /// This performs the first assembler pass over the lines of one control section
    /// (each paired with its 1-based source line number), computing the address and length
    /// of every statement. Diagnostics are appended to `diags`.
    ///
    /// ## Example
    /// ```
    /// use sicxe_asm::asm::Section;
    /// use sicxe_asm::inst::InstTable;
    ///
    /// let table: InstTable = "LDA\t00\t3\t1\nSTA\t0C\t3\t1\n".parse().unwrap();
    /// let src = [
    ///     (1, "PROG\tSTART\t0"),
    ///     (2, "FIRST\tLDA\t=C'EOF'"),
    ///     (3, "\tSTA\tRESULT"),
    ///     (4, "RESULT\tRESW\t1"),
    ///     (5, "\tEND\tFIRST"),
    /// ];
    ///
    /// let mut diags = vec![];
    /// let section = Section::resolve(src, &table, &mut diags);
    /// assert!(diags.is_empty());
    /// assert_eq!(section.symbols.lookup("RESULT"), Some(6));
    /// assert_eq!(section.literals.lookup("=C'EOF'"), Some(9));
    /// ```
    pub fn resolve<'s>(
        lines: impl IntoIterator<Item=(usize, &'s str)>,
        table: &InstTable,
        diags: &mut Vec<AsmErr>
    ) -> Self {
        let mut section = Section::default();
        // The location counter.
        let mut lc: u32 = 0;
        // Where each literal was first referenced.
        let mut literal_uses: HashMap<String, usize> = HashMap::new();

        for (lno, line) in lines {
            let src = match SourceLine::parse(line) {
                Ok(Some(src)) => src,
                Ok(None) => continue,
                Err(e) => {
                    diags.push(AsmErr::new(AsmErrKind::MalformedLine(e), lno));
                    continue;
                }
            };

            let operator = parse_operator(src.operator, table);
            let operands = match src.operands.map(parse_operands).transpose() {
                Ok(ops) => ops.unwrap_or_default(),
                Err(e) => {
                    let kind = match e.is_numeric() && takes_numeric_operand(&operator) {
                        true  => AsmErrKind::NumericParseFailure(src.operands.unwrap_or_default().to_string()),
                        false => AsmErrKind::MalformedLine(e),
                    };
                    diags.push(AsmErr::new(kind, lno));
                    continue;
                }
            };

            let mut stmt = Statement::new(
                lno,
                src.label.map(str::to_string),
                operator,
                operands,
                src.comment.map(str::to_string),
                lc
            );

            if let Some(Directive::Start | Directive::Csect) = stmt.operator.directive() {
                section.name = stmt.label.clone().unwrap_or_default();
                lc = 0;
                stmt.addr = 0;
                tracing::debug!(section = %section.name, "opened section");
            }

            stmt.len = match stmt_len(&stmt, table) {
                Ok(len) => len,
                Err(kind) => {
                    diags.push(AsmErr::new(kind, lno));
                    continue;
                }
            };
            if advance(lc, stmt.len).is_none() {
                diags.push(AsmErr::new(AsmErrKind::AddressOverflow, lno));
                continue;
            }
            if let Operator::Unknown(op) = &stmt.operator {
                diags.push(AsmErr::new(AsmErrKind::UnknownMnemonic(op.clone()), lno));
            }

            let mut labeled = false;
            if let Some(label) = &stmt.label {
                match section.symbols.insert(label, lc) {
                    Ok(()) => labeled = true,
                    Err(_) => diags.push(AsmErr::new(AsmErrKind::DuplicateSymbol(label.clone()), lno)),
                }
            }

            if let Some(lit) = stmt.operands.iter().find_map(|op| match op {
                Operand::Literal(lit) => Some(lit.to_string()),
                _ => None
            }) {
                if !section.literals.contains(&lit) {
                    // Just checked that it is not present.
                    let _ = section.literals.declare_pending(&lit);
                    literal_uses.insert(lit, lno);
                }
            }

            match stmt.operator.directive() {
                Some(Directive::Extref) => {
                    section.externals.extend(stmt.operands.iter().filter_map(|op| op.symbol().map(str::to_string)));
                },
                Some(Directive::Equ) if labeled => {
                    if let Some(label) = &stmt.label {
                        if let Err(kind) = resolve_equ(&mut section.symbols, label, &stmt.operands) {
                            diags.push(AsmErr::new(kind, lno));
                        }
                    }
                },
                Some(d) if d.flushes_literals() => {
                    stmt.len = flush_literals(&mut section.literals, lc);
                },
                _ => {}
            }

            // A literal pool is only sized at its flush.
            let Some(next) = advance(lc, stmt.len) else {
                diags.push(AsmErr::new(AsmErrKind::AddressOverflow, lno));
                continue;
            };

            tracing::trace!(line = lno, addr = lc, len = stmt.len, "located {}", stmt.operator);
            lc = next;
            section.stmts.push(stmt);
        }

        for lit in section.literals.pending() {
            let line = literal_uses.get(lit).copied().unwrap_or_default();
            diags.push(AsmErr::new(AsmErrKind::UnplacedLiteral(lit.to_string()), line));
        }

        section
    }
}

/// The location counter after `len` more bytes, if it is still within memory.
fn advance(lc: u32, len: u32) -> Option<u32> {
    lc.checked_add(len).filter(|&end| end <= MEMORY_SIZE)
}

fn takes_numeric_operand(op: &Operator) -> bool {
    matches!(
        op.directive(),
        Some(Directive::Byte | Directive::Word | Directive::Resb | Directive::Resw)
    )
}

/// Computes the byte length of a statement (excluding literal pools, which are computed at the flush).
fn stmt_len(stmt: &Statement, table: &InstTable) -> Result<u32, AsmErrKind> {
    let numeric_err = || AsmErrKind::NumericParseFailure(
        stmt.operands.iter().map(|op| op.to_string()).collect::<Vec<_>>().join(",")
    );

    let len = match &stmt.operator {
        Operator::Instr { mnemonic, extended } => {
            let format = table.get(mnemonic).map_or(0, |spec| spec.format);
            u32::from(format) + u32::from(*extended)
        },
        Operator::Directive(Directive::Resw) => match stmt.operands[..] {
            [Operand::Number(n)] if n >= 0 => 3 * n as u32,
            _ => return Err(numeric_err()),
        },
        Operator::Directive(Directive::Resb) => match stmt.operands[..] {
            [Operand::Number(n)] if n >= 0 => n as u32,
            _ => return Err(numeric_err()),
        },
        Operator::Directive(Directive::Word) => match stmt.operands[..] {
            [Operand::Number(_) | Operand::Symbol(_) | Operand::Difference(..)] => 3,
            _ => return Err(numeric_err()),
        },
        Operator::Directive(Directive::Byte) => match &stmt.operands[..] {
            [Operand::Const(c)] => c.len(),
            _ => return Err(numeric_err()),
        },
        Operator::Directive(_) | Operator::Unknown(_) => 0,
    };

    Ok(len)
}

/// Sets an `EQU` label's value from its operand.
fn resolve_equ(symbols: &mut LabelTable, label: &str, operands: &[Operand]) -> Result<(), AsmErrKind> {
    let lookup = |name: &str| symbols.lookup(name)
        .ok_or_else(|| AsmErrKind::UnresolvedReference(name.to_string()));

    let value = match operands {
        [Operand::Here] => return Ok(()),
        [Operand::Number(n)] => *n as u32 & WORD_MAX,
        [Operand::Symbol(s)] => lookup(s)?,
        [Operand::Difference(a, b)] => lookup(a)?.wrapping_sub(lookup(b)?) & WORD_MAX,
        ops => {
            let text = ops.iter().map(|op| op.to_string()).collect::<Vec<_>>().join(",");
            return Err(AsmErrKind::MalformedLine(ParseErr::UnexpectedOperand(text)));
        }
    };

    symbols.correct(label, value)
        .map_err(|_| AsmErrKind::UnresolvedReference(label.to_string()))
}

/// Places every pending literal at the flush point, returning the pool's total length.
fn flush_literals(literals: &mut LabelTable, flush_addr: u32) -> u32 {
    let pending: Vec<String> = literals.pending().map(str::to_string).collect();

    let mut offset = 0;
    for name in pending {
        let len = name.parse::<Literal>().map_or(0, |lit| lit.len());
        // Names came from the table.
        let _ = literals.correct(&name, flush_addr + offset);
        offset += len;
    }

    if offset > 0 {
        tracing::debug!(addr = flush_addr, len = offset, "flushed literal pool");
    }
    offset
}
