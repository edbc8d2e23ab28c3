//! Code generation (the second assembler pass).
//!
//! Pass 2 walks a resolved [`Section`] in statement order, resolving each instruction's
//! addressing flags and computing the object code of every instruction and directive.
//! Fields that only a linker can fill (format 4 addresses, `WORD A-B`) are left zero
//! and recorded as [`Modification`]s.

use crate::ast::{Directive, Literal, Modification, Nixbpe, Operand, Operator, Record, Reg, Sign, Statement, Target};
use crate::inst::{InstSpec, InstTable};
use crate::parse::lex::WORD_MAX;
use crate::parse::ParseErr;

use super::label::LabelTable;
use super::{AsmErr, AsmErrKind, Section};

/// Range of displacements reachable with PC-relative addressing.
const PC_RANGE: std::ops::RangeInclusive<i64> = -2048..=2047;
/// Range of displacements reachable with base-relative addressing.
const BASE_RANGE: std::ops::RangeInclusive<i64> = 0..=4095;

impl Section {
    /// Generates the object code for every statement in this section.
    ///
    /// This performs the second assembler pass, and must be called after [`Section::resolve`].
    /// Diagnostics are appended to `diags`.
    pub fn generate(&mut self, table: &InstTable, diags: &mut Vec<AsmErr>) {
        let Section { symbols, literals, externals, stmts, modifications, length, .. } = self;

        let mut codegen = CodeGen {
            table,
            symbols,
            literals,
            externals,
            base: None,
            modifications,
            diags,
        };

        *length = 0;
        for stmt in stmts.iter_mut() {
            codegen.encode(stmt);
            *length += stmt.len;

            if !stmt.code.is_empty() {
                tracing::trace!(line = stmt.line, addr = stmt.addr, code = %stmt.code_hex(), "encoded {}", stmt.operator);
            }
        }

        tracing::debug!(section = %self.name, length = self.length, "generated section");
    }
}

struct CodeGen<'a> {
    table: &'a InstTable,
    symbols: &'a LabelTable,
    literals: &'a LabelTable,
    externals: &'a [String],
    // The value of the base register, if declared.
    base: Option<u32>,
    modifications: &'a mut Vec<Modification>,
    diags: &'a mut Vec<AsmErr>,
}

impl CodeGen<'_> {
    fn report(&mut self, kind: AsmErrKind, line: usize) {
        self.diags.push(AsmErr::new(kind, line));
    }

    /// Looks up a name, in the symbol table and then in the literal table.
    fn lookup(&self, name: &str) -> Option<u32> {
        self.symbols.lookup(name)
            .or_else(|| self.literals.lookup(name))
    }

    fn is_external(&self, name: &str) -> bool {
        self.externals.iter().any(|e| e == name) && !self.symbols.contains(name)
    }

    fn modify(&mut self, addr: u32, half_bytes: u8, sign: Sign, symbol: &str) {
        self.modifications.push(Modification { addr, half_bytes, sign, symbol: symbol.to_string() });
    }

    fn encode(&mut self, stmt: &mut Statement) {
        match stmt.operator.clone() {
            Operator::Instr { mnemonic, extended } => {
                let Some(spec) = self.table.get(&mnemonic) else { return };
                self.check_operand_count(stmt, spec);
                stmt.code = match stmt.len {
                    1 => vec![spec.opcode],
                    2 => self.encode_format2(stmt, spec),
                    3 => self.encode_format3(stmt, spec),
                    _ if extended => self.encode_format4(stmt, spec),
                    _ => vec![],
                };
                stmt.record = Some(Record::Text);
            },
            Operator::Directive(d) => self.encode_directive(stmt, d),
            Operator::Unknown(_) => {},
        }
    }

    fn check_operand_count(&mut self, stmt: &Statement, spec: &InstSpec) {
        let mut found = stmt.operands.len();
        if spec.format == 3 && found > 1 && is_index_reg(stmt.operands.last()) {
            found -= 1;
        }

        if found != spec.operand_count {
            self.report(AsmErrKind::OperandCount { expected: spec.operand_count, found }, stmt.line);
        }
    }

    fn encode_format2(&mut self, stmt: &Statement, spec: &InstSpec) -> Vec<u8> {
        let mut fields = [0u8; 2];
        for (field, op) in std::iter::zip(&mut fields, &stmt.operands) {
            *field = match op {
                Operand::Symbol(s) => match s.parse::<Reg>() {
                    Ok(r) => r.reg_no(),
                    Err(()) => {
                        self.report(AsmErrKind::MalformedLine(ParseErr::UnexpectedOperand(s.clone())), stmt.line);
                        0
                    }
                },
                Operand::Number(n) => {
                    // Shift counts are stored as n - 1.
                    let is_shift = matches!(&stmt.operator, Operator::Instr { mnemonic, .. } if mnemonic.starts_with("SHIFT"));
                    let value = if is_shift { n.saturating_sub(1) } else { *n };
                    if !(0..=0xF).contains(&value) {
                        self.report(AsmErrKind::ValueOutOfRange(op.to_string()), stmt.line);
                    }
                    value as u8
                },
                op => {
                    self.report(AsmErrKind::MalformedLine(ParseErr::UnexpectedOperand(op.to_string())), stmt.line);
                    0
                }
            } & 0xF;
        }

        vec![spec.opcode, fields[0] << 4 | fields[1]]
    }

    /// Determines the `n`, `i`, and `x` flags from the operands.
    fn addressing_flags(stmt: &Statement) -> Nixbpe {
        let (n, i) = match stmt.operands.first() {
            Some(Operand::Immediate(_)) => (false, true),
            Some(Operand::Indirect(_))  => (true, false),
            _ => (true, true),
        };
        let x = stmt.operands.len() > 1 && is_index_reg(stmt.operands.get(1));

        Nixbpe { n, i, x, ..Default::default() }
    }

    fn encode_format3(&mut self, stmt: &mut Statement, spec: &InstSpec) -> Vec<u8> {
        let mut flags = Self::addressing_flags(stmt);
        let pc = stmt.end();

        let disp = match stmt.operands.first() {
            None => 0,
            Some(op) if direct_value(op).is_some() => {
                let value = direct_value(op).unwrap_or_default();
                if !BASE_RANGE.contains(&value) {
                    self.report(AsmErrKind::DisplacementOutOfRange(op.to_string()), stmt.line);
                }
                value
            },
            Some(op) => {
                let name = op.lookup_name().unwrap_or_default();

                if self.is_external(&name) {
                    self.report(AsmErrKind::ExternalInShortForm(name), stmt.line);
                    0
                } else if let Some(target) = self.lookup(&name) {
                    let pc_disp = i64::from(target) - i64::from(pc);
                    let base_disp = self.base.map(|b| i64::from(target) - i64::from(b));

                    match base_disp {
                        _ if PC_RANGE.contains(&pc_disp) => {
                            flags.p = true;
                            pc_disp
                        },
                        Some(d) if BASE_RANGE.contains(&d) => {
                            flags.b = true;
                            d
                        },
                        _ => {
                            self.report(AsmErrKind::DisplacementOutOfRange(name), stmt.line);
                            flags.p = true;
                            pc_disp
                        }
                    }
                } else {
                    self.report(AsmErrKind::UnresolvedReference(name), stmt.line);
                    flags.p = true;
                    0
                }
            }
        };

        stmt.flags = flags;
        let word = u32::from(spec.opcode) << 16 | flags.bits() << 12 | (disp as u32 & 0xFFF);
        word.to_be_bytes()[1..].to_vec()
    }

    fn encode_format4(&mut self, stmt: &mut Statement, spec: &InstSpec) -> Vec<u8> {
        let flags = Nixbpe { e: true, ..Self::addressing_flags(stmt) };

        let addr = match stmt.operands.first() {
            Some(op) if direct_value(op).is_some() => direct_value(op).unwrap_or_default() as u32,
            Some(op) => {
                let name = op.lookup_name().unwrap_or_default();
                if !self.is_external(&name) && self.lookup(&name).is_none() {
                    self.report(AsmErrKind::UnresolvedReference(name.clone()), stmt.line);
                }
                self.modify(stmt.addr + 1, 5, Sign::Plus, &name);
                0
            },
            None => 0,
        };

        stmt.flags = flags;
        let word = u32::from(spec.opcode) << 24 | flags.bits() << 20 | (addr & 0xF_FFFF);
        word.to_be_bytes().to_vec()
    }

    fn encode_directive(&mut self, stmt: &mut Statement, d: Directive) {
        match d {
            Directive::Start | Directive::Csect => {
                let name = stmt.label.clone().unwrap_or_default();
                stmt.record = Some(Record::Header { name, start: stmt.addr });
            },
            Directive::Extdef => {
                let defs = stmt.operands.iter()
                    .filter_map(|op| op.symbol())
                    .map(|name| {
                        let addr = self.symbols.lookup(name).unwrap_or_else(|| {
                            self.report(AsmErrKind::UnresolvedReference(name.to_string()), stmt.line);
                            0
                        });
                        (name.to_string(), addr)
                    })
                    .collect();
                stmt.record = Some(Record::Define(defs));
            },
            Directive::Extref => {
                let refs = stmt.operands.iter()
                    .filter_map(|op| op.symbol())
                    .map(str::to_string)
                    .collect();
                stmt.record = Some(Record::Refer(refs));
            },
            Directive::Byte => {
                if let [Operand::Const(c)] = &stmt.operands[..] {
                    stmt.code = c.bytes();
                    stmt.record = Some(Record::Text);
                }
            },
            Directive::Word => {
                let value = match &stmt.operands[..] {
                    [Operand::Number(n)] => *n as u32 & WORD_MAX,
                    [Operand::Symbol(s)] if self.is_external(s) => {
                        self.modify(stmt.addr, 6, Sign::Plus, s);
                        0
                    },
                    [Operand::Symbol(s)] => self.symbols.lookup(s).unwrap_or_else(|| {
                        self.report(AsmErrKind::UnresolvedReference(s.clone()), stmt.line);
                        0
                    }),
                    [Operand::Difference(a, b)] => {
                        self.modify(stmt.addr, 6, Sign::Plus, a);
                        self.modify(stmt.addr, 6, Sign::Minus, b);
                        0
                    },
                    _ => 0,
                };
                stmt.code = value.to_be_bytes()[1..].to_vec();
                stmt.record = Some(Record::Text);
            },
            Directive::Ltorg | Directive::End => {
                stmt.code = self.literal_pool(stmt.addr..stmt.end());
                if !stmt.code.is_empty() {
                    stmt.record = Some(Record::Text);
                }
            },
            Directive::Base => {
                self.base = match stmt.operands.first() {
                    Some(Operand::Number(n)) => Some(*n as u32),
                    Some(op) => {
                        let name = op.to_string();
                        let addr = self.lookup(&name);
                        if addr.is_none() {
                            self.report(AsmErrKind::UnresolvedReference(name), stmt.line);
                        }
                        addr
                    },
                    None => None,
                };
            },
            Directive::Nobase => self.base = None,
            Directive::Resb | Directive::Resw | Directive::Equ => {},
        }
    }

    /// Renders the literals placed in the given address range, in table order.
    fn literal_pool(&self, range: std::ops::Range<u32>) -> Vec<u8> {
        self.literals.iter()
            .filter(|(_, addr)| addr.is_some_and(|a| range.contains(&a)))
            .filter_map(|(name, _)| name.parse::<Literal>().ok())
            .flat_map(|lit| lit.bytes())
            .collect()
    }
}

/// The value of an operand that is a plain number (possibly immediate or indirect).
fn direct_value(op: &Operand) -> Option<i64> {
    match op {
        Operand::Number(n) => Some(i64::from(*n)),
        Operand::Immediate(Target::Number(n)) | Operand::Indirect(Target::Number(n)) => Some(i64::from(*n)),
        _ => None,
    }
}

fn is_index_reg(op: Option<&Operand>) -> bool {
    matches!(op, Some(Operand::Symbol(s)) if s == "X")
}

#[cfg(test)]
mod tests {
    use crate::ast::{Modification, Nixbpe, Record, Sign};
    use crate::asm::{AsmErr, AsmErrKind, Section};
    use crate::inst::InstTable;

    fn table() -> InstTable {
        "\
LDA\t00\t3\t1
STA\t0C\t3\t1
LDT\t74\t3\t1
STL\t14\t3\t1
JSUB\t48\t3\t1
J\t3C\t3\t1
LDCH\t50\t3\t1
RSUB\t4C\t3\t0
CLEAR\tB4\t2\t1
COMPR\tA0\t2\t2
SHIFTL\tA4\t2\t2
SVC\tB0\t2\t1
FIX\tC4\t1\t0
".parse().unwrap()
    }
    fn assemble_section(src: &str) -> (Section, Vec<AsmErr>) {
        let table = table();
        let mut diags = vec![];
        let lines = src.lines().enumerate().map(|(i, l)| (i + 1, l));
        let mut section = Section::resolve(lines, &table, &mut diags);
        section.generate(&table, &mut diags);
        (section, diags)
    }
    fn codes(section: &Section) -> Vec<String> {
        section.stmts.iter().map(|s| s.code_hex()).collect()
    }
    fn kinds(diags: &[AsmErr]) -> Vec<AsmErrKind> {
        diags.iter().map(|d| d.kind.clone()).collect()
    }

    #[test]
    fn test_immediate_number() {
        let (section, diags) = assemble_section("FIRST\tSTART\t0\t\n\tLDA\t#5\t");
        assert!(diags.is_empty(), "{diags:?}");

        let lda = &section.stmts[1];
        assert_eq!(lda.len, 3);
        assert_eq!(lda.flags, Nixbpe { i: true, ..Default::default() });
        assert_eq!(lda.code, [0x01, 0x00, 0x05]);
    }

    #[test]
    fn test_pc_relative() {
        let src = "\
PROG\tSTART\t0
FIRST\tSTL\tRETADR
\tJ\t@RETADR
\tLDA\t#RETADR
\tLDCH\tBUF,X
\tJ\tFIRST
RETADR\tRESW\t1
BUF\tRESB\t3";
        let (section, diags) = assemble_section(src);
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(codes(&section)[1..6], [
            "17200C", // STL RETADR: disp = 0x0F - 0x03
            "3E2009", // J @RETADR: n only
            "012006", // LDA #RETADR: i only
            "53A006", // LDCH BUF,X: indexed
            "3F2FF1", // J FIRST: negative disp = 0x00 - 0x0F
        ]);
        assert!(section.stmts[1].flags.p && !section.stmts[1].flags.b);
    }

    #[test]
    fn test_base_relative() {
        let src = "\
PROG\tSTART\t0
\tBASE\tFAR
\tLDA\tFAR
\tRESB\t4000
FAR\tRESW\t1
\tNOBASE
\tLDA\tFAR";
        let (section, diags) = assemble_section(src);
        // FAR is at 0xFA3; PC after the first LDA is 3
        assert_eq!(section.stmts[2].code_hex(), "034000");
        assert!(section.stmts[2].flags.b && !section.stmts[2].flags.p);

        // after NOBASE, FAR is within PC range of the second LDA (PC = 0xFA9)
        assert_eq!(section.stmts[6].code_hex(), "032FFA");
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn test_out_of_range() {
        let src = "\
PROG\tSTART\t0
\tLDA\tFAR
\tRESB\t5000
FAR\tRESW\t1";
        let (section, diags) = assemble_section(src);
        assert_eq!(kinds(&diags), [AsmErrKind::DisplacementOutOfRange("FAR".into())]);
        // masked to 12 bits: 0x138B - 3
        assert_eq!(section.stmts[1].code_hex(), "032388");
    }

    #[test]
    fn test_extended() {
        let src = "\
PROG\tSTART\t0
\tEXTREF\tRDREC
\t+JSUB\tRDREC
\t+LDT\t#4096
\t+LDA\tVALUE,X
VALUE\tRESW\t1";
        let (section, diags) = assemble_section(src);
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(codes(&section)[2..5], ["4B100000", "75101000", "03900000"]);
        assert!(section.stmts[2].flags.e);
        assert_eq!(section.modifications, [
            Modification { addr: 0x01, half_bytes: 5, sign: Sign::Plus, symbol: "RDREC".into() },
            Modification { addr: 0x09, half_bytes: 5, sign: Sign::Plus, symbol: "VALUE".into() },
        ]);
    }

    #[test]
    fn test_format_1_2() {
        let src = "\
PROG\tSTART\t0
\tFIX
\tCLEAR\tX
\tCOMPR\tA,S
\tSHIFTL\tT,4
\tSVC\t2";
        let (section, diags) = assemble_section(src);
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(codes(&section)[1..], ["C4", "B410", "A004", "A453", "B020"]);
        assert_eq!(section.stmts[2].flags, Nixbpe::default());
    }

    #[test]
    fn test_format_2_field_range() {
        let src = "\
PROG\tSTART\t0
\tSHIFTL\tT,16
\tSHIFTL\tT,0
\tSVC\t15
\tSVC\t20";
        let (section, diags) = assemble_section(src);
        assert_eq!(kinds(&diags), [
            AsmErrKind::ValueOutOfRange("0".into()),
            AsmErrKind::ValueOutOfRange("20".into()),
        ]);
        assert_eq!(diags[0].line, 3);
        assert_eq!(codes(&section)[1..], ["A45F", "A45F", "B0F0", "B040"]);
    }

    #[test]
    fn test_rsub() {
        let (section, diags) = assemble_section("PROG\tSTART\t0\n\tRSUB");
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(section.stmts[1].code_hex(), "4F0000");
        assert!(!section.stmts[1].flags.p);
    }

    #[test]
    fn test_data_directives() {
        let src = "\
PROG\tSTART\t0
\tEXTREF\tBUFEND,BUFFER
PRE\tRESB\t6
ALPHA\tWORD\t10
NEG\tWORD\t-1
PTR\tWORD\tALPHA
LEN\tWORD\tBUFEND-BUFFER
EOF\tBYTE\tC'EOF'
DEV\tBYTE\tX'F1'";
        let (section, diags) = assemble_section(src);
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(codes(&section)[3..], ["00000A", "FFFFFF", "000006", "000000", "454F46", "F1"]);
        assert_eq!(section.stmts[3].addr, 6);
        assert_eq!(section.modifications, [
            Modification { addr: 0x0F, half_bytes: 6, sign: Sign::Plus, symbol: "BUFEND".into() },
            Modification { addr: 0x0F, half_bytes: 6, sign: Sign::Minus, symbol: "BUFFER".into() },
        ]);
        assert_eq!(section.length, 0x16);
    }

    #[test]
    fn test_records() {
        let src = "\
COPY\tSTART\t0
\tEXTDEF\tBUFFER,LENGTH
\tEXTREF\tRDREC,WRREC
LENGTH\tRESW\t1
BUFFER\tRESB\t4096";
        let (section, diags) = assemble_section(src);
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(section.stmts[0].record, Some(Record::Header { name: "COPY".into(), start: 0 }));
        assert_eq!(section.stmts[1].record, Some(Record::Define(vec![("BUFFER".into(), 3), ("LENGTH".into(), 0)])));
        assert_eq!(section.stmts[2].record, Some(Record::Refer(vec!["RDREC".into(), "WRREC".into()])));
        assert_eq!(section.stmts[3].record, None);
        assert_eq!(section.length, 3 + 4096);
    }

    #[test]
    fn test_literal_pool_code() {
        let src = "\
PROG\tSTART\t0
\tLDA\t=C'EOF'
\tLTORG
\tLDA\t=X'05'
\tLDT\t=3
\tEND";
        let (section, diags) = assemble_section(src);
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(codes(&section), ["", "032000", "454F46", "032003", "772001", "05000003"]);
        assert_eq!(section.stmts[5].record, Some(Record::Text));
    }

    #[test]
    fn test_hex_word_literal() {
        let src = "\
PROG\tSTART\t0
\tLDA\t=10
\tEND";
        let (section, diags) = assemble_section(src);
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(section.literals.lookup("=10"), Some(3));
        assert_eq!(codes(&section)[1..], ["032000", "000010"]);
    }

    #[test]
    fn test_diagnostics() {
        let src = "\
PROG\tSTART\t0
\tEXTREF\tEXT
\tLDA\tNOWHERE
\tLDA\tEXT
\tLDA\tA,B
\tRSUB\tA";
        let (section, diags) = assemble_section(src);
        assert_eq!(kinds(&diags), [
            AsmErrKind::UnresolvedReference("NOWHERE".into()),
            AsmErrKind::ExternalInShortForm("EXT".into()),
            AsmErrKind::OperandCount { expected: 1, found: 2 },
            AsmErrKind::UnresolvedReference("A".into()),
            AsmErrKind::OperandCount { expected: 0, found: 1 },
            AsmErrKind::UnresolvedReference("A".into()),
        ]);

        // unresolved: best-effort PC-relative with a zero displacement
        assert_eq!(section.stmts[2].code_hex(), "032000");
        // external: no PC-relative addressing
        assert_eq!(section.stmts[3].code_hex(), "030000");
    }
}
