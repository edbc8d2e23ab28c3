//! Assembling SIC/XE source into object files.
//!
//! This module converts source text into an [`ObjectFile`], which can be written out
//! as object records (or as symbol and literal listings) via the [`encoding`] module.
//!
//! The assembler module notably consists of:
//! - [`assemble`] and [`Assembler`]: the entry points which assemble source text into an object file.
//! - [`Section`]: one control section, holding its statements, symbol table, and literal pool.
//!     Its first pass is [`Section::resolve`] and its second pass is [`Section::generate`].
//! - [`ObjectFile`]: the assembled sections, along with every diagnostic raised while assembling them.
//!
//! Diagnostics never stop assembly. A statement that cannot be assembled is skipped
//! (or encoded on a best-effort basis), and the problem is recorded on the [`ObjectFile`].

pub mod encoding;
pub mod label;
pub mod pass1;
pub mod pass2;

use crossbeam_channel as cbc;

use crate::ast::{Directive, Modification, Operand, Statement};
use crate::err::Severity;
use crate::inst::InstTable;
use crate::parse::{ParseErr, SourceLine};
use label::LabelTable;

/// Size of the SIC/XE address space, in bytes.
pub const MEMORY_SIZE: u32 = 1 << 20;

/// Assembles source text into an object file.
///
/// This assembles each control section sequentially.
/// See [`Assembler`] to configure the assembler.
///
/// # Example
/// ```
/// use sicxe_asm::asm::assemble;
/// use sicxe_asm::inst::InstTable;
///
/// let table: InstTable = "LDA\t00\t3\t1\n".parse().unwrap();
/// let src = "PROG\tSTART\t0\nFIRST\tLDA\t#5\n\tEND\tFIRST\n";
///
/// let obj = assemble(src, &table);
/// assert!(obj.diagnostics().is_empty());
/// assert_eq!(obj.sections()[0].stmts[1].code, [0x01, 0x00, 0x05]);
/// ```
pub fn assemble(src: &str, table: &InstTable) -> ObjectFile {
    Assembler::new(table).assemble(src)
}

/// Kinds of errors that can occur from assembling source text.
///
/// See [`AsmErr`] for this error type with line information included.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum AsmErrKind {
    /// Statement appears before the first `START`/`CSECT` (pass 1).
    OutsideSection,
    /// Line could not be split into fields or its operands could not be parsed (pass 1).
    MalformedLine(ParseErr),
    /// Operator is neither a known mnemonic nor a directive (pass 1).
    UnknownMnemonic(String),
    /// Label was already defined in this section (pass 1).
    DuplicateSymbol(String),
    /// Name is neither a symbol nor a literal of this section.
    UnresolvedReference(String),
    /// Operand of `RESW`, `RESB`, `BYTE`, or `WORD` is not a valid value (pass 1).
    NumericParseFailure(String),
    /// An external symbol was used by a 3-byte instruction (pass 2).
    ExternalInShortForm(String),
    /// Target cannot be reached with a 12-bit displacement (pass 2).
    DisplacementOutOfRange(String),
    /// Instruction has the wrong number of operands (pass 2).
    OperandCount {
        /// Number of operands the instruction takes.
        expected: usize,
        /// Number of operands given.
        found: usize
    },
    /// Literal was never placed by an `LTORG` or `END` (pass 1).
    UnplacedLiteral(String),
    /// Statement would extend past the end of the address space (pass 1).
    AddressOverflow,
    /// A value does not fit in the field it is encoded into.
    ValueOutOfRange(String),
}
impl AsmErrKind {
    /// How serious this diagnostic is.
    ///
    /// Errors mark statements that were skipped or whose object code is missing.
    /// Warnings mark statements that were encoded on a best-effort basis.
    pub fn severity(&self) -> Severity {
        match self {
            | Self::OutsideSection
            | Self::MalformedLine(_)
            | Self::DuplicateSymbol(_)
            | Self::NumericParseFailure(_)
            | Self::UnplacedLiteral(_)
            | Self::AddressOverflow
            => Severity::Error,

            | Self::UnknownMnemonic(_)
            | Self::UnresolvedReference(_)
            | Self::ExternalInShortForm(_)
            | Self::DisplacementOutOfRange(_)
            | Self::OperandCount { .. }
            | Self::ValueOutOfRange(_)
            => Severity::Warning,
        }
    }
}
impl std::fmt::Display for AsmErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutsideSection            => f.write_str("statement is outside of any control section"),
            Self::MalformedLine(e)          => write!(f, "malformed line: {e}"),
            Self::UnknownMnemonic(s)        => write!(f, "unknown operator `{s}`"),
            Self::DuplicateSymbol(s)        => write!(f, "symbol `{s}` was defined multiple times"),
            Self::UnresolvedReference(s)    => write!(f, "cannot resolve `{s}`"),
            Self::NumericParseFailure(s)    => write!(f, "invalid value `{s}`"),
            Self::ExternalInShortForm(s)    => write!(f, "external symbol `{s}` used in a 3-byte instruction"),
            Self::DisplacementOutOfRange(s) => write!(f, "`{s}` is out of range of a 12-bit displacement"),
            Self::OperandCount { expected, found } => write!(f, "expected {expected} operand(s), found {found}"),
            Self::UnplacedLiteral(s)        => write!(f, "literal `{s}` was never placed"),
            Self::AddressOverflow           => write!(f, "statement extends past address {:#X}", MEMORY_SIZE - 1),
            Self::ValueOutOfRange(s)        => write!(f, "`{s}` does not fit in its field"),
        }
    }
}

/// Error from assembling given source text.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AsmErr {
    /// The kind of error.
    pub kind: AsmErrKind,
    /// The 1-based source line this error occurred on.
    pub line: usize
}
impl AsmErr {
    /// Creates a new [`AsmErr`].
    pub fn new(kind: AsmErrKind, line: usize) -> Self {
        AsmErr { kind, line }
    }

    /// How serious this diagnostic is.
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}
impl std::fmt::Display for AsmErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for AsmErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            AsmErrKind::MalformedLine(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for AsmErr {
    fn line(&self) -> Option<usize> {
        Some(self.line)
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        use crate::err::Error as _;

        match &self.kind {
            AsmErrKind::OutsideSection            => Some("try adding a START directive before this statement".into()),
            AsmErrKind::MalformedLine(e)          => e.help(),
            AsmErrKind::UnknownMnemonic(_)        => Some("check the instruction specification for this mnemonic; the statement was treated as a no-op".into()),
            AsmErrKind::DuplicateSymbol(_)        => Some("labels must be unique within a section, the first definition was kept".into()),
            AsmErrKind::UnresolvedReference(_)    => Some("try defining this symbol before it is used, or declaring it with EXTREF".into()),
            AsmErrKind::NumericParseFailure(_)    => Some("this directive requires a number or a C'..'/X'..' constant".into()),
            AsmErrKind::ExternalInShortForm(_)    => Some("external symbols need the extended format, try adding a + prefix".into()),
            AsmErrKind::DisplacementOutOfRange(_) => Some("try declaring a BASE, or using the extended format".into()),
            AsmErrKind::OperandCount { .. }       => None,
            AsmErrKind::UnplacedLiteral(_)        => Some("try adding an LTORG or END directive after this statement".into()),
            AsmErrKind::AddressOverflow           => Some("a program must fit in 1 MiB of memory, the statement was skipped".into()),
            AsmErrKind::ValueOutOfRange(_)        => Some("the value was truncated to fit".into()),
        }
    }
}

/// One control section, opened by `START` or `CSECT`.
///
/// Every section has its own location counter (starting at 0),
/// symbol table, and literal pool.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Section {
    /// The section's name (the label of its `START`/`CSECT`).
    pub name: String,
    /// The symbol table.
    pub symbols: LabelTable,
    /// The literal pool, keyed by literal text (e.g., `=C'EOF'`).
    pub literals: LabelTable,
    /// Names imported by `EXTREF`.
    pub externals: Vec<String>,
    /// The statements of this section, in source order.
    pub stmts: Vec<Statement>,
    /// Relocation entries, in the order they were generated.
    pub modifications: Vec<Modification>,
    /// The section's total length in bytes (computed in pass 2).
    pub length: u32,
}

/// Configurable assembler.
///
/// # Example
/// ```
/// use sicxe_asm::asm::Assembler;
/// use sicxe_asm::inst::InstTable;
///
/// let table: InstTable = "LDA\t00\t3\t1\n".parse().unwrap();
/// let src = "A\tSTART\t0\n\tLDA\t#1\nB\tCSECT\n\tLDA\t#2\n";
///
/// let obj = Assembler::new(&table).parallel(true).assemble(src);
/// let names: Vec<_> = obj.sections().iter().map(|s| s.name.as_str()).collect();
/// assert_eq!(names, ["A", "B"]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Assembler<'t> {
    table: &'t InstTable,
    parallel: bool,
}
impl<'t> Assembler<'t> {
    /// Creates an assembler using the given instruction registry.
    pub fn new(table: &'t InstTable) -> Self {
        Assembler { table, parallel: false }
    }

    /// Sets whether each control section is assembled on its own thread.
    ///
    /// The result is identical either way.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Assembles source text into an object file.
    pub fn assemble(&self, src: &str) -> ObjectFile {
        let (chunks, mut diagnostics) = split_sections(src);

        let results = match self.parallel && chunks.len() > 1 {
            true  => self.assemble_parallel(&chunks),
            false => chunks.iter().map(|c| assemble_section(c, self.table)).collect(),
        };

        let mut sections = Vec::with_capacity(results.len());
        for (section, diags) in results {
            sections.push(section);
            diagnostics.extend(diags);
        }

        let entry = match find_entry(&sections) {
            Ok(entry) => entry,
            Err(e) => {
                diagnostics.push(e);
                0
            }
        };
        diagnostics.sort_by_key(|d| d.line);

        ObjectFile { sections, diagnostics, entry }
    }

    fn assemble_parallel(&self, chunks: &[Vec<(usize, &str)>]) -> Vec<(Section, Vec<AsmErr>)> {
        let (tx, rx) = cbc::unbounded();

        std::thread::scope(|s| {
            for (i, chunk) in chunks.iter().enumerate() {
                let tx = tx.clone();
                let table = self.table;
                s.spawn(move || {
                    let result = assemble_section(chunk, table);
                    // The receiver outlives every worker.
                    let _ = tx.send((i, result));
                });
            }
        });
        drop(tx);

        let mut results: Vec<_> = rx.into_iter().collect();
        results.sort_by_key(|&(i, _)| i);
        results.into_iter().map(|(_, r)| r).collect()
    }
}

fn assemble_section(lines: &[(usize, &str)], table: &InstTable) -> (Section, Vec<AsmErr>) {
    let mut diags = vec![];
    let mut section = Section::resolve(lines.iter().copied(), table, &mut diags);
    section.generate(table, &mut diags);
    (section, diags)
}

/// Splits source text into the lines of each control section.
///
/// Lines before the first `START`/`CSECT` belong to no section and are reported.
fn split_sections(src: &str) -> (Vec<Vec<(usize, &str)>>, Vec<AsmErr>) {
    let mut chunks: Vec<Vec<(usize, &str)>> = vec![];
    let mut diags = vec![];

    for (i, line) in src.lines().enumerate() {
        let lno = i + 1;
        let parsed = SourceLine::parse(line);
        let opens = matches!(
            &parsed,
            Ok(Some(l)) if matches!(l.operator.parse::<Directive>(), Ok(Directive::Start | Directive::Csect))
        );
        if opens {
            chunks.push(vec![(lno, line)]);
            continue;
        }

        match chunks.last_mut() {
            Some(chunk) => chunk.push((lno, line)),
            None if parsed == Ok(None) => {},
            None => diags.push(AsmErr::new(AsmErrKind::OutsideSection, lno)),
        }
    }

    (chunks, diags)
}

/// Finds the entry address, which is named by the `END` operand
/// and located in the first section.
fn find_entry(sections: &[Section]) -> Result<u32, AsmErr> {
    let end = sections.iter()
        .flat_map(|s| &s.stmts)
        .find(|stmt| stmt.operator.is(Directive::End));

    let Some((first, end)) = sections.first().zip(end) else { return Ok(0) };
    match end.operands.first() {
        Some(Operand::Symbol(name)) => first.symbols.lookup(name)
            .ok_or_else(|| AsmErr::new(AsmErrKind::UnresolvedReference(name.clone()), end.line)),
        Some(Operand::Number(n)) => u32::try_from(*n).ok()
            .filter(|&addr| addr < MEMORY_SIZE)
            .ok_or_else(|| AsmErr::new(AsmErrKind::ValueOutOfRange(n.to_string()), end.line)),
        _ => Ok(0),
    }
}

/// An assembled program.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ObjectFile {
    sections: Vec<Section>,
    diagnostics: Vec<AsmErr>,
    entry: u32,
}
impl ObjectFile {
    /// The control sections, in source order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Every diagnostic raised while assembling, ordered by line.
    pub fn diagnostics(&self) -> &[AsmErr] {
        &self.diagnostics
    }

    /// Whether any error-severity diagnostic was raised.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity() == Severity::Error)
    }

    /// The program's entry address (carried by the first section's end record).
    pub fn entry(&self) -> u32 {
        self.entry
    }
}

#[cfg(test)]
mod tests {
    use crate::asm::encoding::{ObjFileFormat, ObjectRecords};
    use crate::err::Severity;
    use crate::inst::InstTable;

    use super::{assemble, AsmErrKind, Assembler, ObjectFile};

    pub(crate) const COPY_SRC: &str = include_str!("../tests/files/copy.asm");
    pub(crate) const INST_DATA: &str = include_str!("../tests/files/inst.data");

    fn table() -> InstTable {
        INST_DATA.parse().unwrap()
    }
    fn assemble_src(src: &str) -> ObjectFile {
        assemble(src, &table())
    }
    fn assert_asm_fail(obj: &ObjectFile, kind: AsmErrKind, line: usize) {
        assert!(
            obj.diagnostics().iter().any(|d| d.kind == kind && d.line == line),
            "expected {kind:?} on line {line}, found {:?}", obj.diagnostics()
        );
    }

    #[test]
    fn test_copy_symbols() {
        let obj = assemble_src(COPY_SRC);
        assert!(obj.diagnostics().is_empty(), "{:?}", obj.diagnostics());

        let [copy, rdrec, wrrec] = obj.sections() else { panic!("expected 3 sections") };
        assert_eq!(copy.name, "COPY");
        assert_eq!(copy.symbols.lookup("FIRST"), Some(0x00));
        assert_eq!(copy.symbols.lookup("CLOOP"), Some(0x03));
        assert_eq!(copy.symbols.lookup("ENDFIL"), Some(0x17));
        assert_eq!(copy.symbols.lookup("RETADR"), Some(0x2A));
        assert_eq!(copy.symbols.lookup("LENGTH"), Some(0x2D));
        assert_eq!(copy.symbols.lookup("BUFFER"), Some(0x33));
        assert_eq!(copy.symbols.lookup("BUFEND"), Some(0x1033));
        assert_eq!(copy.symbols.lookup("MAXLEN"), Some(0x1000));
        assert_eq!(copy.literals.lookup("=C'EOF'"), Some(0x30));
        assert_eq!(copy.length, 0x1033);

        // every section has its own counter and symbols
        assert_eq!(rdrec.symbols.lookup("RDREC"), Some(0x00));
        assert_eq!(rdrec.symbols.lookup("MAXLEN"), Some(0x28));
        assert_eq!(rdrec.symbols.lookup("FIRST"), None);
        assert_eq!(rdrec.length, 0x2B);

        assert_eq!(wrrec.literals.lookup("=X'05'"), Some(0x1B));
        assert_eq!(wrrec.length, 0x1C);

        assert_eq!(obj.entry(), 0);
    }

    #[test]
    fn test_copy_codes() {
        let obj = assemble_src(COPY_SRC);
        let codes = |i: usize| -> Vec<String> {
            obj.sections()[i].stmts.iter()
                .filter(|s| !s.code.is_empty())
                .map(|s| s.code_hex())
                .collect()
        };

        assert_eq!(codes(0), [
            "172027", "4B100000", "032023", "290000", "332007", "4B100000", "3F2FEC",
            "032016", "0F2016", "010003", "0F200A", "4B100000", "3E2000", "454F46",
        ]);
        assert_eq!(codes(2), [
            "B410", "77100000", "E32012", "332FFA", "53900000", "DF2008", "B850",
            "3B2FEE", "4F0000", "05",
        ]);

        // every format 4 instruction has exactly one modification entry
        for section in obj.sections() {
            let ext = section.stmts.iter().filter(|s| s.flags.e).count();
            let mods = section.modifications.iter().filter(|m| m.half_bytes == 5).count();
            assert_eq!(ext, mods);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let table = table();
        let seq = Assembler::new(&table).assemble(COPY_SRC);
        let par = Assembler::new(&table).parallel(true).assemble(COPY_SRC);
        assert_eq!(seq, par);

        // idempotence
        let again = Assembler::new(&table).assemble(COPY_SRC);
        assert_eq!(ObjectRecords::serialize(&seq), ObjectRecords::serialize(&again));
    }

    #[test]
    fn test_outside_section() {
        let src = "\
\tLDA\t#1

.\tcomments and blank lines are fine
PROG\tSTART\t0
\tLDA\t#2";
        let obj = assemble_src(src);
        assert_eq!(obj.sections().len(), 1);
        assert_eq!(obj.sections()[0].stmts.len(), 2);
        assert_asm_fail(&obj, AsmErrKind::OutsideSection, 1);
        assert_eq!(obj.diagnostics().len(), 1);
        assert!(obj.has_errors());
    }

    #[test]
    fn test_malformed_line_skips_statement() {
        let src = "\
PROG\tSTART\t0
BAD
\tLDA\t#2
\tFLY\tAWAY
\tEND";
        let obj = assemble_src(src);
        assert_asm_fail(&obj, AsmErrKind::MalformedLine(crate::parse::ParseErr::MissingOperator), 2);
        assert_asm_fail(&obj, AsmErrKind::UnknownMnemonic("FLY".into()), 4);

        // the rest of the section is still assembled
        assert_eq!(obj.sections()[0].stmts[1].code, [0x01, 0x00, 0x02]);
        let severities: Vec<_> = obj.diagnostics().iter().map(|d| d.severity()).collect();
        assert_eq!(severities, [Severity::Error, Severity::Warning]);

        // diagnostic kinds can be deduplicated
        let kinds: std::collections::HashSet<_> = obj.diagnostics().iter().map(|d| d.kind.clone()).collect();
        assert_eq!(kinds.len(), 2);
    }

    #[test]
    fn test_entry() {
        let src = "\
MAIN\tSTART\t0
\tLDA\t#0
START2\tLDA\t#1
SUB\tCSECT
\tLDA\t#2
\tEND\tSTART2";
        let obj = assemble_src(src);
        assert!(obj.diagnostics().is_empty(), "{:?}", obj.diagnostics());
        assert_eq!(obj.entry(), 3);

        let obj = assemble_src("MAIN\tSTART\t0\n\tLDA\t#0\n\tEND\tNOPE");
        assert_eq!(obj.entry(), 0);
        assert_asm_fail(&obj, AsmErrKind::UnresolvedReference("NOPE".into()), 3);
        assert!(!obj.has_errors());

        let obj = assemble_src("MAIN\tSTART\t0\n\tLDA\t#0\n\tEND\t-1");
        assert_eq!(obj.entry(), 0);
        assert_asm_fail(&obj, AsmErrKind::ValueOutOfRange("-1".into()), 3);
        assert!(ObjectRecords::serialize(&obj).ends_with("E000000\n\n"));
    }

    #[test]
    fn test_address_overflow_is_reported() {
        let mut src = String::from("PROG\tSTART\t0\n\tLDA\t#1\n");
        for _ in 0..300 {
            src.push_str("\tRESB\t16777215\n");
        }
        src.push_str("\tLDA\t#2\n\tEND\n");

        let obj = assemble_src(&src);
        assert!(obj.has_errors());
        assert_eq!(obj.diagnostics().len(), 300);
        assert_asm_fail(&obj, AsmErrKind::AddressOverflow, 3);

        // the rest of the section is still assembled
        let records = ObjectRecords::serialize(&obj);
        assert!(records.contains("T00000006010001010002"), "{records}");
    }
}
