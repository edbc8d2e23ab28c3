//! Components relating to the statements the assembler works on.
//!
//! These components together are used to construct a [`Statement`],
//! the parsed (and later encoded) form of one source line:
//! - [`Operator`]: a machine instruction or a [`Directive`],
//! - [`Operand`]: the operands, classified by addressing form,
//! - [`Nixbpe`]: the addressing flags resolved during code generation,
//! - [`Record`]: which object record the statement contributes to.

use std::fmt::Write as _;

/// A SIC/XE register.
///
/// ## Examples
///
/// ```text
/// CLEAR   X
///         ~
/// COMPR   A,S
///         ~ ~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Reg {
    #[allow(missing_docs)] A,
    #[allow(missing_docs)] X,
    #[allow(missing_docs)] L,
    #[allow(missing_docs)] B,
    #[allow(missing_docs)] S,
    #[allow(missing_docs)] T,
    #[allow(missing_docs)] F,
    #[allow(missing_docs)] PC,
    #[allow(missing_docs)] SW,
}
impl Reg {
    /// Gets the register number encoded in format 2 instructions.
    pub fn reg_no(self) -> u8 {
        match self {
            Reg::A  => 0,
            Reg::X  => 1,
            Reg::L  => 2,
            Reg::B  => 3,
            Reg::S  => 4,
            Reg::T  => 5,
            Reg::F  => 6,
            Reg::PC => 8,
            Reg::SW => 9,
        }
    }
}
impl std::str::FromStr for Reg {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A"  => Ok(Reg::A),
            "X"  => Ok(Reg::X),
            "L"  => Ok(Reg::L),
            "B"  => Ok(Reg::B),
            "S"  => Ok(Reg::S),
            "T"  => Ok(Reg::T),
            "F"  => Ok(Reg::F),
            "PC" => Ok(Reg::PC),
            "SW" => Ok(Reg::SW),
            _    => Err(()),
        }
    }
}
impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// A byte constant, as written in `BYTE` operands and `=` literals.
///
/// ```text
/// EOF     BYTE    C'EOF'
///                 ~~~~~~
/// INPUT   BYTE    X'F1'
///                 ~~~~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ByteConst {
    /// A character constant; each character occupies one byte.
    Char(String),
    /// A hex constant; each pair of hex digits occupies one byte.
    Hex(Vec<u8>),
}
impl ByteConst {
    /// The bytes this constant assembles to.
    pub fn bytes(&self) -> Vec<u8> {
        match self {
            ByteConst::Char(s) => s.bytes().collect(),
            ByteConst::Hex(b)  => b.clone(),
        }
    }

    /// The number of bytes this constant occupies.
    pub fn len(&self) -> u32 {
        match self {
            ByteConst::Char(s) => s.len() as u32,
            ByteConst::Hex(b)  => b.len() as u32,
        }
    }

    /// The constant's contents without its type prefix and quotes.
    pub fn body(&self) -> String {
        match self {
            ByteConst::Char(s) => s.clone(),
            ByteConst::Hex(b)  => b.iter().fold(String::new(), |mut s, b| {
                let _ = write!(s, "{b:02X}");
                s
            }),
        }
    }
}
impl std::fmt::Display for ByteConst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteConst::Char(_) => write!(f, "C'{}'", self.body()),
            ByteConst::Hex(_)  => write!(f, "X'{}'", self.body()),
        }
    }
}

/// A literal, written with an `=` prefix and placed into the literal pool
/// at the next `LTORG` or `END`.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Literal {
    /// A byte constant literal (e.g., `=C'EOF'`, `=X'05'`).
    Bytes(ByteConst),
    /// A numeric literal, written in hex (e.g., `=3`, `=1F`), which occupies one word.
    Word(u32),
}
impl Literal {
    /// The number of bytes this literal occupies in the literal pool.
    pub fn len(&self) -> u32 {
        match self {
            Literal::Bytes(c) => c.len(),
            Literal::Word(_)  => 3,
        }
    }

    /// The bytes this literal assembles to.
    pub fn bytes(&self) -> Vec<u8> {
        match self {
            Literal::Bytes(c) => c.bytes(),
            Literal::Word(n)  => n.to_be_bytes()[1..].to_vec(),
        }
    }

    /// The literal's text without its `=`, type prefix, or quotes.
    pub fn body(&self) -> String {
        match self {
            Literal::Bytes(c) => c.body(),
            Literal::Word(n)  => format!("{n:X}"),
        }
    }
}
impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Bytes(c) => write!(f, "={c}"),
            Literal::Word(n)  => write!(f, "={n:X}"),
        }
    }
}
impl std::str::FromStr for Literal {
    type Err = crate::parse::ParseErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match crate::parse::parse_operand(s)? {
            Operand::Literal(lit) => Ok(lit),
            _ => Err(crate::parse::ParseErr::UnexpectedOperand(s.to_string())),
        }
    }
}

/// The target of an immediate or indirect operand.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Target {
    /// A numeric value (e.g., `#3`).
    Number(u32),
    /// A symbol (e.g., `#MAXLEN`, `@RETADR`).
    Symbol(String),
}
impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Number(n) => write!(f, "{n}"),
            Target::Symbol(s) => f.write_str(s),
        }
    }
}

/// An operand of a statement.
///
/// ## Examples
///
/// ```text
/// FIRST   STL     RETADR          Symbol
/// RETADR  RESW    1               Number
///         LDA     #3              Immediate
///         J       @RETADR         Indirect
///         LDA     =C'EOF'         Literal
/// INPUT   BYTE    X'F1'           Const
/// MAXLEN  EQU     BUFEND-BUFFER   Difference
/// BUFEND  EQU     *               Here
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Operand {
    /// A symbol or register name.
    Symbol(String),
    /// A (possibly negative) number.
    Number(i32),
    /// An immediate operand (`#`).
    Immediate(Target),
    /// An indirect operand (`@`).
    Indirect(Target),
    /// A literal (`=`).
    Literal(Literal),
    /// A byte constant.
    Const(ByteConst),
    /// The difference of two symbols.
    Difference(String, String),
    /// The current location (`*`).
    Here,
}
impl Operand {
    /// The symbol this operand refers to, ignoring any addressing prefix.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Operand::Symbol(s)
            | Operand::Immediate(Target::Symbol(s))
            | Operand::Indirect(Target::Symbol(s)) => Some(s),
            _ => None,
        }
    }

    /// The name this operand is looked up by in the symbol and literal tables.
    pub fn lookup_name(&self) -> Option<String> {
        match self {
            Operand::Literal(lit) => Some(lit.to_string()),
            op => op.symbol().map(str::to_string),
        }
    }
}
impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Symbol(s)        => f.write_str(s),
            Operand::Number(n)        => write!(f, "{n}"),
            Operand::Immediate(t)     => write!(f, "#{t}"),
            Operand::Indirect(t)      => write!(f, "@{t}"),
            Operand::Literal(l)       => write!(f, "{l}"),
            Operand::Const(c)         => write!(f, "{c}"),
            Operand::Difference(a, b) => write!(f, "{a}-{b}"),
            Operand::Here             => f.write_str("*"),
        }
    }
}

/// An assembler directive.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Directive {
    /// Opens the first control section.
    Start,
    /// Opens a further control section.
    Csect,
    /// Ends the program, flushing the literal pool.
    End,
    /// Exports symbols from this section.
    Extdef,
    /// Imports symbols into this section.
    Extref,
    /// Byte constant.
    Byte,
    /// One-word constant.
    Word,
    /// Reserves bytes.
    Resb,
    /// Reserves words.
    Resw,
    /// Defines a symbol's value.
    Equ,
    /// Flushes the literal pool.
    Ltorg,
    /// Declares the base register's value.
    Base,
    /// Cancels a previous `BASE`.
    Nobase,
}
impl Directive {
    /// Whether this directive flushes the literal pool.
    pub fn flushes_literals(self) -> bool {
        matches!(self, Directive::Ltorg | Directive::End)
    }
}
impl std::str::FromStr for Directive {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "START"  => Ok(Directive::Start),
            "CSECT"  => Ok(Directive::Csect),
            "END"    => Ok(Directive::End),
            "EXTDEF" => Ok(Directive::Extdef),
            "EXTREF" => Ok(Directive::Extref),
            "BYTE"   => Ok(Directive::Byte),
            "WORD"   => Ok(Directive::Word),
            "RESB"   => Ok(Directive::Resb),
            "RESW"   => Ok(Directive::Resw),
            "EQU"    => Ok(Directive::Equ),
            "LTORG"  => Ok(Directive::Ltorg),
            "BASE"   => Ok(Directive::Base),
            "NOBASE" => Ok(Directive::Nobase),
            _        => Err(()),
        }
    }
}
impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = format!("{self:?}").to_uppercase();
        f.write_str(&name)
    }
}

/// The operator of a statement.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Operator {
    /// A machine instruction found in the instruction registry.
    Instr {
        /// The base mnemonic, without the `+` prefix.
        mnemonic: String,
        /// Whether the `+` prefix (format 4) was used.
        extended: bool,
    },
    /// An assembler directive.
    Directive(Directive),
    /// An operator that is neither a known mnemonic nor a directive.
    Unknown(String),
}
impl Operator {
    /// Gets the directive, if this operator is one.
    pub fn directive(&self) -> Option<Directive> {
        match self {
            Operator::Directive(d) => Some(*d),
            _ => None,
        }
    }

    /// Whether this operator is the given directive.
    pub fn is(&self, d: Directive) -> bool {
        self.directive() == Some(d)
    }
}
impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Instr { mnemonic, extended: true }  => write!(f, "+{mnemonic}"),
            Operator::Instr { mnemonic, extended: false } => f.write_str(mnemonic),
            Operator::Directive(d) => d.fmt(f),
            Operator::Unknown(s)   => f.write_str(s),
        }
    }
}

/// The six addressing flags of a format 3/4 instruction.
///
/// | flag | meaning          |
/// |------|------------------|
/// | `n`  | indirect         |
/// | `i`  | immediate        |
/// | `x`  | indexed          |
/// | `b`  | base-relative    |
/// | `p`  | PC-relative      |
/// | `e`  | extended format  |
///
/// Simple addressing sets both `n` and `i`.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct Nixbpe {
    #[allow(missing_docs)] pub n: bool,
    #[allow(missing_docs)] pub i: bool,
    #[allow(missing_docs)] pub x: bool,
    #[allow(missing_docs)] pub b: bool,
    #[allow(missing_docs)] pub p: bool,
    #[allow(missing_docs)] pub e: bool,
}
impl Nixbpe {
    /// Packs the flags into their 6-bit encoding (`n` is the most significant bit).
    pub fn bits(self) -> u32 {
        [self.n, self.i, self.x, self.b, self.p, self.e]
            .into_iter()
            .fold(0, |acc, bit| (acc << 1) | u32::from(bit))
    }
}
impl std::fmt::Display for Nixbpe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06b}", self.bits())
    }
}

/// The object record a statement contributes to, assigned during code generation.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Record {
    /// A header record (from `START`/`CSECT`).
    Header {
        /// The program name.
        name: String,
        /// The section's start address.
        start: u32,
    },
    /// A define record (from `EXTDEF`): exported names and their addresses.
    Define(Vec<(String, u32)>),
    /// A refer record (from `EXTREF`): imported names.
    Refer(Vec<String>),
    /// The statement's object code belongs in a text record.
    Text,
}

/// Whether a modification adds or subtracts the referenced symbol.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Sign {
    #[allow(missing_docs)] Plus,
    #[allow(missing_docs)] Minus,
}
impl std::fmt::Display for Sign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sign::Plus  => f.write_str("+"),
            Sign::Minus => f.write_str("-"),
        }
    }
}

/// A relocation entry, instructing the linker to adjust a field
/// by adding or subtracting a symbol's final address.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Modification {
    /// Address of the first byte holding the field.
    pub addr: u32,
    /// Length of the field in half-bytes.
    pub half_bytes: u8,
    /// Whether to add or subtract.
    pub sign: Sign,
    /// The symbol whose address is applied.
    pub symbol: String,
}

/// The parsed (and after code generation, encoded) form of one source line.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Statement {
    /// 1-based line number in the source.
    pub line: usize,
    /// The label, if present.
    pub label: Option<String>,
    /// The operator.
    pub operator: Operator,
    /// The operands (0-3 of them).
    pub operands: Vec<Operand>,
    /// The trailing comment, if present.
    pub comment: Option<String>,
    /// The location counter value before this statement.
    pub addr: u32,
    /// Number of bytes this statement occupies.
    pub len: u32,
    /// The addressing flags (only meaningful for format 3/4 instructions).
    pub flags: Nixbpe,
    /// The generated object code (empty until code generation, or for statements with no encoding).
    pub code: Vec<u8>,
    /// The object record this statement contributes to.
    pub record: Option<Record>,
}
impl Statement {
    /// Creates a statement located at `addr`, with no length and no object code yet.
    pub fn new(line: usize, label: Option<String>, operator: Operator, operands: Vec<Operand>, comment: Option<String>, addr: u32) -> Self {
        Statement {
            line, label, operator, operands, comment, addr,
            len: 0,
            flags: Nixbpe::default(),
            code: vec![],
            record: None,
        }
    }

    /// The address immediately after this statement.
    pub fn end(&self) -> u32 {
        self.addr + self.len
    }

    /// The object code rendered as uppercase hex.
    pub fn code_hex(&self) -> String {
        hex(&self.code)
    }
}

/// Renders bytes as uppercase hex with no separators.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02X}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::{ByteConst, Literal, Nixbpe, Reg};

    #[test]
    fn test_nixbpe_bits() {
        assert_eq!(Nixbpe::default().bits(), 0);
        let simple = Nixbpe { n: true, i: true, ..Default::default() };
        assert_eq!(simple.bits(), 0b110000);
        let pc_rel = Nixbpe { p: true, ..simple };
        assert_eq!(pc_rel.bits(), 0b110010);
        let ext_idx = Nixbpe { x: true, e: true, ..simple };
        assert_eq!(ext_idx.bits(), 0b111001);
        assert_eq!(ext_idx.to_string(), "111001");
    }

    #[test]
    fn test_reg_codes() {
        let regs: Vec<u8> = ["A", "X", "L", "B", "S", "T", "F", "PC", "SW"]
            .into_iter()
            .map(|r| r.parse::<Reg>().unwrap().reg_no())
            .collect();
        assert_eq!(regs, [0, 1, 2, 3, 4, 5, 6, 8, 9]);
        assert!("R1".parse::<Reg>().is_err());
    }

    #[test]
    fn test_literal_text() {
        let eof = Literal::Bytes(ByteConst::Char("EOF".into()));
        assert_eq!(eof.to_string(), "=C'EOF'");
        assert_eq!(eof.body(), "EOF");
        assert_eq!(eof.len(), 3);
        assert_eq!(eof.bytes(), b"EOF");

        let dev = Literal::Bytes(ByteConst::Hex(vec![0x05]));
        assert_eq!(dev.to_string(), "=X'05'");
        assert_eq!(dev.body(), "05");
        assert_eq!(dev.len(), 1);

        let three = Literal::Word(3);
        assert_eq!(three.to_string(), "=3");
        assert_eq!(three.len(), 3);
        assert_eq!(three.bytes(), [0, 0, 3]);

        assert_eq!("=C'EOF'".parse::<Literal>().unwrap(), eof);
        assert_eq!("=X'05'".parse::<Literal>().unwrap(), dev);

        let sixteen: Literal = "=10".parse().unwrap();
        assert_eq!(sixteen, Literal::Word(0x10));
        assert_eq!(sixteen.to_string(), "=10");
        assert_eq!(sixteen.bytes(), [0x00, 0x00, 0x10]);
        assert!("EOF".parse::<Literal>().is_err());
    }
}
