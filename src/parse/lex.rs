//! Tokenizing SIC/XE operand fields.
//!
//! Source lines are split into fields on tabs by the [`parse`] module. The operand field
//! is then broken into [`Token`]s by this module, which lets the parser tell apart
//! immediate (`#`), indirect (`@`), and literal (`=`) operands, byte constants (`C'..'`, `X'..'`),
//! symbol differences (`A-B`), and the current location (`*`).
//!
//! [`parse`]: crate::parse

use std::num::IntErrorKind;

use logos::{Lexer, Logos};

use crate::ast::ByteConst;

/// Largest value that fits in a SIC/XE word (24 bits).
pub const WORD_MAX: u32 = 0xFF_FFFF;

/// A unit of information in a SIC/XE operand field.
#[derive(Debug, Logos, PartialEq, Eq, Clone)]
#[logos(skip r"[ \t]+", error = LexErr)]
pub enum Token {
    // Like identifiers, this regex spans over tokens that are technically invalid
    // (e.g., 12AB) so that the validator can report them as one unit.

    /// An unsigned decimal value (e.g., `0`, `4096`).
    #[regex(r"\d\w*", lex_dec)]
    Number(u32),

    /// An identifier (a symbol or a register name).
    #[regex(r"[A-Za-z_]\w*", |lx| lx.slice().to_string())]
    Ident(String),

    /// A byte constant (e.g., `C'EOF'`, `X'F1'`).
    #[regex(r"[CcXx]'", lex_byte_const)]
    Const(ByteConst),

    /// A numeric literal, whose digits are hex (e.g., `=3`, `=10`).
    ///
    /// This has to start with a digit so that `=C'..'` and `=X'..'` stay byte constant literals.
    #[regex(r"=\d\w*", lex_literal_hex)]
    LiteralWord(u32),

    /// The immediate addressing marker.
    #[token("#")]
    Hash,

    /// The indirect addressing marker.
    #[token("@")]
    At,

    /// The literal marker (of a byte constant literal).
    #[token("=")]
    Equals,

    /// The current location counter.
    #[token("*")]
    Star,

    /// A minus sign, used for negative numbers and symbol differences.
    #[token("-")]
    Minus,

    /// A comma, which delineates operands.
    #[token(",")]
    Comma,
}

/// Any errors raised in attempting to tokenize an operand field.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum LexErr {
    /// Numeric literal could not be parsed because it has invalid digits (i.e., not 0-9)
    InvalidNumeric,
    /// Numeric literal does not fit in a 24-bit word
    DoesNotFitWord,
    /// Byte constant is missing its closing quote
    UnclosedConst,
    /// Byte constant has nothing between its quotes
    EmptyConst,
    /// Hex constant has invalid hex digits
    InvalidHex,
    /// Hex constant has an odd number of hex digits
    OddHexDigits,
    /// A symbol was used which is not allowed in operands
    #[default]
    InvalidSymbol,
}
impl LexErr {
    /// Whether this error came from a malformed number or constant
    /// (as opposed to an unrecognized character).
    pub fn is_numeric(&self) -> bool {
        !matches!(self, LexErr::InvalidSymbol)
    }
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::InvalidNumeric => f.write_str("invalid decimal literal"),
            LexErr::DoesNotFitWord => f.write_str("numeric token does not fit in a 24-bit word"),
            LexErr::UnclosedConst  => f.write_str("unclosed byte constant"),
            LexErr::EmptyConst     => f.write_str("empty byte constant"),
            LexErr::InvalidHex     => f.write_str("invalid hex constant"),
            LexErr::OddHexDigits   => f.write_str("hex constant has an odd number of digits"),
            LexErr::InvalidSymbol  => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::InvalidNumeric => Some("a decimal literal only consists of digits 0-9".into()),
            LexErr::DoesNotFitWord => Some(format!("the range for a word is [0, {WORD_MAX}]").into()),
            LexErr::UnclosedConst  => Some("add a ' to the end of the constant".into()),
            LexErr::EmptyConst     => Some("a byte constant must hold at least one byte".into()),
            LexErr::InvalidHex     => Some("a hex constant consists of 0-9, A-F".into()),
            LexErr::OddHexDigits   => Some("each byte takes two hex digits, try adding a leading 0".into()),
            LexErr::InvalidSymbol  => Some("this char does not occur in any token in SIC/XE operands".into()),
        }
    }
}

fn lex_dec(lx: &Lexer<'_, Token>) -> Result<u32, LexErr> {
    let n = lx.slice().parse::<u32>()
        .map_err(|e| match e.kind() {
            IntErrorKind::PosOverflow => LexErr::DoesNotFitWord,
            _ => LexErr::InvalidNumeric,
        })?;

    match n <= WORD_MAX {
        true  => Ok(n),
        false => Err(LexErr::DoesNotFitWord),
    }
}
fn lex_literal_hex(lx: &Lexer<'_, Token>) -> Result<u32, LexErr> {
    let n = u32::from_str_radix(&lx.slice()[1..], 16)
        .map_err(|e| match e.kind() {
            IntErrorKind::PosOverflow => LexErr::DoesNotFitWord,
            _ => LexErr::InvalidHex,
        })?;

    match n <= WORD_MAX {
        true  => Ok(n),
        false => Err(LexErr::DoesNotFitWord),
    }
}
fn lex_byte_const(lx: &mut Lexer<'_, Token>) -> Result<ByteConst, LexErr> {
    let kind = lx.slice().as_bytes()[0].to_ascii_uppercase();

    // Consume up to and including the closing quote.
    let rem = lx.remainder();
    let Some(len) = rem.find('\'') else {
        lx.bump(rem.len());
        return Err(LexErr::UnclosedConst);
    };
    lx.bump(len + 1);

    let body = &rem[..len];
    if body.is_empty() {
        return Err(LexErr::EmptyConst);
    }

    match kind {
        b'C' => Ok(ByteConst::Char(body.to_string())),
        _ => {
            if !body.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(LexErr::InvalidHex);
            }
            if body.len() % 2 != 0 {
                return Err(LexErr::OddHexDigits);
            }

            let bytes = body.as_bytes()
                .chunks_exact(2)
                .map(|pair| {
                    // Both chars were just checked to be hex digits.
                    let hi = (pair[0] as char).to_digit(16).unwrap_or(0);
                    let lo = (pair[1] as char).to_digit(16).unwrap_or(0);
                    (hi * 16 + lo) as u8
                })
                .collect();
            Ok(ByteConst::Hex(bytes))
        }
    }
}
