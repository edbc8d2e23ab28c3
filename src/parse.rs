//! Parsing source lines.
//!
//! A source line is tab-delimited into four fields:
//!
//! ```text
//! label <TAB> operator <TAB> operand[,operand...] <TAB> comment
//! ```
//!
//! [`SourceLine::parse`] performs the split, and [`parse_operands`] turns the operand
//! field into [`Operand`]s using the [`lex`] module's tokens.

pub mod lex;

use logos::Logos;

use crate::ast::{Directive, Literal, Operand, Operator, Target};
use crate::inst::InstTable;
use lex::{LexErr, Token};

/// Any errors raised while splitting a line or parsing its operands.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ParseErr {
    /// A token in the operand field could not be lexed.
    Lex(LexErr),
    /// The line has a label but no operator.
    MissingOperator,
    /// An operand between commas is empty.
    EmptyOperand,
    /// The tokens of an operand do not form any known operand form.
    UnexpectedOperand(String),
}
impl ParseErr {
    /// Whether this error came from a malformed number or byte constant.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ParseErr::Lex(e) if e.is_numeric())
    }
}
impl From<LexErr> for ParseErr {
    fn from(value: LexErr) -> Self {
        ParseErr::Lex(value)
    }
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErr::Lex(e)               => e.fmt(f),
            ParseErr::MissingOperator      => f.write_str("line has no operator"),
            ParseErr::EmptyOperand         => f.write_str("empty operand"),
            ParseErr::UnexpectedOperand(s) => write!(f, "cannot parse operand `{s}`"),
        }
    }
}
impl std::error::Error for ParseErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseErr::Lex(e) => Some(e),
            _ => None,
        }
    }
}
impl crate::err::Error for ParseErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        use crate::err::Error as _;

        match self {
            ParseErr::Lex(e) => e.help(),
            ParseErr::MissingOperator => Some("fields must be separated by tabs: label, operator, operands, comment".into()),
            ParseErr::EmptyOperand => Some("remove the extra comma".into()),
            ParseErr::UnexpectedOperand(_) => Some("operands are symbols, numbers, #imm, @ind, =literals, C'..'/X'..' constants, A-B, or *".into()),
        }
    }
}

/// The raw fields of one (non-comment) source line.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SourceLine<'s> {
    /// The label field, if non-empty.
    pub label: Option<&'s str>,
    /// The operator field.
    pub operator: &'s str,
    /// The operand field, if non-empty.
    pub operands: Option<&'s str>,
    /// The comment field, if non-empty.
    pub comment: Option<&'s str>,
}
impl<'s> SourceLine<'s> {
    /// Splits a line into its fields.
    ///
    /// Blank lines and full-line comments (first field starting with `.`) produce `None`.
    ///
    /// ## Example
    /// ```
    /// use sicxe_asm::parse::SourceLine;
    ///
    /// let line = SourceLine::parse("FIRST\tSTL\tRETADR\tsave return address").unwrap().unwrap();
    /// assert_eq!(line.label, Some("FIRST"));
    /// assert_eq!(line.operator, "STL");
    /// assert_eq!(line.operands, Some("RETADR"));
    ///
    /// assert_eq!(SourceLine::parse(".\tcomment line"), Ok(None));
    /// ```
    pub fn parse(line: &'s str) -> Result<Option<Self>, ParseErr> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }

        let mut fields = line.splitn(4, '\t').map(str::trim);
        let label = fields.next().filter(|s| !s.is_empty());
        if label.is_some_and(|l| l.starts_with('.')) {
            return Ok(None);
        }

        let operator = fields.next().filter(|s| !s.is_empty()).ok_or(ParseErr::MissingOperator)?;
        let operands = fields.next().filter(|s| !s.is_empty());
        let comment  = fields.next().filter(|s| !s.is_empty());

        Ok(Some(SourceLine { label, operator, operands, comment }))
    }
}

/// Classifies an operator field.
///
/// Directives take precedence over the registry. A `+` prefix marks the extended
/// form and is only accepted on format 3 mnemonics.
pub fn parse_operator(op: &str, table: &InstTable) -> Operator {
    if let Ok(d) = op.parse::<Directive>() {
        return Operator::Directive(d);
    }

    let (mnemonic, extended) = match op.strip_prefix('+') {
        Some(base) => (base, true),
        None => (op, false),
    };
    match table.get(mnemonic) {
        Some(spec) if !extended || spec.format == 3 => Operator::Instr { mnemonic: mnemonic.to_string(), extended },
        _ => Operator::Unknown(op.to_string()),
    }
}

/// Parses an operand field into its comma-separated operands.
///
/// Commas inside byte constants do not split operands.
///
/// ## Example
/// ```
/// use sicxe_asm::ast::{Operand, Target};
/// use sicxe_asm::parse::parse_operands;
///
/// assert_eq!(
///     parse_operands("BUFFER,X").unwrap(),
///     [Operand::Symbol("BUFFER".into()), Operand::Symbol("X".into())]
/// );
/// assert_eq!(parse_operands("#3").unwrap(), [Operand::Immediate(Target::Number(3))]);
/// ```
pub fn parse_operands(field: &str) -> Result<Vec<Operand>, ParseErr> {
    if field.trim().is_empty() {
        return Ok(vec![]);
    }

    let mut operands = vec![];
    let mut group = vec![];
    let mut start = 0;
    for (token, span) in Token::lexer(field).spanned() {
        match token? {
            Token::Comma => {
                operands.push(operand_from_tokens(&group, &field[start..span.start])?);
                group.clear();
                start = span.end;
            },
            t => group.push(t),
        }
    }
    operands.push(operand_from_tokens(&group, &field[start..])?);

    Ok(operands)
}

/// Parses a single operand.
pub fn parse_operand(s: &str) -> Result<Operand, ParseErr> {
    match <[_; 1]>::try_from(parse_operands(s)?) {
        Ok([op]) => Ok(op),
        Err(_) => Err(ParseErr::UnexpectedOperand(s.to_string())),
    }
}

fn operand_from_tokens(tokens: &[Token], text: &str) -> Result<Operand, ParseErr> {
    let op = match tokens {
        [] => return Err(ParseErr::EmptyOperand),
        [Token::Ident(s)] => Operand::Symbol(s.clone()),
        [Token::Number(n)] => Operand::Number(*n as i32),
        [Token::Minus, Token::Number(n)] => Operand::Number(-(*n as i32)),
        [Token::Hash, Token::Number(n)] => Operand::Immediate(Target::Number(*n)),
        [Token::Hash, Token::Ident(s)]  => Operand::Immediate(Target::Symbol(s.clone())),
        [Token::At, Token::Number(n)]   => Operand::Indirect(Target::Number(*n)),
        [Token::At, Token::Ident(s)]    => Operand::Indirect(Target::Symbol(s.clone())),
        [Token::Equals, Token::Const(c)]  => Operand::Literal(Literal::Bytes(c.clone())),
        [Token::LiteralWord(n)] => Operand::Literal(Literal::Word(*n)),
        [Token::Const(c)] => Operand::Const(c.clone()),
        [Token::Ident(a), Token::Minus, Token::Ident(b)] => Operand::Difference(a.clone(), b.clone()),
        [Token::Star] => Operand::Here,
        _ => return Err(ParseErr::UnexpectedOperand(text.trim().to_string())),
    };

    Ok(op)
}
