//! The instruction registry.
//!
//! The registry maps each SIC/XE mnemonic to its [`InstSpec`]: opcode, base format,
//! and operand count. It is loaded once from a tab-delimited specification
//! (one line per mnemonic) and is read-only afterwards, so it can be shared freely
//! between section workers.
//!
//! ```text
//! LDA     00      3       1
//! CLEAR   B4      2       1
//! RSUB    4C      3       0
//! ```
//!
//! Format 4 is never listed; it is format 3 written with a `+` prefix on the mnemonic.

use std::collections::HashMap;
use std::path::Path;

/// Specification of one machine instruction.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct InstSpec {
    /// The mnemonic (e.g., `LDA`).
    pub mnemonic: String,
    /// The opcode byte. For format 3/4 instructions, the low two bits are always clear
    /// (they are occupied by the `n` and `i` flags when encoded).
    pub opcode: u8,
    /// The base format (1, 2, or 3).
    pub format: u8,
    /// The number of operands the instruction takes.
    pub operand_count: usize,
}

impl std::str::FromStr for InstSpec {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.split('\t')
            .map(str::trim)
            .filter(|f| !f.is_empty());

        let mut next = |what: &str| fields.next().ok_or_else(|| format!("missing {what}"));

        let mnemonic = next("mnemonic")?.to_string();
        let opcode_s = next("opcode")?;
        let format_s = next("format")?;
        let count_s  = next("operand count")?;

        let opcode = u8::from_str_radix(opcode_s, 16)
            .map_err(|_| format!("invalid opcode `{opcode_s}`"))?;
        let format = match format_s.parse::<u8>() {
            Ok(f @ 1..=3) => f,
            _ => return Err(format!("invalid format `{format_s}`")),
        };
        let operand_count = count_s.parse::<usize>()
            .map_err(|_| format!("invalid operand count `{count_s}`"))?;

        Ok(InstSpec { mnemonic, opcode, format, operand_count })
    }
}

/// Errors raised while loading the instruction registry.
#[derive(Debug)]
pub enum InstTableErr {
    /// The specification file could not be read.
    MissingSpecFile(std::io::Error),
    /// A line of the specification could not be parsed.
    MalformedSpec {
        /// 1-based line number in the specification.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },
}
impl std::fmt::Display for InstTableErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSpecFile(e)            => write!(f, "cannot read instruction specification: {e}"),
            Self::MalformedSpec { line, reason } => write!(f, "malformed instruction specification on line {line}: {reason}"),
        }
    }
}
impl std::error::Error for InstTableErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MissingSpecFile(e) => Some(e),
            Self::MalformedSpec { .. } => None,
        }
    }
}
impl crate::err::Error for InstTableErr {
    fn line(&self) -> Option<usize> {
        match self {
            Self::MissingSpecFile(_) => None,
            Self::MalformedSpec { line, .. } => Some(*line),
        }
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            Self::MissingSpecFile(_) => Some("check the path given for the instruction specification".into()),
            Self::MalformedSpec { .. } => Some("each line should be `mnemonic<TAB>opcodeHex<TAB>format<TAB>operandCount`".into()),
        }
    }
}

/// The instruction registry.
///
/// ## Example
/// ```
/// use sicxe_asm::inst::InstTable;
///
/// let table: InstTable = "LDA\t00\t3\t1\nCLEAR\tB4\t2\t1\n".parse().unwrap();
/// assert_eq!(table.get("LDA").map(|s| s.opcode), Some(0x00));
/// assert_eq!(table.format_of("+LDA"), Some(4));
/// assert_eq!(table.format_of("CLEAR"), Some(2));
/// assert_eq!(table.format_of("STA"), None);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct InstTable {
    inst_map: HashMap<String, InstSpec>,
}

impl InstTable {
    /// Loads the registry from a specification file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InstTableErr> {
        let text = std::fs::read_to_string(path).map_err(InstTableErr::MissingSpecFile)?;
        text.parse()
    }

    /// Gets the specification of a base mnemonic (without a `+` prefix).
    pub fn get(&self, mnemonic: &str) -> Option<&InstSpec> {
        self.inst_map.get(mnemonic)
    }

    /// Gets the encoded length (in bytes) of an operator, accounting for the `+` extended-format prefix.
    ///
    /// This returns `None` if the operator is not a known mnemonic.
    pub fn format_of(&self, operator: &str) -> Option<u8> {
        match operator.strip_prefix('+') {
            Some(base) => self.get(base).map(|s| s.format + 1),
            None => self.get(operator).map(|s| s.format),
        }
    }

    /// The number of mnemonics in the registry.
    pub fn len(&self) -> usize {
        self.inst_map.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.inst_map.is_empty()
    }

    /// Iterates over every specification in the registry (in no particular order).
    pub fn iter(&self) -> impl Iterator<Item=&InstSpec> + '_ {
        self.inst_map.values()
    }
}
impl std::str::FromStr for InstTable {
    type Err = InstTableErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inst_map = s.lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| {
                l.parse::<InstSpec>()
                    .map(|spec| (spec.mnemonic.clone(), spec))
                    .map_err(|reason| InstTableErr::MalformedSpec { line: i + 1, reason })
            })
            .collect::<Result<_, _>>()?;

        Ok(InstTable { inst_map })
    }
}

#[cfg(test)]
mod tests {
    use super::{InstTable, InstTableErr};

    #[test]
    fn test_parse_registry() {
        let table: InstTable = "\
            LDA\t00\t3\t1\n\
            \n\
            COMPR\tA0\t2\t2\r\n\
            FIX\tC4\t1\t0\n\
        ".parse().unwrap();

        assert_eq!(table.len(), 3);

        let compr = table.get("COMPR").unwrap();
        assert_eq!(compr.opcode, 0xA0);
        assert_eq!(compr.format, 2);
        assert_eq!(compr.operand_count, 2);

        assert_eq!(table.format_of("FIX"), Some(1));
        assert_eq!(table.format_of("LDA"), Some(3));
        assert_eq!(table.format_of("+LDA"), Some(4));
        assert_eq!(table.format_of("+STA"), None);
        assert_eq!(table.format_of("lda"), None);
    }

    #[test]
    fn test_malformed_registry() {
        let err = "LDA\t00\t3\t1\nSTA\tZZ\t3\t1\n".parse::<InstTable>().unwrap_err();
        assert!(matches!(err, InstTableErr::MalformedSpec { line: 2, .. }));

        let err = "LDA\t00\t5\t1\n".parse::<InstTable>().unwrap_err();
        assert!(matches!(err, InstTableErr::MalformedSpec { line: 1, .. }));

        let err = "LDA\t00\n".parse::<InstTable>().unwrap_err();
        assert!(matches!(err, InstTableErr::MalformedSpec { line: 1, .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = InstTable::from_file("this/path/does/not/exist/inst.data").unwrap_err();
        assert!(matches!(err, InstTableErr::MissingSpecFile(_)));
    }
}
