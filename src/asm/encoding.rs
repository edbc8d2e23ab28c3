//! Formatters which write assembled object files into text.
//!
//! The [`ObjFileFormat`] trait describes an implementation of writing object files.
//! This module provides these implementations of the trait:
//! - [`ObjectRecords`]: the `H`/`D`/`R`/`T`/`M`/`E` records consumed by a SIC/XE linking loader
//! - [`SymbolListing`]: every section's symbol table
//! - [`LiteralListing`]: every section's literal pool

use std::fmt::Write;

use crate::ast::{hex, Directive, Literal, Modification, Record};

use super::{ObjectFile, Section};

/// Maximum number of object code bytes in one text record.
pub const TEXT_RECORD_MAX: u32 = 30;

/// A trait defining object file formats.
pub trait ObjFileFormat {
    /// Representation of the serialized format.
    ///
    /// For binary formats, `[u8]` should be used.
    /// For text-based formats,`str` should be used.
    type Stream: ToOwned + ?Sized;
    /// Serializes into the stream format.
    fn serialize(o: &ObjectFile) -> <Self::Stream as ToOwned>::Owned;
}

/// One object record.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ObjRecord {
    /// Header: program name and length.
    Header {
        #[allow(missing_docs)] name: String,
        #[allow(missing_docs)] length: u32,
    },
    /// Define: exported names and their addresses.
    Define(Vec<(String, u32)>),
    /// Refer: imported names.
    Refer(Vec<String>),
    /// Text: a contiguous run of object code.
    Text {
        #[allow(missing_docs)] start: u32,
        #[allow(missing_docs)] code: Vec<u8>,
    },
    /// Modification: a field the linker must relocate.
    Modification(Modification),
    /// End: the entry address (first section only).
    End(Option<u32>),
}
impl std::fmt::Display for ObjRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjRecord::Header { name, length } => write!(f, "H{name:<6}{length:06X}"),
            ObjRecord::Define(defs) => {
                f.write_char('D')?;
                defs.iter().try_for_each(|(name, addr)| write!(f, "{name:<6}{addr:06X}"))
            },
            ObjRecord::Refer(refs) => {
                f.write_char('R')?;
                refs.iter().try_for_each(|name| write!(f, "{name:<6}"))
            },
            ObjRecord::Text { start, code } => write!(f, "T{start:06X}{:02X}{}", code.len(), hex(code)),
            ObjRecord::Modification(m) => write!(f, "M{:06X}{:02X}{}{}", m.addr, m.half_bytes, m.sign, m.symbol),
            ObjRecord::End(Some(entry)) => write!(f, "E{entry:06X}"),
            ObjRecord::End(None) => f.write_char('E'),
        }
    }
}

impl ObjRecord {
    /// Computes every record of a section, in output order.
    ///
    /// `entry` is the entry address, which is only given for the first section.
    pub fn for_section(section: &Section, entry: Option<u32>) -> Vec<ObjRecord> {
        let mut records = vec![];
        let mut texts = TextPacker::default();

        for stmt in &section.stmts {
            match &stmt.record {
                Some(Record::Header { name, .. }) => {
                    texts.flush(&mut records);
                    records.push(ObjRecord::Header { name: name.clone(), length: section.length });
                },
                Some(Record::Define(defs)) => {
                    texts.flush(&mut records);
                    records.push(ObjRecord::Define(defs.clone()));
                },
                Some(Record::Refer(refs)) => {
                    texts.flush(&mut records);
                    records.push(ObjRecord::Refer(refs.clone()));
                },
                Some(Record::Text) if !stmt.code.is_empty() => {
                    // A literal pool always starts a fresh record.
                    if stmt.operator.is(Directive::Ltorg) {
                        texts.flush(&mut records);
                    }
                    texts.push(stmt.addr, &stmt.code, &mut records);
                },
                // A reserved block ends the record.
                _ if stmt.len > 0 => texts.flush(&mut records),
                _ => {},
            }
        }
        texts.flush(&mut records);

        records.extend(section.modifications.iter().cloned().map(ObjRecord::Modification));
        records.push(ObjRecord::End(entry));
        records
    }
}

/// Greedily packs object code into text records.
#[derive(Default)]
struct TextPacker {
    current: Option<(u32, Vec<u8>)>,
}
impl TextPacker {
    fn push(&mut self, addr: u32, code: &[u8], records: &mut Vec<ObjRecord>) {
        for (i, chunk) in code.chunks(TEXT_RECORD_MAX as usize).enumerate() {
            let addr = addr + i as u32 * TEXT_RECORD_MAX;
            let chunk_end = addr + chunk.len() as u32;

            if let Some((start, buf)) = &self.current {
                let contiguous = *start + buf.len() as u32 == addr;
                let fits = buf.len() + chunk.len() <= TEXT_RECORD_MAX as usize
                    && chunk_end.saturating_sub(*start) <= TEXT_RECORD_MAX;

                if !contiguous || !fits {
                    self.flush(records);
                }
            }

            self.current.get_or_insert_with(|| (addr, vec![]))
                .1
                .extend_from_slice(chunk);
        }
    }

    fn flush(&mut self, records: &mut Vec<ObjRecord>) {
        if let Some((start, code)) = self.current.take() {
            records.push(ObjRecord::Text { start, code });
        }
    }
}

/// The object records of every section, with a blank line after each section.
pub struct ObjectRecords;
impl ObjFileFormat for ObjectRecords {
    type Stream = str;

    fn serialize(o: &ObjectFile) -> <Self::Stream as ToOwned>::Owned {
        let mut buf = String::new();

        for (i, section) in o.sections().iter().enumerate() {
            let entry = (i == 0).then_some(o.entry());
            for record in ObjRecord::for_section(section, entry) {
                // Writing into a String never fails.
                let _ = writeln!(buf, "{record}");
            }
            buf.push('\n');
        }

        buf
    }
}

/// Every section's symbol table (`name<TAB>ADDR`), with a blank line after each section.
pub struct SymbolListing;
impl ObjFileFormat for SymbolListing {
    type Stream = str;

    fn serialize(o: &ObjectFile) -> <Self::Stream as ToOwned>::Owned {
        let mut buf = String::new();

        for section in o.sections() {
            for (name, addr) in section.symbols.iter() {
                if let Some(addr) = addr {
                    let _ = writeln!(buf, "{name}\t{addr:X}");
                }
            }
            buf.push('\n');
        }

        buf
    }
}

/// Every placed literal (`text<TAB>ADDR`, with the literal's `=`, type prefix, and quotes removed).
pub struct LiteralListing;
impl ObjFileFormat for LiteralListing {
    type Stream = str;

    fn serialize(o: &ObjectFile) -> <Self::Stream as ToOwned>::Owned {
        let mut buf = String::new();

        let placed = o.sections().iter()
            .flat_map(|s| s.literals.iter())
            .filter_map(|(name, addr)| Some((name, addr?)));
        for (name, addr) in placed {
            let text = name.parse::<Literal>().map_or_else(|_| name.to_string(), |lit| lit.body());
            let _ = writeln!(buf, "{text}\t{addr:X}");
        }

        buf
    }
}

#[cfg(test)]
mod tests {
    use crate::asm::tests::{COPY_SRC, INST_DATA};
    use crate::asm::{assemble, ObjectFile};
    use crate::ast::{Modification, Sign};
    use crate::inst::InstTable;

    use super::{LiteralListing, ObjFileFormat, ObjRecord, ObjectRecords, SymbolListing};

    fn assemble_src(src: &str) -> ObjectFile {
        let table: InstTable = INST_DATA.parse().unwrap();
        assemble(src, &table)
    }
    fn text_records(obj: &ObjectFile) -> Vec<String> {
        ObjRecord::for_section(&obj.sections()[0], None)
            .into_iter()
            .filter(|r| matches!(r, ObjRecord::Text { .. }))
            .map(|r| r.to_string())
            .collect()
    }

    #[test]
    fn test_record_display() {
        let h = ObjRecord::Header { name: "COPY".into(), length: 0x1033 };
        assert_eq!(h.to_string(), "HCOPY  001033");

        let d = ObjRecord::Define(vec![("BUFFER".into(), 0x33), ("LENGTH".into(), 0x2D)]);
        assert_eq!(d.to_string(), "DBUFFER000033LENGTH00002D");

        let r = ObjRecord::Refer(vec!["RDREC".into(), "WRREC".into()]);
        assert_eq!(r.to_string(), "RRDREC WRREC ");

        let t = ObjRecord::Text { start: 0x30, code: b"EOF".to_vec() };
        assert_eq!(t.to_string(), "T00003003454F46");

        let m = ObjRecord::Modification(Modification { addr: 0x28, half_bytes: 6, sign: Sign::Minus, symbol: "BUFFER".into() });
        assert_eq!(m.to_string(), "M00002806-BUFFER");

        assert_eq!(ObjRecord::End(Some(0)).to_string(), "E000000");
        assert_eq!(ObjRecord::End(None).to_string(), "E");
    }

    #[test]
    fn test_reserved_block_splits_records() {
        let src = "\
PROG\tSTART\t0
\tLDA\t#1
\tLDA\t#2
BUF\tRESB\t40
\tLDA\t#3";
        let obj = assemble_src(src);
        assert_eq!(text_records(&obj), ["T00000006010001010002", "T00002E03010003"]);
    }

    #[test]
    fn test_record_limit() {
        // 11 instructions * 3 bytes = 33 bytes, so the 11th starts a new record
        let mut src = String::from("PROG\tSTART\t0\n");
        for _ in 0..11 {
            src.push_str("\tLDA\t#1\n");
        }
        let obj = assemble_src(&src);

        let texts = text_records(&obj);
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("T0000001E"));
        assert_eq!(texts[1], "T00001E03010001");
    }

    #[test]
    fn test_ltorg_starts_record() {
        let src = "\
PROG\tSTART\t0
\tLDA\t=X'05'
\tLTORG
\tLDA\t#1
\tEND";
        let obj = assemble_src(src);
        assert_eq!(text_records(&obj), ["T00000003032000", "T0000030405010001"]);
    }

    #[test]
    fn test_markers_do_not_split() {
        let src = "\
PROG\tSTART\t0
\tLDA\t#1
HERE\tEQU\t*
\tBASE\tHERE
\tLDA\t#2";
        let obj = assemble_src(src);
        assert_eq!(text_records(&obj), ["T00000006010001010002"]);
    }

    #[test]
    fn test_long_constant_splits() {
        let src = format!("PROG\tSTART\t0\nLONG\tBYTE\tC'{}'\n", "A".repeat(35));
        let obj = assemble_src(&src);

        let texts = text_records(&obj);
        assert_eq!(texts, [
            format!("T0000001E{}", "41".repeat(30)),
            format!("T00001E05{}", "41".repeat(5)),
        ]);
    }

    #[test]
    fn test_text_record_bounds() {
        let obj = assemble_src(COPY_SRC);
        for (i, section) in obj.sections().iter().enumerate() {
            let entry = (i == 0).then_some(obj.entry());
            for record in ObjRecord::for_section(section, entry) {
                if let ObjRecord::Text { code, .. } = record {
                    assert!((1..=30).contains(&code.len()));
                }
            }
        }
    }

    #[test]
    fn test_copy_object() {
        let obj = assemble_src(COPY_SRC);
        let expected = include_str!("../../tests/expected/copy.obj");
        assert_eq!(ObjectRecords::serialize(&obj), expected);
    }

    #[test]
    fn test_copy_listings() {
        let obj = assemble_src(COPY_SRC);
        assert_eq!(SymbolListing::serialize(&obj), include_str!("../../tests/expected/copy.symtab"));
        assert_eq!(LiteralListing::serialize(&obj), include_str!("../../tests/expected/copy.littab"));
    }
}
