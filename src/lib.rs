//! A SIC/XE two-pass assembler.
//!
//! This converts SIC/XE assembly source into relocatable object records
//! (`H`/`D`/`R`/`T`/`M`/`E`) for a SIC/XE linking loader.
//!
//! # Usage
//!
//! The assembler needs an instruction registry, which maps each mnemonic to its opcode,
//! format, and operand count:
//! ```
//! use sicxe_asm::inst::InstTable;
//!
//! let table: InstTable = "\
//!     LDA\t00\t3\t1\n\
//!     STA\t0C\t3\t1\n\
//!     RSUB\t4C\t3\t0\n\
//! ".parse().unwrap();
//! ```
//!
//! Source text can then be assembled and written out as object records:
//! ```
//! # use sicxe_asm::inst::InstTable;
//! # let table: InstTable = "LDA\t00\t3\t1\nSTA\t0C\t3\t1\nRSUB\t4C\t3\t0\n".parse().unwrap();
//! use sicxe_asm::asm::assemble;
//! use sicxe_asm::asm::encoding::{ObjFileFormat, ObjectRecords};
//!
//! let src = "\
//!     PROG\tSTART\t0\n\
//!     FIRST\tLDA\t#5\n\
//!     \tSTA\tRESULT\n\
//!     \tRSUB\n\
//!     RESULT\tRESW\t1\n\
//!     \tEND\tFIRST\n\
//! ";
//! let obj = assemble(src, &table);
//! assert!(obj.diagnostics().is_empty());
//!
//! assert_eq!(ObjectRecords::serialize(&obj), "\
//!     HPROG  00000C\n\
//!     T000000090100050F20034F0000\n\
//!     E000000\n\
//!     \n\
//! ");
//! ```
//!
//! Assembly never stops at the first problem. Each diagnostic is recorded on the
//! [`ObjectFile`] (see [`ObjectFile::diagnostics`]), and the statement it refers to is
//! skipped or encoded on a best-effort basis.
//!
//! [`ObjectFile`]: asm::ObjectFile
//! [`ObjectFile::diagnostics`]: asm::ObjectFile::diagnostics
#![warn(missing_docs)]

pub mod inst;
pub mod parse;
pub mod ast;
pub mod asm;
pub mod err;
