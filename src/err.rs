//! Error interface for this crate.
//!
//! Every error raised while loading the instruction registry, tokenizing source lines,
//! or assembling statements implements [`Error`], which extends [`std::error::Error`]
//! with the source line the error refers to and an optional help message.
//!
//! This module also re-exports every error type of the crate, so callers can write
//! `use sicxe_asm::err::{AsmErr, AsmErrKind};`.

use std::borrow::Cow;

pub use crate::asm::label::LabelErr;
pub use crate::asm::{AsmErr, AsmErrKind};
pub use crate::inst::InstTableErr;
pub use crate::parse::lex::LexErr;
pub use crate::parse::ParseErr;

/// Unified error interface for all errors in this crate.
pub trait Error: std::error::Error {
    /// The 1-based source line this error occurred on, if known.
    fn line(&self) -> Option<usize> {
        None
    }

    /// A help message describing how the error can be fixed, if there is one.
    fn help(&self) -> Option<Cow<str>>;
}

/// How serious a diagnostic is.
///
/// Warnings describe statements that were still encoded on a best-effort basis.
/// Errors describe statements whose encoding was skipped entirely.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Severity {
    #[allow(missing_docs)]
    Warning,
    #[allow(missing_docs)]
    Error,
}
impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error   => f.write_str("error"),
        }
    }
}
