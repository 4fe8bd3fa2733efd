//! Unified error type (C10 ambient addition, `SPEC_FULL.md` §10).
//!
//! The wire protocol only ever surfaces a single `ERROR` result code
//! (`spec.md` §7); this enum is an observability addition so a handler
//! author or test can ask *why* a line failed, the way
//! `ushell_dispatcher::DispatchError` gives diagnostics beyond the
//! `Result<(), &str>` its macro-generated `dispatch()` returns.

/// One of the four error kinds `spec.md` §7 defines, all surfaced to the
/// wire identically as `ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Unexpected byte for the current parser state.
    Syntax,
    /// Unknown basic/ampersand letter, trie miss, or a mode (read/write/
    /// test) with no registered handler.
    UnknownCommand,
    /// Numeric overflow/out-of-range, string/hex-string too long, a comma
    /// where no parameter may follow, a missing mandatory parameter, or an
    /// odd hex-string nibble count.
    Semantic(SemanticError),
    /// Line-buffer exhausted while encoding.
    Resource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticError {
    NumericOverflow,
    OutOfRange,
    StringTooLong,
    HexStringTooLong,
    OddHexNibbleCount,
    UnexpectedSeparator,
    MissingMandatoryParam,
}

/// Why [`crate::server::Server::notify_done`] refused a resumption
/// (`SPEC_FULL.md` §7 "the core itself exposes a single `notify_done`...").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    /// No command is currently suspended.
    NotSuspended,
    /// A command is suspended, but under a different `cmd_id`.
    IdMismatch,
}

impl core::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NotifyError::NotSuspended => write!(f, "no command is suspended"),
            NotifyError::IdMismatch => write!(f, "suspended command id does not match"),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Syntax => write!(f, "syntax error"),
            Error::UnknownCommand => write!(f, "unknown command"),
            Error::Semantic(s) => write!(f, "semantic error: {s}"),
            Error::Resource => write!(f, "line buffer exhausted"),
        }
    }
}

impl core::fmt::Display for SemanticError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            SemanticError::NumericOverflow => "numeric overflow",
            SemanticError::OutOfRange => "value outside declared range",
            SemanticError::StringTooLong => "string exceeds max_length",
            SemanticError::HexStringTooLong => "hex-string exceeds max_size",
            SemanticError::OddHexNibbleCount => "odd hex-string nibble count",
            SemanticError::UnexpectedSeparator => "unexpected parameter separator",
            SemanticError::MissingMandatoryParam => "missing mandatory parameter",
        };
        write!(f, "{s}")
    }
}
