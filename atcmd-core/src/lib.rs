//! Byte-fed AT-command (ITU-T V.250 / 3GPP 27.007 style) parser, compile-time
//! catalogue and execution engine for embedded targets.
//!
//! `spec.md` §2 names the ten components this crate is built from (C1–C10);
//! each lives in its own module here:
//!
//! - [`chars`] — C1, character classifier & digit codecs
//! - [`trie`] — C2, the packed name-trie's runtime half (the packer lives in
//!   `atcmd-macros`)
//! - [`param`] — C3, parameter descriptors
//! - [`catalogue`] — C4, command descriptors
//! - [`buffer`] — C5, the line-buffer encoder
//! - [`parser`] — C6, the byte-fed FSM
//! - [`exec`] — C7, the executor (handle objects, suspend/resume/abort)
//! - [`output`] — C8, the output formatter
//! - [`session`] — C9, session parameters (S3/S4/verbose)
//! - [`server`] — C10, the public façade ([`Server`])
//!
//! No heap allocation after construction: every runtime structure is a plain
//! fixed-size array or const-generic buffer, matching `spec.md` §1's "no
//! heap allocation after initialization" requirement more directly than
//! pulling in `heapless` for the hot path would.
#![no_std]

pub mod buffer;
pub mod catalogue;
pub mod chars;
pub mod error;
pub mod exec;
pub mod output;
pub mod param;
pub mod parser;
pub mod server;
pub mod session;
pub mod trie;

pub use catalogue::{BasicCmd, Catalogue, ExtendedCmd, HandlerSet};
pub use error::{Error, NotifyError, SemanticError};
pub use exec::{AbortHandle, BasicHandle, CallType, HandlerResult, ReadHandle, TestHandle, WriteHandle};
pub use output::{NumberBase, PrintCharFn, ResultCode};
pub use param::{ExtParam, ExtParamKind, NumericRanges};
pub use server::Server;
pub use session::SessionParams;
