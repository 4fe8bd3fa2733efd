//! Public façade (C10).
//!
//! Ties C4–C9 together behind the four entry points `spec.md` §4.10 names:
//! `feed`, `notify_done`, `set_context`/`get_context`, and
//! `set_print_callback`/`get_print_callback`. `Settings` (`spec.md` §3 —
//! "fixes the three command lists and max_commands_per_line") is resolved
//! here as a `&'static Catalogue` handed to the constructor plus the buffer
//! capacity `B` as a const generic, rather than a dedicated `Settings`
//! trait: the catalogue is already the one piece of build-time data the
//! façade needs, and a trait purely to bundle "catalogue + one integer"
//! would add a layer of indirection the teacher's own `ShellConfig` (a
//! plain struct of function pointers assembled once) doesn't reach for
//! either. See `DESIGN.md` for the Open Question this resolves.

use crate::buffer::LineBuffer;
use crate::catalogue::Catalogue;
use crate::error::{Error, NotifyError};
use crate::exec::{self, ExecState};
use crate::output::{OutputContext, PrintCharFn};
use crate::parser::{Parser, StepOutcome};
use crate::session::SessionParams;

#[cfg(feature = "log")]
use atcmd_logger::{log_debug, log_trace};

/// The byte-fed AT-command server. `B` is the line-buffer capacity in
/// bytes, sized per `spec.md` §6's "Line-buffer capacity formula"
/// (`max_commands_per_line * max_per_command_size`) — computed by
/// `atcmd-macros` alongside the catalogue it emits.
pub struct Server<const B: usize> {
    cat: &'static Catalogue,
    buf: LineBuffer<B>,
    parser: Parser,
    exec: ExecState,
    out: OutputContext,
    session: SessionParams,
}

impl<const B: usize> Server<B> {
    /// Builds a server over a compile-time catalogue. `context` is the
    /// opaque pointer handlers can later retrieve via
    /// [`BasicHandle::context`](crate::exec::BasicHandle::context) and
    /// friends (`spec.md` §3 "OutputContext").
    pub const fn new(cat: &'static Catalogue, print_char: PrintCharFn, context: Option<*mut ()>) -> Self {
        Self {
            cat,
            buf: LineBuffer::new(),
            parser: Parser::new(cat.trie),
            exec: ExecState::new(),
            out: OutputContext::new(print_char, context),
            session: SessionParams::new(),
        }
    }

    /// Feeds one byte into the parser. `abortable` mirrors `spec.md` §4.10:
    /// when `true` and the server is mid-execution of a suspended
    /// (`ASYNC`) command, this byte is interpreted as an abort trigger
    /// instead of being parsed.
    pub fn feed(&mut self, byte: u8, abortable: bool) {
        let b = if self.parser.in_quoted_string() {
            byte
        } else {
            crate::chars::to_upper(byte)
        };

        #[cfg(feature = "log")]
        log_trace!("feed byte={:#04x} abortable={}", b, abortable);

        match self.parser.feed(b, abortable, &mut self.buf, self.cat, &self.session) {
            StepOutcome::Continue => {}
            StepOutcome::Finalize { error } => self.run_to_completion_or_suspend(error),
            StepOutcome::AbortRequested => {
                let ctx = self.out.context();
                if exec::abort_current(&mut self.buf, self.cat, &mut self.out, &self.session, &mut self.exec, ctx) {
                    #[cfg(feature = "log")]
                    log_debug!("abort succeeded, returning to idle");
                    self.parser.return_to_idle();
                } else {
                    #[cfg(feature = "log")]
                    log_trace!("abort ignored: not abortable or no suspended command");
                }
            }
        }
    }

    fn run_to_completion_or_suspend(&mut self, error: bool) {
        let ctx = self.out.context();
        let done = exec::start_exec(error, &mut self.buf, self.cat, &mut self.out, &mut self.session, &mut self.exec, ctx);
        if done {
            #[cfg(feature = "log")]
            log_debug!("line finished, error_seen={}", self.exec.error_seen);
            self.parser.return_to_idle();
        } else {
            #[cfg(feature = "log")]
            log_debug!("line suspended on command id {:?}", self.exec.suspended.map(|s| s.cmd_id));
        }
    }

    /// Resumes a suspended command (`spec.md` §4.7 "Asynchronous
    /// completion"). `cmd_id` must match [`Self::suspended_cmd_id`]; a
    /// stale or absent suspension is reported rather than silently
    /// ignored, unlike the lower-level [`exec::notify_done`] this wraps —
    /// an ambient diagnostic, not a protocol change (the wire itself never
    /// surfaces this).
    pub fn notify_done(&mut self, cmd_id: u16) -> Result<(), NotifyError> {
        match self.exec.suspended {
            None => return Err(NotifyError::NotSuspended),
            Some(call) if call.cmd_id != cmd_id => return Err(NotifyError::IdMismatch),
            _ => {}
        }
        let ctx = self.out.context();
        let done = exec::notify_done(cmd_id, &mut self.buf, self.cat, &mut self.out, &mut self.session, &mut self.exec, ctx);
        if done {
            #[cfg(feature = "log")]
            log_debug!("resumed command {} ran to completion", cmd_id);
            self.parser.return_to_idle();
        }
        Ok(())
    }

    /// The `cmd_id` a suspended command must be resumed with, or `None` if
    /// nothing is suspended. External async workers (timers, background
    /// threads posting back to the engine's thread) read this once when
    /// their handler first returns `ASYNC`, and hand it back to
    /// [`Self::notify_done`] on completion.
    pub fn suspended_cmd_id(&self) -> Option<u16> {
        self.exec.suspended.map(|s| s.cmd_id)
    }

    /// Coarse observability hook (`SPEC_FULL.md` §10): `Some(_)` after any
    /// line that ended in `ERROR`. The parser does not tag which of
    /// `spec.md` §7's four error kinds tripped on a given line — only
    /// `Error::Syntax` is ever returned here — so this answers "did the
    /// last line fail" more usefully than "why"; the wire protocol itself
    /// never exposes more than the single `ERROR` result code either way.
    pub fn last_error(&self) -> Option<Error> {
        if self.exec.error_seen {
            Some(Error::Syntax)
        } else {
            None
        }
    }

    pub fn set_context(&mut self, ctx: Option<*mut ()>) {
        self.out.set_context(ctx);
    }

    pub fn get_context(&self) -> Option<*mut ()> {
        self.out.context()
    }

    pub fn set_print_callback(&mut self, cb: PrintCharFn) {
        self.out.set_print_callback(cb);
    }

    pub fn get_print_callback(&self) -> PrintCharFn {
        self.out.print_callback()
    }

    pub fn session_params(&self) -> &SessionParams {
        &self.session
    }

    pub fn session_params_mut(&mut self) -> &mut SessionParams {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{BasicCmd, ExtendedCmd, HandlerSet};
    use crate::exec::{BasicHandle, CallType, HandlerResult, ReadHandle, WriteHandle};
    use crate::param::{ExtParam, ExtParamKind};
    use core::cell::RefCell;
    use std::boxed::Box;
    use std::sync::OnceLock;
    use std::vec::Vec;

    fn recorder(b: u8, ctx: Option<*mut ()>) {
        let ptr = ctx.unwrap() as *mut RefCell<Vec<u8>>;
        unsafe { (*ptr).borrow_mut().push(b) };
    }

    fn v_handler(h: &mut BasicHandle<'_>, _c: CallType) -> HandlerResult {
        h.info_text(|o| o.print_text("v-ok"));
        HandlerResult::Ok
    }

    fn gci_write(h: &mut WriteHandle<'_>, _c: CallType) -> HandlerResult {
        let _ = h.params().numeric();
        HandlerResult::Ok
    }

    fn gci_read(h: &mut ReadHandle<'_>, _c: CallType) -> HandlerResult {
        h.ext_info_text(|o| o.print_param_numeric(0xFF, crate::output::NumberBase::Hex));
        HandlerResult::Ok
    }

    static GCI_PARAMS: [ExtParam; 1] = [ExtParam {
        kind: ExtParamKind::Hex {
            ranges: &[(0, 255)],
            default: None,
        },
        is_optional: false,
    }];

    static BASIC: [BasicCmd; 1] = [BasicCmd {
        letter: b'V',
        numeric_ranges: None,
        exec: v_handler,
    }];

    // "+GCI" trie rooted with a synthetic root byte (char 0, non-leaf,
    // non-last — `spec.md` §4.2) whose sole child is the packed "GCI" chain.
    fn build_gci_trie() -> &'static [u8] {
        use crate::chars::encode;
        let node_i = std::vec![0xC0 | encode(b'I'), 0, 0];
        let mut node_c = std::vec![0x80 | encode(b'C'), node_i.len() as u8];
        node_c.extend_from_slice(&node_i);
        let mut node_g = std::vec![0x80 | encode(b'G'), node_c.len() as u8];
        node_g.extend_from_slice(&node_c);
        let mut root = std::vec![0x00u8, node_g.len() as u8];
        root.extend_from_slice(&node_g);
        Box::leak(root.into_boxed_slice())
    }

    fn catalogue() -> &'static Catalogue {
        static EXT: OnceLock<Vec<ExtendedCmd>> = OnceLock::new();
        let ext = EXT.get_or_init(|| {
            std::vec![ExtendedCmd {
                name: "GCI",
                params: &GCI_PARAMS,
                handlers: HandlerSet::READABLE.union(HandlerSet::WRITABLE),
                read: Some(gci_read),
                write: Some(gci_write),
                test: None,
                abort: None,
            }]
        });
        static CAT: OnceLock<Catalogue> = OnceLock::new();
        CAT.get_or_init(|| Catalogue {
            trie: build_gci_trie(),
            extended: ext.as_slice(),
            basic: &BASIC,
            ampersand: &[],
        })
    }

    fn feed_str(server: &mut Server<128>, s: &str) {
        for &b in s.as_bytes() {
            server.feed(b, false);
        }
    }

    #[test]
    fn boundary_scenario_1_at_ok() {
        let rec = Box::leak(Box::new(RefCell::new(Vec::<u8>::new())));
        let ptr = rec as *const RefCell<Vec<u8>> as *mut ();
        let mut server: Server<128> = Server::new(catalogue(), recorder, Some(ptr));
        feed_str(&mut server, "AT\r");
        assert_eq!(rec.borrow().as_slice(), b"\r\nOK\r\n");
    }

    #[test]
    fn boundary_scenario_2_lowercase_upcased() {
        let rec = Box::leak(Box::new(RefCell::new(Vec::<u8>::new())));
        let ptr = rec as *const RefCell<Vec<u8>> as *mut ();
        let mut server: Server<128> = Server::new(catalogue(), recorder, Some(ptr));
        feed_str(&mut server, "at v\r");
        assert_eq!(rec.borrow().as_slice(), b"\r\nv-ok\r\n\r\nOK\r\n");
    }

    #[test]
    fn boundary_scenario_3_gci_write_then_read() {
        let rec = Box::leak(Box::new(RefCell::new(Vec::<u8>::new())));
        let ptr = rec as *const RefCell<Vec<u8>> as *mut ();
        let mut server: Server<128> = Server::new(catalogue(), recorder, Some(ptr));
        feed_str(&mut server, "AT+GCI=FF\r");
        assert_eq!(rec.borrow().as_slice(), b"\r\nOK\r\n");
        rec.borrow_mut().clear();
        feed_str(&mut server, "AT+GCI?\r");
        assert_eq!(rec.borrow().as_slice(), b"\r\n+GCI:FF\r\n\r\nOK\r\n");
    }

    #[test]
    fn boundary_scenario_4_out_of_range_errors_without_invoking_handler() {
        let rec = Box::leak(Box::new(RefCell::new(Vec::<u8>::new())));
        let ptr = rec as *const RefCell<Vec<u8>> as *mut ();
        let mut server: Server<128> = Server::new(catalogue(), recorder, Some(ptr));
        feed_str(&mut server, "AT+GCI=100\r");
        assert_eq!(rec.borrow().as_slice(), b"\r\nERROR\r\n");
    }

    #[test]
    fn boundary_scenario_8_silenced_intermediate_command() {
        let rec = Box::leak(Box::new(RefCell::new(Vec::<u8>::new())));
        let ptr = rec as *const RefCell<Vec<u8>> as *mut ();
        let mut server: Server<128> = Server::new(catalogue(), recorder, Some(ptr));
        feed_str(&mut server, "ATV;+GCI=01\r");
        assert_eq!(rec.borrow().as_slice(), b"\r\nOK\r\n");
    }

    #[test]
    fn set_and_get_context_round_trip() {
        let mut server: Server<32> = Server::new(catalogue(), recorder, None);
        assert_eq!(server.get_context(), None);
        let sentinel = 0xDEAD_u32 as *mut ();
        server.set_context(Some(sentinel));
        assert_eq!(server.get_context(), Some(sentinel));
    }

    #[test]
    fn notify_done_reports_not_suspended() {
        let mut server: Server<32> = Server::new(catalogue(), recorder, None);
        assert_eq!(server.notify_done(0), Err(NotifyError::NotSuspended));
    }
}
