//! Executor (C7) — handle objects, handler function-pointer types, and the
//! suspend/resume/abort bookkeeping described in `spec.md` §4.7. The
//! walk-the-encoded-line loop itself lives in `server.rs`, which owns the
//! buffer, catalogue and output context this module's handles borrow.

use crate::buffer::LineBuffer;
use crate::catalogue::Catalogue;
use crate::output::{NumberBase, OutputContext, ResultCode};
use crate::param::{ExtParam, ExtParamKind};
use crate::parser::basic_cmd_offset;
use crate::session::SessionParams;

/// What a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    Ok,
    Error,
    /// Releases the engine until a matching `notify_done` arrives
    /// (`spec.md` §4.7 "Asynchronous completion").
    Async,
}

/// Why a handler is being invoked this time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    /// First call for this command on this line.
    Request,
    /// Re-entry after `notify_done`.
    Response,
    /// One-shot: the engine is about to discard this command
    /// (`spec.md` §4.7 "Abort").
    Abort,
}

pub type BasicHandlerFn = fn(&mut BasicHandle<'_>, CallType) -> HandlerResult;
pub type ExtWriteHandlerFn = fn(&mut WriteHandle<'_>, CallType) -> HandlerResult;
pub type ExtReadHandlerFn = fn(&mut ReadHandle<'_>, CallType) -> HandlerResult;
/// Returns `Some(name)` to request the default range-listing print,
/// `None` if the handler already printed everything itself (`spec.md`
/// §4.7: "if that returns a non-null name, the executor prints the
/// command's parameter ranges").
pub type ExtTestHandlerFn = fn(&mut TestHandle<'_>) -> Option<&'static str>;
pub type ExtAbortHandlerFn = fn(&mut AbortHandle<'_>) -> HandlerResult;

/// Sequential reader over a write command's encoded parameter region.
/// Handlers call `numeric`/`string`/`hex_string` in the command's declared
/// parameter order; a debug assertion catches a handler calling the wrong
/// accessor for the declared kind (`spec.md` §9 design note: "a small
/// runtime check... violations are programmer bugs surfaced as assertion
/// failures").
pub struct ParamReader<'a> {
    data: &'a [u8],
    offset: usize,
    params: &'static [ExtParam],
    idx: usize,
}

impl<'a> ParamReader<'a> {
    pub(crate) fn new(data: &'a [u8], params: &'static [ExtParam]) -> Self {
        Self {
            data,
            offset: 0,
            params,
            idx: 0,
        }
    }

    fn advance(&mut self, n: usize) {
        self.offset += n;
        self.idx += 1;
    }

    /// Reads the next parameter as a numeric value. Valid for `Dec`/`Hex`/
    /// `Bin` parameters.
    pub fn numeric(&mut self) -> u32 {
        debug_assert!(matches!(
            self.params[self.idx].kind,
            ExtParamKind::Dec { .. } | ExtParamKind::Hex { .. } | ExtParamKind::Bin { .. }
        ));
        let v = u32::from_le_bytes([
            self.data[self.offset],
            self.data[self.offset + 1],
            self.data[self.offset + 2],
            self.data[self.offset + 3],
        ]);
        self.advance(4);
        v
    }

    /// Reads the next parameter as a NUL-terminated string. Valid for
    /// `Str` parameters.
    pub fn string(&mut self) -> &'a str {
        let ExtParamKind::Str { max_length, .. } = self.params[self.idx].kind else {
            debug_assert!(false, "string() called on a non-string parameter");
            return "";
        };
        let slot_len = max_length as usize + 1;
        let slot = &self.data[self.offset..self.offset + slot_len];
        let len = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
        self.advance(slot_len);
        core::str::from_utf8(&slot[..len]).unwrap_or("")
    }

    /// Reads the next parameter as raw bytes. Valid for `HexStr`
    /// parameters.
    pub fn hex_string(&mut self) -> &'a [u8] {
        let ExtParamKind::HexStr { max_size, .. } = self.params[self.idx].kind else {
            debug_assert!(false, "hex_string() called on a non-hex-string parameter");
            return &[];
        };
        let max = max_size as usize;
        let len_lo = self.data[self.offset + max] as usize;
        let len_hi = self.data[self.offset + max + 1] as usize;
        let len = len_lo | (len_hi << 8);
        let bytes = &self.data[self.offset..self.offset + len];
        self.advance(max + 2);
        bytes
    }
}

/// Shared helper: info text framed by header/trailer, honoring the
/// silencing scope the executor already established around the whole
/// handler call.
fn info_text_impl(out: &mut OutputContext, session: &SessionParams, body: impl FnOnce(&mut OutputContext)) {
    out.print_info_header(session);
    body(out);
    out.print_info_trailer(session);
}

/// Handle passed to a basic/ampersand command's handler.
pub struct BasicHandle<'a> {
    pub(crate) ctx: Option<*mut ()>,
    pub(crate) out: &'a mut OutputContext,
    pub(crate) session: &'a SessionParams,
    pub(crate) letter: u8,
    pub(crate) param: Option<u32>,
    pub(crate) is_last: bool,
}

impl<'a> BasicHandle<'a> {
    /// Opaque pointer installed via `Server::set_context` (`spec.md` §3).
    ///
    /// # Safety
    /// The caller must know the pointee's real type; the core never
    /// dereferences it itself.
    pub fn context(&self) -> Option<*mut ()> {
        self.ctx
    }

    pub fn letter(&self) -> u8 {
        self.letter
    }

    /// `Some(v)` when the command carries its (optional) numeric
    /// parameter; `None` for a bare basic command.
    pub fn param(&self) -> Option<u32> {
        self.param
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }

    pub fn info_text(&mut self, f: impl FnOnce(&mut OutputContext)) {
        info_text_impl(self.out, self.session, f);
    }
}

/// Handle passed to an extended command's write handler.
pub struct WriteHandle<'a> {
    pub(crate) ctx: Option<*mut ()>,
    pub(crate) out: &'a mut OutputContext,
    pub(crate) session: &'a SessionParams,
    pub(crate) name: &'static str,
    pub(crate) params: ParamReader<'a>,
    pub(crate) is_last: bool,
}

impl<'a> WriteHandle<'a> {
    pub fn context(&self) -> Option<*mut ()> {
        self.ctx
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }

    /// Sequential access to this command's write parameters, in
    /// declaration order.
    pub fn params(&mut self) -> &mut ParamReader<'a> {
        &mut self.params
    }

    pub fn info_text(&mut self, f: impl FnOnce(&mut OutputContext)) {
        info_text_impl(self.out, self.session, f);
    }
}

/// Handle passed to an extended command's read handler.
pub struct ReadHandle<'a> {
    pub(crate) ctx: Option<*mut ()>,
    pub(crate) out: &'a mut OutputContext,
    pub(crate) session: &'a SessionParams,
    pub(crate) name: &'static str,
    pub(crate) is_last: bool,
}

impl<'a> ReadHandle<'a> {
    pub fn context(&self) -> Option<*mut ()> {
        self.ctx
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }

    /// Emits `+NAME:` followed by `body`'s printed parameter values,
    /// framed by the info header/trailer — the shape every boundary
    /// scenario's `AT+X?` reply uses (`spec.md` §8).
    pub fn ext_info_text(&mut self, f: impl FnOnce(&mut OutputContext)) {
        let name = self.name;
        info_text_impl(self.out, self.session, |out| {
            out.print_ext_info_header(name);
            f(out);
        });
    }

    pub fn print_param_numeric(&mut self, value: u32, base: NumberBase) {
        self.out.print_number(value, base);
    }

    pub fn print_param_string(&mut self, s: &str) {
        self.out.print_string(s);
    }

    pub fn print_param_hex(&mut self, bytes: &[u8]) {
        self.out.print_hex_string(bytes);
    }
}

/// Handle passed to an extended command's test handler (`+NAME=?`).
pub struct TestHandle<'a> {
    pub(crate) ctx: Option<*mut ()>,
    pub(crate) name: &'static str,
    pub(crate) params: &'static [ExtParam],
    _marker: core::marker::PhantomData<&'a ()>,
}

impl<'a> TestHandle<'a> {
    pub(crate) fn new(ctx: Option<*mut ()>, name: &'static str, params: &'static [ExtParam]) -> Self {
        Self {
            ctx,
            name,
            params,
            _marker: core::marker::PhantomData,
        }
    }

    pub fn context(&self) -> Option<*mut ()> {
        self.ctx
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &'static [ExtParam] {
        self.params
    }
}

/// Handle passed to an extended command's abort handler.
pub struct AbortHandle<'a> {
    pub(crate) ctx: Option<*mut ()>,
    pub(crate) name: &'static str,
    _marker: core::marker::PhantomData<&'a ()>,
}

impl<'a> AbortHandle<'a> {
    pub(crate) fn new(ctx: Option<*mut ()>, name: &'static str) -> Self {
        Self {
            ctx,
            name,
            _marker: core::marker::PhantomData,
        }
    }

    pub fn context(&self) -> Option<*mut ()> {
        self.ctx
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// The single optional record needed to represent a suspended command
/// (`spec.md` §9 design note: "Async callback-as-restart").
#[derive(Debug, Clone, Copy)]
pub struct SuspendedCall {
    pub cmd_id: u16,
    pub exec_index: usize,
}

/// Per-line execution state (`spec.md` §3 `ExecState`).
pub struct ExecState {
    pub last_result: HandlerResult,
    pub error_seen: bool,
    pub suspended: Option<SuspendedCall>,
}

impl ExecState {
    pub const fn new() -> Self {
        Self {
            last_result: HandlerResult::Ok,
            error_seen: false,
            suspended: None,
        }
    }

    pub fn start(&mut self, error_seen: bool) {
        self.last_result = HandlerResult::Ok;
        self.error_seen = error_seen;
        self.suspended = None;
    }
}

/// Runs (or resumes) the executor loop from `buf.exec_index()` up to
/// `buf.parse_ok_index()`, dispatching one sub-command per iteration. Stops
/// and returns `false` the moment a handler returns `Async` (after recording
/// the suspension in `exec.suspended`); otherwise walks to the end of the
/// line, prints the final result code, and returns `true`.
///
/// `resume_as_response` is `true` only for the first iteration of a call
/// made from [`notify_done`] — that one re-invokes the just-resumed
/// command's handler with [`CallType::Response`] instead of
/// [`CallType::Request`] (`spec.md` §4.7 "Asynchronous completion").
fn continue_exec<const B: usize>(
    resume_as_response: bool,
    buf: &mut LineBuffer<B>,
    cat: &'static Catalogue,
    out: &mut OutputContext,
    session: &mut SessionParams,
    exec: &mut ExecState,
    ctx: Option<*mut ()>,
) -> bool {
    let mut first = resume_as_response;
    loop {
        if buf.exec_index() >= buf.parse_ok_index() {
            let code = if exec.error_seen { ResultCode::Error } else { ResultCode::Ok };
            out.print_result(code, session);
            return true;
        }
        let idx = buf.exec_index();
        let call_type = if first { CallType::Response } else { CallType::Request };
        first = false;

        let offset = basic_cmd_offset(cat);
        let (id, id_len) = buf.read_cmd_id(idx);
        let payload_start = idx + id_len;
        let (result, next) = if id >= offset {
            execute_basic(id - offset, payload_start, buf, cat, out, session, ctx, call_type)
        } else {
            execute_ext(id, payload_start, buf, cat, out, session, ctx, call_type)
        };

        match result {
            HandlerResult::Async => {
                exec.suspended = Some(SuspendedCall { cmd_id: id, exec_index: idx });
                exec.last_result = HandlerResult::Async;
                return false;
            }
            HandlerResult::Error => {
                let _ = next;
                exec.error_seen = true;
                exec.last_result = HandlerResult::Error;
                out.print_result(ResultCode::Error, session);
                return true;
            }
            HandlerResult::Ok => {
                buf.set_exec_index(next);
            }
        }
    }
}

/// Starts execution of a freshly finalized line: resets the read cursor,
/// clears suspension/error state, and drives the loop until it either
/// finishes (printing a result code) or a handler suspends
/// (`spec.md` §4.7 `startCmdExec`/`continueCmdExec`).
pub fn start_exec<const B: usize>(
    error_seen: bool,
    buf: &mut LineBuffer<B>,
    cat: &'static Catalogue,
    out: &mut OutputContext,
    session: &mut SessionParams,
    exec: &mut ExecState,
    ctx: Option<*mut ()>,
) -> bool {
    buf.set_exec_index(0);
    exec.start(error_seen);
    continue_exec(false, buf, cat, out, session, exec, ctx)
}

/// Resumes a suspended command after its handler calls back with the same
/// `cmd_id` it was started with. Stale or mismatched ids are silently
/// ignored (`spec.md` §4.7, mirroring the original's
/// `continueCmdExec(cmd_id)` guard) and `false` is returned without driving
/// the loop at all.
pub fn notify_done<const B: usize>(
    cmd_id: u16,
    buf: &mut LineBuffer<B>,
    cat: &'static Catalogue,
    out: &mut OutputContext,
    session: &mut SessionParams,
    exec: &mut ExecState,
    ctx: Option<*mut ()>,
) -> bool {
    match exec.suspended {
        Some(call) if call.cmd_id == cmd_id => {}
        _ => return false,
    }
    exec.suspended = None;
    continue_exec(true, buf, cat, out, session, exec, ctx)
}

/// Invoked when the core receives an externally-flagged abort byte while a
/// command is suspended. Returns `true` iff the suspended command was
/// actually abortable and its abort handler reported success — only then
/// does the caller (the `Server` façade) reset the parser back to idle
/// (`spec.md` §4.7 "Abort"; grounded in `server.h`'s `stateExecuting`,
/// which stays `Executing` on a failed/non-abortable attempt).
pub fn abort_current<const B: usize>(
    buf: &mut LineBuffer<B>,
    cat: &'static Catalogue,
    out: &mut OutputContext,
    session: &SessionParams,
    exec: &mut ExecState,
    ctx: Option<*mut ()>,
) -> bool {
    let Some(call) = exec.suspended else {
        return false;
    };
    let offset = basic_cmd_offset(cat);
    let aborted = if call.cmd_id >= offset {
        let compound = call.cmd_id - offset;
        if compound == 0 {
            false
        } else {
            let basic_len = cat.basic.len() as u16;
            let cmd = if compound <= basic_len {
                &cat.basic[(compound - 1) as usize]
            } else {
                &cat.ampersand[(compound - 1 - basic_len) as usize]
            };
            let mut h = BasicHandle {
                ctx,
                out,
                session,
                letter: cmd.letter,
                param: None,
                is_last: true,
            };
            matches!((cmd.exec)(&mut h, CallType::Abort), HandlerResult::Ok)
        }
    } else {
        let ext_idx = (call.cmd_id >> 2) as usize;
        match cat.extended[ext_idx].get_abort() {
            Some(f) => {
                let mut h = AbortHandle::new(ctx, cat.extended[ext_idx].name);
                matches!(f(&mut h), HandlerResult::Ok)
            }
            None => false,
        }
    };
    if aborted {
        exec.suspended = None;
        buf.reset();
    }
    aborted
}

/// Basic/ampersand command id-space dispatch (`compound` is the id with the
/// extended-space offset already subtracted: `0` is the `S` pseudo-command,
/// `1..=basic.len()` basic commands, the remainder ampersand commands).
/// Returns `(handler result, next exec index)`.
fn execute_basic<const B: usize>(
    compound: u16,
    payload_start: usize,
    buf: &mut LineBuffer<B>,
    cat: &'static Catalogue,
    out: &mut OutputContext,
    session: &mut SessionParams,
    ctx: Option<*mut ()>,
    call_type: CallType,
) -> (HandlerResult, usize) {
    if compound == 0 {
        return execute_s_param(payload_start, buf, out, session);
    }

    let basic_len = cat.basic.len() as u16;
    let cmd = if compound <= basic_len {
        &cat.basic[(compound - 1) as usize]
    } else {
        &cat.ampersand[(compound - 1 - basic_len) as usize]
    };
    let (param, next) = match cmd.numeric_ranges {
        Some(_) => (Some(buf.read_numeric(payload_start)), payload_start + 4),
        None => (None, payload_start),
    };
    let is_last = next == buf.parse_ok_index();
    let result = out.with_silencing(is_last, |o| {
        let mut h = BasicHandle {
            ctx,
            out: o,
            session,
            letter: cmd.letter,
            param,
            is_last,
        };
        (cmd.exec)(&mut h, call_type)
    });
    (result, next)
}

/// The `S`-pseudo-command (`spec.md` §4.7): a single non-negative-byte
/// payload whose bit7 marks a write, bits0..6 the S-parameter number. Reads
/// print a zero-padded 3-digit decimal (`print_zero_padded`, NOT the
/// leading-zero-suppressing `print_number` every other numeric reply uses);
/// writes dispatch to the session's independent S3/S4 setters — the
/// original's fallthrough bug (writing S4 also rewriting S3) is
/// deliberately not reproduced, see `session.rs`.
fn execute_s_param<const B: usize>(
    payload_start: usize,
    buf: &mut LineBuffer<B>,
    out: &mut OutputContext,
    session: &mut SessionParams,
) -> (HandlerResult, usize) {
    let desc = buf.read_s_param_byte(payload_start);
    let write = desc & 0x80 != 0;
    let number = desc & 0x7F;
    if write {
        let value = buf.read_s_param_byte(payload_start + 1);
        match number {
            3 => session.set_s3(value),
            4 => session.set_s4(value),
            _ => {}
        }
        (HandlerResult::Ok, payload_start + 2)
    } else {
        let value = (match number {
            3 => session.s3(),
            4 => session.s4(),
            _ => 0,
        }) as u32;
        out.print_info_header(session);
        out.print_zero_padded(value, 3);
        out.print_info_trailer(session);
        (HandlerResult::Ok, payload_start + 1)
    }
}

/// Extended command id-space dispatch: `id = (ext_index << 2) | op`, `op`
/// being `0`=read, `1`=write, `2`=test (`spec.md` §4.5). Returns `(handler
/// result, next exec index)`.
fn execute_ext<const B: usize>(
    id: u16,
    payload_start: usize,
    buf: &mut LineBuffer<B>,
    cat: &'static Catalogue,
    out: &mut OutputContext,
    session: &SessionParams,
    ctx: Option<*mut ()>,
    call_type: CallType,
) -> (HandlerResult, usize) {
    let ext_idx = (id >> 2) as usize;
    let op = id & 0x3;
    let cmd = &cat.extended[ext_idx];

    match op {
        0 => {
            let next = payload_start;
            let is_last = next == buf.parse_ok_index();
            let result = out.with_silencing(is_last, |o| {
                let mut h = ReadHandle {
                    ctx,
                    out: o,
                    session,
                    name: cmd.name,
                    is_last,
                };
                let read = cmd
                    .get_read()
                    .expect("the parser only emits a READ record for a readable command");
                read(&mut h, call_type)
            });
            (result, next)
        }
        1 => {
            let next = payload_start + cmd.write_payload_size();
            let is_last = next == buf.parse_ok_index();
            let data = buf.slice(payload_start, next);
            let result = out.with_silencing(is_last, |o| {
                let mut h = WriteHandle {
                    ctx,
                    out: o,
                    session,
                    name: cmd.name,
                    params: ParamReader::new(data, cmd.params),
                    is_last,
                };
                let write = cmd
                    .get_write()
                    .expect("the parser only emits a WRITE record for a writable command");
                write(&mut h, call_type)
            });
            (result, next)
        }
        2 => {
            // Not wrapped in `with_silencing`: `spec.md` §4.8 silences only
            // write/read information text, and calls out TEST's direct
            // prints as something that "still appear[s]" regardless of
            // whether this command is last on a `;`-joined line.
            let next = payload_start;
            let name = match cmd.test {
                Some(f) => {
                    let mut h = TestHandle::new(ctx, cmd.name, cmd.params);
                    f(&mut h)
                }
                None => Some(cmd.name),
            };
            if let Some(n) = name {
                print_cmd_parameter_ranges(out, session, n, cmd.params);
            }
            (HandlerResult::Ok, next)
        }
        _ => (HandlerResult::Error, payload_start),
    }
}

/// `+NAME:(p1)(,p2)...` — the default `+NAME=?` test reply, printed
/// whenever a test handler returns (or stands in, via `None`, for) the
/// command's own name (`spec.md` §4.7 "Test"; grounded in
/// `server_cmdline.h`'s `printCmdParameterRanges`).
fn print_cmd_parameter_ranges(
    out: &mut OutputContext,
    session: &SessionParams,
    name: &str,
    params: &'static [ExtParam],
) {
    out.print_info_header(session);
    out.print_ext_info_header(name);
    for p in params {
        out.print_text("(");
        match p.kind {
            ExtParamKind::Dec { ranges, .. } => print_ranges(out, ranges, NumberBase::Dec),
            ExtParamKind::Hex { ranges, .. } => print_ranges(out, ranges, NumberBase::Hex),
            ExtParamKind::Bin { ranges, .. } => print_ranges(out, ranges, NumberBase::Bin),
            ExtParamKind::Str { max_length, .. } => {
                out.print_text("s:");
                out.print_number(max_length as u32, NumberBase::Dec);
            }
            ExtParamKind::HexStr { max_size, .. } => {
                out.print_text("hs:");
                out.print_number(max_size as u32, NumberBase::Dec);
            }
        }
        out.print_text(")");
    }
    out.print_info_trailer(session);
}

fn print_ranges(out: &mut OutputContext, ranges: &'static [(u32, u32)], base: NumberBase) {
    for (i, &(min, max)) in ranges.iter().enumerate() {
        if i > 0 {
            out.print_text(",");
        }
        out.print_number(min, base);
        if max != min {
            out.print_text("-");
            out.print_number(max, base);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{BasicCmd, ExtendedCmd, HandlerSet};
    use crate::param::ExtParam;
    use core::cell::RefCell;

    fn recorder(b: u8, ctx: Option<*mut ()>) {
        let ptr = ctx.unwrap() as *mut RefCell<std::vec::Vec<u8>>;
        unsafe { (*ptr).borrow_mut().push(b) };
    }

    fn with_recorder() -> (OutputContext, std::boxed::Box<RefCell<std::vec::Vec<u8>>>) {
        let buf = std::boxed::Box::new(RefCell::new(std::vec::Vec::new()));
        let ptr = &*buf as *const RefCell<std::vec::Vec<u8>> as *mut ();
        (OutputContext::new(recorder, Some(ptr)), buf)
    }

    fn ok_basic(h: &mut BasicHandle<'_>, _c: CallType) -> HandlerResult {
        h.info_text(|o| o.print_text("ok"));
        HandlerResult::Ok
    }

    fn async_write(h: &mut WriteHandle<'_>, call: CallType) -> HandlerResult {
        match call {
            CallType::Request => HandlerResult::Async,
            CallType::Response => {
                h.info_text(|o| o.print_text("done"));
                HandlerResult::Ok
            }
            CallType::Abort => HandlerResult::Ok,
        }
    }

    fn abortable_abort(_h: &mut AbortHandle<'_>) -> HandlerResult {
        HandlerResult::Ok
    }

    static V_CMD: BasicCmd = BasicCmd {
        letter: b'V',
        numeric_ranges: None,
        exec: ok_basic,
    };
    static BASIC: [BasicCmd; 1] = [V_CMD];

    static ASYNC_PARAMS: [ExtParam; 0] = [];

    fn catalogue_with_async() -> &'static Catalogue {
        static EXT: std::sync::OnceLock<std::vec::Vec<ExtendedCmd>> = std::sync::OnceLock::new();
        let ext = EXT.get_or_init(|| {
            std::vec![ExtendedCmd {
                name: "ASYNC",
                params: &ASYNC_PARAMS,
                handlers: HandlerSet::WRITABLE.union(HandlerSet::ABORTABLE),
                read: None,
                write: Some(async_write),
                test: None,
                abort: Some(abortable_abort),
            }]
        });
        static CAT: std::sync::OnceLock<Catalogue> = std::sync::OnceLock::new();
        CAT.get_or_init(|| Catalogue {
            trie: &[],
            extended: ext.as_slice(),
            basic: &BASIC,
            ampersand: &[],
        })
    }

    #[test]
    fn basic_command_runs_and_prints_ok_result() {
        let cat = catalogue_with_async();
        let mut buf: LineBuffer<64> = LineBuffer::new();
        let offset = basic_cmd_offset(cat);
        buf.add_cmd_id(offset + 1); // sole basic command "V"
        buf.commit();
        let mut session = SessionParams::new();
        let mut exec = ExecState::new();
        let (mut out, rec) = with_recorder();
        assert!(start_exec(false, &mut buf, cat, &mut out, &mut session, &mut exec, None));
        assert_eq!(rec.borrow().as_slice(), b"\r\nok\r\n\r\nOK\r\n");
    }

    #[test]
    fn async_write_suspends_then_resumes_on_notify_done() {
        let cat = catalogue_with_async();
        let mut buf: LineBuffer<64> = LineBuffer::new();
        buf.add_cmd_id(1); // ext id 0: (0<<2)|1 = write
        buf.commit();
        let mut session = SessionParams::new();
        let mut exec = ExecState::new();
        let (mut out, rec) = with_recorder();

        let done = start_exec(false, &mut buf, cat, &mut out, &mut session, &mut exec, None);
        assert!(!done);
        assert!(exec.suspended.is_some());
        assert!(rec.borrow().is_empty());

        let done = notify_done(1, &mut buf, cat, &mut out, &mut session, &mut exec, None);
        assert!(done);
        assert!(exec.suspended.is_none());
        assert_eq!(rec.borrow().as_slice(), b"\r\ndone\r\n\r\nOK\r\n");
    }

    #[test]
    fn notify_done_ignores_stale_cmd_id() {
        let cat = catalogue_with_async();
        let mut buf: LineBuffer<64> = LineBuffer::new();
        buf.add_cmd_id(1);
        buf.commit();
        let mut session = SessionParams::new();
        let mut exec = ExecState::new();
        let (mut out, _rec) = with_recorder();
        start_exec(false, &mut buf, cat, &mut out, &mut session, &mut exec, None);
        assert!(!notify_done(99, &mut buf, cat, &mut out, &mut session, &mut exec, None));
        assert!(exec.suspended.is_some());
    }

    #[test]
    fn abort_current_clears_suspension_and_resets_buffer() {
        let cat = catalogue_with_async();
        let mut buf: LineBuffer<64> = LineBuffer::new();
        buf.add_cmd_id(1);
        buf.commit();
        let mut session = SessionParams::new();
        let mut exec = ExecState::new();
        let (mut out, _rec) = with_recorder();
        start_exec(false, &mut buf, cat, &mut out, &mut session, &mut exec, None);
        assert!(exec.suspended.is_some());
        assert!(abort_current(&mut buf, cat, &mut out, &session, &mut exec, None));
        assert!(exec.suspended.is_none());
        assert_eq!(buf.parse_ok_index(), 0);
    }
}
