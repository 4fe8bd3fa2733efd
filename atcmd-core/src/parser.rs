//! Parser state machine (C6).
//!
//! One-byte-at-a-time FSM spanning recognition, parameter parsing, default
//! substitution, and end-of-line finalization. `spec.md` §4.6's state table
//! is authoritative; `examples/original_source/lib/include/atcmd/server/server.h`
//! (the `Server::state*` methods) is the ground truth for the exact
//! per-byte behavior where `spec.md`'s terse table leaves a corner
//! ambiguous — see the two call-outs below and `DESIGN.md`.

use crate::buffer::LineBuffer;
use crate::catalogue::{BasicCmd, Catalogue};
use crate::chars::{digit_value, hex_value, is_alpha, is_digit, is_hex_digit};
use crate::error::{Error, SemanticError};
use crate::param::ExtParamKind;
use crate::session::SessionParams;
use crate::trie::{TrieCursor, TrieStep};

/// The 20+ states `spec.md` §3 `ParseState` describes. Named after the
/// original's `state*` methods rather than the spec's abbreviated table so
/// the grounding in `server.h` stays legible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Waiting for a leading `A`.
    Idle,
    /// Saw `A`, waiting for `T` (new line) or `/` (replay).
    GotA,
    /// Recognizing the next sub-command's leading character.
    Body,
    SParam,
    SWrite,
    Ampersand,
    BasicParam,
    Extended,
    ExtEq,
    ExtReadTest,
    ExtParamDecStart,
    ExtParamDec,
    ExtParamHexStart,
    ExtParamHex,
    ExtParamBinStart,
    ExtParamBin,
    ExtParamStrStart,
    ExtParamStr,
    ExtParamHexStrStart,
    ExtParamHexStr,
    ExtParamEnd,
    /// Consuming bytes silently until S3, per `spec.md` §4.6/§7.
    Error,
    /// A line has been finalized and is being (or about to be) executed;
    /// fed bytes are abort triggers only.
    Executing,
}

/// What `Parser::feed` wants the caller (the `Server` façade) to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Still parsing; nothing else to do.
    Continue,
    /// The line is complete — start/continue execution. `error` mirrors
    /// `spec.md` §7: a parse failure still runs the handlers that executed
    /// up to the point of failure, then forces `ERROR` at the end.
    Finalize { error: bool },
    /// Fed while `Executing`, with `abortable=true` — the caller should
    /// invoke the suspended command's abort handler.
    AbortRequested,
}

/// Command encoding offsets derived from the catalogue (`spec.md` §4.5).
/// Shared with `exec.rs`, which needs the same split to tell a basic-space
/// id apart from an extended-space one while walking the encoded line.
pub(crate) fn basic_cmd_offset(cat: &Catalogue) -> u16 {
    4 * cat.extended_count() as u16
}

pub struct Parser {
    pub state: ParseState,
    trie: TrieCursor,

    /// Decimal/hex/bin accumulator shared by basic-param and ext-param
    /// parsing (never live across both at once, like the original's
    /// `m_param_value_num`).
    num_acc: u32,

    /// Compound basic-space index of the command currently being parsed in
    /// `BasicParam` (0 = S, which never reaches `BasicParam`; 1..=basic.len()
    /// basic; after that, ampersand) together with its numeric ranges, so
    /// `BasicParam`'s terminator byte can validate and commit.
    pending_basic_id: u16,
    pending_ranges: Option<&'static [(u32, u32)]>,

    /// S-parameter number being accumulated in `SParam` (3 or 4).
    s_number: u32,
    /// Whether the current S-command is a write (`S<n>=`) — used only to
    /// pick the next state; the actual payload byte is accumulated in
    /// `num_acc`.
    s_is_write: bool,

    ext_param_index: usize,
    str_remaining: usize,
    hex_remaining: usize,
    hex_byte: u8,
    hex_second: bool,
}

impl Parser {
    pub const fn new(trie_data: &'static [u8]) -> Self {
        Self {
            state: ParseState::Idle,
            trie: TrieCursor::new(trie_data),
            num_acc: 0,
            pending_basic_id: 0,
            pending_ranges: None,
            s_number: 0,
            s_is_write: false,
            ext_param_index: 0,
            str_remaining: 0,
            hex_remaining: 0,
            hex_byte: 0,
            hex_second: false,
        }
    }

    /// `true` while inside a quoted string, where bytes must NOT be
    /// upper-cased on arrival (`spec.md` §4.6: "Every byte other than
    /// inside a quoted string is upper-cased on arrival").
    pub fn in_quoted_string(&self) -> bool {
        self.state == ParseState::ExtParamStr
    }

    pub fn is_executing(&self) -> bool {
        self.state == ParseState::Executing
    }

    /// Re-arms the parser for a new line. Does NOT touch the line buffer —
    /// the caller resets it separately (`spec.md` §4.6 `GotA`+`T`).
    fn reset_for_new_line(&mut self) {
        self.trie.reset();
        self.state = ParseState::Body;
    }

    pub fn enter_executing(&mut self) {
        self.state = ParseState::Executing;
    }

    pub fn return_to_idle(&mut self) {
        self.state = ParseState::Idle;
    }

    /// Feed one byte, already upper-cased by the caller unless
    /// [`Self::in_quoted_string`] held before the call.
    pub fn feed<const B: usize>(
        &mut self,
        b: u8,
        abortable: bool,
        buf: &mut LineBuffer<B>,
        cat: &'static Catalogue,
        session: &SessionParams,
    ) -> StepOutcome {
        if self.state == ParseState::Executing {
            return if abortable {
                StepOutcome::AbortRequested
            } else {
                StepOutcome::Continue
            };
        }

        let s3 = session.s3();

        match self.state {
            ParseState::Executing => unreachable!(),
            ParseState::Idle => self.step_idle(b),
            ParseState::GotA => self.step_got_a(b, buf),
            ParseState::Body => self.step_body(b, s3, buf, cat),
            ParseState::SParam => self.step_s_param(b, buf, cat),
            ParseState::SWrite => self.step_s_write(b, buf),
            ParseState::Ampersand => self.step_ampersand(b, buf, cat),
            ParseState::BasicParam => self.step_basic_param(b, s3, buf, cat),
            ParseState::Extended => self.step_extended(b, s3, buf, cat),
            ParseState::ExtEq => self.step_ext_eq(b, s3, buf, cat),
            ParseState::ExtReadTest => self.step_ext_read_test(b, s3, buf),
            ParseState::ExtParamDecStart => self.step_ext_param_start(b, s3, buf, cat, Self::enter_dec),
            ParseState::ExtParamDec => self.step_ext_param_dec(b, s3, buf, cat),
            ParseState::ExtParamHexStart => self.step_ext_param_start(b, s3, buf, cat, Self::enter_hex),
            ParseState::ExtParamHex => self.step_ext_param_hex(b, s3, buf, cat),
            ParseState::ExtParamBinStart => self.step_ext_param_start(b, s3, buf, cat, Self::enter_bin),
            ParseState::ExtParamBin => self.step_ext_param_bin(b, s3, buf, cat),
            ParseState::ExtParamStrStart => self.step_ext_param_str_start(b, s3, buf, cat),
            ParseState::ExtParamStr => self.step_ext_param_str(b, buf, cat),
            ParseState::ExtParamHexStrStart => self.step_ext_param_hexstr_start(b, s3, buf, cat),
            ParseState::ExtParamHexStr => self.step_ext_param_hexstr(b, s3, buf, cat),
            ParseState::ExtParamEnd => self.step_ext_param_end(b, s3, buf, cat),
            ParseState::Error => self.step_error(b, s3),
        }
    }

    fn finalize_line(&mut self, error: bool) -> StepOutcome {
        self.state = ParseState::Executing;
        StepOutcome::Finalize { error }
    }

    fn step_idle(&mut self, b: u8) -> StepOutcome {
        if b == b' ' {
            return StepOutcome::Continue;
        }
        if b == b'A' {
            self.state = ParseState::GotA;
        }
        StepOutcome::Continue
    }

    fn step_got_a<const B: usize>(&mut self, b: u8, buf: &mut LineBuffer<B>) -> StepOutcome {
        if b == b' ' {
            return StepOutcome::Continue;
        }
        match b {
            b'T' => {
                buf.reset();
                self.reset_for_new_line();
                StepOutcome::Continue
            }
            b'/' => {
                // Replay the previously finalized line verbatim — no
                // reparsing, no buffer reset (`spec.md` §4.6 "AT/ semantics").
                self.finalize_line(false)
            }
            _ => {
                // A line clearly started (`AT`, then neither `T` nor `/`).
                // `spec.md`'s own table leaves this "else" arrow ambiguous
                // between "abandon silently" and "error"; ground truth
                // chosen here and recorded in `DESIGN.md` — the original
                // effectively requires a terminator to escape a stray
                // leading byte, so this is an error, not a silent return to
                // idle.
                let _ = buf;
                self.state = ParseState::Error;
                StepOutcome::Continue
            }
        }
    }

    fn step_body<const B: usize>(
        &mut self,
        b: u8,
        s3: u8,
        buf: &mut LineBuffer<B>,
        cat: &'static Catalogue,
    ) -> StepOutcome {
        if b == b' ' {
            return StepOutcome::Continue;
        }
        if is_alpha(b) {
            if b == b'S' {
                self.num_acc = 0;
                self.state = ParseState::SParam;
                return StepOutcome::Continue;
            }
            return self.dispatch_single_letter(b, buf, cat, false);
        }
        match b {
            b'&' => {
                self.state = ParseState::Ampersand;
                StepOutcome::Continue
            }
            b'+' => {
                self.trie.reset();
                self.state = ParseState::Extended;
                StepOutcome::Continue
            }
            _ if b == s3 => {
                buf.rollback();
                self.finalize_line(false)
            }
            _ => {
                self.state = ParseState::Error;
                StepOutcome::Continue
            }
        }
    }

    /// Shared by `Body` (basic) and `Ampersand`: look the letter up, append
    /// its compound command id, and either commit immediately (no numeric
    /// parameter) or move to `BasicParam`.
    fn dispatch_single_letter<const B: usize>(
        &mut self,
        letter: u8,
        buf: &mut LineBuffer<B>,
        cat: &'static Catalogue,
        ampersand: bool,
    ) -> StepOutcome {
        let offset = basic_cmd_offset(cat);
        let found = if ampersand {
            cat.find_ampersand(letter)
        } else {
            cat.find_basic(letter)
        };
        let Some((idx, cmd)) = found else {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        };
        let compound = if ampersand {
            1 + cat.basic.len() as u16 + idx as u16
        } else {
            1 + idx as u16
        };
        if !buf.add_cmd_id(offset + compound) {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        match cmd.numeric_ranges {
            None => {
                buf.commit();
                self.state = ParseState::Body;
            }
            Some(ranges) => {
                self.pending_basic_id = offset + compound;
                self.pending_ranges = Some(ranges);
                self.num_acc = 0;
                self.state = ParseState::BasicParam;
            }
        }
        StepOutcome::Continue
    }

    fn step_s_param<const B: usize>(&mut self, b: u8, buf: &mut LineBuffer<B>, cat: &'static Catalogue) -> StepOutcome {
        if b == b' ' {
            return StepOutcome::Continue;
        }
        if b == b'=' || b == b'?' {
            if !(3..=4).contains(&self.num_acc) {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            // The S pseudo-command sits at basic-space offset 0.
            let offset_ok = buf.add_cmd_id(basic_cmd_offset(cat));
            if !offset_ok {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            self.s_is_write = b == b'=';
            let param_byte = self.num_acc as u8 | if self.s_is_write { 0x80 } else { 0x00 };
            if !buf.push_s_param_byte(param_byte) {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            if self.s_is_write {
                self.num_acc = 0;
                self.state = ParseState::SWrite;
            } else {
                buf.commit();
                self.state = ParseState::Body;
            }
            return StepOutcome::Continue;
        }
        let Some(d) = checked_digit(b) else {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        };
        if !accumulate_decimal(&mut self.num_acc, d) {
            self.state = ParseState::Error;
        }
        StepOutcome::Continue
    }

    fn step_s_write<const B: usize>(&mut self, b: u8, buf: &mut LineBuffer<B>) -> StepOutcome {
        if b == b' ' {
            return StepOutcome::Continue;
        }
        if let Some(d) = checked_digit(b) {
            if !accumulate_decimal(&mut self.num_acc, d) {
                self.state = ParseState::Error;
            }
            return StepOutcome::Continue;
        }
        // Non-digit terminates the value.
        if self.num_acc > 127 {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        if !buf.push_s_param_byte(self.num_acc as u8) {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        buf.commit();
        self.state = ParseState::Body;
        StepOutcome::Continue
    }

    fn step_ampersand<const B: usize>(
        &mut self,
        b: u8,
        buf: &mut LineBuffer<B>,
        cat: &'static Catalogue,
    ) -> StepOutcome {
        if b == b' ' {
            return StepOutcome::Continue;
        }
        self.dispatch_single_letter(b, buf, cat, true)
    }

    fn step_basic_param<const B: usize>(
        &mut self,
        b: u8,
        s3: u8,
        buf: &mut LineBuffer<B>,
        cat: &'static Catalogue,
    ) -> StepOutcome {
        if b == b' ' {
            return StepOutcome::Continue;
        }
        if is_digit(b) {
            let d = digit_value(b) as u32;
            if !accumulate_decimal(&mut self.num_acc, d) {
                self.state = ParseState::Error;
            }
            return StepOutcome::Continue;
        }
        // Terminator byte: validate range, commit, then re-dispatch this
        // same byte into `Body`.
        let ranges = self.pending_ranges.unwrap_or(&[]);
        if !ExtParamKind::validate_numeric(ranges, self.num_acc) {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        if !buf.add_numeric(self.num_acc) {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        buf.commit();
        self.state = ParseState::Body;
        self.step_body(b, s3, buf, cat)
    }

    fn step_extended<const B: usize>(
        &mut self,
        b: u8,
        s3: u8,
        buf: &mut LineBuffer<B>,
        cat: &'static Catalogue,
    ) -> StepOutcome {
        if b == b' ' {
            return StepOutcome::Continue;
        }
        if b == b'=' {
            self.state = ParseState::ExtEq;
            return StepOutcome::Continue;
        }
        if b == b'?' {
            if !self.trie.is_leaf() {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            let idx = self.trie.command_index();
            let cmd = &cat.extended[idx as usize];
            if cmd.get_read().is_none() {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            if !buf.add_cmd_id((idx << 2) | 0) {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            self.state = ParseState::ExtReadTest;
            return StepOutcome::Continue;
        }
        if b == b';' || b == s3 {
            if !self.trie.is_leaf() {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            let idx = self.trie.command_index();
            let cmd = &cat.extended[idx as usize];
            let Some(_write) = cmd.get_write() else {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            };
            self.ext_param_index = 0;
            let ok = buf.add_cmd_id((idx << 2) | 1) && self.finalize_ext_defaults(buf, cmd);
            if !ok {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            if b == s3 {
                return self.finalize_line(false);
            }
            self.trie.reset();
            self.state = ParseState::Body;
            return StepOutcome::Continue;
        }
        match self.trie.feed(b) {
            TrieStep::Matched => {}
            TrieStep::NoChildren | TrieStep::Mismatch => self.state = ParseState::Error,
        }
        StepOutcome::Continue
    }

    /// Fills every remaining (necessarily optional) parameter with its
    /// default and commits — used both for the bare `+NAME`/`+NAME;` write
    /// shorthand and for a write line that ends (`,`/`;`/S3) before all
    /// parameters were supplied.
    fn finalize_ext_defaults<const B: usize>(
        &mut self,
        buf: &mut LineBuffer<B>,
        cmd: &'static crate::catalogue::ExtendedCmd,
    ) -> bool {
        while self.ext_param_index != cmd.params.len() {
            let p = &cmd.params[self.ext_param_index];
            if !p.is_optional {
                return false;
            }
            if !write_default(buf, p) {
                return false;
            }
            self.ext_param_index += 1;
        }
        buf.commit();
        true
    }

    fn step_ext_eq<const B: usize>(
        &mut self,
        b: u8,
        s3: u8,
        buf: &mut LineBuffer<B>,
        cat: &'static Catalogue,
    ) -> StepOutcome {
        if b == b' ' {
            return StepOutcome::Continue;
        }
        if !self.trie.is_leaf() {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        let idx = self.trie.command_index();
        if b == b'?' {
            if !buf.add_cmd_id((idx << 2) | 2) {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            self.state = ParseState::ExtReadTest;
            return StepOutcome::Continue;
        }
        let cmd = &cat.extended[idx as usize];
        if cmd.get_write().is_none() || cmd.params.is_empty() {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        if !buf.add_cmd_id((idx << 2) | 1) {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        self.ext_param_index = 0;
        self.setup_param_parser(cmd);
        self.feed_param_dispatch(b, s3, buf, cat)
    }

    /// Re-dispatches `b` into whatever state was just selected (by
    /// [`Self::setup_param_parser`] or elsewhere) — mirrors the original's
    /// `(this->*m_state)(ch, false)` re-entrancy.
    fn feed_param_dispatch<const B: usize>(&mut self, b: u8, s3: u8, buf: &mut LineBuffer<B>, cat: &'static Catalogue) -> StepOutcome {
        match self.state {
            ParseState::ExtParamDecStart => self.step_ext_param_start(b, s3, buf, cat, Self::enter_dec),
            ParseState::ExtParamHexStart => self.step_ext_param_start(b, s3, buf, cat, Self::enter_hex),
            ParseState::ExtParamBinStart => self.step_ext_param_start(b, s3, buf, cat, Self::enter_bin),
            ParseState::ExtParamStrStart => self.step_ext_param_str_start(b, s3, buf, cat),
            ParseState::ExtParamHexStrStart => self.step_ext_param_hexstr_start(b, s3, buf, cat),
            ParseState::Error => self.step_error(b, s3),
            _ => StepOutcome::Continue,
        }
    }

    fn step_ext_read_test<const B: usize>(&mut self, b: u8, s3: u8, buf: &mut LineBuffer<B>) -> StepOutcome {
        if b == b' ' {
            return StepOutcome::Continue;
        }
        if b == s3 {
            buf.commit();
            return self.finalize_line(false);
        }
        if b == b';' {
            buf.commit();
            self.trie.reset();
            self.state = ParseState::Body;
            return StepOutcome::Continue;
        }
        self.state = ParseState::Error;
        StepOutcome::Continue
    }

    /// Current extended command descriptor, valid only while parsing its
    /// write parameters (`Extended*` states past `ExtEq`).
    fn current_ext_cmd(&self, cat: &'static Catalogue) -> &'static crate::catalogue::ExtendedCmd {
        &cat.extended[self.trie.command_index() as usize]
    }

    fn setup_param_parser(&mut self, cmd: &'static crate::catalogue::ExtendedCmd) {
        if self.ext_param_index >= cmd.params.len() {
            self.state = ParseState::Error;
            return;
        }
        self.state = match cmd.params[self.ext_param_index].kind {
            ExtParamKind::Dec { .. } => ParseState::ExtParamDecStart,
            ExtParamKind::Hex { .. } => ParseState::ExtParamHexStart,
            ExtParamKind::Bin { .. } => ParseState::ExtParamBinStart,
            ExtParamKind::Str { .. } => ParseState::ExtParamStrStart,
            ExtParamKind::HexStr { .. } => ParseState::ExtParamHexStrStart,
        };
    }

    /// Handles `,`/`;`/S3 seen while a parameter is still in its `*Start`
    /// state (i.e. it was omitted): default-substitute (must be optional)
    /// and move on. Returns `true` if it consumed `b`.
    fn process_default<const B: usize>(
        &mut self,
        b: u8,
        s3: u8,
        buf: &mut LineBuffer<B>,
        cat: &'static Catalogue,
    ) -> Option<StepOutcome> {
        if b == b' ' {
            return Some(StepOutcome::Continue);
        }
        let cmd = self.current_ext_cmd(cat);
        if b == b',' {
            if self.ext_param_index + 1 == cmd.params.len() {
                self.state = ParseState::Error;
                return Some(StepOutcome::Continue);
            }
            let p = &cmd.params[self.ext_param_index];
            if !p.is_optional || !write_default(buf, p) {
                self.state = ParseState::Error;
                return Some(StepOutcome::Continue);
            }
            self.ext_param_index += 1;
            self.setup_param_parser(cmd);
            return Some(StepOutcome::Continue);
        }
        if b == b';' {
            return Some(if self.finalize_ext_defaults(buf, cmd) {
                self.trie.reset();
                self.state = ParseState::Body;
                StepOutcome::Continue
            } else {
                self.state = ParseState::Error;
                StepOutcome::Continue
            });
        }
        if b == s3 {
            return Some(if self.finalize_ext_defaults(buf, cmd) {
                self.finalize_line(false)
            } else {
                self.state = ParseState::Error;
                StepOutcome::Continue
            });
        }
        None
    }

    fn enter_dec(&mut self) {
        self.num_acc = 0;
        self.state = ParseState::ExtParamDec;
    }
    fn enter_hex(&mut self) {
        self.num_acc = 0;
        self.state = ParseState::ExtParamHex;
    }
    fn enter_bin(&mut self) {
        self.num_acc = 0;
        self.state = ParseState::ExtParamBin;
    }

    fn step_ext_param_start<const B: usize>(
        &mut self,
        b: u8,
        s3: u8,
        buf: &mut LineBuffer<B>,
        cat: &'static Catalogue,
        enter: fn(&mut Self),
    ) -> StepOutcome {
        if let Some(outcome) = self.process_default(b, s3, buf, cat) {
            return outcome;
        }
        enter(self);
        self.feed_param_dispatch(b, s3, buf, cat)
    }

    fn step_ext_param_dec<const B: usize>(&mut self, b: u8, s3: u8, buf: &mut LineBuffer<B>, cat: &'static Catalogue) -> StepOutcome {
        if let Some(outcome) = self.process_numeric_end(b, s3, buf, cat) {
            return outcome;
        }
        let Some(d) = checked_digit(b) else {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        };
        if !accumulate_decimal(&mut self.num_acc, d) {
            self.state = ParseState::Error;
        }
        StepOutcome::Continue
    }

    fn step_ext_param_hex<const B: usize>(&mut self, b: u8, s3: u8, buf: &mut LineBuffer<B>, cat: &'static Catalogue) -> StepOutcome {
        if let Some(outcome) = self.process_numeric_end(b, s3, buf, cat) {
            return outcome;
        }
        if self.num_acc & 0xF000_0000 != 0 {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        if !is_hex_digit(b) {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        self.num_acc = (self.num_acc << 4) | hex_value(b) as u32;
        StepOutcome::Continue
    }

    fn step_ext_param_bin<const B: usize>(&mut self, b: u8, s3: u8, buf: &mut LineBuffer<B>, cat: &'static Catalogue) -> StepOutcome {
        if let Some(outcome) = self.process_numeric_end(b, s3, buf, cat) {
            return outcome;
        }
        if self.num_acc & 0x8000_0000 != 0 {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        if b != b'0' && b != b'1' {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        self.num_acc = (self.num_acc << 1) | (b == b'1') as u32;
        StepOutcome::Continue
    }

    /// `,`/`;`/S3 seen while accumulating a numeric parameter's digits:
    /// validate range, commit, and advance. Returns `None` if `b` is
    /// neither separator nor terminator (still accumulating).
    fn process_numeric_end<const B: usize>(
        &mut self,
        b: u8,
        s3: u8,
        buf: &mut LineBuffer<B>,
        cat: &'static Catalogue,
    ) -> Option<StepOutcome> {
        if b != b',' && b != b';' && b != s3 {
            return None;
        }
        let cmd = self.current_ext_cmd(cat);
        let param = &cmd.params[self.ext_param_index];
        let ranges = match param.kind {
            ExtParamKind::Dec { ranges, .. } | ExtParamKind::Hex { ranges, .. } | ExtParamKind::Bin { ranges, .. } => ranges,
            _ => unreachable!("numeric end reached for a non-numeric parameter"),
        };
        if !ExtParamKind::validate_numeric(ranges, self.num_acc) {
            self.state = ParseState::Error;
            return Some(StepOutcome::Continue);
        }

        if b == b',' {
            if self.ext_param_index + 1 == cmd.params.len() {
                self.state = ParseState::Error;
                return Some(StepOutcome::Continue);
            }
            if !buf.add_numeric(self.num_acc) {
                self.state = ParseState::Error;
                return Some(StepOutcome::Continue);
            }
            self.ext_param_index += 1;
            self.setup_param_parser(cmd);
            return Some(StepOutcome::Continue);
        }

        if !buf.add_numeric(self.num_acc) {
            self.state = ParseState::Error;
            return Some(StepOutcome::Continue);
        }
        self.ext_param_index += 1;
        Some(if b == b';' {
            if self.finalize_ext_defaults(buf, cmd) {
                self.trie.reset();
                self.state = ParseState::Body;
                StepOutcome::Continue
            } else {
                self.state = ParseState::Error;
                StepOutcome::Continue
            }
        } else if self.finalize_ext_defaults(buf, cmd) {
            self.finalize_line(false)
        } else {
            self.state = ParseState::Error;
            StepOutcome::Continue
        })
    }

    fn step_ext_param_str_start<const B: usize>(
        &mut self,
        b: u8,
        s3: u8,
        buf: &mut LineBuffer<B>,
        cat: &'static Catalogue,
    ) -> StepOutcome {
        if let Some(outcome) = self.process_default(b, s3, buf, cat) {
            return outcome;
        }
        if b != b'"' {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        let ExtParamKind::Str { max_length, .. } = self.current_ext_cmd(cat).params[self.ext_param_index].kind else {
            unreachable!()
        };
        self.str_remaining = max_length as usize + 1;
        self.state = ParseState::ExtParamStr;
        StepOutcome::Continue
    }

    fn step_ext_param_str<const B: usize>(&mut self, b: u8, buf: &mut LineBuffer<B>, cat: &'static Catalogue) -> StepOutcome {
        if b == b'"' {
            if !buf.finalize_string(self.str_remaining) {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            self.ext_param_index += 1;
            self.state = ParseState::ExtParamEnd;
            return StepOutcome::Continue;
        }
        if self.str_remaining == 1 {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        let _ = cat;
        if !buf.add_string_byte(b) {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        self.str_remaining -= 1;
        StepOutcome::Continue
    }

    fn step_ext_param_hexstr_start<const B: usize>(
        &mut self,
        b: u8,
        s3: u8,
        buf: &mut LineBuffer<B>,
        cat: &'static Catalogue,
    ) -> StepOutcome {
        if let Some(outcome) = self.process_default(b, s3, buf, cat) {
            return outcome;
        }
        if b != b'"' {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        }
        let ExtParamKind::HexStr { max_size, .. } = self.current_ext_cmd(cat).params[self.ext_param_index].kind else {
            unreachable!()
        };
        self.hex_remaining = max_size as usize;
        self.hex_second = false;
        self.state = ParseState::ExtParamHexStr;
        StepOutcome::Continue
    }

    fn step_ext_param_hexstr<const B: usize>(&mut self, b: u8, s3: u8, buf: &mut LineBuffer<B>, cat: &'static Catalogue) -> StepOutcome {
        if b == b' ' || b == b'-' {
            return StepOutcome::Continue;
        }
        if b == b'"' {
            if self.hex_second {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            let ExtParamKind::HexStr { max_size, .. } = self.current_ext_cmd(cat).params[self.ext_param_index].kind else {
                unreachable!()
            };
            if !buf.finalize_hex_string(self.hex_remaining, max_size as usize) {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            self.ext_param_index += 1;
            self.state = ParseState::ExtParamEnd;
            return StepOutcome::Continue;
        }
        let Some(nibble) = checked_hex(b) else {
            self.state = ParseState::Error;
            return StepOutcome::Continue;
        };
        if !self.hex_second {
            if self.hex_remaining == 0 {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            self.hex_byte = nibble << 4;
        } else {
            self.hex_byte |= nibble;
            if !buf.add_hex_byte(self.hex_byte) {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            self.hex_remaining -= 1;
        }
        self.hex_second = !self.hex_second;
        let _ = s3;
        StepOutcome::Continue
    }

    fn step_ext_param_end<const B: usize>(&mut self, b: u8, s3: u8, buf: &mut LineBuffer<B>, cat: &'static Catalogue) -> StepOutcome {
        let cmd = self.current_ext_cmd(cat);
        if b == b',' {
            if self.ext_param_index == cmd.params.len() {
                self.state = ParseState::Error;
                return StepOutcome::Continue;
            }
            self.setup_param_parser(cmd);
            return StepOutcome::Continue;
        }
        if b == b';' {
            return if self.finalize_ext_defaults(buf, cmd) {
                self.trie.reset();
                self.state = ParseState::Body;
                StepOutcome::Continue
            } else {
                self.state = ParseState::Error;
                StepOutcome::Continue
            };
        }
        if b == s3 {
            return if self.finalize_ext_defaults(buf, cmd) {
                self.finalize_line(false)
            } else {
                self.state = ParseState::Error;
                StepOutcome::Continue
            };
        }
        self.state = ParseState::Error;
        StepOutcome::Continue
    }

    fn step_error(&mut self, b: u8, s3: u8) -> StepOutcome {
        if b == s3 {
            return self.finalize_line(true);
        }
        StepOutcome::Continue
    }
}

fn write_default<const B: usize>(buf: &mut LineBuffer<B>, p: &crate::param::ExtParam) -> bool {
    match p.kind {
        ExtParamKind::Dec { default, .. } | ExtParamKind::Hex { default, .. } | ExtParamKind::Bin { default, .. } => {
            match default {
                Some(v) => buf.add_default_numeric(v),
                None => false,
            }
        }
        ExtParamKind::Str { max_length, default } => match default {
            Some(s) => buf.add_default_string(s, max_length),
            None => false,
        },
        ExtParamKind::HexStr { max_size, default } => match default {
            Some(bytes) => buf.add_default_hex_string(bytes, max_size),
            None => false,
        },
    }
}

fn checked_digit(b: u8) -> Option<u32> {
    if is_digit(b) {
        Some(digit_value(b) as u32)
    } else {
        None
    }
}

fn checked_hex(b: u8) -> Option<u8> {
    if is_hex_digit(b) {
        Some(hex_value(b) as u8)
    } else {
        None
    }
}

/// `acc = acc * 10 + d`, erroring on overflow past `u32::MAX` — the direct
/// formulation `spec.md` §9 prescribes in place of the original's
/// `>= 0x19999999` pre-check.
fn accumulate_decimal(acc: &mut u32, d: u32) -> bool {
    if *acc > (u32::MAX - d) / 10 {
        return false;
    }
    *acc = *acc * 10 + d;
    true
}

/// Maps a `Parser`/buffer failure mode observed during parsing to the
/// externally-visible [`Error`] taxonomy (`spec.md` §7) — used by the
/// façade's `last_error()` diagnostic, not by the wire protocol itself.
pub fn classify_error_hint(semantic: Option<SemanticError>) -> Error {
    match semantic {
        Some(s) => Error::Semantic(s),
        None => Error::Syntax,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Catalogue, ExtendedCmd, HandlerSet};
    use crate::exec::{BasicHandle, CallType, HandlerResult, ReadHandle, TestHandle, WriteHandle};
    use crate::param::ExtParam;

    fn noop_basic(_h: &mut BasicHandle<'_>, _c: CallType) -> HandlerResult {
        HandlerResult::Ok
    }
    fn noop_write(_h: &mut WriteHandle<'_>, _c: CallType) -> HandlerResult {
        HandlerResult::Ok
    }
    fn noop_read(_h: &mut ReadHandle<'_>, _c: CallType) -> HandlerResult {
        HandlerResult::Ok
    }
    fn noop_test(_h: &mut TestHandle<'_>) -> Option<&'static str> {
        None
    }

    static V_CMD: BasicCmd = BasicCmd {
        letter: b'V',
        numeric_ranges: None,
        exec: noop_basic,
    };
    static BASIC: [BasicCmd; 1] = [V_CMD];

    static GCI_PARAMS: [ExtParam; 1] = [ExtParam {
        kind: ExtParamKind::Hex {
            ranges: &[(0, 255)],
            default: None,
        },
        is_optional: false,
    }];

    // Trie for a single command "GCI" at index 0, built by hand the same
    // way `trie.rs`'s own tests do: a real root node (char 0, no LAST bit)
    // at position 0 whose only child is "G".
    fn build_trie_for_gci() -> &'static [u8] {
        use crate::chars::encode;
        let i = vec![0xC0 | encode(b'I'), 0, 0]; // LAST|LEAF, idx=0, subtree=0
        let mut c = vec![0x80 | encode(b'C'), i.len() as u8];
        c.extend_from_slice(&i);
        let mut g = vec![0x80 | encode(b'G'), c.len() as u8];
        g.extend_from_slice(&c);
        let mut root = vec![0u8, g.len() as u8];
        root.extend_from_slice(&g);
        Box::leak(root.into_boxed_slice())
    }

    fn catalogue_with_gci() -> &'static Catalogue {
        static EXT: std::sync::OnceLock<Vec<ExtendedCmd>> = std::sync::OnceLock::new();
        let ext = EXT.get_or_init(|| {
            vec![ExtendedCmd {
                name: "GCI",
                params: &GCI_PARAMS,
                handlers: HandlerSet::READABLE.union(HandlerSet::WRITABLE),
                read: Some(noop_read),
                write: Some(noop_write),
                test: Some(noop_test),
                abort: None,
            }]
        });
        static CAT: std::sync::OnceLock<Catalogue> = std::sync::OnceLock::new();
        CAT.get_or_init(|| Catalogue {
            trie: build_trie_for_gci(),
            extended: ext.as_slice(),
            basic: &BASIC,
            ampersand: &[],
        })
    }

    fn drive(cat: &'static Catalogue, line: &str) -> (crate::buffer::LineBuffer<128>, bool) {
        let mut buf: crate::buffer::LineBuffer<128> = crate::buffer::LineBuffer::new();
        let mut p = Parser::new(cat.trie);
        let session = SessionParams::new();
        let mut finalized_error = false;
        let mut done = false;
        for &b in line.as_bytes() {
            let upper = if p.in_quoted_string() { b } else { b.to_ascii_uppercase() };
            match p.feed(upper, false, &mut buf, cat, &session) {
                StepOutcome::Finalize { error } => {
                    finalized_error = error;
                    done = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(done, "line never finalized: {line:?}");
        (buf, finalized_error)
    }

    #[test]
    fn basic_command_with_no_numeric_commits_immediately() {
        let cat = catalogue_with_gci();
        let (buf, error) = drive(cat, "ATV\r");
        assert!(!error);
        assert_eq!(buf.parse_ok_index(), buf.parse_index());
    }

    #[test]
    fn extended_write_parses_hex_numeric_in_range() {
        let cat = catalogue_with_gci();
        let (buf, error) = drive(cat, "AT+GCI=FF\r");
        assert!(!error);
        let (id, sz) = buf.read_cmd_id(0);
        assert_eq!(id, (0 << 2) | 1);
        assert_eq!(buf.read_numeric(sz), 255);
    }

    #[test]
    fn extended_write_out_of_range_errors() {
        let cat = catalogue_with_gci();
        let (_buf, error) = drive(cat, "AT+GCI=100\r");
        assert!(error);
    }

    #[test]
    fn unknown_basic_letter_errors() {
        let cat = catalogue_with_gci();
        let (_buf, error) = drive(cat, "ATQ\r");
        assert!(error);
    }

    #[test]
    fn lowercase_is_upcased_outside_strings() {
        let cat = catalogue_with_gci();
        let (buf, error) = drive(cat, "at v\r");
        assert!(!error);
        assert!(buf.parse_ok_index() > 0);
    }
}
