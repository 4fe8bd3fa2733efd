//! Application context handed to every handler via `Server::set_context`
//! (`spec.md` §3 `OutputContext`), mirroring how `ushell_usercode::commands`
//! closes over application state rather than the engine carrying it.

use std::cell::RefCell;
use std::sync::mpsc::Sender;

pub struct AppState {
    pub gci_value: u32,
    pub mv_value: String,
    pub test3_last: Option<(Vec<u8>, String, Vec<u8>)>,
    /// Signals the main loop that a previously-started async operation has
    /// finished; the main loop then calls `Server::notify_done` with
    /// whatever command id the engine reports suspended.
    pub async_done_tx: Sender<()>,
    /// When set, `print_char` appends here instead of writing to stdout —
    /// lets tests drive the engine end-to-end and inspect what it printed.
    pub capture: Option<RefCell<Vec<u8>>>,
}

impl AppState {
    pub fn new(async_done_tx: Sender<()>) -> Self {
        Self {
            gci_value: 0,
            mv_value: String::new(),
            test3_last: None,
            async_done_tx,
            capture: None,
        }
    }
}

/// # Safety
/// The caller must have installed a context pointer obtained from a live
/// `AppState` via `Server::set_context` before any handler runs.
pub unsafe fn state_from(ctx: Option<*mut ()>) -> &'static mut AppState {
    &mut *(ctx.expect("handlers are only ever invoked with a context installed") as *mut AppState)
}
