//! A small hosted AT terminal, replacing the STM32/RTIC specifics of
//! `main_app` with a `std` stdin/stdout loop — the shape of
//! `ushell_ctx::ShellCtx::step` (decode one byte, feed the engine, drain
//! anything the engine now wants to say) without the RTIC task wiring.

mod commands;
mod state;

use std::io::{Read, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use atcmd_logger::{init_logger, log_simple, LogLevel, LoggerConfig};

use state::AppState;

atcmd_macros::atcmd_catalogue! {
    mod catalogue;
    max_commands_per_line = 4;

    basic {
        V => commands::v_exec;
    }

    ampersand {
        K(0..=1) => commands::k_exec;
    }

    extended {
        GCI {
            hex(0..=255);
        } read = commands::gci_read, write = commands::gci_write;

        MV18AM {
            str(100);
        } read = commands::mv_read, write = commands::mv_write;

        TEST3_RSR {
            hexstr(20) default [0x01, 0x02] optional;
            str(20) default "abc" optional;
            hexstr(20) default [0x03, 0x04] optional;
        } write = commands::test3_write;

        ASYNCOP {
        } write = commands::asyncop_write, abort = commands::asyncop_abort;
    }
}

fn print_char(byte: u8, ctx: Option<*mut ()>) {
    if let Some(ptr) = ctx {
        let state = unsafe { &mut *(ptr as *mut AppState) };
        if let Some(buf) = &state.capture {
            buf.borrow_mut().push(byte);
            return;
        }
    }
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    let _ = lock.write_all(&[byte]);
    let _ = lock.flush();
}

fn main() {
    init_logger(LoggerConfig {
        color_entire_line: false,
        min_level: LogLevel::Info,
    });
    log_simple!("atcmd-demo: type AT commands, Ctrl-D to quit");

    let (byte_tx, byte_rx) = mpsc::channel::<u8>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for b in stdin.lock().bytes() {
            match b {
                Ok(byte) => {
                    if byte_tx.send(byte).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let (async_done_tx, async_done_rx) = mpsc::channel::<()>();
    let mut state = AppState::new(async_done_tx);
    let state_ptr: *mut () = &mut state as *mut AppState as *mut ();

    let mut server = catalogue::new_server(print_char, Some(state_ptr));

    loop {
        while async_done_rx.try_recv().is_ok() {
            if let Some(cmd_id) = server.suspended_cmd_id() {
                let _ = server.notify_done(cmd_id);
            }
        }

        match byte_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(byte) => server.feed(byte, true),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Drives the registered catalogue end-to-end through `Server::feed`,
/// covering `spec.md` §8's boundary scenarios literally against the demo's
/// own command set rather than a synthetic one — the integration layer
/// `atcmd-core`'s own unit tests can't exercise because they never assemble
/// a real `atcmd_catalogue!` module.
#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::mpsc;

    fn new_test_server() -> (catalogue::Server, std::boxed::Box<AppState>) {
        let (tx, _rx) = mpsc::channel();
        let mut state = std::boxed::Box::new(AppState::new(tx));
        state.capture = Some(RefCell::new(Vec::new()));
        let ptr: *mut () = state.as_mut() as *mut AppState as *mut ();
        let server = catalogue::new_server(print_char, Some(ptr));
        (server, state)
    }

    fn feed_line(server: &mut catalogue::Server, line: &str) {
        for &b in line.as_bytes() {
            server.feed(b, false);
        }
    }

    fn captured(state: &AppState) -> String {
        let bytes = state.capture.as_ref().unwrap().borrow();
        String::from_utf8(bytes.clone()).unwrap()
    }

    fn clear(state: &AppState) {
        state.capture.as_ref().unwrap().borrow_mut().clear();
    }

    #[test]
    fn scenario_1_bare_at_replies_ok() {
        let (mut server, state) = new_test_server();
        feed_line(&mut server, "AT\r");
        assert_eq!(captured(&state), "\r\nOK\r\n");
    }

    #[test]
    fn scenario_2_lowercase_is_upcased() {
        let (mut server, state) = new_test_server();
        feed_line(&mut server, "at v\r");
        assert_eq!(captured(&state), "\r\nOK\r\n");
    }

    #[test]
    fn scenario_3_gci_write_then_read() {
        let (mut server, state) = new_test_server();
        feed_line(&mut server, "AT+GCI=FF\r");
        assert_eq!(captured(&state), "\r\nOK\r\n");
        clear(&state);
        feed_line(&mut server, "AT+GCI?\r");
        assert_eq!(captured(&state), "\r\n+GCI:FF\r\n\r\nOK\r\n");
    }

    #[test]
    fn scenario_4_out_of_range_hex_errors() {
        let (mut server, state) = new_test_server();
        feed_line(&mut server, "AT+GCI=100\r");
        assert_eq!(captured(&state), "\r\nERROR\r\n");
    }

    #[test]
    fn scenario_5_string_write_then_read() {
        let (mut server, state) = new_test_server();
        feed_line(&mut server, "AT+MV18AM=\"hello\"\r");
        assert_eq!(captured(&state), "\r\nOK\r\n");
        clear(&state);
        feed_line(&mut server, "AT+MV18AM?\r");
        assert_eq!(captured(&state), "\r\n+MV18AM:\"hello\"\r\n\r\nOK\r\n");
    }

    #[test]
    fn scenario_6_defaults_fill_omitted_optional_params() {
        let (mut server, state) = new_test_server();
        feed_line(&mut server, "AT+TEST3_RSR=,,\"AB\"\r");
        assert_eq!(captured(&state), "\r\nOK\r\n");
        let (hs1, s, hs2) = state.test3_last.clone().unwrap();
        assert_eq!(hs1, vec![0x01, 0x02]);
        assert_eq!(s, "abc");
        assert_eq!(hs2, vec![0xAB]);
    }

    #[test]
    fn scenario_7_test_reply_lists_param_shapes() {
        let (mut server, state) = new_test_server();
        feed_line(&mut server, "AT+TEST3_RSR=?\r");
        assert_eq!(captured(&state), "\r\n+TEST3_RSR:(hs:20)(s:20)(hs:20)\r\n\r\nOK\r\n");
    }

    #[test]
    fn scenario_8_intermediate_command_is_silenced() {
        let (mut server, state) = new_test_server();
        feed_line(&mut server, "ATV;+GCI=01\r");
        assert_eq!(captured(&state), "\r\nOK\r\n");
    }

    #[test]
    fn asyncop_suspends_and_resumes_via_notify_done() {
        let (mut server, state) = new_test_server();
        feed_line(&mut server, "AT+ASYNCOP\r");
        assert!(captured(&state).is_empty());
        let cmd_id = server.suspended_cmd_id().expect("asyncop should have suspended");
        assert!(server.notify_done(cmd_id).is_ok());
        assert_eq!(captured(&state), "\r\nASYNCOP DONE\r\n\r\nOK\r\n");
    }
}
