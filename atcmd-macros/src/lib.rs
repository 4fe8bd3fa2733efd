//! Compile-time catalogue builder for `atcmd-core`.
//!
//! `atcmd_catalogue!` takes a small declarative DSL describing a device's
//! basic, ampersand and extended AT commands and expands to a module
//! holding the packed name trie, the parameter/handler tables, and the
//! `&'static Catalogue` those tables back — the build-time counterpart of
//! `ushell_dispatcher::generate_commands_dispatcher!`, minus the dispatch
//! function itself (`atcmd-core` already supplies that; this macro only
//! fills in the data it dispatches over).
//!
//! ```ignore
//! atcmd_macros::atcmd_catalogue! {
//!     mod catalogue;
//!     max_commands_per_line = 4;
//!
//!     basic {
//!         V => commands::v_exec;
//!     }
//!
//!     ampersand {
//!         K(0..=1) => commands::k_exec;
//!     }
//!
//!     extended {
//!         GCI {
//!             hex(0..=255);
//!         } read = commands::gci_read, write = commands::gci_write;
//!     }
//! }
//! ```

mod codegen;
mod dsl;
mod trie;

use proc_macro::TokenStream;
use syn::parse_macro_input;

#[proc_macro]
pub fn atcmd_catalogue(input: TokenStream) -> TokenStream {
    let parsed = parse_macro_input!(input as dsl::CatalogueInput);
    match codegen::generate(parsed) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}
