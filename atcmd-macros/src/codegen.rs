//! Turns a parsed [`crate::dsl::CatalogueInput`] into the `&'static` tables
//! `atcmd_core::catalogue::Catalogue` expects, the way
//! `ushell_dispatcher::commandsgen` turns its DSL into `Entry` tables and a
//! generated `dispatch()` — except the "tables" here are genuinely static
//! data rather than a generated dispatch function, since `atcmd_core`
//! already supplies the dispatch logic and only needs its catalogue filled
//! in.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Error, Result};

use crate::dsl::{BasicEntry, CatalogueInput, ExtendedEntry, ParamEntry, ParamKindSpec, ParamValue};
use crate::trie::pack_trie;

pub fn generate(input: CatalogueInput) -> Result<TokenStream> {
    let mod_name = &input.mod_name;
    let buffer = line_buffer_capacity(&input)?;

    let basic_ts = basic_array(&input.basic, "BASIC")?;
    let ampersand_ts = basic_array(&input.ampersand, "AMPERSAND")?;
    let (trie_ts, extended_ts) = extended_tables(&input.extended)?;

    Ok(quote! {
        pub mod #mod_name {
            use super::*;

            /// Convenience alias so callers don't repeat the buffer size.
            pub type Server = atcmd_core::server::Server<#buffer>;

            #trie_ts
            #basic_ts
            #ampersand_ts
            #extended_ts

            pub static CATALOGUE: atcmd_core::catalogue::Catalogue =
                atcmd_core::catalogue::Catalogue {
                    trie: &TRIE,
                    extended: &EXTENDED,
                    basic: &BASIC,
                    ampersand: &AMPERSAND,
                };

            pub fn new_server(
                print_char: atcmd_core::output::PrintCharFn,
                context: Option<*mut ()>,
            ) -> Server {
                atcmd_core::server::Server::new(&CATALOGUE, print_char, context)
            }
        }
    })
}

/// `spec.md` §6 "Line-buffer capacity formula": the worst-case single
/// command is `max(6, 2 + Σ slot_size(param))` over the basic upper bound
/// and every registered extended command's write payload, multiplied by
/// `max_commands_per_line`. Computed here so a catalogue change can never
/// silently leave the generated buffer under-sized.
fn line_buffer_capacity(input: &CatalogueInput) -> Result<usize> {
    const BASIC_MAX: usize = 6; // <=2-byte id + 4-byte numeric payload

    let mut per_command_max = BASIC_MAX;
    for e in &input.extended {
        let payload: usize = e.params.iter().map(param_slot_size).sum();
        per_command_max = per_command_max.max(2 + payload);
    }

    Ok(per_command_max * input.max_commands_per_line)
}

fn param_slot_size(p: &ParamEntry) -> usize {
    match &p.kind {
        ParamKindSpec::Dec(_) | ParamKindSpec::Hex(_) | ParamKindSpec::Bin(_) => 4,
        ParamKindSpec::Str(max_length) => *max_length as usize + 1,
        ParamKindSpec::HexStr(max_size) => *max_size as usize + 2,
    }
}

fn basic_array(entries: &[BasicEntry], array_name: &str) -> Result<TokenStream> {
    let mut sorted: Vec<&BasicEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.letter.to_string());
    for pair in sorted.windows(2) {
        if pair[0].letter == pair[1].letter {
            return Err(Error::new_spanned(
                &pair[1].letter,
                format!("duplicate letter `{}`", pair[1].letter),
            ));
        }
    }

    let items = sorted.iter().map(|e| {
        let letter = e.letter.to_string();
        if letter.len() != 1 {
            return Err(Error::new_spanned(&e.letter, "basic/ampersand letters must be a single character"));
        }
        let letter_byte = letter.as_bytes()[0];
        let handler = &e.handler;
        let ranges_ts = match e.range {
            Some((lo, hi)) => quote! { Some(&[(#lo, #hi)]) },
            None => quote! { None },
        };
        Ok(quote! {
            atcmd_core::catalogue::BasicCmd {
                letter: #letter_byte,
                numeric_ranges: #ranges_ts,
                exec: #handler,
            }
        })
    }).collect::<Result<Vec<_>>>()?;

    let count = items.len();
    let ident = format_ident!("{}", array_name);
    Ok(quote! {
        pub static #ident: [atcmd_core::catalogue::BasicCmd; #count] = [ #(#items),* ];
    })
}

fn extended_tables(entries: &[ExtendedEntry]) -> Result<(TokenStream, TokenStream)> {
    let mut name_index_pairs = Vec::with_capacity(entries.len());
    for (i, e) in entries.iter().enumerate() {
        name_index_pairs.push((e.name.to_string(), i as u16));
    }
    let trie_bytes = pack_trie(&name_index_pairs).map_err(|msg| {
        Error::new_spanned(&entries.first().map(|e| e.name.clone()).unwrap_or_else(|| syn::Ident::new("_", proc_macro2::Span::call_site())), msg)
    })?;
    let trie_len = trie_bytes.len();
    let trie_ts = quote! {
        pub static TRIE: [u8; #trie_len] = [ #(#trie_bytes),* ];
    };

    let mut param_arrays = Vec::new();
    let mut cmd_items = Vec::new();

    for (i, e) in entries.iter().enumerate() {
        let params_ident = format_ident!("EXT_PARAMS_{}", i);
        let mut param_items = Vec::with_capacity(e.params.len());
        for p in &e.params {
            param_items.push(param_entry(p)?);
        }
        let params_count = param_items.len();
        param_arrays.push(quote! {
            static #params_ident: [atcmd_core::param::ExtParam; #params_count] = [ #(#param_items),* ];
        });

        let name_lit = e.name.to_string();
        let read = opt_path(&e.read);
        let write = opt_path(&e.write);
        let test = opt_path(&e.test);
        let abort = opt_path(&e.abort);

        let mut flags = Vec::new();
        if e.read.is_some() {
            flags.push(quote! { atcmd_core::catalogue::HandlerSet::READABLE });
        }
        if e.write.is_some() {
            flags.push(quote! { atcmd_core::catalogue::HandlerSet::WRITABLE });
        }
        if e.test.is_some() {
            flags.push(quote! { atcmd_core::catalogue::HandlerSet::CUSTOM_TESTABLE });
        }
        if e.abort.is_some() {
            flags.push(quote! { atcmd_core::catalogue::HandlerSet::ABORTABLE });
        }
        let handlers_ts = if flags.is_empty() {
            quote! { atcmd_core::catalogue::HandlerSet::empty() }
        } else {
            let first = &flags[0];
            let rest = &flags[1..];
            quote! { #first #( .union(#rest) )* }
        };

        cmd_items.push(quote! {
            atcmd_core::catalogue::ExtendedCmd {
                name: #name_lit,
                params: &#params_ident,
                handlers: #handlers_ts,
                read: #read,
                write: #write,
                test: #test,
                abort: #abort,
            }
        });
    }

    let ext_count = entries.len();
    let extended_ts = quote! {
        #(#param_arrays)*
        pub static EXTENDED: [atcmd_core::catalogue::ExtendedCmd; #ext_count] = [ #(#cmd_items),* ];
    };

    Ok((trie_ts, extended_ts))
}

fn opt_path(p: &Option<syn::Path>) -> TokenStream {
    match p {
        Some(path) => quote! { Some(#path) },
        None => quote! { None },
    }
}

fn param_entry(p: &ParamEntry) -> Result<TokenStream> {
    check_default_is_valid(p)?;

    let optional = p.optional;
    let kind_ts = match (&p.kind, &p.default) {
        (ParamKindSpec::Dec(ranges), default) => {
            let ranges_ts = ranges_tokens(ranges);
            let default_ts = numeric_default(default)?;
            quote! { atcmd_core::param::ExtParamKind::Dec { ranges: #ranges_ts, default: #default_ts } }
        }
        (ParamKindSpec::Hex(ranges), default) => {
            let ranges_ts = ranges_tokens(ranges);
            let default_ts = numeric_default(default)?;
            quote! { atcmd_core::param::ExtParamKind::Hex { ranges: #ranges_ts, default: #default_ts } }
        }
        (ParamKindSpec::Bin(ranges), default) => {
            let ranges_ts = ranges_tokens(ranges);
            let default_ts = numeric_default(default)?;
            quote! { atcmd_core::param::ExtParamKind::Bin { ranges: #ranges_ts, default: #default_ts } }
        }
        (ParamKindSpec::Str(max_length), default) => {
            let default_ts = match default {
                Some(ParamValue::Str(s)) => quote! { Some(#s) },
                None => quote! { None },
                Some(_) => return Err(Error::new(proc_macro2::Span::call_site(), "str parameter needs a string default")),
            };
            quote! { atcmd_core::param::ExtParamKind::Str { max_length: #max_length, default: #default_ts } }
        }
        (ParamKindSpec::HexStr(max_size), default) => {
            let default_ts = match default {
                Some(ParamValue::HexStr(bytes)) => quote! { Some(&[ #(#bytes),* ]) },
                None => quote! { None },
                Some(_) => return Err(Error::new(proc_macro2::Span::call_site(), "hexstr parameter needs a hex-byte default")),
            };
            quote! { atcmd_core::param::ExtParamKind::HexStr { max_size: #max_size, default: #default_ts } }
        }
    };

    Ok(quote! {
        atcmd_core::param::ExtParam {
            kind: #kind_ts,
            is_optional: #optional,
        }
    })
}

/// Catalogue invariant (`spec.md` §3/§8): an optional parameter's declared
/// default must satisfy its own validation — checked here, at macro
/// expansion, rather than left to `atcmd_core::param::ExtParam::default_is_valid`
/// running unreferenced at runtime.
fn check_default_is_valid(p: &ParamEntry) -> Result<()> {
    match (&p.kind, &p.default) {
        (_, None) => {
            if p.optional {
                Err(Error::new(proc_macro2::Span::call_site(), "optional parameter needs a `default`"))
            } else {
                Ok(())
            }
        }
        (ParamKindSpec::Dec(ranges) | ParamKindSpec::Hex(ranges) | ParamKindSpec::Bin(ranges), Some(ParamValue::Numeric(v))) => {
            if ranges.iter().any(|&(lo, hi)| *v >= lo && *v <= hi) {
                Ok(())
            } else {
                Err(Error::new(proc_macro2::Span::call_site(), format!("default `{v}` does not satisfy the declared ranges")))
            }
        }
        (ParamKindSpec::Str(max_length), Some(ParamValue::Str(s))) => {
            if s.len() <= *max_length as usize {
                Ok(())
            } else {
                Err(Error::new(proc_macro2::Span::call_site(), format!("default string exceeds max_length {max_length}")))
            }
        }
        (ParamKindSpec::HexStr(max_size), Some(ParamValue::HexStr(bytes))) => {
            if bytes.len() <= *max_size as usize {
                Ok(())
            } else {
                Err(Error::new(proc_macro2::Span::call_site(), format!("default hex-string exceeds max_size {max_size}")))
            }
        }
        // Kind/default mismatches (e.g. a string default on a numeric
        // parameter) are caught later by `numeric_default`/the Str/HexStr
        // arms of `param_entry`'s own match.
        _ => Ok(()),
    }
}

fn ranges_tokens(ranges: &[(u32, u32)]) -> TokenStream {
    let pairs = ranges.iter().map(|(lo, hi)| quote! { (#lo, #hi) });
    quote! { &[ #(#pairs),* ] }
}

fn numeric_default(default: &Option<ParamValue>) -> Result<TokenStream> {
    match default {
        Some(ParamValue::Numeric(v)) => Ok(quote! { Some(#v) }),
        None => Ok(quote! { None }),
        Some(_) => Err(Error::new(
            proc_macro2::Span::call_site(),
            "numeric parameter needs a numeric default",
        )),
    }
}
