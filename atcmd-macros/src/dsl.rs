//! Grammar for the `atcmd_catalogue!` input, grounded on
//! `ushell_dispatcher::commandsgen::CommandMacroInput` — a hand-written
//! `syn::parse::Parse` impl over a small keyword-driven DSL rather than a
//! derive, because the shape (nested brace blocks, per-entry trailing
//! handler lists) does not fit `syn`'s derive machinery any better than it
//! fit the teacher's own dispatcher grammar.

use proc_macro2::Span;
use syn::parse::{Parse, ParseStream};
use syn::{Ident, LitInt, LitStr, Result, Token};

mod kw {
    syn::custom_keyword!(max_commands_per_line);
    syn::custom_keyword!(basic);
    syn::custom_keyword!(ampersand);
    syn::custom_keyword!(extended);
    syn::custom_keyword!(read);
    syn::custom_keyword!(write);
    syn::custom_keyword!(test);
    syn::custom_keyword!(abort);
    syn::custom_keyword!(dec);
    syn::custom_keyword!(hex);
    syn::custom_keyword!(bin);
    syn::custom_keyword!(str);
    syn::custom_keyword!(hexstr);
    syn::custom_keyword!(default);
    syn::custom_keyword!(optional);
}

pub struct CatalogueInput {
    pub mod_name: Ident,
    /// `spec.md` §6 "Line-buffer capacity formula" factor: the buffer itself
    /// is computed by `codegen::generate`, not taken as a literal byte count,
    /// so a catalogue change can't silently leave the buffer under-sized.
    pub max_commands_per_line: usize,
    pub basic: Vec<BasicEntry>,
    pub ampersand: Vec<BasicEntry>,
    pub extended: Vec<ExtendedEntry>,
}

pub struct BasicEntry {
    pub letter: Ident,
    pub range: Option<(u32, u32)>,
    pub handler: syn::Path,
}

pub struct ExtendedEntry {
    pub name: Ident,
    pub params: Vec<ParamEntry>,
    pub read: Option<syn::Path>,
    pub write: Option<syn::Path>,
    pub test: Option<syn::Path>,
    pub abort: Option<syn::Path>,
}

#[derive(Clone)]
pub enum ParamKindSpec {
    Dec(Vec<(u32, u32)>),
    Hex(Vec<(u32, u32)>),
    Bin(Vec<(u32, u32)>),
    Str(u16),
    HexStr(u16),
}

pub enum ParamValue {
    Numeric(u32),
    Str(String),
    HexStr(Vec<u8>),
}

pub struct ParamEntry {
    pub kind: ParamKindSpec,
    pub optional: bool,
    pub default: Option<ParamValue>,
}

impl Parse for CatalogueInput {
    fn parse(input: ParseStream) -> Result<Self> {
        input.parse::<Token![mod]>()?;
        let mod_name: Ident = input.parse()?;
        input.parse::<Token![;]>()?;

        input.parse::<kw::max_commands_per_line>()?;
        input.parse::<Token![=]>()?;
        let max_commands_lit: LitInt = input.parse()?;
        let max_commands_per_line: usize = max_commands_lit.base10_parse()?;
        input.parse::<Token![;]>()?;

        let mut basic = Vec::new();
        let mut ampersand = Vec::new();
        let mut extended = Vec::new();

        while !input.is_empty() {
            if input.peek(kw::basic) {
                input.parse::<kw::basic>()?;
                let content;
                syn::braced!(content in input);
                while !content.is_empty() {
                    basic.push(content.parse::<BasicEntry>()?);
                }
            } else if input.peek(kw::ampersand) {
                input.parse::<kw::ampersand>()?;
                let content;
                syn::braced!(content in input);
                while !content.is_empty() {
                    ampersand.push(content.parse::<BasicEntry>()?);
                }
            } else if input.peek(kw::extended) {
                input.parse::<kw::extended>()?;
                let content;
                syn::braced!(content in input);
                while !content.is_empty() {
                    extended.push(content.parse::<ExtendedEntry>()?);
                }
            } else {
                return Err(input.error("expected `basic`, `ampersand` or `extended` block"));
            }
        }

        Ok(CatalogueInput {
            mod_name,
            max_commands_per_line,
            basic,
            ampersand,
            extended,
        })
    }
}

impl Parse for BasicEntry {
    fn parse(input: ParseStream) -> Result<Self> {
        let letter: Ident = input.parse()?;
        let range = if input.peek(syn::token::Paren) {
            let content;
            syn::parenthesized!(content in input);
            let r: syn::ExprRange = content.parse()?;
            Some(range_bounds(&r)?)
        } else {
            None
        };
        input.parse::<Token![=>]>()?;
        let handler: syn::Path = input.parse()?;
        input.parse::<Token![;]>()?;
        Ok(BasicEntry {
            letter,
            range,
            handler,
        })
    }
}

impl Parse for ExtendedEntry {
    fn parse(input: ParseStream) -> Result<Self> {
        let name: Ident = input.parse()?;
        let content;
        syn::braced!(content in input);
        let mut params = Vec::new();
        while !content.is_empty() {
            params.push(content.parse::<ParamEntry>()?);
        }

        let mut read = None;
        let mut write = None;
        let mut test = None;
        let mut abort = None;

        loop {
            if input.peek(kw::read) {
                input.parse::<kw::read>()?;
                input.parse::<Token![=]>()?;
                read = Some(input.parse()?);
            } else if input.peek(kw::write) {
                input.parse::<kw::write>()?;
                input.parse::<Token![=]>()?;
                write = Some(input.parse()?);
            } else if input.peek(kw::test) {
                input.parse::<kw::test>()?;
                input.parse::<Token![=]>()?;
                test = Some(input.parse()?);
            } else if input.peek(kw::abort) {
                input.parse::<kw::abort>()?;
                input.parse::<Token![=]>()?;
                abort = Some(input.parse()?);
            } else {
                break;
            }
            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            } else {
                break;
            }
        }
        input.parse::<Token![;]>()?;

        Ok(ExtendedEntry {
            name,
            params,
            read,
            write,
            test,
            abort,
        })
    }
}

impl Parse for ParamEntry {
    fn parse(input: ParseStream) -> Result<Self> {
        let kind = if input.peek(kw::dec) {
            input.parse::<kw::dec>()?;
            ParamKindSpec::Dec(parse_ranges(input)?)
        } else if input.peek(kw::hex) {
            input.parse::<kw::hex>()?;
            ParamKindSpec::Hex(parse_ranges(input)?)
        } else if input.peek(kw::bin) {
            input.parse::<kw::bin>()?;
            ParamKindSpec::Bin(parse_ranges(input)?)
        } else if input.peek(kw::hexstr) {
            input.parse::<kw::hexstr>()?;
            let content;
            syn::parenthesized!(content in input);
            let n: LitInt = content.parse()?;
            ParamKindSpec::HexStr(n.base10_parse()?)
        } else if input.peek(kw::str) {
            input.parse::<kw::str>()?;
            let content;
            syn::parenthesized!(content in input);
            let n: LitInt = content.parse()?;
            ParamKindSpec::Str(n.base10_parse()?)
        } else {
            return Err(input.error("expected one of dec/hex/bin/str/hexstr"));
        };

        let mut default = None;
        let mut optional = false;
        loop {
            if input.peek(kw::default) {
                input.parse::<kw::default>()?;
                default = Some(parse_default_value(input, &kind)?);
            } else if input.peek(kw::optional) {
                input.parse::<kw::optional>()?;
                optional = true;
            } else {
                break;
            }
        }
        input.parse::<Token![;]>()?;

        Ok(ParamEntry {
            kind,
            optional,
            default,
        })
    }
}

fn parse_ranges(input: ParseStream) -> Result<Vec<(u32, u32)>> {
    let content;
    syn::parenthesized!(content in input);
    let ranges = content.parse_terminated(syn::ExprRange::parse, Token![,])?;
    ranges.iter().map(range_bounds).collect()
}

fn parse_default_value(input: ParseStream, kind: &ParamKindSpec) -> Result<ParamValue> {
    match kind {
        ParamKindSpec::Dec(_) | ParamKindSpec::Hex(_) | ParamKindSpec::Bin(_) => {
            let lit: LitInt = input.parse()?;
            Ok(ParamValue::Numeric(lit.base10_parse()?))
        }
        ParamKindSpec::Str(_) => {
            let lit: LitStr = input.parse()?;
            Ok(ParamValue::Str(lit.value()))
        }
        ParamKindSpec::HexStr(_) => {
            let content;
            syn::bracketed!(content in input);
            let items = content.parse_terminated(LitInt::parse, Token![,])?;
            let bytes = items
                .iter()
                .map(|l| l.base10_parse::<u8>())
                .collect::<Result<Vec<u8>>>()?;
            Ok(ParamValue::HexStr(bytes))
        }
    }
}

fn range_bounds(r: &syn::ExprRange) -> Result<(u32, u32)> {
    if !matches!(r.limits, syn::RangeLimits::Closed(_)) {
        return Err(syn::Error::new(
            Span::call_site(),
            "parameter ranges must be inclusive (`lo..=hi`)",
        ));
    }
    let start = r
        .start
        .as_ref()
        .ok_or_else(|| syn::Error::new(Span::call_site(), "range needs a start bound"))?;
    let end = r
        .end
        .as_ref()
        .ok_or_else(|| syn::Error::new(Span::call_site(), "range needs an end bound"))?;
    Ok((expr_to_u32(start)?, expr_to_u32(end)?))
}

fn expr_to_u32(e: &syn::Expr) -> Result<u32> {
    if let syn::Expr::Lit(syn::ExprLit {
        lit: syn::Lit::Int(i),
        ..
    }) = e
    {
        i.base10_parse()
    } else {
        Err(syn::Error::new_spanned(e, "expected an integer literal"))
    }
}
