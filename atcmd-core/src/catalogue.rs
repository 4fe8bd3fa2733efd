//! Command descriptors (C4).
//!
//! Two sorted arrays (basic, ampersand) indexed by letter, and a single
//! extended-command array indexed by the trie-assigned index — all
//! `&'static` data assembled by `atcmd-macros`. `spec.md` §4.4 is
//! authoritative.

use crate::exec::{
    BasicHandlerFn, ExtAbortHandlerFn, ExtReadHandlerFn, ExtTestHandlerFn, ExtWriteHandlerFn,
};
use crate::param::ExtParam;
use crate::trie::TrieCursor;

/// A single-letter basic (`X`) or ampersand (`&X`) command.
#[derive(Clone, Copy)]
pub struct BasicCmd {
    pub letter: u8,
    /// `Some(ranges)` when the command carries one optional decimal
    /// numeric parameter; `spec.md` caps this at one numeric param.
    pub numeric_ranges: Option<&'static [(u32, u32)]>,
    pub exec: BasicHandlerFn,
}

/// Hand-rolled minimal bitflags (avoids pulling in the `bitflags` crate for
/// a four-bit set; the teacher's own descriptor metadata is similarly a
/// plain packed `u8`, see `ushell_dispatcher::commandsgen::HostCounts`
/// style compactness).
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $ty:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub $ty);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn union(self, other: Self) -> Self {
                $name(self.0 | other.0)
            }

            pub const fn contains(self, other: Self) -> bool {
                (self.0 & other.0) == other.0
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }
    };
}

bitflags_like! {
    /// Which of the four extended-command operations are registered.
    pub struct HandlerSet: u8 {
        const READABLE        = 0b0001;
        const WRITABLE        = 0b0010;
        const CUSTOM_TESTABLE = 0b0100;
        const ABORTABLE       = 0b1000;
    }
}

/// One registered extended command (`+NAME`).
pub struct ExtendedCmd {
    pub name: &'static str,
    pub params: &'static [ExtParam],
    pub handlers: HandlerSet,
    pub read: Option<ExtReadHandlerFn>,
    pub write: Option<ExtWriteHandlerFn>,
    /// `None` means "use the default test handler": print the name alone
    /// (`spec.md` §3 `ExtendedCmd` — "test defaults to printing the name
    /// alone").
    pub test: Option<ExtTestHandlerFn>,
    pub abort: Option<ExtAbortHandlerFn>,
}

impl ExtendedCmd {
    #[inline]
    pub fn get_read(&self) -> Option<ExtReadHandlerFn> {
        self.read
    }

    #[inline]
    pub fn get_write(&self) -> Option<ExtWriteHandlerFn> {
        self.write
    }

    #[inline]
    pub fn get_abort(&self) -> Option<ExtAbortHandlerFn> {
        self.abort
    }

    /// Sum of fixed wire slot sizes for this command's parameter list —
    /// used by the executor to compute the next command's offset without
    /// re-parsing (`spec.md` §4.5).
    pub fn write_payload_size(&self) -> usize {
        self.params.iter().map(|p| p.slot_size()).sum()
    }
}

/// The full compile-time command catalogue: packed trie bytes, the
/// extended-command array the trie indexes into, and the sorted
/// basic/ampersand arrays.
pub struct Catalogue {
    pub trie: &'static [u8],
    pub extended: &'static [ExtendedCmd],
    pub basic: &'static [BasicCmd],
    pub ampersand: &'static [BasicCmd],
}

impl Catalogue {
    pub fn trie_cursor(&self) -> TrieCursor {
        TrieCursor::new(self.trie)
    }

    /// Binary search by letter — both basic and ampersand arrays are kept
    /// sorted by the catalogue macro (`spec.md` §3 catalogue invariant:
    /// "unique within their list, allowing binary-search lookup").
    pub fn find_basic(&self, letter: u8) -> Option<(usize, &'static BasicCmd)> {
        Self::find_in(self.basic, letter)
    }

    pub fn find_ampersand(&self, letter: u8) -> Option<(usize, &'static BasicCmd)> {
        Self::find_in(self.ampersand, letter)
    }

    fn find_in(list: &'static [BasicCmd], letter: u8) -> Option<(usize, &'static BasicCmd)> {
        list.binary_search_by_key(&letter, |c| c.letter)
            .ok()
            .map(|i| (i, &list[i]))
    }

    /// Number of registered extended commands (`E` in `spec.md` §4.5's ID
    /// space formula `4*E`).
    pub const fn extended_count(&self) -> usize {
        self.extended.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_set_bits() {
        let hs = HandlerSet::READABLE.union(HandlerSet::WRITABLE);
        assert!(hs.contains(HandlerSet::READABLE));
        assert!(hs.contains(HandlerSet::WRITABLE));
        assert!(!hs.contains(HandlerSet::ABORTABLE));
    }
}
