//! Identifier string interning.
//!
//! Symbols are compared and hashed constantly during compilation and
//! execution (global lookups, local-slot binding, special-form dispatch).
//! The interner deduplicates identifier text into small `u32` ids so those
//! comparisons are integer comparisons rather than string comparisons.

use std::collections::HashMap;

/// A small integer standing for a unique identifier string.
///
/// Two interned symbols are equal iff their ids are equal; the interner
/// that produced them guarantees a given string always maps to the same
/// id for the lifetime of that interner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternedSymbol(u32);

impl InternedSymbol {
    /// Raw id, exposed for debugging/serialization of bytecode dumps.
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Owns the canonical string for every symbol interned through it.
///
/// An interner belongs to exactly one VM (`spec.md` §5: "The string
/// interner inside a given VM is owned exclusively by that VM") and is
/// torn down along with it.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    ids: HashMap<Box<str>, InternedSymbol>,
}

impl Interner {
    pub fn new() -> Self {
        Interner { strings: Vec::new(), ids: HashMap::new() }
    }

    /// Intern `text`, returning its id. Interning the same text twice
    /// returns the same id.
    pub fn intern(&mut self, text: &str) -> InternedSymbol {
        if let Some(&id) = self.ids.get(text) {
            return id;
        }
        let id = InternedSymbol(self.strings.len() as u32);
        let boxed: Box<str> = text.into();
        self.strings.push(boxed.clone());
        self.ids.insert(boxed, id);
        id
    }

    /// Resolve a previously-interned id back to its string.
    ///
    /// Panics if given an `InternedSymbol` from a different interner; this
    /// is a programmer error (there is exactly one interner per VM and
    /// symbols never cross VM boundaries), not a user-facing fault.
    pub fn resolve(&self, symbol: InternedSymbol) -> &str {
        &self.strings[symbol.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_text_twice_yields_same_id() {
        let mut interner = Interner::new();
        let a = interner.intern("hello");
        let b = interner.intern("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_text_yields_distinct_ids() {
        let mut interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("bar");
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_roundtrips() {
        let mut interner = Interner::new();
        let id = interner.intern("round-trip");
        assert_eq!(interner.resolve(id), "round-trip");
    }
}
