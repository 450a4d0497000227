//! Per-compile variable-to-local-slot map with anonymous slots
//! (`spec.md` §2, "Lexical scope").

use lispc_core::InternedSymbol;

/// One function's flat local-slot array as seen by the compiler. `let`
/// and `for` allocate new slots on top of the parameter slots rather than
/// reusing freed ones, which keeps `stack_start + idx` addressing stable
/// for every instruction already emitted; unbinding only removes the name
/// so later lookups fall through to an enclosing binding (or `deref`).
pub struct LexicalScope {
    slots: Vec<Option<InternedSymbol>>,
}

impl LexicalScope {
    pub fn new() -> Self {
        LexicalScope { slots: Vec::new() }
    }

    /// Bind `name` to a fresh slot, returning its index.
    pub fn bind(&mut self, name: InternedSymbol) -> i32 {
        let idx = self.slots.len();
        self.slots.push(Some(name));
        idx as i32
    }

    /// Reserve a fresh slot with no name (used for `for`'s hidden
    /// iterable-cursor slot).
    pub fn reserve_anonymous(&mut self) -> i32 {
        let idx = self.slots.len();
        self.slots.push(None);
        idx as i32
    }

    /// The most recently bound slot for `name`, honoring shadowing.
    pub fn resolve(&self, name: InternedSymbol) -> Option<i32> {
        self.slots.iter().rposition(|slot| *slot == Some(name)).map(|i| i as i32)
    }

    /// Remove `name`'s binding from `idx` without freeing the slot, so a
    /// `let`'s names don't leak into code compiled after it exits.
    pub fn unbind(&mut self, idx: i32) {
        self.slots[idx as usize] = None;
    }

    /// Total slots ever allocated; the function's `initial_local_stack_size`.
    pub fn slot_count(&self) -> u32 {
        self.slots.len() as u32
    }
}

impl Default for LexicalScope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lispc_core::Interner;

    #[test]
    fn shadowed_binding_resolves_to_most_recent() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut scope = LexicalScope::new();
        let first = scope.bind(x);
        let second = scope.bind(x);
        assert_ne!(first, second);
        assert_eq!(scope.resolve(x), Some(second));
    }

    #[test]
    fn unbind_falls_through_to_earlier_binding() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut scope = LexicalScope::new();
        let first = scope.bind(x);
        let second = scope.bind(x);
        scope.unbind(second);
        assert_eq!(scope.resolve(x), Some(first));
    }

    #[test]
    fn slot_count_survives_unbind() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut scope = LexicalScope::new();
        scope.bind(x);
        scope.unbind(0);
        assert_eq!(scope.slot_count(), 1);
    }
}
