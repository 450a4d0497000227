//! Owns every heap-resident object and the symbol table that names them.
//!
//! `Heap` is the sole owner of all pool-allocated state (`spec.md` §3:
//! "the `Heap` exclusively owns every heap object"). `Value` instances
//! handed out to callers are plain, `Copy` descriptors; they become
//! dangling exactly when the slot they reference is reclaimed by
//! [`crate::gc::garbage_collect`] or dropped wholesale when the `Heap`
//! itself is dropped.

use lispc_core::{Color, Handle, InternedSymbol, Interner, ObjectNotFound, Pool};

use crate::error::DetailedError;
use crate::instruction::BytecodeFunction;
use crate::value::{LString, Pair, Value};

pub struct Heap {
    pub(crate) interner: Interner,
    pub(crate) pairs: Pool<Pair>,
    pub(crate) strings: Pool<LString>,
    pub(crate) functions: Pool<BytecodeFunction>,
    pub(crate) errors: Pool<DetailedError>,
    /// The color that the *next* sweep will treat as garbage. New objects
    /// are created with this color, not the reachable one (`spec.md` §9):
    /// the following mark pass still finds them via their root and
    /// upgrades them, while objects that never become reachable are
    /// correctly collected on the very next cycle instead of surviving an
    /// extra round.
    pub(crate) unreachable_color: Color,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            interner: Interner::new(),
            pairs: Pool::new(),
            strings: Pool::new(),
            functions: Pool::new(),
            errors: Pool::new(),
            unreachable_color: Color::Red,
        }
    }

    pub fn intern(&mut self, text: &str) -> InternedSymbol {
        self.interner.intern(text)
    }

    pub fn symbol_name(&self, symbol: InternedSymbol) -> &str {
        self.interner.resolve(symbol)
    }

    pub fn create_pair(&mut self, first: Value, second: Value) -> Value {
        let handle = self.pairs.create(Pair::new(first, second), self.unreachable_color);
        Value::Pair(handle)
    }

    pub fn create_string(&mut self, text: impl Into<Box<str>>) -> Value {
        let handle = self.strings.create(LString::new(text), self.unreachable_color);
        Value::String(handle)
    }

    pub fn create_function(&mut self, function: BytecodeFunction) -> Value {
        let handle = self.functions.create(function, self.unreachable_color);
        Value::BytecodeFunction(handle)
    }

    pub fn create_error(&mut self, error: DetailedError) -> Value {
        let handle = self.errors.create(error, self.unreachable_color);
        Value::Error(handle)
    }

    pub fn get_pair(&self, handle: Handle<Pair>) -> Result<&Pair, ObjectNotFound> {
        self.pairs.get(handle)
    }

    pub fn get_string(&self, handle: Handle<LString>) -> Result<&LString, ObjectNotFound> {
        self.strings.get(handle)
    }

    pub fn get_function(&self, handle: Handle<BytecodeFunction>) -> Result<&BytecodeFunction, ObjectNotFound> {
        self.functions.get(handle)
    }

    pub fn get_error(&self, handle: Handle<DetailedError>) -> Result<&DetailedError, ObjectNotFound> {
        self.errors.get(handle)
    }

    /// Walk a proper list, collecting its elements. Fails with
    /// [`DetailedError::WrongType`] if the chain is terminated by anything
    /// other than `nil` (an improper list).
    pub fn list_to_vec(&self, mut list: Value) -> Result<Vec<Value>, DetailedError> {
        let mut items = Vec::new();
        loop {
            match list {
                Value::Nil => return Ok(items),
                Value::Pair(handle) => {
                    let pair = self.get_pair(handle).map_err(|_| DetailedError::ObjectNotFound)?;
                    items.push(pair.first);
                    list = pair.second;
                }
                other => {
                    return Err(DetailedError::WrongType { want: "proper list", got: other });
                }
            }
        }
    }

    /// Build a proper list from `items`, right-folded so `items[0]` ends up
    /// as the head of the chain.
    pub fn vec_to_list(&mut self, items: &[Value]) -> Value {
        let mut list = Value::Nil;
        for item in items.iter().rev() {
            list = self.create_pair(*item, list);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_round_trip() {
        let mut heap = Heap::new();
        let items = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
        let list = heap.vec_to_list(&items);
        let back = heap.list_to_vec(list).unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn improper_list_rejected() {
        let mut heap = Heap::new();
        let improper = heap.create_pair(Value::Int(1), Value::Int(2));
        let err = heap.list_to_vec(improper).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::WrongType);
    }

    #[test]
    fn new_objects_get_unreachable_color() {
        let mut heap = Heap::new();
        let v = heap.create_string("x");
        if let Value::String(h) = v {
            assert_eq!(heap.strings.color_of(h).unwrap(), heap.unreachable_color);
        } else {
            panic!("expected string");
        }
    }
}
