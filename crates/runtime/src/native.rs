//! The native-function ABI and registry (`spec.md` §4.5).
//!
//! A native function is a static descriptor; registering it stores its
//! `'static` reference as a [`Value::NativeFunction`] under its interned
//! name in the embedder's globals. The entrypoint reads its arguments from
//! [`NativeContext::local_stack`], the same way a bytecode function's body
//! would, which is what lets `eval` treat both callee kinds uniformly
//! (`spec.md` §4.4).
//!
//! The entrypoint signature is expressed in terms of [`Heap`] and
//! [`ExecutionContext`] directly rather than a higher-level `Vm` type: the
//! layer that owns parsing and compilation (and so would naturally be
//! called `Vm`) necessarily depends on this crate, so this crate cannot
//! name it without a dependency cycle. `NativeContext` is the ABI boundary
//! instead.

use crate::context::ExecutionContext;
use crate::error::DetailedError;
use crate::heap::Heap;
use crate::value::{NativeFunctionDescriptor, Value};

/// What a native function entrypoint sees: mutable access to the heap (to
/// allocate strings/pairs/errors for its result) and to the execution
/// context (to read its arguments and, rarely, inspect globals).
pub struct NativeContext<'a> {
    pub heap: &'a mut Heap,
    pub context: &'a mut ExecutionContext,
}

impl NativeContext<'_> {
    /// The arguments passed to this call, in source order.
    pub fn local_stack(&self) -> Result<&[Value], DetailedError> {
        self.context.local_stack()
    }

    pub fn arg(&self, index: usize) -> Result<Value, DetailedError> {
        self.local_stack()?.get(index).copied().ok_or(DetailedError::WrongArity {
            expected: index as u32 + 1,
            got: self.local_stack()?.len() as u32,
        })
    }
}

impl NativeFunctionDescriptor {
    /// Install this descriptor as a global binding.
    pub fn register(&'static self, heap: &mut Heap, context: &mut ExecutionContext) {
        let symbol = heap.intern(self.name);
        context.globals.insert(symbol, Value::NativeFunction(self));
    }
}
