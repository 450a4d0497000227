//! Mark-and-sweep garbage collection over the heap's object pools.
//!
//! See `spec.md` §4.7 and §9 for the authoritative design. This module is
//! deliberately small: all the interesting state (pools, the current
//! `unreachable_color`) lives on [`Heap`]; this is just the traversal.

use tracing::debug;

use crate::context::ExecutionContext;
use crate::heap::Heap;
use crate::value::Value;

/// Run one mark-and-sweep cycle.
///
/// Roots are every value on the data stack, every value in `globals`, and
/// the value referenced by `last_error` (`spec.md` §4.7). GC must not run
/// while a mutable borrow into a pool slot is live; this function takes
/// `&mut Heap`/`&ExecutionContext` directly so the borrow checker enforces
/// that for us — it cannot be called from inside, say, a native function
/// that is still holding a reference returned by `Heap::get_string`.
pub fn garbage_collect(heap: &mut Heap, context: &ExecutionContext) {
    let reachable_color = heap.unreachable_color.other();

    for &value in &context.data_stack {
        mark_value(heap, value, reachable_color);
    }
    for &value in context.globals.values() {
        mark_value(heap, value, reachable_color);
    }
    if let Some(error) = &context.last_error {
        let children: Vec<Value> = error.children().collect();
        for child in children {
            mark_value(heap, child, reachable_color);
        }
    }

    let freed_pairs = heap.pairs.sweep(heap.unreachable_color).len();
    let freed_strings = heap.strings.sweep(heap.unreachable_color).len();
    let freed_functions = heap.functions.sweep(heap.unreachable_color).len();
    let freed_errors = heap.errors.sweep(heap.unreachable_color).len();

    debug!(
        freed_pairs,
        freed_strings, freed_functions, freed_errors, "garbage collection cycle complete"
    );

    heap.unreachable_color = heap.unreachable_color.other();
}

/// Mark `value` and, on first visit, recurse into whatever it references.
/// The "only if the previous color differed" check is what terminates
/// cycles formed through self-referential pairs in bounded time
/// (`spec.md` §9, "Cyclic object graphs via pairs").
fn mark_value(heap: &mut Heap, value: Value, reachable_color: lispc_core::Color) {
    match value {
        Value::Pair(handle) => {
            let Ok(previous) = heap.pairs.set_color(handle, reachable_color) else { return };
            if previous != reachable_color {
                if let Ok(pair) = heap.pairs.get(handle) {
                    let (first, second) = (pair.first, pair.second);
                    mark_value(heap, first, reachable_color);
                    mark_value(heap, second, reachable_color);
                }
            }
        }
        Value::String(handle) => {
            let _ = heap.strings.set_color(handle, reachable_color);
        }
        Value::BytecodeFunction(handle) => {
            let Ok(previous) = heap.functions.set_color(handle, reachable_color) else { return };
            if previous != reachable_color {
                if let Ok(function) = heap.functions.get(handle) {
                    let children: Vec<Value> =
                        function.instructions.iter().filter_map(|i| i.pushed_value()).collect();
                    for child in children {
                        mark_value(heap, child, reachable_color);
                    }
                }
            }
        }
        Value::Error(handle) => {
            let Ok(previous) = heap.errors.set_color(handle, reachable_color) else { return };
            if previous != reachable_color {
                if let Ok(error) = heap.errors.get(handle) {
                    let children: Vec<Value> = error.children().collect();
                    for child in children {
                        mark_value(heap, child, reachable_color);
                    }
                }
            }
        }
        // Non-heap variants (nil, bool, int, float, symbol, native function
        // pointer) carry no pool handle and require no marking.
        Value::Nil
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::Symbol(..)
        | Value::NativeFunction(_) => {}
    }
}
