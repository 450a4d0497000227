//! `Builder`/`Inspector`: thin facades for building and reading back values
//! without leaking heap internals (`spec.md` §4.6), plus the disassembler
//! this document's ambient-stack expansion adds alongside them.

use lispc_core::InternedSymbol;

use crate::context::ExecutionContext;
use crate::error::DetailedError;
use crate::heap::Heap;
use crate::instruction::{BytecodeFunction, Instruction};
use crate::value::Value;

/// A deliberately generous bound on display recursion. Cyclic pairs are
/// legal values (`spec.md` §9); `pretty` must terminate on them rather than
/// stack-overflow, so depth wins over completeness past this point.
const MAX_PRETTY_DEPTH: usize = 64;

/// Converts native Rust values into heap-backed [`Value`]s.
pub struct Builder<'a> {
    pub heap: &'a mut Heap,
}

impl<'a> Builder<'a> {
    pub fn new(heap: &'a mut Heap) -> Self {
        Builder { heap }
    }

    pub fn nil(&self) -> Value {
        Value::Nil
    }

    pub fn bool(&self, b: bool) -> Value {
        Value::Bool(b)
    }

    pub fn int(&self, n: i64) -> Value {
        Value::Int(n)
    }

    pub fn float(&self, f: f64) -> Value {
        Value::Float(f)
    }

    /// An unquoted symbol, resolved through `deref` when compiled.
    pub fn symbol(&mut self, name: &str) -> Value {
        Value::Symbol(self.heap.intern(name), false)
    }

    /// A quoted symbol, pushed as a literal when compiled.
    pub fn quoted_symbol(&mut self, name: &str) -> Value {
        Value::Symbol(self.heap.intern(name), true)
    }

    pub fn string(&mut self, text: impl Into<Box<str>>) -> Value {
        self.heap.create_string(text)
    }

    pub fn pair(&mut self, first: Value, second: Value) -> Value {
        self.heap.create_pair(first, second)
    }

    /// Right-fold `items` into a proper list.
    pub fn list(&mut self, items: &[Value]) -> Value {
        self.heap.vec_to_list(items)
    }

    pub fn error(&mut self, error: DetailedError) -> Value {
        self.heap.create_error(error)
    }

    /// Allocation on the object pools here is `Vec`-backed and only fails
    /// by aborting, so this always succeeds today; it returns a `Value`
    /// anyway (rather than `Option`) so a future bounded-heap pool can
    /// route allocation failure through the same `out-of-memory` kind
    /// `spec.md` §4.6 calls for without changing every call site.
    pub fn out_of_memory(&mut self) -> Value {
        self.heap.create_error(DetailedError::OutOfMemory)
    }
}

/// Converts [`Value`]s back into native Rust values, and formats them for
/// humans.
pub struct Inspector<'a> {
    pub heap: &'a Heap,
}

impl<'a> Inspector<'a> {
    pub fn new(heap: &'a Heap) -> Self {
        Inspector { heap }
    }

    pub fn to_bool(&self, v: Value) -> Result<bool, DetailedError> {
        match v {
            Value::Bool(b) => Ok(b),
            other => Err(DetailedError::WrongType { want: "bool", got: other }),
        }
    }

    pub fn to_int(&self, v: Value) -> Result<i64, DetailedError> {
        match v {
            Value::Int(n) => Ok(n),
            other => Err(DetailedError::WrongType { want: "int", got: other }),
        }
    }

    pub fn to_float(&self, v: Value) -> Result<f64, DetailedError> {
        match v {
            Value::Float(f) => Ok(f),
            other => Err(DetailedError::WrongType { want: "float", got: other }),
        }
    }

    pub fn to_symbol(&self, v: Value) -> Result<InternedSymbol, DetailedError> {
        match v {
            Value::Symbol(s, _) => Ok(s),
            other => Err(DetailedError::WrongType { want: "symbol", got: other }),
        }
    }

    pub fn to_string_bytes(&self, v: Value) -> Result<&str, DetailedError> {
        match v {
            Value::String(handle) => {
                Ok(self.heap.get_string(handle).map_err(|_| DetailedError::ObjectNotFound)?.as_str())
            }
            other => Err(DetailedError::WrongType { want: "string", got: other }),
        }
    }

    pub fn to_pair(&self, v: Value) -> Result<crate::value::Pair, DetailedError> {
        match v {
            Value::Pair(handle) => {
                Ok(*self.heap.get_pair(handle).map_err(|_| DetailedError::ObjectNotFound)?)
            }
            other => Err(DetailedError::WrongType { want: "pair", got: other }),
        }
    }

    pub fn to_detailed_error(&self, v: Value) -> Result<&DetailedError, DetailedError> {
        match v {
            Value::Error(handle) => self.heap.get_error(handle).map_err(|_| DetailedError::ObjectNotFound),
            other => Err(DetailedError::WrongType { want: "error", got: other }),
        }
    }

    /// A proper-list iterator, materialized eagerly; `spec.md`'s
    /// list-iterator conversion is expressed this way here rather than as
    /// a lazy cursor, matching how `builtins::LIST`/`iter_next` already
    /// consume lists.
    pub fn to_list(&self, v: Value) -> Result<Vec<Value>, DetailedError> {
        self.heap.list_to_vec(v)
    }

    pub fn pretty(&self, v: Value) -> String {
        let mut out = String::new();
        self.write_pretty(&mut out, v, 0);
        out
    }

    pub fn pretty_slice(&self, vals: &[Value]) -> String {
        vals.iter().map(|v| self.pretty(*v)).collect::<Vec<_>>().join(" ")
    }

    fn write_pretty(&self, out: &mut String, v: Value, depth: usize) {
        if depth >= MAX_PRETTY_DEPTH {
            out.push_str("...");
            return;
        }
        match v {
            Value::Nil => out.push_str("nil"),
            Value::Bool(true) => out.push_str("true"),
            Value::Bool(false) => out.push_str("false"),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Float(f) => out.push_str(&f.to_string()),
            Value::Symbol(symbol, quoted) => {
                if quoted {
                    out.push('\'');
                }
                out.push_str(self.heap.symbol_name(symbol));
            }
            Value::String(handle) => match self.heap.get_string(handle) {
                Ok(s) => {
                    out.push('"');
                    out.push_str(s.as_str());
                    out.push('"');
                }
                Err(_) => out.push_str("#<dangling string>"),
            },
            Value::Pair(handle) => match self.heap.get_pair(handle) {
                Ok(pair) => {
                    let (first, second) = (pair.first, pair.second);
                    out.push('(');
                    self.write_pretty(out, first, depth + 1);
                    self.write_list_tail(out, second, depth + 1);
                    out.push(')');
                }
                Err(_) => out.push_str("#<dangling pair>"),
            },
            Value::NativeFunction(descriptor) => {
                out.push_str("#<native-function ");
                out.push_str(descriptor.name);
                out.push('>');
            }
            Value::BytecodeFunction(handle) => match self.heap.get_function(handle) {
                Ok(function) => {
                    out.push_str("#<function");
                    if let Some(name) = function.name {
                        out.push(' ');
                        out.push_str(self.heap.symbol_name(name));
                    }
                    out.push('>');
                }
                Err(_) => out.push_str("#<dangling function>"),
            },
            Value::Error(handle) => match self.heap.get_error(handle) {
                Ok(error) => out.push_str(&error.to_string()),
                Err(_) => out.push_str("#<dangling error>"),
            },
        }
    }

    /// The remainder of a list after its head: ` . second` for an improper
    /// tail, ` rest...` for a proper continuation, nothing for `nil`.
    fn write_list_tail(&self, out: &mut String, tail: Value, depth: usize) {
        if depth >= MAX_PRETTY_DEPTH {
            out.push_str(" ...");
            return;
        }
        match tail {
            Value::Nil => {}
            Value::Pair(handle) => match self.heap.get_pair(handle) {
                Ok(pair) => {
                    let (first, second) = (pair.first, pair.second);
                    out.push(' ');
                    self.write_pretty(out, first, depth + 1);
                    self.write_list_tail(out, second, depth + 1);
                }
                Err(_) => out.push_str(" . #<dangling pair>"),
            },
            other => {
                out.push_str(" . ");
                self.write_pretty(out, other, depth + 1);
            }
        }
    }

    /// One line per live call frame, innermost first.
    pub fn stack_trace(&self, context: &ExecutionContext) -> String {
        let mut lines = Vec::new();
        for frame in context.frames.iter().rev() {
            let label = match frame.function {
                Some(handle) => match self.heap.get_function(handle) {
                    Ok(function) => function
                        .name
                        .map(|n| self.heap.symbol_name(n).to_string())
                        .unwrap_or_else(|| "<anonymous>".to_string()),
                    Err(_) => "<dangling function>".to_string(),
                },
                None => "<native>".to_string(),
            };
            lines.push(format!("  at {label} (instruction {})", frame.instruction_index));
        }
        if lines.is_empty() {
            "  <no active call frames>".to_string()
        } else {
            lines.join("\n")
        }
    }

    /// `spec.md` §4.6: "stack trace followed by the last error."
    pub fn error_report(&self, context: &ExecutionContext) -> String {
        let trace = self.stack_trace(context);
        match &context.last_error {
            Some(error) => format!("{trace}\n{error}"),
            None => format!("{trace}\n<no error recorded>"),
        }
    }

    /// One line per instruction, resolving `deref` targets to their
    /// symbol name for readability.
    pub fn disassemble(&self, function: &BytecodeFunction) -> String {
        let mut lines = Vec::with_capacity(function.instructions.len());
        for (index, instruction) in function.instructions.iter().enumerate() {
            let rendered = match instruction {
                Instruction::Deref(symbol) => {
                    format!("deref {}", self.heap.symbol_name(*symbol))
                }
                Instruction::Push(value) => format!("push {}", self.pretty(*value)),
                other => format!("{other:?}"),
            };
            lines.push(format!("{index:>4}: {rendered}"));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_round_trips_simple_list() {
        let mut heap = Heap::new();
        let mut builder = Builder::new(&mut heap);
        let list = builder.list(&[Value::Int(1), Value::Int(2), Value::Int(3)]);
        let inspector = Inspector::new(&heap);
        assert_eq!(inspector.pretty(list), "(1 2 3)");
    }

    #[test]
    fn pretty_renders_improper_tail() {
        let mut heap = Heap::new();
        let pair = heap.create_pair(Value::Int(1), Value::Int(2));
        let inspector = Inspector::new(&heap);
        assert_eq!(inspector.pretty(pair), "(1 . 2)");
    }

    #[test]
    fn pretty_terminates_on_cyclic_pair() {
        let mut heap = Heap::new();
        let p = heap.create_pair(Value::Nil, Value::Nil);
        if let Value::Pair(handle) = p {
            let pair = heap.pairs.get_mut(handle).unwrap();
            pair.first = Value::Int(1);
            pair.second = p;
        }
        let inspector = Inspector::new(&heap);
        let rendered = inspector.pretty(p);
        assert!(rendered.ends_with("...)"));
    }

    #[test]
    fn disassemble_resolves_deref_symbol_names() {
        let mut heap = Heap::new();
        let plus = heap.intern("+");
        let function = BytecodeFunction::new(
            vec![Instruction::Deref(plus), Instruction::Ret],
            0,
            0,
            None,
        );
        let inspector = Inspector::new(&heap);
        let text = inspector.disassemble(&function);
        assert!(text.contains("deref +"));
    }

    #[test]
    fn to_int_on_wrong_type_reports_offending_value() {
        let heap = Heap::new();
        let inspector = Inspector::new(&heap);
        let err = inspector.to_int(Value::Nil).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::WrongType);
    }
}
