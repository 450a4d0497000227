//! The minimal built-in library needed to exercise the native-function ABI
//! and the end-to-end scenarios in `spec.md` §8.
//!
//! `spec.md` §1 scopes the full surface library (arithmetic, list, I/O
//! primitives) out of the core as a separate, external collaborator that
//! "consumes the native-function ABI... each built-in is trivial once the
//! ABI exists." This module is that proof: a small, representative set of
//! built-ins (arithmetic, the generic/numeric equality split `spec.md` §9
//! calls out, `list`, and the `internal-define` primitive the compiler's
//! `def` lowering depends on) implemented purely against [`NativeContext`]
//! with no special-cased VM support.

use lispc_core::InternedSymbol;

use crate::error::DetailedError;
use crate::native::NativeContext;
use crate::value::{NativeFunctionDescriptor, Value};

fn numeric_binop(
    ctx: &NativeContext,
    int_op: impl Fn(i64, i64) -> Result<i64, DetailedError>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, DetailedError> {
    let args = ctx.local_stack()?;
    if args.is_empty() {
        return Err(DetailedError::WrongArity { expected: 1, got: 0 });
    }
    let mut acc = args[0];
    for &arg in &args[1..] {
        acc = match (acc, arg) {
            (Value::Int(a), Value::Int(b)) => Value::Int(int_op(a, b)?),
            (Value::Int(a), Value::Float(b)) => Value::Float(float_op(a as f64, b)),
            (Value::Float(a), Value::Int(b)) => Value::Float(float_op(a, b as f64)),
            (Value::Float(a), Value::Float(b)) => Value::Float(float_op(a, b)),
            (other, Value::Int(_) | Value::Float(_)) => {
                return Err(DetailedError::WrongType { want: "int or float", got: other });
            }
            (_, other) => {
                return Err(DetailedError::WrongType { want: "int or float", got: other });
            }
        };
    }
    Ok(acc)
}

/// Overflow on a checked integer op is a distinct failure from division by
/// zero; both `+`/`-`/`*` funnel through here so the message stays uniform.
fn overflow(op: &'static str) -> DetailedError {
    DetailedError::Internal { message: format!("integer overflow in {op}") }
}

pub static ADD: NativeFunctionDescriptor = NativeFunctionDescriptor {
    name: "+",
    docstring: "Sum all arguments. Ints promote to float if any argument is a float.",
    arity: None,
    entrypoint: |ctx| {
        numeric_binop(ctx, |a, b| a.checked_add(b).ok_or_else(|| overflow("+")), |a, b| a + b)
    },
};

pub static SUB: NativeFunctionDescriptor = NativeFunctionDescriptor {
    name: "-",
    docstring: "Subtract each subsequent argument from the first.",
    arity: None,
    entrypoint: |ctx| {
        numeric_binop(ctx, |a, b| a.checked_sub(b).ok_or_else(|| overflow("-")), |a, b| a - b)
    },
};

pub static MUL: NativeFunctionDescriptor = NativeFunctionDescriptor {
    name: "*",
    docstring: "Multiply all arguments.",
    arity: None,
    entrypoint: |ctx| {
        numeric_binop(ctx, |a, b| a.checked_mul(b).ok_or_else(|| overflow("*")), |a, b| a * b)
    },
};

pub static DIV: NativeFunctionDescriptor = NativeFunctionDescriptor {
    name: "/",
    docstring: "Divide the first argument by each subsequent argument.",
    arity: None,
    entrypoint: |ctx| {
        numeric_binop(
            ctx,
            |a, b| if b == 0 { Err(DetailedError::DivisionByZero) } else { Ok(a / b) },
            |a, b| a / b,
        )
    },
};

/// `=`: strictly numeric equality (`spec.md` §9: "`=` in the source is
/// strictly numeric; `equal?` is generic. Preserve this split.").
pub static NUM_EQ: NativeFunctionDescriptor = NativeFunctionDescriptor {
    name: "=",
    docstring: "Numeric equality; all arguments must be int or float.",
    arity: None,
    entrypoint: |ctx| {
        let args = ctx.local_stack()?;
        if args.is_empty() {
            return Err(DetailedError::WrongArity { expected: 1, got: 0 });
        }
        fn as_f64(v: Value) -> Result<f64, DetailedError> {
            match v {
                Value::Int(n) => Ok(n as f64),
                Value::Float(f) => Ok(f),
                other => Err(DetailedError::WrongType { want: "int or float", got: other }),
            }
        }
        let first = as_f64(args[0])?;
        for &arg in &args[1..] {
            if as_f64(arg)? != first {
                return Ok(Value::Bool(false));
            }
        }
        Ok(Value::Bool(true))
    },
};

/// Structural equality over any two values, including heap-allocated
/// pairs and strings (by content, not by handle identity).
fn values_equal(ctx: &NativeContext, a: Value, b: Value) -> Result<bool, DetailedError> {
    match (a, b) {
        (Value::String(ha), Value::String(hb)) => {
            let sa = ctx.heap.get_string(ha).map_err(|_| DetailedError::ObjectNotFound)?;
            let sb = ctx.heap.get_string(hb).map_err(|_| DetailedError::ObjectNotFound)?;
            Ok(sa.as_str() == sb.as_str())
        }
        (Value::Pair(ha), Value::Pair(hb)) => {
            let pa = *ctx.heap.get_pair(ha).map_err(|_| DetailedError::ObjectNotFound)?;
            let pb = *ctx.heap.get_pair(hb).map_err(|_| DetailedError::ObjectNotFound)?;
            Ok(values_equal(ctx, pa.first, pb.first)? && values_equal(ctx, pa.second, pb.second)?)
        }
        _ => Ok(a == b),
    }
}

pub static EQUAL: NativeFunctionDescriptor = NativeFunctionDescriptor {
    name: "equal?",
    docstring: "Generic structural equality over any two values.",
    arity: Some(2),
    entrypoint: |ctx| {
        let args = ctx.local_stack()?.to_vec();
        let [a, b] = args.as_slice() else {
            return Err(DetailedError::WrongArity { expected: 2, got: args.len() as u32 });
        };
        Ok(Value::Bool(values_equal(ctx, *a, *b)?))
    },
};

/// `list`: build a proper list from its arguments, in order.
pub static LIST: NativeFunctionDescriptor = NativeFunctionDescriptor {
    name: "list",
    docstring: "Build a proper list from its arguments.",
    arity: None,
    entrypoint: |ctx| {
        let args = ctx.local_stack()?.to_vec();
        Ok(ctx.heap.vec_to_list(&args))
    },
};

/// `cons`: allocate a new pair.
pub static CONS: NativeFunctionDescriptor = NativeFunctionDescriptor {
    name: "cons",
    docstring: "Allocate a new pair (first . second).",
    arity: Some(2),
    entrypoint: |ctx| {
        let args = ctx.local_stack()?.to_vec();
        let [first, second] = args.as_slice() else {
            return Err(DetailedError::WrongArity { expected: 2, got: args.len() as u32 });
        };
        Ok(ctx.heap.create_pair(*first, *second))
    },
};

/// `car`: the first element of a pair.
pub static CAR: NativeFunctionDescriptor = NativeFunctionDescriptor {
    name: "car",
    docstring: "The first element of a pair.",
    arity: Some(1),
    entrypoint: |ctx| match ctx.arg(0)? {
        Value::Pair(handle) => {
            Ok(ctx.heap.get_pair(handle).map_err(|_| DetailedError::ObjectNotFound)?.first)
        }
        other => Err(DetailedError::WrongType { want: "pair", got: other }),
    },
};

/// `cdr`: the second element of a pair.
pub static CDR: NativeFunctionDescriptor = NativeFunctionDescriptor {
    name: "cdr",
    docstring: "The second element of a pair.",
    arity: Some(1),
    entrypoint: |ctx| match ctx.arg(0)? {
        Value::Pair(handle) => {
            Ok(ctx.heap.get_pair(handle).map_err(|_| DetailedError::ObjectNotFound)?.second)
        }
        other => Err(DetailedError::WrongType { want: "pair", got: other }),
    },
};

/// `internal-define`: the primitive `(def name val)` lowers to
/// (`spec.md` §4.3 `def` row). Binds `name` (a quoted symbol) to `val` in
/// the global table and yields `val`.
pub static INTERNAL_DEFINE: NativeFunctionDescriptor = NativeFunctionDescriptor {
    name: "internal-define",
    docstring: "Bind a global. Not meant to be called directly from source.",
    arity: Some(2),
    entrypoint: |ctx| {
        let args = ctx.local_stack()?.to_vec();
        let [name, val] = args.as_slice() else {
            return Err(DetailedError::WrongArity { expected: 2, got: args.len() as u32 });
        };
        let symbol: InternedSymbol = match name {
            Value::Symbol(symbol, _) => *symbol,
            other => return Err(DetailedError::WrongType { want: "symbol", got: *other }),
        };
        ctx.context.globals.insert(symbol, *val);
        Ok(*val)
    },
};

/// Every built-in this module provides, for bulk registration by the
/// embedder (`Vm::new` registers all of these).
pub fn all() -> &'static [&'static NativeFunctionDescriptor] {
    static ALL: [&NativeFunctionDescriptor; 11] =
        [&ADD, &SUB, &MUL, &DIV, &NUM_EQ, &EQUAL, &LIST, &CONS, &CAR, &CDR, &INTERNAL_DEFINE];
    &ALL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::exec::call;
    use crate::heap::Heap;

    fn new_vm() -> (Heap, ExecutionContext) {
        let mut heap = Heap::new();
        let mut context = ExecutionContext::new(256, 32);
        for descriptor in all() {
            descriptor.register(&mut heap, &mut context);
        }
        (heap, context)
    }

    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, DetailedError> {
        let (mut heap, mut context) = new_vm();
        let symbol = heap.intern(name);
        let function = *context.globals.get(&symbol).unwrap();
        call(&mut heap, &mut context, function, args)
    }

    #[test]
    fn add_sums_integers() {
        assert_eq!(
            call_builtin("+", &[Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap(),
            Value::Int(6)
        );
    }

    #[test]
    fn divide_by_zero_errors() {
        let err = call_builtin("/", &[Value::Int(10), Value::Int(0)]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DivisionByZero);
    }

    #[test]
    fn integer_overflow_is_distinct_from_division_by_zero() {
        let err = call_builtin("+", &[Value::Int(i64::MAX), Value::Int(1)]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }

    #[test]
    fn add_int_and_string_is_wrong_type_with_offending_value() {
        let (mut heap, mut context) = new_vm();
        let symbol = heap.intern("+");
        let function = *context.globals.get(&symbol).unwrap();
        let s = heap.create_string("hello");
        let err = call(&mut heap, &mut context, function, &[Value::Int(1), s]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::WrongType);
        match err {
            DetailedError::WrongType { got, .. } => assert_eq!(got, s),
            _ => unreachable!(),
        }
    }

    #[test]
    fn numeric_eq_is_strict_about_types() {
        let (mut heap, mut context) = new_vm();
        let symbol = heap.intern("=");
        let function = *context.globals.get(&symbol).unwrap();
        let s = heap.create_string("1");
        let err = call(&mut heap, &mut context, function, &[Value::Int(1), s]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::WrongType);
    }

    #[test]
    fn equal_is_generic_and_structural() {
        let (mut heap, mut context) = new_vm();
        let a = heap.create_string("abc");
        let b = heap.create_string("abc");
        let symbol = heap.intern("equal?");
        let function = *context.globals.get(&symbol).unwrap();
        let result = call(&mut heap, &mut context, function, &[a, b]).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn list_builds_proper_list() {
        let (mut heap, mut context) = new_vm();
        let symbol = heap.intern("list");
        let function = *context.globals.get(&symbol).unwrap();
        let result =
            call(&mut heap, &mut context, function, &[Value::Int(1), Value::Int(2)]).unwrap();
        let items = heap.list_to_vec(result).unwrap();
        assert_eq!(items, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn internal_define_binds_global_and_returns_value() {
        let (mut heap, mut context) = new_vm();
        let symbol = heap.intern("internal-define");
        let function = *context.globals.get(&symbol).unwrap();
        let name = Value::Symbol(heap.intern("x"), true);
        let result = call(&mut heap, &mut context, function, &[name, Value::Int(99)]).unwrap();
        assert_eq!(result, Value::Int(99));
        let x_symbol = heap.intern("x");
        assert_eq!(context.globals.get(&x_symbol), Some(&Value::Int(99)));
    }
}
