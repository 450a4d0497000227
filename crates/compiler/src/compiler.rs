//! `Value` tree to bytecode (`spec.md` §4.3).

use lispc_core::InternedSymbol;
use lispc_runtime::{BytecodeFunction, DetailedError, Heap, Instruction, Value};

use crate::scope::LexicalScope;

fn invalid(message: impl Into<String>) -> DetailedError {
    DetailedError::InvalidExpression { message: message.into() }
}

/// The reserved special-form heads, interned once per compiler instance
/// (`spec.md` §4.3: "interned references to reserved symbols").
struct Reserved {
    if_: InternedSymbol,
    function: InternedSymbol,
    def: InternedSymbol,
    let_: InternedSymbol,
    for_: InternedSymbol,
    return_: InternedSymbol,
    and_: InternedSymbol,
    or_: InternedSymbol,
    quote: InternedSymbol,
    /// Not a special form itself; the global `def` lowers to a call of.
    internal_define: InternedSymbol,
}

impl Reserved {
    fn new(heap: &mut Heap) -> Self {
        Reserved {
            if_: heap.intern("if"),
            function: heap.intern("function"),
            def: heap.intern("def"),
            let_: heap.intern("let"),
            for_: heap.intern("for"),
            return_: heap.intern("return"),
            and_: heap.intern("and"),
            or_: heap.intern("or"),
            quote: heap.intern("quote"),
            internal_define: heap.intern("internal-define"),
        }
    }
}

/// Transient per-function compilation state: the instruction buffer being
/// built and the scope tracking its local slots.
struct Frame {
    scope: LexicalScope,
    instructions: Vec<Instruction>,
}

impl Frame {
    fn new() -> Self {
        Frame { scope: LexicalScope::new(), instructions: Vec::new() }
    }

    /// Index the next pushed instruction will occupy.
    fn here(&self) -> usize {
        self.instructions.len()
    }
}

/// Compiles a whole top-level program into one anonymous `BytecodeFunction`
/// with `arg_count = 0`.
pub struct Compiler {
    reserved: Reserved,
}

impl Compiler {
    pub fn new(heap: &mut Heap) -> Self {
        Compiler { reserved: Reserved::new(heap) }
    }

    pub fn compile_program(
        &self,
        heap: &mut Heap,
        exprs: &[Value],
    ) -> Result<BytecodeFunction, DetailedError> {
        let mut frame = Frame::new();
        self.compile_body(heap, &mut frame, exprs)?;
        frame.instructions.push(Instruction::Ret);
        Ok(BytecodeFunction::new(frame.instructions, 0, frame.scope.slot_count(), None))
    }

    /// A sequence of expressions whose value is its last element's
    /// (`nil` if the sequence is empty). Used for function/let/for bodies
    /// and the top-level program.
    fn compile_body(
        &self,
        heap: &mut Heap,
        frame: &mut Frame,
        exprs: &[Value],
    ) -> Result<(), DetailedError> {
        if exprs.is_empty() {
            frame.instructions.push(Instruction::Push(Value::Nil));
            return Ok(());
        }
        for (i, expr) in exprs.iter().enumerate() {
            self.compile_expr(heap, frame, *expr)?;
            if i + 1 < exprs.len() {
                frame.instructions.push(Instruction::Pop(1));
            }
        }
        Ok(())
    }

    fn compile_expr(&self, heap: &mut Heap, frame: &mut Frame, expr: Value) -> Result<(), DetailedError> {
        match expr {
            Value::Symbol(symbol, quoted) => {
                if quoted {
                    frame.instructions.push(Instruction::Push(expr));
                } else if let Some(idx) = frame.scope.resolve(symbol) {
                    frame.instructions.push(Instruction::Get(idx));
                } else {
                    frame.instructions.push(Instruction::Deref(symbol));
                }
            }
            Value::Pair(_) => self.compile_pair(heap, frame, expr)?,
            _ => frame.instructions.push(Instruction::Push(expr)),
        }
        Ok(())
    }

    fn compile_pair(&self, heap: &mut Heap, frame: &mut Frame, expr: Value) -> Result<(), DetailedError> {
        let items = heap.list_to_vec(expr)?;
        if let [Value::Symbol(head, false), rest @ ..] = items.as_slice() {
            let head = *head;
            if head == self.reserved.if_ {
                return self.compile_if(heap, frame, rest);
            }
            if head == self.reserved.function {
                return self.compile_function(heap, frame, rest);
            }
            if head == self.reserved.def {
                return self.compile_def(heap, frame, rest);
            }
            if head == self.reserved.let_ {
                return self.compile_let(heap, frame, rest);
            }
            if head == self.reserved.for_ {
                return self.compile_for(heap, frame, rest);
            }
            if head == self.reserved.return_ {
                return self.compile_return(heap, frame, rest);
            }
            if head == self.reserved.and_ {
                return self.compile_and(heap, frame, rest);
            }
            if head == self.reserved.or_ {
                return self.compile_or(heap, frame, rest);
            }
            if head == self.reserved.quote {
                return self.compile_quote(rest, frame);
            }
        }
        for item in &items {
            self.compile_expr(heap, frame, *item)?;
        }
        frame.instructions.push(Instruction::Eval(items.len() as i32));
        Ok(())
    }

    /// `spec.md` §4.3.1.
    fn compile_if(&self, heap: &mut Heap, frame: &mut Frame, args: &[Value]) -> Result<(), DetailedError> {
        if args.len() < 2 || args.len() > 3 {
            return Err(invalid("if expects (pred true-branch [false-branch])"));
        }
        self.compile_expr(heap, frame, args[0])?;

        let jump_if_idx = frame.here();
        frame.instructions.push(Instruction::JumpIf(0));

        match args.get(2) {
            Some(&false_branch) => self.compile_expr(heap, frame, false_branch)?,
            None => frame.instructions.push(Instruction::Push(Value::Nil)),
        }

        let jump_idx = frame.here();
        frame.instructions.push(Instruction::Jump(0));

        let true_branch_start = frame.here();
        self.compile_expr(heap, frame, args[1])?;
        let end = frame.here();

        frame.instructions[jump_if_idx] = Instruction::JumpIf(offset_to(jump_if_idx, true_branch_start));
        frame.instructions[jump_idx] = Instruction::Jump(offset_to(jump_idx, end));
        Ok(())
    }

    /// `spec.md` §4.3.2.
    fn compile_function(
        &self,
        heap: &mut Heap,
        frame: &mut Frame,
        args: &[Value],
    ) -> Result<(), DetailedError> {
        let [params, body @ ..] = args else {
            return Err(invalid("function expects (params...) body..."));
        };
        let param_list = heap.list_to_vec(*params).map_err(|_| invalid("function parameter list must be proper"))?;
        let mut param_symbols = Vec::with_capacity(param_list.len());
        for p in &param_list {
            match p {
                Value::Symbol(s, false) => param_symbols.push(*s),
                _ => return Err(invalid("function parameters must be unquoted symbols")),
            }
        }

        let mut inner = Frame::new();
        for symbol in &param_symbols {
            inner.scope.bind(*symbol);
        }
        self.compile_body(heap, &mut inner, body)?;
        inner.instructions.push(Instruction::Ret);

        let function = BytecodeFunction::new(
            inner.instructions,
            param_symbols.len() as u32,
            inner.scope.slot_count(),
            None,
        );
        let function_value = heap.create_function(function);
        frame.instructions.push(Instruction::Push(function_value));
        Ok(())
    }

    /// `spec.md` §4.3 `def` row: lowers to `(internal-define 'name val)`.
    ///
    /// The spec's literal instruction order ("compile value, deref
    /// internal-define, swap on stack, emit a two-arg call") presumes a
    /// `swap` opcode this instruction set has no equivalent for; we emit
    /// the callee and both arguments in the same left-to-right order as
    /// any other call form instead, which reaches the identical stack
    /// shape at `eval` time without a swap (see `DESIGN.md`).
    fn compile_def(&self, heap: &mut Heap, frame: &mut Frame, args: &[Value]) -> Result<(), DetailedError> {
        let [name, val] = args else {
            return Err(invalid("def expects (def name val)"));
        };
        let name_symbol = match name {
            Value::Symbol(s, _) => *s,
            _ => return Err(invalid("def name must be a symbol")),
        };
        frame.instructions.push(Instruction::Deref(self.reserved.internal_define));
        frame.instructions.push(Instruction::Push(Value::Symbol(name_symbol, true)));
        self.compile_expr(heap, frame, *val)?;
        frame.instructions.push(Instruction::Eval(3));
        Ok(())
    }

    /// `spec.md` §4.3.3.
    fn compile_let(&self, heap: &mut Heap, frame: &mut Frame, args: &[Value]) -> Result<(), DetailedError> {
        let [bindings_expr, body @ ..] = args else {
            return Err(invalid("let expects (bindings...) body..."));
        };
        let bindings =
            heap.list_to_vec(*bindings_expr).map_err(|_| invalid("let bindings must be a proper list"))?;

        let mut bound = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let pair = heap.list_to_vec(*binding).map_err(|_| invalid("let binding must be (name init)"))?;
            let [name, init] = pair.as_slice() else {
                return Err(invalid("let binding must be exactly (name init)"));
            };
            let name_symbol = match name {
                Value::Symbol(s, _) => *s,
                _ => return Err(invalid("let binding name must be a symbol")),
            };
            self.compile_expr(heap, frame, *init)?;
            let idx = frame.scope.bind(name_symbol);
            frame.instructions.push(Instruction::Set(idx));
            bound.push(idx);
        }

        self.compile_body(heap, frame, body)?;

        for idx in bound {
            frame.scope.unbind(idx);
        }
        Ok(())
    }

    /// `spec.md` §4.3.4.
    fn compile_for(&self, heap: &mut Heap, frame: &mut Frame, args: &[Value]) -> Result<(), DetailedError> {
        let [header, body @ ..] = args else {
            return Err(invalid("for expects (var iterable) body..."));
        };
        let header_items = heap.list_to_vec(*header).map_err(|_| invalid("for header must be (var iterable)"))?;
        let [var, iterable] = header_items.as_slice() else {
            return Err(invalid("for header must be exactly (var iterable)"));
        };
        let var_symbol = match var {
            Value::Symbol(s, _) => *s,
            _ => return Err(invalid("for variable must be a symbol")),
        };

        let idx_item = frame.scope.bind(var_symbol);
        let idx_iter = frame.scope.reserve_anonymous();

        self.compile_expr(heap, frame, *iterable)?;
        frame.instructions.push(Instruction::Set(idx_iter));
        frame.instructions.push(Instruction::Push(Value::Int(-1)));
        frame.instructions.push(Instruction::Set(idx_item));

        let loop_head = frame.here();
        frame.instructions.push(Instruction::IterNext { index: idx_item });

        let jump_if_not_idx = frame.here();
        frame.instructions.push(Instruction::JumpIfNot(0));

        self.compile_body(heap, frame, body)?;
        frame.instructions.push(Instruction::Pop(1));

        let back_jump_idx = frame.here();
        frame.instructions.push(Instruction::Jump(0));
        let end = frame.here();

        frame.instructions[jump_if_not_idx] = Instruction::JumpIfNot(offset_to(jump_if_not_idx, end));
        frame.instructions[back_jump_idx] = Instruction::Jump(offset_to(back_jump_idx, loop_head));

        frame.scope.unbind(idx_item);
        frame.instructions.push(Instruction::Push(Value::Nil));
        Ok(())
    }

    fn compile_return(&self, heap: &mut Heap, frame: &mut Frame, args: &[Value]) -> Result<(), DetailedError> {
        self.compile_body(heap, frame, args)?;
        frame.instructions.push(Instruction::Ret);
        Ok(())
    }

    /// `spec.md` §4.3.5. Short-circuits on the first falsy operand,
    /// keeping it as the overall value; a truthy operand is discarded and
    /// evaluation continues. This is `pop_or_else_jump`'s semantics, not
    /// `jump_or_else_pop`'s — see `DESIGN.md` for why this document
    /// departs from the prose pairing in the distilled spec.
    fn compile_and(&self, heap: &mut Heap, frame: &mut Frame, args: &[Value]) -> Result<(), DetailedError> {
        if args.is_empty() {
            frame.instructions.push(Instruction::Push(Value::Bool(true)));
            return Ok(());
        }
        let mut patches = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            self.compile_expr(heap, frame, *arg)?;
            if i + 1 < args.len() {
                patches.push(frame.here());
                frame.instructions.push(Instruction::PopOrElseJump(0));
            }
        }
        let end = frame.here();
        for idx in patches {
            frame.instructions[idx] = Instruction::PopOrElseJump(offset_to(idx, end));
        }
        Ok(())
    }

    /// `spec.md` §4.3.5. Short-circuits on the first truthy operand.
    fn compile_or(&self, heap: &mut Heap, frame: &mut Frame, args: &[Value]) -> Result<(), DetailedError> {
        if args.is_empty() {
            frame.instructions.push(Instruction::Push(Value::Nil));
            return Ok(());
        }
        let mut patches = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            self.compile_expr(heap, frame, *arg)?;
            if i + 1 < args.len() {
                patches.push(frame.here());
                frame.instructions.push(Instruction::JumpOrElsePop(0));
            }
        }
        let end = frame.here();
        for idx in patches {
            frame.instructions[idx] = Instruction::JumpOrElsePop(offset_to(idx, end));
        }
        Ok(())
    }

    /// `(quote x)`: push `x` as a literal, unevaluated. Supplements
    /// `spec.md`'s `'symbol` shorthand (which only covers bare
    /// identifiers) with the general form needed to quote a list literal.
    fn compile_quote(&self, args: &[Value], frame: &mut Frame) -> Result<(), DetailedError> {
        let [value] = args else {
            return Err(invalid("quote expects exactly one argument"));
        };
        frame.instructions.push(Instruction::Push(*value));
        Ok(())
    }
}

/// A jump's payload is relative to the instruction index immediately
/// following it (`spec.md` §6).
fn offset_to(jump_idx: usize, target: usize) -> i32 {
    (target as i64 - (jump_idx as i64 + 1)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use lispc_runtime::{exec, ExecutionContext};

    /// Compile and run `source` in a fresh heap/context, returning both so
    /// a test can inspect heap-resident results (strings, pairs).
    fn run_in_heap(source: &str) -> (Heap, Result<Value, DetailedError>) {
        let mut heap = Heap::new();
        let mut context = ExecutionContext::new(1024, 64);
        for descriptor in lispc_runtime::builtins::all() {
            descriptor.register(&mut heap, &mut context);
        }
        let compiler = Compiler::new(&mut heap);
        let result = (|| {
            let exprs = {
                let mut reader = crate::reader::Reader::new(&mut heap, source)?;
                let mut exprs = Vec::new();
                while let Some(expr) = reader.next()? {
                    exprs.push(expr);
                }
                exprs
            };
            let function = compiler.compile_program(&mut heap, &exprs)?;
            let function_value = heap.create_function(function);
            exec::call(&mut heap, &mut context, function_value, &[])
        })();
        (heap, result)
    }

    fn run(source: &str) -> Result<Value, DetailedError> {
        run_in_heap(source).1
    }

    #[test]
    fn arithmetic_sums() {
        assert_eq!(run("(+ 1 2 3)").unwrap(), Value::Int(6));
    }

    #[test]
    fn def_then_reference() {
        assert_eq!(run("(def x 12) (+ x x)").unwrap(), Value::Int(24));
    }

    #[test]
    fn function_call_with_params() {
        assert_eq!(run("((function (a b) (+ a b)) 1 2)").unwrap(), Value::Int(3));
    }

    #[test]
    fn if_picks_true_branch() {
        let (heap, result) = run_in_heap(r#"(if (= 1 1) "yes" "no")"#);
        match result.unwrap() {
            Value::String(h) => assert_eq!(heap.get_string(h).unwrap().as_str(), "yes"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn if_picks_false_branch() {
        let (heap, result) = run_in_heap(r#"(if (= 1 2) "yes" "no")"#);
        match result.unwrap() {
            Value::String(h) => assert_eq!(heap.get_string(h).unwrap().as_str(), "no"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn if_without_false_branch_defaults_to_nil() {
        assert_eq!(run("(if false 1)").unwrap(), Value::Nil);
    }

    #[test]
    fn division_by_zero_propagates() {
        let err = run("(/ 10 0)").unwrap_err();
        assert_eq!(err.kind(), lispc_runtime::ErrorKind::DivisionByZero);
    }

    #[test]
    fn wrong_type_carries_offending_value() {
        let err = run(r#"(+ 1 "hello")"#).unwrap_err();
        assert_eq!(err.kind(), lispc_runtime::ErrorKind::WrongType);
    }

    #[test]
    fn for_loop_accumulates_squares() {
        let source = "(def squared-sum 0) (for (x (list 1 2 3 4)) (let ((s (* x x))) (def squared-sum (+ s squared-sum)))) squared-sum";
        assert_eq!(run(source).unwrap(), Value::Int(30));
    }

    #[test]
    fn and_short_circuits_on_falsy_and_keeps_it() {
        assert_eq!(run("(and 1 false 2)").unwrap(), Value::Bool(false));
        assert_eq!(run("(and 1 2 3)").unwrap(), Value::Int(3));
        assert_eq!(run("(and)").unwrap(), Value::Bool(true));
    }

    #[test]
    fn or_short_circuits_on_truthy_and_keeps_it() {
        assert_eq!(run("(or false 2 3)").unwrap(), Value::Int(2));
        assert_eq!(run("(or false false)").unwrap(), Value::Bool(false));
        assert_eq!(run("(or)").unwrap(), Value::Nil);
    }

    #[test]
    fn argument_order_is_left_to_right() {
        // `record` conses its argument onto `log`, so `log` ends up in
        // reverse call order; if `record` observed 1, 2, 3 in that order,
        // `log` is `(3 2 1)`.
        let source = "(def log nil) \
                      (def record (function (n) (def log (cons n log)) n)) \
                      ((function (a b c) (+ a b c)) (record 1) (record 2) (record 3)) \
                      log";
        let (heap, result) = run_in_heap(source);
        let log = result.unwrap();
        let items = heap.list_to_vec(log).unwrap();
        assert_eq!(items, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }
}
