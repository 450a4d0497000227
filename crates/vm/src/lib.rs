//! The embedder-facing driver: owns a heap and execution context, and wires
//! the reader and compiler to the runtime's fetch-execute loop.
//!
//! This crate sits above both `lispc-runtime` and `lispc-compiler`: it is
//! the only layer that needs to depend on both, since evaluating a whole
//! program means reading it, compiling it, and then running the result.

use lispc_compiler::{Compiler, Reader};
use lispc_runtime::{
    exec, garbage_collect, BytecodeFunction, DetailedError, Error, ExecutionContext, Heap,
    Inspector, Value,
};
use tracing::info;

const DEFAULT_DATA_STACK_CAPACITY: usize = 1024;
const DEFAULT_FRAME_CAPACITY: usize = 64;

/// A single embeddable interpreter instance: one heap, one global table,
/// one `last_error` slot (`spec.md` §3's `ExecutionContext`).
pub struct Vm {
    heap: Heap,
    context: ExecutionContext,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// A fresh `Vm` with every built-in from `lispc_runtime::builtins::all`
    /// already registered as a global.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DATA_STACK_CAPACITY, DEFAULT_FRAME_CAPACITY)
    }

    pub fn with_capacity(data_stack_capacity: usize, frame_capacity: usize) -> Self {
        let mut heap = Heap::new();
        let mut context = ExecutionContext::new(data_stack_capacity, frame_capacity);
        for descriptor in lispc_runtime::builtins::all() {
            descriptor.register(&mut heap, &mut context);
        }
        Vm { heap, context }
    }

    /// Read every top-level expression in `source`, compile them into one
    /// anonymous function, and run it (`spec.md` §6, "evaluate a whole
    /// program"). A failure while reading never touches `globals`: the
    /// reader validates paren balance up front and only the compiler ever
    /// runs `internal-define`, so a parse error here is atomic by
    /// construction.
    pub fn eval_string(&mut self, source: &str) -> Result<Value, Error> {
        let exprs = self.read_all(source).map_err(|err| match err.kind() {
            lispc_runtime::ErrorKind::ParseError => Error::Parse(err.to_string()),
            _ => Error::Runtime(err),
        })?;

        let compiler = Compiler::new(&mut self.heap);
        let function = compiler.compile_program(&mut self.heap, &exprs)?;
        let function_value = self.heap.create_function(function);

        match exec::call(&mut self.heap, &mut self.context, function_value, &[]) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.context.set_last_error(err.clone());
                // The failing call's frames are left in place so
                // `error_report`/`stack_trace` can still name them; the
                // embedder must call `reset_calls` before the next
                // `eval_string` (`spec.md` §7's propagation policy).
                Err(Error::Runtime(err))
            }
        }
    }

    fn read_all(&mut self, source: &str) -> Result<Vec<Value>, DetailedError> {
        let mut reader = Reader::new(&mut self.heap, source)?;
        let mut exprs = Vec::new();
        while let Some(expr) = reader.next()? {
            exprs.push(expr);
        }
        Ok(exprs)
    }

    /// Truncate the call-frame and data stacks back to empty. The embedder
    /// must call this after an `eval_string` error before evaluating again
    /// in the same `Vm` if it wants a clean slate (`globals` and
    /// `last_error` survive; see `spec.md` §7's propagation policy).
    pub fn reset_calls(&mut self) {
        self.context.truncate_to(0, 0);
    }

    /// Run one mark-and-sweep cycle over this `Vm`'s heap.
    pub fn garbage_collect(&mut self) {
        garbage_collect(&mut self.heap, &self.context);
    }

    /// The error recorded by the most recent failing `eval_string`, if any.
    pub fn last_error(&self) -> Option<&DetailedError> {
        self.context.last_error.as_ref()
    }

    /// Render `value` the way a REPL would echo a result.
    pub fn pretty(&self, value: Value) -> String {
        Inspector::new(&self.heap).pretty(value)
    }

    /// A stack trace followed by the last recorded error, for diagnostics.
    pub fn error_report(&self) -> String {
        Inspector::new(&self.heap).error_report(&self.context)
    }

    /// The disassembled instruction stream of a compiled function.
    pub fn disassemble(&self, function: &BytecodeFunction) -> String {
        Inspector::new(&self.heap).disassemble(function)
    }

    /// The names of every registered native function, for introspection
    /// (the CLI's `builtins` subcommand, and tests that want to assert the
    /// ABI surface without hardcoding it twice).
    pub fn builtin_names(&self) -> Vec<&'static str> {
        lispc_runtime::builtins::all().iter().map(|d| d.name).collect()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }
}

/// Logged at crate init time by embedders that want confirmation tracing
/// is wired; `lispc-cli` calls this once after setting up its subscriber.
pub fn log_startup(version: &str) {
    info!(version, "lispc vm ready");
}
