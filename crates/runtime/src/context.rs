//! Call frames and the per-VM execution state.
//!
//! `spec.md` §3 describes `CallFrame.instructions` as a borrowed slice into
//! the callee's instruction array. Because every bytecode function here
//! lives in a growable [`lispc_core::Pool`] rather than a fixed arena, a
//! frame instead stores the callee's [`Handle`] and re-resolves the
//! instruction slice through the heap on every fetch; this keeps the same
//! semantics (`stack_start` is still the first index of the frame's local
//! stack, the slot below it still holds the callee) without holding a
//! borrow across the heap mutations that `eval`/GC need to perform.

use lispc_core::Handle;

use crate::error::{DetailedError, ErrorKind};
use crate::instruction::BytecodeFunction;
use crate::value::Value;
use lispc_core::InternedSymbol;
use std::collections::HashMap;

/// Bookkeeping for one in-flight function call.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    /// `None` for a native-function call, which has no instruction stream
    /// of its own.
    pub function: Option<Handle<BytecodeFunction>>,
    pub instruction_index: usize,
    /// First index of this frame's local stack inside the data stack; the
    /// slot at `stack_start - 1` holds the callee value itself.
    pub stack_start: usize,
}

impl CallFrame {
    pub fn top_level(stack_start: usize) -> Self {
        CallFrame { function: None, instruction_index: 0, stack_start }
    }

    pub fn for_function(function: Handle<BytecodeFunction>, stack_start: usize) -> Self {
        CallFrame { function: Some(function), instruction_index: 0, stack_start }
    }
}

/// The VM's mutable execution state: the data stack, the call-frame stack,
/// the global symbol table, and the single "last error" slot that stands
/// in for exception unwinding (`spec.md` §1 Non-goals).
pub struct ExecutionContext {
    pub data_stack: Vec<Value>,
    pub data_stack_capacity: usize,
    pub frames: Vec<CallFrame>,
    pub frame_capacity: usize,
    pub globals: HashMap<InternedSymbol, Value>,
    pub last_error: Option<DetailedError>,
}

impl ExecutionContext {
    pub fn new(data_stack_capacity: usize, frame_capacity: usize) -> Self {
        ExecutionContext {
            data_stack: Vec::with_capacity(data_stack_capacity.min(256)),
            data_stack_capacity,
            frames: Vec::with_capacity(frame_capacity.min(64)),
            frame_capacity,
            globals: HashMap::new(),
            last_error: None,
        }
    }

    pub fn push_data(&mut self, value: Value) -> Result<(), DetailedError> {
        if self.data_stack.len() >= self.data_stack_capacity {
            return Err(DetailedError::StackOverflow);
        }
        self.data_stack.push(value);
        Ok(())
    }

    pub fn pop_data(&mut self) -> Result<Value, DetailedError> {
        self.data_stack.pop().ok_or(DetailedError::StackUnderflow)
    }

    pub fn peek_data(&self) -> Result<Value, DetailedError> {
        self.data_stack.last().copied().ok_or(DetailedError::StackUnderflow)
    }

    pub fn push_frame(&mut self, frame: CallFrame) -> Result<(), DetailedError> {
        if self.frames.len() >= self.frame_capacity {
            return Err(DetailedError::StackOverflow);
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn current_frame(&self) -> Result<&CallFrame, DetailedError> {
        self.frames.last().ok_or(DetailedError::Internal {
            message: "no active call frame".to_string(),
        })
    }

    pub fn current_frame_mut(&mut self) -> Result<&mut CallFrame, DetailedError> {
        self.frames.last_mut().ok_or(DetailedError::Internal {
            message: "no active call frame".to_string(),
        })
    }

    /// The portion of the data stack belonging to the current frame's
    /// locals (`spec.md` glossary: "Local stack").
    pub fn local_stack(&self) -> Result<&[Value], DetailedError> {
        let frame = self.current_frame()?;
        Ok(&self.data_stack[frame.stack_start..])
    }

    pub fn local_get(&self, idx: i32) -> Result<Value, DetailedError> {
        let frame = self.current_frame()?;
        let index = frame.stack_start.checked_add(idx as usize).ok_or(DetailedError::Internal {
            message: "local index overflow".to_string(),
        })?;
        self.data_stack.get(index).copied().ok_or(DetailedError::StackUnderflow)
    }

    pub fn local_set(&mut self, idx: i32, value: Value) -> Result<(), DetailedError> {
        let frame = *self.current_frame()?;
        let index = frame.stack_start.checked_add(idx as usize).ok_or(DetailedError::Internal {
            message: "local index overflow".to_string(),
        })?;
        let slot = self.data_stack.get_mut(index).ok_or(DetailedError::StackUnderflow)?;
        *slot = value;
        Ok(())
    }

    /// Truncate the call-frame and data stacks back to a previously
    /// recorded depth. Used both by `ret` and by the embedder-facing
    /// `reset_calls` (`spec.md` §7 propagation policy).
    pub fn truncate_to(&mut self, frame_depth: usize, data_depth: usize) {
        self.frames.truncate(frame_depth);
        self.data_stack.truncate(data_depth);
    }

    pub fn set_last_error(&mut self, error: DetailedError) {
        self.last_error = Some(error);
    }

    pub fn last_error_kind(&self) -> Option<ErrorKind> {
        self.last_error.as_ref().map(|e| e.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_beyond_capacity_overflows() {
        let mut ctx = ExecutionContext::new(2, 8);
        ctx.push_data(Value::Int(1)).unwrap();
        ctx.push_data(Value::Int(2)).unwrap();
        let err = ctx.push_data(Value::Int(3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackOverflow);
    }

    #[test]
    fn pop_empty_underflows() {
        let mut ctx = ExecutionContext::new(8, 8);
        let err = ctx.pop_data().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackUnderflow);
    }
}
