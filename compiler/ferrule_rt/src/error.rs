//! Errors raised while executing lowered code.
//!
//! A [`Trap`] is an error of the executed program: one of the runtime
//! error entry points was called. An [`InterpError`] means the IR itself
//! is broken (a wild address, a use before definition, a malformed
//! operand) or an execution limit was hit.

use ferrule_ir::{BlockId, ValueId};
use thiserror::Error;

/// A program-level error raised through a runtime error entry point.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Trap {
    #[error("{0}")]
    Error(String),

    #[error("TypeError: in {context}, expected {expected}, got a value of type {got}")]
    TypeError {
        context: String,
        expected: String,
        got: String,
    },

    #[error("UndefVarError: `{name}` not defined in `{scope}`")]
    UndefVar { name: String, scope: String },

    #[error("UndefRefError: access to undefined reference")]
    UndefRef,

    /// `index` is 1-based, as the program sees it.
    #[error("BoundsError: attempt to access {container} at index [{index}]")]
    Bounds { container: String, index: i64 },

    #[error("ArgumentError: {0}")]
    Argument(String),

    #[error("ConcurrencyViolationError: {0}")]
    Atomic(String),
}

/// Failure to execute a function.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InterpError {
    #[error(transparent)]
    Trap(#[from] Trap),

    #[error("address {addr:#x} (+{len} bytes) is outside the heap")]
    BadAddress { addr: u64, len: u64 },

    #[error("{addr:#x} is not the start of a heap object")]
    NotAnObject { addr: u64 },

    #[error("{addr:#x} is not a type object")]
    NotAType { addr: u64 },

    #[error("header tag {tag:#x} names no type")]
    BadTag { tag: u64 },

    #[error("heap limit of {limit} bytes exceeded")]
    OutOfMemory { limit: usize },

    #[error("{value:?} used before its definition")]
    UseBeforeDef { value: ValueId },

    #[error("phi in {block:?} has no incoming value for {pred:?}")]
    MissingPhiEdge { block: BlockId, pred: BlockId },

    #[error("control reached `unreachable` in `{func}`")]
    Unreachable { func: String },

    #[error("`{func}` expects {expected} arguments, got {got}")]
    Arity {
        func: String,
        expected: usize,
        got: usize,
    },

    #[error("no function named `{0}`")]
    UnknownFunction(String),

    #[error("malformed operand: {0}")]
    Malformed(String),

    #[error("undefined behavior: {0}")]
    Undefined(String),

    #[error("noreturn entry point `{0}` returned")]
    ReturnedFromNoreturn(&'static str),

    #[error("unlock of {addr:#x}, which is not locked")]
    NotLocked { addr: u64 },

    #[error("step limit of {0} exceeded")]
    StepLimit(u64),
}

impl InterpError {
    /// The program-level error, if this is one.
    pub fn as_trap(&self) -> Option<&Trap> {
        match self {
            Self::Trap(t) => Some(t),
            _ => None,
        }
    }
}
