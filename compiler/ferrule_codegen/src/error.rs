//! Lowering failures.
//!
//! A [`LowerError`] means the lowering request itself is malformed: the
//! front end asked for a field that does not exist, handed over a value in
//! a representation the operation cannot accept, or the builder rejected
//! an instruction. Errors of the *compiled program* (bounds, undefined
//! references, type mismatches) are never `LowerError`s; they become calls
//! to the runtime's error entry points in the emitted code.

use ferrule_ir::ValueId;
use ferrule_types::{TypeDefError, TypeId};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LowerError {
    #[error("type {ty:?} has no field {index}")]
    NoSuchField { ty: TypeId, index: usize },

    #[error("type {ty:?} has no concrete layout")]
    NotConcrete { ty: TypeId },

    #[error("{op} cannot accept a value of type {ty:?} in this representation")]
    Representation { op: &'static str, ty: TypeId },

    #[error("{op} expected {expected} arguments, got {got}")]
    Arity {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("pointer size {options} of the options disagrees with {other} of the {what}")]
    PointerSize {
        options: u32,
        other: u32,
        what: &'static str,
    },

    #[error("the builder rejected an instruction while lowering {op}")]
    Builder { op: &'static str },

    #[error("value {value:?} is not defined by an instruction")]
    NotAnInstruction { value: ValueId },

    #[error(transparent)]
    TypeDef(#[from] TypeDefError),
}
