//! Target IR for the ferrule lowering engine.
//!
//! A small, statically-typed SSA IR in the shape of LLVM's: typed values,
//! basic blocks ending in one terminator, phi nodes, GC address spaces on
//! pointers, alias-region tags and atomic orderings on memory accesses,
//! and calls into a fixed set of runtime entry points.
//!
//! # Architecture
//!
//! - [`Module`] owns globals and functions; a [`Function`] owns arenas of
//!   values, instructions and blocks addressed by `Copy` ids
//! - [`IrBuilder`] is the only way lowering code creates instructions; it
//!   folds constants and never panics on misuse
//! - [`verify_function`] checks the structural rules a finished function
//!   must satisfy; [`function_to_string`] renders it as text

mod attrs;
mod builder;
mod error;
pub mod ids;
mod inst;
mod module;
mod print;
mod runtime;
mod types;
mod verify;

pub use attrs::{AliasTag, AtomicOrdering, LoadFacts, RetAttrs};
pub use builder::IrBuilder;
pub use error::{VerifyError, VerifyErrorKind};
pub use ids::{BlockId, FuncId, GlobalId, InstId, ValueId};
pub use inst::{
    sign_extend, truncate_bits, BinOp, CastOp, InstKind, IntPredicate, Load, OverflowOp, Store,
};
pub use module::{
    BlockData, ConstValue, Function, Global, GlobalKind, InstData, Module, ValueData, ValueDef,
};
pub use print::function_to_string;
pub use runtime::{RuntimeFn, Signature};
pub use types::{AddressSpace, DataLayout, IrType};
pub use verify::{verify_function, verify_module};
