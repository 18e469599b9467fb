//! Ferrule Reference Runtime
//!
//! A simulated runtime that executes IR produced by `ferrule_codegen`, so
//! lowered code can be checked end to end without a native backend.
//!
//! # Architecture
//!
//! - [`Heap`]: one flat byte-addressed region; objects carry a header
//!   word holding their type tag
//! - [`Runtime`]: permanent objects (type objects, singletons, symbols,
//!   box caches), boxed-value operations and the runtime entry points
//! - [`Interpreter`]: walks a function's blocks, evaluating instructions
//!   against the runtime
//!
//! # Function Categories
//!
//! - **Allocation**: `alloc_obj`, `alloc_genericmemory_unchecked`
//! - **GC**: `write_barrier` (recorded, inspectable through
//!   [`Runtime::barriers`])
//! - **Errors**: every error entry point surfaces as a [`Trap`]
//! - **Introspection**: `typeof`, `isa`, `subtype`, `egal`,
//!   `typeassert`, `get_nth_field_checked`
//! - **Boxing**: one constructor per primitive width
//! - **Locks**: recursive per-object locks

mod error;
mod heap;
mod interp;
mod runtime;
mod value;

pub use error::{InterpError, Trap};
pub use heap::{Heap, DEFAULT_HEAP_LIMIT, HEAP_BASE};
pub use interp::{Interpreter, InterpreterBuilder, DEFAULT_STEP_LIMIT};
pub use runtime::{BarrierRecord, Runtime};
pub use value::RtValue;
