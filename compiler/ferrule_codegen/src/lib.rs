//! Type-directed lowering of dynamically-typed values to ferrule IR.
//!
//! Given the static type the front end inferred for each value, this crate
//! picks a representation ([`CgValue`]) and emits the IR for the primitive
//! operations over it: boxing and unboxing, `isa` and type checks, field
//! reads and writes (plain and atomic), struct and memory construction,
//! identity comparison, and the runtime checks and GC bookkeeping they
//! need (null, bounds and type errors; allocation, roots and write
//! barriers).
//!
//! # Architecture
//!
//! - [`CodegenCx`]: per-function context; every operation is a method on it
//! - [`CgValue`] / [`Repr`]: a value's dynamic type plus its IR form
//! - [`CodegenOptions`]: per-unit knobs (bounds checks, atomic and pool
//!   limits, debug descriptors)
//! - [`InternTables`]: global names shared by concurrent compilations
//!
//! # Debugging
//!
//! - `RUST_LOG=ferrule_codegen=debug`: decisions per operation
//! - `RUST_LOG=ferrule_codegen=trace`: every lowering step (very verbose)
//!
//! # Example
//!
//! ```ignore
//! let mut pool = TypePool::new();
//! let intern = InternTables::new();
//! let mut module = Module::new("m", DataLayout::default());
//! let f = module.add_function("f", vec![IrType::TRACKED], IrType::I64);
//! let mut cx = CodegenCx::new(&mut module, f, &mut pool, &intern, CodegenOptions::default())?;
//! let entry = cx.builder().append_block("entry");
//! cx.builder().position_at_end(entry);
//! let x = cx.param_value(0, TypeId::ANY);
//! let n = cx.typeassert(&x, TypeId::INT64)?;
//! let bits = cx.unbox(&n, TypeId::INT64)?;
//! cx.builder().ret(bits);
//! cx.finish()?;
//! ```

mod alloc;
mod boxing;
mod cgval;
mod construct;
mod context;
mod debug_info;
mod egal;
mod error;
mod field;
mod guard;
mod intern;
mod isa;
mod memory;
mod options;
mod setfield;
mod tags;
mod type_map;

#[cfg(test)]
mod tests_util;

use std::sync::Once;

pub use cgval::{CgValue, Promotion, Repr, Slot, Split, UnionVal};
pub use context::CodegenCx;
pub use debug_info::{DebugMember, DebugType, DebugTypeId, DebugTypes};
pub use error::LowerError;
pub use guard::BoundsTarget;
pub use intern::InternTables;
pub use memory::MemoryRef;
pub use options::{BoundsCheck, CodegenOptions};
pub use setfield::{FieldOp, ModifyFn};
pub use type_map::{primitive_ir_type, FieldMembers, StructRepr, TypeRepr};

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing when `RUST_LOG` is unset; safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}
