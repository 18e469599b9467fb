//! Errors raised while defining types.

use thiserror::Error;

use crate::TypeId;

/// A type definition that cannot be admitted into the pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeDefError {
    #[error("primitive type `{name}` has unsupported width {bits} (must be a power-of-two number of bytes)")]
    UnsupportedWidth { name: String, bits: u32 },

    #[error("type `{name}` declares field `{field}` twice")]
    DuplicateField { name: String, field: String },

    #[error("type `{name}` cannot declare {n_uninitialized} uninitialized fields with only {nfields} fields")]
    TooManyUninitialized {
        name: String,
        n_uninitialized: u32,
        nfields: u32,
    },

    #[error("supertype of `{name}` must be abstract, got {supertype:?}")]
    ConcreteSupertype { name: String, supertype: TypeId },

    #[error("parameters of `{family}` must be concrete, got {param:?}")]
    NonConcreteParameter { family: String, param: TypeId },

    #[error("`{name}` has an inline layout larger than {max} bytes")]
    LayoutTooLarge { name: String, max: u64 },

    #[error("{ty:?} is not a parametric family")]
    NotAFamily { ty: TypeId },

    #[error("`{family}` takes {expected} parameters, got {got}")]
    ParameterCount {
        family: String,
        expected: u32,
        got: u32,
    },

    #[error("immutable type `{name}` cannot declare atomic field `{field}`")]
    AtomicFieldOnImmutable { name: String, field: String },
}
