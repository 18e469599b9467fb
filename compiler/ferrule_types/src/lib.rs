//! Dynamic type lattice for the ferrule lowering engine.
//!
//! This crate is the type-descriptor side of code generation: it owns
//! every dynamic type, computes concrete memory layouts, answers lattice
//! queries (subtyping, intersection, union enumeration) and fixes the
//! runtime object ABI that both the lowering engine and the runtime agree
//! on.
//!
//! # Type Handles
//!
//! - `TypeId`: 32-bit handle into a [`TypePool`]; equality is type equality
//! - Built-ins live at fixed ids (`TypeId::BOOL`, `TypeId::INT64`, ...)
//! - Structural types are interned, so constructing one twice is free

pub mod abi;
mod constant;
mod error;
mod flags;
mod idx;
mod kind;
mod lattice;
mod layout;
mod pool;

pub use constant::Constant;
pub use error::TypeDefError;
pub use flags::LayoutFlags;
pub use idx::{TypeId, TypeNameId};
pub use kind::{
    AbstractType, DataKind, DataType, FamilyType, Field, MemoryLayout, PrimitiveClass, TypeKind,
    TypeName,
};
pub use layout::{FieldLayout, FieldStorage, Layout, LayoutBuilder, MAX_ALIGN, MAX_LAYOUT_SIZE};
pub use pool::{FamilyDef, FieldTemplate, FieldType, StructDef, TypePool};
