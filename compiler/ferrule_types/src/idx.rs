//! Type handles.
//!
//! `TypeId` is the only way the rest of the compiler refers to a type.
//! All types live in a [`TypePool`](crate::TypePool) and are compared by
//! index equality.
//!
//! # Design
//!
//! - 32-bit indices, `Copy`, hashable
//! - Built-in types are bootstrapped at fixed indices (0..[`TypeId::FIRST_DYNAMIC`])
//!   so lowering code can test `t == TypeId::BOOL` without a pool lookup
//! - Type names (`TypeNameId`) are a separate index space: several
//!   instances of one parametric family share a name

use std::fmt;

/// A 32-bit index into the type pool.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    // === Lattice endpoints and kinds (0-6) ===

    /// `Union{}`: the empty type, no values.
    pub const BOTTOM: Self = Self(0);
    /// `Any`: the top of the lattice.
    pub const ANY: Self = Self(1);
    /// `Type`: abstract supertype of every type value.
    pub const TYPE: Self = Self(2);
    /// `DataType`: the kind of nominal types.
    pub const DATATYPE: Self = Self(3);
    /// `Union`: the kind of union types.
    pub const UNION_KIND: Self = Self(4);
    /// `UnionAll`: the kind of parametric families.
    pub const UNIONALL: Self = Self(5);
    /// `TypeofBottom`: the kind of `Union{}`.
    pub const TYPEOFBOTTOM: Self = Self(6);

    // === Abstract numeric hierarchy (7-12) ===

    pub const NUMBER: Self = Self(7);
    pub const REAL: Self = Self(8);
    pub const INTEGER: Self = Self(9);
    pub const SIGNED: Self = Self(10);
    pub const UNSIGNED: Self = Self(11);
    pub const ABSTRACT_FLOAT: Self = Self(12);

    // === Primitive bits types (13-28) ===

    pub const BOOL: Self = Self(13);
    pub const INT8: Self = Self(14);
    pub const UINT8: Self = Self(15);
    pub const INT16: Self = Self(16);
    pub const UINT16: Self = Self(17);
    pub const INT32: Self = Self(18);
    pub const UINT32: Self = Self(19);
    pub const INT64: Self = Self(20);
    pub const UINT64: Self = Self(21);
    pub const INT128: Self = Self(22);
    pub const FLOAT16: Self = Self(23);
    pub const BFLOAT16: Self = Self(24);
    pub const FLOAT32: Self = Self(25);
    pub const FLOAT64: Self = Self(26);
    pub const CHAR: Self = Self(27);
    /// Raw untracked address (`Ptr{Cvoid}`), address space 0.
    pub const PTR: Self = Self(28);

    // === Opaque and singleton built-ins (29-33) ===

    pub const SYMBOL: Self = Self(29);
    pub const STRING: Self = Self(30);
    pub const NOTHING: Self = Self(31);
    /// `Tuple{}`.
    pub const EMPTY_TUPLE: Self = Self(32);
    /// The `Memory` family (all `Memory{T}` instances).
    pub const MEMORY: Self = Self(33);

    /// First index for types created after bootstrap.
    pub const FIRST_DYNAMIC: u32 = 34;

    /// Sentinel for "no type".
    pub const NONE: Self = Self(u32::MAX);

    /// Create an index from a raw value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The index as a `usize` for arena access.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// True if this is a bootstrapped built-in type.
    #[inline]
    pub const fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_DYNAMIC
    }

    /// True if this is the `NONE` sentinel.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "TypeId::NONE")
        } else {
            write!(f, "TypeId({})", self.0)
        }
    }
}

/// Identity of a type name (shared by all instances of a parametric family).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct TypeNameId(u32);

impl TypeNameId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}
