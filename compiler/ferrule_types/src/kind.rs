//! Type descriptors stored in the pool.

use crate::{Layout, TypeId, TypeNameId};

/// A node of the dynamic type lattice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeKind {
    /// `Union{}`.
    Bottom,
    /// `Any`.
    Any,
    /// A nominal abstract type.
    Abstract(AbstractType),
    /// A nominal data type: primitive, struct, opaque or memory.
    DataType(DataType),
    /// Every instance of a parametric name (`Point` as opposed to
    /// `Point{Int64}`). Neither abstract nor concrete.
    Family(FamilyType),
    /// A flattened union of at least two members, ordered by `TypeId`.
    Union(Box<[TypeId]>),
    /// `Type{T}`: the type whose only instance is the type value `T`.
    TypeOf(TypeId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbstractType {
    pub name: TypeNameId,
    pub supertype: TypeId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FamilyType {
    pub name: TypeNameId,
    pub supertype: TypeId,
}

/// Name record shared by a family and all of its instances.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeName {
    pub name: String,
    pub is_abstract: bool,
    /// The family type for parametric names.
    pub family: Option<TypeId>,
}

/// How a primitive bits type is interpreted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveClass {
    Bool,
    Int { signed: bool },
    Float,
    BFloat,
    Char,
    /// Raw untracked address in the given address space.
    Pointer { addrspace: u32 },
    /// Uninterpreted bits.
    Bits,
}

/// Element layout of a `Memory{T}` buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemoryLayout {
    pub elem: TypeId,
    /// Bytes per element (pointer size when boxed).
    pub elsize: u32,
    pub elalign: u32,
    /// Elements are tracked pointers.
    pub isboxed: bool,
    /// Elements are an inline bits-union; one selector byte per element
    /// follows the data.
    pub isunion: bool,
    /// New buffers must be zero-filled (pointers or unions inside).
    pub zeroinit: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataKind {
    Primitive { class: PrimitiveClass, bits: u32 },
    Struct { tuple: bool, vec_element: bool },
    /// No field layout (symbols, strings, kinds).
    Opaque,
    Memory(MemoryLayout),
}

/// A declared field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
    pub atomic: bool,
    pub constant: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
            atomic: false,
            constant: false,
        }
    }

    #[must_use]
    pub fn atomic(mut self) -> Self {
        self.atomic = true;
        self
    }

    #[must_use]
    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataType {
    pub name: TypeNameId,
    pub params: Box<[TypeId]>,
    pub supertype: TypeId,
    pub kind: DataKind,
    pub fields: Box<[Field]>,
    pub mutable: bool,
    /// Number of trailing fields that may be left undefined by a constructor.
    pub n_uninitialized: u32,
    /// `None` for opaque types.
    pub layout: Option<Layout>,
    pub smalltag: Option<u32>,
    /// All parameters are concrete (or there are none).
    pub concrete: bool,
}

impl DataType {
    pub fn nfields(&self) -> usize {
        self.fields.len()
    }

    /// Immutable with a fixed layout: eligible for an unboxed representation.
    pub fn is_concrete_immutable(&self) -> bool {
        self.concrete && !self.mutable && self.layout.is_some()
    }

    /// Has a singleton instance: immutable, laid out, and zero-sized.
    pub fn is_singleton(&self) -> bool {
        self.is_concrete_immutable() && self.layout.as_ref().is_some_and(|l| l.size == 0)
    }

    pub fn size(&self) -> u32 {
        self.layout.as_ref().map_or(0, |l| l.size)
    }

    pub fn alignment(&self) -> u32 {
        self.layout.as_ref().map_or(1, |l| l.alignment)
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self.kind, DataKind::Struct { tuple: true, .. })
    }

    pub fn is_vec_element(&self) -> bool {
        matches!(self.kind, DataKind::Struct { vec_element: true, .. })
    }

    pub fn memory_layout(&self) -> Option<&MemoryLayout> {
        match &self.kind {
            DataKind::Memory(m) => Some(m),
            _ => None,
        }
    }

    pub fn primitive(&self) -> Option<(PrimitiveClass, u32)> {
        match self.kind {
            DataKind::Primitive { class, bits } => Some((class, bits)),
            _ => None,
        }
    }

    pub fn has_atomic_fields(&self) -> bool {
        self.fields.iter().any(|f| f.atomic)
    }

    /// Field is stored as a tracked pointer.
    pub fn field_isptr(&self, idx: usize) -> bool {
        self.layout
            .as_ref()
            .and_then(|l| l.fields.get(idx))
            .is_some_and(|f| f.isptr)
    }
}
