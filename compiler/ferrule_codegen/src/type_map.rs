//! Dynamic type to IR type mapping.
//!
//! Every dynamic type is represented one of three ways:
//!
//! | Type                                           | [`TypeRepr`]          |
//! |------------------------------------------------|-----------------------|
//! | `Union{}`, zero-size singletons                | `Ghost`               |
//! | concrete immutable with a layout               | `Unboxed(IrType)`     |
//! | everything else (mutable, abstract, unions)    | `Boxed` (tracked ptr) |
//!
//! Unboxed structs become IR structs whose members mirror the fields, so
//! member offsets computed by the data layout equal the field offsets of
//! the dynamic layout. Inline union fields are flattened into the parent:
//! a run of alignment-sized integers covering the largest member, then
//! the selector byte. Homogeneous pointer-free tuples become arrays, or
//! vectors when built from `VecElement`s.
//!
//! Results are memoized per context: layouts depend on the target pointer
//! width, so they are never shared across compilation units.

use ferrule_ir::{AddressSpace, DataLayout, IrType};
use ferrule_types::{DataKind, FieldStorage, LayoutFlags, PrimitiveClass, TypeId, TypeKind};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::context::CodegenCx;

/// How values of a dynamic type are held in IR.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeRepr {
    /// No bits at all.
    Ghost,
    /// Native bits of this IR type.
    Unboxed(IrType),
    /// A tracked pointer to a heap object.
    Boxed,
}

impl TypeRepr {
    pub fn is_boxed(&self) -> bool {
        matches!(self, Self::Boxed)
    }

    pub fn is_ghost(&self) -> bool {
        matches!(self, Self::Ghost)
    }
}

/// IR members backing one field of an unboxed struct.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FieldMembers {
    /// First IR member index.
    pub first: u32,
    /// Number of IR members (more than one only for flattened unions).
    pub count: u32,
}

impl FieldMembers {
    /// Member holding the selector byte of a flattened union field.
    pub fn selector(self) -> u32 {
        self.first + self.count - 1
    }
}

/// IR shape of an unboxed struct type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructRepr {
    pub ty: IrType,
    pub fields: SmallVec<[FieldMembers; 8]>,
}

impl StructRepr {
    /// Fields map 1:1 onto array or vector elements.
    pub fn is_homogeneous(&self) -> bool {
        matches!(self.ty, IrType::Array(..) | IrType::Vector(..))
    }
}

/// Per-context memo of the mapping.
#[derive(Default)]
pub(crate) struct TypeCache {
    reprs: FxHashMap<TypeId, TypeRepr>,
    structs: FxHashMap<TypeId, Option<StructRepr>>,
}

/// IR type of a primitive of the given class and width.
pub fn primitive_ir_type(class: PrimitiveClass, bits: u32) -> IrType {
    match class {
        PrimitiveClass::Bool => IrType::I8,
        PrimitiveClass::Float => match bits {
            16 => IrType::Half,
            32 => IrType::Float,
            64 => IrType::Double,
            _ => IrType::Int(bits),
        },
        PrimitiveClass::BFloat => IrType::BFloat,
        PrimitiveClass::Pointer { addrspace } => IrType::Ptr(AddressSpace::from_number(addrspace)),
        PrimitiveClass::Int { .. } | PrimitiveClass::Char | PrimitiveClass::Bits => {
            IrType::Int(bits)
        }
    }
}

/// Members standing in for an inline union of `size` data bytes at
/// alignment `align`, selector included.
pub(crate) fn union_members(size: u32, align: u32) -> SmallVec<[IrType; 4]> {
    let mut out = SmallVec::new();
    let align = align.max(1);
    let n = size / align;
    if n > 0 {
        out.push(IrType::Array(n, Box::new(IrType::Int(align * 8))));
    }
    for _ in 0..size % align {
        out.push(IrType::I8);
    }
    out.push(IrType::I8);
    out
}

impl CodegenCx<'_> {
    // === Mapping ===

    /// How values of `t` are represented.
    pub fn type_repr(&mut self, t: TypeId) -> TypeRepr {
        if let Some(r) = self.types.reprs.get(&t) {
            return r.clone();
        }
        let repr = self.compute_repr(t);
        self.types.reprs.insert(t, repr.clone());
        repr
    }

    /// IR type of a value of `t`: a tracked pointer when boxed, an empty
    /// struct when ghost.
    pub fn ir_type(&mut self, t: TypeId) -> IrType {
        match self.type_repr(t) {
            TypeRepr::Ghost => IrType::struct_of(Vec::new()),
            TypeRepr::Unboxed(ty) => ty,
            TypeRepr::Boxed => IrType::TRACKED,
        }
    }

    fn compute_repr(&mut self, t: TypeId) -> TypeRepr {
        let (kind, size) = match self.pool.kind(t) {
            TypeKind::Bottom => return TypeRepr::Ghost,
            TypeKind::DataType(dt) if dt.is_concrete_immutable() => match &dt.layout {
                Some(l) => (dt.kind.clone(), l.size),
                None => return TypeRepr::Boxed,
            },
            _ => return TypeRepr::Boxed,
        };
        if size == 0 {
            return TypeRepr::Ghost;
        }
        match kind {
            DataKind::Primitive { class, bits } => TypeRepr::Unboxed(primitive_ir_type(class, bits)),
            DataKind::Struct {
                vec_element: true, ..
            } => {
                let elem = self.pool.field_type(t, 0);
                self.type_repr(elem)
            }
            DataKind::Struct { .. } => match self.struct_repr(t) {
                Some(s) => TypeRepr::Unboxed(s.ty),
                None => TypeRepr::Boxed,
            },
            DataKind::Opaque | DataKind::Memory(_) => TypeRepr::Boxed,
        }
    }

    // === Structs ===

    /// IR shape of the unboxed struct type `t`, or `None` for anything
    /// that is not an unboxed struct (including `VecElement`, which is
    /// represented as its element).
    pub fn struct_repr(&mut self, t: TypeId) -> Option<StructRepr> {
        if let Some(s) = self.types.structs.get(&t) {
            return s.clone();
        }
        let s = self.compute_struct(t);
        self.types.structs.insert(t, s.clone());
        s
    }

    fn compute_struct(&mut self, t: TypeId) -> Option<StructRepr> {
        let dt = self.pool.datatype(t)?;
        if !dt.is_concrete_immutable() || !matches!(dt.kind, DataKind::Struct { .. }) {
            return None;
        }
        let layout = dt.layout.clone()?;
        if dt.is_vec_element() {
            return None;
        }
        let field_types: SmallVec<[TypeId; 8]> = dt.fields.iter().map(|f| f.ty).collect();
        let is_tuple = dt.is_tuple();

        if is_tuple && field_types.len() > 1 && layout.flags.contains(LayoutFlags::HOMOGENEOUS) {
            if let Some(s) = self.homogeneous_struct(field_types[0], &field_types, layout.alignment) {
                return Some(s);
            }
        }

        let mut members = Vec::with_capacity(field_types.len());
        let mut fields = SmallVec::new();
        for (fl, &fty) in layout.fields.iter().zip(field_types.iter()) {
            let first = u32::try_from(members.len()).ok()?;
            if fl.isptr {
                members.push(IrType::TRACKED);
            } else if fl.isunion {
                let (size, align) = match self.pool.field_storage(fty) {
                    FieldStorage::Union { size, align } => (size, align),
                    _ => (fl.size - 1, 1),
                };
                members.extend(union_members(size, align));
            } else {
                members.push(self.ir_type(fty));
            }
            let count = u32::try_from(members.len()).ok()? - first;
            fields.push(FieldMembers { first, count });
        }
        Some(StructRepr {
            ty: IrType::struct_of(members),
            fields,
        })
    }

    /// Array (or vector) form of a tuple whose fields all share `elem`.
    fn homogeneous_struct(
        &mut self,
        elem: TypeId,
        field_types: &[TypeId],
        align: u32,
    ) -> Option<StructRepr> {
        let n = u32::try_from(field_types.len()).ok()?;
        let ety = match self.type_repr(elem) {
            TypeRepr::Unboxed(ty) if !ty.is_aggregate() && !ty.is_ptr() => ty,
            _ => return None,
        };
        let is_vec = self.pool.datatype(elem).is_some_and(ferrule_types::DataType::is_vec_element);
        let vector = IrType::Vector(n, Box::new(ety.clone()));
        let dl = DataLayout::new(self.ptr_size());
        let ty = if is_vec && dl.align_of(&vector) == u64::from(align) {
            vector
        } else {
            IrType::Array(n, Box::new(ety))
        };
        Some(StructRepr {
            ty,
            fields: (0..n).map(|first| FieldMembers { first, count: 1 }).collect(),
        })
    }

    // === Unions ===

    /// Size and alignment of the largest unboxable member of union `t`;
    /// `None` when no member can be unboxed.
    pub fn union_payload(&self, t: TypeId) -> Option<(u32, u32)> {
        let mut size = 0;
        let mut align = 1;
        let mut any = false;
        self.pool.for_each_union_small(t, |_, m| {
            if let Some(l) = self.pool.layout(m) {
                size = size.max(l.size);
                align = align.max(l.alignment);
                any = true;
            }
        });
        any.then_some((size, align))
    }

    /// Whether values of `t` are better held on the stack than boxed.
    pub fn deserves_stack(&mut self, t: TypeId) -> bool {
        !self.type_repr(t).is_boxed() || self.pool.is_singleton(t)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
