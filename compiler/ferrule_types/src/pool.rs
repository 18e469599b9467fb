//! The type pool: owner of every dynamic type.
//!
//! Types are appended and never removed, so a [`TypeId`] stays valid for
//! the life of the pool. Structural types (unions, `Type{T}`, parametric
//! instances, pointer types) are interned: constructing the same type
//! twice yields the same id, which makes `TypeId` equality type equality.
//!
//! Built-in types are bootstrapped in the exact order of the `TypeId`
//! constants so their ids are fixed.

mod construct;
mod format;

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use tracing::trace;

use crate::abi::smalltag;
use crate::kind::{AbstractType, DataKind, DataType, FamilyType, PrimitiveClass, TypeKind, TypeName};
use crate::{Field, Layout, TypeId, TypeNameId};

pub use construct::{FamilyDef, FieldTemplate, FieldType, StructDef};

/// Field template of a parametric family, resolved at instantiation.
#[derive(Clone, Debug)]
struct FamilyTemplate {
    params: u32,
    fields: Vec<FieldTemplate>,
    mutable: bool,
    n_uninitialized: u32,
}

/// Owner of all dynamic types.
pub struct TypePool {
    kinds: Vec<TypeKind>,
    names: Vec<TypeName>,
    families: FxHashMap<TypeNameId, FamilyTemplate>,
    instances: FxHashMap<(TypeNameId, Box<[TypeId]>), TypeId>,
    unions: FxHashMap<Box<[TypeId]>, TypeId>,
    type_ofs: FxHashMap<TypeId, TypeId>,
    pointer_types: FxHashMap<u32, TypeId>,
    pointer_size: u32,
    tuple_name: TypeNameId,
    memory_name: TypeNameId,
    vec_element_family: TypeId,
    replace_result_family: TypeId,
    modify_result_family: TypeId,
}

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}

impl TypePool {
    /// A pool for a 64-bit target.
    pub fn new() -> Self {
        Self::with_pointer_size(8)
    }

    /// A pool whose layouts use `pointer_size`-byte pointers (4 or 8).
    pub fn with_pointer_size(pointer_size: u32) -> Self {
        let mut pool = Self {
            kinds: Vec::with_capacity(64),
            names: Vec::with_capacity(64),
            families: FxHashMap::default(),
            instances: FxHashMap::default(),
            unions: FxHashMap::default(),
            type_ofs: FxHashMap::default(),
            pointer_types: FxHashMap::default(),
            pointer_size: if pointer_size == 4 { 4 } else { 8 },
            tuple_name: TypeNameId::from_raw(0),
            memory_name: TypeNameId::from_raw(0),
            vec_element_family: TypeId::NONE,
            replace_result_family: TypeId::NONE,
            modify_result_family: TypeId::NONE,
        };
        pool.bootstrap();
        pool
    }

    // === Bootstrap ===

    fn bootstrap(&mut self) {
        self.push(TypeKind::Bottom);
        self.push(TypeKind::Any);
        self.push_abstract("Type", TypeId::ANY);
        self.push_opaque("DataType", TypeId::TYPE, true, Some(smalltag::DATATYPE));
        self.push_opaque("Union", TypeId::TYPE, true, Some(smalltag::UNION));
        self.push_opaque("UnionAll", TypeId::TYPE, true, Some(smalltag::UNIONALL));
        self.push_opaque("TypeofBottom", TypeId::TYPE, true, Some(smalltag::TYPEOFBOTTOM));

        self.push_abstract("Number", TypeId::ANY);
        self.push_abstract("Real", TypeId::NUMBER);
        self.push_abstract("Integer", TypeId::REAL);
        self.push_abstract("Signed", TypeId::INTEGER);
        self.push_abstract("Unsigned", TypeId::INTEGER);
        self.push_abstract("AbstractFloat", TypeId::REAL);

        let signed = PrimitiveClass::Int { signed: true };
        let unsigned = PrimitiveClass::Int { signed: false };
        let prims = [
            ("Bool", 8, TypeId::INTEGER, PrimitiveClass::Bool, Some(smalltag::BOOL)),
            ("Int8", 8, TypeId::SIGNED, signed, Some(smalltag::INT8)),
            ("UInt8", 8, TypeId::UNSIGNED, unsigned, Some(smalltag::UINT8)),
            ("Int16", 16, TypeId::SIGNED, signed, Some(smalltag::INT16)),
            ("UInt16", 16, TypeId::UNSIGNED, unsigned, Some(smalltag::UINT16)),
            ("Int32", 32, TypeId::SIGNED, signed, Some(smalltag::INT32)),
            ("UInt32", 32, TypeId::UNSIGNED, unsigned, Some(smalltag::UINT32)),
            ("Int64", 64, TypeId::SIGNED, signed, Some(smalltag::INT64)),
            ("UInt64", 64, TypeId::UNSIGNED, unsigned, Some(smalltag::UINT64)),
            ("Int128", 128, TypeId::SIGNED, signed, None),
            ("Float16", 16, TypeId::ABSTRACT_FLOAT, PrimitiveClass::Float, None),
            ("BFloat16", 16, TypeId::ABSTRACT_FLOAT, PrimitiveClass::BFloat, None),
            ("Float32", 32, TypeId::ABSTRACT_FLOAT, PrimitiveClass::Float, None),
            ("Float64", 64, TypeId::ABSTRACT_FLOAT, PrimitiveClass::Float, None),
            ("Char", 32, TypeId::ANY, PrimitiveClass::Char, Some(smalltag::CHAR)),
        ];
        for (name, bits, supertype, class, tag) in prims {
            self.push_primitive(name, bits, supertype, class, tag);
        }
        let ptr_bits = self.pointer_size * 8;
        self.push_primitive(
            "Ptr",
            ptr_bits,
            TypeId::ANY,
            PrimitiveClass::Pointer { addrspace: 0 },
            None,
        );
        self.pointer_types.insert(0, TypeId::PTR);

        self.push_opaque("Symbol", TypeId::ANY, false, Some(smalltag::SYMBOL));
        self.push_opaque("String", TypeId::ANY, false, Some(smalltag::STRING));

        let nothing = self.push_name("Nothing", false, None);
        self.push_empty_struct(nothing, false);
        self.tuple_name = self.push_name("Tuple", false, None);
        self.push_empty_struct(self.tuple_name, true);
        self.instances
            .insert((self.tuple_name, Box::new([])), TypeId::EMPTY_TUPLE);

        self.memory_name = self.push_name("Memory", false, Some(TypeId::MEMORY));
        self.push(TypeKind::Family(FamilyType {
            name: self.memory_name,
            supertype: TypeId::ANY,
        }));
        debug_assert_eq!(self.kinds.len(), TypeId::FIRST_DYNAMIC as usize);

        let tuple_family = self.next_id();
        self.names[self.tuple_name.index()].family = Some(tuple_family);
        self.push(TypeKind::Family(FamilyType {
            name: self.tuple_name,
            supertype: TypeId::ANY,
        }));

        self.vec_element_family = self.push_builtin_family(
            "VecElement",
            vec![FieldTemplate::param("value", 0)],
        );
        self.replace_result_family = self.push_builtin_family(
            "ReplaceResult",
            vec![
                FieldTemplate::param("old", 0),
                FieldTemplate::fixed("success", TypeId::BOOL),
            ],
        );
        self.modify_result_family = self.push_builtin_family(
            "ModifyResult",
            vec![FieldTemplate::param("old", 0), FieldTemplate::param("new", 0)],
        );
    }

    fn next_id(&self) -> TypeId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "pool size is bounded far below u32::MAX"
        )]
        let raw = self.kinds.len() as u32;
        TypeId::from_raw(raw)
    }

    pub(crate) fn push(&mut self, kind: TypeKind) -> TypeId {
        let id = self.next_id();
        trace!(id = id.raw(), "pool push");
        self.kinds.push(kind);
        id
    }

    pub(crate) fn push_name(
        &mut self,
        name: &str,
        is_abstract: bool,
        family: Option<TypeId>,
    ) -> TypeNameId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "name table is bounded far below u32::MAX"
        )]
        let id = TypeNameId::from_raw(self.names.len() as u32);
        self.names.push(TypeName {
            name: name.to_owned(),
            is_abstract,
            family,
        });
        id
    }

    fn push_abstract(&mut self, name: &str, supertype: TypeId) -> TypeId {
        let name = self.push_name(name, true, None);
        self.push(TypeKind::Abstract(AbstractType { name, supertype }))
    }

    fn push_opaque(
        &mut self,
        name: &str,
        supertype: TypeId,
        mutable: bool,
        smalltag: Option<u32>,
    ) -> TypeId {
        let name = self.push_name(name, false, None);
        self.push(TypeKind::DataType(DataType {
            name,
            params: Box::new([]),
            supertype,
            kind: DataKind::Opaque,
            fields: Box::new([]),
            mutable,
            n_uninitialized: 0,
            layout: None,
            smalltag,
            concrete: true,
        }))
    }

    pub(crate) fn push_primitive(
        &mut self,
        name: &str,
        bits: u32,
        supertype: TypeId,
        class: PrimitiveClass,
        smalltag: Option<u32>,
    ) -> TypeId {
        let name = self.push_name(name, false, None);
        self.push(TypeKind::DataType(DataType {
            name,
            params: Box::new([]),
            supertype,
            kind: DataKind::Primitive { class, bits },
            fields: Box::new([]),
            mutable: false,
            n_uninitialized: 0,
            layout: Some(Layout::primitive(bits)),
            smalltag,
            concrete: true,
        }))
    }

    fn push_empty_struct(&mut self, name: TypeNameId, tuple: bool) -> TypeId {
        let layout = crate::LayoutBuilder::new(self.pointer_size).finish(false, false);
        self.push(TypeKind::DataType(DataType {
            name,
            params: Box::new([]),
            supertype: TypeId::ANY,
            kind: DataKind::Struct {
                tuple,
                vec_element: false,
            },
            fields: Box::new([]),
            mutable: false,
            n_uninitialized: 0,
            layout,
            smalltag: None,
            concrete: true,
        }))
    }

    fn push_builtin_family(&mut self, name: &str, fields: Vec<FieldTemplate>) -> TypeId {
        let family = self.next_id();
        let name = self.push_name(name, false, Some(family));
        self.families.insert(
            name,
            FamilyTemplate {
                params: 1,
                fields,
                mutable: false,
                n_uninitialized: 0,
            },
        );
        self.push(TypeKind::Family(FamilyType {
            name,
            supertype: TypeId::ANY,
        }))
    }

    // === Queries ===

    pub fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    /// Number of types in the pool.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// The descriptor of `t`. `NONE` reads as `Bottom`.
    pub fn kind(&self, t: TypeId) -> &TypeKind {
        self.kinds.get(t.index()).unwrap_or(&TypeKind::Bottom)
    }

    pub fn datatype(&self, t: TypeId) -> Option<&DataType> {
        match self.kind(t) {
            TypeKind::DataType(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn type_name(&self, name: TypeNameId) -> &TypeName {
        &self.names[name.index()]
    }

    /// Name of a nominal type or family.
    pub fn name_id(&self, t: TypeId) -> Option<TypeNameId> {
        match self.kind(t) {
            TypeKind::Abstract(a) => Some(a.name),
            TypeKind::DataType(dt) => Some(dt.name),
            TypeKind::Family(f) => Some(f.name),
            _ => None,
        }
    }

    /// The family type of a parametric name, if `t` belongs to one.
    pub fn family_of(&self, t: TypeId) -> Option<TypeId> {
        self.name_id(t).and_then(|n| self.type_name(n).family)
    }

    pub fn layout(&self, t: TypeId) -> Option<&Layout> {
        self.datatype(t).and_then(|dt| dt.layout.as_ref())
    }

    pub fn nfields(&self, t: TypeId) -> usize {
        self.datatype(t).map_or(0, DataType::nfields)
    }

    pub fn field(&self, t: TypeId, idx: usize) -> Option<&Field> {
        self.datatype(t).and_then(|dt| dt.fields.get(idx))
    }

    /// Declared type of field `idx`, or `Any` when out of range.
    pub fn field_type(&self, t: TypeId, idx: usize) -> TypeId {
        self.field(t, idx).map_or(TypeId::ANY, |f| f.ty)
    }

    pub fn field_index(&self, t: TypeId, name: &str) -> Option<usize> {
        self.datatype(t)
            .and_then(|dt| dt.fields.iter().position(|f| f.name == name))
    }

    /// Members of a union, or `[t]` for any other type.
    pub fn union_members(&self, t: TypeId) -> SmallVec<[TypeId; 4]> {
        match self.kind(t) {
            TypeKind::Union(ms) => ms.iter().copied().collect(),
            TypeKind::Bottom => SmallVec::new(),
            _ => smallvec![t],
        }
    }

    pub fn smalltag(&self, t: TypeId) -> Option<u32> {
        self.datatype(t).and_then(|dt| dt.smalltag)
    }

    /// Type parameter `i` of an instance.
    pub fn param(&self, t: TypeId, i: usize) -> Option<TypeId> {
        self.datatype(t).and_then(|dt| dt.params.get(i).copied())
    }

    /// For `Type{T}`, the `T`.
    pub fn type_of_param(&self, t: TypeId) -> Option<TypeId> {
        match self.kind(t) {
            TypeKind::TypeOf(x) => Some(*x),
            _ => None,
        }
    }

    pub fn is_memory(&self, t: TypeId) -> bool {
        self.datatype(t).is_some_and(|dt| dt.name == self.memory_name)
    }

    pub fn is_tuple(&self, t: TypeId) -> bool {
        self.datatype(t).is_some_and(|dt| dt.name == self.tuple_name)
    }

    pub fn is_union(&self, t: TypeId) -> bool {
        matches!(self.kind(t), TypeKind::Union(_))
    }

    /// Iterate all ids.
    pub fn ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.next_id().raw()).map(TypeId::from_raw)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
