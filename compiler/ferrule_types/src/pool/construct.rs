//! Type constructors.
//!
//! Every constructor that can produce an already-existing type consults
//! the pool's intern tables first, so structurally equal types share one
//! `TypeId`.

use smallvec::SmallVec;
use tracing::debug;

use super::{FamilyTemplate, TypePool};
use crate::abi::MAX_UNION_VARIANTS;
use crate::kind::{
    AbstractType, DataKind, DataType, FamilyType, MemoryLayout, PrimitiveClass, TypeKind,
};
use crate::layout::{FieldStorage, LayoutBuilder, MAX_LAYOUT_SIZE};
use crate::{Field, TypeDefError, TypeId, TypeNameId};

/// A nominal struct declaration.
#[derive(Clone, Debug)]
pub struct StructDef {
    pub name: String,
    pub supertype: TypeId,
    pub fields: Vec<Field>,
    pub mutable: bool,
    pub n_uninitialized: u32,
}

impl StructDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supertype: TypeId::ANY,
            fields: Vec::new(),
            mutable: false,
            n_uninitialized: 0,
        }
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    #[must_use]
    pub fn supertype(mut self, supertype: TypeId) -> Self {
        self.supertype = supertype;
        self
    }

    /// The last `n` fields may be left undefined by a constructor.
    #[must_use]
    pub fn uninitialized(mut self, n: u32) -> Self {
        self.n_uninitialized = n;
        self
    }
}

/// Where a family field's type comes from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    Param(usize),
    Fixed(TypeId),
}

#[derive(Clone, Debug)]
pub struct FieldTemplate {
    pub name: String,
    pub ty: FieldType,
    pub atomic: bool,
    pub constant: bool,
}

impl FieldTemplate {
    pub fn param(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            ty: FieldType::Param(index),
            atomic: false,
            constant: false,
        }
    }

    pub fn fixed(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty: FieldType::Fixed(ty),
            atomic: false,
            constant: false,
        }
    }

    #[must_use]
    pub fn atomic(mut self) -> Self {
        self.atomic = true;
        self
    }

    fn resolve(&self, params: &[TypeId]) -> Field {
        let ty = match self.ty {
            FieldType::Param(i) => params.get(i).copied().unwrap_or(TypeId::ANY),
            FieldType::Fixed(t) => t,
        };
        Field {
            name: self.name.clone(),
            ty,
            atomic: self.atomic,
            constant: self.constant,
        }
    }
}

/// A parametric struct family declaration.
#[derive(Clone, Debug)]
pub struct FamilyDef {
    pub name: String,
    pub supertype: TypeId,
    pub params: u32,
    pub fields: Vec<FieldTemplate>,
    pub mutable: bool,
    pub n_uninitialized: u32,
}

/// Everything needed to admit one data type.
struct DataSpec {
    name: TypeNameId,
    params: Box<[TypeId]>,
    supertype: TypeId,
    kind: DataKind,
    fields: Vec<Field>,
    mutable: bool,
    n_uninitialized: u32,
    concrete: bool,
}

impl TypePool {
    // === Nominal definitions ===

    pub fn define_abstract(
        &mut self,
        name: &str,
        supertype: TypeId,
    ) -> Result<TypeId, TypeDefError> {
        self.check_supertype(name, supertype)?;
        let name = self.push_name(name, true, None);
        Ok(self.push(TypeKind::Abstract(AbstractType { name, supertype })))
    }

    /// A primitive bits type. Widths must be a power-of-two number of bytes.
    pub fn define_primitive(
        &mut self,
        name: &str,
        bits: u32,
        supertype: TypeId,
        class: PrimitiveClass,
    ) -> Result<TypeId, TypeDefError> {
        if bits == 0 || bits % 8 != 0 || !(bits / 8).is_power_of_two() {
            return Err(TypeDefError::UnsupportedWidth {
                name: name.to_owned(),
                bits,
            });
        }
        self.check_supertype(name, supertype)?;
        Ok(self.push_primitive(name, bits, supertype, class, None))
    }

    /// Raw pointer primitive in address space `addrspace`.
    pub fn pointer_type(&mut self, addrspace: u32) -> TypeId {
        if let Some(&t) = self.pointer_types.get(&addrspace) {
            return t;
        }
        let bits = self.pointer_size * 8;
        let t = self.push_primitive(
            &format!("LLVMPtr{{{addrspace}}}"),
            bits,
            TypeId::ANY,
            PrimitiveClass::Pointer { addrspace },
            None,
        );
        self.pointer_types.insert(addrspace, t);
        t
    }

    pub fn define_struct(&mut self, def: StructDef) -> Result<TypeId, TypeDefError> {
        self.check_supertype(&def.name, def.supertype)?;
        check_fields(&def.name, &def.fields, def.mutable, def.n_uninitialized)?;
        let name = self.push_name(&def.name, false, None);
        let t = self.admit(
            &def.name,
            DataSpec {
                name,
                params: Box::new([]),
                supertype: def.supertype,
                kind: DataKind::Struct {
                    tuple: false,
                    vec_element: false,
                },
                fields: def.fields,
                mutable: def.mutable,
                n_uninitialized: def.n_uninitialized,
                concrete: true,
            },
        )?;
        debug!(ty = t.raw(), name = %def.name, "defined struct");
        Ok(t)
    }

    /// Declare a parametric family; instances come from [`TypePool::instantiate`].
    pub fn define_family(&mut self, def: FamilyDef) -> Result<TypeId, TypeDefError> {
        self.check_supertype(&def.name, def.supertype)?;
        for f in &def.fields {
            if let FieldType::Param(i) = f.ty {
                if i >= def.params as usize {
                    return Err(TypeDefError::ParameterCount {
                        family: def.name.clone(),
                        expected: def.params,
                        got: u32::try_from(i + 1).unwrap_or(u32::MAX),
                    });
                }
            }
        }
        let probe: Vec<Field> = def
            .fields
            .iter()
            .map(|f| f.resolve(&[]))
            .collect();
        check_fields(&def.name, &probe, def.mutable, def.n_uninitialized)?;

        let family = self.next_id();
        let name = self.push_name(&def.name, false, Some(family));
        self.families.insert(
            name,
            FamilyTemplate {
                params: def.params,
                fields: def.fields,
                mutable: def.mutable,
                n_uninitialized: def.n_uninitialized,
            },
        );
        Ok(self.push(TypeKind::Family(FamilyType {
            name,
            supertype: def.supertype,
        })))
    }

    /// Instance of a family with the given parameters.
    pub fn instantiate(
        &mut self,
        family: TypeId,
        params: &[TypeId],
    ) -> Result<TypeId, TypeDefError> {
        let TypeKind::Family(fam) = self.kind(family) else {
            return Err(TypeDefError::NotAFamily { ty: family });
        };
        let (name, supertype) = (fam.name, fam.supertype);
        if name == self.tuple_name {
            return self.tuple(params);
        }
        if name == self.memory_name {
            return match params {
                [elem] => self.memory(*elem),
                _ => Err(self.param_count_error(name, 1, params.len())),
            };
        }
        let Some(template) = self.families.get(&name).cloned() else {
            return Err(TypeDefError::NotAFamily { ty: family });
        };
        if params.len() != template.params as usize {
            return Err(self.param_count_error(name, template.params, params.len()));
        }
        let key = (name, Box::<[TypeId]>::from(params));
        if let Some(&t) = self.instances.get(&key) {
            return Ok(t);
        }
        let fields = template.fields.iter().map(|f| f.resolve(params)).collect();
        let display = self.instance_name(name, params);
        let t = self.admit(
            &display,
            DataSpec {
                name,
                params: key.1.clone(),
                supertype,
                kind: DataKind::Struct {
                    tuple: false,
                    vec_element: family == self.vec_element_family,
                },
                fields,
                mutable: template.mutable,
                n_uninitialized: template.n_uninitialized,
                concrete: true,
            },
        )?;
        self.instances.insert(key, t);
        Ok(t)
    }

    // === Structural constructors ===

    /// `Tuple{elems...}`. Concrete iff every element type is concrete.
    pub fn tuple(&mut self, elems: &[TypeId]) -> Result<TypeId, TypeDefError> {
        let key = (self.tuple_name, Box::<[TypeId]>::from(elems));
        if let Some(&t) = self.instances.get(&key) {
            return Ok(t);
        }
        let concrete = elems.iter().all(|&e| self.is_concrete(e));
        let fields = elems
            .iter()
            .enumerate()
            .map(|(i, &ty)| Field::new((i + 1).to_string(), ty))
            .collect();
        let display = self.instance_name(self.tuple_name, elems);
        let t = self.admit(
            &display,
            DataSpec {
                name: self.tuple_name,
                params: key.1.clone(),
                supertype: TypeId::ANY,
                kind: DataKind::Struct {
                    tuple: true,
                    vec_element: false,
                },
                fields,
                mutable: false,
                n_uninitialized: 0,
                concrete,
            },
        )?;
        self.instances.insert(key, t);
        Ok(t)
    }

    /// `VecElement{T}` for a primitive `T`.
    pub fn vec_element(&mut self, elem: TypeId) -> Result<TypeId, TypeDefError> {
        if self.datatype(elem).and_then(DataType::primitive).is_none() {
            return Err(TypeDefError::NonConcreteParameter {
                family: "VecElement".to_owned(),
                param: elem,
            });
        }
        self.instantiate(self.vec_element_family, &[elem])
    }

    /// `(old::T, success::Bool)`, the result of a replace operation.
    pub fn replace_result(&mut self, t: TypeId) -> Result<TypeId, TypeDefError> {
        self.instantiate(self.replace_result_family, &[t])
    }

    /// `(old::T, new::T)`, the result of a modify operation.
    pub fn modify_result(&mut self, t: TypeId) -> Result<TypeId, TypeDefError> {
        self.instantiate(self.modify_result_family, &[t])
    }

    /// `Type{t}`.
    pub fn type_of(&mut self, t: TypeId) -> TypeId {
        if let Some(&ty) = self.type_ofs.get(&t) {
            return ty;
        }
        let ty = self.push(TypeKind::TypeOf(t));
        self.type_ofs.insert(t, ty);
        ty
    }

    /// Normalized union: flattened, without `Union{}`, deduplicated, with
    /// members subsumed by another member dropped, ordered by id.
    pub fn union(&mut self, members: &[TypeId]) -> TypeId {
        let mut flat: SmallVec<[TypeId; 8]> = SmallVec::new();
        for &m in members {
            match self.kind(m) {
                TypeKind::Bottom => {}
                TypeKind::Union(ms) => flat.extend(ms.iter().copied()),
                _ => flat.push(m),
            }
        }
        flat.sort_unstable();
        flat.dedup();
        let kept: SmallVec<[TypeId; 8]> = flat
            .iter()
            .copied()
            .filter(|&m| !flat.iter().any(|&n| n != m && self.subtype(m, n)))
            .collect();
        match kept.as_slice() {
            [] => TypeId::BOTTOM,
            [one] => *one,
            many => {
                let key: Box<[TypeId]> = many.into();
                if let Some(&t) = self.unions.get(&key) {
                    return t;
                }
                let t = self.push(TypeKind::Union(key.clone()));
                self.unions.insert(key, t);
                t
            }
        }
    }

    /// `Memory{elem}`.
    pub fn memory(&mut self, elem: TypeId) -> Result<TypeId, TypeDefError> {
        let key = (self.memory_name, Box::<[TypeId]>::from([elem].as_slice()));
        if let Some(&t) = self.instances.get(&key) {
            return Ok(t);
        }
        let ptr = self.pointer_size;
        let layout = match self.field_storage(elem) {
            FieldStorage::Pointer => MemoryLayout {
                elem,
                elsize: ptr,
                elalign: ptr,
                isboxed: true,
                isunion: false,
                zeroinit: true,
            },
            FieldStorage::Inline(l) => MemoryLayout {
                elem,
                elsize: l.size.next_multiple_of(l.alignment),
                elalign: l.alignment,
                isboxed: false,
                isunion: false,
                zeroinit: !l.pointer_free(),
            },
            FieldStorage::Union { size, align } => MemoryLayout {
                elem,
                elsize: size,
                elalign: align,
                isboxed: false,
                isunion: true,
                zeroinit: true,
            },
        };
        let display = self.instance_name(self.memory_name, &[elem]);
        let t = self.admit(
            &display,
            DataSpec {
                name: self.memory_name,
                params: key.1.clone(),
                supertype: TypeId::ANY,
                kind: DataKind::Memory(layout),
                fields: vec![
                    Field::new("length", TypeId::INT64),
                    Field::new("ptr", TypeId::PTR),
                ],
                mutable: true,
                n_uninitialized: 0,
                concrete: true,
            },
        )?;
        self.instances.insert(key, t);
        Ok(t)
    }

    // === Helpers ===

    /// How a field of type `ty` is stored inside its parent.
    pub fn field_storage(&self, ty: TypeId) -> FieldStorage<'_> {
        match self.kind(ty) {
            TypeKind::DataType(dt) => match &dt.layout {
                Some(l) if dt.is_concrete_immutable() => FieldStorage::Inline(l),
                _ => FieldStorage::Pointer,
            },
            TypeKind::Union(ms) if ms.len() <= MAX_UNION_VARIANTS as usize => {
                let mut size = 0;
                let mut align = 1;
                for &m in ms.iter() {
                    match self.layout(m) {
                        Some(l) if self.is_pointer_free(m) => {
                            size = size.max(l.size);
                            align = align.max(l.alignment);
                        }
                        _ => return FieldStorage::Pointer,
                    }
                }
                FieldStorage::Union { size, align }
            }
            _ => FieldStorage::Pointer,
        }
    }

    fn check_supertype(&self, name: &str, supertype: TypeId) -> Result<(), TypeDefError> {
        if self.is_abstract(supertype) {
            Ok(())
        } else {
            Err(TypeDefError::ConcreteSupertype {
                name: name.to_owned(),
                supertype,
            })
        }
    }

    fn param_count_error(&self, name: TypeNameId, expected: u32, got: usize) -> TypeDefError {
        TypeDefError::ParameterCount {
            family: self.type_name(name).name.clone(),
            expected,
            got: u32::try_from(got).unwrap_or(u32::MAX),
        }
    }

    fn instance_name(&self, name: TypeNameId, params: &[TypeId]) -> String {
        let mut s = self.type_name(name).name.clone();
        self.format_list(params, &mut s);
        s
    }

    /// Compute the layout (for concrete types) and push the descriptor.
    fn admit(&mut self, display: &str, spec: DataSpec) -> Result<TypeId, TypeDefError> {
        let layout = if spec.concrete {
            let mut builder = LayoutBuilder::new(self.pointer_size);
            for f in &spec.fields {
                builder.push(self.field_storage(f.ty), f.atomic);
            }
            let homogeneous = spec
                .fields
                .first()
                .is_some_and(|first| spec.fields.iter().all(|f| f.ty == first.ty));
            let layout = builder.finish(spec.mutable, homogeneous).ok_or_else(|| {
                TypeDefError::LayoutTooLarge {
                    name: display.to_owned(),
                    max: MAX_LAYOUT_SIZE,
                }
            })?;
            Some(layout)
        } else {
            None
        };
        Ok(self.push(TypeKind::DataType(DataType {
            name: spec.name,
            params: spec.params,
            supertype: spec.supertype,
            kind: spec.kind,
            fields: spec.fields.into_boxed_slice(),
            mutable: spec.mutable,
            n_uninitialized: spec.n_uninitialized,
            layout,
            smalltag: None,
            concrete: spec.concrete,
        })))
    }
}

fn check_fields(
    name: &str,
    fields: &[Field],
    mutable: bool,
    n_uninitialized: u32,
) -> Result<(), TypeDefError> {
    for (i, f) in fields.iter().enumerate() {
        if fields[..i].iter().any(|g| g.name == f.name) {
            return Err(TypeDefError::DuplicateField {
                name: name.to_owned(),
                field: f.name.clone(),
            });
        }
        if f.atomic && !mutable {
            return Err(TypeDefError::AtomicFieldOnImmutable {
                name: name.to_owned(),
                field: f.name.clone(),
            });
        }
    }
    if n_uninitialized as usize > fields.len() {
        return Err(TypeDefError::TooManyUninitialized {
            name: name.to_owned(),
            n_uninitialized,
            nfields: u32::try_from(fields.len()).unwrap_or(u32::MAX),
        });
    }
    Ok(())
}
