//! Debug type descriptors.
//!
//! When [`CodegenOptions::debug_info`](crate::CodegenOptions) is set, each
//! dynamic type that reaches a parameter or a constructor gets a
//! descriptor for symbolic debuggers:
//!
//! | Type                                    | [`DebugType`]    |
//! |-----------------------------------------|------------------|
//! | boxed, abstract, or non-concrete         | `BoxedPointer`   |
//! | concrete primitive                      | `Basic`          |
//! | concrete struct with a field layout     | `Composite`      |
//! | anything else with hidden content       | `Opaque`         |
//!
//! Descriptors form a tree shared through [`DebugTypeId`]s and are
//! memoized per type for the life of the context. Every pointer-valued
//! use refers to the one `BoxedPointer` node.

use ferrule_types::TypeId;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::context::CodegenCx;

/// Index of a descriptor in a [`DebugTypes`] table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DebugTypeId(u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugMember {
    pub name: String,
    pub offset_bits: u64,
    pub ty: DebugTypeId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DebugType {
    /// A tracked pointer to some boxed value.
    BoxedPointer,
    Basic {
        name: String,
        size_bits: u64,
    },
    Composite {
        name: String,
        size_bits: u64,
        align_bits: u64,
        members: SmallVec<[DebugMember; 4]>,
    },
    /// An alias of the boxed pointer for types without visible layout.
    Opaque { name: String },
}

/// The descriptor table built while lowering one function.
#[derive(Clone, Debug, Default)]
pub struct DebugTypes {
    nodes: Vec<DebugType>,
    memo: FxHashMap<TypeId, DebugTypeId>,
    boxed: Option<DebugTypeId>,
}

impl DebugTypes {
    pub fn get(&self, id: DebugTypeId) -> Option<&DebugType> {
        self.nodes.get(id.0 as usize)
    }

    /// The descriptor already built for the unboxed form of `t`.
    pub fn lookup(&self, t: TypeId) -> Option<DebugTypeId> {
        self.memo.get(&t).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, node: DebugType) -> DebugTypeId {
        #[expect(clippy::cast_possible_truncation, reason = "descriptor tables stay small")]
        let id = DebugTypeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn boxed_pointer(&mut self) -> DebugTypeId {
        if let Some(id) = self.boxed {
            return id;
        }
        let id = self.push(DebugType::BoxedPointer);
        self.boxed = Some(id);
        id
    }
}

impl CodegenCx<'_> {
    /// Descriptor for values of `t`, or `None` when debug info is off.
    pub fn debug_type(&mut self, t: TypeId, isboxed: bool) -> Option<DebugTypeId> {
        self.opts
            .debug_info
            .then(|| self.build_debug_type(t, isboxed))
    }

    fn build_debug_type(&mut self, t: TypeId, isboxed: bool) -> DebugTypeId {
        let concrete = self
            .pool
            .datatype(t)
            .filter(|dt| dt.concrete && dt.layout.is_some());
        let Some(dt) = concrete.filter(|_| !isboxed) else {
            return self.debug.boxed_pointer();
        };
        if let Some(id) = self.debug.lookup(t) {
            return id;
        }
        let name = self.pool.type_name(dt.name).name.clone();
        let size_bits = u64::from(dt.size()) * 8;
        let node = if dt.primitive().is_some() {
            DebugType::Basic { name, size_bits }
        } else if let (Some(layout), false) = (dt.layout.clone(), dt.memory_layout().is_some()) {
            let fields: SmallVec<[(String, TypeId); 4]> =
                dt.fields.iter().map(|f| (f.name.clone(), f.ty)).collect();
            let align_bits = u64::from(layout.alignment) * 8;
            let mut members = SmallVec::with_capacity(fields.len());
            for ((fname, fty), fl) in fields.into_iter().zip(layout.fields.iter()) {
                let ty = self.build_debug_type(fty, fl.isptr);
                members.push(DebugMember {
                    name: fname,
                    offset_bits: u64::from(fl.offset) * 8,
                    ty,
                });
            }
            DebugType::Composite {
                name,
                size_bits,
                align_bits,
                members,
            }
        } else {
            DebugType::Opaque { name }
        };
        tracing::trace!(ty = %self.pool.format_type(t), "debug type");
        let id = self.debug.push(node);
        self.debug.memo.insert(t, id);
        id
    }
}
