//! Lattice queries: subtyping, intersection, and the union enumeration
//! used for tagged-union representations.
//!
//! The hierarchy is single-inheritance and nominal. `Tuple` instances are
//! covariant in their parameters; every other parametric instance is
//! invariant. Intersection is exact except between two non-concrete tuple
//! types that are not subtypes of one another, where it may
//! over-approximate to the left operand.

use smallvec::SmallVec;

use crate::abi::MAX_UNION_VARIANTS;
use crate::kind::TypeKind;
use crate::{TypeId, TypePool};

impl TypePool {
    // === Classification ===

    pub fn is_abstract(&self, t: TypeId) -> bool {
        matches!(self.kind(t), TypeKind::Any | TypeKind::Abstract(_))
    }

    /// A type that can be the exact type of a value.
    pub fn is_concrete(&self, t: TypeId) -> bool {
        self.datatype(t).is_some_and(|dt| dt.concrete)
    }

    pub fn is_concrete_immutable(&self, t: TypeId) -> bool {
        self.datatype(t).is_some_and(crate::DataType::is_concrete_immutable)
    }

    /// Concrete, immutable, laid out, and without tracked pointers
    /// (an "isbits" type).
    pub fn is_pointer_free(&self, t: TypeId) -> bool {
        self.datatype(t).is_some_and(|dt| {
            dt.is_concrete_immutable() && dt.layout.as_ref().is_some_and(crate::Layout::pointer_free)
        })
    }

    /// Has exactly one zero-sized instance.
    pub fn is_singleton(&self, t: TypeId) -> bool {
        self.datatype(t).is_some_and(crate::DataType::is_singleton)
    }

    /// The four kinds: types of type values.
    pub fn is_kind(&self, t: TypeId) -> bool {
        matches!(
            t,
            TypeId::DATATYPE | TypeId::UNION_KIND | TypeId::UNIONALL | TypeId::TYPEOFBOTTOM
        )
    }

    /// `Type{T}`: exactly one instance, comparable by identity.
    pub fn is_uniquerep(&self, t: TypeId) -> bool {
        matches!(self.kind(t), TypeKind::TypeOf(_))
    }

    /// Instances are allocated once, in permanent memory, and never move.
    pub fn is_permalloc(&self, t: TypeId) -> bool {
        self.is_singleton(t) || matches!(t, TypeId::SYMBOL | TypeId::INT8 | TypeId::UINT8)
    }

    /// The kind of the type value `t`.
    pub fn kind_of(&self, t: TypeId) -> TypeId {
        match self.kind(t) {
            TypeKind::Bottom => TypeId::TYPEOFBOTTOM,
            TypeKind::Union(_) => TypeId::UNION_KIND,
            TypeKind::Family(_) => TypeId::UNIONALL,
            _ => TypeId::DATATYPE,
        }
    }

    /// Declared supertype of a nominal type.
    pub fn supertype(&self, t: TypeId) -> Option<TypeId> {
        match self.kind(t) {
            TypeKind::Abstract(a) => Some(a.supertype),
            TypeKind::DataType(dt) => Some(dt.supertype),
            TypeKind::Family(f) => Some(f.supertype),
            _ => None,
        }
    }

    // === Subtyping ===

    pub fn subtype(&self, a: TypeId, b: TypeId) -> bool {
        if a == b || a == TypeId::BOTTOM || b == TypeId::ANY {
            return true;
        }
        if let TypeKind::Union(ms) = self.kind(a) {
            return ms.iter().all(|&m| self.subtype(m, b));
        }
        match self.kind(b) {
            TypeKind::Union(ms) => return ms.iter().any(|&m| self.subtype(a, m)),
            TypeKind::Bottom | TypeKind::TypeOf(_) => return false,
            _ => {}
        }
        match self.kind(a) {
            TypeKind::TypeOf(x) => return self.subtype(self.kind_of(*x), b),
            TypeKind::Any | TypeKind::Bottom | TypeKind::Union(_) => return false,
            _ => {}
        }
        if let (TypeKind::DataType(da), TypeKind::DataType(db)) = (self.kind(a), self.kind(b)) {
            if da.is_tuple() && db.is_tuple() {
                return da.params.len() == db.params.len()
                    && da
                        .params
                        .iter()
                        .zip(db.params.iter())
                        .all(|(&x, &y)| self.subtype(x, y));
            }
        }
        if let TypeKind::Family(fb) = self.kind(b) {
            if self.name_id(a) == Some(fb.name) {
                return true;
            }
        }
        self.nominal_subtype(a, b)
    }

    /// Walk the supertype chain of `a` looking for `b`.
    fn nominal_subtype(&self, a: TypeId, b: TypeId) -> bool {
        let mut cur = self.supertype(a);
        while let Some(t) = cur {
            if t == b {
                return true;
            }
            if t == TypeId::ANY {
                break;
            }
            cur = self.supertype(t);
        }
        false
    }

    // === Intersection ===

    /// Members of `a ∩ b`, ordered by id; empty when the intersection is
    /// `Union{}`.
    pub fn intersect_members(&self, a: TypeId, b: TypeId) -> SmallVec<[TypeId; 4]> {
        let mut out = SmallVec::new();
        self.intersect_into(a, b, &mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn intersect_into(&self, a: TypeId, b: TypeId, out: &mut SmallVec<[TypeId; 4]>) {
        if self.subtype(a, b) {
            out.extend(self.union_members(a));
            return;
        }
        if self.subtype(b, a) {
            out.extend(self.union_members(b));
            return;
        }
        if let TypeKind::Union(ms) = self.kind(a) {
            for &m in ms.iter() {
                self.intersect_into(m, b, out);
            }
            return;
        }
        if let TypeKind::Union(ms) = self.kind(b) {
            for &m in ms.iter() {
                self.intersect_into(a, m, out);
            }
            return;
        }
        if self.is_concrete(a) || self.is_concrete(b) {
            return;
        }
        if let (TypeKind::DataType(da), TypeKind::DataType(db)) = (self.kind(a), self.kind(b)) {
            if da.is_tuple()
                && db.is_tuple()
                && da.params.len() == db.params.len()
                && da
                    .params
                    .iter()
                    .zip(db.params.iter())
                    .all(|(&x, &y)| !self.intersect_members(x, y).is_empty())
            {
                out.push(a);
            }
        }
    }

    /// `a ∩ b` as a single type.
    pub fn intersect(&mut self, a: TypeId, b: TypeId) -> TypeId {
        let members = self.intersect_members(a, b);
        self.union(&members)
    }

    /// The type may contain values whose runtime type is not a kind but
    /// which are type values anyway (`Any`, `Type`, `Type{T}`); such tests
    /// must go through the runtime.
    pub fn has_intersect_type_not_kind(&self, t: TypeId) -> bool {
        match self.kind(t) {
            TypeKind::Any | TypeKind::TypeOf(_) => true,
            TypeKind::Union(ms) => ms.iter().any(|&m| self.has_intersect_type_not_kind(m)),
            _ => t == TypeId::TYPE,
        }
    }

    // === Union enumeration ===

    /// Visit the pointer-free concrete members of `t` with 1-based indices.
    /// Returns true when every member was visited (the union can be fully
    /// unboxed). Stops after [`MAX_UNION_VARIANTS`] members.
    pub fn for_each_union_small(&self, t: TypeId, mut f: impl FnMut(u8, TypeId)) -> bool {
        let mut counter = 0u32;
        let mut allunbox = true;
        for m in self.union_members(t) {
            if counter >= MAX_UNION_VARIANTS {
                return false;
            }
            if self.is_pointer_free(m) {
                counter += 1;
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "counter is capped at MAX_UNION_VARIANTS"
                )]
                f(counter as u8, m);
            } else {
                allunbox = false;
            }
        }
        allunbox && counter > 0
    }

    /// Number of unboxable members and whether all members are unboxable.
    pub fn count_union_small(&self, t: TypeId) -> (u8, bool) {
        let mut n = 0;
        let allunbox = self.for_each_union_small(t, |_, _| n += 1);
        (n, allunbox)
    }

    /// Index of the concrete `jt` among the unboxable members of `ut`, or 0.
    pub fn box_tindex(&self, jt: TypeId, ut: TypeId) -> u8 {
        let mut idx = 0;
        self.for_each_union_small(ut, |i, m| {
            if m == jt {
                idx = i;
            }
        });
        idx
    }

    /// Whether an `isa` test against union `t` may be lowered as a chain
    /// of per-member tests.
    pub fn can_optimize_isa_union(&self, t: TypeId) -> bool {
        let TypeKind::Union(ms) = self.kind(t) else {
            return false;
        };
        if ms.len() > MAX_UNION_VARIANTS as usize {
            return false;
        }
        ms.iter().all(|&m| self.can_optimize_isa(m))
    }

    fn can_optimize_isa(&self, t: TypeId) -> bool {
        if self.is_uniquerep(t) {
            return true;
        }
        if self.has_intersect_type_not_kind(t) {
            return false;
        }
        if self.is_concrete(t) {
            return true;
        }
        self.is_name_test(t)
    }

    /// `t` is exactly the set of instances of one non-abstract type name,
    /// so a test can compare the value's type name.
    pub fn is_name_test(&self, t: TypeId) -> bool {
        match self.kind(t) {
            TypeKind::Family(_) => true,
            TypeKind::DataType(_) => self.family_of(t).is_some_and(|f| self.subtype(f, t)),
            _ => false,
        }
    }
}
