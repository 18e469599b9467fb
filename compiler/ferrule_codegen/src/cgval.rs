//! Lowered values.
//!
//! A [`CgValue`] pairs the statically known dynamic type of a value with
//! the form its bits currently take in the IR. The same dynamic value may
//! be held several ways; operations pick the cheapest form they can use
//! and convert only when they must.
//!
//! | [`Repr`]   | Holds                                                      |
//! |------------|------------------------------------------------------------|
//! | `Ghost`    | nothing: singletons and `Union{}`                          |
//! | `Constant` | a compile-time constant                                    |
//! | `Boxed`    | a tracked pointer to a heap object                         |
//! | `Register` | the native bits as one SSA value                           |
//! | `Slot`     | a pointer to the native bits (stack or heap)               |
//! | `Split`    | pointer-free bits in a buffer plus the tracked roots       |
//! | `Union`    | a selector byte plus a payload slot and/or a boxed value   |

use ferrule_ir::{AliasTag, InstId, IrType, ValueId};
use ferrule_types::{Constant, TypeId};
use smallvec::SmallVec;

use crate::context::CodegenCx;
use crate::type_map::TypeRepr;

/// A stack slot that may still be turned into a heap allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Promotion {
    /// First instruction using the slot; the heap object is allocated
    /// immediately before it.
    pub point: InstId,
    /// Creation order of the candidate, for debugging dumps.
    pub rank: u32,
}

/// Native bits behind a pointer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub ptr: ValueId,
    pub tbaa: AliasTag,
    pub promotion: Option<Promotion>,
}

/// A value with tracked pointers held apart from its other bits.
///
/// `bits` has the native layout of the type with the pointer slots left
/// zero, and is absent when every byte is a pointer. `roots` holds one
/// tracked pointer per pointer slot of the layout, in layout order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    pub bits: Option<ValueId>,
    pub roots: SmallVec<[ValueId; 4]>,
}

/// A value of a union type, discriminated at run time.
///
/// `tindex` is an `i8`: 0 means the value lives in `boxed`, `k` in
/// `1..=N` means it is the `k`-th unboxable member and its bits are in
/// `data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnionVal {
    pub tindex: ValueId,
    /// Payload buffer sized for the largest unboxable member; absent when
    /// every unboxable member is zero-sized.
    pub data: Option<ValueId>,
    pub tbaa: AliasTag,
    /// The boxed value when `tindex` is 0; may be null otherwise.
    pub boxed: Option<ValueId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Repr {
    Ghost,
    Constant(Constant),
    Boxed { ptr: ValueId },
    Register { val: ValueId },
    Slot(Slot),
    Split(Split),
    Union(UnionVal),
}

/// A lowered value and its static dynamic type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CgValue {
    pub ty: TypeId,
    pub repr: Repr,
}

impl CgValue {
    pub fn ghost(ty: TypeId) -> Self {
        Self {
            ty,
            repr: Repr::Ghost,
        }
    }

    /// The value of an expression that never returns.
    pub fn bottom() -> Self {
        Self::ghost(TypeId::BOTTOM)
    }

    pub fn boxed(ptr: ValueId, ty: TypeId) -> Self {
        Self {
            ty,
            repr: Repr::Boxed { ptr },
        }
    }

    pub fn register(val: ValueId, ty: TypeId) -> Self {
        Self {
            ty,
            repr: Repr::Register { val },
        }
    }

    pub fn slot(ptr: ValueId, ty: TypeId, tbaa: AliasTag) -> Self {
        Self {
            ty,
            repr: Repr::Slot(Slot {
                ptr,
                tbaa,
                promotion: None,
            }),
        }
    }

    pub fn split(bits: Option<ValueId>, roots: SmallVec<[ValueId; 4]>, ty: TypeId) -> Self {
        Self {
            ty,
            repr: Repr::Split(Split { bits, roots }),
        }
    }

    pub fn union(u: UnionVal, ty: TypeId) -> Self {
        Self {
            ty,
            repr: Repr::Union(u),
        }
    }

    pub fn is_ghost(&self) -> bool {
        matches!(self.repr, Repr::Ghost)
    }

    pub fn is_boxed(&self) -> bool {
        matches!(self.repr, Repr::Boxed { .. })
    }

    pub fn is_bottom(&self) -> bool {
        self.ty == TypeId::BOTTOM
    }

    pub fn constant(&self) -> Option<&Constant> {
        match &self.repr {
            Repr::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Pointer to the native bits, for slot-held values.
    pub fn slot_ptr(&self) -> Option<ValueId> {
        match &self.repr {
            Repr::Slot(s) => Some(s.ptr),
            _ => None,
        }
    }

    /// Same representation, narrower static type.
    #[must_use]
    pub fn with_type(mut self, ty: TypeId) -> Self {
        self.ty = ty;
        self
    }
}

impl CodegenCx<'_> {
    /// A lowered constant.
    ///
    /// Values of zero-size types are ghosts; everything else stays a
    /// constant until an operation needs its bits or its box.
    pub fn const_value(&mut self, c: Constant) -> CgValue {
        let ty = c.static_type(self.pool);
        if self.pool.is_singleton(ty) {
            return CgValue::ghost(ty);
        }
        CgValue {
            ty,
            repr: Repr::Constant(c),
        }
    }

    /// Parameter `n` of the function, holding a value of `ty`.
    ///
    /// Parameters of boxed types are tracked pointers; unboxed types
    /// arrive as native bits.
    pub fn param_value(&mut self, n: usize, ty: TypeId) -> CgValue {
        let repr = self.type_repr(ty);
        self.debug_type(ty, repr.is_boxed());
        match repr {
            TypeRepr::Ghost => CgValue::ghost(ty),
            TypeRepr::Boxed => {
                let ptr = self.b.param(n);
                CgValue::boxed(ptr, ty)
            }
            TypeRepr::Unboxed(_) => {
                let val = self.b.param(n);
                CgValue::register(val, ty)
            }
        }
    }

    /// The IR value a function returning `ty` should return for `v`:
    /// the box for boxed types, the native bits otherwise.
    pub fn return_value(&mut self, v: &CgValue) -> Result<Option<ValueId>, crate::LowerError> {
        match self.type_repr(v.ty) {
            TypeRepr::Ghost => Ok(None),
            TypeRepr::Boxed => self.box_value(v).map(Some),
            TypeRepr::Unboxed(_) => self.unbox(v, v.ty).map(Some),
        }
    }

    /// `i8` zero-extension of an `i1`, the native form of `Bool`.
    pub(crate) fn bool_to_i8(&mut self, cond: ValueId) -> ValueId {
        self.b.zext(cond, IrType::I8, "bool")
    }
}

#[cfg(test)]
mod tests {
    use ferrule_types::TypePool;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tests_util::Harness;

    #[test]
    fn singleton_constants_are_ghosts() {
        let mut pool = TypePool::new();
        let mut h = Harness::new(&[], IrType::Void);
        let mut cx = h.cx(&mut pool);
        let v = cx.const_value(Constant::nothing());
        assert_eq!(v, CgValue::ghost(TypeId::NOTHING));
        let v = cx.const_value(Constant::i64(4));
        assert_eq!(v.ty, TypeId::INT64);
        assert_eq!(v.constant(), Some(&Constant::i64(4)));
    }

    #[test]
    fn params_follow_the_type_representation() {
        let mut pool = TypePool::new();
        let mut h = Harness::new(&[IrType::I64, IrType::TRACKED], IrType::Void);
        let mut cx = h.cx(&mut pool);
        assert!(matches!(cx.param_value(0, TypeId::INT64).repr, Repr::Register { .. }));
        assert!(cx.param_value(1, TypeId::ANY).is_boxed());
        assert!(cx.param_value(2, TypeId::NOTHING).is_ghost());
    }
}
