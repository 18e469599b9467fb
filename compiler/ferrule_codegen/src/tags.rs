//! Type tags and `typeof`.
//!
//! Every heap object is preceded by a header word whose upper bits name
//! its type: either a small tag (`k << 4` for one of the built-in types)
//! or the address of the type object itself. The low four bits are GC
//! state and are masked off before any comparison.

use ferrule_ir::{AddressSpace, AliasTag, GlobalKind, IrType, Load, ValueId};
use ferrule_types::{abi, Constant, TypeId};

use crate::cgval::{CgValue, Repr, UnionVal};
use crate::context::CodegenCx;
use crate::error::LowerError;

impl CodegenCx<'_> {
    // === Tags ===

    /// Header tag word of the object at `obj`, GC bits cleared.
    pub(crate) fn tag_word(&mut self, obj: ValueId) -> ValueId {
        let minus = self.b.const_i64(-i64::from(abi::HEADER_SIZE));
        let header = self.b.gep(obj, minus, "header");
        let word = self.b.load_with(
            Load::new(IrType::I64, header, abi::HEADER_SIZE).tbaa(AliasTag::TypeTag),
            "tagword",
        );
        let mask = self.b.const_int(IrType::I64, u128::from(abi::TAG_MASK));
        self.b.and(word, mask, "tag")
    }

    /// The tag word every instance of the concrete type `t` carries.
    pub fn emit_tagfrom_type(&mut self, t: TypeId) -> ValueId {
        if let Some(tag) = self.pool.smalltag(t) {
            return self.b.const_i64(small_tag(tag));
        }
        let obj = self.type_object(t);
        self.b.ptr_to_int(obj, IrType::I64, "typetag")
    }

    /// The tag word of the value `v`, without boxing it.
    pub fn emit_tagfrom(&mut self, v: &CgValue) -> Result<ValueId, LowerError> {
        match &v.repr {
            Repr::Union(u) => self.union_tag(v.ty, u),
            Repr::Boxed { ptr } if !self.pool.is_concrete(v.ty) => Ok(self.tag_word(*ptr)),
            Repr::Constant(c) => {
                let t = c.runtime_type(self.pool);
                Ok(self.emit_tagfrom_type(t))
            }
            _ if self.pool.is_concrete(v.ty) => Ok(self.emit_tagfrom_type(v.ty)),
            _ => Err(LowerError::Representation {
                op: "tagfrom",
                ty: v.ty,
            }),
        }
    }

    /// Select over the selector: one constant tag per unboxable member,
    /// the boxed value's header when the selector is 0.
    fn union_tag(&mut self, ty: TypeId, u: &UnionVal) -> Result<ValueId, LowerError> {
        let zero = self.b.const_i64(0);
        let mut tag = match u.boxed {
            Some(boxed) => {
                let z = self.b.const_i8(0);
                let is_boxed = self.b.icmp_eq(u.tindex, z, "isboxed");
                self.guarded_value(is_boxed, zero, "boxedtag", |cx| Ok(cx.tag_word(boxed)))?
            }
            None => zero,
        };
        for (k, m) in self.union_small(ty) {
            let kv = self.b.const_i8(k);
            let is_k = self.b.icmp_eq(u.tindex, kv, "istype");
            let mtag = self.emit_tagfrom_type(m);
            tag = self.b.select(is_k, mtag, tag, "tag");
        }
        Ok(tag)
    }

    /// The unboxable members of union `t` with their 1-based selectors.
    pub(crate) fn union_small(&self, t: TypeId) -> Vec<(u8, TypeId)> {
        let mut out = Vec::new();
        self.pool.for_each_union_small(t, |k, m| out.push((k, m)));
        out
    }

    // === typeof ===

    /// The type object named by a tag word.
    pub(crate) fn typeof_from_tag(&mut self, tag: ValueId) -> Result<ValueId, LowerError> {
        let big = self.b.int_to_ptr(tag, AddressSpace::Tracked, "typeptr");
        let limit = self.b.const_i64(small_tag(abi::MAX_TAGS));
        let is_small = self.b.icmp_ult(tag, limit, "issmall");
        self.guarded_value(is_small, big, "smalltypeof", |cx| {
            let table = cx.global(GlobalKind::SmallTypeofTable);
            let entry = cx.b.gep(table, tag, "entry");
            Ok(cx.b.load_with(
                Load::new(IrType::TRACKED, entry, abi::HEADER_SIZE)
                    .tbaa(AliasTag::Const)
                    .nonnull()
                    .invariant(),
                "smalltype",
            ))
        })
    }

    /// `typeof(v)`: a constant when the static type is concrete, a tag
    /// lookup otherwise.
    pub fn emit_typeof(&mut self, v: &CgValue) -> Result<CgValue, LowerError> {
        let static_exact = match &v.repr {
            Repr::Union(_) => None,
            Repr::Constant(c) => Some(c.runtime_type(self.pool)),
            _ if self.pool.is_concrete(v.ty) => Some(v.ty),
            _ => None,
        };
        if let Some(t) = static_exact {
            return Ok(self.const_value(Constant::Type(t)));
        }
        let tag = self.emit_tagfrom(v)?;
        let ty = self.typeof_from_tag(tag)?;
        Ok(CgValue::boxed(ty, TypeId::DATATYPE))
    }

    // === Bool ===

    /// The boxed `Bool` for an `i1`.
    pub fn julia_bool(&mut self, cond: ValueId) -> ValueId {
        let t = self.literal(Constant::bool(true));
        let f = self.literal(Constant::bool(false));
        self.b.select(cond, t, f, "bool")
    }
}

fn small_tag(tag: u32) -> i64 {
    i64::try_from(abi::small_tag_word(tag)).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use ferrule_rt::{Interpreter, RtValue};
    use ferrule_types::TypePool;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tests_util::Harness;

    #[test]
    fn concrete_typeof_is_a_constant() {
        let mut pool = TypePool::new();
        let mut h = Harness::new(&[IrType::I64], IrType::Void);
        let mut cx = h.cx(&mut pool);
        let x = cx.param_value(0, TypeId::INT64);
        let t = cx.emit_typeof(&x).unwrap();
        assert_eq!(t.constant(), Some(&Constant::Type(TypeId::INT64)));
    }

    #[test]
    fn typeof_of_boxed_values_reads_the_header() {
        let mut pool = TypePool::new();
        let mut h = Harness::new(&[IrType::TRACKED], IrType::TRACKED);
        let mut cx = h.cx(&mut pool);
        let x = cx.param_value(0, TypeId::ANY);
        let t = cx.emit_typeof(&x).unwrap();
        let ret = cx.return_value(&t).unwrap().unwrap();
        cx.b.ret(ret);
        cx.finish().unwrap();

        let mut interp = Interpreter::new(&h.module, &pool);
        let rt = interp.runtime_mut();
        let small = rt.box_i64(3).unwrap();
        let float = rt.box_f64(1.5).unwrap();
        let int_ty = rt.type_object(TypeId::INT64).unwrap();
        let float_ty = rt.type_object(TypeId::FLOAT64).unwrap();
        assert_eq!(interp.call(h.func, &[RtValue::Ptr(small)]), Ok(RtValue::Ptr(int_ty)));
        assert_eq!(interp.call(h.func, &[RtValue::Ptr(float)]), Ok(RtValue::Ptr(float_ty)));
    }

    #[test]
    fn julia_bool_selects_the_boxed_constants() {
        let mut pool = TypePool::new();
        let mut h = Harness::new(&[IrType::I64], IrType::TRACKED);
        let mut cx = h.cx(&mut pool);
        let x = cx.b.param(0);
        let zero = cx.b.const_i64(0);
        let c = cx.b.icmp_ne(x, zero, "c");
        let b = cx.julia_bool(c);
        cx.b.ret(b);
        cx.finish().unwrap();

        let mut interp = Interpreter::new(&h.module, &pool);
        let yes = interp.call(h.func, &[RtValue::i64(5)]).unwrap().as_ptr().unwrap();
        let no = interp.call(h.func, &[RtValue::i64(0)]).unwrap().as_ptr().unwrap();
        let rt = interp.runtime();
        assert_eq!(rt.payload(yes).unwrap(), vec![1]);
        assert_eq!(rt.payload(no).unwrap(), vec![0]);
    }
}
