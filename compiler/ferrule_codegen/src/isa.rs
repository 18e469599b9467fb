//! Type tests: `isa`, `typeassert`, `typecheck`, `concretecheck`.
//!
//! # Strategy cascade
//!
//! `emit_isa` tries, in order, and takes the first strategy that applies:
//!
//! 1. static subtype (or a constant operand): compile-time answer
//! 2. empty intersection: compile-time `false`
//! 3. `Type{T}` test: identity against the one instance
//! 4. `Type` test: the tag is one of the four kinds
//! 5. type values hiding behind non-kind types: runtime `isa`
//! 6. concrete intersection: one tag comparison (`exactly_isa`)
//! 7. single type name: compare the name of the value's type
//! 8. small union of the above: short-circuit chain
//! 9. otherwise: runtime `isa`
//!
//! Every test returns `(i1, handled)`. `handled` means a requested error
//! has already been emitted (unconditionally, or by the runtime assert),
//! so the caller must not branch on the result.

use ferrule_ir::{AliasTag, GlobalKind, IrType, Load, RuntimeFn, ValueId};
use ferrule_types::{abi, TypeId, TypeKind};

use crate::cgval::{CgValue, Repr};
use crate::context::CodegenCx;
use crate::error::LowerError;
use crate::type_map::TypeRepr;

/// Message that makes a failed runtime fallback raise through the
/// runtime's own assert.
pub const TYPEASSERT: &str = "typeassert";

impl CodegenCx<'_> {
    /// `v isa t`, raising `TypeError(msg, t, v)` on failure when `msg` is
    /// given and the failure is decided here.
    pub fn emit_isa(
        &mut self,
        v: &CgValue,
        t: TypeId,
        msg: Option<&str>,
    ) -> Result<(ValueId, bool), LowerError> {
        // 1. known answer
        let known = match v.constant() {
            // A type value is also an instance of its own `Type{T}`.
            Some(c) => {
                let ct = c.static_type(self.pool);
                Some(self.pool.subtype(ct, t))
            }
            None if self.pool.subtype(v.ty, t) => Some(true),
            None => None,
        };
        if let Some(answer) = known {
            return self.known_isa(v, t, answer, msg);
        }

        // 2. disjoint
        let it = self.pool.intersect(v.ty, t);
        if it == TypeId::BOTTOM {
            return self.known_isa(v, t, false, msg);
        }

        // 3. unique instance
        if let TypeKind::TypeOf(inner) = *self.pool.kind(t) {
            tracing::trace!(ty = %self.pool.format_type(t), "isa by identity");
            let boxed = self.box_value(v)?;
            let instance = self.type_object(inner);
            return Ok((self.b.icmp_eq(boxed, instance, "isa"), false));
        }

        // 4. any type value
        if t == TypeId::TYPE {
            let tag = self.emit_tagfrom(v)?;
            let mut any = self.b.const_i1(false);
            for kind in [
                TypeId::DATATYPE,
                TypeId::UNION_KIND,
                TypeId::UNIONALL,
                TypeId::TYPEOFBOTTOM,
            ] {
                let k = self.emit_tagfrom_type(kind);
                let is_k = self.b.icmp_eq(tag, k, "iskind");
                any = self.b.or(any, is_k, "isa");
            }
            return Ok((any, false));
        }

        // 5. type values the tag cannot see
        if self.pool.has_intersect_type_not_kind(t) || self.pool.has_intersect_type_not_kind(it) {
            return self.runtime_isa(v, t, msg);
        }

        // 6. one concrete candidate
        if self.pool.is_concrete(it) {
            return Ok((self.exactly_isa(v, it)?, false));
        }

        // 7. name test
        if self.pool.is_name_test(it) {
            if let Some(name) = self.pool.name_id(it) {
                tracing::trace!(ty = %self.pool.format_type(it), "isa by type name");
                let ty = self.emit_typeof(v)?;
                let ty = self.box_value(&ty)?;
                let at = self.b.gep_bytes(ty, u64::from(abi::type_object::NAME_OFFSET), "nameaddr");
                let actual = self.b.load_with(
                    Load::new(IrType::TRACKED, at, self.ptr_size())
                        .tbaa(AliasTag::Const)
                        .nonnull(),
                    "typename",
                );
                let expected = self.global(GlobalKind::TypeName(name));
                return Ok((self.b.icmp_eq(actual, expected, "isa"), false));
            }
        }

        // 8. chain over a small union
        if self.pool.can_optimize_isa_union(it) {
            return Ok((self.isa_union_chain(v, it)?, false));
        }

        // 9. runtime
        self.runtime_isa(v, t, msg)
    }

    fn known_isa(
        &mut self,
        v: &CgValue,
        t: TypeId,
        answer: bool,
        msg: Option<&str>,
    ) -> Result<(ValueId, bool), LowerError> {
        let c = self.b.const_i1(answer);
        match msg {
            Some(msg) if !answer => {
                self.emit_type_error(msg, t, v)?;
                Ok((c, true))
            }
            _ => Ok((c, false)),
        }
    }

    fn runtime_isa(
        &mut self,
        v: &CgValue,
        t: TypeId,
        msg: Option<&str>,
    ) -> Result<(ValueId, bool), LowerError> {
        tracing::debug!(ty = %self.pool.format_type(t), "isa through the runtime");
        let boxed = self.box_value(v)?;
        let ty = self.type_object(t);
        if msg == Some(TYPEASSERT) {
            self.b.call(RuntimeFn::TypeAssert, &[boxed, ty], "");
            let ok = self.b.const_i1(true);
            return Ok((ok, true));
        }
        let r = self.b.call(RuntimeFn::IsA, &[boxed, ty], "isa.rt");
        let zero = self.b.const_i32(0);
        Ok((self.b.icmp_ne(r, zero, "isa"), false))
    }

    fn isa_union_chain(&mut self, v: &CgValue, it: TypeId) -> Result<ValueId, LowerError> {
        let members = self.pool.union_members(it);
        let join = self.b.append_block("isa.join");
        let mut incoming = Vec::with_capacity(members.len());
        let last = members.len().saturating_sub(1);
        for (i, &m) in members.iter().enumerate() {
            let (is_m, _) = self.emit_isa(v, m, None)?;
            let Some(here) = self.b.current_block() else {
                return Err(LowerError::Builder { op: "isa chain" });
            };
            if i == last {
                incoming.push((is_m, here));
                self.b.br(join);
            } else {
                let t = self.b.const_i1(true);
                incoming.push((t, here));
                let next = self.b.append_block("isa.next");
                self.b.cond_br(is_m, join, next);
                self.b.position_at_end(next);
            }
        }
        self.b.position_at_end(join);
        Ok(self.b.phi_from_incoming(IrType::I1, &incoming, "isa"))
    }

    /// `typeof(v) === t` for the concrete `t`.
    pub fn exactly_isa(&mut self, v: &CgValue, t: TypeId) -> Result<ValueId, LowerError> {
        match &v.repr {
            Repr::Constant(c) => {
                let same = c.runtime_type(self.pool) == t;
                Ok(self.b.const_i1(same))
            }
            Repr::Union(u) => {
                let k = self.pool.box_tindex(t, v.ty);
                if k > 0 {
                    let kv = self.b.const_i8(k);
                    return Ok(self.b.icmp_eq(u.tindex, kv, "isa"));
                }
                let Some(boxed) = u.boxed else {
                    return Ok(self.b.const_i1(false));
                };
                let zero = self.b.const_i8(0);
                let is_boxed = self.b.icmp_eq(u.tindex, zero, "isboxed");
                let nonnull = self.b.is_nonzero(boxed, "nonnull");
                let live = self.b.and(is_boxed, nonnull, "live");
                let no = self.b.const_i1(false);
                self.guarded_value(live, no, "isa.boxed", |cx| {
                    let tag = cx.tag_word(boxed);
                    let want = cx.emit_tagfrom_type(t);
                    Ok(cx.b.icmp_eq(tag, want, "isa"))
                })
            }
            Repr::Boxed { ptr } if !self.pool.is_concrete(v.ty) => {
                let tag = self.tag_word(*ptr);
                let want = self.emit_tagfrom_type(t);
                Ok(self.b.icmp_eq(tag, want, "isa"))
            }
            _ => Ok(self.b.const_i1(v.ty == t)),
        }
    }

    // === Checks ===

    /// Raise `TypeError(msg, t, v)` unless `v isa t`.
    pub fn typecheck(&mut self, v: &CgValue, t: TypeId, msg: &str) -> Result<(), LowerError> {
        let (ok, handled) = self.emit_isa(v, t, Some(msg))?;
        if handled {
            return Ok(());
        }
        self.type_error_unless(ok, msg, t, v)
    }

    /// `v::t`: check, then continue with `v` narrowed to `t`.
    pub fn typeassert(&mut self, v: &CgValue, t: TypeId) -> Result<CgValue, LowerError> {
        self.typecheck(v, t, TYPEASSERT)?;
        let it = self.pool.intersect(v.ty, t);
        self.narrow(v, it)
    }

    /// `v` viewed at the narrower static type `to`, which the caller has
    /// established.
    pub(crate) fn narrow(&mut self, v: &CgValue, to: TypeId) -> Result<CgValue, LowerError> {
        if to == v.ty {
            return Ok(v.clone());
        }
        if to == TypeId::BOTTOM {
            return Ok(CgValue::bottom());
        }
        match (&v.repr, self.type_repr(to)) {
            (_, TypeRepr::Ghost) => Ok(CgValue::ghost(to)),
            (Repr::Union(u), _) => {
                let k = self.pool.box_tindex(to, v.ty);
                if k > 0 {
                    let u = u.clone();
                    return Ok(self.union_member_value(&u, to));
                }
                let boxed = self.box_value(v)?;
                Ok(CgValue::boxed(boxed, to))
            }
            (Repr::Boxed { .. } | Repr::Constant(_), _) => Ok(v.clone().with_type(to)),
            (_, TypeRepr::Boxed) => {
                let boxed = self.box_value(v)?;
                Ok(CgValue::boxed(boxed, to))
            }
            (_, TypeRepr::Unboxed(_)) => Ok(v.clone().with_type(to)),
        }
    }

    /// Raise `msg` unless the type object `ty` describes a concrete type.
    pub fn concretecheck(&mut self, ty: ValueId, msg: &str) -> Result<(), LowerError> {
        let at = self.b.gep_bytes(ty, u64::from(abi::type_object::FLAGS_OFFSET), "flagsaddr");
        let flags = self.b.load_with(
            Load::new(IrType::I8, at, 1).tbaa(AliasTag::Const),
            "typeflags",
        );
        let bit = self.b.const_i8(abi::type_object::FLAG_CONCRETE);
        let masked = self.b.and(flags, bit, "isconcrete");
        let ok = self.b.is_nonzero(masked, "isconcrete");
        self.error_unless(ok, msg)
    }
}
