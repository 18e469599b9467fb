//! Boxing, unboxing, and moving native bits in and out of memory.
//!
//! # Function Categories
//!
//! - **Boxing** (`box_value`): any representation to a tracked pointer.
//!   Small integers come from the runtime's box caches or box
//!   constructors; other immutables get a fresh object, or take over
//!   their own stack slot when it is still promotable.
//! - **Unboxing** (`unbox`): any representation to the native register
//!   form of a concrete type.
//! - **Storing** (`store_bits`): write the native bits of a value to a
//!   memory location, root slots included.

use ferrule_ir::{AddressSpace, AliasTag, GlobalKind, InstId, IrType, Load, RuntimeFn, ValueId};
use ferrule_types::{abi, Constant, TypeId};
use smallvec::SmallVec;

use crate::cgval::{CgValue, Promotion, Repr, Slot, Split, UnionVal};
use crate::context::CodegenCx;
use crate::error::LowerError;
use crate::type_map::TypeRepr;

/// Path of member indices from an aggregate to one of its leaves.
type MemberPath = SmallVec<[u32; 4]>;

/// Runtime constructor boxing the native bits of `t`, if there is one.
fn box_fn(t: TypeId) -> Option<RuntimeFn> {
    Some(match t {
        TypeId::INT16 => RuntimeFn::BoxInt16,
        TypeId::UINT16 => RuntimeFn::BoxUInt16,
        TypeId::INT32 => RuntimeFn::BoxInt32,
        TypeId::UINT32 => RuntimeFn::BoxUInt32,
        TypeId::CHAR => RuntimeFn::BoxChar,
        TypeId::INT64 => RuntimeFn::BoxInt64,
        TypeId::UINT64 => RuntimeFn::BoxUInt64,
        TypeId::FLOAT32 => RuntimeFn::BoxFloat32,
        _ => return None,
    })
}

/// Little-endian bytes as an integer, at most 16 of them.
fn bytes_to_u128(bytes: &[u8]) -> u128 {
    let mut buf = [0u8; 16];
    let n = bytes.len().min(16);
    buf[..n].copy_from_slice(&bytes[..n]);
    u128::from_le_bytes(buf)
}

impl CodegenCx<'_> {
    // === Boxing ===

    /// A tracked pointer to a heap object holding `v`.
    pub fn box_value(&mut self, v: &CgValue) -> Result<ValueId, LowerError> {
        match &v.repr {
            Repr::Constant(c) => Ok(self.literal(c.clone())),
            Repr::Ghost if v.is_bottom() => Ok(self.b.const_null(AddressSpace::Tracked)),
            Repr::Ghost => Ok(self.literal(Constant::Singleton(v.ty))),
            Repr::Boxed { ptr } => Ok(*ptr),
            Repr::Union(u) => self.box_union(v.ty, u),
            Repr::Register { .. } | Repr::Slot(_) | Repr::Split(_) => self.box_bits(v),
        }
    }

    fn box_bits(&mut self, v: &CgValue) -> Result<ValueId, LowerError> {
        let t = v.ty;
        if !self.pool.is_concrete_immutable(t) {
            return Err(LowerError::Representation { op: "box", ty: t });
        }
        if matches!(t, TypeId::BOOL | TypeId::INT8 | TypeId::UINT8) {
            let bits = self.unbox(v, t)?;
            let idx = self.b.zext(bits, IrType::I64, "cacheidx");
            let cache = self.global(GlobalKind::BoxCache(t));
            let entry = self.b.index_gep(IrType::TRACKED, cache, idx, "cacheentry");
            let ps = self.ptr_size();
            return Ok(self.b.load_with(
                Load::new(IrType::TRACKED, entry, ps)
                    .tbaa(AliasTag::Const)
                    .nonnull()
                    .invariant(),
                "boxed",
            ));
        }
        if let Some(f) = box_fn(t) {
            let bits = self.unbox(v, t)?;
            return Ok(self.b.call(f, &[bits], "boxed"));
        }
        if let Repr::Slot(s) = &v.repr {
            if let Some(obj) = self.promote(s, t)? {
                return Ok(obj);
            }
        }
        let obj = self.alloc_for_type(t)?;
        let dst = self.b.addrspace_cast(obj, AddressSpace::Derived, "boxdata");
        self.store_bits(dst, t, v, AliasTag::ImmutableHeap)?;
        Ok(obj)
    }

    /// Switch over the selector, boxing each unboxable member; selector 0
    /// yields the boxed fallback (or null without one).
    fn box_union(&mut self, ty: TypeId, u: &UnionVal) -> Result<ValueId, LowerError> {
        let fallback = match u.boxed {
            Some(b) => b,
            None => self.b.const_null(AddressSpace::Tracked),
        };
        let members = self.union_small(ty);
        if members.is_empty() {
            return Ok(fallback);
        }
        let default_bb = self.b.append_block("box_union.boxed");
        let join = self.b.append_block("box_union.join");
        let cases: Vec<(u128, _)> = members
            .iter()
            .map(|&(k, _)| (u128::from(k), self.b.append_block("box_union.case")))
            .collect();
        self.b.switch(u.tindex, default_bb, &cases);

        let mut incoming = Vec::with_capacity(cases.len() + 1);
        for (&(_, m), &(_, bb)) in members.iter().zip(cases.iter()) {
            self.b.position_at_end(bb);
            let mv = self.union_member_value(u, m);
            let p = self.box_value(&mv)?;
            let end = self.b.current_block().unwrap_or(bb);
            self.b.br(join);
            incoming.push((p, end));
        }
        self.b.position_at_end(default_bb);
        self.b.br(join);
        incoming.push((fallback, default_bb));
        self.b.position_at_end(join);
        Ok(self.b.phi_from_incoming(IrType::TRACKED, &incoming, "boxed"))
    }

    /// The `m`-typed view of a union value whose selector names `m`.
    pub(crate) fn union_member_value(&mut self, u: &UnionVal, m: TypeId) -> CgValue {
        match u.data {
            Some(data) if !self.type_repr(m).is_ghost() => CgValue::slot(data, m, u.tbaa),
            _ => CgValue::ghost(m),
        }
    }

    // === Promotion ===

    /// A stack slot's address, following it to the heap if it was
    /// promoted.
    pub(crate) fn slot_ptr(&self, s: &Slot) -> ValueId {
        self.promoted.get(&s.ptr).map_or(s.ptr, |&(_, derived)| derived)
    }

    /// Mark the slot `ptr`, just created and initialized in the current
    /// block, as promotable to the heap.
    pub(crate) fn promotable_slot(&mut self, ptr: ValueId, ty: TypeId) -> CgValue {
        let mut v = CgValue::slot(ptr, ty, AliasTag::Stack);
        if let (Repr::Slot(s), Some(point)) = (&mut v.repr, self.first_use(ptr)) {
            self.promotion_rank += 1;
            s.promotion = Some(Promotion {
                point,
                rank: self.promotion_rank,
            });
        }
        v
    }

    /// First instruction of the current block that uses `v`.
    pub(crate) fn first_use(&self, v: ValueId) -> Option<InstId> {
        let block = self.b.current_block()?;
        let f = self.b.function();
        f.block_insts(block)
            .iter()
            .copied()
            .find(|&i| f.inst(i).kind.operands().contains(&v))
    }

    /// Allocate the heap object right before the slot's first use and
    /// redirect every use of the slot into it.
    ///
    /// Returns `None` when the slot was never promotable.
    pub(crate) fn promote(&mut self, s: &Slot, t: TypeId) -> Result<Option<ValueId>, LowerError> {
        if let Some(&(obj, _)) = self.promoted.get(&s.ptr) {
            return Ok(Some(obj));
        }
        let Some(p) = s.promotion else {
            return Ok(None);
        };
        if self.b.function().inst(p.point).erased {
            return Ok(None);
        }
        let Some(saved) = self.b.current_block() else {
            return Err(LowerError::Builder { op: "promote" });
        };
        self.b.position_before(p.point);
        let obj = self.alloc_for_type(t)?;
        let derived = self.b.addrspace_cast(obj, AddressSpace::Derived, "promoted");
        self.b.position_at_end(saved);
        self.b.replace_all_uses(s.ptr, derived);
        if let Some(inst) = self.b.def_inst(s.ptr) {
            self.b.erase(inst);
        }
        self.promoted.insert(s.ptr, (obj, derived));
        tracing::debug!(rank = p.rank, ty = %self.pool.format_type(t), "promoted stack slot to the heap");
        Ok(Some(obj))
    }

    // === Unboxing ===

    /// The native register form of `v`, viewed as the concrete type `to`.
    ///
    /// The caller has established that `v` holds a `to`.
    pub fn unbox(&mut self, v: &CgValue, to: TypeId) -> Result<ValueId, LowerError> {
        let ty = match self.type_repr(to) {
            TypeRepr::Unboxed(ty) => ty,
            _ => return Err(LowerError::Representation { op: "unbox", ty: to }),
        };
        let align = self.pool.layout(to).map_or(1, |l| l.alignment);
        match &v.repr {
            Repr::Constant(c) => self.const_bits(c, &ty),
            Repr::Register { val } if self.b.value_type(*val) == ty => Ok(*val),
            Repr::Register { .. } | Repr::Ghost => {
                Err(LowerError::Representation { op: "unbox", ty: v.ty })
            }
            Repr::Boxed { ptr } => Ok(self.b.load_with(
                Load::new(ty, *ptr, align).tbaa(AliasTag::ImmutableHeap),
                "unboxed",
            )),
            Repr::Slot(s) => {
                let ptr = self.slot_ptr(s);
                Ok(self
                    .b
                    .load_with(Load::new(ty, ptr, align).tbaa(s.tbaa), "unboxed"))
            }
            Repr::Split(s) => self.recombine_split(s, &ty, align),
            Repr::Union(u) => {
                let k = self.pool.box_tindex(to, v.ty);
                match (u.data, u.boxed) {
                    (Some(data), _) if k > 0 => Ok(self
                        .b
                        .load_with(Load::new(ty, data, align).tbaa(u.tbaa), "unboxed")),
                    (_, Some(boxed)) if k == 0 => Ok(self.b.load_with(
                        Load::new(ty, boxed, align).tbaa(AliasTag::ImmutableHeap),
                        "unboxed",
                    )),
                    _ => Err(LowerError::Representation { op: "unbox", ty: v.ty }),
                }
            }
        }
    }

    /// Constant bits as an IR constant; aggregates are loaded from the
    /// boxed literal.
    fn const_bits(&mut self, c: &Constant, ty: &IrType) -> Result<ValueId, LowerError> {
        if let Constant::Bits { bytes, .. } = c {
            let bits = bytes_to_u128(bytes);
            #[expect(clippy::cast_possible_truncation, reason = "floats are at most 64 bits wide")]
            match ty {
                IrType::Int(_) => return Ok(self.b.const_int(ty.clone(), bits)),
                t if t.is_float() => return Ok(self.b.const_float_bits(ty.clone(), bits as u64)),
                IrType::Ptr(a) => {
                    let addr = self.b.const_int(IrType::I64, bits);
                    return Ok(self.b.int_to_ptr(addr, *a, "constptr"));
                }
                _ => {}
            }
        }
        let align = u32::try_from(self.b.data_layout().align_of(ty)).unwrap_or(abi::HEADER_SIZE);
        let lit = self.literal(c.clone());
        Ok(self.b.load_with(
            Load::new(ty.clone(), lit, align).tbaa(AliasTag::Const),
            "constbits",
        ))
    }

    /// Rebuild the native aggregate from split bits and roots.
    fn recombine_split(&mut self, s: &Split, ty: &IrType, align: u32) -> Result<ValueId, LowerError> {
        let mut agg = match s.bits {
            Some(bits) => self
                .b
                .load_with(Load::new(ty.clone(), bits, align).tbaa(AliasTag::Stack), "bits"),
            None => self.b.undef(ty.clone()),
        };
        let mut paths = Vec::new();
        tracked_paths(ty, &mut MemberPath::new(), &mut paths);
        if paths.len() != s.roots.len() {
            return Err(LowerError::Builder { op: "recombine split value" });
        }
        for (path, &root) in paths.iter().zip(s.roots.iter()) {
            agg = self.insert_path(agg, path, root);
        }
        Ok(agg)
    }

    fn insert_path(&mut self, agg: ValueId, path: &[u32], v: ValueId) -> ValueId {
        match path {
            [] => v,
            [i] => self.b.insert_value(agg, v, *i, "withroot"),
            [i, rest @ ..] => {
                let inner = self.b.extract_value(agg, *i, "inner");
                let inner = self.insert_path(inner, rest, v);
                self.b.insert_value(agg, inner, *i, "withroot")
            }
        }
    }

    // === Storing ===

    /// Write the native bits of `v`, a value of the concrete type `t`, to
    /// `dst`.
    pub(crate) fn store_bits(
        &mut self,
        dst: ValueId,
        t: TypeId,
        v: &CgValue,
        tbaa: AliasTag,
    ) -> Result<(), LowerError> {
        let Some(layout) = self.pool.layout(t) else {
            return Err(LowerError::NotConcrete { ty: t });
        };
        let (size, align) = (layout.size, layout.alignment);
        let offsets = layout.pointer_offsets.clone();
        if size == 0 {
            return Ok(());
        }
        match &v.repr {
            Repr::Ghost => {}
            Repr::Slot(s) => {
                let src = self.slot_ptr(s);
                self.b.memcpy_bytes(dst, src, u64::from(size), align);
            }
            Repr::Boxed { ptr } if self.pool.is_concrete(v.ty) => {
                self.b.memcpy_bytes(dst, *ptr, u64::from(size), align);
            }
            Repr::Split(s) => {
                if let Some(bits) = s.bits {
                    self.b.memcpy_bytes(dst, bits, u64::from(size), align);
                }
                let ps = self.ptr_size();
                for (&off, &root) in offsets.iter().zip(s.roots.iter()) {
                    let at = self.b.gep_bytes(dst, u64::from(off), "rootslot");
                    self.b.store(root, at, ps, Some(tbaa));
                }
            }
            _ => {
                let bits = self.unbox(v, t)?;
                self.b.store(bits, dst, align, Some(tbaa));
            }
        }
        Ok(())
    }
}

/// Member paths to every tracked pointer in `ty`, in layout order.
fn tracked_paths(ty: &IrType, prefix: &mut MemberPath, out: &mut Vec<MemberPath>) {
    match ty {
        IrType::Ptr(a) if a.is_gc() => out.push(prefix.clone()),
        IrType::Struct(ms) => {
            for (i, m) in ms.iter().enumerate() {
                let Ok(i) = u32::try_from(i) else { return };
                prefix.push(i);
                tracked_paths(m, prefix, out);
                prefix.pop();
            }
        }
        IrType::Array(n, e) if e.has_tracked_pointers() => {
            for i in 0..*n {
                prefix.push(i);
                tracked_paths(e, prefix, out);
                prefix.pop();
            }
        }
        _ => {}
    }
}
