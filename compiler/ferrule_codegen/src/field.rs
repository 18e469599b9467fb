//! Field reads.
//!
//! # Representation dispatch
//!
//! | Struct held as | Field read                                              |
//! |----------------|---------------------------------------------------------|
//! | `Constant`     | folded, or read from the boxed literal                  |
//! | `Boxed`/`Slot` | offset-addressed load, or a deferred slot for const and |
//! |                | immutable storage                                       |
//! | `Register`     | `extractvalue` (spilled first for union fields)         |
//! | `Split`        | root list for pointers, bits buffer for the rest        |
//!
//! Pointer fields are always loaded at least `unordered`, and get a null
//! check when they may be undefined. Union fields come back as a
//! [`UnionVal`] whose payload is copied out of mutable storage so the
//! selector and the bits are read from the same snapshot.

use ferrule_ir::{AddressSpace, AliasTag, AtomicOrdering, IrType, Load, RuntimeFn, ValueId};
use ferrule_types::{Constant, Field, FieldLayout, Layout, TypeId};
use smallvec::SmallVec;

use crate::cgval::{CgValue, Repr, Split, UnionVal};
use crate::context::CodegenCx;
use crate::error::LowerError;
use crate::guard::BoundsTarget;

/// Where one field of a split value lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct SplitField {
    /// Offset of the field in the bits buffer; `None` for pointer fields
    /// and for values without a buffer.
    pub bits_offset: Option<u32>,
    /// Index of the field's first root.
    pub first_root: usize,
    /// Roots belonging to the field.
    pub nroots: usize,
}

/// Translate field `idx` of a value with `layout` to its place in the
/// split representation.
///
/// Walks the pointer slots in order with a source cursor (native layout)
/// and a destination cursor (bits buffer). Unless every byte is a
/// pointer, each removed pointer leaves a dead slot behind so the
/// destination cursor keeps pace with the source.
pub(crate) fn split_value_field(layout: &Layout, idx: usize, ptr_size: u32) -> Option<SplitField> {
    let fl = layout.field(idx)?;
    let all_pointers = layout.flags.all_pointers();
    let first_root = layout
        .pointer_offsets
        .iter()
        .take_while(|&&p| p < fl.offset)
        .count();
    let nroots = layout.pointer_offsets[first_root..]
        .iter()
        .take_while(|&&p| p < fl.offset + fl.size)
        .count();

    let (mut src, mut dst) = (0u32, 0u32);
    let mut bits_offset = None;
    let mut placed = false;
    for &p in &layout.pointer_offsets {
        if fl.offset < p || (fl.offset == p && !fl.isptr) {
            bits_offset = Some(dst + (fl.offset - src));
            placed = true;
            break;
        }
        if fl.offset == p {
            placed = true;
            break;
        }
        dst += p - src;
        src = p + ptr_size;
        if !all_pointers {
            dst += ptr_size;
        }
    }
    if !placed {
        bits_offset = Some(dst + (fl.offset - src));
    }
    if all_pointers {
        bits_offset = None;
    }
    Some(SplitField {
        bits_offset,
        first_root,
        nroots,
    })
}

/// Storage a field is read from.
#[derive(Copy, Clone, Debug)]
pub(crate) struct FieldSite {
    /// Start of the struct's bits.
    pub base: ValueId,
    pub tbaa: AliasTag,
    /// Other code may write the storage concurrently.
    pub mutable: bool,
    /// Boxed owner, for the object lock.
    pub owner: Option<ValueId>,
}

impl CodegenCx<'_> {
    // === Known index ===

    /// Field `idx` (0-based) of `strct`, read with memory order `order`.
    pub fn getfield(
        &mut self,
        strct: &CgValue,
        idx: usize,
        order: AtomicOrdering,
    ) -> Result<CgValue, LowerError> {
        let t = strct.ty;
        if strct.is_bottom() {
            return Ok(CgValue::bottom());
        }
        if !self.pool.is_concrete(t) || self.pool.layout(t).is_none() {
            return self.runtime_getfield(strct, idx);
        }
        let (Some(field), Some(fl)) = (
            self.pool.field(t, idx).cloned(),
            self.pool.layout(t).and_then(|l| l.field(idx)).copied(),
        ) else {
            return Err(LowerError::NoSuchField { ty: t, index: idx });
        };
        if field.atomic != order.is_atomic() {
            self.emit_atomic_error(if field.atomic {
                "getfield: atomic field cannot be accessed non-atomically"
            } else {
                "getfield: non-atomic field cannot be accessed atomically"
            });
            return Ok(CgValue::bottom());
        }
        let fty = field.ty;
        if !fl.isptr && !fl.isunion && self.type_repr(fty).is_ghost() {
            return Ok(CgValue::ghost(fty));
        }
        let Some(dt) = self.pool.datatype(t) else {
            return Err(LowerError::NotConcrete { ty: t });
        };
        let mutable = dt.mutable;
        let always_defined = dt.nfields().saturating_sub(dt.n_uninitialized as usize);
        let maybe_null = match strct.constant() {
            Some(c) => !c.is_defined_field(self.pool, idx),
            None => idx >= always_defined,
        };
        tracing::trace!(ty = %self.pool.format_type(t), idx, "getfield");

        match &strct.repr {
            Repr::Constant(c) => self.constant_field(c, idx, &field, &fl),
            Repr::Ghost => Ok(CgValue::ghost(fty)),
            Repr::Boxed { ptr } => {
                let base = self.b.addrspace_cast(*ptr, AddressSpace::Derived, "fields");
                let site = FieldSite {
                    base,
                    tbaa: if mutable {
                        AliasTag::MutableHeap
                    } else {
                        AliasTag::ImmutableHeap
                    },
                    mutable,
                    owner: Some(*ptr),
                };
                self.memory_field(site, &field, &fl, maybe_null, order)
            }
            Repr::Slot(s) => {
                let site = FieldSite {
                    base: self.slot_ptr(s),
                    tbaa: s.tbaa,
                    mutable,
                    owner: None,
                };
                self.memory_field(site, &field, &fl, maybe_null, order)
            }
            Repr::Register { val } => self.register_field(*val, t, idx, fty, &fl),
            Repr::Split(s) => self.split_field(s, t, idx, fty, &fl),
            Repr::Union(_) => Err(LowerError::Representation { op: "getfield", ty: t }),
        }
    }

    fn runtime_getfield(&mut self, strct: &CgValue, idx: usize) -> Result<CgValue, LowerError> {
        let Ok(i) = i64::try_from(idx) else {
            return Err(LowerError::NoSuchField {
                ty: strct.ty,
                index: idx,
            });
        };
        let i = self.b.const_i64(i);
        self.runtime_nth_field(strct, i, TypeId::ANY)
    }

    /// `get_nth_field_checked(box(strct), idx)`, typed `ty`.
    fn runtime_nth_field(
        &mut self,
        strct: &CgValue,
        idx: ValueId,
        ty: TypeId,
    ) -> Result<CgValue, LowerError> {
        tracing::debug!(ty = %self.pool.format_type(strct.ty), "getfield through the runtime");
        let boxed = self.box_value(strct)?;
        let v = self
            .b
            .call(RuntimeFn::GetNthFieldChecked, &[boxed, idx], "field");
        Ok(CgValue::boxed(v, ty))
    }

    fn constant_field(
        &mut self,
        c: &Constant,
        idx: usize,
        field: &Field,
        fl: &FieldLayout,
    ) -> Result<CgValue, LowerError> {
        if !c.is_defined_field(self.pool, idx) {
            self.raise(RuntimeFn::UndefRefError, &[]);
            return Ok(CgValue::bottom());
        }
        if let Some(fc) = c.field(self.pool, idx) {
            return Ok(self.const_value(fc));
        }
        let base = self.literal(c.clone());
        let site = FieldSite {
            base,
            tbaa: AliasTag::Const,
            mutable: false,
            owner: None,
        };
        self.memory_field(site, field, fl, false, AtomicOrdering::NotAtomic)
    }

    fn memory_field(
        &mut self,
        site: FieldSite,
        field: &Field,
        fl: &FieldLayout,
        maybe_null: bool,
        order: AtomicOrdering,
    ) -> Result<CgValue, LowerError> {
        let fty = field.ty;
        let ps = self.ptr_size();
        let addr = self.b.gep_bytes(site.base, u64::from(fl.offset), "fieldaddr");
        if fl.isptr {
            let order = order.max(AtomicOrdering::Unordered).for_load();
            let mut load = Load::new(IrType::TRACKED, addr, ps)
                .tbaa(site.tbaa)
                .order(order);
            if !maybe_null {
                load = load.nonnull();
            }
            let p = self.b.load_with(load, "field");
            if maybe_null {
                self.null_check(p, None)?;
            }
            return Ok(CgValue::boxed(p, fty));
        }
        if fl.isunion {
            return self.union_field(site, addr, fty, fl);
        }

        let Some(layout) = self.pool.layout(fty) else {
            return Err(LowerError::NotConcrete { ty: fty });
        };
        let (size, align, first_ptr) = (layout.size, layout.alignment, layout.first_ptr());
        if field.atomic {
            return Ok(self.atomic_field_copy(site, addr, fty, size, align, order));
        }
        if (!site.mutable || field.constant) && !(maybe_null && first_ptr.is_some()) {
            return Ok(CgValue::slot(addr, fty, site.tbaa));
        }
        if let (true, Some(off)) = (maybe_null, first_ptr) {
            let at = self.b.gep_bytes(addr, u64::from(off), "firstptr");
            let p = self.b.load_with(
                Load::new(IrType::TRACKED, at, ps)
                    .tbaa(site.tbaa)
                    .order(AtomicOrdering::Unordered),
                "firstptr",
            );
            self.null_check(p, None)?;
        }
        let ty = self.ir_type(fty);
        let v = self
            .b
            .load_with(Load::new(ty, addr, align).tbaa(site.tbaa), "field");
        Ok(CgValue::register(v, fty))
    }

    /// Snapshot an inline atomic field into a stack slot: one atomic load
    /// when it fits, a copy under the object lock otherwise.
    fn atomic_field_copy(
        &mut self,
        site: FieldSite,
        addr: ValueId,
        fty: TypeId,
        size: u32,
        align: u32,
        order: AtomicOrdering,
    ) -> CgValue {
        if size <= self.opts.max_atomic_size {
            let ity = IrType::Int(size * 8);
            let align = size.next_power_of_two().max(align);
            let bits = self.b.load_with(
                Load::new(ity.clone(), addr, align)
                    .tbaa(site.tbaa)
                    .order(order.for_load()),
                "atomicfield",
            );
            let tmp = self.b.alloca(ity, align, "atomicfield");
            self.b.store(bits, tmp, align, Some(AliasTag::Stack));
            return CgValue::slot(tmp, fty, AliasTag::Stack);
        }
        let tmp = self
            .b
            .alloca(IrType::Array(size, Box::new(IrType::I8)), align, "lockedfield");
        if let Some(owner) = site.owner {
            self.b.call(RuntimeFn::LockValue, &[owner], "");
            self.b.memcpy_bytes(tmp, addr, u64::from(size), align);
            self.b.call(RuntimeFn::UnlockValue, &[owner], "");
        } else {
            self.b.memcpy_bytes(tmp, addr, u64::from(size), align);
        }
        CgValue::slot(tmp, fty, AliasTag::Stack)
    }

    /// Selector byte plus payload of the inline union field at `addr`.
    pub(crate) fn union_field(
        &mut self,
        site: FieldSite,
        addr: ValueId,
        fty: TypeId,
        fl: &FieldLayout,
    ) -> Result<CgValue, LowerError> {
        let (n, _) = self.pool.count_union_small(fty);
        let data_size = fl.size - 1;
        let sel_at = self.b.gep_bytes(addr, u64::from(data_size), "selector");
        let tindex = self.b.load_with(
            Load::new(IrType::I8, sel_at, 1)
                .tbaa(AliasTag::UnionSelByte)
                .range(0, u64::from(n) + 1),
            "tindex",
        );
        let align = self.union_payload(fty).map_or(1, |(_, a)| a);
        let (data, tbaa) = match (data_size, site.mutable) {
            (0, _) => (None, site.tbaa),
            (_, true) => {
                let tmp = self.b.alloca(
                    IrType::Array(data_size, Box::new(IrType::I8)),
                    align,
                    "unionfield",
                );
                self.b.memcpy_bytes(tmp, addr, u64::from(data_size), align);
                (Some(tmp), AliasTag::Stack)
            }
            (_, false) => (Some(addr), site.tbaa),
        };
        Ok(CgValue::union(
            UnionVal {
                tindex,
                data,
                tbaa,
                boxed: None,
            },
            fty,
        ))
    }

    fn register_field(
        &mut self,
        val: ValueId,
        t: TypeId,
        idx: usize,
        fty: TypeId,
        fl: &FieldLayout,
    ) -> Result<CgValue, LowerError> {
        if self.pool.datatype(t).is_some_and(ferrule_types::DataType::is_vec_element) {
            return Ok(CgValue::register(val, fty));
        }
        let Some(sr) = self.struct_repr(t) else {
            return Err(LowerError::Representation { op: "getfield", ty: t });
        };
        let Some(m) = sr.fields.get(idx).copied() else {
            return Err(LowerError::NoSuchField { ty: t, index: idx });
        };
        if let IrType::Vector(..) = sr.ty {
            let at = self.b.const_i32(m.first);
            let v = self.b.extract_element(val, at, "field");
            return Ok(CgValue::register(v, fty));
        }
        if fl.isptr {
            let p = self.b.extract_value(val, m.first, "field");
            return Ok(CgValue::boxed(p, fty));
        }
        if fl.isunion {
            let align = self.pool.layout(t).map_or(1, |l| l.alignment);
            let tmp = self.b.alloca(sr.ty, align, "spill");
            self.b.store(val, tmp, align, Some(AliasTag::Stack));
            let site = FieldSite {
                base: tmp,
                tbaa: AliasTag::Stack,
                mutable: false,
                owner: None,
            };
            let addr = self.b.gep_bytes(tmp, u64::from(fl.offset), "fieldaddr");
            return self.union_field(site, addr, fty, fl);
        }
        let v = self.b.extract_value(val, m.first, "field");
        Ok(CgValue::register(v, fty))
    }

    fn split_field(
        &mut self,
        s: &Split,
        t: TypeId,
        idx: usize,
        fty: TypeId,
        fl: &FieldLayout,
    ) -> Result<CgValue, LowerError> {
        let ps = self.ptr_size();
        let Some(sf) = self
            .pool
            .layout(t)
            .and_then(|l| split_value_field(l, idx, ps))
        else {
            return Err(LowerError::NoSuchField { ty: t, index: idx });
        };
        if fl.isptr {
            return match s.roots.get(sf.first_root) {
                Some(&root) => Ok(CgValue::boxed(root, fty)),
                None => Err(LowerError::Representation { op: "getfield", ty: t }),
            };
        }
        let at = match (s.bits, sf.bits_offset) {
            (Some(bits), Some(off)) => Some(self.b.gep_bytes(bits, u64::from(off), "fieldbits")),
            _ => None,
        };
        if fl.isunion {
            let Some(at) = at else {
                return Err(LowerError::Representation { op: "getfield", ty: t });
            };
            let site = FieldSite {
                base: at,
                tbaa: AliasTag::Stack,
                mutable: false,
                owner: None,
            };
            return self.union_field(site, at, fty, fl);
        }
        if sf.nroots == 0 {
            return match at {
                Some(at) => Ok(CgValue::slot(at, fty, AliasTag::Stack)),
                None => Err(LowerError::Representation { op: "getfield", ty: t }),
            };
        }
        let Some(roots) = s.roots.get(sf.first_root..sf.first_root + sf.nroots) else {
            return Err(LowerError::Representation { op: "getfield", ty: t });
        };
        Ok(CgValue::split(at, roots.iter().copied().collect(), fty))
    }

    // === Computed index ===

    /// Field `idx` of `strct`, where `idx` is a 0-based `i64` known only
    /// at run time. Out-of-range indices raise a bounds error unless
    /// `inbounds` lets the configured policy skip the check.
    pub fn getfield_unknown_index(
        &mut self,
        strct: &CgValue,
        idx: ValueId,
        inbounds: bool,
    ) -> Result<CgValue, LowerError> {
        let t = strct.ty;
        let Some(dt) = self
            .pool
            .datatype(t)
            .filter(|dt| dt.concrete && dt.layout.is_some())
        else {
            return self.runtime_nth_field(strct, idx, TypeId::ANY);
        };
        let n = dt.nfields();
        if n == 0 {
            let boxed = self.box_value(strct)?;
            let one = self.b.const_i64(1);
            let index = self.b.add(idx, one, "index");
            self.raise(RuntimeFn::BoundsError, &[boxed, index]);
            return Ok(CgValue::bottom());
        }
        let ftypes: SmallVec<[TypeId; 8]> = dt.fields.iter().map(|f| f.ty).collect();
        let (mutable, atomic, n_uninit) = (dt.mutable, dt.has_atomic_fields(), dt.n_uninitialized);
        let Some(layout) = dt.layout.clone() else {
            return Err(LowerError::NotConcrete { ty: t });
        };
        let joined = self.pool.union(&ftypes);
        if atomic {
            return self.runtime_nth_field(strct, idx, joined);
        }
        let len = self.b.const_i64(i64::try_from(n).unwrap_or(i64::MAX));

        let homogeneous = ftypes.iter().all(|&f| f == ftypes[0]);
        let fl0 = layout.fields[0];
        if homogeneous && !fl0.isunion {
            let fty = ftypes[0];
            if !fl0.isptr && self.type_repr(fty).is_ghost() {
                self.bounds_check(BoundsTarget::Value(strct), t, idx, len, inbounds)?;
                return Ok(CgValue::ghost(fty));
            }
            let stride = layout.fields.get(1).map_or(fl0.size, |f1| f1.offset - fl0.offset);
            let maybe_null = n_uninit > 0;
            match &strct.repr {
                Repr::Register { val } => {
                    self.bounds_check(BoundsTarget::Value(strct), t, idx, len, inbounds)?;
                    let v = self.select_member(*val, t, idx, n)?;
                    return Ok(if fl0.isptr {
                        CgValue::boxed(v, fty)
                    } else {
                        CgValue::register(v, fty)
                    });
                }
                Repr::Boxed { ptr } => {
                    self.bounds_check(BoundsTarget::Boxed(*ptr), t, idx, len, inbounds)?;
                    let base = self.b.addrspace_cast(*ptr, AddressSpace::Derived, "fields");
                    let tbaa = if mutable {
                        AliasTag::MutableHeap
                    } else {
                        AliasTag::ImmutableHeap
                    };
                    return self.indexed_field(base, tbaa, mutable, idx, stride, fty, fl0.isptr, maybe_null);
                }
                Repr::Slot(s) => {
                    self.bounds_check(BoundsTarget::Value(strct), t, idx, len, inbounds)?;
                    let base = self.slot_ptr(s);
                    return self.indexed_field(base, s.tbaa, mutable, idx, stride, fty, fl0.isptr, maybe_null);
                }
                _ => {}
            }
        }

        // Every field a pointer: choose among the roots without touching memory.
        if layout.flags.all_pointers() {
            let chosen = match &strct.repr {
                Repr::Register { val } => {
                    self.bounds_check(BoundsTarget::Value(strct), t, idx, len, inbounds)?;
                    Some(self.select_member(*val, t, idx, n)?)
                }
                Repr::Split(s) if s.roots.len() == n => {
                    self.bounds_check(BoundsTarget::Value(strct), t, idx, len, inbounds)?;
                    Some(self.select_chain(idx, &s.roots))
                }
                _ => None,
            };
            if let Some(v) = chosen {
                return Ok(CgValue::boxed(v, joined));
            }
        }
        self.runtime_nth_field(strct, idx, joined)
    }

    /// Member `idx` of the register aggregate `val` of struct type `t`.
    fn select_member(
        &mut self,
        val: ValueId,
        t: TypeId,
        idx: ValueId,
        n: usize,
    ) -> Result<ValueId, LowerError> {
        let Some(sr) = self.struct_repr(t) else {
            return Err(LowerError::Representation { op: "getfield", ty: t });
        };
        if let IrType::Vector(..) = sr.ty {
            let i = self.b.trunc(idx, IrType::I32, "lane");
            return Ok(self.b.extract_element(val, i, "field"));
        }
        let mut members: SmallVec<[ValueId; 8]> = SmallVec::with_capacity(n);
        for m in sr.fields.iter().take(n) {
            members.push(self.b.extract_value(val, m.first, "member"));
        }
        Ok(self.select_chain(idx, &members))
    }

    /// `values[idx]` as a chain of selects; the last value is the default.
    fn select_chain(&mut self, idx: ValueId, values: &[ValueId]) -> ValueId {
        let Some((&last, rest)) = values.split_last() else {
            return idx;
        };
        let mut acc = last;
        for (i, &v) in rest.iter().enumerate().rev() {
            let k = self.b.const_i64(i64::try_from(i).unwrap_or(i64::MAX));
            let is_k = self.b.icmp_eq(idx, k, "isidx");
            acc = self.b.select(is_k, v, acc, "field");
        }
        acc
    }

    #[expect(clippy::too_many_arguments, reason = "one call site per storage kind")]
    fn indexed_field(
        &mut self,
        base: ValueId,
        tbaa: AliasTag,
        mutable: bool,
        idx: ValueId,
        stride: u32,
        fty: TypeId,
        isptr: bool,
        maybe_null: bool,
    ) -> Result<CgValue, LowerError> {
        let stride = self.b.const_i64(i64::from(stride));
        let off = self.b.mul(idx, stride, "fieldoff");
        let addr = self.b.gep(base, off, "fieldaddr");
        if isptr {
            let ps = self.ptr_size();
            let mut load = Load::new(IrType::TRACKED, addr, ps)
                .tbaa(tbaa)
                .order(AtomicOrdering::Unordered);
            if !maybe_null {
                load = load.nonnull();
            }
            let p = self.b.load_with(load, "field");
            if maybe_null {
                self.null_check(p, None)?;
            }
            return Ok(CgValue::boxed(p, fty));
        }
        if !mutable {
            return Ok(CgValue::slot(addr, fty, tbaa));
        }
        let ty = self.ir_type(fty);
        let align = self.pool.layout(fty).map_or(1, |l| l.alignment);
        let v = self.b.load_with(Load::new(ty, addr, align).tbaa(tbaa), "field");
        Ok(CgValue::register(v, fty))
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
