//! `Memory{T}`: allocation, length, and element references.
//!
//! A memory object is a length word and a data pointer. Small buffers
//! live inline right after those two words; larger ones come from
//! `alloc_genericmemory_unchecked`. Inline-union element types keep one
//! selector byte per element after the element data, stored as the
//! member index minus one so a zero-filled buffer holds the first
//! member.

use ferrule_ir::{AddressSpace, AliasTag, AtomicOrdering, GlobalKind, IrType, Load, RuntimeFn, ValueId};
use ferrule_types::abi::memory_object;
use ferrule_types::{MemoryLayout, TypeId};

use crate::cgval::{CgValue, UnionVal};
use crate::context::CodegenCx;
use crate::error::LowerError;
use crate::guard::BoundsTarget;

const MEMORYNEW: &str = "memorynew";
const BAD_SIZE: &str = "invalid GenericMemory size: the number of elements is either negative or too large for system address width";

/// An element reference into a memory object.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryRef {
    /// The boxed memory, which keeps `data` alive.
    pub mem: ValueId,
    /// Address of the element, or its 0-based index for inline-union and
    /// zero-size element types.
    pub data: ValueId,
    /// The memory type.
    pub ty: TypeId,
}

impl CodegenCx<'_> {
    fn memory_layout_of(&self, ty: TypeId) -> Result<MemoryLayout, LowerError> {
        self.pool
            .datatype(ty)
            .and_then(|dt| dt.memory_layout())
            .copied()
            .ok_or(LowerError::Representation { op: "memory", ty })
    }

    // === Allocation ===

    /// A fresh `ty` (a `Memory{T}` type) of `nel` elements.
    ///
    /// Zero elements yield the type's shared empty instance. Negative
    /// lengths and byte counts that overflow raise `ArgumentError`.
    pub fn memorynew(&mut self, ty: TypeId, nel: &CgValue) -> Result<CgValue, LowerError> {
        let ml = self.memory_layout_of(ty)?;
        self.typecheck(nel, TypeId::INT64, MEMORYNEW)?;
        let it = self.pool.intersect(nel.ty, TypeId::INT64);
        let nel = self.narrow(nel, it)?;
        if nel.is_bottom() {
            return Ok(nel);
        }
        tracing::trace!(ty = %self.pool.format_type(ty), "memorynew");
        if let Some(n) = nel.constant().and_then(|c| c.bits_u64()) {
            #[expect(clippy::cast_possible_wrap, reason = "Int64 bits reinterpreted")]
            return self.const_len_memorynew(ty, &ml, n as i64);
        }
        self.dynamic_memorynew(ty, &ml, &nel)
    }

    fn const_len_memorynew(
        &mut self,
        ty: TypeId,
        ml: &MemoryLayout,
        nel: i64,
    ) -> Result<CgValue, LowerError> {
        if nel == 0 {
            let empty = self.global(GlobalKind::EmptyMemory(ty));
            return Ok(CgValue::boxed(empty, ty));
        }
        let Some(nbytes) = const_nbytes(ml, nel) else {
            let no = self.b.const_i1(false);
            self.argument_check(no, BAD_SIZE)?;
            return Ok(CgValue::bottom());
        };
        let total = nbytes + u64::from(memory_object::INLINE_DATA_OFFSET);
        let nbytes_v = self.b.const_usize(nbytes);
        let obj = match u32::try_from(total) {
            Ok(total) if total <= self.opts.max_pooled_size => {
                let tag = self.emit_tagfrom_type(ty);
                let obj = self.alloc_obj(total, tag);
                let base = self.b.addrspace_cast(obj, AddressSpace::Derived, "memory");
                let data = self.b.gep_bytes(
                    base,
                    u64::from(memory_object::INLINE_DATA_OFFSET),
                    "memory_data",
                );
                let data = self.to_generic(data);
                let at = self
                    .b
                    .gep_bytes(base, u64::from(memory_object::DATA_OFFSET), "memory_ptr");
                let ps = self.ptr_size();
                self.b.store(data, at, ps, Some(AliasTag::MemoryPtr));
                obj
            }
            _ => self.alloc_memory_unchecked(ty, nbytes_v),
        };
        let nel_v = self.b.const_i64(nel);
        self.init_memory(obj, ml, nbytes_v, nel_v);
        Ok(CgValue::boxed(obj, ty))
    }

    fn dynamic_memorynew(
        &mut self,
        ty: TypeId,
        ml: &MemoryLayout,
        nel: &CgValue,
    ) -> Result<CgValue, LowerError> {
        let n = self.unbox(nel, TypeId::INT64)?;
        let zero = self.b.const_i64(0);
        let is_empty = self.b.icmp_eq(n, zero, "memorynew_empty");
        let empty_bb = self.b.append_block("emptymem");
        let alloc_bb = self.b.append_block("nonemptymem");
        let done_bb = self.b.append_block("retval");
        self.b.cond_br(is_empty, empty_bb, alloc_bb);

        self.b.position_at_end(empty_bb);
        let empty = self.global(GlobalKind::EmptyMemory(ty));
        self.b.br(done_bb);

        self.b.position_at_end(alloc_bb);
        let elsize = self.b.const_i64(i64::from(ml.elsize));
        let prod = self.b.smul_overflow(n, elsize, "nbytes");
        let mut nbytes = self.b.extract_value(prod, 0, "nbytes");
        let mut overflow = self.b.extract_value(prod, 1, "overflow");
        if ml.isunion {
            let sum = self.b.sadd_overflow(n, nbytes, "nbytes");
            nbytes = self.b.extract_value(sum, 0, "nbytes");
            let o = self.b.extract_value(sum, 1, "overflow");
            overflow = self.b.or(overflow, o, "overflow");
        }
        let negative = self.b.icmp_slt(n, zero, "negative");
        overflow = self.b.or(overflow, negative, "overflow");
        let limit = self.b.const_i64(i64::MAX - 1);
        let size = if ml.elsize == 0 { n } else { nbytes };
        let too_big = self.b.icmp_slt(limit, size, "toobig");
        overflow = self.b.or(overflow, too_big, "overflow");
        let ok = self.b.not(overflow, "sizeok");
        self.argument_check(ok, BAD_SIZE)?;
        let obj = self.alloc_memory_unchecked(ty, nbytes);
        self.init_memory(obj, ml, nbytes, n);
        let Some(alloc_end) = self.b.current_block() else {
            return Err(LowerError::Builder { op: MEMORYNEW });
        };
        self.b.br(done_bb);

        self.b.position_at_end(done_bb);
        let mem = self.b.phi_from_incoming(
            IrType::TRACKED,
            &[(empty, empty_bb), (obj, alloc_end)],
            "memory",
        );
        Ok(CgValue::boxed(mem, ty))
    }

    /// `alloc_genericmemory_unchecked(ptls, nbytes, ty)`; the data pointer
    /// is set, the length is not.
    fn alloc_memory_unchecked(&mut self, ty: TypeId, nbytes: ValueId) -> ValueId {
        let ptls = self.ptls();
        let tyobj = self.type_object(ty);
        self.b
            .call(RuntimeFn::AllocGenericMemoryUnchecked, &[ptls, nbytes, tyobj], "memory")
    }

    /// Store the length and zero the data when the element type needs it.
    fn init_memory(&mut self, obj: ValueId, ml: &MemoryLayout, nbytes: ValueId, nel: ValueId) {
        let ps = self.ptr_size();
        let base = self.b.addrspace_cast(obj, AddressSpace::Derived, "memory");
        let len_at = self
            .b
            .gep_bytes(base, u64::from(memory_object::LENGTH_OFFSET), "memory_len");
        self.b.store(nel, len_at, ps, Some(AliasTag::MemoryLen));
        if ml.zeroinit {
            let data = self.load_memory_data(base);
            self.b.memset(data, 0, nbytes, ps);
        }
    }

    // === Access ===

    /// The element count of the boxed memory `mem`.
    pub fn memory_len(&mut self, mem: &CgValue) -> Result<ValueId, LowerError> {
        let obj = self.box_value(mem)?;
        let base = self.b.addrspace_cast(obj, AddressSpace::Derived, "memory");
        let at = self
            .b
            .gep_bytes(base, u64::from(memory_object::LENGTH_OFFSET), "memory_len");
        let ps = self.ptr_size();
        Ok(self.b.load_with(
            Load::new(IrType::I64, at, ps)
                .tbaa(AliasTag::MemoryLen)
                .invariant()
                .range(0, i64::MAX.unsigned_abs()),
            "memory_len",
        ))
    }

    fn load_memory_data(&mut self, base: ValueId) -> ValueId {
        let ps = self.ptr_size();
        let at = self
            .b
            .gep_bytes(base, u64::from(memory_object::DATA_OFFSET), "memory_ptr");
        self.b.load_with(
            Load::new(IrType::PTR, at, ps)
                .tbaa(AliasTag::MemoryPtr)
                .invariant()
                .nonnull(),
            "memory_data",
        )
    }

    /// A reference to element `idx` (1-based `Int64`) of `mem`, checked
    /// against the length unless `inbounds` lets the options skip it.
    pub fn memoryref(
        &mut self,
        mem: &CgValue,
        idx: &CgValue,
        inbounds: bool,
    ) -> Result<MemoryRef, LowerError> {
        let ml = self.memory_layout_of(mem.ty)?;
        let obj = self.box_value(mem)?;
        let i = self.unbox(idx, TypeId::INT64)?;
        let one = self.b.const_i64(1);
        let idx0 = self.b.sub(i, one, "idx0");
        let len = self.memory_len(mem)?;
        self.bounds_check(BoundsTarget::Boxed(obj), mem.ty, idx0, len, inbounds)?;
        let data = if ml.isunion || ml.elsize == 0 {
            idx0
        } else {
            let base = self.b.addrspace_cast(obj, AddressSpace::Derived, "memory");
            let start = self.load_memory_data(base);
            let elsize = self.b.const_i64(i64::from(ml.elsize));
            let off = self.b.mul(idx0, elsize, "offset");
            self.b.gep(start, off, "memoryref_data")
        };
        Ok(MemoryRef {
            mem: obj,
            data,
            ty: mem.ty,
        })
    }

    /// The element `r` refers to.
    pub fn memoryref_get(&mut self, r: &MemoryRef) -> Result<CgValue, LowerError> {
        let ml = self.memory_layout_of(r.ty)?;
        let elem = ml.elem;
        if ml.isboxed {
            let p = self.b.load_with(
                Load::new(IrType::TRACKED, r.data, self.opts.pointer_size)
                    .tbaa(AliasTag::Value)
                    .order(AtomicOrdering::Unordered),
                "memoryref",
            );
            self.null_check(p, None)?;
            return Ok(CgValue::boxed(p, elem));
        }
        if ml.elsize == 0 && !ml.isunion {
            return Ok(CgValue::ghost(elem));
        }
        if ml.isunion {
            return self.union_element(r, &ml);
        }
        if let Some(off) = self.pool.layout(elem).and_then(|l| l.first_ptr()) {
            let at = self.b.gep_bytes(r.data, u64::from(off), "firstptr");
            let p = self.b.load_with(
                Load::new(IrType::TRACKED, at, self.opts.pointer_size)
                    .tbaa(AliasTag::Value)
                    .order(AtomicOrdering::Unordered),
                "firstptr",
            );
            self.null_check(p, None)?;
        }
        let ty = self.ir_type(elem);
        let v = self
            .b
            .load_with(Load::new(ty, r.data, ml.elalign).tbaa(AliasTag::Value), "memoryref");
        Ok(CgValue::register(v, elem))
    }

    /// Selector and payload of an inline-union element, copied out of the
    /// buffer.
    fn union_element(&mut self, r: &MemoryRef, ml: &MemoryLayout) -> Result<CgValue, LowerError> {
        let base = self.b.addrspace_cast(r.mem, AddressSpace::Derived, "memory");
        let start = self.load_memory_data(base);
        let len = {
            let m = CgValue::boxed(r.mem, r.ty);
            self.memory_len(&m)?
        };
        let elsize = self.b.const_i64(i64::from(ml.elsize));
        let sel_base = self.b.mul(len, elsize, "selectors");
        let sel_off = self.b.add(sel_base, r.data, "selector");
        let sel_at = self.b.gep(start, sel_off, "selector");
        let (n, _) = self.pool.count_union_small(ml.elem);
        let stored = self.b.load_with(
            Load::new(IrType::I8, sel_at, 1)
                .tbaa(AliasTag::UnionSelByte)
                .range(0, u64::from(n)),
            "selector",
        );
        let one = self.b.const_i8(1);
        let tindex = self.b.add(stored, one, "tindex");
        if ml.elsize == 0 {
            return Ok(CgValue::union(
                UnionVal {
                    tindex,
                    data: None,
                    tbaa: AliasTag::Stack,
                    boxed: None,
                },
                ml.elem,
            ));
        }
        let off = self.b.mul(r.data, elsize, "offset");
        let src = self.b.gep(start, off, "payload");
        let tmp = self.b.alloca(
            IrType::Array(ml.elsize, Box::new(IrType::I8)),
            ml.elalign,
            "unionelem",
        );
        self.b.memcpy_bytes(tmp, src, u64::from(ml.elsize), ml.elalign);
        Ok(CgValue::union(
            UnionVal {
                tindex,
                data: Some(tmp),
                tbaa: AliasTag::Stack,
                boxed: None,
            },
            ml.elem,
        ))
    }
}

/// Data bytes for `nel` elements, or `None` when the count is negative or
/// the size does not fit.
fn const_nbytes(ml: &MemoryLayout, nel: i64) -> Option<u64> {
    let n = u64::try_from(nel).ok()?;
    let mut nbytes = n.checked_mul(u64::from(ml.elsize))?;
    if ml.isunion {
        nbytes = nbytes.checked_add(n)?;
    }
    let limit = i64::MAX.unsigned_abs() - 1;
    (n < limit && nbytes < limit).then_some(nbytes)
}
