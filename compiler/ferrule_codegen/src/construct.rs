//! Struct construction.
//!
//! `new_struct` picks the cheapest home for a fresh value:
//!
//! | Type                              | Built as                              |
//! |-----------------------------------|---------------------------------------|
//! | zero-size                         | ghost                                 |
//! | immutable, every field constant   | constant                              |
//! | `VecElement` or vector-shaped     | register (`insertelement`)            |
//! | pointer-free immutable            | stack slot, promotable to the heap    |
//! | immutable with pointers           | split: stack bits plus a root list    |
//! | mutable                           | heap object                           |
//!
//! Trailing fields the caller leaves out are zero-filled; inline union
//! fields among them get selector 1 so they always name a valid member.

use ferrule_ir::{AddressSpace, AliasTag, AtomicOrdering, DataLayout, IrType, ValueId};
use ferrule_types::{Constant, FieldLayout, Layout, LayoutFlags, TypeId};
use smallvec::SmallVec;

use crate::alloc::Roots;
use crate::cgval::{CgValue, Repr};
use crate::context::CodegenCx;
use crate::error::LowerError;
use crate::field::split_value_field;
use crate::type_map::TypeRepr;

const NEW: &str = "new";

/// Field types of the struct being built.
type FieldTypes = SmallVec<[TypeId; 8]>;

impl CodegenCx<'_> {
    /// A fresh instance of the concrete type `ty` whose leading fields are
    /// `args`.
    ///
    /// Each argument is type-checked against its field; a failing check
    /// raises `TypeError` at run time. Fewer arguments than fields is
    /// allowed down to the type's count of always-initialized fields.
    pub fn new_struct(&mut self, ty: TypeId, args: &[CgValue]) -> Result<CgValue, LowerError> {
        let Some(dt) = self.pool.datatype(ty).filter(|_| self.pool.is_concrete(ty)) else {
            return Err(LowerError::NotConcrete { ty });
        };
        let Some(layout) = dt.layout.clone() else {
            return Err(LowerError::NotConcrete { ty });
        };
        let nf = dt.nfields();
        let required = nf.saturating_sub(dt.n_uninitialized as usize);
        let mutable = dt.mutable;
        let vec_element = dt.is_vec_element();
        let ftys: FieldTypes = dt.fields.iter().map(|f| f.ty).collect();
        if args.len() > nf || args.len() < required {
            return Err(LowerError::Arity {
                op: NEW,
                expected: nf,
                got: args.len(),
            });
        }
        tracing::trace!(ty = %self.pool.format_type(ty), nargs = args.len(), "new_struct");
        self.debug_type(ty, mutable);

        let mut vals = Vec::with_capacity(args.len());
        for (a, &fty) in args.iter().zip(&ftys) {
            self.typecheck(a, fty, NEW)?;
            let it = self.pool.intersect(a.ty, fty);
            let v = self.narrow(a, it)?;
            if v.is_bottom() {
                return Ok(CgValue::bottom());
            }
            vals.push(v);
        }

        if mutable {
            return self.heap_struct(ty, &layout, &ftys, &vals);
        }
        let irty = match self.type_repr(ty) {
            TypeRepr::Ghost => return Ok(CgValue::ghost(ty)),
            TypeRepr::Boxed => return self.heap_struct(ty, &layout, &ftys, &vals),
            TypeRepr::Unboxed(irty) => irty,
        };
        if vals.len() == nf {
            if let Some(c) = fold_constant(ty, &layout, &vals) {
                return Ok(self.const_value(c));
            }
        }
        if vec_element {
            let (Some(v), Some(&fty)) = (vals.first(), ftys.first()) else {
                return Err(LowerError::Arity {
                    op: NEW,
                    expected: 1,
                    got: 0,
                });
            };
            let bits = self.unbox(v, fty)?;
            return Ok(CgValue::register(bits, ty));
        }
        if let IrType::Vector(_, elem) = &irty {
            let mut members = Vec::with_capacity(nf);
            for (i, &fty) in ftys.iter().enumerate() {
                members.push(match vals.get(i) {
                    Some(v) => self.unbox(v, fty)?,
                    None => self.b.const_zero((**elem).clone()),
                });
            }
            let v = self.b.build_struct(irty.clone(), &members, "new");
            return Ok(CgValue::register(v, ty));
        }
        if layout.npointers() == 0 {
            return self.stack_struct(ty, irty, &layout, &ftys, &vals);
        }
        self.split_struct(ty, irty, &layout, &ftys, &vals)
    }

    /// Pointer-free immutable: fields stored into a stack slot.
    fn stack_struct(
        &mut self,
        ty: TypeId,
        irty: IrType,
        layout: &Layout,
        ftys: &FieldTypes,
        vals: &[CgValue],
    ) -> Result<CgValue, LowerError> {
        let slot = self.b.alloca(irty, layout.alignment, "new");
        if vals.len() < ftys.len() {
            let len = self.b.const_usize(u64::from(layout.size));
            self.b.memset(slot, 0, len, layout.alignment);
        }
        for ((v, &fty), fl) in vals.iter().zip(ftys).zip(layout.fields.iter()) {
            let at = self.b.gep_bytes(slot, u64::from(fl.offset), "new.field");
            self.store_field_bits(at, fty, fl, v, AliasTag::Stack)?;
        }
        self.init_absent_unions(slot, layout, vals.len());
        // Dynamic union stores may branch, which leaves no single block
        // to promote in.
        if layout.flags.contains(LayoutFlags::HAS_UNION_FIELD) {
            return Ok(CgValue::slot(slot, ty, AliasTag::Stack));
        }
        Ok(self.promotable_slot(slot, ty))
    }

    /// Immutable with pointers: bits on the stack, pointers as roots.
    fn split_struct(
        &mut self,
        ty: TypeId,
        irty: IrType,
        layout: &Layout,
        ftys: &FieldTypes,
        vals: &[CgValue],
    ) -> Result<CgValue, LowerError> {
        let ps = self.ptr_size();
        let bits = if layout.flags.all_pointers() {
            None
        } else {
            let bits = self.b.alloca(irty, layout.alignment, "new.bits");
            let len = self.b.const_usize(u64::from(layout.size));
            self.b.memset(bits, 0, len, layout.alignment);
            Some(bits)
        };
        let null = self.b.const_null(AddressSpace::Tracked);
        let mut roots: SmallVec<[ValueId; 4]> = SmallVec::from_elem(null, layout.npointers());

        for (i, ((v, &fty), fl)) in vals.iter().zip(ftys).zip(layout.fields.iter()).enumerate() {
            let Some(sf) = split_value_field(layout, i, ps) else {
                return Err(LowerError::NoSuchField { ty, index: i });
            };
            if fl.isptr {
                let p = self.box_value(v)?;
                if let Some(r) = roots.get_mut(sf.first_root) {
                    *r = p;
                }
                continue;
            }
            if let (Some(bits), Some(off)) = (bits, sf.bits_offset) {
                let at = self.b.gep_bytes(bits, u64::from(off), "new.field");
                if sf.nroots > 0 {
                    self.store_untracked_bits(at, fty, v)?;
                } else {
                    self.store_field_bits(at, fty, fl, v, AliasTag::Stack)?;
                }
            }
            if sf.nroots > 0 {
                let inner = self.inline_roots(v)?;
                let dst = roots.iter_mut().skip(sf.first_root).take(sf.nroots);
                for (slot, r) in dst.zip(inner) {
                    *slot = r;
                }
            }
        }
        if let Some(bits) = bits {
            self.init_absent_unions(bits, layout, vals.len());
        }
        Ok(CgValue::split(bits, roots, ty))
    }

    /// Mutable (or otherwise boxed) types: a fresh heap object. Its
    /// initial field values need no write barrier.
    fn heap_struct(
        &mut self,
        ty: TypeId,
        layout: &Layout,
        ftys: &FieldTypes,
        vals: &[CgValue],
    ) -> Result<CgValue, LowerError> {
        let mutable = layout.flags.contains(LayoutFlags::IS_MUTABLE);
        let tbaa = if mutable {
            AliasTag::MutableHeap
        } else {
            AliasTag::ImmutableHeap
        };
        let ps = self.ptr_size();
        let obj = self.alloc_for_type(ty)?;
        let base = self.b.addrspace_cast(obj, AddressSpace::Derived, "new.fields");

        for (i, fl) in layout.fields.iter().enumerate().skip(vals.len()) {
            let at = self.b.gep_bytes(base, u64::from(fl.offset), "new.field");
            let holds_pointers = fl.isptr
                || ftys
                    .get(i)
                    .and_then(|&t| self.pool.layout(t))
                    .is_some_and(|l| l.npointers() > 0);
            if holds_pointers {
                let len = self.b.const_usize(u64::from(fl.size));
                self.b.memset(at, 0, len, 1);
            }
        }
        self.init_absent_unions(base, layout, vals.len());

        for ((v, &fty), fl) in vals.iter().zip(ftys).zip(layout.fields.iter()) {
            let at = self.b.gep_bytes(base, u64::from(fl.offset), "new.field");
            if fl.isptr {
                let p = self.box_value(v)?;
                self.b
                    .store_atomic(p, at, ps, Some(tbaa), AtomicOrdering::Unordered);
            } else {
                self.store_field_bits(at, fty, fl, v, tbaa)?;
            }
        }
        Ok(CgValue::boxed(obj, ty))
    }

    // === Field stores ===

    /// Store `v` into the inline field storage at `at`, selector included
    /// for union fields.
    pub(crate) fn store_field_bits(
        &mut self,
        at: ValueId,
        fty: TypeId,
        fl: &FieldLayout,
        v: &CgValue,
        tbaa: AliasTag,
    ) -> Result<(), LowerError> {
        if fl.isunion {
            return self.store_union(at, fty, fl, v, tbaa);
        }
        self.store_bits(at, fty, v, tbaa)
    }

    /// Payload plus selector of an inline union field.
    ///
    /// A statically known member stores its bits and a constant selector.
    /// Otherwise the value is boxed and its header tag picks both the
    /// selector and the number of payload bytes to copy.
    fn store_union(
        &mut self,
        at: ValueId,
        fty: TypeId,
        fl: &FieldLayout,
        v: &CgValue,
        tbaa: AliasTag,
    ) -> Result<(), LowerError> {
        let data_size = fl.size - 1;
        let sel_at = self.b.gep_bytes(at, u64::from(data_size), "selector");
        let k = self.pool.box_tindex(v.ty, fty);
        if k > 0 {
            self.store_bits(at, v.ty, v, tbaa)?;
            let kv = self.b.const_i8(k);
            self.b.store(kv, sel_at, 1, Some(AliasTag::UnionSelByte));
            return Ok(());
        }
        if let Repr::Union(u) = &v.repr {
            if v.ty == fty && u.boxed.is_none() {
                if let Some(data) = u.data {
                    self.b.memcpy_bytes(at, data, u64::from(data_size), 1);
                }
                self.b
                    .store(u.tindex, sel_at, 1, Some(AliasTag::UnionSelByte));
                return Ok(());
            }
        }
        let boxed = self.box_value(v)?;
        let tag = self.tag_word(boxed);
        let mut sel = self.b.const_i8(0);
        let mut len = self.b.const_usize(0);
        for (k, m) in self.union_small(fty) {
            let size = self.pool.layout(m).map_or(0, |l| l.size);
            let want = self.emit_tagfrom_type(m);
            let hit = self.b.icmp_eq(tag, want, "ismember");
            let kv = self.b.const_i8(k);
            sel = self.b.select(hit, kv, sel, "tindex");
            let sz = self.b.const_usize(u64::from(size));
            len = self.b.select(hit, sz, len, "payload");
        }
        self.b.memcpy(at, boxed, len, 1);
        self.b.store(sel, sel_at, 1, Some(AliasTag::UnionSelByte));
        Ok(())
    }

    /// Selector 1 for every union field from `first` on.
    fn init_absent_unions(&mut self, base: ValueId, layout: &Layout, first: usize) {
        for fl in layout.fields.iter().skip(first) {
            if let Some(sel) = fl.selector_offset() {
                let at = self.b.gep_bytes(base, u64::from(sel), "selector");
                let one = self.b.const_i8(1);
                self.b.store(one, at, 1, Some(AliasTag::UnionSelByte));
            }
        }
    }

    /// The pointers `v` contributes when copied inline, in layout order.
    /// Copy the bytes of `v`, an inline value of type `t` with pointers,
    /// to `dst` without its pointer slots. Those stay as `dst` had them.
    fn store_untracked_bits(
        &mut self,
        dst: ValueId,
        t: TypeId,
        v: &CgValue,
    ) -> Result<(), LowerError> {
        let Some(layout) = self.pool.layout(t) else {
            return Err(LowerError::NotConcrete { ty: t });
        };
        let (size, align) = (layout.size, layout.alignment);
        let offsets = layout.pointer_offsets.clone();
        let src = match &v.repr {
            Repr::Ghost => return Ok(()),
            Repr::Split(s) => {
                if let Some(bits) = s.bits {
                    self.b.memcpy_bytes(dst, bits, u64::from(size), align);
                }
                return Ok(());
            }
            Repr::Register { val } => {
                let ty = self.b.value_type(*val);
                let dl = self.b.data_layout();
                self.store_untracked_leaves(dst, *val, &ty, &dl);
                return Ok(());
            }
            Repr::Slot(s) => self.slot_ptr(s),
            Repr::Boxed { ptr } => *ptr,
            Repr::Constant(c) => self.literal(c.clone()),
            Repr::Union(_) => return Err(LowerError::Representation { op: NEW, ty: t }),
        };
        let ps = self.ptr_size();
        let mut start = 0;
        for end in offsets.iter().copied().chain([size]) {
            if end > start {
                let from = self.b.gep_bytes(src, u64::from(start), "bits.src");
                let to = self.b.gep_bytes(dst, u64::from(start), "bits.dst");
                self.b.memcpy_bytes(to, from, u64::from(end - start), 1);
            }
            start = end + ps;
        }
        Ok(())
    }

    /// Store the members of the register value `val` that hold no
    /// tracked pointer, each at its offset from `dst`.
    fn store_untracked_leaves(&mut self, dst: ValueId, val: ValueId, ty: &IrType, dl: &DataLayout) {
        if !ty.has_tracked_pointers() {
            let align = u32::try_from(dl.align_of(ty)).unwrap_or(1);
            self.b.store(val, dst, align, Some(AliasTag::Stack));
            return;
        }
        if !matches!(ty, IrType::Struct(_) | IrType::Array(..)) {
            return;
        }
        for i in 0..ty.num_elements() {
            let Some(m) = ty.element(i).cloned() else { continue };
            let member = self.b.extract_value(val, i, "leaf");
            let at = self.b.gep_bytes(dst, dl.element_offset(ty, i), "leafaddr");
            self.store_untracked_leaves(at, member, &m, dl);
        }
    }

    fn inline_roots(&mut self, v: &CgValue) -> Result<Roots, LowerError> {
        if let Repr::Constant(c) = &v.repr {
            let lit = self.literal(c.clone());
            return Ok(self.load_roots(lit, v.ty, AliasTag::Const));
        }
        self.roots_of(v, true)
    }
}

/// A constant for a struct whose fields are all constants: a bit image
/// when the layout is plain bits, field by field otherwise.
fn fold_constant(ty: TypeId, layout: &Layout, vals: &[CgValue]) -> Option<Constant> {
    let fields: Vec<Constant> = vals
        .iter()
        .map(|v| match &v.repr {
            Repr::Constant(c) => Some(c.clone()),
            Repr::Ghost => Some(Constant::Singleton(v.ty)),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if !layout.pointer_free() || layout.flags.contains(LayoutFlags::HAS_UNION_FIELD) {
        return Some(Constant::Struct {
            ty,
            fields: fields.into(),
        });
    }
    let mut bytes = vec![0u8; layout.size as usize];
    for (c, fl) in fields.iter().zip(layout.fields.iter()) {
        match c {
            Constant::Bits { bytes: b, .. } => {
                let start = fl.offset as usize;
                bytes.get_mut(start..start + b.len())?.copy_from_slice(b);
            }
            Constant::Singleton(_) => {}
            _ => return None,
        }
    }
    Some(Constant::Bits {
        ty,
        bytes: bytes.into(),
    })
}
