//! Field writes: `setfield!` and its read-modify-write relatives.
//!
//! # Lowering
//!
//! | Field                                         | Accessed with                          |
//! |-----------------------------------------------|----------------------------------------|
//! | pointer                                       | atomic store, `xchg` or `cmpxchg`      |
//! | inline atomic, pointer-free, at most `max_atomic_size` bytes | the same, on an integer of the field's width |
//! | other inline atomic                           | plain copies under the object lock     |
//! | inline non-atomic                             | plain copies                           |
//!
//! Compare-and-swap loops retry until the observed value is no longer
//! `===` to the expected one or the exchange goes through. A store that
//! only happens on one path gets its write barrier on that path only.

use ferrule_ir::{AddressSpace, AliasTag, AtomicOrdering, IrType, Load, RuntimeFn, ValueId};
use ferrule_types::{Constant, FieldLayout, TypeId};

use crate::cgval::{CgValue, Repr};
use crate::context::CodegenCx;
use crate::error::LowerError;
use crate::field::FieldSite;

/// The operation applied by `modifyfield!`: `(cx, old, rhs) -> new`.
pub type ModifyFn<'f> =
    dyn FnMut(&mut CodegenCx<'_>, &CgValue, &CgValue) -> Result<CgValue, LowerError> + 'f;

/// Which write [`CodegenCx::setfield`] performs.
pub enum FieldOp<'f> {
    /// Store; yields the stored value.
    Set,
    /// Store; yields the previous value.
    Swap,
    /// Store when the current value `===` `expected`; yields
    /// `ReplaceResult(old, success)`.
    Replace { expected: &'f CgValue },
    /// Store `op(old, rhs)`; yields `ModifyResult(old, new)`.
    Modify(&'f mut ModifyFn<'f>),
    /// Store only into an undefined field; yields whether it did.
    SetOnce,
}

impl FieldOp<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Set => "setfield!",
            Self::Swap => "swapfield!",
            Self::Replace { .. } => "replacefield!",
            Self::Modify(_) => "modifyfield!",
            Self::SetOnce => "setfieldonce!",
        }
    }
}

/// The field being written.
#[derive(Copy, Clone, Debug)]
struct Target {
    /// The boxed owner.
    obj: ValueId,
    addr: ValueId,
    fty: TypeId,
    fl: FieldLayout,
    /// The field may still be undefined.
    maybe_null: bool,
}

/// Unit of an atomic exchange.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Word {
    /// A tracked pointer.
    Pointer,
    /// The field's bits as one integer of this many bytes.
    Bits(u32),
}

impl Word {
    fn ir_type(self) -> IrType {
        match self {
            Self::Pointer => IrType::TRACKED,
            Self::Bits(n) => IrType::Int(n * 8),
        }
    }
}

/// What a barrier must see after `v` is stored as the object `boxed`.
fn stored_form(v: &CgValue, boxed: ValueId) -> CgValue {
    match v.repr {
        Repr::Constant(_) | Repr::Ghost => v.clone(),
        _ => CgValue::boxed(boxed, v.ty),
    }
}

impl CodegenCx<'_> {
    /// Write field `idx` (0-based) of the mutable `strct` with memory order
    /// `order`.
    ///
    /// Violations (an immutable struct, a const field, a mismatched
    /// atomicity) raise at run time and yield bottom. `rhs` is type-checked
    /// against the field, except for [`FieldOp::Modify`] where it is the
    /// operator's argument and the operator's result is checked instead.
    pub fn setfield(
        &mut self,
        strct: &CgValue,
        idx: usize,
        rhs: &CgValue,
        op: FieldOp<'_>,
        order: AtomicOrdering,
    ) -> Result<CgValue, LowerError> {
        let name = op.name();
        let t = strct.ty;
        if strct.is_bottom() || rhs.is_bottom() {
            return Ok(CgValue::bottom());
        }
        let Some(dt) = self.pool.datatype(t).filter(|_| self.pool.is_concrete(t)) else {
            return Err(LowerError::NotConcrete { ty: t });
        };
        let (Some(field), Some(fl)) = (
            dt.fields.get(idx).cloned(),
            dt.layout.as_ref().and_then(|l| l.field(idx)).copied(),
        ) else {
            return Err(LowerError::NoSuchField { ty: t, index: idx });
        };
        let mutable = dt.mutable;
        let maybe_null = idx >= dt.nfields().saturating_sub(dt.n_uninitialized as usize);

        if !mutable {
            let msg = format!(
                "{name}: immutable struct of type {} cannot be changed",
                self.pool.format_type(t)
            );
            self.emit_error(&msg);
            return Ok(CgValue::bottom());
        }
        if field.constant && !matches!(op, FieldOp::SetOnce) {
            let msg = format!(
                "{name}: const field .{} of type {} cannot be changed",
                field.name,
                self.pool.format_type(t)
            );
            self.emit_error(&msg);
            return Ok(CgValue::bottom());
        }
        if field.atomic != order.is_atomic() {
            let msg = if field.atomic {
                format!("{name}: atomic field cannot be written non-atomically")
            } else {
                format!("{name}: non-atomic field cannot be written atomically")
            };
            self.emit_atomic_error(&msg);
            return Ok(CgValue::bottom());
        }
        let Repr::Boxed { ptr: obj } = strct.repr else {
            return Err(LowerError::Representation { op: name, ty: t });
        };

        let fty = field.ty;
        let rhs = if matches!(op, FieldOp::Modify(_)) {
            rhs.clone()
        } else {
            let v = self.checked_field_value(rhs, fty, name)?;
            if v.is_bottom() {
                return Ok(v);
            }
            v
        };
        tracing::trace!(ty = %self.pool.format_type(t), idx, op = name, order = order.name(), "setfield");

        let base = self.b.addrspace_cast(obj, AddressSpace::Derived, "fields");
        let addr = self.b.gep_bytes(base, u64::from(fl.offset), "fieldaddr");
        let tg = Target {
            obj,
            addr,
            fty,
            fl,
            maybe_null,
        };
        if fl.isptr {
            return self.pointer_field_op(&tg, &rhs, op, order);
        }
        let has_pointers = !fl.isunion && self.pool.layout(fty).is_some_and(|l| l.npointers() > 0);
        if field.atomic && !fl.isunion && !has_pointers && fl.size <= self.opts.max_atomic_size {
            return self.atomic_bits_op(&tg, &rhs, op, order);
        }
        self.inline_field_op(&tg, &rhs, op, field.atomic)
    }

    /// `v` checked against the field type `fty` and narrowed to it.
    fn checked_field_value(
        &mut self,
        v: &CgValue,
        fty: TypeId,
        name: &str,
    ) -> Result<CgValue, LowerError> {
        self.typecheck(v, fty, name)?;
        let it = self.pool.intersect(v.ty, fty);
        self.narrow(v, it)
    }

    // === Pointer fields ===

    fn pointer_field_op(
        &mut self,
        tg: &Target,
        rhs: &CgValue,
        op: FieldOp<'_>,
        order: AtomicOrdering,
    ) -> Result<CgValue, LowerError> {
        let ps = self.ptr_size();
        let tbaa = Some(AliasTag::MutableHeap);
        match op {
            FieldOp::Set => {
                let (r, stored) = self.box_for_store(rhs)?;
                let order = order.max(AtomicOrdering::Unordered).for_store();
                self.b.store_atomic(r, tg.addr, ps, tbaa, order);
                self.write_barrier_for(tg.obj, &stored, false)?;
                Ok(rhs.clone())
            }
            FieldOp::Swap => {
                let (r, stored) = self.box_for_store(rhs)?;
                let order = order.max(AtomicOrdering::Monotonic);
                let old = self.b.atomic_xchg(tg.addr, r, order, ps, tbaa, "old");
                self.write_barrier_for(tg.obj, &stored, false)?;
                if tg.maybe_null {
                    self.null_check(old, None)?;
                }
                Ok(CgValue::boxed(old, tg.fty))
            }
            FieldOp::Replace { expected } => {
                let (r, stored) = self.box_for_store(rhs)?;
                let (old, ok) = if self.pointer_egal(expected.ty) || self.pointer_egal(tg.fty) {
                    let exp = self.box_value(expected)?;
                    let pair = self.b.cmpxchg(tg.addr, exp, r, order, ps, tbaa, "xchg");
                    let old = self.b.extract_value(pair, 0, "old");
                    let ok = self.b.extract_value(pair, 1, "success");
                    if tg.maybe_null {
                        self.null_check(old, None)?;
                    }
                    (CgValue::boxed(old, tg.fty), ok)
                } else {
                    self.replace_loop(tg, Word::Pointer, r, expected, order)?
                };
                self.barrier_if(ok, tg.obj, &stored)?;
                self.replace_result(tg.fty, old, ok)
            }
            FieldOp::Modify(f) => {
                let Some((old, new, bits)) =
                    self.modify_loop(tg, Word::Pointer, rhs, f, order)?
                else {
                    return Ok(CgValue::bottom());
                };
                let stored = stored_form(&new, bits);
                self.write_barrier_for(tg.obj, &stored, false)?;
                self.modify_result(tg.fty, old, new)
            }
            FieldOp::SetOnce => {
                if !tg.maybe_null {
                    return Ok(self.const_bool(false));
                }
                let (r, stored) = self.box_for_store(rhs)?;
                let null = self.b.const_null(AddressSpace::Tracked);
                let pair = self.b.cmpxchg(tg.addr, null, r, order, ps, tbaa, "setonce");
                let ok = self.b.extract_value(pair, 1, "success");
                self.barrier_if(ok, tg.obj, &stored)?;
                let b = self.bool_to_i8(ok);
                Ok(CgValue::register(b, TypeId::BOOL))
            }
        }
    }

    /// Box `v` for a pointer store, remembering whether the box can need
    /// a barrier.
    fn box_for_store(&mut self, v: &CgValue) -> Result<(ValueId, CgValue), LowerError> {
        let p = self.box_value(v)?;
        Ok((p, stored_form(v, p)))
    }

    // === Small inline atomics ===

    fn atomic_bits_op(
        &mut self,
        tg: &Target,
        rhs: &CgValue,
        op: FieldOp<'_>,
        order: AtomicOrdering,
    ) -> Result<CgValue, LowerError> {
        let word = Word::Bits(tg.fl.size);
        let align = self.word_align(word);
        let tbaa = Some(AliasTag::MutableHeap);
        match op {
            FieldOp::Set => {
                let bits = self.word_bits(word, rhs, tg.fty)?;
                self.b.store_atomic(bits, tg.addr, align, tbaa, order.for_store());
                Ok(rhs.clone())
            }
            FieldOp::Swap => {
                let bits = self.word_bits(word, rhs, tg.fty)?;
                let old = self.b.atomic_xchg(tg.addr, bits, order, align, tbaa, "old");
                self.word_value(word, old, tg.fty, false)
            }
            FieldOp::Replace { expected } => {
                let bits = self.word_bits(word, rhs, tg.fty)?;
                let (old, ok) = self.replace_loop(tg, word, bits, expected, order)?;
                self.replace_result(tg.fty, old, ok)
            }
            FieldOp::Modify(f) => {
                let Some((old, new, _)) = self.modify_loop(tg, word, rhs, f, order)? else {
                    return Ok(CgValue::bottom());
                };
                self.modify_result(tg.fty, old, new)
            }
            // Pointer-free fields are never undefined.
            FieldOp::SetOnce => Ok(self.const_bool(false)),
        }
    }

    fn word_align(&self, word: Word) -> u32 {
        match word {
            Word::Pointer => self.ptr_size(),
            Word::Bits(n) => n.next_power_of_two(),
        }
    }

    /// The field value held in the exchange word `bits`.
    fn word_value(
        &mut self,
        word: Word,
        bits: ValueId,
        fty: TypeId,
        check_null: bool,
    ) -> Result<CgValue, LowerError> {
        match word {
            Word::Pointer => {
                if check_null {
                    self.null_check(bits, None)?;
                }
                Ok(CgValue::boxed(bits, fty))
            }
            Word::Bits(_) => {
                let align = self.word_align(word);
                let tmp = self.b.alloca(word.ir_type(), align, "word");
                self.b.store(bits, tmp, align, Some(AliasTag::Stack));
                Ok(CgValue::slot(tmp, fty, AliasTag::Stack))
            }
        }
    }

    /// `v` as an exchange word.
    fn word_bits(&mut self, word: Word, v: &CgValue, fty: TypeId) -> Result<ValueId, LowerError> {
        match word {
            Word::Pointer => self.box_value(v),
            Word::Bits(_) => {
                let align = self.word_align(word);
                let ty = word.ir_type();
                let tmp = self.b.alloca(ty.clone(), align, "word");
                self.store_bits(tmp, fty, v, AliasTag::Stack)?;
                Ok(self
                    .b
                    .load_with(Load::new(ty, tmp, align).tbaa(AliasTag::Stack), "word"))
            }
        }
    }

    // === Compare-and-swap loops ===

    /// Exchange `new` in while the field stays `===` to `expected`.
    /// Yields the last observed value and whether the exchange happened.
    /// The observed value is the loop's `cur` on both exits: a successful
    /// exchange saw exactly the compared bits.
    fn replace_loop(
        &mut self,
        tg: &Target,
        word: Word,
        new: ValueId,
        expected: &CgValue,
        order: AtomicOrdering,
    ) -> Result<(CgValue, ValueId), LowerError> {
        const OP: &str = "replacefield!";
        let ty = word.ir_type();
        let align = self.word_align(word);
        let tbaa = Some(AliasTag::MutableHeap);
        let init = self.b.load_with(
            Load::new(ty.clone(), tg.addr, align)
                .tbaa(AliasTag::MutableHeap)
                .order(order.max(AtomicOrdering::Unordered).for_load()),
            "cur",
        );
        let Some(entry) = self.b.current_block() else {
            return Err(LowerError::Builder { op: OP });
        };
        let loop_bb = self.b.append_block("xchg.loop");
        let cas_bb = self.b.append_block("xchg.cas");
        let done_bb = self.b.append_block("xchg.done");
        self.b.br(loop_bb);

        self.b.position_at_end(loop_bb);
        let cur = self.b.phi(ty, "cur");
        self.b.add_incoming(cur, init, entry);
        let old = self.word_value(word, cur, tg.fty, tg.maybe_null)?;
        let eq = self.emit_egal(&old, expected)?;
        let Some(cmp_end) = self.b.current_block() else {
            return Err(LowerError::Builder { op: OP });
        };
        self.b.cond_br(eq, cas_bb, done_bb);

        self.b.position_at_end(cas_bb);
        let pair = self.b.cmpxchg(tg.addr, cur, new, order, align, tbaa, "xchg");
        let observed = self.b.extract_value(pair, 0, "observed");
        let ok = self.b.extract_value(pair, 1, "ok");
        self.b.cond_br(ok, done_bb, loop_bb);
        self.b.add_incoming(cur, observed, cas_bb);

        self.b.position_at_end(done_bb);
        let yes = self.b.const_i1(true);
        let no = self.b.const_i1(false);
        let success = self
            .b
            .phi_from_incoming(IrType::I1, &[(no, cmp_end), (yes, cas_bb)], "success");
        Ok((old, success))
    }

    /// Exchange `f(old, rhs)` in until no other write intervenes. Yields
    /// `(old, new, new as a word)`, or `None` when `f`'s result can never
    /// be stored.
    fn modify_loop(
        &mut self,
        tg: &Target,
        word: Word,
        rhs: &CgValue,
        f: &mut ModifyFn<'_>,
        order: AtomicOrdering,
    ) -> Result<Option<(CgValue, CgValue, ValueId)>, LowerError> {
        const OP: &str = "modifyfield!";
        let ty = word.ir_type();
        let align = self.word_align(word);
        let tbaa = Some(AliasTag::MutableHeap);
        let init = self.b.load_with(
            Load::new(ty.clone(), tg.addr, align)
                .tbaa(AliasTag::MutableHeap)
                .order(order.max(AtomicOrdering::Unordered).for_load()),
            "cur",
        );
        let Some(entry) = self.b.current_block() else {
            return Err(LowerError::Builder { op: OP });
        };
        let loop_bb = self.b.append_block("modify.loop");
        let done_bb = self.b.append_block("modify.done");
        self.b.br(loop_bb);

        self.b.position_at_end(loop_bb);
        let cur = self.b.phi(ty, "cur");
        self.b.add_incoming(cur, init, entry);
        let old = self.word_value(word, cur, tg.fty, tg.maybe_null)?;
        let computed = f(self, &old, rhs)?;
        let new = self.checked_field_value(&computed, tg.fty, OP)?;
        if new.is_bottom() {
            return Ok(None);
        }
        let bits = self.word_bits(word, &new, tg.fty)?;
        let pair = self.b.cmpxchg(tg.addr, cur, bits, order, align, tbaa, "xchg");
        let observed = self.b.extract_value(pair, 0, "observed");
        let ok = self.b.extract_value(pair, 1, "ok");
        let Some(cas_end) = self.b.current_block() else {
            return Err(LowerError::Builder { op: OP });
        };
        self.b.cond_br(ok, done_bb, loop_bb);
        self.b.add_incoming(cur, observed, cas_end);

        self.b.position_at_end(done_bb);
        Ok(Some((old, new, bits)))
    }

    // === Inline fields ===

    /// Plain accesses, bracketed by the object lock when `locked`.
    fn inline_field_op(
        &mut self,
        tg: &Target,
        rhs: &CgValue,
        op: FieldOp<'_>,
        locked: bool,
    ) -> Result<CgValue, LowerError> {
        if locked {
            self.b.call(RuntimeFn::LockValue, &[tg.obj], "");
        }
        let result = match op {
            FieldOp::Set => {
                self.store_inline(tg, rhs)?;
                rhs.clone()
            }
            FieldOp::Swap => {
                let old = self.snapshot(tg)?;
                self.store_inline(tg, rhs)?;
                old
            }
            FieldOp::Replace { expected } => {
                let old = self.snapshot(tg)?;
                let eq = self.emit_egal(&old, expected)?;
                self.when(eq, "replace", |cx| cx.store_inline(tg, rhs))?;
                self.replace_result(tg.fty, old, eq)?
            }
            FieldOp::Modify(f) => {
                let old = self.snapshot(tg)?;
                let computed = f(self, &old, rhs)?;
                let new = self.checked_field_value(&computed, tg.fty, "modifyfield!")?;
                if new.is_bottom() {
                    return Ok(new);
                }
                self.store_inline(tg, &new)?;
                self.modify_result(tg.fty, old, new)?
            }
            FieldOp::SetOnce => {
                let first_ptr = self.pool.layout(tg.fty).and_then(|l| l.first_ptr());
                match first_ptr.filter(|_| tg.maybe_null && !tg.fl.isunion) {
                    None => self.const_bool(false),
                    Some(off) => {
                        let p = self.first_pointer(tg.addr, off);
                        let null = self.b.const_null(AddressSpace::Tracked);
                        let empty = self.b.icmp_eq(p, null, "undef");
                        self.when(empty, "setonce", |cx| cx.store_inline(tg, rhs))?;
                        let b = self.bool_to_i8(empty);
                        CgValue::register(b, TypeId::BOOL)
                    }
                }
            }
        };
        if locked {
            self.b.call(RuntimeFn::UnlockValue, &[tg.obj], "");
        }
        Ok(result)
    }

    fn first_pointer(&mut self, addr: ValueId, off: u32) -> ValueId {
        let ps = self.ptr_size();
        let at = self.b.gep_bytes(addr, u64::from(off), "firstptr");
        self.b.load_with(
            Load::new(IrType::TRACKED, at, ps)
                .tbaa(AliasTag::MutableHeap)
                .order(AtomicOrdering::Unordered),
            "firstptr",
        )
    }

    /// A stack copy of the field's current value.
    fn snapshot(&mut self, tg: &Target) -> Result<CgValue, LowerError> {
        if tg.fl.isunion {
            let site = FieldSite {
                base: tg.addr,
                tbaa: AliasTag::MutableHeap,
                mutable: true,
                owner: Some(tg.obj),
            };
            return self.union_field(site, tg.addr, tg.fty, &tg.fl);
        }
        let Some(layout) = self.pool.layout(tg.fty) else {
            return Err(LowerError::NotConcrete { ty: tg.fty });
        };
        let (size, align, first_ptr) = (layout.size, layout.alignment, layout.first_ptr());
        if let (true, Some(off)) = (tg.maybe_null, first_ptr) {
            let p = self.first_pointer(tg.addr, off);
            self.null_check(p, None)?;
        }
        let tmp = self
            .b
            .alloca(IrType::Array(size, Box::new(IrType::I8)), align, "oldfield");
        self.b.memcpy_bytes(tmp, tg.addr, u64::from(size), align);
        Ok(CgValue::slot(tmp, tg.fty, AliasTag::Stack))
    }

    fn store_inline(&mut self, tg: &Target, v: &CgValue) -> Result<(), LowerError> {
        self.store_field_bits(tg.addr, tg.fty, &tg.fl, v, AliasTag::MutableHeap)?;
        if !tg.fl.isunion {
            self.write_barrier_for(tg.obj, v, true)?;
        }
        Ok(())
    }

    // === Helpers ===

    /// Run `body` only where `cond` holds.
    fn when(
        &mut self,
        cond: ValueId,
        name: &str,
        body: impl FnOnce(&mut Self) -> Result<(), LowerError>,
    ) -> Result<(), LowerError> {
        match self.b.const_value(cond) {
            Some(0) => return Ok(()),
            Some(_) => return body(self),
            None => {}
        }
        let then_bb = self.b.append_block(&format!("{name}.then"));
        let cont_bb = self.b.append_block(&format!("{name}.cont"));
        self.b.cond_br(cond, then_bb, cont_bb);
        self.b.position_at_end(then_bb);
        body(self)?;
        if !self.b.is_terminated() {
            self.b.br(cont_bb);
        }
        self.b.position_at_end(cont_bb);
        Ok(())
    }

    /// Barrier for `stored` on the path where `cond` holds.
    fn barrier_if(&mut self, cond: ValueId, obj: ValueId, stored: &CgValue) -> Result<(), LowerError> {
        if self.barrier_elidable(stored, false) {
            return Ok(());
        }
        self.when(cond, "wb", |cx| cx.write_barrier_for(obj, stored, false))
    }

    fn const_bool(&mut self, b: bool) -> CgValue {
        self.const_value(Constant::bool(b))
    }

    fn replace_result(
        &mut self,
        fty: TypeId,
        old: CgValue,
        ok: ValueId,
    ) -> Result<CgValue, LowerError> {
        let rt = self.pool.replace_result(fty)?;
        let b = self.bool_to_i8(ok);
        let success = CgValue::register(b, TypeId::BOOL);
        self.new_struct(rt, &[old, success])
    }

    fn modify_result(
        &mut self,
        fty: TypeId,
        old: CgValue,
        new: CgValue,
    ) -> Result<CgValue, LowerError> {
        let rt = self.pool.modify_result(fty)?;
        self.new_struct(rt, &[old, new])
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
