//! Runtime checks and the error paths they branch to.
//!
//! Every check has the same shape: compute an `i1`, branch to a cold
//! block that calls a noreturn error entry point, and continue lowering
//! in the pass block. Conditions that fold to a constant emit no branch
//! at all; a condition that is constantly failing emits the error call
//! inline and leaves the builder in a fresh, unreachable block so the
//! caller can keep emitting.

use ferrule_ir::{AddressSpace, AliasTag, RuntimeFn, ValueId};
use ferrule_types::{abi, Constant, TypeId};

use crate::cgval::{CgValue, Repr};
use crate::context::CodegenCx;
use crate::error::LowerError;

/// Where the elements of a bounds-checked container live.
#[derive(Clone, Debug)]
pub enum BoundsTarget<'v> {
    /// A raw run of `len` values starting at `data` (an unboxed tuple in
    /// memory).
    Raw { data: ValueId, len: ValueId },
    /// A boxed container object.
    Boxed(ValueId),
    /// An unboxed value of the container type.
    Value(&'v CgValue),
}

impl CodegenCx<'_> {
    // === Raising ===

    /// Call the noreturn entry point `f` and continue in a fresh block.
    pub(crate) fn raise(&mut self, f: RuntimeFn, args: &[ValueId]) {
        self.b.call(f, args, "");
        self.b.unreachable();
        let after = self.b.append_block("after_error");
        self.b.position_at_end(after);
    }

    /// An untracked view of `ptr` for runtime parameters typed `ptr`.
    pub(crate) fn to_generic(&mut self, ptr: ValueId) -> ValueId {
        match self.b.value_type(ptr).addrspace() {
            Some(AddressSpace::Generic) => ptr,
            _ => self.b.addrspace_cast(ptr, AddressSpace::Generic, "untracked"),
        }
    }

    /// Raise a plain error with message `msg`.
    pub fn emit_error(&mut self, msg: &str) {
        let s = self.cstring(msg);
        self.raise(RuntimeFn::Error, &[s]);
    }

    /// Raise a concurrency violation with message `msg`.
    pub fn emit_atomic_error(&mut self, msg: &str) {
        let s = self.cstring(msg);
        self.raise(RuntimeFn::AtomicError, &[s]);
    }

    /// Raise `TypeError(context, expected, got)`.
    pub fn emit_type_error(&mut self, context: &str, expected: TypeId, got: &CgValue) -> Result<(), LowerError> {
        let boxed = self.box_value(got)?;
        let msg = self.cstring(context);
        let expected = self.type_object(expected);
        self.raise(RuntimeFn::TypeError, &[msg, expected, boxed]);
        Ok(())
    }

    // === Guards ===

    /// Continue only where `ok` holds; otherwise run `fail`, which must
    /// end in a noreturn call.
    pub(crate) fn guard(
        &mut self,
        ok: ValueId,
        name: &str,
        fail: impl FnOnce(&mut Self) -> Result<(), LowerError>,
    ) -> Result<(), LowerError> {
        match self.b.const_value(ok) {
            Some(0) => return fail(self),
            Some(_) => return Ok(()),
            None => {}
        }
        let fail_bb = self.b.append_block(&format!("{name}.fail"));
        let pass_bb = self.b.append_block(&format!("{name}.pass"));
        self.b.cond_br(ok, pass_bb, fail_bb);
        self.b.position_at_end(fail_bb);
        fail(self)?;
        if !self.b.is_terminated() {
            self.b.unreachable();
        }
        self.b.position_at_end(pass_bb);
        Ok(())
    }

    /// `cond ? compute() : default`, where `compute` only runs on the
    /// `cond` path.
    pub(crate) fn guarded_value(
        &mut self,
        cond: ValueId,
        default: ValueId,
        name: &str,
        compute: impl FnOnce(&mut Self) -> Result<ValueId, LowerError>,
    ) -> Result<ValueId, LowerError> {
        match self.b.const_value(cond) {
            Some(0) => return Ok(default),
            Some(_) => return compute(self),
            None => {}
        }
        let ty = self.b.value_type(default);
        let Some(from) = self.b.current_block() else {
            return Err(LowerError::Builder { op: "guarded_value" });
        };
        let then_bb = self.b.append_block(&format!("{name}.then"));
        let join_bb = self.b.append_block(&format!("{name}.join"));
        self.b.cond_br(cond, then_bb, join_bb);
        self.b.position_at_end(then_bb);
        let v = compute(self)?;
        let Some(then_end) = self.b.current_block() else {
            return Err(LowerError::Builder { op: "guarded_value" });
        };
        self.b.br(join_bb);
        self.b.position_at_end(join_bb);
        Ok(self
            .b
            .phi_from_incoming(ty, &[(default, from), (v, then_end)], name))
    }

    // === Named checks ===

    /// Raise `UndefVarError(name, scope)` (or `UndefRefError` without a
    /// name) when `ptr` is null.
    pub fn null_check(&mut self, ptr: ValueId, var: Option<(&str, &str)>) -> Result<(), LowerError> {
        let ok = self.b.is_nonzero(ptr, "nonnull");
        self.guard(ok, "nullcheck", |cx| {
            match var {
                Some((name, scope)) => {
                    let name = cx.literal(Constant::symbol(name));
                    let scope = cx.literal(Constant::symbol(scope));
                    cx.raise(RuntimeFn::UndefVarError, &[name, scope]);
                }
                None => cx.raise(RuntimeFn::UndefRefError, &[]),
            }
            Ok(())
        })
    }

    /// Raise `msg` as an error unless `ok` holds.
    pub fn error_unless(&mut self, ok: ValueId, msg: &str) -> Result<(), LowerError> {
        self.guard(ok, "check", |cx| {
            cx.emit_error(msg);
            Ok(())
        })
    }

    /// Raise `TypeError(context, expected, got)` unless `ok` holds.
    pub(crate) fn type_error_unless(
        &mut self,
        ok: ValueId,
        context: &str,
        expected: TypeId,
        got: &CgValue,
    ) -> Result<(), LowerError> {
        self.guard(ok, "typecheck", |cx| cx.emit_type_error(context, expected, got))
    }

    /// Check the 0-based `idx` against `len` when bounds checking is on
    /// for this access. The error reports the 1-based index.
    pub fn bounds_check(
        &mut self,
        target: BoundsTarget<'_>,
        container: TypeId,
        idx: ValueId,
        len: ValueId,
        inbounds: bool,
    ) -> Result<(), LowerError> {
        if !self.opts.bounds_check.should_check(inbounds) {
            return Ok(());
        }
        let ok = self.b.icmp_ult(idx, len, "inbounds");
        self.guard(ok, "oob", |cx| {
            let one = cx.b.const_i64(1);
            let index = cx.b.add(idx, one, "index");
            match target {
                BoundsTarget::Raw { data, len } => {
                    let data = cx.to_generic(data);
                    cx.raise(RuntimeFn::BoundsErrorTuple, &[data, len, index]);
                }
                BoundsTarget::Boxed(obj) => cx.raise(RuntimeFn::BoundsError, &[obj, index]),
                BoundsTarget::Value(v) => {
                    let data = cx.materialize(v)?;
                    let data = cx.to_generic(data);
                    let ty = cx.type_object(container);
                    cx.raise(RuntimeFn::BoundsErrorUnboxed, &[data, ty, index]);
                }
            }
            Ok(())
        })
    }

    /// A pointer to the native bits of `v`, copying to a fresh stack slot
    /// when the value is not already in memory.
    pub(crate) fn materialize(&mut self, v: &CgValue) -> Result<ValueId, LowerError> {
        match &v.repr {
            Repr::Slot(s) => Ok(s.ptr),
            Repr::Boxed { ptr } => Ok(*ptr),
            _ => {
                let ty = self.ir_type(v.ty);
                let align = self.pool.layout(v.ty).map_or(abi::HEADER_SIZE, |l| l.alignment);
                let slot = self.b.alloca(ty.clone(), align, "tmp");
                let bits = self.unbox(v, v.ty)?;
                self.b.store(bits, slot, align, Some(AliasTag::Stack));
                Ok(slot)
            }
        }
    }

    /// Raise `ArgumentError(msg)` unless `ok` holds.
    pub(crate) fn argument_check(&mut self, ok: ValueId, msg: &str) -> Result<(), LowerError> {
        self.guard(ok, "argcheck", |cx| {
            let s = cx.cstring(msg);
            cx.raise(RuntimeFn::ArgumentError, &[s]);
            Ok(())
        })
    }
}
