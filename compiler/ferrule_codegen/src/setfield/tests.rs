use ferrule_ir::{AtomicOrdering, InstKind, IrType, RuntimeFn};
use ferrule_rt::{Interpreter, RtValue, Trap};
use ferrule_types::{Field, StructDef, TypeId, TypePool};
use pretty_assertions::assert_eq;

use super::FieldOp;
use crate::cgval::CgValue;
use crate::context::CodegenCx;
use crate::error::LowerError;
use crate::tests_util::Harness;

/// `mutable struct Ref; x; end`, optionally with an atomic or lazily
/// initialized field.
fn boxed_any(pool: &mut TypePool, atomic: bool, lazy: bool) -> TypeId {
    let mut f = Field::new("x", TypeId::ANY);
    if atomic {
        f = f.atomic();
    }
    let mut def = StructDef::new("Ref").mutable().field(f);
    if lazy {
        def = def.uninitialized(1);
    }
    pool.define_struct(def).unwrap()
}

/// `mutable struct Counter; @atomic n::Int64; end`
fn counter(pool: &mut TypePool) -> TypeId {
    pool.define_struct(
        StructDef::new("Counter")
            .mutable()
            .field(Field::new("n", TypeId::INT64).atomic()),
    )
    .unwrap()
}

/// `f(obj, v) = op(obj.x, v)` with both arguments boxed; returns the
/// boxed result.
fn write_fn(pool: &mut TypePool, t: TypeId, op: FieldOp<'_>, order: AtomicOrdering) -> Harness {
    let mut h = Harness::new(&[IrType::TRACKED, IrType::TRACKED], IrType::TRACKED);
    let mut cx = h.cx(pool);
    let obj = cx.param_value(0, t);
    let v = cx.param_value(1, TypeId::ANY);
    let r = cx.setfield(&obj, 0, &v, op, order).unwrap();
    let boxed = cx.box_value(&r).unwrap();
    cx.b.ret(boxed);
    cx.finish().unwrap();
    h.verify();
    h
}

#[test]
fn set_stores_the_pointer_and_records_a_barrier() {
    let mut pool = TypePool::new();
    let t = boxed_any(&mut pool, false, false);
    let h = write_fn(&mut pool, t, FieldOp::Set, AtomicOrdering::NotAtomic);
    assert_eq!(h.calls(RuntimeFn::WriteBarrier), 1);

    let mut interp = Interpreter::new(&h.module, &pool);
    let rt = interp.runtime_mut();
    let obj = rt.alloc_instance(t).unwrap();
    let v = rt.box_i64(9).unwrap();
    let r = interp.call(h.func, &[RtValue::Ptr(obj), RtValue::Ptr(v)]).unwrap();
    assert_eq!(r, RtValue::Ptr(v));
    assert_eq!(interp.runtime_mut().get_field(obj, 0), Ok(v));
    let wb = interp.barriers();
    assert_eq!(wb.len(), 1);
    assert_eq!(wb[0].parent, obj);
    assert_eq!(wb[0].children.as_slice(), &[v]);
}

#[test]
fn immutable_structs_cannot_be_changed() {
    let mut pool = TypePool::new();
    let t = pool
        .define_struct(StructDef::new("Frozen").field(Field::new("x", TypeId::ANY)))
        .unwrap();
    let h = write_fn(&mut pool, t, FieldOp::Set, AtomicOrdering::NotAtomic);
    assert_eq!(h.calls(RuntimeFn::Error), 1);

    let mut interp = Interpreter::new(&h.module, &pool);
    let obj = interp.runtime_mut().alloc_instance(t).unwrap();
    let v = interp.runtime_mut().box_i64(1).unwrap();
    let err = interp.call(h.func, &[RtValue::Ptr(obj), RtValue::Ptr(v)]).unwrap_err();
    assert_eq!(
        err.as_trap(),
        Some(&Trap::Error(
            "setfield!: immutable struct of type Frozen cannot be changed".into()
        ))
    );
}

#[test]
fn const_fields_reject_everything_but_setonce() {
    let mut pool = TypePool::new();
    let t = pool
        .define_struct(
            StructDef::new("Config")
                .mutable()
                .field(Field::new("x", TypeId::ANY).constant()),
        )
        .unwrap();
    let h = write_fn(&mut pool, t, FieldOp::Swap, AtomicOrdering::NotAtomic);
    assert_eq!(h.calls(RuntimeFn::Error), 1);

    let mut interp = Interpreter::new(&h.module, &pool);
    let obj = interp.runtime_mut().alloc_instance(t).unwrap();
    let v = interp.runtime_mut().box_i64(1).unwrap();
    let err = interp.call(h.func, &[RtValue::Ptr(obj), RtValue::Ptr(v)]).unwrap_err();
    assert_eq!(
        err.as_trap(),
        Some(&Trap::Error(
            "swapfield!: const field .x of type Config cannot be changed".into()
        ))
    );
}

#[test]
fn atomic_store_into_a_plain_field_is_an_atomic_error() {
    let mut pool = TypePool::new();
    let t = boxed_any(&mut pool, false, false);
    let h = write_fn(&mut pool, t, FieldOp::Set, AtomicOrdering::Release);
    assert_eq!(h.calls(RuntimeFn::AtomicError), 1);

    let mut interp = Interpreter::new(&h.module, &pool);
    let obj = interp.runtime_mut().alloc_instance(t).unwrap();
    let v = interp.runtime_mut().box_i64(1).unwrap();
    let err = interp.call(h.func, &[RtValue::Ptr(obj), RtValue::Ptr(v)]).unwrap_err();
    assert_eq!(
        err.as_trap(),
        Some(&Trap::Atomic(
            "setfield!: non-atomic field cannot be written atomically".into()
        ))
    );
}

#[test]
fn swap_yields_the_previous_inline_value() {
    let mut pool = TypePool::new();
    let t = pool
        .define_struct(
            StructDef::new("Cell")
                .mutable()
                .field(Field::new("n", TypeId::INT64)),
        )
        .unwrap();
    let mut h = Harness::new(&[IrType::TRACKED, IrType::I64], IrType::I64);
    let mut cx = h.cx(&mut pool);
    let obj = cx.param_value(0, t);
    let v = cx.param_value(1, TypeId::INT64);
    let old = cx
        .setfield(&obj, 0, &v, FieldOp::Swap, AtomicOrdering::NotAtomic)
        .unwrap();
    let bits = cx.unbox(&old, TypeId::INT64).unwrap();
    cx.b.ret(bits);
    cx.finish().unwrap();
    h.verify();
    assert_eq!(h.calls(RuntimeFn::WriteBarrier), 0);

    let mut interp = Interpreter::new(&h.module, &pool);
    let rt = interp.runtime_mut();
    let obj = rt.alloc_instance(t).unwrap();
    let five = rt.box_i64(5).unwrap();
    rt.set_field(obj, 0, five).unwrap();
    let r = interp.call(h.func, &[RtValue::Ptr(obj), RtValue::i64(8)]);
    assert_eq!(r, Ok(RtValue::i64(5)));
    let now = interp.runtime_mut().get_field(obj, 0).unwrap();
    assert_eq!(interp.runtime().unbox_i64(now), Ok(8));
}

#[test]
fn atomic_replace_succeeds_then_reports_the_stale_value() {
    let mut pool = TypePool::new();
    let t = boxed_any(&mut pool, true, false);
    let mut h = Harness::new(
        &[IrType::TRACKED, IrType::TRACKED, IrType::TRACKED],
        IrType::TRACKED,
    );
    let mut cx = h.cx(&mut pool);
    let obj = cx.param_value(0, t);
    let expected = cx.param_value(1, TypeId::ANY);
    let new = cx.param_value(2, TypeId::ANY);
    let r = cx
        .setfield(
            &obj,
            0,
            &new,
            FieldOp::Replace {
                expected: &expected,
            },
            AtomicOrdering::SequentiallyConsistent,
        )
        .unwrap();
    let boxed = cx.box_value(&r).unwrap();
    cx.b.ret(boxed);
    cx.finish().unwrap();
    h.verify();
    assert_eq!(h.count(|k| matches!(k, InstKind::CmpXchg { .. })), 1);

    let mut interp = Interpreter::new(&h.module, &pool);
    let rt = interp.runtime_mut();
    let obj = rt.alloc_instance(t).unwrap();
    let a = rt.box_i64(1).unwrap();
    let b = rt.box_i64(2).unwrap();
    let c = rt.box_i64(3).unwrap();
    rt.set_field(obj, 0, a).unwrap();

    let first = interp
        .call(h.func, &[RtValue::Ptr(obj), RtValue::Ptr(a), RtValue::Ptr(b)])
        .unwrap()
        .as_ptr()
        .unwrap();
    let rt = interp.runtime_mut();
    assert_eq!(rt.get_field(first, 0), Ok(a));
    let ok = rt.get_field(first, 1).unwrap();
    assert_eq!(rt.payload(ok), Ok(vec![1]));
    assert_eq!(rt.get_field(obj, 0), Ok(b));

    let second = interp
        .call(h.func, &[RtValue::Ptr(obj), RtValue::Ptr(a), RtValue::Ptr(c)])
        .unwrap()
        .as_ptr()
        .unwrap();
    let rt = interp.runtime_mut();
    assert_eq!(rt.get_field(second, 0), Ok(b));
    let ok = rt.get_field(second, 1).unwrap();
    assert_eq!(rt.payload(ok), Ok(vec![0]));
    assert_eq!(rt.get_field(obj, 0), Ok(b));
}

#[test]
fn modify_applies_the_operator_atomically() {
    let mut pool = TypePool::new();
    let t = counter(&mut pool);
    let mut h = Harness::new(&[IrType::TRACKED, IrType::I64], IrType::TRACKED);
    let mut cx = h.cx(&mut pool);
    let obj = cx.param_value(0, t);
    let delta = cx.param_value(1, TypeId::INT64);
    let mut add = |cx: &mut CodegenCx<'_>, old: &CgValue, rhs: &CgValue| -> Result<CgValue, LowerError> {
        let a = cx.unbox(old, TypeId::INT64)?;
        let b = cx.unbox(rhs, TypeId::INT64)?;
        let sum = cx.b.add(a, b, "sum");
        Ok(CgValue::register(sum, TypeId::INT64))
    };
    let r = cx
        .setfield(
            &obj,
            0,
            &delta,
            FieldOp::Modify(&mut add),
            AtomicOrdering::AcquireRelease,
        )
        .unwrap();
    let boxed = cx.box_value(&r).unwrap();
    cx.b.ret(boxed);
    cx.finish().unwrap();
    h.verify();
    assert_eq!(h.calls(RuntimeFn::LockValue), 0);

    let mut interp = Interpreter::new(&h.module, &pool);
    let rt = interp.runtime_mut();
    let obj = rt.alloc_instance(t).unwrap();
    let ten = rt.box_i64(10).unwrap();
    rt.set_field(obj, 0, ten).unwrap();
    let r = interp
        .call(h.func, &[RtValue::Ptr(obj), RtValue::i64(5)])
        .unwrap()
        .as_ptr()
        .unwrap();
    let rt = interp.runtime_mut();
    let old = rt.get_field(r, 0).unwrap();
    let new = rt.get_field(r, 1).unwrap();
    assert_eq!(rt.unbox_i64(old), Ok(10));
    assert_eq!(rt.unbox_i64(new), Ok(15));
    let now = rt.get_field(obj, 0).unwrap();
    assert_eq!(rt.unbox_i64(now), Ok(15));
}

#[test]
fn setonce_only_fills_an_undefined_field() {
    let mut pool = TypePool::new();
    let t = boxed_any(&mut pool, true, true);
    let mut h = Harness::new(&[IrType::TRACKED, IrType::TRACKED], IrType::I8);
    let mut cx = h.cx(&mut pool);
    let obj = cx.param_value(0, t);
    let v = cx.param_value(1, TypeId::ANY);
    let r = cx
        .setfield(&obj, 0, &v, FieldOp::SetOnce, AtomicOrdering::Acquire)
        .unwrap();
    assert_eq!(r.ty, TypeId::BOOL);
    let bits = cx.unbox(&r, TypeId::BOOL).unwrap();
    cx.b.ret(bits);
    cx.finish().unwrap();
    h.verify();

    let mut interp = Interpreter::new(&h.module, &pool);
    let rt = interp.runtime_mut();
    let obj = rt.alloc_instance(t).unwrap();
    let a = rt.box_i64(1).unwrap();
    let b = rt.box_i64(2).unwrap();
    assert_eq!(
        interp.call(h.func, &[RtValue::Ptr(obj), RtValue::Ptr(a)]),
        Ok(RtValue::int(8, 1))
    );
    assert_eq!(
        interp.call(h.func, &[RtValue::Ptr(obj), RtValue::Ptr(b)]),
        Ok(RtValue::int(8, 0))
    );
    assert_eq!(interp.runtime_mut().get_field(obj, 0), Ok(a));
    assert_eq!(interp.barriers().len(), 1);
}

#[test]
fn union_fields_store_the_selector() {
    let mut pool = TypePool::new();
    let u = pool.union(&[TypeId::INT64, TypeId::FLOAT64]);
    let t = pool
        .define_struct(StructDef::new("Holder").mutable().field(Field::new("v", u)))
        .unwrap();
    let h = write_fn(&mut pool, t, FieldOp::Set, AtomicOrdering::NotAtomic);
    assert_eq!(h.calls(RuntimeFn::WriteBarrier), 0);

    let mut interp = Interpreter::new(&h.module, &pool);
    let rt = interp.runtime_mut();
    let obj = rt.alloc_instance(t).unwrap();
    let f = rt.box_f64(0.5).unwrap();
    let i = rt.box_i64(4).unwrap();
    let s = rt.symbol("s").unwrap();

    interp.call(h.func, &[RtValue::Ptr(obj), RtValue::Ptr(f)]).unwrap();
    let got = interp.runtime_mut().get_field(obj, 0).unwrap();
    assert_eq!(interp.runtime().typeof_object(got), Ok(TypeId::FLOAT64));
    assert_eq!(interp.runtime().payload(got), Ok(0.5f64.to_le_bytes().to_vec()));

    interp.call(h.func, &[RtValue::Ptr(obj), RtValue::Ptr(i)]).unwrap();
    let got = interp.runtime_mut().get_field(obj, 0).unwrap();
    assert_eq!(interp.runtime().unbox_i64(got), Ok(4));

    let err = interp.call(h.func, &[RtValue::Ptr(obj), RtValue::Ptr(s)]).unwrap_err();
    assert!(matches!(err.as_trap(), Some(Trap::TypeError { context, .. }) if context == "setfield!"));
}

#[test]
fn large_atomic_fields_take_the_object_lock() {
    let mut pool = TypePool::new();
    let pair = pool.tuple(&[TypeId::INT64, TypeId::INT64, TypeId::INT64]).unwrap();
    let t = pool
        .define_struct(
            StructDef::new("Wide")
                .mutable()
                .field(Field::new("p", pair).atomic()),
        )
        .unwrap();
    let h = write_fn(&mut pool, t, FieldOp::Swap, AtomicOrdering::SequentiallyConsistent);
    assert_eq!(h.calls(RuntimeFn::LockValue), 1);
    assert_eq!(h.calls(RuntimeFn::UnlockValue), 1);
}
