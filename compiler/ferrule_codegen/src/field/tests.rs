use ferrule_ir::{AliasTag, AtomicOrdering, IrType, RuntimeFn};
use ferrule_rt::{Interpreter, RtValue, Trap};
use ferrule_types::{Field, StructDef, TypeId, TypePool};
use pretty_assertions::assert_eq;
use smallvec::smallvec;

use super::{split_value_field, SplitField};
use crate::cgval::{CgValue, Repr};
use crate::tests_util::Harness;

/// `struct Point; x::Int64; y::Float64; end`
fn point(pool: &mut TypePool) -> TypeId {
    pool.define_struct(
        StructDef::new("Point")
            .field(Field::new("x", TypeId::INT64))
            .field(Field::new("y", TypeId::FLOAT64)),
    )
    .unwrap()
}

/// `struct Pair; a; n::Int64; b; end`
fn mixed(pool: &mut TypePool) -> TypeId {
    pool.define_struct(
        StructDef::new("Mixed")
            .field(Field::new("a", TypeId::ANY))
            .field(Field::new("n", TypeId::INT64))
            .field(Field::new("b", TypeId::ANY)),
    )
    .unwrap()
}

#[test]
fn split_translation_keeps_native_offsets() {
    let mut pool = TypePool::new();
    let t = mixed(&mut pool);
    let l = pool.layout(t).unwrap();
    assert_eq!(
        split_value_field(l, 0, 8),
        Some(SplitField {
            bits_offset: None,
            first_root: 0,
            nroots: 1
        })
    );
    assert_eq!(
        split_value_field(l, 1, 8),
        Some(SplitField {
            bits_offset: Some(8),
            first_root: 1,
            nroots: 0
        })
    );
    assert_eq!(
        split_value_field(l, 2, 8),
        Some(SplitField {
            bits_offset: None,
            first_root: 1,
            nroots: 1
        })
    );
    assert_eq!(split_value_field(l, 3, 8), None);

    let all = pool.tuple(&[TypeId::ANY, TypeId::SYMBOL]).unwrap();
    let l = pool.layout(all).unwrap();
    assert!(l.flags.all_pointers());
    assert_eq!(
        split_value_field(l, 1, 8),
        Some(SplitField {
            bits_offset: None,
            first_root: 1,
            nroots: 1
        })
    );
}

#[test]
fn boxed_immutable_fields_defer_to_slots() {
    let mut pool = TypePool::new();
    let p = point(&mut pool);
    let mut h = Harness::new(&[IrType::TRACKED], IrType::Double);
    let mut cx = h.cx(&mut pool);
    let obj = cx.b.param(0);
    let y = cx
        .getfield(&CgValue::boxed(obj, p), 1, AtomicOrdering::NotAtomic)
        .unwrap();
    assert!(matches!(y.repr, Repr::Slot(_)));
    let bits = cx.unbox(&y, TypeId::FLOAT64).unwrap();
    cx.b.ret(bits);
    cx.finish().unwrap();
    h.verify();

    let mut interp = Interpreter::new(&h.module, &pool);
    let rt = interp.runtime_mut();
    let obj = rt.alloc_instance(p).unwrap();
    let y = rt.box_f64(2.5).unwrap();
    rt.set_field(obj, 1, y).unwrap();
    assert_eq!(interp.call(h.func, &[RtValue::Ptr(obj)]), Ok(RtValue::f64(2.5)));
}

#[test]
fn register_fields_extract_members() {
    let mut pool = TypePool::new();
    let p = point(&mut pool);
    let ty = IrType::struct_of(vec![IrType::I64, IrType::Double]);
    let mut h = Harness::new(&[ty], IrType::I64);
    let mut cx = h.cx(&mut pool);
    let v = cx.param_value(0, p);
    let x = cx.getfield(&v, 0, AtomicOrdering::NotAtomic).unwrap();
    let bits = cx.unbox(&x, TypeId::INT64).unwrap();
    cx.b.ret(bits);
    cx.finish().unwrap();
    assert_eq!(h.count(|k| matches!(k, ferrule_ir::InstKind::Load(_))), 0);

    let mut interp = Interpreter::new(&h.module, &pool);
    let arg = RtValue::agg(vec![RtValue::i64(3), RtValue::f64(1.0)]);
    assert_eq!(interp.call(h.func, &[arg]), Ok(RtValue::i64(3)));
}

#[test]
fn atomic_mismatch_is_an_unconditional_error() {
    let mut pool = TypePool::new();
    let t = pool
        .define_struct(
            StructDef::new("Counter")
                .mutable()
                .field(Field::new("n", TypeId::INT64).atomic()),
        )
        .unwrap();
    let mut h = Harness::new(&[IrType::TRACKED], IrType::Void);
    let mut cx = h.cx(&mut pool);
    let obj = cx.b.param(0);
    let v = cx
        .getfield(&CgValue::boxed(obj, t), 0, AtomicOrdering::NotAtomic)
        .unwrap();
    assert!(v.is_bottom());
    cx.b.ret_void();
    cx.finish().unwrap();
    assert_eq!(h.calls(RuntimeFn::AtomicError), 1);

    let mut interp = Interpreter::new(&h.module, &pool);
    let obj = interp.runtime_mut().alloc_instance(t).unwrap();
    let err = interp.call(h.func, &[RtValue::Ptr(obj)]).unwrap_err();
    assert_eq!(
        err.as_trap(),
        Some(&Trap::Atomic(
            "getfield: atomic field cannot be accessed non-atomically".into()
        ))
    );
}

#[test]
fn atomic_reads_snapshot_the_field() {
    let mut pool = TypePool::new();
    let t = pool
        .define_struct(
            StructDef::new("Counter")
                .mutable()
                .field(Field::new("n", TypeId::INT64).atomic()),
        )
        .unwrap();
    let mut h = Harness::new(&[IrType::TRACKED], IrType::I64);
    let mut cx = h.cx(&mut pool);
    let obj = cx.b.param(0);
    let v = cx
        .getfield(&CgValue::boxed(obj, t), 0, AtomicOrdering::Acquire)
        .unwrap();
    let bits = cx.unbox(&v, TypeId::INT64).unwrap();
    cx.b.ret(bits);
    cx.finish().unwrap();
    h.verify();

    let mut interp = Interpreter::new(&h.module, &pool);
    let rt = interp.runtime_mut();
    let obj = rt.alloc_instance(t).unwrap();
    let n = rt.box_i64(41).unwrap();
    rt.set_field(obj, 0, n).unwrap();
    assert_eq!(interp.call(h.func, &[RtValue::Ptr(obj)]), Ok(RtValue::i64(41)));
}

#[test]
fn union_fields_read_selector_and_payload() {
    let mut pool = TypePool::new();
    let u = pool.union(&[TypeId::INT64, TypeId::FLOAT64]);
    let t = pool
        .define_struct(StructDef::new("Holder").mutable().field(Field::new("v", u)))
        .unwrap();
    let mut h = Harness::new(&[IrType::TRACKED], IrType::TRACKED);
    let mut cx = h.cx(&mut pool);
    let obj = cx.b.param(0);
    let v = cx
        .getfield(&CgValue::boxed(obj, t), 0, AtomicOrdering::NotAtomic)
        .unwrap();
    let Repr::Union(uv) = &v.repr else {
        panic!("expected a union value, got {v:?}");
    };
    assert_eq!(uv.tbaa, AliasTag::Stack);
    let boxed = cx.box_value(&v).unwrap();
    cx.b.ret(boxed);
    cx.finish().unwrap();
    h.verify();

    let mut interp = Interpreter::new(&h.module, &pool);
    let obj = interp.runtime_mut().alloc_instance(t).unwrap();
    for (val, ty) in [(1.5f64.to_le_bytes(), TypeId::FLOAT64), (7i64.to_le_bytes(), TypeId::INT64)] {
        let b = interp.runtime_mut().box_bits(ty, &val).unwrap();
        interp.runtime_mut().set_field(obj, 0, b).unwrap();
        let out = interp.call(h.func, &[RtValue::Ptr(obj)]).unwrap().as_ptr().unwrap();
        assert_eq!(interp.runtime().typeof_object(out).unwrap(), ty);
        assert_eq!(interp.runtime().payload(out).unwrap(), val.to_vec());
    }
}

#[test]
fn split_values_read_roots_and_bits() {
    let mut pool = TypePool::new();
    let t = mixed(&mut pool);
    let mut h = Harness::new(&[IrType::TRACKED, IrType::I64, IrType::TRACKED], IrType::I64);
    let mut cx = h.cx(&mut pool);
    let (a, n, b) = (cx.b.param(0), cx.b.param(1), cx.b.param(2));
    let ty = cx.ir_type(t);
    let bits = cx.b.alloca(ty, 8, "bits");
    let at = cx.b.gep_bytes(bits, 8, "n");
    cx.b.store(n, at, 8, Some(AliasTag::Stack));
    let v = CgValue::split(Some(bits), smallvec![a, b], t);

    let second = cx.getfield(&v, 2, AtomicOrdering::NotAtomic).unwrap();
    assert_eq!(second, CgValue::boxed(b, TypeId::ANY));
    let first = cx.getfield(&v, 0, AtomicOrdering::NotAtomic).unwrap();
    assert_eq!(first, CgValue::boxed(a, TypeId::ANY));
    let mid = cx.getfield(&v, 1, AtomicOrdering::NotAtomic).unwrap();
    let out = cx.unbox(&mid, TypeId::INT64).unwrap();
    cx.b.ret(out);
    cx.finish().unwrap();

    let mut interp = Interpreter::new(&h.module, &pool);
    let s = interp.runtime_mut().symbol("s").unwrap();
    assert_eq!(
        interp.call(h.func, &[RtValue::Ptr(s), RtValue::i64(7), RtValue::Ptr(s)]),
        Ok(RtValue::i64(7))
    );
}

#[test]
fn unknown_index_into_mutable_storage_loads() {
    let mut pool = TypePool::new();
    let t = pool
        .define_struct(
            StructDef::new("Triple")
                .mutable()
                .field(Field::new("a", TypeId::INT64))
                .field(Field::new("b", TypeId::INT64))
                .field(Field::new("c", TypeId::INT64)),
        )
        .unwrap();
    let mut h = Harness::new(&[IrType::TRACKED, IrType::I64], IrType::I64);
    let mut cx = h.cx(&mut pool);
    let obj = cx.b.param(0);
    let idx = cx.b.param(1);
    let v = cx
        .getfield_unknown_index(&CgValue::boxed(obj, t), idx, false)
        .unwrap();
    assert!(matches!(v.repr, Repr::Register { .. }));
    let bits = cx.unbox(&v, TypeId::INT64).unwrap();
    cx.b.ret(bits);
    cx.finish().unwrap();
    h.verify();
    assert_eq!(h.calls(RuntimeFn::GetNthFieldChecked), 0);

    let mut interp = Interpreter::new(&h.module, &pool);
    let rt = interp.runtime_mut();
    let obj = rt.alloc_instance(t).unwrap();
    for (i, n) in [10, 20, 30].into_iter().enumerate() {
        let b = rt.box_i64(n).unwrap();
        rt.set_field(obj, i, b).unwrap();
    }
    assert_eq!(interp.call(h.func, &[RtValue::Ptr(obj), RtValue::i64(1)]), Ok(RtValue::i64(20)));
    assert_eq!(interp.call(h.func, &[RtValue::Ptr(obj), RtValue::i64(2)]), Ok(RtValue::i64(30)));
    let err = interp
        .call(h.func, &[RtValue::Ptr(obj), RtValue::i64(3)])
        .unwrap_err();
    assert_eq!(
        err.as_trap(),
        Some(&Trap::Bounds {
            container: "Triple".into(),
            index: 4
        })
    );
}

#[test]
fn mixed_unknown_index_goes_through_the_runtime() {
    let mut pool = TypePool::new();
    let p = point(&mut pool);
    let ty = IrType::struct_of(vec![IrType::I64, IrType::Double]);
    let mut h = Harness::new(&[ty, IrType::I64], IrType::TRACKED);
    let mut cx = h.cx(&mut pool);
    let v = cx.param_value(0, p);
    let idx = cx.b.param(1);
    let f = cx.getfield_unknown_index(&v, idx, false).unwrap();
    let joined = cx.pool_mut().union(&[TypeId::INT64, TypeId::FLOAT64]);
    assert_eq!(f.ty, joined);
    let boxed = cx.box_value(&f).unwrap();
    cx.b.ret(boxed);
    cx.finish().unwrap();
    assert_eq!(h.calls(RuntimeFn::GetNthFieldChecked), 1);

    let mut interp = Interpreter::new(&h.module, &pool);
    let arg = RtValue::agg(vec![RtValue::i64(3), RtValue::f64(0.5)]);
    let out = interp
        .call(h.func, &[arg, RtValue::i64(1)])
        .unwrap()
        .as_ptr()
        .unwrap();
    assert_eq!(interp.runtime().typeof_object(out).unwrap(), TypeId::FLOAT64);
}
