//! Write barriers and GC roots.

use ferrule_codegen::{CgValue, FieldOp, Repr};
use ferrule_ir::{AtomicOrdering, IrType, RuntimeFn};
use ferrule_rt::{Interpreter, RtValue};
use ferrule_types::{Constant, Field, StructDef, TypeId, TypePool};
use pretty_assertions::assert_eq;

use super::common::Unit;

/// `mutable struct Ref; x::Any; end`
fn reference(pool: &mut TypePool) -> TypeId {
    pool.define_struct(
        StructDef::new("Ref")
            .mutable()
            .field(Field::new("x", TypeId::ANY)),
    )
    .unwrap()
}

#[test]
fn fresh_objects_stored_into_the_heap_keep_their_barrier() {
    let mut pool = TypePool::new();
    let r = reference(&mut pool);
    let cell = pool
        .define_struct(
            StructDef::new("Cell")
                .mutable()
                .field(Field::new("n", TypeId::INT64)),
        )
        .unwrap();
    let mut unit = Unit::new();
    let store_float = unit.lower(&mut pool, &[IrType::TRACKED, IrType::Double], IrType::Void, |cx| {
        let p = cx.builder().param(0);
        let v = cx.param_value(1, TypeId::FLOAT64);
        cx.setfield(&CgValue::boxed(p, r), 0, &v, FieldOp::Set, AtomicOrdering::NotAtomic)?;
        Ok(None)
    });
    let store_cell = unit.lower(&mut pool, &[IrType::TRACKED, IrType::I64], IrType::Void, |cx| {
        let p = cx.builder().param(0);
        let n = cx.param_value(1, TypeId::INT64);
        let c = cx.new_struct(cell, &[n])?;
        cx.setfield(&CgValue::boxed(p, r), 0, &c, FieldOp::Set, AtomicOrdering::NotAtomic)?;
        Ok(None)
    });
    assert_eq!(unit.calls(store_float, RuntimeFn::WriteBarrier), 1);
    assert_eq!(unit.calls(store_cell, RuntimeFn::WriteBarrier), 1);

    let mut interp = Interpreter::new(&unit.module, &pool);
    let obj = interp.runtime_mut().alloc_instance(r).unwrap();
    interp.call(store_float, &[RtValue::Ptr(obj), RtValue::f64(2.0)]).unwrap();
    interp.call(store_cell, &[RtValue::Ptr(obj), RtValue::i64(9)]).unwrap();
    let stored = interp.runtime_mut().get_field(obj, 0).unwrap();
    let barriers = interp.barriers();
    assert_eq!(barriers.len(), 2);
    assert!(barriers.iter().all(|b| b.parent == obj));
    assert_eq!(barriers[1].children.as_slice(), &[stored]);
}

#[test]
fn permanent_singletons_need_no_barrier() {
    let mut pool = TypePool::new();
    let r = reference(&mut pool);
    let mut unit = Unit::new();
    let singletons = [
        CgValue::ghost(TypeId::EMPTY_TUPLE),
        CgValue::ghost(TypeId::NOTHING),
    ];
    let fs: Vec<_> = singletons
        .iter()
        .map(|v| {
            unit.lower(&mut pool, &[IrType::TRACKED], IrType::Void, |cx| {
                let p = cx.builder().param(0);
                cx.setfield(&CgValue::boxed(p, r), 0, v, FieldOp::Set, AtomicOrdering::NotAtomic)?;
                Ok(None)
            })
        })
        .collect();
    for &f in &fs {
        assert_eq!(unit.calls(f, RuntimeFn::WriteBarrier), 0);
    }

    let mut interp = Interpreter::new(&unit.module, &pool);
    let obj = interp.runtime_mut().alloc_instance(r).unwrap();
    for (&f, v) in fs.iter().zip(&singletons) {
        interp.call(f, &[RtValue::Ptr(obj)]).unwrap();
        let want = interp.runtime_mut().singleton(v.ty).unwrap();
        assert_eq!(interp.runtime_mut().get_field(obj, 0), Ok(want));
    }
    assert!(interp.barriers().is_empty());
}

#[test]
fn split_values_root_their_pointers_in_field_order() {
    let mut pool = TypePool::new();
    let t = pool
        .define_struct(
            StructDef::new("Pair")
                .field(Field::new("first", TypeId::ANY))
                .field(Field::new("count", TypeId::INT64))
                .field(Field::new("second", TypeId::ANY)),
        )
        .unwrap();
    let params = [IrType::TRACKED, IrType::I64, IrType::TRACKED];
    let mut unit = Unit::new();
    for scalar in [None, Some(0), Some(-77)] {
        unit.lower(&mut pool, &params, IrType::Void, |cx| {
            let first = cx.param_value(0, TypeId::ANY);
            let count = match scalar {
                Some(n) => cx.const_value(Constant::i64(n)),
                None => cx.param_value(1, TypeId::INT64),
            };
            let second = cx.param_value(2, TypeId::ANY);
            let (a, b) = (cx.builder().param(0), cx.builder().param(2));
            let v = cx.new_struct(t, &[first, count, second])?;
            let Repr::Split(s) = &v.repr else {
                panic!("expected a split value, got {v:?}");
            };
            assert_eq!(s.roots.as_slice(), &[a, b]);
            Ok(None)
        });
    }
}
