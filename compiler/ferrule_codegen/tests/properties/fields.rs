//! Field reads across representations.

use ferrule_codegen::{CgValue, FieldOp, Repr};
use ferrule_ir::{AtomicOrdering, InstKind, IrType};
use ferrule_rt::{Interpreter, RtValue, Trap};
use ferrule_types::{Field, StructDef, TypeId, TypePool};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::common::Unit;

/// `struct Mixed; a::Any; n::Int64; b::Any; end`
fn mixed(pool: &mut TypePool) -> TypeId {
    pool.define_struct(
        StructDef::new("Mixed")
            .field(Field::new("a", TypeId::ANY))
            .field(Field::new("n", TypeId::INT64))
            .field(Field::new("b", TypeId::ANY)),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn split_and_native_reads_agree(n in any::<i64>(), idx in 0usize..3) {
        let mut pool = TypePool::new();
        let t = mixed(&mut pool);
        let mut unit = Unit::new();
        let params = [IrType::TRACKED, IrType::I64, IrType::TRACKED];
        let from_split = unit.lower(&mut pool, &params, IrType::TRACKED, |cx| {
            let args = [
                cx.param_value(0, TypeId::ANY),
                cx.param_value(1, TypeId::INT64),
                cx.param_value(2, TypeId::ANY),
            ];
            let v = cx.new_struct(t, &args)?;
            assert!(matches!(v.repr, Repr::Split(_)));
            let f = cx.getfield(&v, idx, AtomicOrdering::NotAtomic)?;
            cx.box_value(&f).map(Some)
        });
        let from_heap = unit.lower(&mut pool, &[IrType::TRACKED], IrType::TRACKED, |cx| {
            let p = cx.builder().param(0);
            let f = cx.getfield(&CgValue::boxed(p, t), idx, AtomicOrdering::NotAtomic)?;
            cx.box_value(&f).map(Some)
        });

        let mut interp = Interpreter::new(&unit.module, &pool);
        let rt = interp.runtime_mut();
        let a = rt.symbol("a").unwrap();
        let b = rt.string("b").unwrap();
        let boxed_n = rt.box_i64(n).unwrap();
        let obj = rt.alloc_instance(t).unwrap();
        for (i, v) in [a, boxed_n, b].into_iter().enumerate() {
            rt.set_field(obj, i, v).unwrap();
        }
        let x = interp
            .call(from_split, &[RtValue::Ptr(a), RtValue::i64(n), RtValue::Ptr(b)])
            .unwrap()
            .as_ptr()
            .unwrap();
        let y = interp.call(from_heap, &[RtValue::Ptr(obj)]).unwrap().as_ptr().unwrap();
        prop_assert_eq!(interp.runtime().egal(x, y), Ok(true));
        if idx == 1 {
            prop_assert_eq!(interp.runtime().unbox_i64(x), Ok(n));
        }
    }
}

#[test]
fn homogeneous_tuples_select_without_memory() {
    let mut pool = TypePool::new();
    let t = pool
        .tuple(&[TypeId::INT64, TypeId::INT64, TypeId::INT64])
        .unwrap();
    let arr = IrType::Array(3, Box::new(IrType::I64));
    let mut unit = Unit::new();
    let f = unit.lower(&mut pool, &[arr, IrType::I64], IrType::I64, |cx| {
        let v = cx.param_value(0, t);
        assert!(matches!(v.repr, Repr::Register { .. }));
        let i = cx.builder().param(1);
        let one = cx.builder().const_i64(1);
        let i0 = cx.builder().sub(i, one, "i0");
        let field = cx.getfield_unknown_index(&v, i0, false)?;
        cx.unbox(&field, TypeId::INT64).map(Some)
    });
    assert_eq!(unit.count(f, |k| matches!(k, InstKind::Select { .. })), 2);
    assert_eq!(unit.count(f, |k| matches!(k, InstKind::Load(_))), 0);

    let mut interp = Interpreter::new(&unit.module, &pool);
    let tuple = RtValue::agg(vec![RtValue::i64(10), RtValue::i64(20), RtValue::i64(30)]);
    for (i, want) in [(1, 10), (2, 20), (3, 30)] {
        assert_eq!(
            interp.call(f, &[tuple.clone(), RtValue::i64(i)]),
            Ok(RtValue::i64(want))
        );
    }
    let err = interp.call(f, &[tuple, RtValue::i64(4)]).unwrap_err();
    assert_eq!(
        err.as_trap(),
        Some(&Trap::Bounds {
            container: interp.runtime().format_type(t),
            index: 4
        })
    );
}

#[test]
fn undefined_reference_fields_fail_until_written() {
    let mut pool = TypePool::new();
    let node = pool
        .define_struct(
            StructDef::new("Node")
                .mutable()
                .field(Field::new("val", TypeId::INT64))
                .field(Field::new("next", TypeId::ANY))
                .uninitialized(1),
        )
        .unwrap();
    let mut unit = Unit::new();
    let read = unit.lower(&mut pool, &[IrType::TRACKED], IrType::TRACKED, |cx| {
        let p = cx.builder().param(0);
        let f = cx.getfield(&CgValue::boxed(p, node), 1, AtomicOrdering::NotAtomic)?;
        cx.box_value(&f).map(Some)
    });
    let write = unit.lower(&mut pool, &[IrType::TRACKED, IrType::TRACKED], IrType::Void, |cx| {
        let p = cx.builder().param(0);
        let rhs = cx.param_value(1, TypeId::ANY);
        cx.setfield(
            &CgValue::boxed(p, node),
            1,
            &rhs,
            FieldOp::Set,
            AtomicOrdering::NotAtomic,
        )?;
        Ok(None)
    });

    let mut interp = Interpreter::new(&unit.module, &pool);
    let obj = interp.runtime_mut().alloc_instance(node).unwrap();
    let err = interp.call(read, &[RtValue::Ptr(obj)]).unwrap_err();
    assert_eq!(err.as_trap(), Some(&Trap::UndefRef));

    let s = interp.runtime_mut().symbol("tail").unwrap();
    assert_eq!(interp.call(write, &[RtValue::Ptr(obj), RtValue::Ptr(s)]), Ok(RtValue::Void));
    assert_eq!(interp.call(read, &[RtValue::Ptr(obj)]), Ok(RtValue::Ptr(s)));
}
