//! `unbox(box(x), T) == x` for every representation path.

use ferrule_codegen::{CgValue, Repr};
use ferrule_ir::{InstKind, IrType, RuntimeFn};
use ferrule_rt::{Interpreter, RtValue};
use ferrule_types::{Field, StructDef, TypeId, TypePool};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::common::Unit;

/// box then unbox a parameter of the primitive `t`.
fn primitive_roundtrip(pool: &mut TypePool, unit: &mut Unit, t: TypeId, ir: IrType) -> ferrule_ir::FuncId {
    unit.lower(pool, &[ir.clone()], ir, |cx| {
        let v = cx.param_value(0, t);
        let boxed = cx.box_value(&v)?;
        let back = cx.unbox(&CgValue::boxed(boxed, t), t)?;
        Ok(Some(back))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn int64_through_a_register(x in any::<i64>()) {
        let mut pool = TypePool::new();
        let mut unit = Unit::new();
        let f = primitive_roundtrip(&mut pool, &mut unit, TypeId::INT64, IrType::I64);
        let mut interp = Interpreter::new(&unit.module, &pool);
        prop_assert_eq!(interp.call(f, &[RtValue::i64(x)]), Ok(RtValue::i64(x)));
    }

    #[test]
    fn float64_keeps_every_bit(bits in any::<u64>()) {
        let mut pool = TypePool::new();
        let mut unit = Unit::new();
        let f = primitive_roundtrip(&mut pool, &mut unit, TypeId::FLOAT64, IrType::Double);
        let x = f64::from_bits(bits);
        let mut interp = Interpreter::new(&unit.module, &pool);
        prop_assert_eq!(interp.call(f, &[RtValue::f64(x)]), Ok(RtValue::f64(x)));
    }

    #[test]
    fn structs_through_a_stack_slot(x in any::<i64>(), y in any::<f64>()) {
        let mut pool = TypePool::new();
        let p = pool
            .define_struct(
                StructDef::new("Point")
                    .field(Field::new("x", TypeId::INT64))
                    .field(Field::new("y", TypeId::FLOAT64)),
            )
            .unwrap();
        let ty = IrType::struct_of(vec![IrType::I64, IrType::Double]);
        let mut unit = Unit::new();
        let f = unit.lower(&mut pool, &[IrType::I64, IrType::Double], ty, |cx| {
            let args = [cx.param_value(0, TypeId::INT64), cx.param_value(1, TypeId::FLOAT64)];
            let v = cx.new_struct(p, &args)?;
            assert!(matches!(v.repr, Repr::Slot(_)));
            let boxed = cx.box_value(&v)?;
            cx.unbox(&CgValue::boxed(boxed, p), p).map(Some)
        });
        let mut interp = Interpreter::new(&unit.module, &pool);
        let out = interp.call(f, &[RtValue::i64(x), RtValue::f64(y)]);
        prop_assert_eq!(out, Ok(RtValue::agg(vec![RtValue::i64(x), RtValue::f64(y)])));
    }

    #[test]
    fn structs_with_roots_through_a_split(n in any::<i64>()) {
        let mut pool = TypePool::new();
        let t = pool
            .define_struct(
                StructDef::new("Mixed")
                    .field(Field::new("a", TypeId::ANY))
                    .field(Field::new("n", TypeId::INT64))
                    .field(Field::new("b", TypeId::ANY)),
            )
            .unwrap();
        let ty = IrType::struct_of(vec![IrType::TRACKED, IrType::I64, IrType::TRACKED]);
        let mut unit = Unit::new();
        let params = [IrType::TRACKED, IrType::I64, IrType::TRACKED];
        let f = unit.lower(&mut pool, &params, ty, |cx| {
            let args = [
                cx.param_value(0, TypeId::ANY),
                cx.param_value(1, TypeId::INT64),
                cx.param_value(2, TypeId::ANY),
            ];
            let v = cx.new_struct(t, &args)?;
            assert!(matches!(v.repr, Repr::Split(_)));
            let boxed = cx.box_value(&v)?;
            cx.unbox(&CgValue::boxed(boxed, t), t).map(Some)
        });
        let mut interp = Interpreter::new(&unit.module, &pool);
        let a = interp.runtime_mut().symbol("a").unwrap();
        let b = interp.runtime_mut().string("b").unwrap();
        let out = interp.call(f, &[RtValue::Ptr(a), RtValue::i64(n), RtValue::Ptr(b)]);
        prop_assert_eq!(
            out,
            Ok(RtValue::agg(vec![RtValue::Ptr(a), RtValue::i64(n), RtValue::Ptr(b)]))
        );
    }
}

#[test]
fn boxing_a_boxed_value_is_the_identity() {
    let mut pool = TypePool::new();
    let mut unit = Unit::new();
    let mut same = false;
    let f = unit.lower(&mut pool, &[IrType::TRACKED], IrType::TRACKED, |cx| {
        let p = cx.builder().param(0);
        let v = CgValue::boxed(p, TypeId::INT64);
        let boxed = cx.box_value(&v)?;
        same = boxed == p;
        Ok(Some(boxed))
    });
    assert!(same);
    assert_eq!(unit.calls(f, RuntimeFn::AllocObj), 0);
    assert_eq!(unit.count(f, |k| matches!(k, InstKind::Call { .. })), 0);

    let mut interp = Interpreter::new(&unit.module, &pool);
    let x = interp.runtime_mut().box_i64(1 << 40).unwrap();
    assert_eq!(interp.call(f, &[RtValue::Ptr(x)]), Ok(RtValue::Ptr(x)));
}
