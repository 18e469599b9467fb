//! `isa` soundness and union discriminants.

use ferrule_codegen::{CgValue, Repr};
use ferrule_ir::{AtomicOrdering, InstKind, IrType};
use ferrule_rt::{Interpreter, RtValue};
use ferrule_types::{Field, StructDef, TypeId, TypePool};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::common::Unit;

const LEAVES: [TypeId; 12] = [
    TypeId::ANY,
    TypeId::NUMBER,
    TypeId::REAL,
    TypeId::INTEGER,
    TypeId::SIGNED,
    TypeId::INT64,
    TypeId::INT32,
    TypeId::FLOAT64,
    TypeId::BOOL,
    TypeId::SYMBOL,
    TypeId::STRING,
    TypeId::NOTHING,
];

/// A leaf, or a union of up to three leaves.
fn pick() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(0..LEAVES.len(), 1..4)
}

fn build(pool: &mut TypePool, picks: &[usize]) -> TypeId {
    let ts: Vec<_> = picks.iter().map(|&i| LEAVES[i]).collect();
    pool.union(&ts)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn provable_answers_fold_without_calls(s in pick(), t in pick()) {
        let mut pool = TypePool::new();
        let s = build(&mut pool, &s);
        let t = build(&mut pool, &t);
        let sub = pool.subtype(s, t);
        let disjoint = pool.intersect(s, t) == TypeId::BOTTOM;
        let mut unit = Unit::new();
        let mut known = None;
        let f = unit.lower(&mut pool, &[IrType::TRACKED], IrType::I1, |cx| {
            let p = cx.builder().param(0);
            let (ok, _) = cx.emit_isa(&CgValue::boxed(p, s), t, None)?;
            known = cx.builder().const_value(ok);
            Ok(Some(ok))
        });
        if sub {
            prop_assert_eq!(known, Some(1));
            prop_assert_eq!(unit.count(f, |k| matches!(k, InstKind::Call { .. })), 0);
        }
        if disjoint {
            prop_assert_eq!(known, Some(0));
        }
    }
}

#[test]
fn union_selectors_name_exactly_one_member() {
    let mut pool = TypePool::new();
    let u = pool.union(&[TypeId::INT64, TypeId::FLOAT64, TypeId::BOOL]);
    let holder = pool
        .define_struct(StructDef::new("Holder").mutable().field(Field::new("v", u)))
        .unwrap();
    let members = pool.union_members(u);
    assert_eq!(pool.count_union_small(u), (3, true));

    let read = |cx: &mut ferrule_codegen::CodegenCx<'_>| {
        let p = cx.builder().param(0);
        cx.getfield(&CgValue::boxed(p, holder), 0, AtomicOrdering::NotAtomic)
    };
    let mut unit = Unit::new();
    let selector = unit.lower(&mut pool, &[IrType::TRACKED], IrType::I8, |cx| {
        let v = read(cx)?;
        let Repr::Union(uv) = &v.repr else {
            panic!("expected a union value, got {v:?}");
        };
        Ok(Some(uv.tindex))
    });
    let exact: Vec<_> = members
        .iter()
        .map(|&m| {
            unit.lower(&mut pool, &[IrType::TRACKED], IrType::I1, |cx| {
                let v = read(cx)?;
                cx.exactly_isa(&v, m).map(Some)
            })
        })
        .collect();

    let mut interp = Interpreter::new(&unit.module, &pool);
    let obj = interp.runtime_mut().alloc_instance(holder).unwrap();
    for &m in &members {
        let rt = interp.runtime_mut();
        let val = match m {
            TypeId::INT64 => rt.box_i64(-3),
            TypeId::FLOAT64 => rt.box_f64(0.25),
            _ => rt.box_bool(true),
        }
        .unwrap();
        rt.set_field(obj, 0, val).unwrap();

        let k = interp
            .call(selector, &[RtValue::Ptr(obj)])
            .unwrap()
            .as_u64()
            .unwrap();
        assert!((1..=3).contains(&k), "selector {k} out of range");
        assert_eq!(k, u64::from(pool.box_tindex(m, u)));
        for (j, &f) in exact.iter().enumerate() {
            let hit = interp.call(f, &[RtValue::Ptr(obj)]).unwrap();
            let expected = u64::try_from(j + 1).unwrap() == k;
            assert_eq!(hit, RtValue::bool(expected), "member {j} against selector {k}");
        }
    }
}
