//! Compare-and-swap on atomic fields.

use ferrule_codegen::{CgValue, FieldOp};
use ferrule_ir::{AtomicOrdering, IrType};
use ferrule_rt::{Interpreter, RtValue};
use ferrule_types::{Field, StructDef, TypeId, TypePool};
use pretty_assertions::assert_eq;

use super::common::Unit;

#[test]
fn replace_succeeds_only_against_the_current_value() {
    let mut pool = TypePool::new();
    let counter = pool
        .define_struct(
            StructDef::new("Counter")
                .mutable()
                .field(Field::new("n", TypeId::INT64).atomic()),
        )
        .unwrap();
    let params = [IrType::TRACKED, IrType::I64, IrType::I64];
    let mut unit = Unit::new();
    let cas = unit.lower(&mut pool, &params, IrType::TRACKED, |cx| {
        let p = cx.builder().param(0);
        let expected = cx.param_value(1, TypeId::INT64);
        let new = cx.param_value(2, TypeId::INT64);
        let res = cx.setfield(
            &CgValue::boxed(p, counter),
            0,
            &new,
            FieldOp::Replace { expected: &expected },
            AtomicOrdering::SequentiallyConsistent,
        )?;
        cx.box_value(&res).map(Some)
    });

    let (a, b, c) = (5, 8, 13);
    let mut interp = Interpreter::new(&unit.module, &pool);
    let rt = interp.runtime_mut();
    let obj = rt.alloc_instance(counter).unwrap();
    let init = rt.box_i64(a).unwrap();
    rt.set_field(obj, 0, init).unwrap();

    let attempt = |interp: &mut Interpreter<'_, '_>, expected: i64, new: i64| {
        let r = interp
            .call(cas, &[RtValue::Ptr(obj), RtValue::i64(expected), RtValue::i64(new)])
            .unwrap()
            .as_ptr()
            .unwrap();
        let rt = interp.runtime_mut();
        let old = rt.get_field(r, 0).unwrap();
        let ok = rt.get_field(r, 1).unwrap();
        let now = rt.get_field(obj, 0).unwrap();
        (
            rt.unbox_i64(old).unwrap(),
            rt.payload(ok).unwrap(),
            rt.unbox_i64(now).unwrap(),
        )
    };

    assert_eq!(attempt(&mut interp, a, b), (a, vec![1], b));
    // A stale expectation leaves the field alone and reports what it saw.
    assert_eq!(attempt(&mut interp, a, c), (b, vec![0], b));
}
