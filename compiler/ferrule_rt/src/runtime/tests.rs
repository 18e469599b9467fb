use pretty_assertions::assert_eq;

use super::*;
use crate::error::Trap;
use crate::value::RtValue;
use ferrule_ir::{GlobalKind, RuntimeFn};
use ferrule_types::abi::{memory_object, small_tag_word, smalltag, type_object};
use ferrule_types::{Constant, Field, StructDef};

// ── Helpers ──

fn pair_pool() -> (TypePool, TypeId) {
    let mut pool = TypePool::new();
    let pair = pool
        .define_struct(
            StructDef::new("Pair")
                .field(Field::new("a", TypeId::INT64))
                .field(Field::new("b", TypeId::ANY)),
        )
        .unwrap();
    (pool, pair)
}

fn trap(r: Result<RtValue, InterpError>) -> Trap {
    match r {
        Err(InterpError::Trap(t)) => t,
        other => panic!("expected a trap, got {other:?}"),
    }
}

// ── Permanent objects ──

#[test]
fn type_objects_are_interned_and_tagged_with_their_kind() {
    let pool = TypePool::new();
    let mut rt = Runtime::new(&pool);
    let a = rt.type_object(TypeId::INT64).unwrap();
    assert_eq!(rt.type_object(TypeId::INT64).unwrap(), a);
    assert_eq!(rt.heap().tag(a).unwrap(), small_tag_word(smalltag::DATATYPE));
    assert_eq!(
        rt.heap()
            .read_u32(a + u64::from(type_object::ID_OFFSET))
            .unwrap(),
        TypeId::INT64.raw()
    );
    assert_eq!(
        rt.heap()
            .read_u8(a + u64::from(type_object::FLAGS_OFFSET))
            .unwrap(),
        type_object::FLAG_CONCRETE
    );
    assert_eq!(rt.type_from_object(a).unwrap(), TypeId::INT64);
    let name = rt
        .heap()
        .read_u64(a + u64::from(type_object::NAME_OFFSET))
        .unwrap();
    let sym = rt.heap().read_u64(name).unwrap();
    assert_eq!(rt.text(sym).unwrap(), "Int64");
}

#[test]
fn large_tags_are_type_object_addresses() {
    let pool = TypePool::new();
    let mut rt = Runtime::new(&pool);
    let boxed = rt.box_f64(1.5).unwrap();
    let tobj = rt.type_object(TypeId::FLOAT64).unwrap();
    assert_eq!(rt.heap().tag(boxed).unwrap(), tobj);
    assert_eq!(rt.typeof_object(boxed).unwrap(), TypeId::FLOAT64);
}

#[test]
fn small_typeof_table_is_indexed_by_tag_word() {
    let pool = TypePool::new();
    let mut rt = Runtime::new(&pool);
    let table = rt.small_typeof_table().unwrap();
    let entry = rt
        .heap()
        .read_u64(table + small_tag_word(smalltag::INT64))
        .unwrap();
    assert_eq!(entry, rt.type_object(TypeId::INT64).unwrap());
    assert_eq!(rt.small_typeof_table().unwrap(), table);
}

#[test]
fn symbols_are_interned_strings_are_not() {
    let pool = TypePool::new();
    let mut rt = Runtime::new(&pool);
    assert_eq!(rt.symbol("x").unwrap(), rt.symbol("x").unwrap());
    let s1 = rt.string("hi").unwrap();
    let s2 = rt.string("hi").unwrap();
    assert_ne!(s1, s2);
    assert!(rt.egal(s1, s2).unwrap());
    assert_eq!(rt.typeof_object(s1).unwrap(), TypeId::STRING);
}

#[test]
fn small_values_come_from_the_box_cache() {
    let pool = TypePool::new();
    let mut rt = Runtime::new(&pool);
    let t1 = rt.box_bool(true).unwrap();
    let t2 = rt.box_bool(true).unwrap();
    assert_eq!(t1, t2);
    assert_ne!(t1, rt.box_bool(false).unwrap());
    let b = rt.box_bits(TypeId::UINT8, &[200]).unwrap();
    assert_eq!(b, rt.box_bits(TypeId::UINT8, &[200]).unwrap());
    assert_eq!(rt.payload(b).unwrap(), vec![200]);
    let n = rt.box_bits(TypeId::NOTHING, &[]).unwrap();
    assert_eq!(n, rt.singleton(TypeId::NOTHING).unwrap());
}

#[test]
fn empty_memory_points_at_its_own_inline_data() {
    let mut pool = TypePool::new();
    let m = pool.memory(TypeId::INT64).unwrap();
    let mut rt = Runtime::new(&pool);
    let e = rt.materialize_global(&GlobalKind::EmptyMemory(m)).unwrap();
    assert_eq!(rt.memory_length(e).unwrap(), 0);
    assert_eq!(
        rt.memory_data(e).unwrap(),
        e + u64::from(memory_object::INLINE_DATA_OFFSET)
    );
    assert_eq!(rt.new_memory(m, 0).unwrap(), e);
}

#[test]
fn constants_with_pointer_and_union_fields() {
    let mut pool = TypePool::new();
    let u = pool.union(&[TypeId::INT64, TypeId::FLOAT64]);
    let t = pool
        .define_struct(
            StructDef::new("Tagged")
                .field(Field::new("name", TypeId::SYMBOL))
                .field(Field::new("v", u)),
        )
        .unwrap();
    let c = Constant::Struct {
        ty: t,
        fields: vec![Constant::symbol("k"), Constant::f64(2.0)].into(),
    };
    let mut rt = Runtime::new(&pool);
    let obj = rt.box_constant(&c).unwrap();
    let name = rt.get_field(obj, 0).unwrap();
    assert_eq!(name, rt.symbol("k").unwrap());
    let v = rt.get_field(obj, 1).unwrap();
    assert_eq!(rt.typeof_object(v).unwrap(), TypeId::FLOAT64);
    assert_eq!(rt.payload(v).unwrap(), 2.0f64.to_le_bytes().to_vec());
}

// ── Values ──

#[test]
fn egal_compares_immutable_contents() {
    let (pool, pair) = pair_pool();
    let mut rt = Runtime::new(&pool);
    let x = rt.box_i64(7).unwrap();
    let y = rt.box_i64(7).unwrap();
    assert_ne!(x, y);
    assert!(rt.egal(x, y).unwrap());
    let eight = rt.box_i64(8).unwrap();
    let seven_f = rt.box_f64(7.0).unwrap();
    assert!(!rt.egal(x, eight).unwrap());
    assert!(!rt.egal(x, seven_f).unwrap());

    let p = rt.alloc_instance(pair).unwrap();
    let q = rt.alloc_instance(pair).unwrap();
    rt.set_field(p, 1, x).unwrap();
    rt.set_field(q, 1, y).unwrap();
    assert!(rt.egal(p, q).unwrap(), "pointer fields compare by egal");
    assert!(!rt.egal(p, 0).unwrap());
}

#[test]
fn egal_of_mutables_is_identity() {
    let mut pool = TypePool::new();
    let t = pool
        .define_struct(
            StructDef::new("Cell")
                .field(Field::new("x", TypeId::INT64))
                .mutable(),
        )
        .unwrap();
    let mut rt = Runtime::new(&pool);
    let a = rt.alloc_instance(t).unwrap();
    let b = rt.alloc_instance(t).unwrap();
    assert!(!rt.egal(a, b).unwrap());
    assert!(rt.egal(a, a).unwrap());
}

#[test]
fn isa_handles_unions_and_type_of() {
    let mut pool = TypePool::new();
    let u = pool.union(&[TypeId::INT64, TypeId::FLOAT64]);
    let ty_int = pool.type_of(TypeId::INT64);
    let mut rt = Runtime::new(&pool);
    let x = rt.box_i64(1).unwrap();
    assert!(rt.isa(x, u).unwrap());
    assert!(rt.isa(x, TypeId::SIGNED).unwrap());
    assert!(!rt.isa(x, TypeId::ABSTRACT_FLOAT).unwrap());
    let tobj = rt.type_object(TypeId::INT64).unwrap();
    assert!(rt.isa(tobj, ty_int).unwrap());
    assert!(!rt.isa(x, ty_int).unwrap());
    assert!(rt.isa(tobj, TypeId::DATATYPE).unwrap());
}

#[test]
fn field_reads_check_bounds_and_definedness() {
    let (pool, pair) = pair_pool();
    let mut rt = Runtime::new(&pool);
    let p = rt.alloc_instance(pair).unwrap();
    assert!(!rt.is_field_defined(p, 1).unwrap());
    assert_eq!(
        rt.get_field(p, 1),
        Err(InterpError::Trap(Trap::UndefRef))
    );
    assert_eq!(
        rt.get_field(p, 2),
        Err(InterpError::Trap(Trap::Bounds {
            container: "Pair".into(),
            index: 3
        }))
    );
    let a = rt.get_field(p, 0).unwrap();
    assert_eq!(rt.unbox_i64(a).unwrap(), 0);
}

#[test]
fn set_field_rejects_wrong_types() {
    let (pool, pair) = pair_pool();
    let mut rt = Runtime::new(&pool);
    let p = rt.alloc_instance(pair).unwrap();
    let f = rt.box_f64(1.0).unwrap();
    assert!(matches!(
        rt.set_field(p, 0, f),
        Err(InterpError::Trap(Trap::TypeError { .. }))
    ));
    let i = rt.box_i64(-3).unwrap();
    rt.set_field(p, 0, i).unwrap();
    let back = rt.get_field(p, 0).unwrap();
    assert_eq!(rt.unbox_i64(back).unwrap(), -3);
}

#[test]
fn large_memory_buffers_live_out_of_line() {
    let mut pool = TypePool::new();
    let m = pool.memory(TypeId::INT64).unwrap();
    let mut rt = Runtime::new(&pool);
    let small = rt.new_memory(m, 4).unwrap();
    assert_eq!(
        rt.memory_data(small).unwrap(),
        small + u64::from(memory_object::INLINE_DATA_OFFSET)
    );
    assert_eq!(rt.memory_length(small).unwrap(), 4);
    let big = rt.new_memory(m, 1000).unwrap();
    assert!(rt.memory_data(big).unwrap() != big + 16);
    assert_eq!(rt.heap().object_size(big), Some(16));
}

// ── Entry points ──

#[test]
fn error_entry_points_trap() {
    let (pool, pair) = pair_pool();
    let mut rt = Runtime::new(&pool);
    let msg = rt.c_string("boom").unwrap();
    assert_eq!(
        trap(rt.call_runtime(RuntimeFn::Error, &[RtValue::Ptr(msg)])),
        Trap::Error("boom".into())
    );
    assert_eq!(trap(rt.call_runtime(RuntimeFn::UndefRefError, &[])), Trap::UndefRef);

    let p = rt.alloc_instance(pair).unwrap();
    assert_eq!(
        trap(rt.call_runtime(RuntimeFn::BoundsError, &[RtValue::Ptr(p), RtValue::i64(5)])),
        Trap::Bounds {
            container: "Pair".into(),
            index: 5
        }
    );
    assert_eq!(
        trap(rt.call_runtime(
            RuntimeFn::BoundsErrorTuple,
            &[RtValue::Ptr(0), RtValue::i64(2), RtValue::i64(3)]
        )),
        Trap::Bounds {
            container: "2-element tuple".into(),
            index: 3
        }
    );

    let ctx = rt.c_string("f").unwrap();
    let expected = rt.type_object(TypeId::INT64).unwrap();
    let got = rt.box_f64(0.5).unwrap();
    assert_eq!(
        trap(rt.call_runtime(
            RuntimeFn::TypeError,
            &[RtValue::Ptr(ctx), RtValue::Ptr(expected), RtValue::Ptr(got)]
        )),
        Trap::TypeError {
            context: "f".into(),
            expected: "Int64".into(),
            got: "Float64".into()
        }
    );
}

#[test]
fn typeassert_and_isa_entry_points() {
    let pool = TypePool::new();
    let mut rt = Runtime::new(&pool);
    let x = rt.box_i64(1).unwrap();
    let int = rt.type_object(TypeId::INTEGER).unwrap();
    let float = rt.type_object(TypeId::ABSTRACT_FLOAT).unwrap();
    assert_eq!(
        rt.call_runtime(RuntimeFn::IsA, &[RtValue::Ptr(x), RtValue::Ptr(int)]),
        Ok(RtValue::int(32, 1))
    );
    assert_eq!(
        rt.call_runtime(RuntimeFn::TypeAssert, &[RtValue::Ptr(x), RtValue::Ptr(int)]),
        Ok(RtValue::Void)
    );
    assert!(matches!(
        trap(rt.call_runtime(RuntimeFn::TypeAssert, &[RtValue::Ptr(x), RtValue::Ptr(float)])),
        Trap::TypeError { context, .. } if context == "typeassert"
    ));
    let t = rt.call_runtime(RuntimeFn::TypeOf, &[RtValue::Ptr(x)]).unwrap();
    assert_eq!(t, RtValue::Ptr(rt.type_object(TypeId::INT64).unwrap()));
}

#[test]
fn box_entry_points_use_the_right_type() {
    let pool = TypePool::new();
    let mut rt = Runtime::new(&pool);
    let b = rt
        .call_runtime(RuntimeFn::BoxChar, &[RtValue::int(32, 0x41)])
        .unwrap()
        .as_ptr()
        .unwrap();
    assert_eq!(rt.typeof_object(b).unwrap(), TypeId::CHAR);
    assert_eq!(rt.payload(b).unwrap(), vec![0x41, 0, 0, 0]);
    let f = rt
        .call_runtime(RuntimeFn::BoxFloat32, &[RtValue::f32(1.0)])
        .unwrap()
        .as_ptr()
        .unwrap();
    assert_eq!(rt.typeof_object(f).unwrap(), TypeId::FLOAT32);
}

#[test]
fn arity_is_checked() {
    let pool = TypePool::new();
    let mut rt = Runtime::new(&pool);
    assert!(matches!(
        rt.call_runtime(RuntimeFn::Egal, &[RtValue::Ptr(0)]),
        Err(InterpError::Arity { expected: 2, got: 1, .. })
    ));
}

#[test]
fn barriers_and_locks_are_observable() {
    let (pool, pair) = pair_pool();
    let mut rt = Runtime::new(&pool);
    let p = rt.alloc_instance(pair).unwrap();
    let x = rt.box_i64(1).unwrap();
    rt.call_runtime(RuntimeFn::WriteBarrier, &[RtValue::Ptr(p), RtValue::Ptr(x)])
        .unwrap();
    assert_eq!(rt.barriers().len(), 1);
    assert_eq!(rt.barriers()[0].parent, p);
    assert_eq!(rt.barriers()[0].children.as_slice(), &[x]);

    rt.lock_value(p).unwrap();
    rt.lock_value(p).unwrap();
    rt.unlock_value(p).unwrap();
    assert!(rt.is_locked(p));
    rt.unlock_value(p).unwrap();
    assert!(!rt.is_locked(p));
    assert_eq!(rt.unlock_value(p), Err(InterpError::NotLocked { addr: p }));
}

#[test]
fn get_nth_field_checked_is_zero_based() {
    let (pool, pair) = pair_pool();
    let mut rt = Runtime::new(&pool);
    let p = rt.alloc_instance(pair).unwrap();
    let r = rt.call_runtime(
        RuntimeFn::GetNthFieldChecked,
        &[RtValue::Ptr(p), RtValue::i64(0)],
    );
    assert!(matches!(r, Ok(RtValue::Ptr(_))));
    assert_eq!(
        trap(rt.call_runtime(
            RuntimeFn::GetNthFieldChecked,
            &[RtValue::Ptr(p), RtValue::i64(-1)]
        )),
        Trap::Bounds {
            container: "Pair".into(),
            index: 0
        }
    );
}
