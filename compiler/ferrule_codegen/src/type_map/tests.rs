use ferrule_ir::IrType;
use ferrule_types::{Field, PrimitiveClass, StructDef, TypeId, TypePool};
use pretty_assertions::assert_eq;

use super::*;
use crate::tests_util::Harness;

#[test]
fn primitives_keep_their_native_width() {
    let mut pool = TypePool::new();
    let mut h = Harness::new(&[], IrType::Void);
    let mut cx = h.cx(&mut pool);
    assert_eq!(cx.ir_type(TypeId::INT64), IrType::I64);
    assert_eq!(cx.ir_type(TypeId::BOOL), IrType::I8);
    assert_eq!(cx.ir_type(TypeId::FLOAT64), IrType::Double);
    assert_eq!(cx.ir_type(TypeId::FLOAT16), IrType::Half);
    assert_eq!(cx.ir_type(TypeId::CHAR), IrType::Int(32));
    assert_eq!(
        primitive_ir_type(PrimitiveClass::Float, 128),
        IrType::Int(128)
    );
}

#[test]
fn abstract_mutable_and_singleton_types() {
    let mut pool = TypePool::new();
    let cell = pool
        .define_struct(
            StructDef::new("Cell")
                .mutable()
                .field(Field::new("x", TypeId::INT64)),
        )
        .unwrap();
    let mut h = Harness::new(&[], IrType::Void);
    let mut cx = h.cx(&mut pool);
    assert_eq!(cx.type_repr(TypeId::ANY), TypeRepr::Boxed);
    assert_eq!(cx.type_repr(TypeId::REAL), TypeRepr::Boxed);
    assert_eq!(cx.type_repr(cell), TypeRepr::Boxed);
    assert_eq!(cx.type_repr(TypeId::NOTHING), TypeRepr::Ghost);
    assert_eq!(cx.type_repr(TypeId::BOTTOM), TypeRepr::Ghost);
    assert_eq!(cx.ir_type(TypeId::NOTHING), IrType::struct_of(Vec::new()));
    assert!(cx.deserves_stack(TypeId::NOTHING));
    assert!(!cx.deserves_stack(cell));
}

#[test]
fn structs_mirror_their_fields() {
    let mut pool = TypePool::new();
    let t = pool
        .define_struct(
            StructDef::new("Mixed")
                .field(Field::new("n", TypeId::INT32))
                .field(Field::new("x", TypeId::FLOAT64))
                .field(Field::new("r", TypeId::ANY)),
        )
        .unwrap();
    let mut h = Harness::new(&[], IrType::Void);
    let mut cx = h.cx(&mut pool);
    let s = cx.struct_repr(t).unwrap();
    assert_eq!(
        s.ty,
        IrType::struct_of(vec![IrType::Int(32), IrType::Double, IrType::TRACKED])
    );
    assert!(!s.is_homogeneous());
    assert_eq!(s.fields[2], FieldMembers { first: 2, count: 1 });
    assert_eq!(cx.type_repr(t), TypeRepr::Unboxed(s.ty.clone()));
}

#[test]
fn homogeneous_tuples_become_arrays() {
    let mut pool = TypePool::new();
    let t = pool
        .tuple(&[TypeId::INT64, TypeId::INT64, TypeId::INT64])
        .unwrap();
    let mut h = Harness::new(&[], IrType::Void);
    let mut cx = h.cx(&mut pool);
    let s = cx.struct_repr(t).unwrap();
    assert!(s.is_homogeneous());
    assert_eq!(s.ty, IrType::Array(3, Box::new(IrType::I64)));
    assert_eq!(s.fields.len(), 3);
}

#[test]
fn union_fields_flatten_into_words_and_a_selector() {
    let mut pool = TypePool::new();
    let u = pool.union(&[TypeId::INT64, TypeId::FLOAT64]);
    let t = pool
        .define_struct(
            StructDef::new("Either")
                .field(Field::new("tag", TypeId::INT64))
                .field(Field::new("v", u)),
        )
        .unwrap();
    let mut h = Harness::new(&[], IrType::Void);
    let mut cx = h.cx(&mut pool);
    assert_eq!(cx.union_payload(u), Some((8, 8)));
    let s = cx.struct_repr(t).unwrap();
    let v = s.fields[1];
    assert_eq!(v, FieldMembers { first: 1, count: 2 });
    assert_eq!(v.selector(), 2);
    assert_eq!(
        s.ty,
        IrType::struct_of(vec![
            IrType::I64,
            IrType::Array(1, Box::new(IrType::I64)),
            IrType::I8,
        ])
    );
}

#[test]
fn union_members_pad_to_the_payload_size() {
    assert_eq!(
        union_members(6, 4).into_vec(),
        vec![
            IrType::Array(1, Box::new(IrType::Int(32))),
            IrType::I8,
            IrType::I8,
            IrType::I8,
        ]
    );
    assert_eq!(union_members(0, 1).into_vec(), vec![IrType::I8]);
}
