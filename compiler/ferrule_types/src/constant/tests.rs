use pretty_assertions::assert_eq;

use super::*;
use crate::{Field, StructDef};

#[test]
fn bits_constants() {
    let pool = TypePool::new();
    assert_eq!(Constant::bool(true).bits_u64(), Some(1));
    assert_eq!(Constant::i64(-2).bits_u64(), Some(u64::MAX - 1));
    assert_eq!(Constant::int(&pool, TypeId::INT16, -1).bits_u64(), Some(0xffff));
    assert_eq!(Constant::f64(1.5).runtime_type(&pool), TypeId::FLOAT64);
    assert_eq!(Constant::symbol("a").bits_u64(), None);
}

#[test]
fn static_type_of_type_value() {
    let mut pool = TypePool::new();
    let c = Constant::Type(TypeId::INT64);
    let t = c.static_type(&mut pool);
    assert_eq!(pool.type_of_param(t), Some(TypeId::INT64));
    assert_eq!(c.runtime_type(&pool), TypeId::DATATYPE);
    assert_eq!(Constant::nothing().runtime_type(&pool), TypeId::NOTHING);
}

#[test]
fn fields_of_bits_constant() {
    let mut pool = TypePool::new();
    let t = pool
        .define_struct(
            StructDef::new("P")
                .field(Field::new("a", TypeId::INT8))
                .field(Field::new("b", TypeId::INT32))
                .field(Field::new("n", TypeId::NOTHING)),
        )
        .unwrap();
    let mut bytes = vec![0u8; 8];
    bytes[0] = 7;
    bytes[4..8].copy_from_slice(&300i32.to_le_bytes());
    let c = Constant::Bits {
        ty: t,
        bytes: bytes.into(),
    };
    assert!(c.is_defined_field(&pool, 1));
    assert!(!c.is_defined_field(&pool, 3));
    assert_eq!(c.field(&pool, 0).unwrap().bits_u64(), Some(7));
    assert_eq!(c.field(&pool, 1).unwrap().bits_u64(), Some(300));
    assert_eq!(c.field(&pool, 2), Some(Constant::Singleton(TypeId::NOTHING)));
}

#[test]
fn fields_of_struct_constant() {
    let pool = TypePool::new();
    let c = Constant::Struct {
        ty: TypeId::ANY,
        fields: Box::new([Constant::symbol("x"), Constant::i64(3)]),
    };
    assert_eq!(c.field(&pool, 0), Some(Constant::symbol("x")));
    assert!(c.is_defined_field(&pool, 1));
    assert!(!Constant::symbol("s").is_defined_field(&pool, 0));
}
