use pretty_assertions::assert_eq;

use super::*;
use crate::abi::smalltag;

#[test]
fn bootstrap_fixes_builtin_ids() {
    let pool = TypePool::new();
    assert_eq!(pool.format_type(TypeId::BOTTOM), "Union{}");
    assert_eq!(pool.format_type(TypeId::ANY), "Any");
    assert_eq!(pool.format_type(TypeId::DATATYPE), "DataType");
    assert_eq!(pool.format_type(TypeId::SIGNED), "Signed");
    assert_eq!(pool.format_type(TypeId::BOOL), "Bool");
    assert_eq!(pool.format_type(TypeId::INT64), "Int64");
    assert_eq!(pool.format_type(TypeId::CHAR), "Char");
    assert_eq!(pool.format_type(TypeId::PTR), "Ptr");
    assert_eq!(pool.format_type(TypeId::NOTHING), "Nothing");
    assert_eq!(pool.format_type(TypeId::EMPTY_TUPLE), "Tuple{}");
    assert_eq!(pool.format_type(TypeId::MEMORY), "Memory");
    assert!(pool.len() > TypeId::FIRST_DYNAMIC as usize);
}

#[test]
fn primitive_layouts() {
    let pool = TypePool::new();
    assert_eq!(pool.layout(TypeId::INT8).unwrap().size, 1);
    assert_eq!(pool.layout(TypeId::INT128).unwrap().size, 16);
    assert_eq!(pool.layout(TypeId::FLOAT16).unwrap().alignment, 2);
    assert_eq!(pool.layout(TypeId::PTR).unwrap().size, 8);
    assert!(pool.layout(TypeId::SYMBOL).is_none());
}

#[test]
fn pointer_size_follows_target() {
    let pool = TypePool::with_pointer_size(4);
    assert_eq!(pool.pointer_size(), 4);
    assert_eq!(pool.layout(TypeId::PTR).unwrap().size, 4);
}

#[test]
fn smalltags_are_assigned() {
    let pool = TypePool::new();
    assert_eq!(pool.smalltag(TypeId::BOOL), Some(smalltag::BOOL));
    assert_eq!(pool.smalltag(TypeId::UINT64), Some(smalltag::UINT64));
    assert_eq!(pool.smalltag(TypeId::UNIONALL), Some(smalltag::UNIONALL));
    assert_eq!(pool.smalltag(TypeId::FLOAT64), None);
}

#[test]
fn singletons_and_memory_name() {
    let mut pool = TypePool::new();
    assert!(pool.is_singleton(TypeId::NOTHING));
    assert!(pool.is_singleton(TypeId::EMPTY_TUPLE));
    assert!(!pool.is_singleton(TypeId::SYMBOL));
    let m = pool.memory(TypeId::INT64).unwrap();
    assert!(pool.is_memory(m));
    assert_eq!(pool.family_of(m), Some(TypeId::MEMORY));
}

#[test]
fn union_members_of_plain_type() {
    let mut pool = TypePool::new();
    assert_eq!(pool.union_members(TypeId::INT64).as_slice(), &[TypeId::INT64]);
    assert!(pool.union_members(TypeId::BOTTOM).is_empty());
    let u = pool.union(&[TypeId::FLOAT64, TypeId::INT64]);
    assert_eq!(
        pool.union_members(u).as_slice(),
        &[TypeId::INT64, TypeId::FLOAT64]
    );
}

#[test]
fn field_lookup() {
    let mut pool = TypePool::new();
    let t = pool
        .define_struct(
            StructDef::new("Point")
                .field(Field::new("x", TypeId::FLOAT64))
                .field(Field::new("y", TypeId::FLOAT64)),
        )
        .unwrap();
    assert_eq!(pool.nfields(t), 2);
    assert_eq!(pool.field_index(t, "y"), Some(1));
    assert_eq!(pool.field_type(t, 0), TypeId::FLOAT64);
    assert_eq!(pool.field_type(t, 7), TypeId::ANY);
    assert!(pool.ids().any(|id| id == t));
}
