use pretty_assertions::assert_eq;

use super::*;

fn prim(bits: u32) -> Layout {
    Layout::primitive(bits)
}

#[test]
fn primitive_alignment_is_capped() {
    assert_eq!(prim(8).alignment, 1);
    assert_eq!(prim(64).alignment, 8);
    assert_eq!(prim(256).alignment, MAX_ALIGN);
    assert!(prim(32).pointer_free());
}

#[test]
fn padding_between_fields() {
    let i8l = prim(8);
    let i64l = prim(64);
    let mut b = LayoutBuilder::new(8);
    b.push(FieldStorage::Inline(&i8l), false);
    b.push(FieldStorage::Inline(&i64l), false);
    let l = b.finish(false, false).unwrap();
    assert_eq!(l.size, 16);
    assert_eq!(l.alignment, 8);
    assert_eq!(l.fields[1].offset, 8);
    assert!(l.has_padding());
    assert!(!l.flags.contains(LayoutFlags::IS_BITS_EGAL));
}

#[test]
fn pointer_fields_are_tracked() {
    let i64l = prim(64);
    let mut b = LayoutBuilder::new(8);
    b.push(FieldStorage::Pointer, false);
    b.push(FieldStorage::Inline(&i64l), false);
    b.push(FieldStorage::Pointer, false);
    let l = b.finish(true, false).unwrap();
    assert_eq!(l.pointer_offsets.as_slice(), &[0, 16]);
    assert_eq!(l.first_ptr(), Some(0));
    assert!(l.flags.contains(LayoutFlags::IS_MUTABLE));
    assert!(!l.flags.all_pointers());
}

#[test]
fn all_pointer_struct() {
    let mut b = LayoutBuilder::new(8);
    b.push(FieldStorage::Pointer, false);
    b.push(FieldStorage::Pointer, false);
    let l = b.finish(false, true).unwrap();
    assert!(l.flags.all_pointers());
    assert!(l.flags.contains(LayoutFlags::HOMOGENEOUS));
}

#[test]
fn nested_pointer_offsets_are_shifted() {
    let mut inner = LayoutBuilder::new(8);
    inner.push(FieldStorage::Pointer, false);
    inner.push(FieldStorage::Pointer, false);
    let inner = inner.finish(false, true).unwrap();

    let i64l = prim(64);
    let mut outer = LayoutBuilder::new(8);
    outer.push(FieldStorage::Inline(&i64l), false);
    outer.push(FieldStorage::Inline(&inner), false);
    let l = outer.finish(false, false).unwrap();
    assert_eq!(l.pointer_offsets.as_slice(), &[8, 16]);
}

#[test]
fn union_field_has_trailing_selector() {
    let mut b = LayoutBuilder::new(8);
    b.push(FieldStorage::Union { size: 8, align: 8 }, false);
    let l = b.finish(false, false).unwrap();
    assert_eq!(l.fields[0].size, 9);
    assert_eq!(l.fields[0].selector_offset(), Some(8));
    assert_eq!(l.size, 16);
    assert!(l.flags.contains(LayoutFlags::HAS_UNION_FIELD));
    assert!(l.pointer_free());
}

#[test]
fn atomic_field_is_size_aligned() {
    let i8l = prim(8);
    let mut small = LayoutBuilder::new(8);
    small.push(FieldStorage::Inline(&i8l), false);
    small.push(FieldStorage::Inline(&i8l), false);
    small.push(FieldStorage::Inline(&i8l), false);
    let three = small.finish(false, false).unwrap();
    assert_eq!(three.alignment, 1);

    let mut b = LayoutBuilder::new(8);
    b.push(FieldStorage::Inline(&i8l), false);
    b.push(FieldStorage::Inline(&three), true);
    let l = b.finish(true, false).unwrap();
    assert_eq!(l.fields[1].offset, 4);
    assert!(l.flags.contains(LayoutFlags::HAS_ATOMIC_FIELD));
}

#[test]
fn empty_struct_is_zero_sized() {
    let l = LayoutBuilder::new(8).finish(false, false).unwrap();
    assert_eq!(l.size, 0);
    assert_eq!(l.alignment, 1);
    assert!(l.pointer_free());
}

mod proptest_layout {
    use proptest::prelude::*;

    use super::super::*;

    fn storage() -> impl Strategy<Value = u8> {
        0u8..6
    }

    proptest! {
        #[test]
        fn fields_are_aligned_and_disjoint(kinds in proptest::collection::vec(storage(), 0..12)) {
            let prims = [
                Layout::primitive(8),
                Layout::primitive(16),
                Layout::primitive(32),
                Layout::primitive(64),
            ];
            let mut b = LayoutBuilder::new(8);
            for k in &kinds {
                match k {
                    0..=3 => b.push(FieldStorage::Inline(&prims[usize::from(*k)]), false),
                    4 => b.push(FieldStorage::Pointer, false),
                    _ => b.push(FieldStorage::Union { size: 4, align: 4 }, false),
                }
            }
            let l = b.finish(false, false).unwrap();
            prop_assert_eq!(l.size % l.alignment, 0);
            let mut end = 0;
            for f in l.fields.iter() {
                prop_assert!(f.offset >= end);
                end = f.offset + f.size;
            }
            prop_assert!(end <= l.size);
            let ptrs = kinds.iter().filter(|k| **k == 4).count();
            prop_assert_eq!(l.npointers(), ptrs);
            for p in &l.pointer_offsets {
                prop_assert_eq!(p % 8, 0);
            }
        }
    }
}
