use super::*;

#[test]
fn helpers_match_bits() {
    let f = LayoutFlags::POINTER_FREE | LayoutFlags::IS_BITS_EGAL;
    assert!(f.pointer_free());
    assert!(!f.all_pointers());
    assert!(LayoutFlags::ALL_POINTERS.all_pointers());
}

#[test]
fn default_is_empty() {
    assert!(LayoutFlags::default().is_empty());
}
