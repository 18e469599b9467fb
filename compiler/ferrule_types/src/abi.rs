//! Runtime object ABI shared by the lowering engine and the runtime.
//!
//! Every heap object is preceded by a one-word header holding its type
//! tag in the high bits and collector state in the low four bits. The tag
//! is either a small dense integer shifted left by [`TAG_SHIFT`] (for the
//! types in [`smalltag`]) or the address of the type object, which is
//! always aligned to [`SMALL_BYTE_ALIGNMENT`].

/// Bytes of header before every object.
pub const HEADER_SIZE: u32 = 8;

/// Low header bits reserved for the collector.
pub const TAG_SHIFT: u32 = 4;

/// Mask clearing the collector bits of a header word.
pub const TAG_MASK: u64 = !0xf;

/// Number of small tags. Tags below `MAX_TAGS << TAG_SHIFT` index the
/// small-typeof table; larger tags are type-object addresses.
pub const MAX_TAGS: u32 = 64;

/// Alignment of every heap object and type object.
pub const SMALL_BYTE_ALIGNMENT: u32 = 16;

/// Largest field that is updated with a single atomic instruction;
/// larger atomic fields are guarded by the object lock.
pub const MAX_ATOMIC_SIZE: u32 = 16;

/// Most variants a tagged union representation can enumerate.
pub const MAX_UNION_VARIANTS: u32 = 127;

/// Discriminant bit meaning "the value is held in the boxed pointer".
pub const UNION_BOX_MARKER: u8 = 0x80;

/// Discriminant bits holding the 1-based variant index.
pub const UNION_INDEX_MASK: u8 = 0x7f;

/// Dense tags for common built-in types.
pub mod smalltag {
    pub const TYPEOFBOTTOM: u32 = 1;
    pub const DATATYPE: u32 = 2;
    pub const UNIONALL: u32 = 3;
    pub const UNION: u32 = 4;
    pub const SYMBOL: u32 = 5;
    pub const STRING: u32 = 6;
    pub const BOOL: u32 = 7;
    pub const CHAR: u32 = 8;
    pub const INT8: u32 = 9;
    pub const UINT8: u32 = 10;
    pub const INT16: u32 = 11;
    pub const UINT16: u32 = 12;
    pub const INT32: u32 = 13;
    pub const UINT32: u32 = 14;
    pub const INT64: u32 = 15;
    pub const UINT64: u32 = 16;
}

/// Header tag word for a small tag.
#[inline]
pub const fn small_tag_word(tag: u32) -> u64 {
    (tag as u64) << TAG_SHIFT
}

/// Whether a tag word (collector bits cleared) is a small tag.
#[inline]
pub const fn is_small_tag_word(word: u64) -> bool {
    word < (MAX_TAGS as u64) << TAG_SHIFT
}

/// Layout of a type object.
pub mod type_object {
    /// Pointer to the type-name object.
    pub const NAME_OFFSET: u32 = 0;
    /// One byte of [`FLAG_CONCRETE`] and friends.
    pub const FLAGS_OFFSET: u32 = 8;
    /// The `TypeId` as a 32-bit integer.
    pub const ID_OFFSET: u32 = 16;
    pub const SIZE: u32 = 24;

    pub const FLAG_CONCRETE: u8 = 1 << 1;
}

/// Layout of a `Memory{T}` object.
pub mod memory_object {
    /// Element count, a machine-word integer.
    pub const LENGTH_OFFSET: u32 = 0;
    /// Pointer to the first element.
    pub const DATA_OFFSET: u32 = 8;
    /// Start of element data when it is allocated inline with the object.
    pub const INLINE_DATA_OFFSET: u32 = 16;
}

/// Largest allocation served from the pooled small-object allocator.
pub const MAX_POOLED_SIZE: u32 = 2032;
