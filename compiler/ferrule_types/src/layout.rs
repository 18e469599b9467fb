//! Concrete memory layouts.
//!
//! A [`Layout`] describes the bytes of one instance of a concrete type:
//! total size, alignment, where each field lives, and where every tracked
//! pointer sits (recursively through inline fields). Layouts are computed
//! once at type definition and never change.
//!
//! Field storage rules:
//!
//! | Field type                        | Stored as                          |
//! |-----------------------------------|------------------------------------|
//! | concrete immutable with a layout  | inline, using the field's layout   |
//! | union of pointer-free concretes   | inline bytes + trailing selector   |
//! | anything else                     | one tracked pointer                |

use smallvec::SmallVec;

use crate::LayoutFlags;

/// Largest alignment the layout engine will produce.
pub const MAX_ALIGN: u32 = 16;

/// Largest instance size accepted for an inline layout.
pub const MAX_LAYOUT_SIZE: u64 = 1 << 31;

/// Position and storage of one field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldLayout {
    pub offset: u32,
    /// Bytes occupied, including the selector byte of an inline union.
    pub size: u32,
    pub isptr: bool,
    /// Inline bits-union: the selector byte is the last byte of the field.
    pub isunion: bool,
}

impl FieldLayout {
    /// Byte offset of the union selector, if this is an inline union field.
    pub fn selector_offset(&self) -> Option<u32> {
        self.isunion.then(|| self.offset + self.size - 1)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub size: u32,
    pub alignment: u32,
    pub fields: Box<[FieldLayout]>,
    /// Byte offsets of every tracked pointer, ascending, including those
    /// nested inside inline fields.
    pub pointer_offsets: SmallVec<[u32; 4]>,
    pub flags: LayoutFlags,
}

impl Layout {
    /// Layout of a primitive of `bits` width.
    ///
    /// The caller has already checked that the width is a whole,
    /// power-of-two number of bytes.
    pub fn primitive(bits: u32) -> Self {
        let size = bits / 8;
        Self {
            size,
            alignment: size.clamp(1, MAX_ALIGN),
            fields: Box::new([]),
            pointer_offsets: SmallVec::new(),
            flags: LayoutFlags::POINTER_FREE | LayoutFlags::IS_BITS_EGAL,
        }
    }

    /// Layout of an opaque handle-sized payload (a single tracked pointer).
    pub fn single_pointer(pointer_size: u32) -> Self {
        let mut pointer_offsets = SmallVec::new();
        pointer_offsets.push(0);
        Self {
            size: pointer_size,
            alignment: pointer_size,
            fields: Box::new([FieldLayout {
                offset: 0,
                size: pointer_size,
                isptr: true,
                isunion: false,
            }]),
            pointer_offsets,
            flags: LayoutFlags::ALL_POINTERS,
        }
    }

    pub fn npointers(&self) -> usize {
        self.pointer_offsets.len()
    }

    /// Offset of the first tracked pointer.
    pub fn first_ptr(&self) -> Option<u32> {
        self.pointer_offsets.first().copied()
    }

    pub fn field(&self, idx: usize) -> Option<&FieldLayout> {
        self.fields.get(idx)
    }

    pub fn has_padding(&self) -> bool {
        self.flags.contains(LayoutFlags::HAS_PADDING)
    }

    pub fn pointer_free(&self) -> bool {
        self.flags.pointer_free()
    }
}

/// How a field will be stored, as decided by the pool.
#[derive(Clone, Copy, Debug)]
pub enum FieldStorage<'a> {
    Pointer,
    Inline(&'a Layout),
    /// Inline union: largest member size and alignment, selector excluded.
    Union { size: u32, align: u32 },
}

/// Incremental struct layout computation.
pub struct LayoutBuilder {
    pointer_size: u32,
    offset: u64,
    alignment: u32,
    fields: Vec<FieldLayout>,
    pointer_offsets: SmallVec<[u32; 4]>,
    flags: LayoutFlags,
    bits_egal: bool,
}

impl LayoutBuilder {
    pub fn new(pointer_size: u32) -> Self {
        Self {
            pointer_size,
            offset: 0,
            alignment: 1,
            fields: Vec::new(),
            pointer_offsets: SmallVec::new(),
            flags: LayoutFlags::empty(),
            bits_egal: true,
        }
    }

    /// Append a field. `atomic` inline fields up to [`MAX_ALIGN`] bytes are
    /// aligned to their power-of-two size so a single instruction can
    /// access them.
    pub fn push(&mut self, storage: FieldStorage<'_>, atomic: bool) {
        let (size, mut align, isptr, isunion) = match storage {
            FieldStorage::Pointer => (self.pointer_size, self.pointer_size, true, false),
            FieldStorage::Inline(l) => (l.size, l.alignment, false, false),
            FieldStorage::Union { size, align } => (size + 1, align.max(1), false, true),
        };
        if atomic {
            self.flags |= LayoutFlags::HAS_ATOMIC_FIELD;
            if !isptr && size > 0 && size <= MAX_ALIGN {
                align = align.max(size.next_power_of_two()).min(MAX_ALIGN);
            }
        }
        let aligned = self.offset.next_multiple_of(u64::from(align));
        if aligned != self.offset {
            self.flags |= LayoutFlags::HAS_PADDING;
        }
        self.offset = aligned;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "offsets are bounded by MAX_LAYOUT_SIZE at finish"
        )]
        let offset = aligned as u32;
        match storage {
            FieldStorage::Pointer => {
                self.pointer_offsets.push(offset);
                self.bits_egal = false;
            }
            FieldStorage::Inline(l) => {
                self.pointer_offsets
                    .extend(l.pointer_offsets.iter().map(|p| offset + p));
                if l.has_padding() {
                    self.flags |= LayoutFlags::HAS_PADDING;
                }
                if !l.flags.contains(LayoutFlags::IS_BITS_EGAL) {
                    self.bits_egal = false;
                }
            }
            FieldStorage::Union { .. } => {
                self.flags |= LayoutFlags::HAS_UNION_FIELD | LayoutFlags::HAS_PADDING;
                self.bits_egal = false;
            }
        }
        self.fields.push(FieldLayout {
            offset,
            size,
            isptr,
            isunion,
        });
        self.offset += u64::from(size);
        self.alignment = self.alignment.max(align);
    }

    /// Finish the layout, or `None` if it exceeds [`MAX_LAYOUT_SIZE`].
    pub fn finish(mut self, mutable: bool, homogeneous: bool) -> Option<Layout> {
        let size = self.offset.next_multiple_of(u64::from(self.alignment));
        if size > MAX_LAYOUT_SIZE {
            return None;
        }
        if size != self.offset {
            self.flags |= LayoutFlags::HAS_PADDING;
        }
        let size = u32::try_from(size).ok()?;
        if mutable {
            self.flags |= LayoutFlags::IS_MUTABLE;
        }
        if self.pointer_offsets.is_empty() {
            self.flags |= LayoutFlags::POINTER_FREE;
        } else if self.pointer_offsets.len() as u64 * u64::from(self.pointer_size)
            == u64::from(size)
        {
            self.flags |= LayoutFlags::ALL_POINTERS;
        }
        if self.bits_egal && !self.flags.contains(LayoutFlags::HAS_PADDING) {
            self.flags |= LayoutFlags::IS_BITS_EGAL;
        }
        if homogeneous && !self.fields.is_empty() {
            self.flags |= LayoutFlags::HOMOGENEOUS;
        }
        Some(Layout {
            size,
            alignment: self.alignment,
            fields: self.fields.into_boxed_slice(),
            pointer_offsets: self.pointer_offsets,
            flags: self.flags,
        })
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
