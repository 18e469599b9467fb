//! Pre-computed layout flags.
//!
//! `LayoutFlags` are computed once when a concrete type's layout is built
//! and cached on the [`Layout`](crate::Layout), so lowering can ask
//! "does this type hold pointers?" without walking its fields.

use bitflags::bitflags;

bitflags! {
    /// Layout properties of a concrete type.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
    pub struct LayoutFlags: u16 {
        /// There are bytes between or after fields that belong to no field.
        const HAS_PADDING = 1 << 0;
        /// Instances live on the heap and have identity.
        const IS_MUTABLE = 1 << 1;
        /// Every byte of the layout is a tracked pointer slot.
        const ALL_POINTERS = 1 << 2;
        /// No tracked pointer anywhere in the layout (recursively).
        const POINTER_FREE = 1 << 3;
        /// At least one field is an inline bits-union with a selector byte.
        const HAS_UNION_FIELD = 1 << 4;
        /// At least one field is declared atomic.
        const HAS_ATOMIC_FIELD = 1 << 5;
        /// Bitwise equality of two instances implies `egal`.
        const IS_BITS_EGAL = 1 << 6;
        /// All fields share one type (homogeneous tuple-like layout).
        const HOMOGENEOUS = 1 << 7;
    }
}

impl LayoutFlags {
    /// True if the layout stores no tracked pointers.
    #[inline]
    pub fn pointer_free(self) -> bool {
        self.contains(Self::POINTER_FREE)
    }

    /// True if the layout is entirely pointer slots.
    #[inline]
    pub fn all_pointers(self) -> bool {
        self.contains(Self::ALL_POINTERS)
    }
}

#[cfg(test)]
mod tests;
