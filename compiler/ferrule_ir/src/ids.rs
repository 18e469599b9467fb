//! Opaque ID newtypes for IR entities.
//!
//! Every IR entity (value, instruction, block, global, function) lives in
//! an arena `Vec` and is referenced by a `Copy` handle. A `NONE` sentinel
//! (`u32::MAX`) marks absent handles.

/// Define an arena handle with `NONE`, `from_raw`, `raw` and `index`.
macro_rules! define_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => { $(
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(u32);

        impl $name {
            /// Sentinel for "absent".
            pub const NONE: Self = Self(u32::MAX);

            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub const fn is_none(self) -> bool {
                self.0 == u32::MAX
            }

            /// Handle for the next slot of an arena of length `len`.
            #[inline]
            pub fn next(len: usize) -> Self {
                Self(u32::try_from(len).unwrap_or(u32::MAX))
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                if self.is_none() {
                    write!(f, "{}::NONE", stringify!($name))
                } else {
                    write!(f, "{}({})", stringify!($name), self.0)
                }
            }
        }
    )* };
}

define_id!(
    /// An SSA value: argument, constant, global address or instruction result.
    ValueId,
    /// An instruction, including those without a result.
    InstId,
    /// A basic block.
    BlockId,
    /// A module-level global.
    GlobalId,
    /// A function in a module.
    FuncId,
);

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sentinel_and_debug() {
        assert!(ValueId::NONE.is_none());
        assert!(!BlockId::from_raw(3).is_none());
        assert_eq!(format!("{:?}", InstId::from_raw(7)), "InstId(7)");
        assert_eq!(format!("{:?}", GlobalId::NONE), "GlobalId::NONE");
    }

    #[test]
    fn next_tracks_length() {
        assert_eq!(FuncId::next(4), FuncId::from_raw(4));
        assert_eq!(ValueId::next(0).index(), 0);
    }
}
