//! Memory-access annotations: alias tags, atomic orderings, load facts.

use std::fmt;

/// Alias region of a memory access.
///
/// Accesses with different tags never alias, except that `Value` is the
/// parent of every non-stack region.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum AliasTag {
    /// Stack slots owned by the function.
    Stack,
    /// Fields of mutable heap objects.
    MutableHeap,
    /// Fields of immutable heap objects.
    ImmutableHeap,
    /// Memory that is never written after publication.
    Const,
    /// Length word of an array-like object.
    ArrayLen,
    /// Data pointer word of an array-like object.
    ArrayPtr,
    /// Object header and type-object words.
    TypeTag,
    /// Selector byte of an inline union field.
    UnionSelByte,
    /// Length word of a `Memory` object.
    MemoryLen,
    /// Data pointer word of a `Memory` object.
    MemoryPtr,
    /// Generic heap data of unknown region.
    Value,
}

impl AliasTag {
    pub fn name(self) -> &'static str {
        match self {
            Self::Stack => "stack",
            Self::MutableHeap => "mutab",
            Self::ImmutableHeap => "immut",
            Self::Const => "const",
            Self::ArrayLen => "arraylen",
            Self::ArrayPtr => "arrayptr",
            Self::TypeTag => "tag",
            Self::UnionSelByte => "unionselbyte",
            Self::MemoryLen => "memorylen",
            Self::MemoryPtr => "memoryptr",
            Self::Value => "value",
        }
    }

    /// Whether an access tagged `self` may touch the same bytes as `other`.
    pub fn may_alias(self, other: AliasTag) -> bool {
        self == other
            || (self == Self::Value && other != Self::Stack)
            || (other == Self::Value && self != Self::Stack)
    }
}

impl fmt::Display for AliasTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Memory ordering of an access.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum AtomicOrdering {
    #[default]
    NotAtomic,
    Unordered,
    Monotonic,
    Acquire,
    Release,
    AcquireRelease,
    SequentiallyConsistent,
}

impl AtomicOrdering {
    pub fn is_atomic(self) -> bool {
        self != Self::NotAtomic
    }

    /// Strongest ordering a compare-exchange may use on failure.
    ///
    /// A failed exchange performs no store, so release semantics are
    /// dropped: `Release` becomes `Monotonic` and `AcquireRelease`
    /// becomes `Acquire`.
    pub fn failure_ordering(self) -> Self {
        match self {
            Self::Release => Self::Monotonic,
            Self::AcquireRelease => Self::Acquire,
            o => o,
        }
    }

    /// The ordering a load may carry.
    pub fn for_load(self) -> Self {
        self.failure_ordering()
    }

    /// The ordering a store may carry.
    pub fn for_store(self) -> Self {
        match self {
            Self::Acquire => Self::Monotonic,
            Self::AcquireRelease => Self::Release,
            o => o,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NotAtomic => "notatomic",
            Self::Unordered => "unordered",
            Self::Monotonic => "monotonic",
            Self::Acquire => "acquire",
            Self::Release => "release",
            Self::AcquireRelease => "acq_rel",
            Self::SequentiallyConsistent => "seq_cst",
        }
    }
}

/// Facts attached to a load result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct LoadFacts {
    pub nonnull: bool,
    /// Bytes known dereferenceable behind the loaded pointer.
    pub dereferenceable: u64,
    /// Alignment known for the loaded pointer.
    pub align: u32,
    /// The location never changes after the first load.
    pub invariant: bool,
    /// Half-open range `[lo, hi)` of the loaded integer.
    pub range: Option<(u64, u64)>,
}

impl LoadFacts {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Facts attached to a call result.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct RetAttrs {
    pub nonnull: bool,
    pub dereferenceable: u64,
    pub align: u32,
}
