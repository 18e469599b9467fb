//! Per-compilation configuration.

use ferrule_types::abi::{MAX_ATOMIC_SIZE, MAX_POOLED_SIZE, MAX_UNION_VARIANTS};

/// When bounds checks are emitted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum BoundsCheck {
    /// Check unless the access is marked `inbounds`.
    #[default]
    Default,
    /// Always check, ignoring `inbounds`.
    On,
    /// Never check.
    Off,
}

impl BoundsCheck {
    /// Whether an access with the given `inbounds` marking is checked.
    #[inline]
    pub fn should_check(self, inbounds: bool) -> bool {
        match self {
            Self::Default => !inbounds,
            Self::On => true,
            Self::Off => false,
        }
    }
}

/// Knobs for one compilation unit.
///
/// ```ignore
/// let opts = CodegenOptions::default()
///     .with_bounds_check(BoundsCheck::On)
///     .with_debug_info(true);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct CodegenOptions {
    /// Target pointer width in bytes. Must agree with the type pool and
    /// the module's data layout.
    pub pointer_size: u32,
    pub bounds_check: BoundsCheck,
    /// Most union members lowered as an `isa` chain or enumerated in a
    /// tagged-union representation.
    pub max_union_variants: u32,
    /// Largest field accessed with a single atomic instruction; larger
    /// atomic fields take the object lock.
    pub max_atomic_size: u32,
    /// Largest memory buffer whose data is allocated inline with the
    /// object header.
    pub max_pooled_size: u32,
    /// Attach names to emitted values.
    pub name_values: bool,
    /// Build debug type descriptors for the types that are lowered.
    pub debug_info: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            pointer_size: 8,
            bounds_check: BoundsCheck::Default,
            max_union_variants: MAX_UNION_VARIANTS,
            max_atomic_size: MAX_ATOMIC_SIZE,
            max_pooled_size: MAX_POOLED_SIZE,
            name_values: true,
            debug_info: false,
        }
    }
}

impl CodegenOptions {
    #[must_use]
    pub fn with_pointer_size(mut self, bytes: u32) -> Self {
        self.pointer_size = bytes;
        self
    }

    #[must_use]
    pub fn with_bounds_check(mut self, mode: BoundsCheck) -> Self {
        self.bounds_check = mode;
        self
    }

    /// Clamped to the runtime's limit of 127 enumerable variants.
    #[must_use]
    pub fn with_max_union_variants(mut self, n: u32) -> Self {
        self.max_union_variants = n.min(MAX_UNION_VARIANTS);
        self
    }

    #[must_use]
    pub fn with_max_atomic_size(mut self, bytes: u32) -> Self {
        self.max_atomic_size = bytes;
        self
    }

    #[must_use]
    pub fn with_max_pooled_size(mut self, bytes: u32) -> Self {
        self.max_pooled_size = bytes;
        self
    }

    #[must_use]
    pub fn with_name_values(mut self, on: bool) -> Self {
        self.name_values = on;
        self
    }

    #[must_use]
    pub fn with_debug_info(mut self, on: bool) -> Self {
        self.debug_info = on;
        self
    }
}
