//! IR types and target data layout.

use std::fmt;

/// Address space of a pointer.
///
/// The GC address spaces are an ownership discipline: the rooting
/// analysis knows, from the type of a pointer alone, whether the collector
/// must see it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressSpace {
    /// Untracked memory: stack slots, raw data, runtime tables.
    Generic,
    /// A GC-tracked object reference; must be rooted while live.
    Tracked,
    /// Interior pointer derived from a tracked reference.
    Derived,
    /// Rooted by the caller for the duration of a call.
    CalleeRooted,
    /// Loaded from an object; live as long as that object is.
    Loaded,
    /// A user-chosen numbered address space for raw pointers.
    Custom(u32),
}

impl AddressSpace {
    /// Numeric address space, as a native code generator would see it.
    pub fn number(self) -> u32 {
        match self {
            Self::Generic => 0,
            Self::Tracked => 10,
            Self::Derived => 11,
            Self::CalleeRooted => 12,
            Self::Loaded => 13,
            Self::Custom(n) => n,
        }
    }

    pub fn from_number(n: u32) -> Self {
        match n {
            0 => Self::Generic,
            10 => Self::Tracked,
            11 => Self::Derived,
            12 => Self::CalleeRooted,
            13 => Self::Loaded,
            n => Self::Custom(n),
        }
    }

    /// Pointers in this space reference (the inside of) GC objects.
    pub fn is_gc(self) -> bool {
        matches!(
            self,
            Self::Tracked | Self::Derived | Self::CalleeRooted | Self::Loaded
        )
    }
}

/// A first-class IR type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum IrType {
    Void,
    Int(u32),
    Half,
    BFloat,
    Float,
    Double,
    Ptr(AddressSpace),
    Struct(Box<[IrType]>),
    Array(u32, Box<IrType>),
    Vector(u32, Box<IrType>),
}

impl IrType {
    pub const I1: Self = Self::Int(1);
    pub const I8: Self = Self::Int(8);
    pub const I16: Self = Self::Int(16);
    pub const I32: Self = Self::Int(32);
    pub const I64: Self = Self::Int(64);

    /// A GC-tracked object reference.
    pub const TRACKED: Self = Self::Ptr(AddressSpace::Tracked);
    /// An untracked pointer.
    pub const PTR: Self = Self::Ptr(AddressSpace::Generic);

    pub fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    pub fn int_bits(&self) -> Option<u32> {
        match self {
            Self::Int(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Self::Ptr(_))
    }

    pub fn addrspace(&self) -> Option<AddressSpace> {
        match self {
            Self::Ptr(a) => Some(*a),
            _ => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::Half | Self::BFloat | Self::Float | Self::Double)
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Struct(_) | Self::Array(..))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(..))
    }

    /// Member `idx` of a struct or array, or the element of a vector.
    pub fn element(&self, idx: u32) -> Option<&IrType> {
        match self {
            Self::Struct(ms) => ms.get(idx as usize),
            Self::Array(n, e) | Self::Vector(n, e) if idx < *n => Some(e),
            _ => None,
        }
    }

    /// Number of members of an aggregate or vector.
    pub fn num_elements(&self) -> u32 {
        match self {
            Self::Struct(ms) => u32::try_from(ms.len()).unwrap_or(u32::MAX),
            Self::Array(n, _) | Self::Vector(n, _) => *n,
            _ => 0,
        }
    }

    /// The type contains a GC-tracked pointer anywhere.
    pub fn has_tracked_pointers(&self) -> bool {
        match self {
            Self::Ptr(a) => a.is_gc(),
            Self::Struct(ms) => ms.iter().any(IrType::has_tracked_pointers),
            Self::Array(_, e) | Self::Vector(_, e) => e.has_tracked_pointers(),
            _ => false,
        }
    }

    pub fn struct_of(members: Vec<IrType>) -> Self {
        Self::Struct(members.into_boxed_slice())
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Int(b) => write!(f, "i{b}"),
            Self::Half => write!(f, "half"),
            Self::BFloat => write!(f, "bfloat"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::Ptr(AddressSpace::Generic) => write!(f, "ptr"),
            Self::Ptr(a) => write!(f, "ptr addrspace({})", a.number()),
            Self::Struct(ms) => {
                write!(f, "{{ ")?;
                for (i, m) in ms.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{m}")?;
                }
                write!(f, " }}")
            }
            Self::Array(n, e) => write!(f, "[{n} x {e}]"),
            Self::Vector(n, e) => write!(f, "<{n} x {e}>"),
        }
    }
}

/// Target size and alignment rules.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct DataLayout {
    pub pointer_size: u32,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self { pointer_size: 8 }
    }
}

impl DataLayout {
    pub fn new(pointer_size: u32) -> Self {
        Self { pointer_size }
    }

    /// Bytes written by a store of `ty`.
    pub fn store_size(&self, ty: &IrType) -> u64 {
        match ty {
            IrType::Void => 0,
            IrType::Int(b) => u64::from(b.div_ceil(8)),
            IrType::Half | IrType::BFloat => 2,
            IrType::Float => 4,
            IrType::Double => 8,
            IrType::Ptr(_) => u64::from(self.pointer_size),
            IrType::Struct(_) | IrType::Array(..) | IrType::Vector(..) => self.alloc_size(ty),
        }
    }

    /// Bytes between consecutive elements of an array of `ty`.
    pub fn alloc_size(&self, ty: &IrType) -> u64 {
        match ty {
            IrType::Struct(ms) => {
                let (_, end, align) = self.struct_layout(ms);
                end.next_multiple_of(align)
            }
            IrType::Array(n, e) => u64::from(*n) * self.alloc_size(e),
            IrType::Vector(n, e) => {
                let raw = u64::from(*n) * self.store_size(e);
                raw.next_multiple_of(self.align_of(ty))
            }
            _ => self.store_size(ty).next_multiple_of(self.align_of(ty)),
        }
    }

    /// ABI alignment of `ty`.
    pub fn align_of(&self, ty: &IrType) -> u64 {
        match ty {
            IrType::Void => 1,
            IrType::Int(_) | IrType::Half | IrType::BFloat | IrType::Float | IrType::Double => {
                self.store_size(ty).next_power_of_two().min(16)
            }
            IrType::Ptr(_) => u64::from(self.pointer_size),
            IrType::Struct(ms) => ms.iter().map(|m| self.align_of(m)).max().unwrap_or(1),
            IrType::Array(_, e) => self.align_of(e),
            IrType::Vector(n, e) => (u64::from(*n) * self.store_size(e))
                .next_power_of_two()
                .clamp(1, 16),
        }
    }

    /// Byte offset of member `idx` of a struct or element of an array.
    pub fn element_offset(&self, ty: &IrType, idx: u32) -> u64 {
        match ty {
            IrType::Struct(ms) => self
                .struct_layout(ms)
                .0
                .get(idx as usize)
                .copied()
                .unwrap_or(0),
            IrType::Array(_, e) => u64::from(idx) * self.alloc_size(e),
            IrType::Vector(_, e) => u64::from(idx) * self.store_size(e),
            _ => 0,
        }
    }

    /// Member offsets, unpadded end, and alignment of a struct.
    fn struct_layout(&self, members: &[IrType]) -> (Vec<u64>, u64, u64) {
        let mut offsets = Vec::with_capacity(members.len());
        let mut off = 0u64;
        let mut align = 1u64;
        for m in members {
            let a = self.align_of(m);
            off = off.next_multiple_of(a);
            offsets.push(off);
            off += self.alloc_size(m);
            align = align.max(a);
        }
        (offsets, off, align)
    }
}
