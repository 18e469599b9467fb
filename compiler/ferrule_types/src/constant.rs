//! Compile-time constant values.

use crate::kind::TypeKind;
use crate::{TypeId, TypePool};

/// A fully known value.
///
/// Constants are hashable so they can key the constant-to-global intern
/// table: two equal constants always lower to the same global.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    /// Little-endian bit image of a pointer-free value.
    Bits { ty: TypeId, bytes: Box<[u8]> },
    /// The instance of a singleton type.
    Singleton(TypeId),
    /// A type value.
    Type(TypeId),
    Symbol(Box<str>),
    String(Box<str>),
    /// An immutable value with pointer fields, field by field.
    Struct { ty: TypeId, fields: Box<[Constant]> },
}

impl Constant {
    pub fn bool(b: bool) -> Self {
        Self::Bits {
            ty: TypeId::BOOL,
            bytes: Box::new([u8::from(b)]),
        }
    }

    pub fn i64(v: i64) -> Self {
        Self::Bits {
            ty: TypeId::INT64,
            bytes: v.to_le_bytes().into(),
        }
    }

    pub fn f64(v: f64) -> Self {
        Self::Bits {
            ty: TypeId::FLOAT64,
            bytes: v.to_le_bytes().into(),
        }
    }

    /// An integer of primitive type `ty`, truncated to its width.
    pub fn int(pool: &TypePool, ty: TypeId, v: i128) -> Self {
        let size = pool.layout(ty).map_or(0, |l| l.size as usize);
        let bytes = v.to_le_bytes();
        Self::Bits {
            ty,
            bytes: bytes[..size.min(16)].into(),
        }
    }

    pub fn nothing() -> Self {
        Self::Singleton(TypeId::NOTHING)
    }

    pub fn symbol(name: &str) -> Self {
        Self::Symbol(name.into())
    }

    /// The most precise static type: `Type{T}` for type values.
    pub fn static_type(&self, pool: &mut TypePool) -> TypeId {
        match self {
            Self::Type(t) => pool.type_of(*t),
            _ => self.runtime_type(pool),
        }
    }

    /// The concrete type of the value.
    pub fn runtime_type(&self, pool: &TypePool) -> TypeId {
        match self {
            Self::Bits { ty, .. } | Self::Singleton(ty) | Self::Struct { ty, .. } => *ty,
            Self::Type(t) => pool.kind_of(*t),
            Self::Symbol(_) => TypeId::SYMBOL,
            Self::String(_) => TypeId::STRING,
        }
    }

    /// The bit image, zero-extended into a `u64`, for values of at most
    /// eight bytes.
    pub fn bits_u64(&self) -> Option<u64> {
        match self {
            Self::Bits { bytes, .. } if bytes.len() <= 8 => {
                let mut buf = [0u8; 8];
                buf[..bytes.len()].copy_from_slice(bytes);
                Some(u64::from_le_bytes(buf))
            }
            _ => None,
        }
    }

    /// Whether field `idx` of this constant is known to hold a value.
    pub fn is_defined_field(&self, pool: &TypePool, idx: usize) -> bool {
        match self {
            Self::Bits { ty, .. } => idx < pool.nfields(*ty),
            Self::Struct { fields, .. } => idx < fields.len(),
            _ => false,
        }
    }

    /// Field `idx` as a constant, when it can be read at compile time.
    pub fn field(&self, pool: &TypePool, idx: usize) -> Option<Self> {
        match self {
            Self::Struct { fields, .. } => fields.get(idx).cloned(),
            Self::Bits { ty, bytes } => {
                let fty = pool.field(*ty, idx)?.ty;
                let fl = *pool.layout(*ty)?.field(idx)?;
                if fl.isunion || !matches!(pool.kind(fty), TypeKind::DataType(_)) {
                    return None;
                }
                if pool.is_singleton(fty) {
                    return Some(Self::Singleton(fty));
                }
                let start = fl.offset as usize;
                let end = start + fl.size as usize;
                Some(Self::Bits {
                    ty: fty,
                    bytes: bytes.get(start..end)?.into(),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
