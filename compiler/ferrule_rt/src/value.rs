//! Values flowing through the interpreter.

use ferrule_ir::{sign_extend, truncate_bits, DataLayout, IrType};

/// One first-class IR value at run time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RtValue {
    Void,
    /// An integer of `bits` width, zero-extended.
    Int { bits: u32, value: u128 },
    /// IEEE bit pattern of a floating-point value of `bits` width.
    Float { bits: u32, raw: u64 },
    /// An address in any address space; `0` is null.
    Ptr(u64),
    /// Members of a struct, array or vector.
    Agg(Box<[RtValue]>),
}

impl RtValue {
    pub fn int(bits: u32, value: u128) -> Self {
        Self::Int {
            bits,
            value: truncate_bits(value, bits),
        }
    }

    pub fn bool(b: bool) -> Self {
        Self::int(1, u128::from(b))
    }

    #[expect(clippy::cast_sign_loss, reason = "two's complement bit pattern")]
    pub fn i64(v: i64) -> Self {
        Self::int(64, u128::from(v as u64))
    }

    pub fn f64(v: f64) -> Self {
        Self::Float {
            bits: 64,
            raw: v.to_bits(),
        }
    }

    pub fn f32(v: f32) -> Self {
        Self::Float {
            bits: 32,
            raw: u64::from(v.to_bits()),
        }
    }

    pub fn agg(members: Vec<RtValue>) -> Self {
        Self::Agg(members.into_boxed_slice())
    }

    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Self::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Signed value of an integer of at most 64 bits.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "callers ask for 64-bit views of at most 64-bit values"
    )]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int { bits, value } => Some(sign_extend(*value, *bits) as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_u128().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_u128().map(|v| v != 0)
    }

    pub fn as_ptr(&self) -> Option<u64> {
        match self {
            Self::Ptr(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float { bits: 64, raw } => Some(f64::from_bits(*raw)),
            Self::Float { bits: 32, raw } => {
                u32::try_from(*raw).ok().map(|r| f64::from(f32::from_bits(r)))
            }
            _ => None,
        }
    }

    pub fn members(&self) -> Option<&[RtValue]> {
        match self {
            Self::Agg(ms) => Some(ms),
            _ => None,
        }
    }

    /// The all-zero value of `ty`.
    pub fn zero(ty: &IrType) -> Self {
        match ty {
            IrType::Void => Self::Void,
            IrType::Int(bits) => Self::Int {
                bits: *bits,
                value: 0,
            },
            IrType::Half | IrType::BFloat | IrType::Float | IrType::Double => Self::Float {
                bits: float_bits(ty),
                raw: 0,
            },
            IrType::Ptr(_) => Self::Ptr(0),
            IrType::Struct(ms) => Self::Agg(ms.iter().map(Self::zero).collect()),
            IrType::Array(n, e) | IrType::Vector(n, e) => {
                Self::Agg((0..*n).map(|_| Self::zero(e)).collect())
            }
        }
    }

    /// Raw bits of a scalar, for reinterpretation.
    pub(crate) fn scalar_bits(&self) -> u128 {
        match self {
            Self::Int { value, .. } => *value,
            Self::Float { raw, .. } => u128::from(*raw),
            Self::Ptr(a) => u128::from(*a),
            Self::Void | Self::Agg(_) => 0,
        }
    }

    /// Write the in-memory image of `self` as a `ty` into `out`, which is
    /// `store_size(ty)` bytes long.
    pub fn encode(&self, ty: &IrType, dl: &DataLayout, out: &mut [u8]) {
        match ty {
            IrType::Void => {}
            IrType::Struct(_) | IrType::Array(..) | IrType::Vector(..) => {
                let members = self.members().unwrap_or(&[]);
                for i in 0..ty.num_elements() {
                    let (Some(ety), Some(m)) = (ty.element(i), members.get(i as usize)) else {
                        continue;
                    };
                    let Ok(off) = usize::try_from(dl.element_offset(ty, i)) else {
                        continue;
                    };
                    let len = usize::try_from(dl.store_size(ety)).unwrap_or(0);
                    if let Some(slot) = out.get_mut(off..off + len) {
                        m.encode(ety, dl, slot);
                    }
                }
            }
            _ => {
                let bytes = self.scalar_bits().to_le_bytes();
                let n = out.len().min(bytes.len());
                out[..n].copy_from_slice(&bytes[..n]);
            }
        }
    }

    /// Read a `ty` from its in-memory image.
    pub fn decode(ty: &IrType, dl: &DataLayout, bytes: &[u8]) -> Self {
        match ty {
            IrType::Void => Self::Void,
            IrType::Int(bits) => Self::int(*bits, le_u128(bytes)),
            IrType::Half | IrType::BFloat | IrType::Float | IrType::Double => Self::Float {
                bits: float_bits(ty),
                raw: le_u64(bytes),
            },
            IrType::Ptr(_) => Self::Ptr(le_u64(bytes)),
            IrType::Struct(_) | IrType::Array(..) | IrType::Vector(..) => Self::Agg(
                (0..ty.num_elements())
                    .filter_map(|i| {
                        let ety = ty.element(i)?;
                        let off = usize::try_from(dl.element_offset(ty, i)).ok()?;
                        let len = usize::try_from(dl.store_size(ety)).ok()?;
                        Some(Self::decode(ety, dl, bytes.get(off..off + len).unwrap_or(&[])))
                    })
                    .collect(),
            ),
        }
    }
}

pub(crate) fn float_bits(ty: &IrType) -> u32 {
    match ty {
        IrType::Half | IrType::BFloat => 16,
        IrType::Float => 32,
        _ => 64,
    }
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

fn le_u128(bytes: &[u8]) -> u128 {
    let mut buf = [0u8; 16];
    let n = bytes.len().min(16);
    buf[..n].copy_from_slice(&bytes[..n]);
    u128::from_le_bytes(buf)
}
