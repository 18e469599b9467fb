//! Instruction set.

use smallvec::SmallVec;

use crate::attrs::{AliasTag, AtomicOrdering, LoadFacts, RetAttrs};
use crate::ids::{BlockId, ValueId};
use crate::runtime::RuntimeFn;
use crate::types::IrType;

/// Two-operand integer operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    UDiv,
    URem,
}

impl BinOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::LShr => "lshr",
            Self::AShr => "ashr",
            Self::UDiv => "udiv",
            Self::URem => "urem",
        }
    }

    /// Evaluate on two `bits`-wide operands; `None` when undefined
    /// (oversized shift, division by zero).
    #[expect(
        clippy::cast_sign_loss,
        reason = "arithmetic shift result is reinterpreted as bits"
    )]
    pub fn eval(self, bits: u32, a: u128, b: u128) -> Option<u128> {
        let r = match self {
            Self::Add => a.wrapping_add(b),
            Self::Sub => a.wrapping_sub(b),
            Self::Mul => a.wrapping_mul(b),
            Self::And => a & b,
            Self::Or => a | b,
            Self::Xor => a ^ b,
            Self::Shl => a << shift_amount(b, bits)?,
            Self::LShr => a >> shift_amount(b, bits)?,
            Self::AShr => (sign_extend(a, bits) >> shift_amount(b, bits)?) as u128,
            Self::UDiv => a.checked_div(b)?,
            Self::URem => a.checked_rem(b)?,
        };
        Some(truncate_bits(r, bits))
    }
}

fn shift_amount(b: u128, bits: u32) -> Option<u32> {
    u32::try_from(b).ok().filter(|&s| s < bits)
}

/// Overflow-reporting integer operation; yields `{ iN, i1 }`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum OverflowOp {
    SAdd,
    UAdd,
    SMul,
    UMul,
}

impl OverflowOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::SAdd => "sadd.with.overflow",
            Self::UAdd => "uadd.with.overflow",
            Self::SMul => "smul.with.overflow",
            Self::UMul => "umul.with.overflow",
        }
    }

    /// Evaluate on two `bits`-wide operands: `(wrapped result, overflowed)`.
    pub fn eval(self, bits: u32, a: u128, b: u128) -> (u128, bool) {
        match self {
            Self::UAdd => {
                let r = a.wrapping_add(b);
                (truncate_bits(r, bits), truncate_bits(r, bits) != r || r < a)
            }
            Self::UMul => match a.checked_mul(b) {
                Some(r) => (truncate_bits(r, bits), truncate_bits(r, bits) != r),
                None => (truncate_bits(a.wrapping_mul(b), bits), true),
            },
            Self::SAdd | Self::SMul => {
                let (sa, sb) = (sign_extend(a, bits), sign_extend(b, bits));
                let (exact, wrapped) = if self == Self::SAdd {
                    (sa.checked_add(sb), sa.wrapping_add(sb))
                } else {
                    (sa.checked_mul(sb), sa.wrapping_mul(sb))
                };
                #[expect(
                    clippy::cast_sign_loss,
                    reason = "two's complement bits of the wrapped result"
                )]
                let r = truncate_bits(wrapped as u128, bits);
                (r, exact != Some(sign_extend(r, bits)))
            }
        }
    }
}

/// Integer (and pointer) comparison predicate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum IntPredicate {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl IntPredicate {
    pub fn name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Ult => "ult",
            Self::Ule => "ule",
            Self::Ugt => "ugt",
            Self::Uge => "uge",
            Self::Slt => "slt",
            Self::Sle => "sle",
            Self::Sgt => "sgt",
            Self::Sge => "sge",
        }
    }

    /// Evaluate on two `bits`-wide integers given as zero-extended words.
    pub fn eval(self, bits: u32, a: u128, b: u128) -> bool {
        let sa = sign_extend(a, bits);
        let sb = sign_extend(b, bits);
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Ult => a < b,
            Self::Ule => a <= b,
            Self::Ugt => a > b,
            Self::Uge => a >= b,
            Self::Slt => sa < sb,
            Self::Sle => sa <= sb,
            Self::Sgt => sa > sb,
            Self::Sge => sa >= sb,
        }
    }
}

/// Mask `v` to its low `bits` bits.
pub fn truncate_bits(v: u128, bits: u32) -> u128 {
    if bits >= 128 {
        v
    } else {
        v & ((1u128 << bits) - 1)
    }
}

/// Sign-extend the low `bits` bits of `v`.
#[expect(
    clippy::cast_possible_wrap,
    reason = "reinterpreting the bit pattern is the point"
)]
pub fn sign_extend(v: u128, bits: u32) -> i128 {
    if bits == 0 || bits >= 128 {
        return v as i128;
    }
    let shift = 128 - bits;
    ((v << shift) as i128) >> shift
}

/// Value-preserving or reinterpreting conversion.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    Bitcast,
    PtrToInt,
    IntToPtr,
    AddrSpaceCast,
}

impl CastOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Trunc => "trunc",
            Self::ZExt => "zext",
            Self::SExt => "sext",
            Self::Bitcast => "bitcast",
            Self::PtrToInt => "ptrtoint",
            Self::IntToPtr => "inttoptr",
            Self::AddrSpaceCast => "addrspacecast",
        }
    }
}

/// A load with its annotations.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Load {
    pub ty: IrType,
    pub ptr: ValueId,
    pub align: u32,
    pub order: AtomicOrdering,
    pub tbaa: Option<AliasTag>,
    pub facts: LoadFacts,
}

impl Load {
    pub fn new(ty: IrType, ptr: ValueId, align: u32) -> Self {
        Self {
            ty,
            ptr,
            align,
            order: AtomicOrdering::NotAtomic,
            tbaa: None,
            facts: LoadFacts::default(),
        }
    }

    #[must_use]
    pub fn tbaa(mut self, tag: AliasTag) -> Self {
        self.tbaa = Some(tag);
        self
    }

    #[must_use]
    pub fn order(mut self, order: AtomicOrdering) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn nonnull(mut self) -> Self {
        self.facts.nonnull = true;
        self
    }

    #[must_use]
    pub fn dereferenceable(mut self, bytes: u64, align: u32) -> Self {
        self.facts.dereferenceable = bytes;
        self.facts.align = align;
        self
    }

    #[must_use]
    pub fn invariant(mut self) -> Self {
        self.facts.invariant = true;
        self
    }

    #[must_use]
    pub fn range(mut self, lo: u64, hi: u64) -> Self {
        self.facts.range = Some((lo, hi));
        self
    }
}

/// A store with its annotations.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Store {
    pub val: ValueId,
    pub ptr: ValueId,
    pub align: u32,
    pub order: AtomicOrdering,
    pub tbaa: Option<AliasTag>,
}

/// One instruction.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum InstKind {
    // === Memory ===
    Alloca {
        ty: IrType,
        align: u32,
    },
    Load(Load),
    Store(Store),
    /// `ptr + offset` in bytes; preserves the pointer's address space.
    Gep {
        ptr: ValueId,
        offset: ValueId,
    },
    /// `ptr + index * alloc_size(elem)`.
    IndexGep {
        elem: IrType,
        ptr: ValueId,
        index: ValueId,
    },
    Memcpy {
        dst: ValueId,
        src: ValueId,
        len: ValueId,
        align: u32,
    },
    Memset {
        dst: ValueId,
        byte: ValueId,
        len: ValueId,
        align: u32,
    },

    // === Arithmetic and comparison ===
    Bin {
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Overflow {
        op: OverflowOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Icmp {
        pred: IntPredicate,
        lhs: ValueId,
        rhs: ValueId,
    },
    Select {
        cond: ValueId,
        then_val: ValueId,
        else_val: ValueId,
    },
    Cast {
        op: CastOp,
        val: ValueId,
        to: IrType,
    },

    // === Aggregates ===
    ExtractValue {
        agg: ValueId,
        index: u32,
    },
    InsertValue {
        agg: ValueId,
        val: ValueId,
        index: u32,
    },
    ExtractElement {
        vec: ValueId,
        index: ValueId,
    },
    InsertElement {
        vec: ValueId,
        val: ValueId,
        index: ValueId,
    },

    // === Atomics ===
    /// Yields `{ T, i1 }`: the observed value and whether it matched.
    CmpXchg {
        ptr: ValueId,
        expected: ValueId,
        new: ValueId,
        success: AtomicOrdering,
        failure: AtomicOrdering,
        align: u32,
        tbaa: Option<AliasTag>,
    },
    /// Yields the previous value.
    AtomicXchg {
        ptr: ValueId,
        val: ValueId,
        order: AtomicOrdering,
        align: u32,
        tbaa: Option<AliasTag>,
    },
    Fence(AtomicOrdering),

    // === Calls and joins ===
    Call {
        callee: RuntimeFn,
        args: SmallVec<[ValueId; 4]>,
        attrs: RetAttrs,
    },
    Phi {
        ty: IrType,
        incoming: Vec<(ValueId, BlockId)>,
    },

    // === Terminators ===
    Br(BlockId),
    CondBr {
        cond: ValueId,
        then_bb: BlockId,
        else_bb: BlockId,
    },
    Switch {
        val: ValueId,
        default: BlockId,
        cases: Vec<(u128, BlockId)>,
    },
    Ret(Option<ValueId>),
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Br(_) | Self::CondBr { .. } | Self::Switch { .. } | Self::Ret(_) | Self::Unreachable
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Self::Phi { .. })
    }

    /// Blocks this terminator may transfer control to.
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Self::Br(b) => smallvec::smallvec![*b],
            Self::CondBr {
                then_bb, else_bb, ..
            } => smallvec::smallvec![*then_bb, *else_bb],
            Self::Switch { default, cases, .. } => {
                let mut out: SmallVec<[BlockId; 2]> = smallvec::smallvec![*default];
                out.extend(cases.iter().map(|&(_, b)| b));
                out
            }
            _ => SmallVec::new(),
        }
    }

    /// Every value read by the instruction.
    pub fn operands(&self) -> SmallVec<[ValueId; 4]> {
        let mut out = SmallVec::new();
        self.visit_operands(|v| out.push(v));
        out
    }

    fn visit_operands(&self, mut f: impl FnMut(ValueId)) {
        match self {
            Self::Alloca { .. } | Self::Fence(_) | Self::Br(_) | Self::Unreachable => {}
            Self::Load(l) => f(l.ptr),
            Self::Store(s) => {
                f(s.val);
                f(s.ptr);
            }
            Self::Gep { ptr, offset } => {
                f(*ptr);
                f(*offset);
            }
            Self::IndexGep { ptr, index, .. } => {
                f(*ptr);
                f(*index);
            }
            Self::Memcpy { dst, src, len, .. } => {
                f(*dst);
                f(*src);
                f(*len);
            }
            Self::Memset { dst, byte, len, .. } => {
                f(*dst);
                f(*byte);
                f(*len);
            }
            Self::Bin { lhs, rhs, .. }
            | Self::Overflow { lhs, rhs, .. }
            | Self::Icmp { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            Self::Select {
                cond,
                then_val,
                else_val,
            } => {
                f(*cond);
                f(*then_val);
                f(*else_val);
            }
            Self::Cast { val, .. } => f(*val),
            Self::ExtractValue { agg, .. } => f(*agg),
            Self::InsertValue { agg, val, .. } => {
                f(*agg);
                f(*val);
            }
            Self::ExtractElement { vec, index } => {
                f(*vec);
                f(*index);
            }
            Self::InsertElement { vec, val, index } => {
                f(*vec);
                f(*val);
                f(*index);
            }
            Self::CmpXchg {
                ptr, expected, new, ..
            } => {
                f(*ptr);
                f(*expected);
                f(*new);
            }
            Self::AtomicXchg { ptr, val, .. } => {
                f(*ptr);
                f(*val);
            }
            Self::Call { args, .. } => args.iter().copied().for_each(f),
            Self::Phi { incoming, .. } => incoming.iter().for_each(|&(v, _)| f(v)),
            Self::CondBr { cond, .. } => f(*cond),
            Self::Switch { val, .. } => f(*val),
            Self::Ret(Some(v)) => f(*v),
            Self::Ret(None) => {}
        }
    }

    /// Rewrite every operand through `f`.
    pub fn map_operands(&mut self, mut f: impl FnMut(ValueId) -> ValueId) {
        let mut g = |v: &mut ValueId| *v = f(*v);
        match self {
            Self::Alloca { .. } | Self::Fence(_) | Self::Br(_) | Self::Unreachable => {}
            Self::Load(l) => g(&mut l.ptr),
            Self::Store(s) => {
                g(&mut s.val);
                g(&mut s.ptr);
            }
            Self::Gep { ptr, offset } => {
                g(ptr);
                g(offset);
            }
            Self::IndexGep { ptr, index, .. } => {
                g(ptr);
                g(index);
            }
            Self::Memcpy { dst, src, len, .. } => {
                g(dst);
                g(src);
                g(len);
            }
            Self::Memset { dst, byte, len, .. } => {
                g(dst);
                g(byte);
                g(len);
            }
            Self::Bin { lhs, rhs, .. }
            | Self::Overflow { lhs, rhs, .. }
            | Self::Icmp { lhs, rhs, .. } => {
                g(lhs);
                g(rhs);
            }
            Self::Select {
                cond,
                then_val,
                else_val,
            } => {
                g(cond);
                g(then_val);
                g(else_val);
            }
            Self::Cast { val, .. } => g(val),
            Self::ExtractValue { agg, .. } => g(agg),
            Self::InsertValue { agg, val, .. } => {
                g(agg);
                g(val);
            }
            Self::ExtractElement { vec, index } => {
                g(vec);
                g(index);
            }
            Self::InsertElement { vec, val, index } => {
                g(vec);
                g(val);
                g(index);
            }
            Self::CmpXchg {
                ptr, expected, new, ..
            } => {
                g(ptr);
                g(expected);
                g(new);
            }
            Self::AtomicXchg { ptr, val, .. } => {
                g(ptr);
                g(val);
            }
            Self::Call { args, .. } => args.iter_mut().for_each(g),
            Self::Phi { incoming, .. } => incoming.iter_mut().for_each(|(v, _)| g(v)),
            Self::CondBr { cond, .. } => g(cond),
            Self::Switch { val, .. } => g(val),
            Self::Ret(Some(v)) => g(v),
            Self::Ret(None) => {}
        }
    }
}
