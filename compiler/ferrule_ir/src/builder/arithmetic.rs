//! Integer arithmetic for `IrBuilder`, folding constant operands.

use super::IrBuilder;
use crate::ids::ValueId;
use crate::inst::{BinOp, InstKind, OverflowOp};
use crate::types::IrType;

impl IrBuilder<'_> {
    fn bin(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        let ty = self.value_type(lhs);
        let Some(bits) = ty.int_bits().filter(|_| self.value_type(rhs) == ty) else {
            tracing::error!(op = op.name(), ?lhs, ?rhs, "integer op on mismatched operands");
            self.record_codegen_error();
            return lhs;
        };
        if let (Some(a), Some(b)) = (self.const_value(lhs), self.const_value(rhs)) {
            if let Some(r) = op.eval(bits, a, b) {
                return self.const_int(ty, r);
            }
        }
        self.emit(InstKind::Bin { op, lhs, rhs }, ty, name)
    }

    #[inline]
    pub fn add(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.bin(BinOp::Add, lhs, rhs, name)
    }

    #[inline]
    pub fn sub(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.bin(BinOp::Sub, lhs, rhs, name)
    }

    #[inline]
    pub fn mul(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.bin(BinOp::Mul, lhs, rhs, name)
    }

    /// Bitwise and; `x & true` and `x & false` simplify for `i1`.
    pub fn and(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        if self.value_type(lhs) == IrType::I1 {
            match (self.const_value(lhs), self.const_value(rhs)) {
                (Some(1), _) | (_, Some(0)) => return rhs,
                (_, Some(1)) | (Some(0), _) => return lhs,
                _ => {}
            }
        }
        self.bin(BinOp::And, lhs, rhs, name)
    }

    /// Bitwise or; `x | true` and `x | false` simplify for `i1`.
    pub fn or(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        if self.value_type(lhs) == IrType::I1 {
            match (self.const_value(lhs), self.const_value(rhs)) {
                (Some(0), _) | (_, Some(1)) => return rhs,
                (_, Some(0)) | (Some(1), _) => return lhs,
                _ => {}
            }
        }
        self.bin(BinOp::Or, lhs, rhs, name)
    }

    #[inline]
    pub fn xor(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.bin(BinOp::Xor, lhs, rhs, name)
    }

    /// Bitwise complement.
    pub fn not(&mut self, val: ValueId, name: &str) -> ValueId {
        let ty = self.value_type(val);
        let ones = self.const_int(ty, u128::MAX);
        self.bin(BinOp::Xor, val, ones, name)
    }

    #[inline]
    pub fn shl(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.bin(BinOp::Shl, lhs, rhs, name)
    }

    #[inline]
    pub fn lshr(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.bin(BinOp::LShr, lhs, rhs, name)
    }

    #[inline]
    pub fn ashr(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.bin(BinOp::AShr, lhs, rhs, name)
    }

    #[inline]
    pub fn udiv(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.bin(BinOp::UDiv, lhs, rhs, name)
    }

    #[inline]
    pub fn urem(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.bin(BinOp::URem, lhs, rhs, name)
    }

    fn overflow(&mut self, op: OverflowOp, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        let ty = self.value_type(lhs);
        let result_ty = IrType::struct_of(vec![ty.clone(), IrType::I1]);
        let Some(bits) = ty.int_bits().filter(|_| self.value_type(rhs) == ty) else {
            tracing::error!(op = op.name(), ?lhs, ?rhs, "overflow op on mismatched operands");
            self.record_codegen_error();
            return self.undef(result_ty);
        };
        if let (Some(a), Some(b)) = (self.const_value(lhs), self.const_value(rhs)) {
            let (r, o) = op.eval(bits, a, b);
            let r = self.const_int(ty, r);
            let o = self.const_i1(o);
            return self.build_struct(result_ty, &[r, o], name);
        }
        self.emit(InstKind::Overflow { op, lhs, rhs }, result_ty, name)
    }

    /// `{ a * b, overflowed }` with unsigned overflow detection.
    #[inline]
    pub fn umul_overflow(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.overflow(OverflowOp::UMul, lhs, rhs, name)
    }

    #[inline]
    pub fn smul_overflow(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.overflow(OverflowOp::SMul, lhs, rhs, name)
    }

    #[inline]
    pub fn uadd_overflow(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.overflow(OverflowOp::UAdd, lhs, rhs, name)
    }

    #[inline]
    pub fn sadd_overflow(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.overflow(OverflowOp::SAdd, lhs, rhs, name)
    }
}
