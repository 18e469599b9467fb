//! Integer comparisons and `select` for `IrBuilder`.

use super::IrBuilder;
use crate::ids::ValueId;
use crate::inst::{InstKind, IntPredicate};
use crate::types::IrType;

impl IrBuilder<'_> {
    /// Compare two integers or two pointers of the same type.
    pub fn icmp(&mut self, pred: IntPredicate, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        let ty = self.value_type(lhs);
        if ty != self.value_type(rhs) || !(ty.is_int() || ty.is_ptr()) {
            tracing::error!(pred = pred.name(), ?lhs, ?rhs, "icmp on mismatched operands");
            self.record_codegen_error();
            return self.const_i1(false);
        }
        if lhs == rhs && matches!(pred, IntPredicate::Eq | IntPredicate::Ne) {
            return self.const_i1(pred == IntPredicate::Eq);
        }
        if let (Some(a), Some(b)) = (self.const_value(lhs), self.const_value(rhs)) {
            let bits = ty.int_bits().unwrap_or(64);
            return self.const_i1(pred.eval(bits, a, b));
        }
        self.emit(InstKind::Icmp { pred, lhs, rhs }, IrType::I1, name)
    }

    #[inline]
    pub fn icmp_eq(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.icmp(IntPredicate::Eq, lhs, rhs, name)
    }

    #[inline]
    pub fn icmp_ne(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.icmp(IntPredicate::Ne, lhs, rhs, name)
    }

    #[inline]
    pub fn icmp_ult(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.icmp(IntPredicate::Ult, lhs, rhs, name)
    }

    #[inline]
    pub fn icmp_ule(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.icmp(IntPredicate::Ule, lhs, rhs, name)
    }

    #[inline]
    pub fn icmp_ugt(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.icmp(IntPredicate::Ugt, lhs, rhs, name)
    }

    #[inline]
    pub fn icmp_uge(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.icmp(IntPredicate::Uge, lhs, rhs, name)
    }

    #[inline]
    pub fn icmp_slt(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.icmp(IntPredicate::Slt, lhs, rhs, name)
    }

    /// `val != 0` (or non-null) as an `i1`.
    pub fn is_nonzero(&mut self, val: ValueId, name: &str) -> ValueId {
        let ty = self.value_type(val);
        if ty == IrType::I1 {
            return val;
        }
        let zero = self.const_zero(ty);
        self.icmp(IntPredicate::Ne, val, zero, name)
    }

    /// `cond ? then_val : else_val`; folds a constant condition.
    pub fn select(
        &mut self,
        cond: ValueId,
        then_val: ValueId,
        else_val: ValueId,
        name: &str,
    ) -> ValueId {
        let ty = self.value_type(then_val);
        if self.value_type(cond) != IrType::I1 || self.value_type(else_val) != ty {
            tracing::error!(?cond, ?then_val, ?else_val, "select on mismatched operands");
            self.record_codegen_error();
            return then_val;
        }
        match self.const_value(cond) {
            Some(0) => return else_val,
            Some(_) => return then_val,
            None if then_val == else_val => return then_val,
            None => {}
        }
        self.emit(
            InstKind::Select {
                cond,
                then_val,
                else_val,
            },
            ty,
            name,
        )
    }
}
