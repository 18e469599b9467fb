//! Atomic memory operations for `IrBuilder`.

use super::IrBuilder;
use crate::attrs::{AliasTag, AtomicOrdering};
use crate::ids::ValueId;
use crate::inst::InstKind;
use crate::types::IrType;

impl IrBuilder<'_> {
    /// Compare-and-exchange; yields `{ observed, matched }`.
    ///
    /// The failure ordering is derived from `order` with release
    /// semantics dropped.
    #[expect(clippy::too_many_arguments, reason = "mirrors the instruction's operands")]
    pub fn cmpxchg(
        &mut self,
        ptr: ValueId,
        expected: ValueId,
        new: ValueId,
        order: AtomicOrdering,
        align: u32,
        tbaa: Option<AliasTag>,
        name: &str,
    ) -> ValueId {
        let ty = self.value_type(expected);
        let result_ty = IrType::struct_of(vec![ty.clone(), IrType::I1]);
        if !self.value_type(ptr).is_ptr() || self.value_type(new) != ty {
            tracing::error!(?ptr, ?expected, ?new, "cmpxchg on mismatched operands");
            self.record_codegen_error();
            return self.undef(result_ty);
        }
        let order = if order.is_atomic() {
            order
        } else {
            AtomicOrdering::Monotonic
        };
        self.emit(
            InstKind::CmpXchg {
                ptr,
                expected,
                new,
                success: order,
                failure: order.failure_ordering(),
                align,
                tbaa,
            },
            result_ty,
            name,
        )
    }

    /// Atomic swap; yields the previous value.
    pub fn atomic_xchg(
        &mut self,
        ptr: ValueId,
        val: ValueId,
        order: AtomicOrdering,
        align: u32,
        tbaa: Option<AliasTag>,
        name: &str,
    ) -> ValueId {
        let ty = self.value_type(val);
        if !self.value_type(ptr).is_ptr() {
            tracing::error!(?ptr, "atomic_xchg on non-pointer");
            self.record_codegen_error();
            return self.undef(ty);
        }
        self.emit(
            InstKind::AtomicXchg {
                ptr,
                val,
                order,
                align,
                tbaa,
            },
            ty,
            name,
        )
    }

    pub fn fence(&mut self, order: AtomicOrdering) {
        self.emit_void(InstKind::Fence(order));
    }
}
