//! Terminators for `IrBuilder`.

use super::IrBuilder;
use crate::ids::{BlockId, ValueId};
use crate::inst::InstKind;
use crate::types::IrType;

impl IrBuilder<'_> {
    pub fn br(&mut self, dest: BlockId) {
        self.emit_void(InstKind::Br(dest));
    }

    /// Conditional branch. Constant conditions are kept as branches so
    /// that phi nodes in both targets keep their incoming edge.
    pub fn cond_br(&mut self, cond: ValueId, then_bb: BlockId, else_bb: BlockId) {
        if self.value_type(cond) != IrType::I1 {
            tracing::error!(?cond, "cond_br on non-i1 condition");
            self.record_codegen_error();
        }
        self.emit_void(InstKind::CondBr {
            cond,
            then_bb,
            else_bb,
        });
    }

    /// Multi-way branch on an integer; `cases` pairs a value with its target.
    pub fn switch(&mut self, val: ValueId, default: BlockId, cases: &[(u128, BlockId)]) {
        if !self.value_type(val).is_int() {
            tracing::error!(?val, "switch on non-integer");
            self.record_codegen_error();
        }
        self.emit_void(InstKind::Switch {
            val,
            default,
            cases: cases.to_vec(),
        });
    }

    /// Append a case to the switch terminating `block`.
    pub fn add_case(&mut self, block: BlockId, val: u128, dest: BlockId) {
        let term = self.function().terminator(block);
        if let Some(term) = term {
            if let InstKind::Switch { cases, .. } = &mut self.func_mut().insts[term.index()].kind {
                cases.push((val, dest));
                return;
            }
        }
        tracing::error!(?block, "add_case on a block not ending in a switch");
        self.record_codegen_error();
    }

    pub fn ret(&mut self, val: ValueId) {
        if self.value_type(val) != *self.function().ret() {
            tracing::error!(?val, "ret value does not match the function type");
            self.record_codegen_error();
        }
        self.emit_void(InstKind::Ret(Some(val)));
    }

    pub fn ret_void(&mut self) {
        self.emit_void(InstKind::Ret(None));
    }

    pub fn unreachable(&mut self) {
        self.emit_void(InstKind::Unreachable);
    }
}
