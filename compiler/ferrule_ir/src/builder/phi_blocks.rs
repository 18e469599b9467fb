//! Phi nodes and block positioning for `IrBuilder`.

use super::IrBuilder;
use crate::ids::{BlockId, InstId, ValueId};
use crate::inst::InstKind;
use crate::module::{BlockData, InstData, ValueDef};
use crate::types::IrType;

impl IrBuilder<'_> {
    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    /// Append a new empty block to the function.
    pub fn append_block(&mut self, name: &str) -> BlockId {
        let f = self.func_mut();
        let id = BlockId::next(f.blocks.len());
        f.blocks.push(BlockData {
            name: name.to_owned(),
            insts: Vec::new(),
        });
        id
    }

    /// Emit at the end of `block` from now on.
    pub fn position_at_end(&mut self, block: BlockId) {
        self.current_block = Some(block);
        self.insert_before = None;
    }

    /// Emit immediately before `inst` until repositioned.
    pub fn position_before(&mut self, inst: InstId) {
        if self.function().inst(inst).erased {
            tracing::error!(?inst, "position_before an erased instruction");
            self.record_codegen_error();
            return;
        }
        self.insert_before = Some(inst);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        match self.insert_before {
            Some(at) => Some(self.function().inst(at).block),
            None => self.current_block,
        }
    }

    /// The insertion block already ends in a terminator.
    pub fn is_terminated(&self) -> bool {
        self.insert_before.is_none()
            && self
                .current_block
                .is_some_and(|b| self.function().terminator(b).is_some())
    }

    // -----------------------------------------------------------------------
    // Phi nodes
    // -----------------------------------------------------------------------

    /// Empty phi of type `ty` at the head of the current block.
    pub fn phi(&mut self, ty: IrType, name: &str) -> ValueId {
        let Some(block) = self.current_block() else {
            tracing::error!(%ty, "phi with no insertion block");
            self.record_codegen_error();
            return self.undef(ty);
        };
        let f = self.func_mut();
        let pos = f.blocks[block.index()]
            .insts
            .iter()
            .take_while(|&&i| f.insts[i.index()].kind.is_phi())
            .count();
        let inst = InstId::next(f.insts.len());
        f.insts.push(InstData {
            kind: InstKind::Phi {
                ty: ty.clone(),
                incoming: Vec::new(),
            },
            result: None,
            block,
            erased: false,
        });
        f.blocks[block.index()].insts.insert(pos, inst);
        let v = self.push_value(ty, ValueDef::Inst(inst), name);
        self.func_mut().insts[inst.index()].result = Some(v);
        v
    }

    /// Add an incoming `(val, from)` edge to `phi`.
    pub fn add_incoming(&mut self, phi: ValueId, val: ValueId, from: BlockId) {
        let ty = self.value_type(phi);
        let Some(inst) = self.def_inst(phi) else {
            tracing::error!(?phi, "add_incoming on a non-phi value");
            self.record_codegen_error();
            return;
        };
        if self.value_type(val) != ty {
            tracing::error!(?phi, ?val, "phi incoming of the wrong type");
            self.record_codegen_error();
        }
        if let InstKind::Phi { incoming, .. } = &mut self.func_mut().insts[inst.index()].kind {
            incoming.push((val, from));
            return;
        }
        tracing::error!(?phi, "add_incoming on a non-phi value");
        self.record_codegen_error();
    }

    /// Phi over `incoming`; a single edge (or all-equal values) needs no phi.
    pub fn phi_from_incoming(
        &mut self,
        ty: IrType,
        incoming: &[(ValueId, BlockId)],
        name: &str,
    ) -> ValueId {
        if let Some(&(first, _)) = incoming.first() {
            if incoming.iter().all(|&(v, _)| v == first) {
                return first;
            }
        }
        let phi = self.phi(ty, name);
        for &(v, b) in incoming {
            self.add_incoming(phi, v, b);
        }
        phi
    }
}
