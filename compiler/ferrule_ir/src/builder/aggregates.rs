//! Aggregate and vector operations for `IrBuilder`.

use super::IrBuilder;
use crate::ids::ValueId;
use crate::inst::InstKind;
use crate::module::ConstValue;
use crate::types::IrType;

impl IrBuilder<'_> {
    /// Member `index` of a struct or array value.
    ///
    /// Looks through `insertvalue` chains and zero/undef constants, so an
    /// aggregate assembled in registers is taken apart without emitting.
    pub fn extract_value(&mut self, agg: ValueId, index: u32, name: &str) -> ValueId {
        let agg_ty = self.value_type(agg);
        let Some(elem) = agg_ty.element(index).filter(|_| agg_ty.is_aggregate()).cloned() else {
            tracing::error!(%agg_ty, index, "extract_value out of range");
            self.record_codegen_error();
            return self.undef(IrType::I64);
        };
        let mut cur = agg;
        loop {
            match self.function().as_const(cur).cloned() {
                Some(ConstValue::Zero) => return self.const_zero(elem),
                Some(ConstValue::Undef) => return self.undef(elem),
                _ => {}
            }
            let Some(def) = self.def_inst(cur) else { break };
            match &self.function().inst(def).kind {
                InstKind::InsertValue { val, index: i, .. } if *i == index => return *val,
                InstKind::InsertValue { agg, .. } => cur = *agg,
                _ => break,
            }
        }
        self.emit(InstKind::ExtractValue { agg, index }, elem, name)
    }

    pub fn insert_value(&mut self, agg: ValueId, val: ValueId, index: u32, name: &str) -> ValueId {
        let agg_ty = self.value_type(agg);
        let elem = agg_ty.element(index).filter(|_| agg_ty.is_aggregate());
        if elem != Some(&self.value_type(val)) {
            tracing::error!(%agg_ty, index, "insert_value with mismatched member");
            self.record_codegen_error();
            return agg;
        }
        self.emit(InstKind::InsertValue { agg, val, index }, agg_ty, name)
    }

    pub fn extract_element(&mut self, vec: ValueId, index: ValueId, name: &str) -> ValueId {
        let vec_ty = self.value_type(vec);
        let Some(elem) = vec_ty.element(0).filter(|_| vec_ty.is_vector()).cloned() else {
            tracing::error!(%vec_ty, "extract_element on non-vector");
            self.record_codegen_error();
            return self.undef(IrType::I64);
        };
        self.emit(InstKind::ExtractElement { vec, index }, elem, name)
    }

    pub fn insert_element(
        &mut self,
        vec: ValueId,
        val: ValueId,
        index: ValueId,
        name: &str,
    ) -> ValueId {
        let vec_ty = self.value_type(vec);
        if !vec_ty.is_vector() || vec_ty.element(0) != Some(&self.value_type(val)) {
            tracing::error!(%vec_ty, "insert_element with mismatched element");
            self.record_codegen_error();
            return vec;
        }
        self.emit(InstKind::InsertElement { vec, val, index }, vec_ty, name)
    }

    /// Assemble an aggregate or vector of type `ty` from its members.
    pub fn build_struct(&mut self, ty: IrType, members: &[ValueId], name: &str) -> ValueId {
        if ty.num_elements() as usize != members.len() {
            tracing::error!(%ty, n = members.len(), "build_struct with wrong member count");
            self.record_codegen_error();
            return self.undef(ty);
        }
        let mut acc = self.undef(ty.clone());
        for (i, &m) in members.iter().enumerate() {
            let idx = u32::try_from(i).unwrap_or(u32::MAX);
            acc = if ty.is_vector() {
                let at = self.const_i32(idx);
                self.insert_element(acc, m, at, name)
            } else {
                self.insert_value(acc, m, idx, name)
            };
        }
        acc
    }
}
