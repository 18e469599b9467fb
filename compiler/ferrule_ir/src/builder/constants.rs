//! Constant and global-address operands for `IrBuilder`.

use super::IrBuilder;
use crate::ids::{GlobalId, ValueId};
use crate::inst::truncate_bits;
use crate::module::{ConstValue, ValueDef};
use crate::types::{AddressSpace, IrType};

impl IrBuilder<'_> {
    /// Integer constant of type `ty`, masked to its width.
    pub fn const_int(&mut self, ty: IrType, bits: u128) -> ValueId {
        let Some(width) = ty.int_bits() else {
            tracing::error!(%ty, "integer constant of non-integer type");
            self.record_codegen_error();
            return self.undef(ty);
        };
        self.push_const(ty, ConstValue::Int(truncate_bits(bits, width)))
    }

    #[inline]
    pub fn const_i1(&mut self, val: bool) -> ValueId {
        self.const_int(IrType::I1, u128::from(val))
    }

    #[inline]
    pub fn const_i8(&mut self, val: u8) -> ValueId {
        self.const_int(IrType::I8, u128::from(val))
    }

    #[inline]
    pub fn const_i32(&mut self, val: u32) -> ValueId {
        self.const_int(IrType::I32, u128::from(val))
    }

    #[inline]
    #[expect(
        clippy::cast_sign_loss,
        reason = "two's complement bit pattern is what is stored"
    )]
    pub fn const_i64(&mut self, val: i64) -> ValueId {
        self.const_int(IrType::I64, u128::from(val as u64))
    }

    /// Pointer-sized integer constant.
    pub fn const_usize(&mut self, val: u64) -> ValueId {
        let ty = IrType::Int(self.data_layout().pointer_size * 8);
        self.const_int(ty, u128::from(val))
    }

    /// Floating-point constant; `ty` picks the width.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "narrowing to the requested float width is intended"
    )]
    pub fn const_float(&mut self, ty: IrType, val: f64) -> ValueId {
        let bits = match ty {
            IrType::Double => val.to_bits(),
            IrType::Float => u64::from((val as f32).to_bits()),
            _ => {
                tracing::error!(%ty, "float constant of non-float type");
                self.record_codegen_error();
                return self.undef(ty);
            }
        };
        self.push_const(ty, ConstValue::Float(bits))
    }

    /// Constant from a raw bit pattern of a float type (including half widths).
    pub fn const_float_bits(&mut self, ty: IrType, bits: u64) -> ValueId {
        self.push_const(ty, ConstValue::Float(bits))
    }

    pub fn const_null(&mut self, addrspace: AddressSpace) -> ValueId {
        self.push_const(IrType::Ptr(addrspace), ConstValue::Null)
    }

    /// All-zero value of any type.
    pub fn const_zero(&mut self, ty: IrType) -> ValueId {
        match ty {
            IrType::Int(_) => self.push_const(ty, ConstValue::Int(0)),
            IrType::Ptr(_) => self.push_const(ty, ConstValue::Null),
            _ => self.push_const(ty, ConstValue::Zero),
        }
    }

    pub fn undef(&mut self, ty: IrType) -> ValueId {
        self.push_const(ty, ConstValue::Undef)
    }

    /// Address of global `g`, shared by every use in this function.
    pub fn global_value(&mut self, g: GlobalId) -> ValueId {
        if let Some(&v) = self.function().global_values.get(&g) {
            return v;
        }
        let ty = self.module().global(g).kind.value_type();
        let v = self.push_value(ty, ValueDef::Global(g), "");
        self.func_mut().global_values.insert(g, v);
        v
    }
}
