//! Type conversions for `IrBuilder`.

use super::IrBuilder;
use crate::ids::ValueId;
use crate::inst::{sign_extend, truncate_bits, CastOp, InstKind};
use crate::types::{AddressSpace, IrType};

impl IrBuilder<'_> {
    fn cast(&mut self, op: CastOp, val: ValueId, to: IrType, name: &str) -> ValueId {
        let from = self.value_type(val);
        if from == to {
            return val;
        }
        let dl = self.data_layout();
        let ok = match op {
            CastOp::Trunc => matches!((from.int_bits(), to.int_bits()), (Some(a), Some(b)) if a > b),
            CastOp::ZExt | CastOp::SExt => {
                matches!((from.int_bits(), to.int_bits()), (Some(a), Some(b)) if a < b)
            }
            CastOp::Bitcast => {
                !from.is_ptr() && !to.is_ptr() && dl.store_size(&from) == dl.store_size(&to)
            }
            CastOp::PtrToInt => from.is_ptr() && to.is_int(),
            CastOp::IntToPtr => from.is_int() && to.is_ptr(),
            CastOp::AddrSpaceCast => from.is_ptr() && to.is_ptr(),
        };
        if !ok {
            tracing::error!(op = op.name(), %from, %to, "invalid cast");
            self.record_codegen_error();
            return self.undef(to);
        }
        if let (Some(c), Some(from_bits), Some(to_bits)) =
            (self.const_value(val), from.int_bits(), to.int_bits())
        {
            #[expect(
                clippy::cast_sign_loss,
                reason = "two's complement bit pattern is what is stored"
            )]
            let folded = match op {
                CastOp::Trunc | CastOp::ZExt | CastOp::Bitcast => Some(truncate_bits(c, to_bits)),
                CastOp::SExt => Some(truncate_bits(sign_extend(c, from_bits) as u128, to_bits)),
                _ => None,
            };
            if let Some(bits) = folded {
                return self.const_int(to, bits);
            }
        }
        let kind = InstKind::Cast {
            op,
            val,
            to: to.clone(),
        };
        self.emit(kind, to, name)
    }

    #[inline]
    pub fn trunc(&mut self, val: ValueId, to: IrType, name: &str) -> ValueId {
        self.cast(CastOp::Trunc, val, to, name)
    }

    #[inline]
    pub fn zext(&mut self, val: ValueId, to: IrType, name: &str) -> ValueId {
        self.cast(CastOp::ZExt, val, to, name)
    }

    #[inline]
    pub fn sext(&mut self, val: ValueId, to: IrType, name: &str) -> ValueId {
        self.cast(CastOp::SExt, val, to, name)
    }

    /// Reinterpret the bits of a non-pointer value as another same-size type.
    #[inline]
    pub fn bitcast(&mut self, val: ValueId, to: IrType, name: &str) -> ValueId {
        self.cast(CastOp::Bitcast, val, to, name)
    }

    #[inline]
    pub fn ptr_to_int(&mut self, val: ValueId, to: IrType, name: &str) -> ValueId {
        self.cast(CastOp::PtrToInt, val, to, name)
    }

    #[inline]
    pub fn int_to_ptr(&mut self, val: ValueId, addrspace: AddressSpace, name: &str) -> ValueId {
        self.cast(CastOp::IntToPtr, val, IrType::Ptr(addrspace), name)
    }

    #[inline]
    pub fn addrspace_cast(&mut self, val: ValueId, addrspace: AddressSpace, name: &str) -> ValueId {
        self.cast(CastOp::AddrSpaceCast, val, IrType::Ptr(addrspace), name)
    }

    /// Resize an integer, zero- or sign-extending as requested.
    pub fn int_cast(&mut self, val: ValueId, to: IrType, signed: bool, name: &str) -> ValueId {
        let from = self.value_type(val).int_bits().unwrap_or(0);
        let target = to.int_bits().unwrap_or(0);
        match from.cmp(&target) {
            std::cmp::Ordering::Equal => val,
            std::cmp::Ordering::Greater => self.trunc(val, to, name),
            std::cmp::Ordering::Less if signed => self.sext(val, to, name),
            std::cmp::Ordering::Less => self.zext(val, to, name),
        }
    }
}
