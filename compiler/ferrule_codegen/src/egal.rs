//! `===`: object identity for mutable values, bitwise equality for
//! immutable ones.

use ferrule_ir::{IrType, RuntimeFn, ValueId};
use ferrule_types::{LayoutFlags, TypeId};

use crate::cgval::{CgValue, Repr};
use crate::context::CodegenCx;
use crate::error::LowerError;

impl CodegenCx<'_> {
    /// `a === b` as an `i1`.
    pub fn emit_egal(&mut self, a: &CgValue, b: &CgValue) -> Result<ValueId, LowerError> {
        if let (Repr::Constant(x), Repr::Constant(y)) = (&a.repr, &b.repr) {
            let same = x == y;
            return Ok(self.b.const_i1(same));
        }
        if a.is_ghost() && b.is_ghost() {
            let same = a.ty == b.ty && self.pool.is_singleton(a.ty);
            return Ok(self.b.const_i1(same));
        }
        if self.pool.intersect(a.ty, b.ty) == TypeId::BOTTOM {
            return Ok(self.b.const_i1(false));
        }
        if self.pool.is_singleton(a.ty) {
            return Ok(self.emit_isa(b, a.ty, None)?.0);
        }
        if self.pool.is_singleton(b.ty) {
            return Ok(self.emit_isa(a, b.ty, None)?.0);
        }
        if self.pointer_egal(a.ty) || self.pointer_egal(b.ty) {
            tracing::trace!("egal by identity");
            let x = self.box_value(a)?;
            let y = self.box_value(b)?;
            return Ok(self.b.icmp_eq(x, y, "egal"));
        }
        if a.ty == b.ty && self.bits_egal(a.ty) {
            let ty = self.ir_type(a.ty);
            let x = self.unbox(a, a.ty)?;
            let y = self.unbox(b, b.ty)?;
            return Ok(self.bits_equal(x, y, &ty));
        }
        let x = self.box_value(a)?;
        let y = self.box_value(b)?;
        let r = self.b.call(RuntimeFn::Egal, &[x, y], "egal.rt");
        let zero = self.b.const_i32(0);
        Ok(self.b.icmp_ne(r, zero, "egal"))
    }

    /// Values of `t` are equal exactly when they are the same object.
    pub(crate) fn pointer_egal(&self, t: TypeId) -> bool {
        self.pool.is_kind(t)
            || t == TypeId::SYMBOL
            || self.pool.is_uniquerep(t)
            || self.pool.is_singleton(t)
            || self
                .pool
                .datatype(t)
                .is_some_and(|dt| dt.concrete && dt.mutable)
    }

    /// Values of `t` are equal exactly when their bits are.
    fn bits_egal(&self, t: TypeId) -> bool {
        self.pool
            .layout(t)
            .is_some_and(|l| l.flags.contains(LayoutFlags::IS_BITS_EGAL))
    }

    /// Member-wise bit comparison of two values of the IR type `ty`.
    fn bits_equal(&mut self, x: ValueId, y: ValueId, ty: &IrType) -> ValueId {
        match ty {
            IrType::Half | IrType::BFloat | IrType::Float | IrType::Double => {
                let width = match ty {
                    IrType::Float => 32,
                    IrType::Double => 64,
                    _ => 16,
                };
                let xi = self.b.bitcast(x, IrType::Int(width), "xbits");
                let yi = self.b.bitcast(y, IrType::Int(width), "ybits");
                self.b.icmp_eq(xi, yi, "egal")
            }
            IrType::Struct(ms) => {
                let ms = ms.clone();
                let mut all = self.b.const_i1(true);
                for (i, m) in ms.iter().enumerate() {
                    let Ok(i) = u32::try_from(i) else { break };
                    let xm = self.b.extract_value(x, i, "xm");
                    let ym = self.b.extract_value(y, i, "ym");
                    let eq = self.bits_equal(xm, ym, m);
                    all = self.b.and(all, eq, "egal");
                }
                all
            }
            IrType::Array(n, e) => {
                let e = (**e).clone();
                let mut all = self.b.const_i1(true);
                for i in 0..*n {
                    let xm = self.b.extract_value(x, i, "xm");
                    let ym = self.b.extract_value(y, i, "ym");
                    let eq = self.bits_equal(xm, ym, &e);
                    all = self.b.and(all, eq, "egal");
                }
                all
            }
            IrType::Vector(n, e) => {
                let e = (**e).clone();
                let mut all = self.b.const_i1(true);
                for i in 0..*n {
                    let at = self.b.const_i32(i);
                    let xm = self.b.extract_element(x, at, "xm");
                    let ym = self.b.extract_element(y, at, "ym");
                    let eq = self.bits_equal(xm, ym, &e);
                    all = self.b.and(all, eq, "egal");
                }
                all
            }
            _ => self.b.icmp_eq(x, y, "egal"),
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use ferrule_ir::IrType;
    use ferrule_rt::{Interpreter, RtValue};
    use ferrule_types::{Constant, TypePool};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tests_util::Harness;

    #[test]
    fn constants_fold() {
        let mut pool = TypePool::new();
        let mut h = Harness::new(&[], IrType::Void);
        let mut cx = h.cx(&mut pool);
        let a = cx.const_value(Constant::i64(1));
        let b = cx.const_value(Constant::i64(1));
        let c = cx.const_value(Constant::f64(1.0));
        let same = cx.emit_egal(&a, &b).unwrap();
        let diff = cx.emit_egal(&a, &c).unwrap();
        assert_eq!(cx.b.const_value(same), Some(1));
        assert_eq!(cx.b.const_value(diff), Some(0));
    }

    #[test]
    fn floats_compare_bitwise() {
        let mut pool = TypePool::new();
        let mut h = Harness::new(&[IrType::Double, IrType::Double], IrType::I1);
        let mut cx = h.cx(&mut pool);
        let a = cx.param_value(0, TypeId::FLOAT64);
        let b = cx.param_value(1, TypeId::FLOAT64);
        let eq = cx.emit_egal(&a, &b).unwrap();
        cx.b.ret(eq);
        cx.finish().unwrap();
        assert_eq!(h.any_calls(), 0);

        let mut interp = Interpreter::new(&h.module, &pool);
        let call = |interp: &mut Interpreter<'_, '_>, x: f64, y: f64| {
            interp.call(h.func, &[RtValue::f64(x), RtValue::f64(y)]).unwrap()
        };
        assert_eq!(call(&mut interp, 1.5, 1.5), RtValue::bool(true));
        assert_eq!(call(&mut interp, 0.0, -0.0), RtValue::bool(false));
        assert_eq!(call(&mut interp, f64::NAN, f64::NAN), RtValue::bool(true));
    }

    #[test]
    fn abstract_operands_use_the_runtime() {
        let mut pool = TypePool::new();
        let mut h = Harness::new(&[IrType::TRACKED, IrType::TRACKED], IrType::I1);
        let mut cx = h.cx(&mut pool);
        let a = cx.param_value(0, TypeId::ANY);
        let b = cx.param_value(1, TypeId::ANY);
        let eq = cx.emit_egal(&a, &b).unwrap();
        cx.b.ret(eq);
        cx.finish().unwrap();
        assert_eq!(h.calls(RuntimeFn::Egal), 1);

        let mut interp = Interpreter::new(&h.module, &pool);
        let x = interp.runtime_mut().box_i64(3).unwrap();
        let y = interp.runtime_mut().box_i64(3).unwrap();
        let z = interp.runtime_mut().box_i64(4).unwrap();
        assert_eq!(interp.call(h.func, &[RtValue::Ptr(x), RtValue::Ptr(y)]), Ok(RtValue::bool(true)));
        assert_eq!(interp.call(h.func, &[RtValue::Ptr(x), RtValue::Ptr(z)]), Ok(RtValue::bool(false)));
    }
}
