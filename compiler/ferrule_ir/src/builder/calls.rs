//! Runtime calls for `IrBuilder`.

use smallvec::SmallVec;

use super::IrBuilder;
use crate::attrs::RetAttrs;
use crate::ids::ValueId;
use crate::inst::InstKind;
use crate::runtime::RuntimeFn;
use crate::types::IrType;

impl IrBuilder<'_> {
    /// Call a runtime entry point. Void entry points yield a `void` value.
    #[inline]
    pub fn call(&mut self, callee: RuntimeFn, args: &[ValueId], name: &str) -> ValueId {
        self.call_with(callee, args, RetAttrs::default(), name)
    }

    /// Call with result facts.
    ///
    /// Arguments that do not match the entry point's signature
    /// record a codegen error; the call is still emitted so the verifier
    /// can point at it.
    pub fn call_with(
        &mut self,
        callee: RuntimeFn,
        args: &[ValueId],
        attrs: RetAttrs,
        name: &str,
    ) -> ValueId {
        let sig = callee.signature();
        let arity_ok = if sig.variadic {
            args.len() >= sig.params.len()
        } else {
            args.len() == sig.params.len()
        };
        let types_ok = args.iter().enumerate().all(|(i, &a)| {
            let ty = self.value_type(a);
            sig.params.get(i).map_or(ty == IrType::TRACKED, |want| ty == *want)
        });
        if !arity_ok || !types_ok {
            tracing::error!(callee = callee.name(), n = args.len(), "call with mismatched arguments");
            self.record_codegen_error();
        }
        let args: SmallVec<[ValueId; 4]> = args.iter().copied().collect();
        self.emit(
            InstKind::Call {
                callee,
                args,
                attrs,
            },
            sig.ret,
            name,
        )
    }
}
