//! A compilation unit shared by the property tests.

use ferrule_codegen::{CodegenCx, CodegenOptions, InternTables, LowerError};
use ferrule_ir::{verify_function, DataLayout, FuncId, InstKind, IrType, Module, RuntimeFn, ValueId};
use ferrule_types::TypePool;

/// One module holding every function a test lowers, so they share a
/// runtime when interpreted.
pub struct Unit {
    pub module: Module,
    intern: InternTables,
}

impl Unit {
    pub fn new() -> Self {
        Self {
            module: Module::new("props", DataLayout::default()),
            intern: InternTables::new(),
        }
    }

    /// Lower `body` into a fresh function and verify it. The body returns
    /// the value to return, or `None` for a void function.
    pub fn lower(
        &mut self,
        pool: &mut TypePool,
        params: &[IrType],
        ret: IrType,
        body: impl FnOnce(&mut CodegenCx<'_>) -> Result<Option<ValueId>, LowerError>,
    ) -> FuncId {
        let name = format!("f{}", self.module.functions().count());
        let func = self.module.add_function(name, params.to_vec(), ret);
        {
            let mut cx = CodegenCx::new(
                &mut self.module,
                func,
                pool,
                &self.intern,
                CodegenOptions::default(),
            )
            .unwrap();
            let entry = cx.builder().append_block("entry");
            cx.builder().position_at_end(entry);
            match body(&mut cx).unwrap() {
                Some(v) => cx.builder().ret(v),
                None => cx.builder().ret_void(),
            }
            cx.finish().unwrap();
        }
        verify_function(&self.module, func).unwrap();
        func
    }

    /// Instructions of `func` matching `pred`.
    pub fn count(&self, func: FuncId, pred: impl Fn(&InstKind) -> bool) -> usize {
        let f = self.module.function(func);
        f.block_ids()
            .flat_map(|b| f.block_insts(b).iter().copied())
            .filter(|&i| pred(&f.inst(i).kind))
            .count()
    }

    pub fn calls(&self, func: FuncId, callee: RuntimeFn) -> usize {
        self.count(func, |k| matches!(k, InstKind::Call { callee: c, .. } if *c == callee))
    }
}
