//! Shared fixture for unit tests: one module with one function under
//! construction.

use ferrule_ir::{verify_function, DataLayout, FuncId, InstKind, IrType, Module, RuntimeFn};
use ferrule_types::TypePool;

use crate::context::CodegenCx;
use crate::intern::InternTables;
use crate::options::CodegenOptions;

pub(crate) struct Harness {
    pub module: Module,
    pub func: FuncId,
    intern: InternTables,
}

impl Harness {
    pub fn new(params: &[IrType], ret: IrType) -> Self {
        let mut module = Module::new("test", DataLayout::default());
        let func = module.add_function("f", params.to_vec(), ret);
        Self {
            module,
            func,
            intern: InternTables::new(),
        }
    }

    /// A context positioned at the end of the function's entry block.
    pub fn cx<'a>(&'a mut self, pool: &'a mut TypePool) -> CodegenCx<'a> {
        self.cx_with(pool, CodegenOptions::default())
    }

    #[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
    pub fn cx_with<'a>(&'a mut self, pool: &'a mut TypePool, opts: CodegenOptions) -> CodegenCx<'a> {
        let entry = self.module.function(self.func).entry();
        let mut cx = CodegenCx::new(&mut self.module, self.func, pool, &self.intern, opts).unwrap();
        let entry = entry.unwrap_or_else(|| cx.b.append_block("entry"));
        cx.b.position_at_end(entry);
        cx
    }

    /// Live instructions of the function matching `pred`.
    pub fn count(&self, pred: impl Fn(&InstKind) -> bool) -> usize {
        let f = self.module.function(self.func);
        f.block_ids()
            .flat_map(|b| f.block_insts(b).iter().copied())
            .filter(|&i| pred(&f.inst(i).kind))
            .count()
    }

    /// Calls to `callee` in the function.
    pub fn calls(&self, callee: RuntimeFn) -> usize {
        self.count(|k| matches!(k, InstKind::Call { callee: c, .. } if *c == callee))
    }

    /// Calls to any runtime entry point.
    pub fn any_calls(&self) -> usize {
        self.count(|k| matches!(k, InstKind::Call { .. }))
    }

    #[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
    pub fn verify(&self) {
        verify_function(&self.module, self.func).unwrap();
    }
}
