//! Builder for [`Interpreter`].

use ferrule_ir::Module;
use ferrule_types::TypePool;
use rustc_hash::FxHashMap;

use super::{Interpreter, DEFAULT_STEP_LIMIT};
use crate::heap::DEFAULT_HEAP_LIMIT;
use crate::runtime::Runtime;

/// Configures an [`Interpreter`] before it is created.
///
/// ```ignore
/// let mut interp = InterpreterBuilder::new(&module, &pool)
///     .step_limit(10_000)
///     .build();
/// ```
pub struct InterpreterBuilder<'m, 'p> {
    module: &'m Module,
    pool: &'p TypePool,
    step_limit: u64,
    heap_limit: usize,
}

impl<'m, 'p> InterpreterBuilder<'m, 'p> {
    pub fn new(module: &'m Module, pool: &'p TypePool) -> Self {
        Self {
            module,
            pool,
            step_limit: DEFAULT_STEP_LIMIT,
            heap_limit: DEFAULT_HEAP_LIMIT,
        }
    }

    /// Maximum instructions one call may execute.
    #[must_use]
    pub fn step_limit(mut self, n: u64) -> Self {
        self.step_limit = n;
        self
    }

    /// Maximum bytes the simulated heap may grow to.
    #[must_use]
    pub fn heap_limit(mut self, bytes: usize) -> Self {
        self.heap_limit = bytes;
        self
    }

    pub fn build(self) -> Interpreter<'m, 'p> {
        Interpreter {
            module: self.module,
            rt: Runtime::with_heap_limit(self.pool, self.heap_limit),
            globals: FxHashMap::default(),
            step_limit: self.step_limit,
            steps: 0,
        }
    }
}
