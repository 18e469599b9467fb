//! The per-function lowering context.
//!
//! `CodegenCx` bundles everything one lowering call needs: the type pool
//! (mutable, since lowering interns tuple and union types), the IR builder
//! positioned in the function under construction, the options, and the
//! per-unit memo tables. The shared [`InternTables`] are borrowed, never
//! owned, so several contexts can lower concurrently against one set of
//! tables.

use ferrule_ir::{FuncId, GlobalKind, IrBuilder, Module, ValueId};
use ferrule_types::{Constant, TypeId, TypePool};
use rustc_hash::FxHashMap;

use crate::debug_info::DebugTypes;
use crate::error::LowerError;
use crate::intern::InternTables;
use crate::options::CodegenOptions;
use crate::type_map::TypeCache;

/// Lowering state for one function.
pub struct CodegenCx<'a> {
    pub(crate) pool: &'a mut TypePool,
    pub(crate) b: IrBuilder<'a>,
    pub(crate) opts: CodegenOptions,
    intern: &'a InternTables,
    pub(crate) types: TypeCache,
    pub(crate) debug: DebugTypes,
    /// Stack slots moved to the heap: slot -> (object, derived pointer).
    pub(crate) promoted: FxHashMap<ValueId, (ValueId, ValueId)>,
    pub(crate) promotion_rank: u32,
}

impl<'a> CodegenCx<'a> {
    /// A context emitting into `func` of `module`.
    ///
    /// The options, the pool and the module must agree on the pointer
    /// size; layouts computed for one width are meaningless for another.
    pub fn new(
        module: &'a mut Module,
        func: FuncId,
        pool: &'a mut TypePool,
        intern: &'a InternTables,
        opts: CodegenOptions,
    ) -> Result<Self, LowerError> {
        if pool.pointer_size() != opts.pointer_size {
            return Err(LowerError::PointerSize {
                options: opts.pointer_size,
                other: pool.pointer_size(),
                what: "type pool",
            });
        }
        let dl = module.data_layout();
        if dl.pointer_size != opts.pointer_size {
            return Err(LowerError::PointerSize {
                options: opts.pointer_size,
                other: dl.pointer_size,
                what: "module data layout",
            });
        }
        let mut b = IrBuilder::new(module, func);
        b.set_name_values(opts.name_values);
        Ok(Self {
            pool,
            b,
            opts,
            intern,
            types: TypeCache::default(),
            debug: DebugTypes::default(),
            promoted: FxHashMap::default(),
            promotion_rank: 0,
        })
    }

    /// The builder, for the caller's own control flow (blocks, params,
    /// returns) between lowering calls.
    pub fn builder(&mut self) -> &mut IrBuilder<'a> {
        &mut self.b
    }

    pub fn pool(&self) -> &TypePool {
        self.pool
    }

    pub fn pool_mut(&mut self) -> &mut TypePool {
        self.pool
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.opts
    }

    /// Pointer size in bytes, as a `u32` offset unit.
    #[inline]
    pub(crate) fn ptr_size(&self) -> u32 {
        self.opts.pointer_size
    }

    /// Fail with [`LowerError::Builder`] if the builder has recorded any
    /// misuse so far.
    pub(crate) fn check_builder(&self, op: &'static str, before: u32) -> Result<(), LowerError> {
        if self.b.codegen_error_count() > before {
            tracing::error!(op, "builder rejected an instruction");
            return Err(LowerError::Builder { op });
        }
        Ok(())
    }

    /// Finish lowering, handing back the debug descriptors built along
    /// the way. Fails if any emitted instruction was malformed.
    pub fn finish(self) -> Result<DebugTypes, LowerError> {
        self.check_builder("function", 0)?;
        Ok(self.debug)
    }

    // === Globals ===

    /// Address of the module global holding `kind`, named through the
    /// shared intern tables.
    pub(crate) fn global(&mut self, kind: GlobalKind) -> ValueId {
        let name = self.intern.global_name(&kind, || self.global_hint(&kind));
        let g = self
            .b
            .module_mut()
            .get_or_insert_global(kind, || name.to_string());
        self.b.global_value(g)
    }

    fn global_hint(&self, kind: &GlobalKind) -> String {
        match kind {
            GlobalKind::TypeObject(t) => format!("+{}", self.pool.format_type(*t)),
            GlobalKind::TypeName(n) => format!("+name.{}", self.pool.type_name(*n).name),
            GlobalKind::Constant(_) => "jl_global".to_owned(),
            GlobalKind::BoxCache(t) => format!("box_cache.{}", self.pool.format_type(*t)),
            GlobalKind::SmallTypeofTable => "small_typeof".to_owned(),
            GlobalKind::EmptyMemory(t) => format!("empty.{}", self.pool.format_type(*t)),
            GlobalKind::CString(_) => "_j_str".to_owned(),
        }
    }

    /// The type object of `t` as a tracked pointer.
    pub(crate) fn type_object(&mut self, t: TypeId) -> ValueId {
        self.global(GlobalKind::TypeObject(t))
    }

    /// A NUL-terminated message for an error entry point.
    pub(crate) fn cstring(&mut self, s: &str) -> ValueId {
        self.global(GlobalKind::CString(s.to_owned()))
    }

    /// A permanently allocated boxed constant.
    pub(crate) fn literal(&mut self, c: Constant) -> ValueId {
        match c {
            Constant::Type(t) => self.type_object(t),
            c => self.global(GlobalKind::Constant(c)),
        }
    }
}
