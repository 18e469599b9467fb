//! ID-based IR builder.
//!
//! `IrBuilder` appends instructions to one function of a [`Module`] and
//! hands out only `Copy` handles (`ValueId`, `BlockId`, `InstId`).
//!
//! # Design
//!
//! - Every method takes `&mut self`; the builder mutably borrows the module.
//! - Operand misuse (loading through a non-pointer, adding a pointer and
//!   an integer, emitting with no insertion block) never panics: the
//!   builder logs an error, bumps `codegen_errors`, and returns a fallback
//!   value. A function built with a non-zero count must not be executed.
//! - Integer operations on constant operands fold to constants, so guards
//!   whose condition is statically known cost nothing.
//! - `position_before` inserts ahead of an existing instruction; together
//!   with `replace_all_uses` and `erase` it lets a stack value be promoted
//!   to a heap allocation after the fact.
//!
//! # Method Organization
//!
//! | Category | Methods |
//! |----------|---------|
//! | Constants | `const_int`, `const_i1`, `const_i8`, `const_i32`, `const_i64`, `const_float`, `const_null`, `const_zero`, `undef`, `global_value` |
//! | Memory | `alloca`, `load`, `load_with`, `store`, `store_atomic`, `gep`, `gep_bytes`, `index_gep`, `memcpy`, `memset` |
//! | Arithmetic | `add`, `sub`, `mul`, `and`, `or`, `xor`, `not`, `shl`, `lshr`, `ashr`, `udiv`, `urem`, `*_overflow` |
//! | Comparisons | `icmp`, `icmp_eq`, `icmp_ne`, `icmp_ult`, ..., `select` |
//! | Conversions | `trunc`, `zext`, `sext`, `bitcast`, `ptr_to_int`, `int_to_ptr`, `addrspace_cast`, `int_cast` |
//! | Aggregates | `extract_value`, `insert_value`, `extract_element`, `insert_element`, `build_struct` |
//! | Atomics | `cmpxchg`, `atomic_xchg`, `fence` |
//! | Calls | `call`, `call_with` |
//! | Control flow | `br`, `cond_br`, `switch`, `ret`, `ret_void`, `unreachable` |
//! | Phi nodes | `phi`, `add_incoming`, `phi_from_incoming` |
//! | Blocks | `append_block`, `position_at_end`, `position_before`, `current_block`, ... |
//! | Rewriting | `replace_all_uses`, `erase`, `def_inst` |

mod aggregates;
mod arithmetic;
mod atomics;
mod calls;
mod comparisons;
mod constants;
mod control_flow;
mod conversions;
mod memory;
mod phi_blocks;

use std::cell::Cell;

use crate::ids::{BlockId, FuncId, InstId, ValueId};
use crate::inst::InstKind;
use crate::module::{ConstValue, Function, InstData, Module, ValueData, ValueDef};
use crate::types::{DataLayout, IrType};

// ---------------------------------------------------------------------------
// IrBuilder
// ---------------------------------------------------------------------------

/// Instruction builder over one function of a module.
pub struct IrBuilder<'m> {
    module: &'m mut Module,
    func: FuncId,
    /// Block receiving appended instructions.
    current_block: Option<BlockId>,
    /// When set, new instructions go right before this one.
    insert_before: Option<InstId>,
    /// Attach the requested names to values.
    name_values: bool,
    /// Count of operand-misuse errors during construction.
    codegen_errors: Cell<u32>,
}

impl<'m> IrBuilder<'m> {
    pub fn new(module: &'m mut Module, func: FuncId) -> Self {
        Self {
            module,
            func,
            current_block: None,
            insert_before: None,
            name_values: true,
            codegen_errors: Cell::new(0),
        }
    }

    /// Stop (or resume) attaching names to emitted values.
    pub fn set_name_values(&mut self, on: bool) {
        self.name_values = on;
    }

    pub fn module(&self) -> &Module {
        self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        self.module
    }

    pub fn func_id(&self) -> FuncId {
        self.func
    }

    pub fn function(&self) -> &Function {
        self.module.function(self.func)
    }

    fn func_mut(&mut self) -> &mut Function {
        self.module.function_mut(self.func)
    }

    pub fn data_layout(&self) -> DataLayout {
        self.module.data_layout()
    }

    /// Record an operand-misuse error.
    pub(crate) fn record_codegen_error(&self) {
        self.codegen_errors.set(self.codegen_errors.get() + 1);
    }

    /// Number of misuse errors recorded so far.
    ///
    /// If > 0 the function is malformed and must not be executed.
    pub fn codegen_error_count(&self) -> u32 {
        self.codegen_errors.get()
    }

    // -----------------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------------

    /// Type of any value of the current function.
    pub fn value_type(&self, v: ValueId) -> IrType {
        self.function().value_type(v).clone()
    }

    /// Integer constant behind `v`, if it is one.
    pub fn const_value(&self, v: ValueId) -> Option<u128> {
        self.function().const_int(v)
    }

    /// The instruction that defines `v`, if any.
    pub fn def_inst(&self, v: ValueId) -> Option<InstId> {
        self.function().def_inst(v)
    }

    pub fn param(&mut self, n: usize) -> ValueId {
        if let Some(v) = self.function().param(n) {
            return v;
        }
        tracing::error!(n, "parameter index out of range");
        self.record_codegen_error();
        self.undef(IrType::I64)
    }

    pub fn set_value_name(&mut self, v: ValueId, name: &str) {
        if self.name_values && !name.is_empty() {
            self.func_mut().values[v.index()].name = Some(name.to_owned());
        }
    }

    pub(crate) fn push_value(&mut self, ty: IrType, def: ValueDef, name: &str) -> ValueId {
        let name = (self.name_values && !name.is_empty()).then(|| name.to_owned());
        let f = self.func_mut();
        let id = ValueId::next(f.values.len());
        f.values.push(ValueData { ty, def, name });
        id
    }

    pub(crate) fn push_const(&mut self, ty: IrType, c: ConstValue) -> ValueId {
        self.push_value(ty, ValueDef::Const(c), "")
    }

    // -----------------------------------------------------------------------
    // Instructions
    // -----------------------------------------------------------------------

    /// Insert `kind` at the current position, without a result.
    pub(crate) fn emit_void(&mut self, kind: InstKind) -> InstId {
        self.insert(kind)
    }

    /// Insert `kind` at the current position and return its result.
    pub(crate) fn emit(&mut self, kind: InstKind, ty: IrType, name: &str) -> ValueId {
        let inst = self.insert(kind);
        let v = self.push_value(ty, ValueDef::Inst(inst), name);
        self.func_mut().insts[inst.index()].result = Some(v);
        v
    }

    fn insert(&mut self, kind: InstKind) -> InstId {
        let target = match self.insert_before {
            Some(at) => Some((self.function().inst(at).block, Some(at))),
            None => self.current_block.map(|b| (b, None)),
        };
        let Some((block, before)) = target else {
            tracing::error!(?kind, "instruction emitted with no insertion point");
            self.record_codegen_error();
            let f = self.func_mut();
            let id = InstId::next(f.insts.len());
            f.insts.push(InstData {
                kind,
                result: None,
                block: BlockId::NONE,
                erased: true,
            });
            return id;
        };
        if before.is_none() && self.function().terminator(block).is_some() {
            tracing::error!(?block, ?kind, "instruction appended after a terminator");
            self.record_codegen_error();
        }
        let f = self.func_mut();
        let id = InstId::next(f.insts.len());
        f.insts.push(InstData {
            kind,
            result: None,
            block,
            erased: false,
        });
        let list = &mut f.blocks[block.index()].insts;
        match before.and_then(|at| list.iter().position(|&i| i == at)) {
            Some(pos) => list.insert(pos, id),
            None => list.push(id),
        }
        id
    }

    // -----------------------------------------------------------------------
    // Rewriting
    // -----------------------------------------------------------------------

    /// Redirect every live use of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        for data in &mut self.func_mut().insts {
            if !data.erased {
                data.kind.map_operands(|v| if v == old { new } else { v });
            }
        }
    }

    /// Unlink `inst` from its block. Its result must have no remaining uses.
    pub fn erase(&mut self, inst: InstId) {
        if let Some(v) = self.function().inst(inst).result {
            let uses = self.function().use_count(v);
            if uses > 0 {
                tracing::error!(?inst, uses, "erasing an instruction that is still used");
                self.record_codegen_error();
                return;
            }
        }
        if self.insert_before == Some(inst) {
            self.insert_before = None;
        }
        let f = self.func_mut();
        let block = f.insts[inst.index()].block;
        f.insts[inst.index()].erased = true;
        if !block.is_none() {
            f.blocks[block.index()].insts.retain(|&i| i != inst);
        }
    }
}
