//! Modules, functions and their arenas.
//!
//! A [`Function`] owns three arenas: values (parameters, constants,
//! global addresses and instruction results), instructions and blocks.
//! Blocks list their instructions in program order; erased instructions
//! stay in the arena but are unlinked from their block.

use ferrule_types::{Constant, TypeId, TypeNameId};
use rustc_hash::FxHashMap;

use crate::ids::{BlockId, FuncId, GlobalId, InstId, ValueId};
use crate::inst::InstKind;
use crate::types::{DataLayout, IrType};

// === Values ===

/// A compile-time constant operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstValue {
    /// Integer masked to the value's width.
    Int(u128),
    /// Bit pattern of a floating-point value.
    Float(u64),
    Null,
    /// All-zero value of any type.
    Zero,
    Undef,
}

/// Where a value comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueDef {
    Param(u32),
    Const(ConstValue),
    Global(GlobalId),
    Inst(InstId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueData {
    pub ty: IrType,
    pub def: ValueDef,
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct InstData {
    pub kind: InstKind,
    pub result: Option<ValueId>,
    pub block: BlockId,
    pub erased: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockData {
    pub name: String,
    pub insts: Vec<InstId>,
}

// === Functions ===

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Function {
    name: String,
    params: Vec<IrType>,
    ret: IrType,
    pub(crate) values: Vec<ValueData>,
    pub(crate) insts: Vec<InstData>,
    pub(crate) blocks: Vec<BlockData>,
    pub(crate) global_values: FxHashMap<GlobalId, ValueId>,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<IrType>, ret: IrType) -> Self {
        let values = params
            .iter()
            .enumerate()
            .map(|(i, ty)| ValueData {
                ty: ty.clone(),
                def: ValueDef::Param(u32::try_from(i).unwrap_or(u32::MAX)),
                name: None,
            })
            .collect();
        Self {
            name: name.into(),
            params,
            ret,
            values,
            insts: Vec::new(),
            blocks: Vec::new(),
            global_values: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[IrType] {
        &self.params
    }

    pub fn ret(&self) -> &IrType {
        &self.ret
    }

    /// Value of parameter `n`; parameters occupy the first value slots.
    pub fn param(&self, n: usize) -> Option<ValueId> {
        (n < self.params.len()).then(|| ValueId::next(n))
    }

    pub fn value(&self, v: ValueId) -> &ValueData {
        &self.values[v.index()]
    }

    pub fn value_type(&self, v: ValueId) -> &IrType {
        &self.values[v.index()].ty
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn inst(&self, i: InstId) -> &InstData {
        &self.insts[i.index()]
    }

    pub fn block(&self, b: BlockId) -> &BlockData {
        &self.blocks[b.index()]
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId::next)
    }

    pub fn entry(&self) -> Option<BlockId> {
        (!self.blocks.is_empty()).then(|| BlockId::from_raw(0))
    }

    /// Live instructions of `b` in program order.
    pub fn block_insts(&self, b: BlockId) -> &[InstId] {
        &self.blocks[b.index()].insts
    }

    pub fn terminator(&self, b: BlockId) -> Option<InstId> {
        let last = *self.blocks[b.index()].insts.last()?;
        self.insts[last.index()].kind.is_terminator().then_some(last)
    }

    pub fn successors(&self, b: BlockId) -> Vec<BlockId> {
        self.terminator(b)
            .map(|t| self.insts[t.index()].kind.successors().to_vec())
            .unwrap_or_default()
    }

    /// Distinct predecessors of `b`, in block order.
    pub fn predecessors(&self, b: BlockId) -> Vec<BlockId> {
        self.block_ids()
            .filter(|&p| self.successors(p).contains(&b))
            .collect()
    }

    /// The instruction defining `v`, if any.
    pub fn def_inst(&self, v: ValueId) -> Option<InstId> {
        match self.values[v.index()].def {
            ValueDef::Inst(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_const(&self, v: ValueId) -> Option<&ConstValue> {
        match &self.values[v.index()].def {
            ValueDef::Const(c) => Some(c),
            _ => None,
        }
    }

    /// Integer constant value of `v`, treating `zero`/`null` as 0.
    pub fn const_int(&self, v: ValueId) -> Option<u128> {
        match self.as_const(v)? {
            ConstValue::Int(n) => Some(*n),
            ConstValue::Zero | ConstValue::Null => Some(0),
            ConstValue::Float(_) | ConstValue::Undef => None,
        }
    }

    /// Number of live uses of `v`.
    pub fn use_count(&self, v: ValueId) -> usize {
        self.insts
            .iter()
            .filter(|d| !d.erased)
            .map(|d| d.kind.operands().iter().filter(|&&o| o == v).count())
            .sum()
    }
}

// === Globals ===

/// What a module-level global holds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum GlobalKind {
    /// The runtime type object of a type.
    TypeObject(TypeId),
    /// The runtime type-name object of a family.
    TypeName(TypeNameId),
    /// A permanently allocated boxed constant.
    Constant(Constant),
    /// 256 boxed values of an 8-bit integer type, indexed by bit pattern.
    BoxCache(TypeId),
    /// Type objects indexed by `smalltag`.
    SmallTypeofTable,
    /// The shared zero-length instance of a `Memory` type.
    EmptyMemory(TypeId),
    /// A NUL-terminated byte string.
    CString(String),
}

impl GlobalKind {
    /// Type of the global's address as an operand.
    pub fn value_type(&self) -> IrType {
        match self {
            Self::TypeObject(_) | Self::TypeName(_) | Self::Constant(_) | Self::EmptyMemory(_) => {
                IrType::TRACKED
            }
            Self::BoxCache(_) | Self::SmallTypeofTable | Self::CString(_) => IrType::PTR,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Global {
    pub name: String,
    pub kind: GlobalKind,
}

// === Modules ===

/// A compilation unit: functions plus the globals they reference.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Module {
    name: String,
    data_layout: DataLayout,
    globals: Vec<Global>,
    global_index: FxHashMap<GlobalKind, GlobalId>,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>, data_layout: DataLayout) -> Self {
        Self {
            name: name.into(),
            data_layout,
            globals: Vec::new(),
            global_index: FxHashMap::default(),
            functions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_layout(&self) -> DataLayout {
        self.data_layout
    }

    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<IrType>,
        ret: IrType,
    ) -> FuncId {
        let id = FuncId::next(self.functions.len());
        self.functions.push(Function::new(name, params, ret));
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId::next(i), f))
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FuncId::next)
    }

    /// The global holding `kind`, created with `name()` on first request.
    pub fn get_or_insert_global(
        &mut self,
        kind: GlobalKind,
        name: impl FnOnce() -> String,
    ) -> GlobalId {
        if let Some(&id) = self.global_index.get(&kind) {
            return id;
        }
        let id = GlobalId::next(self.globals.len());
        tracing::trace!(?kind, "new global");
        self.globals.push(Global {
            name: name(),
            kind: kind.clone(),
        });
        self.global_index.insert(kind, id);
        id
    }

    pub fn find_global(&self, kind: &GlobalKind) -> Option<GlobalId> {
        self.global_index.get(kind).copied()
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &Global)> {
        self.globals
            .iter()
            .enumerate()
            .map(|(i, g)| (GlobalId::next(i), g))
    }
}
