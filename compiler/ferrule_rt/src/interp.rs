//! Reference interpreter for lowered IR.
//!
//! Executes one [`Function`] at a time against a [`Runtime`]. Memory
//! instructions go through the simulated heap using the module's data
//! layout; runtime calls dispatch to [`Runtime::call_runtime`]. Phi nodes
//! at a block head read their operands in parallel, as of the edge taken.

use ferrule_ir::{
    sign_extend, truncate_bits, BlockId, CastOp, ConstValue, FuncId, Function, GlobalId, InstId,
    InstKind, IrType, Module, ValueDef, ValueId,
};
use ferrule_types::TypePool;
use rustc_hash::FxHashMap;

use crate::error::InterpError;
use crate::runtime::{BarrierRecord, Runtime};
use crate::value::{float_bits, RtValue};

mod builder;

pub use builder::InterpreterBuilder;

/// Default cap on executed instructions per call.
pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

pub struct Interpreter<'m, 'p> {
    module: &'m Module,
    rt: Runtime<'p>,
    globals: FxHashMap<GlobalId, u64>,
    step_limit: u64,
    steps: u64,
}

/// Values of one activation.
struct Frame<'f> {
    func: &'f Function,
    args: Vec<RtValue>,
    values: Vec<Option<RtValue>>,
}

enum Flow {
    Next,
    Jump(BlockId),
    Return(RtValue),
}

impl<'m, 'p> Interpreter<'m, 'p> {
    pub fn new(module: &'m Module, pool: &'p TypePool) -> Self {
        InterpreterBuilder::new(module, pool).build()
    }

    pub fn runtime(&self) -> &Runtime<'p> {
        &self.rt
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime<'p> {
        &mut self.rt
    }

    /// Write barriers issued so far.
    pub fn barriers(&self) -> &[BarrierRecord] {
        self.rt.barriers()
    }

    /// Instructions executed by the last call.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Address of module global `g`, materialized on first use.
    pub fn global_address(&mut self, g: GlobalId) -> Result<u64, InterpError> {
        if let Some(&addr) = self.globals.get(&g) {
            return Ok(addr);
        }
        let addr = self.rt.materialize_global(&self.module.global(g).kind)?;
        self.globals.insert(g, addr);
        Ok(addr)
    }

    pub fn call_by_name(&mut self, name: &str, args: &[RtValue]) -> Result<RtValue, InterpError> {
        let id = self
            .module
            .find_function(name)
            .ok_or_else(|| InterpError::UnknownFunction(name.to_owned()))?;
        self.call(id, args)
    }

    /// Run `id` to completion.
    pub fn call(&mut self, id: FuncId, args: &[RtValue]) -> Result<RtValue, InterpError> {
        let module = self.module;
        let func = module.function(id);
        if args.len() != func.params().len() {
            return Err(InterpError::Arity {
                func: func.name().to_owned(),
                expected: func.params().len(),
                got: args.len(),
            });
        }
        tracing::debug!(func = func.name(), "interpret");
        self.steps = 0;
        let mut frame = Frame {
            func,
            args: args.to_vec(),
            values: vec![None; func.num_values()],
        };
        let mut block = func
            .entry()
            .ok_or_else(|| InterpError::Malformed(format!("`{}` has no body", func.name())))?;
        let mut pred: Option<BlockId> = None;
        loop {
            let insts = func.block_insts(block);
            let nphis = insts
                .iter()
                .take_while(|&&i| func.inst(i).kind.is_phi())
                .count();
            self.enter_block(&mut frame, block, pred, &insts[..nphis])?;
            let mut next = None;
            for &i in &insts[nphis..] {
                self.tick()?;
                match self.exec(&mut frame, i)? {
                    Flow::Next => {}
                    Flow::Jump(b) => {
                        next = Some(b);
                        break;
                    }
                    Flow::Return(v) => return Ok(v),
                }
            }
            let Some(b) = next else {
                return Err(InterpError::Malformed(format!(
                    "block {block:?} of `{}` has no terminator",
                    func.name()
                )));
            };
            pred = Some(block);
            block = b;
        }
    }

    fn tick(&mut self) -> Result<(), InterpError> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(InterpError::StepLimit(self.step_limit));
        }
        Ok(())
    }

    /// Evaluate every phi of `block` against the edge from `pred`, then
    /// assign them all at once.
    fn enter_block(
        &mut self,
        frame: &mut Frame<'_>,
        block: BlockId,
        pred: Option<BlockId>,
        phis: &[InstId],
    ) -> Result<(), InterpError> {
        if phis.is_empty() {
            return Ok(());
        }
        let pred = pred.ok_or_else(|| {
            InterpError::Malformed(format!("phi in entry block {block:?}"))
        })?;
        let mut incoming = Vec::with_capacity(phis.len());
        for &i in phis {
            let data = frame.func.inst(i);
            let InstKind::Phi { incoming: edges, .. } = &data.kind else {
                continue;
            };
            let &(v, _) = edges
                .iter()
                .find(|(_, b)| *b == pred)
                .ok_or(InterpError::MissingPhiEdge { block, pred })?;
            incoming.push((data.result, self.operand(frame, v)?));
        }
        for (result, val) in incoming {
            if let Some(r) = result {
                frame.values[r.index()] = Some(val);
            }
        }
        Ok(())
    }

    // === Operands ===

    fn operand(&mut self, frame: &Frame<'_>, v: ValueId) -> Result<RtValue, InterpError> {
        let data = frame.func.value(v);
        match &data.def {
            ValueDef::Param(n) => frame
                .args
                .get(*n as usize)
                .cloned()
                .ok_or(InterpError::UseBeforeDef { value: v }),
            ValueDef::Const(c) => const_value(c, &data.ty),
            ValueDef::Global(g) => Ok(RtValue::Ptr(self.global_address(*g)?)),
            ValueDef::Inst(_) => frame
                .values
                .get(v.index())
                .cloned()
                .flatten()
                .ok_or(InterpError::UseBeforeDef { value: v }),
        }
    }

    fn ptr(&mut self, frame: &Frame<'_>, v: ValueId) -> Result<u64, InterpError> {
        self.operand(frame, v)?
            .as_ptr()
            .ok_or_else(|| InterpError::Malformed(format!("{v:?} is not a pointer")))
    }

    /// An integer or pointer operand as `(bits, value)`.
    fn scalar(&mut self, frame: &Frame<'_>, v: ValueId) -> Result<(u32, u128), InterpError> {
        match self.operand(frame, v)? {
            RtValue::Int { bits, value } => Ok((bits, value)),
            RtValue::Ptr(a) => Ok((64, u128::from(a))),
            other => Err(InterpError::Malformed(format!(
                "{v:?} is not an integer: {other:?}"
            ))),
        }
    }

    fn int(&mut self, frame: &Frame<'_>, v: ValueId) -> Result<u128, InterpError> {
        self.scalar(frame, v).map(|(_, x)| x)
    }

    /// A byte count or offset operand, sign-extended from its width.
    fn offset(&mut self, frame: &Frame<'_>, v: ValueId) -> Result<i64, InterpError> {
        let (bits, x) = self.scalar(frame, v)?;
        i64::try_from(sign_extend(x, bits))
            .map_err(|_| InterpError::Malformed(format!("offset {x} out of range")))
    }

    fn length(&mut self, frame: &Frame<'_>, v: ValueId) -> Result<u64, InterpError> {
        let x = self.int(frame, v)?;
        u64::try_from(x).map_err(|_| InterpError::Malformed(format!("length {x} out of range")))
    }

    // === Memory ===

    fn load_value(&self, ty: &IrType, addr: u64) -> Result<RtValue, InterpError> {
        let dl = self.rt.data_layout();
        let bytes = self.rt.heap().bytes(addr, dl.store_size(ty))?;
        Ok(RtValue::decode(ty, dl, bytes))
    }

    fn store_value(&mut self, val: &RtValue, ty: &IrType, addr: u64) -> Result<(), InterpError> {
        let dl = *self.rt.data_layout();
        let mut buf = vec![0u8; byte_len(dl.store_size(ty))?];
        val.encode(ty, &dl, &mut buf);
        self.rt.heap_mut().write_bytes(addr, &buf)
    }

    // === Instructions ===

    fn exec(&mut self, frame: &mut Frame<'_>, i: InstId) -> Result<Flow, InterpError> {
        let func = frame.func;
        let data = func.inst(i);
        let value = match &data.kind {
            // --- Memory ---
            InstKind::Alloca { ty, align } => {
                let size = self.rt.data_layout().alloc_size(ty);
                let addr = self.rt.heap_mut().alloc_raw(size, u64::from(*align).max(1))?;
                RtValue::Ptr(addr)
            }
            InstKind::Load(load) => {
                let addr = self.ptr(frame, load.ptr)?;
                self.load_value(&load.ty, addr)?
            }
            InstKind::Store(store) => {
                let val = self.operand(frame, store.val)?;
                let addr = self.ptr(frame, store.ptr)?;
                let ty = func.value(store.val).ty.clone();
                self.store_value(&val, &ty, addr)?;
                RtValue::Void
            }
            InstKind::Gep { ptr, offset } => {
                let base = self.ptr(frame, *ptr)?;
                let off = self.offset(frame, *offset)?;
                RtValue::Ptr(base.wrapping_add_signed(off))
            }
            InstKind::IndexGep { elem, ptr, index } => {
                let base = self.ptr(frame, *ptr)?;
                let idx = self.offset(frame, *index)?;
                let stride = i64::try_from(self.rt.data_layout().alloc_size(elem))
                    .map_err(|_| InterpError::Malformed("element too large".into()))?;
                RtValue::Ptr(base.wrapping_add_signed(idx.wrapping_mul(stride)))
            }
            InstKind::Memcpy { dst, src, len, .. } => {
                let (d, s) = (self.ptr(frame, *dst)?, self.ptr(frame, *src)?);
                let n = self.length(frame, *len)?;
                self.rt.heap_mut().copy(d, s, n)?;
                RtValue::Void
            }
            InstKind::Memset { dst, byte, len, .. } => {
                let d = self.ptr(frame, *dst)?;
                let b = u8::try_from(truncate_bits(self.int(frame, *byte)?, 8)).unwrap_or(0);
                let n = self.length(frame, *len)?;
                self.rt.heap_mut().fill(d, b, n)?;
                RtValue::Void
            }

            // --- Arithmetic ---
            InstKind::Bin { op, lhs, rhs } => {
                let (bits, a) = self.scalar(frame, *lhs)?;
                let b = self.int(frame, *rhs)?;
                let r = op.eval(bits, a, b).ok_or_else(|| {
                    InterpError::Undefined(format!("{} of {a} by {b}", op.name()))
                })?;
                RtValue::int(bits, r)
            }
            InstKind::Overflow { op, lhs, rhs } => {
                let (bits, a) = self.scalar(frame, *lhs)?;
                let b = self.int(frame, *rhs)?;
                let (r, overflow) = op.eval(bits, a, b);
                RtValue::agg(vec![RtValue::int(bits, r), RtValue::bool(overflow)])
            }
            InstKind::Icmp { pred, lhs, rhs } => {
                let (bits, a) = self.scalar(frame, *lhs)?;
                let b = self.int(frame, *rhs)?;
                RtValue::bool(pred.eval(bits, a, b))
            }
            InstKind::Select {
                cond,
                then_val,
                else_val,
            } => {
                if self.int(frame, *cond)? != 0 {
                    self.operand(frame, *then_val)?
                } else {
                    self.operand(frame, *else_val)?
                }
            }
            InstKind::Cast { op, val, to } => {
                let from = func.value(*val).ty.clone();
                let v = self.operand(frame, *val)?;
                self.cast(*op, v, &from, to)?
            }

            // --- Aggregates ---
            InstKind::ExtractValue { agg, index } => {
                let a = self.operand(frame, *agg)?;
                member(&a, *index as usize)?.clone()
            }
            InstKind::InsertValue { agg, val, index } => {
                let a = self.operand(frame, *agg)?;
                let v = self.operand(frame, *val)?;
                with_member(a, *index as usize, v)?
            }
            InstKind::ExtractElement { vec, index } => {
                let a = self.operand(frame, *vec)?;
                let idx = self.length(frame, *index)?;
                member(&a, lane(idx)?)?.clone()
            }
            InstKind::InsertElement { vec, val, index } => {
                let a = self.operand(frame, *vec)?;
                let v = self.operand(frame, *val)?;
                let idx = self.length(frame, *index)?;
                with_member(a, lane(idx)?, v)?
            }

            // --- Atomics ---
            InstKind::CmpXchg {
                ptr, expected, new, ..
            } => {
                let ty = func.value(*expected).ty.clone();
                let addr = self.ptr(frame, *ptr)?;
                let want = self.operand(frame, *expected)?;
                let new = self.operand(frame, *new)?;
                let dl = *self.rt.data_layout();
                let len = dl.store_size(&ty);
                let mut want_bytes = vec![0u8; byte_len(len)?];
                want.encode(&ty, &dl, &mut want_bytes);
                let old = self.load_value(&ty, addr)?;
                let matched = self.rt.heap().bytes(addr, len)? == want_bytes.as_slice();
                if matched {
                    self.store_value(&new, &ty, addr)?;
                }
                RtValue::agg(vec![old, RtValue::bool(matched)])
            }
            InstKind::AtomicXchg { ptr, val, .. } => {
                let ty = func.value(*val).ty.clone();
                let addr = self.ptr(frame, *ptr)?;
                let new = self.operand(frame, *val)?;
                let old = self.load_value(&ty, addr)?;
                self.store_value(&new, &ty, addr)?;
                old
            }
            InstKind::Fence(_) => RtValue::Void,

            // --- Calls ---
            InstKind::Call { callee, args, .. } => {
                let vals = args
                    .iter()
                    .map(|&a| self.operand(frame, a))
                    .collect::<Result<Vec<_>, _>>()?;
                let r = self.rt.call_runtime(*callee, &vals)?;
                if callee.is_noreturn() {
                    return Err(InterpError::ReturnedFromNoreturn(callee.name()));
                }
                r
            }
            InstKind::Phi { .. } => {
                return Err(InterpError::Malformed(format!(
                    "phi {i:?} after the head of its block"
                )))
            }

            // --- Terminators ---
            InstKind::Br(b) => return Ok(Flow::Jump(*b)),
            InstKind::CondBr {
                cond,
                then_bb,
                else_bb,
            } => {
                let taken = if self.int(frame, *cond)? != 0 {
                    *then_bb
                } else {
                    *else_bb
                };
                return Ok(Flow::Jump(taken));
            }
            InstKind::Switch {
                val,
                default,
                cases,
            } => {
                let x = self.int(frame, *val)?;
                let dest = cases
                    .iter()
                    .find(|(c, _)| *c == x)
                    .map_or(*default, |&(_, b)| b);
                return Ok(Flow::Jump(dest));
            }
            InstKind::Ret(v) => {
                let r = match v {
                    Some(v) => self.operand(frame, *v)?,
                    None => RtValue::Void,
                };
                return Ok(Flow::Return(r));
            }
            InstKind::Unreachable => {
                return Err(InterpError::Unreachable {
                    func: func.name().to_owned(),
                })
            }
        };
        if let Some(r) = data.result {
            frame.values[r.index()] = Some(value);
        }
        Ok(Flow::Next)
    }

    fn cast(&self, op: CastOp, v: RtValue, from: &IrType, to: &IrType) -> Result<RtValue, InterpError> {
        let to_bits = || {
            to.int_bits()
                .ok_or_else(|| InterpError::Malformed(format!("{} to {to}", op.name())))
        };
        Ok(match op {
            CastOp::Trunc | CastOp::ZExt => RtValue::int(to_bits()?, v.scalar_bits()),
            CastOp::SExt => {
                let bits = from.int_bits().unwrap_or(64);
                RtValue::int(to_bits()?, sext_bits(v.scalar_bits(), bits))
            }
            CastOp::PtrToInt => RtValue::int(to_bits()?, v.scalar_bits()),
            CastOp::IntToPtr | CastOp::AddrSpaceCast => {
                RtValue::Ptr(u64::try_from(truncate_bits(v.scalar_bits(), 64)).unwrap_or(0))
            }
            CastOp::Bitcast => {
                let dl = self.rt.data_layout();
                let mut buf = vec![0u8; byte_len(dl.store_size(from).max(dl.store_size(to)))?];
                v.encode(from, dl, &mut buf);
                RtValue::decode(to, dl, &buf)
            }
        })
    }
}

// === Helpers ===

fn const_value(c: &ConstValue, ty: &IrType) -> Result<RtValue, InterpError> {
    Ok(match (c, ty) {
        (ConstValue::Int(v), IrType::Int(bits)) => RtValue::int(*bits, *v),
        (ConstValue::Int(v), IrType::Ptr(_)) => {
            RtValue::Ptr(u64::try_from(truncate_bits(*v, 64)).unwrap_or(0))
        }
        (ConstValue::Float(raw), _) if ty.is_float() => RtValue::Float {
            bits: float_bits(ty),
            raw: *raw,
        },
        (ConstValue::Null, _) => RtValue::Ptr(0),
        (ConstValue::Zero | ConstValue::Undef, _) => RtValue::zero(ty),
        (c, ty) => {
            return Err(InterpError::Malformed(format!(
                "constant {c:?} of type {ty}"
            )))
        }
    })
}

#[expect(
    clippy::cast_sign_loss,
    reason = "two's-complement reinterpretation; RtValue::int masks to width"
)]
fn sext_bits(v: u128, from_bits: u32) -> u128 {
    sign_extend(v, from_bits) as u128
}

fn byte_len(n: u64) -> Result<usize, InterpError> {
    usize::try_from(n).map_err(|_| InterpError::Malformed(format!("{n} bytes")))
}

fn lane(idx: u64) -> Result<usize, InterpError> {
    usize::try_from(idx).map_err(|_| InterpError::Malformed(format!("lane {idx}")))
}

fn member(agg: &RtValue, idx: usize) -> Result<&RtValue, InterpError> {
    agg.members()
        .and_then(|ms| ms.get(idx))
        .ok_or_else(|| InterpError::Malformed(format!("no member {idx} in {agg:?}")))
}

fn with_member(agg: RtValue, idx: usize, val: RtValue) -> Result<RtValue, InterpError> {
    let RtValue::Agg(mut ms) = agg else {
        return Err(InterpError::Malformed(format!("insert into non-aggregate {agg:?}")));
    };
    let slot = ms
        .get_mut(idx)
        .ok_or_else(|| InterpError::Malformed(format!("no member {idx}")))?;
    *slot = val;
    Ok(RtValue::Agg(ms))
}
