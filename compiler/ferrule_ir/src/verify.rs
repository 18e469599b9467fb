//! Structural verifier.
//!
//! Checks what the builder cannot check locally while a function is still
//! under construction: every block ends in exactly one terminator, phi
//! nodes lead their block and name exactly its predecessors, operands are
//! live values of the right shape, and runtime calls match their
//! signatures.

use crate::error::{VerifyError, VerifyErrorKind};
use crate::ids::{BlockId, FuncId, InstId, ValueId};
use crate::inst::InstKind;
use crate::module::{Function, Module, ValueDef};
use crate::types::IrType;

/// Verify every function of `module`, stopping at the first defect.
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    for (id, _) in module.functions() {
        verify_function(module, id)?;
    }
    Ok(())
}

/// Verify one function.
pub fn verify_function(module: &Module, id: FuncId) -> Result<(), VerifyError> {
    let f = module.function(id);
    check_function(f).map_err(|kind| {
        tracing::debug!(func = f.name(), %kind, "verification failed");
        VerifyError {
            func: f.name().to_owned(),
            kind,
        }
    })
}

fn check_function(f: &Function) -> Result<(), VerifyErrorKind> {
    if f.num_blocks() == 0 {
        return Err(VerifyErrorKind::NoBlocks);
    }
    for block in f.block_ids() {
        check_block(f, block)?;
    }
    Ok(())
}

fn check_block(f: &Function, block: BlockId) -> Result<(), VerifyErrorKind> {
    let insts = f.block_insts(block);
    let Some((&last, body)) = insts.split_last() else {
        return Err(VerifyErrorKind::MissingTerminator { block });
    };
    if !f.inst(last).kind.is_terminator() {
        return Err(VerifyErrorKind::MissingTerminator { block });
    }
    let mut seen_non_phi = false;
    for &inst in body {
        let kind = &f.inst(inst).kind;
        if kind.is_terminator() {
            return Err(VerifyErrorKind::TerminatorNotLast { block, inst });
        }
        if kind.is_phi() {
            if seen_non_phi {
                return Err(VerifyErrorKind::PhiNotAtStart { block, inst });
            }
            check_phi_edges(f, block, inst)?;
        } else {
            seen_non_phi = true;
        }
    }
    for &inst in insts {
        check_operands(f, inst)?;
        check_targets(f, inst)?;
        check_types(f, inst)?;
    }
    Ok(())
}

fn check_phi_edges(f: &Function, block: BlockId, inst: InstId) -> Result<(), VerifyErrorKind> {
    let InstKind::Phi { incoming, .. } = &f.inst(inst).kind else {
        return Ok(());
    };
    let mut from: Vec<BlockId> = incoming.iter().map(|&(_, b)| b).collect();
    from.sort_unstable();
    from.dedup();
    let mut preds = f.predecessors(block);
    preds.sort_unstable();
    if from != preds || incoming.len() != preds.len() {
        return Err(VerifyErrorKind::PhiPredecessors {
            block,
            inst,
            incoming: incoming.iter().map(|&(_, b)| b).collect(),
            preds,
        });
    }
    Ok(())
}

fn check_operands(f: &Function, inst: InstId) -> Result<(), VerifyErrorKind> {
    for value in f.inst(inst).kind.operands() {
        let live = value.index() < f.num_values()
            && match f.value(value).def {
                ValueDef::Inst(def) => !f.inst(def).erased,
                _ => true,
            };
        if !live {
            return Err(VerifyErrorKind::DeadOperand { inst, value });
        }
    }
    Ok(())
}

fn check_targets(f: &Function, inst: InstId) -> Result<(), VerifyErrorKind> {
    let kind = &f.inst(inst).kind;
    let phi_sources = match kind {
        InstKind::Phi { incoming, .. } => incoming.iter().map(|&(_, b)| b).collect(),
        _ => Vec::new(),
    };
    for target in kind.successors().into_iter().chain(phi_sources) {
        if target.index() >= f.num_blocks() {
            return Err(VerifyErrorKind::UnknownBlock { inst, target });
        }
    }
    Ok(())
}

fn check_types(f: &Function, inst: InstId) -> Result<(), VerifyErrorKind> {
    let ty = |v: ValueId| f.value_type(v);
    let bad = |detail: String| -> Result<(), VerifyErrorKind> {
        Err(VerifyErrorKind::OperandType { inst, detail })
    };
    match &f.inst(inst).kind {
        InstKind::Load(l) if !ty(l.ptr).is_ptr() => bad(format!("load through {}", ty(l.ptr))),
        InstKind::Store(s) if !ty(s.ptr).is_ptr() => bad(format!("store through {}", ty(s.ptr))),
        InstKind::Gep { ptr, offset } | InstKind::IndexGep { ptr, index: offset, .. }
            if !ty(*ptr).is_ptr() || !ty(*offset).is_int() =>
        {
            bad(format!("gep on {} by {}", ty(*ptr), ty(*offset)))
        }
        InstKind::Memcpy { dst, src, len, .. }
            if !ty(*dst).is_ptr() || !ty(*src).is_ptr() || !ty(*len).is_int() =>
        {
            bad("memcpy operands".to_owned())
        }
        InstKind::Memset { dst, byte, len, .. }
            if !ty(*dst).is_ptr() || *ty(*byte) != IrType::I8 || !ty(*len).is_int() =>
        {
            bad("memset operands".to_owned())
        }
        InstKind::Bin { op, lhs, rhs } if !ty(*lhs).is_int() || ty(*lhs) != ty(*rhs) => {
            bad(format!("{} on {} and {}", op.name(), ty(*lhs), ty(*rhs)))
        }
        InstKind::Overflow { op, lhs, rhs } if !ty(*lhs).is_int() || ty(*lhs) != ty(*rhs) => {
            bad(format!("{} on {} and {}", op.name(), ty(*lhs), ty(*rhs)))
        }
        InstKind::Icmp { lhs, rhs, .. }
            if ty(*lhs) != ty(*rhs) || !(ty(*lhs).is_int() || ty(*lhs).is_ptr()) =>
        {
            bad(format!("icmp on {} and {}", ty(*lhs), ty(*rhs)))
        }
        InstKind::Select {
            cond,
            then_val,
            else_val,
        } if *ty(*cond) != IrType::I1 || ty(*then_val) != ty(*else_val) => {
            bad("select operands".to_owned())
        }
        InstKind::ExtractValue { agg, index } if ty(*agg).element(*index).is_none() => {
            bad(format!("extractvalue {index} of {}", ty(*agg)))
        }
        InstKind::InsertValue { agg, val, index }
            if ty(*agg).element(*index) != Some(ty(*val)) =>
        {
            bad(format!("insertvalue {} at {index} of {}", ty(*val), ty(*agg)))
        }
        InstKind::CmpXchg {
            ptr, expected, new, ..
        } if !ty(*ptr).is_ptr() || ty(*expected) != ty(*new) => bad("cmpxchg operands".to_owned()),
        InstKind::AtomicXchg { ptr, .. } if !ty(*ptr).is_ptr() => {
            bad(format!("atomicrmw xchg through {}", ty(*ptr)))
        }
        InstKind::Phi { ty: phi_ty, incoming } if incoming.iter().any(|&(v, _)| ty(v) != phi_ty) => {
            bad(format!("phi {phi_ty} with an incoming value of another type"))
        }
        InstKind::CondBr { cond, .. } if *ty(*cond) != IrType::I1 => {
            bad(format!("br on {}", ty(*cond)))
        }
        InstKind::Switch { val, .. } if !ty(*val).is_int() => {
            bad(format!("switch on {}", ty(*val)))
        }
        InstKind::Ret(Some(v)) if ty(*v) != f.ret() => {
            bad(format!("ret {} from a function returning {}", ty(*v), f.ret()))
        }
        InstKind::Ret(None) if *f.ret() != IrType::Void => {
            bad("ret void from a non-void function".to_owned())
        }
        InstKind::Call { callee, args, .. } => {
            let sig = callee.signature();
            let arity_ok = if sig.variadic {
                args.len() >= sig.params.len()
            } else {
                args.len() == sig.params.len()
            };
            let types_ok = args.iter().enumerate().all(|(i, &a)| {
                sig.params.get(i).map_or(*ty(a) == IrType::TRACKED, |want| ty(a) == want)
            });
            if arity_ok && types_ok {
                Ok(())
            } else {
                Err(VerifyErrorKind::CallSignature {
                    inst,
                    callee: callee.name(),
                })
            }
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
