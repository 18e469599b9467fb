use pretty_assertions::assert_eq;

use super::*;
use crate::builder::IrBuilder;
use crate::runtime::RuntimeFn;
use crate::types::DataLayout;

fn module() -> (Module, FuncId) {
    let mut m = Module::new("test", DataLayout::default());
    let f = m.add_function("f", vec![IrType::I64, IrType::TRACKED], IrType::I64);
    (m, f)
}

fn kind_of(m: &Module, f: FuncId) -> VerifyErrorKind {
    verify_function(m, f).unwrap_err().kind
}

#[test]
fn well_formed_diamond_passes() {
    let (mut m, f) = module();
    {
        let mut b = IrBuilder::new(&mut m, f);
        let entry = b.append_block("entry");
        let yes = b.append_block("yes");
        let join = b.append_block("join");
        b.position_at_end(entry);
        let p = b.param(0);
        let zero = b.const_i64(0);
        let c = b.icmp_slt(p, zero, "neg");
        b.cond_br(c, yes, join);
        b.position_at_end(yes);
        let n = b.sub(zero, p, "n");
        b.br(join);
        b.position_at_end(join);
        let r = b.phi_from_incoming(IrType::I64, &[(p, entry), (n, yes)], "abs");
        b.ret(r);
        assert_eq!(b.codegen_error_count(), 0);
    }
    verify_module(&m).unwrap();
}

#[test]
fn empty_function_and_open_block() {
    let (mut m, f) = module();
    assert_eq!(kind_of(&m, f), VerifyErrorKind::NoBlocks);

    let mut b = IrBuilder::new(&mut m, f);
    let entry = b.append_block("entry");
    b.position_at_end(entry);
    let p = b.param(0);
    let one = b.const_i64(1);
    let _ = b.add(p, one, "x");
    assert_eq!(
        kind_of(&m, f),
        VerifyErrorKind::MissingTerminator { block: entry }
    );
}

#[test]
fn phi_must_name_every_predecessor() {
    let (mut m, f) = module();
    let (join, phi_inst) = {
        let mut b = IrBuilder::new(&mut m, f);
        let entry = b.append_block("entry");
        let yes = b.append_block("yes");
        let join = b.append_block("join");
        b.position_at_end(entry);
        let p = b.param(0);
        let zero = b.const_i64(0);
        let c = b.icmp_eq(p, zero, "c");
        b.cond_br(c, yes, join);
        b.position_at_end(yes);
        b.br(join);
        b.position_at_end(join);
        let phi = b.phi(IrType::I64, "r");
        b.add_incoming(phi, p, yes);
        b.ret(phi);
        (join, b.def_inst(phi).unwrap())
    };
    let err = verify_function(&m, f).unwrap_err();
    assert_eq!(err.func, "f");
    let VerifyErrorKind::PhiPredecessors { block, inst, .. } = &err.kind else {
        panic!("expected a phi edge error, got {err}");
    };
    assert_eq!((*block, *inst), (join, phi_inst));
}

#[test]
fn erased_operands_are_reported() {
    let (mut m, f) = module();
    let x = {
        let mut b = IrBuilder::new(&mut m, f);
        let entry = b.append_block("entry");
        b.position_at_end(entry);
        let p = b.param(0);
        let x = b.mul(p, p, "x");
        b.ret(x);
        x
    };
    let def = m.function(f).def_inst(x).unwrap();
    m.function_mut(f).insts[def.index()].erased = true;
    let block = m.function(f).entry().unwrap();
    m.function_mut(f).blocks[block.index()]
        .insts
        .retain(|&i| i != def);
    assert!(matches!(
        kind_of(&m, f),
        VerifyErrorKind::DeadOperand { value, .. } if value == x
    ));
}

#[test]
fn call_arguments_checked_against_signature() {
    let (mut m, f) = module();
    {
        let mut b = IrBuilder::new(&mut m, f);
        let entry = b.append_block("entry");
        b.position_at_end(entry);
        let p = b.param(0);
        let _ = b.call(RuntimeFn::BoundsError, &[p, p], "");
        b.unreachable();
        assert_eq!(b.codegen_error_count(), 1);
    }
    assert!(matches!(
        kind_of(&m, f),
        VerifyErrorKind::CallSignature {
            callee: "bounds_error",
            ..
        }
    ));
}

#[test]
fn ret_type_mismatch() {
    let (mut m, f) = module();
    {
        let mut b = IrBuilder::new(&mut m, f);
        let entry = b.append_block("entry");
        b.position_at_end(entry);
        let obj = b.param(1);
        b.ret(obj);
    }
    let err = verify_function(&m, f).unwrap_err();
    assert!(err.to_string().contains("ret ptr addrspace(10)"), "{err}");
}
