//! Code-generation driver.
//!
//! Walks blocks in input order.  Per instruction: clear the allocator's
//! selection set, try the cheap idioms (INC/DEC, doubling, halving, parity),
//! fall back to the generic macro, then hand the produced register to the
//! destination operand.  Terminators save named variables, emit the branch
//! and drop all register bindings.

use super::dataflow::{dominators, predecessors};
use super::instruction::{AsmItem, VmInstr};
use super::liveness::{block_liveness, next_uses, BlockNextUse};
use super::macros::Emitter;
use crate::diagnostics::Diagnostics;
use crate::ir::{ArithOp, BlockId, Instr, Operand, ProgramIr};
use num_bigint::BigInt;
use num_traits::One;

pub fn generate(program: &ProgramIr, diags: &mut Diagnostics) -> Vec<AsmItem> {
    let preds = predecessors(&program.blocks).expect("malformed control-flow graph");
    let doms = dominators(&program.blocks, &preds);
    let live = block_liveness(&program.blocks);

    let mut em = Emitter::new(&program.symbols, diags);
    for (bi, block) in program.blocks.iter().enumerate() {
        em.label(block.label.clone());
        let nu = next_uses(block, &live.live_out[bi]);

        for (i, ins) in block.instrs.iter().enumerate() {
            em.regs.clear_selection();
            match ins {
                Instr::Move { src, dst } => {
                    // A constant arrives in a fresh register; a dying source
                    // donates its register outright.  Otherwise copy.
                    let rebind = match src {
                        Operand::Const(_) => true,
                        other => nu.is_dead_after(i, other),
                    };
                    let rs = em.load(src);
                    if rebind {
                        em.regs.seize(rs, dst);
                    } else {
                        let rd = em.select();
                        em.push(VmInstr::Copy(rd, rs));
                        em.regs.seize(rd, dst);
                    }
                }
                Instr::Get { dst } => {
                    let r = em.select();
                    em.push(VmInstr::Get(r));
                    em.regs.seize(r, dst);
                }
                Instr::Put { src } => {
                    let r = em.load(src);
                    em.push(VmInstr::Put(r));
                }
                Instr::Load { base, index, dst } => {
                    let r = em.regs.load_element(*base, index, &mut em.out, &mut *em.diags);
                    em.regs.seize(r, dst);
                }
                Instr::Store { src, base, index } => {
                    em.regs
                        .store_element(src, *base, index, &mut em.out, &mut *em.diags);
                }
                Instr::Binary {
                    op,
                    left,
                    right,
                    dst,
                } => lower_binary(&mut em, *op, left, right, dst),
                Instr::Jump { target } => {
                    let merge = !doms[target.0].contains(&BlockId(bi));
                    em.regs
                        .save_variables(&live.live_out[bi], merge, &mut em.out);
                    em.push(VmInstr::Jump(program.blocks[target.0].label.clone()));
                    em.regs.reset_registers();
                }
                Instr::Branch {
                    op,
                    left,
                    right,
                    if_true,
                    if_false,
                } => {
                    let merge = !doms[if_true.0].contains(&BlockId(bi))
                        || !doms[if_false.0].contains(&BlockId(bi));
                    em.regs
                        .save_variables(&live.live_out[bi], merge, &mut em.out);
                    let t = program.blocks[if_true.0].label.clone();
                    let f = program.blocks[if_false.0].label.clone();
                    em.branch(*op, left, right, &t, &f);
                    em.regs.reset_registers();
                }
                Instr::Halt => {
                    em.regs
                        .save_variables(&live.live_out[bi], false, &mut em.out);
                    em.push(VmInstr::Halt);
                    em.regs.reset_registers();
                }
            }

            if !ins.is_terminator() {
                release_dead(&mut em, ins, i, &nu);
            }
        }
    }

    let mut items = em.out;
    super::opt::optimize(&mut items);
    items
}

/// Free the register bindings of operands with no further use, so they stop
/// competing for registers.
fn release_dead(em: &mut Emitter<'_>, ins: &Instr, i: usize, nu: &BlockNextUse) {
    for u in ins.uses() {
        if !matches!(u, Operand::Const(_)) && nu.is_dead_after(i, u) {
            em.regs.drop_dead(u);
        }
    }
    if let Some(d) = ins.defined() {
        if nu.is_dead_after(i, d) {
            em.regs.drop_dead(d);
        }
    }
}

fn is_one(op: &Operand) -> bool {
    op.as_const().is_some_and(One::is_one)
}

fn is_two(op: &Operand) -> bool {
    op.as_const().is_some_and(|c| *c == BigInt::from(2))
}

fn lower_binary(em: &mut Emitter<'_>, op: ArithOp, left: &Operand, right: &Operand, dst: &Operand) {
    match op {
        ArithOp::Add if is_one(right) && left == dst => {
            let r = em.load(left);
            em.push(VmInstr::Inc(r));
            em.regs.seize(r, dst);
        }
        ArithOp::Add if is_one(left) && right == dst => {
            let r = em.load(right);
            em.push(VmInstr::Inc(r));
            em.regs.seize(r, dst);
        }
        ArithOp::Add if is_one(right) => {
            let r = em.inc_fresh(left);
            em.regs.seize(r, dst);
        }
        ArithOp::Add if is_one(left) => {
            let r = em.inc_fresh(right);
            em.regs.seize(r, dst);
        }
        ArithOp::Add if left == dst => {
            let rl = em.load(left);
            let rr = em.load(right);
            em.push(VmInstr::Add(rl, rr));
            em.regs.seize(rl, dst);
        }
        ArithOp::Add if right == dst => {
            let rr = em.load(right);
            let rl = em.load(left);
            em.push(VmInstr::Add(rr, rl));
            em.regs.seize(rr, dst);
        }
        ArithOp::Add => {
            let r = em.add_fresh(left, right);
            em.regs.seize(r, dst);
        }

        ArithOp::Sub if is_one(right) && left == dst => {
            let r = em.load(left);
            em.push(VmInstr::Dec(r));
            em.regs.seize(r, dst);
        }
        ArithOp::Sub if is_one(right) => {
            let r = em.dec_fresh(left);
            em.regs.seize(r, dst);
        }
        ArithOp::Sub if left == dst => {
            let rl = em.load(left);
            let rr = em.load(right);
            em.push(VmInstr::Sub(rl, rr));
            em.regs.seize(rl, dst);
        }
        ArithOp::Sub => {
            let r = em.sub_fresh(left, right);
            em.regs.seize(r, dst);
        }

        ArithOp::Mul if is_two(right) && left == dst => {
            let r = em.load(left);
            em.push(VmInstr::Add(r, r));
            em.regs.seize(r, dst);
        }
        ArithOp::Mul if is_two(left) && right == dst => {
            let r = em.load(right);
            em.push(VmInstr::Add(r, r));
            em.regs.seize(r, dst);
        }
        ArithOp::Mul => {
            let r = em.long_mul(left, right);
            em.regs.seize(r, dst);
        }

        ArithOp::Div if is_two(right) && left == dst => {
            let r = em.load(left);
            em.push(VmInstr::Half(r));
            em.regs.seize(r, dst);
        }
        ArithOp::Div => {
            let r = em.long_div(left, right);
            em.regs.seize(r, dst);
        }

        ArithOp::Rem if is_two(right) => {
            let r = em.rem2(left);
            em.regs.seize(r, dst);
        }
        ArithOp::Rem => {
            let r = em.long_rem(left, right);
            em.regs.seize(r, dst);
        }
    }
}
