//! Constant propagation and folding, iterated to a fixpoint.
//!
//! Each round recomputes reaching definitions, seeds every block's constant
//! map from definitions that reach its entry, then walks the block forward
//! substituting known values, folding literal arithmetic with the machine's
//! saturating semantics and collapsing decided branches.  Rounds repeat until
//! a full pass changes nothing.
//!
//! `x + 1`, `x - 1`, `x * 2`, `x / 2` and `x % 2` survive folding untouched
//! so instruction selection can use the cheap INC/DEC/HALF idioms.

use super::IrPass;
use crate::backend::dataflow::{predecessors, reaching_definitions, DefSite};
use crate::ir::{ArithOp, BasicBlock, BlockId, Instr, Operand, ProgramIr, RelOp, SymId};
use num_bigint::BigInt;
use num_traits::{One, Zero};
use std::collections::{BTreeSet, HashMap};

pub struct ConstantFolder;

impl IrPass for ConstantFolder {
    fn run(&mut self, program: &mut ProgramIr) {
        while fold_round(program) {}
    }
}

/// Arithmetic over ℕ: subtraction clamps at zero, division and remainder by
/// zero yield zero.  The run-time macros implement the same rules, so folded
/// and unfolded programs agree.
pub fn eval_arith(op: ArithOp, l: &BigInt, r: &BigInt) -> BigInt {
    match op {
        ArithOp::Add => l + r,
        ArithOp::Sub => {
            if l >= r {
                l - r
            } else {
                BigInt::zero()
            }
        }
        ArithOp::Mul => l * r,
        ArithOp::Div => {
            if r.is_zero() {
                BigInt::zero()
            } else {
                l / r
            }
        }
        ArithOp::Rem => {
            if r.is_zero() {
                BigInt::zero()
            } else {
                l % r
            }
        }
    }
}

pub fn eval_rel(op: RelOp, l: &BigInt, r: &BigInt) -> bool {
    match op {
        RelOp::Eq => l == r,
        RelOp::Ne => l != r,
        RelOp::Lt => l < r,
        RelOp::Gt => l > r,
        RelOp::Le => l <= r,
        RelOp::Ge => l >= r,
    }
}

fn fold_round(program: &mut ProgramIr) -> bool {
    let preds = predecessors(&program.blocks).expect("malformed control-flow graph");
    let rd = reaching_definitions(&program.blocks, &preds);
    let mut changed = false;

    for bi in 0..program.blocks.len() {
        let seeds = seed_constants(&program.blocks, &rd.entry[bi]);
        changed |= fold_block(&mut program.blocks[bi], seeds);
    }
    changed
}

/// Constants established on every path into a block: an operand whose
/// reaching definitions are all `Move` of the same literal.
fn seed_constants(
    blocks: &[BasicBlock],
    reaching: &BTreeSet<DefSite>,
) -> HashMap<Operand, BigInt> {
    let mut candidates: HashMap<Operand, Option<BigInt>> = HashMap::new();
    for &(BlockId(b), i) in reaching {
        let ins = &blocks[b].instrs[i];
        let Some(dst) = ins.defined() else { continue };
        let value = match ins {
            Instr::Move {
                src: Operand::Const(c),
                ..
            } => Some(c.clone()),
            _ => None,
        };
        candidates
            .entry(dst.clone())
            .and_modify(|agreed| {
                if *agreed != value {
                    *agreed = None;
                }
            })
            .or_insert(value);
    }
    candidates
        .into_iter()
        .filter_map(|(op, v)| v.map(|c| (op, c)))
        .collect()
}

fn subst(op: &mut Operand, known: &HashMap<Operand, BigInt>, changed: &mut bool) {
    if matches!(op, Operand::Const(_)) {
        return;
    }
    if let Some(c) = known.get(op) {
        *op = Operand::Const(c.clone());
        *changed = true;
    }
}

fn fold_block(block: &mut BasicBlock, seeds: HashMap<Operand, BigInt>) -> bool {
    let mut changed = false;
    let mut known = seeds;
    // Array cells keyed by (base, literal offset); `None` poisons a cell
    // whose last literal-offset store was not a literal value.
    let mut slots: HashMap<(SymId, BigInt), Option<BigInt>> = HashMap::new();

    for ins in &mut block.instrs {
        // Substitute known values into every operand read.
        match ins {
            Instr::Move { src, .. } | Instr::Put { src } => subst(src, &known, &mut changed),
            Instr::Load { index, .. } => subst(index, &known, &mut changed),
            Instr::Store { src, index, .. } => {
                subst(src, &known, &mut changed);
                subst(index, &known, &mut changed);
            }
            Instr::Binary { left, right, .. } => {
                subst(left, &known, &mut changed);
                subst(right, &known, &mut changed);
            }
            Instr::Branch { left, right, .. } => {
                subst(left, &known, &mut changed);
                subst(right, &known, &mut changed);
            }
            Instr::Get { .. } | Instr::Jump { .. } | Instr::Halt => {}
        }

        // Fold what became decidable.
        let replacement = match &*ins {
            Instr::Binary {
                op,
                left,
                right,
                dst,
            } => fold_binary(*op, left, right, dst),
            Instr::Branch {
                op,
                left,
                right,
                if_true,
                if_false,
            } => match (left.as_const(), right.as_const()) {
                (Some(l), Some(r)) => {
                    let target = if eval_rel(*op, l, r) { *if_true } else { *if_false };
                    Some(Instr::Jump { target })
                }
                _ => None,
            },
            Instr::Load { base, index, dst } => match index.as_const() {
                Some(off) => match slots.get(&(*base, off.clone())) {
                    Some(Some(value)) => Some(Instr::Move {
                        src: Operand::Const(value.clone()),
                        dst: dst.clone(),
                    }),
                    _ => None,
                },
                None => None,
            },
            _ => None,
        };
        if let Some(new_ins) = replacement {
            *ins = new_ins;
            changed = true;
        }

        // Maintain the running maps.
        match &*ins {
            Instr::Move {
                src: Operand::Const(c),
                dst,
            } => {
                known.insert(dst.clone(), c.clone());
            }
            Instr::Move { dst, .. } => {
                known.remove(dst);
            }
            Instr::Get { dst } | Instr::Load { dst, .. } | Instr::Binary { dst, .. } => {
                known.remove(dst);
            }
            Instr::Store { src, base, index } => match index.as_const() {
                Some(off) => {
                    slots.insert((*base, off.clone()), src.as_const().cloned());
                }
                None => {
                    let base = *base;
                    slots.retain(|(b, _), _| *b != base);
                }
            },
            Instr::Put { .. } | Instr::Jump { .. } | Instr::Branch { .. } | Instr::Halt => {}
        }
    }
    changed
}

fn fold_binary(op: ArithOp, left: &Operand, right: &Operand, dst: &Operand) -> Option<Instr> {
    let mv = |src: Operand| {
        Some(Instr::Move {
            src,
            dst: dst.clone(),
        })
    };
    let zero = || mv(Operand::Const(BigInt::zero()));

    if let (Some(l), Some(r)) = (left.as_const(), right.as_const()) {
        return mv(Operand::Const(eval_arith(op, l, r)));
    }

    let l_const = left.as_const();
    let r_const = right.as_const();
    let l_zero = l_const.is_some_and(|c| c.is_zero());
    let r_zero = r_const.is_some_and(|c| c.is_zero());
    let l_one = l_const.is_some_and(|c| c.is_one());
    let r_one = r_const.is_some_and(|c| c.is_one());

    match op {
        // `x + 1` is deliberately not rewritten: INC handles it.
        ArithOp::Add if l_zero => mv(right.clone()),
        ArithOp::Add if r_zero => mv(left.clone()),
        ArithOp::Sub if r_zero => mv(left.clone()),
        ArithOp::Sub if l_zero => zero(),
        ArithOp::Mul if l_zero || r_zero => zero(),
        ArithOp::Mul if l_one => mv(right.clone()),
        ArithOp::Mul if r_one => mv(left.clone()),
        ArithOp::Div if r_zero || l_zero => zero(),
        ArithOp::Div if r_one => mv(left.clone()),
        ArithOp::Rem if r_zero || l_zero || r_one => zero(),
        _ => None,
    }
}
