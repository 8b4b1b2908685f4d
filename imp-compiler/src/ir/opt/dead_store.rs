//! Dead-store elimination.
//!
//! Drops moves and pure arithmetic whose destination has no next use —
//! typically the leftovers of constant propagation.  Side-effecting
//! instructions (`Get`, `Put`, array stores, branches, `Halt`) are never
//! touched: array cells may be observed by later loads and `Get` consumes
//! input.  Removals can expose further dead stores, so the pass iterates
//! with fresh liveness until stable.

use super::IrPass;
use crate::backend::liveness::{block_liveness, next_uses};
use crate::ir::{Instr, ProgramIr};

pub struct DeadStoreElim;

impl IrPass for DeadStoreElim {
    fn run(&mut self, program: &mut ProgramIr) {
        loop {
            let live = block_liveness(&program.blocks);
            let mut changed = false;
            for (bi, block) in program.blocks.iter_mut().enumerate() {
                let nu = next_uses(block, &live.live_out[bi]);
                let keep: Vec<bool> = block
                    .instrs
                    .iter()
                    .enumerate()
                    .map(|(i, ins)| match ins {
                        Instr::Move { dst, .. } | Instr::Binary { dst, .. } => {
                            !nu.is_dead_after(i, dst)
                        }
                        _ => true,
                    })
                    .collect();
                if keep.contains(&false) {
                    let mut flags = keep.into_iter();
                    block.instrs.retain(|_| flags.next().unwrap());
                    changed = true;
                }
            }
            if !changed {
                return;
            }
        }
    }
}
