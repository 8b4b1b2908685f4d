//! Liveness analysis over basic blocks, plus the intra-block next-use table
//! consumed by dead-store elimination and the register allocator.
//!
//! Liveness is backward all-paths dataflow iterated to a fixpoint.  Only
//! variables and temporaries are tracked; constants carry no lifetime.

use crate::ir::{BasicBlock, Instr, Operand};
use std::collections::{HashMap, HashSet};

pub struct Liveness {
    /// Operands live at each block's entry.
    pub live_in: Vec<HashSet<Operand>>,
    /// Operands live at each block's exit.
    pub live_out: Vec<HashSet<Operand>>,
}

fn tracked(op: &Operand) -> bool {
    !matches!(op, Operand::Const(_))
}

/// Compute per-block liveness for the whole program.
pub fn block_liveness(blocks: &[BasicBlock]) -> Liveness {
    let n = blocks.len();

    // gen: used before any kill in the block; kill: defined in the block.
    let mut gen_sets: Vec<HashSet<Operand>> = vec![HashSet::new(); n];
    let mut kill_sets: Vec<HashSet<Operand>> = vec![HashSet::new(); n];
    for (bi, block) in blocks.iter().enumerate() {
        for ins in &block.instrs {
            for u in ins.uses() {
                if tracked(u) && !kill_sets[bi].contains(u) {
                    gen_sets[bi].insert(u.clone());
                }
            }
            if let Some(d) = ins.defined() {
                kill_sets[bi].insert(d.clone());
            }
        }
    }

    let mut live_in: Vec<HashSet<Operand>> = vec![HashSet::new(); n];
    let mut live_out: Vec<HashSet<Operand>> = vec![HashSet::new(); n];
    let mut changed = true;
    while changed {
        changed = false;
        for bi in (0..n).rev() {
            let mut new_out = HashSet::new();
            for succ in blocks[bi].successors() {
                for op in &live_in[succ.0] {
                    new_out.insert(op.clone());
                }
            }
            let mut new_in = gen_sets[bi].clone();
            for op in &new_out {
                if !kill_sets[bi].contains(op) {
                    new_in.insert(op.clone());
                }
            }
            if new_in != live_in[bi] || new_out != live_out[bi] {
                live_in[bi] = new_in;
                live_out[bi] = new_out;
                changed = true;
            }
        }
    }

    Liveness { live_in, live_out }
}

// ── Intra-block next use ────────────────────────────────────────────────

/// Status of an operand at a program point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextUse {
    Dead,
    /// Live; the payload is the index of the next instruction that reads the
    /// operand.  Operands live past the block carry the terminator's index.
    Live(usize),
}

/// Per-instruction next-use information for one block.
///
/// `after(i, op)` describes the operand's status immediately *after*
/// instruction `i` executes.
pub struct BlockNextUse {
    after: Vec<HashMap<Operand, usize>>,
}

impl BlockNextUse {
    pub fn after(&self, idx: usize, op: &Operand) -> NextUse {
        match self.after.get(idx).and_then(|m| m.get(op)) {
            Some(&i) => NextUse::Live(i),
            None => NextUse::Dead,
        }
    }

    pub fn is_dead_after(&self, idx: usize, op: &Operand) -> bool {
        self.after(idx, op) == NextUse::Dead
    }
}

/// Backward scan: operands in `live_out` start live past the block; a
/// definition makes the operand dead above it, a use makes it live with the
/// use site as the next-use point.
pub fn next_uses(block: &BasicBlock, live_out: &HashSet<Operand>) -> BlockNextUse {
    let n = block.instrs.len();
    let mut state: HashMap<Operand, usize> = HashMap::new();
    for op in live_out {
        state.insert(op.clone(), n.saturating_sub(1));
    }

    let mut after = vec![HashMap::new(); n];
    for i in (0..n).rev() {
        after[i] = state.clone();
        let ins = &block.instrs[i];
        if let Some(d) = ins.defined() {
            state.remove(d);
        }
        for u in ins.uses() {
            if tracked(u) {
                state.insert(u.clone(), i);
            }
        }
    }
    BlockNextUse { after }
}
