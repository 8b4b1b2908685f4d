//! Forward dataflow analyses over the block graph: predecessors, dominators
//! and reaching definitions.
//!
//! All three scan blocks in input order until a fixpoint; results are
//! returned as immutable per-block tables.  `BTreeSet` keeps iteration over
//! the results deterministic.

use crate::ir::{BasicBlock, BlockId, Operand};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed control-flow graph: block '{block}' does not end in a terminator")]
pub struct MalformedCfg {
    pub block: String,
}

/// For each block, the set of blocks whose terminator targets it.
pub fn predecessors(blocks: &[BasicBlock]) -> Result<Vec<BTreeSet<BlockId>>, MalformedCfg> {
    let mut preds = vec![BTreeSet::new(); blocks.len()];
    for (bi, block) in blocks.iter().enumerate() {
        let term = block.terminator().ok_or_else(|| MalformedCfg {
            block: block.label.clone(),
        })?;
        for succ in term.successors() {
            preds[succ.0].insert(BlockId(bi));
        }
    }
    Ok(preds)
}

/// Iterative dominator computation.  `dom(entry) = {entry}`; every other
/// block starts with the full set and shrinks until stable.
pub fn dominators(blocks: &[BasicBlock], preds: &[BTreeSet<BlockId>]) -> Vec<BTreeSet<BlockId>> {
    let all: BTreeSet<BlockId> = (0..blocks.len()).map(BlockId).collect();
    let mut dom: Vec<BTreeSet<BlockId>> = vec![all; blocks.len()];
    if blocks.is_empty() {
        return dom;
    }
    dom[0] = BTreeSet::from([BlockId(0)]);

    let mut changed = true;
    while changed {
        changed = false;
        for bi in 1..blocks.len() {
            if preds[bi].is_empty() {
                continue;
            }
            let mut next: Option<BTreeSet<BlockId>> = None;
            for p in &preds[bi] {
                next = Some(match next {
                    None => dom[p.0].clone(),
                    Some(acc) => acc.intersection(&dom[p.0]).copied().collect(),
                });
            }
            let mut next = next.unwrap();
            next.insert(BlockId(bi));
            if next != dom[bi] {
                dom[bi] = next;
                changed = true;
            }
        }
    }
    dom
}

/// A definition site: block index and instruction index within the block.
pub type DefSite = (BlockId, usize);

/// Reaching-definition sets at block entry and exit.
pub struct ReachingDefs {
    pub entry: Vec<BTreeSet<DefSite>>,
    pub exit: Vec<BTreeSet<DefSite>>,
}

/// Forward all-paths reaching definitions.  A definition is killed by any
/// later definition of the same operand.
pub fn reaching_definitions(blocks: &[BasicBlock], preds: &[BTreeSet<BlockId>]) -> ReachingDefs {
    // All definition sites per operand, for the kill sets.
    let mut defs_of: HashMap<Operand, BTreeSet<DefSite>> = HashMap::new();
    for (bi, block) in blocks.iter().enumerate() {
        for (i, ins) in block.instrs.iter().enumerate() {
            if let Some(d) = ins.defined() {
                defs_of.entry(d.clone()).or_default().insert((BlockId(bi), i));
            }
        }
    }

    // Per-block gen (downstream-visible defs) and kill sets.
    let mut gen_sets: Vec<BTreeSet<DefSite>> = vec![BTreeSet::new(); blocks.len()];
    let mut kill_sets: Vec<BTreeSet<DefSite>> = vec![BTreeSet::new(); blocks.len()];
    for (bi, block) in blocks.iter().enumerate() {
        let mut last_def: HashMap<&Operand, usize> = HashMap::new();
        for (i, ins) in block.instrs.iter().enumerate() {
            if let Some(d) = ins.defined() {
                last_def.insert(d, i);
            }
        }
        for (op, i) in last_def {
            gen_sets[bi].insert((BlockId(bi), i));
            kill_sets[bi].extend(defs_of[op].iter().copied());
        }
    }

    let mut entry: Vec<BTreeSet<DefSite>> = vec![BTreeSet::new(); blocks.len()];
    let mut exit: Vec<BTreeSet<DefSite>> = vec![BTreeSet::new(); blocks.len()];
    let mut changed = true;
    while changed {
        changed = false;
        for bi in 0..blocks.len() {
            let mut new_entry = BTreeSet::new();
            for p in &preds[bi] {
                new_entry.extend(exit[p.0].iter().copied());
            }
            let mut new_exit = gen_sets[bi].clone();
            for site in new_entry.difference(&kill_sets[bi]) {
                new_exit.insert(*site);
            }
            if new_entry != entry[bi] || new_exit != exit[bi] {
                entry[bi] = new_entry;
                exit[bi] = new_exit;
                changed = true;
            }
        }
    }

    ReachingDefs { entry, exit }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithOp, Instr, RelOp};

    /// Diamond with a back edge:
    ///
    /// ```text
    ///   0 → 1 → {2, 3};  2 → 4;  3 → 4;  4 → {1, 5};  5: halt
    /// ```
    fn diamond_loop() -> Vec<BasicBlock> {
        let jump = |t: usize| Instr::Jump { target: BlockId(t) };
        let branch = |t: usize, f: usize| Instr::Branch {
            op: RelOp::Lt,
            left: Operand::Temp(0),
            right: Operand::imm(10),
            if_true: BlockId(t),
            if_false: BlockId(f),
        };
        let mut blocks: Vec<BasicBlock> = (0..6)
            .map(|i| BasicBlock::new(format!("L{i}")))
            .collect();
        blocks[0].instrs.push(Instr::Move {
            src: Operand::imm(0),
            dst: Operand::Temp(0),
        });
        blocks[0].instrs.push(jump(1));
        blocks[1].instrs.push(branch(2, 3));
        blocks[2].instrs.push(jump(4));
        blocks[3].instrs.push(jump(4));
        blocks[4].instrs.push(branch(1, 5));
        blocks[5].instrs.push(Instr::Halt);
        blocks
    }

    #[test]
    fn predecessor_sets() {
        let blocks = diamond_loop();
        let preds = predecessors(&blocks).unwrap();
        assert_eq!(preds[0], BTreeSet::new());
        assert_eq!(preds[1], BTreeSet::from([BlockId(0), BlockId(4)]));
        assert_eq!(preds[4], BTreeSet::from([BlockId(2), BlockId(3)]));
        assert_eq!(preds[5], BTreeSet::from([BlockId(4)]));
    }

    #[test]
    fn missing_terminator_is_detected() {
        let mut blocks = diamond_loop();
        blocks[2].instrs.pop();
        blocks[2].instrs.push(Instr::Move {
            src: Operand::imm(1),
            dst: Operand::Temp(9),
        });
        assert!(predecessors(&blocks).is_err());
    }

    #[test]
    fn dominator_properties() {
        let blocks = diamond_loop();
        let preds = predecessors(&blocks).unwrap();
        let dom = dominators(&blocks, &preds);

        for (bi, d) in dom.iter().enumerate() {
            // Entry dominates everything; every block dominates itself.
            assert!(d.contains(&BlockId(0)), "entry missing from dom({bi})");
            assert!(d.contains(&BlockId(bi)), "block missing from its own dom set");
        }
        // Neither arm of the diamond dominates the join.
        assert!(!dom[4].contains(&BlockId(2)));
        assert!(!dom[4].contains(&BlockId(3)));
        // The loop header dominates the join.
        assert!(dom[4].contains(&BlockId(1)));
        // A block with a unique predecessor extends that predecessor's set.
        let mut expected = dom[4].clone();
        expected.insert(BlockId(5));
        assert_eq!(dom[5], expected);
    }

    #[test]
    fn reaching_defs_are_killed_by_redefinitions() {
        // L0: t0 = 0; goto L1.  L1: t0 reachable only from the single def.
        let mut blocks = vec![BasicBlock::new("L0"), BasicBlock::new("L1")];
        blocks[0].instrs.push(Instr::Move {
            src: Operand::imm(0),
            dst: Operand::Temp(0),
        });
        blocks[0].instrs.push(Instr::Binary {
            op: ArithOp::Add,
            left: Operand::Temp(0),
            right: Operand::imm(1),
            dst: Operand::Temp(0),
        });
        blocks[0].instrs.push(Instr::Jump { target: BlockId(1) });
        blocks[1].instrs.push(Instr::Halt);

        let preds = predecessors(&blocks).unwrap();
        let rd = reaching_definitions(&blocks, &preds);
        // Only the second definition of t0 reaches L1.
        assert_eq!(rd.entry[1], BTreeSet::from([(BlockId(0), 1)]));
    }

    #[test]
    fn reaching_defs_merge_over_branches() {
        let blocks = diamond_loop();
        let preds = predecessors(&blocks).unwrap();
        let rd = reaching_definitions(&blocks, &preds);
        // The single def of t0 in block 0 flows everywhere.
        for bi in 1..blocks.len() {
            assert!(
                rd.entry[bi].contains(&(BlockId(0), 0)),
                "def missing at block {bi}"
            );
        }
    }
}
