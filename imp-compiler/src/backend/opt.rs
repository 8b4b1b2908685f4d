//! Assembly-level cleanup passes.
//!
//! Each pass implements [`AsmPass`] and operates on the structured item list
//! before label resolution, so removing an instruction cannot break a jump.

use super::instruction::{AsmItem, VmInstr};

/// A single cleanup pass over assembly output.
pub trait AsmPass {
    fn run(&self, items: &mut Vec<AsmItem>);
}

struct PassManager {
    passes: Vec<Box<dyn AsmPass>>,
}

impl PassManager {
    fn new() -> Self {
        Self { passes: Vec::new() }
    }

    fn add(&mut self, pass: Box<dyn AsmPass>) {
        self.passes.push(pass);
    }

    fn run_all(&self, items: &mut Vec<AsmItem>) {
        for pass in &self.passes {
            pass.run(items);
        }
    }
}

// ============================================================================
// Redundant copies
// ============================================================================

/// Removes `COPY r r`, which can fall out of move lowering when source and
/// destination land in the same register.
struct RedundantCopies;

impl AsmPass for RedundantCopies {
    fn run(&self, items: &mut Vec<AsmItem>) {
        items.retain(|item| {
            !matches!(
                item,
                AsmItem::Instr {
                    instr: VmInstr::Copy(r, s),
                    ..
                } if r == s
            )
        });
    }
}

// ============================================================================
// Fallthrough jumps
// ============================================================================

/// Removes `JUMP L` when `L` labels the very next instruction (possibly
/// through a run of consecutive labels).
struct FallthroughJumps;

impl AsmPass for FallthroughJumps {
    fn run(&self, items: &mut Vec<AsmItem>) {
        let mut i = 0;
        while i < items.len() {
            let remove = match &items[i] {
                AsmItem::Instr {
                    instr: VmInstr::Jump(target),
                    ..
                } => items[i + 1..]
                    .iter()
                    .map_while(|it| it.as_label())
                    .any(|l| l == target.as_str()),
                _ => false,
            };
            if remove {
                items.remove(i);
            } else {
                i += 1;
            }
        }
    }
}

/// Run all cleanup passes on the assembly output.
pub fn optimize(items: &mut Vec<AsmItem>) {
    let mut pm = PassManager::new();
    pm.add(Box::new(RedundantCopies));
    pm.add(Box::new(FallthroughJumps));
    pm.run_all(items);
}
