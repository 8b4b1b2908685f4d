//! Array-to-scalar promotion.
//!
//! An array whose every access uses a literal offset is really a fixed bank
//! of scalars; rewriting the accesses into plain moves lets later passes see
//! through them and spares the run-time address arithmetic.  A single
//! non-literal offset disqualifies the whole array.

use super::IrPass;
use crate::ir::{Instr, Operand, ProgramIr, SymId, Symbol};
use num_bigint::BigInt;
use std::collections::{HashMap, HashSet};

pub struct PromoteArrays;

impl IrPass for PromoteArrays {
    fn run(&mut self, program: &mut ProgramIr) {
        let mut blocked: HashSet<SymId> = HashSet::new();
        for block in &program.blocks {
            for ins in &block.instrs {
                match ins {
                    Instr::Load { base, index, .. } | Instr::Store { base, index, .. } => {
                        if index.as_const().is_none() {
                            blocked.insert(*base);
                        }
                    }
                    _ => {}
                }
            }
        }

        // Scalar slot per (array, literal offset); names follow the source
        // array so dumps stay readable.
        let mut slots: HashMap<(SymId, BigInt), SymId> = HashMap::new();
        let mut slot_for = |symbols: &mut crate::ir::SymbolTable, base: SymId, off: &BigInt| {
            *slots.entry((base, off.clone())).or_insert_with(|| {
                let arr = symbols.get(base);
                let (line, col) = (arr.line, arr.col);
                let name = format!("{}#{}", arr.name, off);
                symbols.insert_internal(Symbol::variable(name, line, col))
            })
        };

        for block in &mut program.blocks {
            for ins in &mut block.instrs {
                let replacement = match &*ins {
                    Instr::Load { base, index, dst } if !blocked.contains(base) => {
                        let off = index.as_const().expect("unblocked access has a literal offset");
                        let slot = slot_for(&mut program.symbols, *base, off);
                        Some(Instr::Move {
                            src: Operand::Name(slot),
                            dst: dst.clone(),
                        })
                    }
                    Instr::Store { src, base, index } if !blocked.contains(base) => {
                        let off = index.as_const().expect("unblocked access has a literal offset");
                        let slot = slot_for(&mut program.symbols, *base, off);
                        Some(Instr::Move {
                            src: src.clone(),
                            dst: Operand::Name(slot),
                        })
                    }
                    _ => None,
                };
                if let Some(new_ins) = replacement {
                    *ins = new_ins;
                }
            }
        }
    }
}
