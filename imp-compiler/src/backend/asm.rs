//! Final assembly: label resolution and text rendering.
//!
//! Labels name instruction indices; several labels may land on the same
//! index.  A label with no following instruction resolves to one past the
//! last index (only reachable by a jump after `HALT`, which codegen never
//! emits, but the table stays total either way).

use super::instruction::{AsmItem, VmInstr};
use std::collections::HashMap;

pub struct AsmProgram {
    items: Vec<AsmItem>,
}

impl AsmProgram {
    pub fn new(items: Vec<AsmItem>) -> Self {
        Self { items }
    }

    /// Map every label to the index of the next instruction.
    fn label_table(&self) -> HashMap<String, usize> {
        let mut table = HashMap::new();
        let mut index = 0usize;
        for item in &self.items {
            match item {
                AsmItem::Label(name) => {
                    table.insert(name.clone(), index);
                }
                AsmItem::Instr { .. } => index += 1,
            }
        }
        table
    }

    /// Render the program, one instruction per line, jumps resolved to
    /// numeric indices.  With `debug`, label positions become `# name:`
    /// comment lines and instruction comments are appended inline.
    pub fn render(&self, debug: bool) -> String {
        let table = self.label_table();
        let resolve = |name: &str| -> usize {
            *table
                .get(name)
                .unwrap_or_else(|| panic!("unresolved label '{}'", name))
        };

        let mut out = String::new();
        for item in &self.items {
            match item {
                AsmItem::Label(name) => {
                    if debug {
                        out.push_str(&format!("# {}:\n", name));
                    }
                }
                AsmItem::Instr { instr, comment } => {
                    out.push_str(&instr.render(&resolve));
                    if debug {
                        if let Some(c) = comment {
                            out.push_str(&format!("  # {}", c));
                        }
                    }
                    out.push('\n');
                }
            }
        }
        out
    }

    pub fn items(&self) -> &[AsmItem] {
        &self.items
    }
}
