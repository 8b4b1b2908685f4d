//! IR optimization passes.
//!
//! Passes implement [`IrPass`] and run in a fixed order through the
//! [`PassManager`]; each pass leaves the control-flow graph well formed.

use crate::ir::ProgramIr;

pub mod dead_store;
pub mod fold;
pub mod promote;

/// A single optimization pass over the program IR.
pub trait IrPass {
    fn run(&mut self, program: &mut ProgramIr);
}

/// Manages and executes a sequence of IR passes.
pub struct PassManager {
    passes: Vec<Box<dyn IrPass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn add_pass(&mut self, pass: Box<dyn IrPass>) {
        self.passes.push(pass);
    }

    pub fn run_passes(&mut self, program: &mut ProgramIr) {
        for pass in &mut self.passes {
            pass.run(program);
        }
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

pub fn optimize(program: &mut ProgramIr) {
    let mut pm = PassManager::new();
    pm.add_pass(Box::new(promote::PromoteArrays));
    pm.add_pass(Box::new(fold::ConstantFolder));
    pm.add_pass(Box::new(dead_store::DeadStoreElim));
    pm.run_passes(program);
}
