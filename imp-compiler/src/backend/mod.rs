pub mod asm;
pub mod codegen;
pub mod dataflow;
pub mod instruction;
pub mod liveness;
pub mod macros;
pub mod opt;
pub mod regalloc;

use crate::diagnostics::Diagnostics;
use crate::ir::ProgramIr;

/// Lower the optimized IR to final assembly text.
pub fn compile_ir(program: &ProgramIr, diags: &mut Diagnostics, debug: bool) -> String {
    let items = codegen::generate(program, diags);
    asm::AsmProgram::new(items).render(debug)
}
