pub mod backend;
pub mod diagnostics;
pub mod frontend;
pub mod ir;

use diagnostics::{Diagnostic, Diagnostics, Severity};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error(
        "compilation failed with {} error(s)",
        .diagnostics.iter().filter(|d| d.severity == Severity::Error).count()
    )]
    Rejected { diagnostics: Vec<Diagnostic> },
}

impl CompileError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Rejected { diagnostics } => diagnostics,
        }
    }
}

/// Successful compilation: the assembly text plus any warnings collected
/// along the way (currently only uninitialized-use reports).
pub struct Compiled {
    pub assembly: String,
    pub warnings: Vec<Diagnostic>,
}

/// Parse, check and lower to optimized IR.  The diagnostic sink is validated
/// after parsing and after lowering; any recorded error aborts the phase.
fn build_ir(source: &str, diags: &mut Diagnostics) -> Option<ir::ProgramIr> {
    let ast = frontend::parser::parse(source, diags)?;
    if diags.has_errors() {
        return None;
    }
    let mut program = ir::lower::lower(&ast, diags);
    if diags.has_errors() {
        return None;
    }
    ir::opt::optimize(&mut program);
    Some(program)
}

/// Compile source text to optimized IR.
pub fn compile_to_ir(source: &str) -> Result<ir::ProgramIr, CompileError> {
    let mut diags = Diagnostics::new();
    match build_ir(source, &mut diags) {
        Some(program) => Ok(program),
        None => Err(CompileError::Rejected {
            diagnostics: diags.into_entries(),
        }),
    }
}

/// Compile source text all the way to register-machine assembly.
pub fn compile(source: &str, debug: bool) -> Result<Compiled, CompileError> {
    let mut diags = Diagnostics::new();
    let Some(program) = build_ir(source, &mut diags) else {
        return Err(CompileError::Rejected {
            diagnostics: diags.into_entries(),
        });
    };
    let assembly = backend::compile_ir(&program, &mut diags, debug);
    Ok(Compiled {
        assembly,
        warnings: diags.warnings(),
    })
}
