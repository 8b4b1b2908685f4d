use anyhow::{Context, Result};
use clap::Parser;
use imp_compiler::{compile, CompileError};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "compiler")]
#[command(about = "Compile an Imp program to register-machine assembly")]
struct Args {
    /// Path to the source file to compile
    source: PathBuf,

    /// Path of the assembly file to write
    output: PathBuf,

    /// Annotate the output with label markers and inline comments
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let src = fs::read_to_string(&args.source)
        .with_context(|| format!("failed to read '{}'", args.source.display()))?;
    let source_name = args.source.display().to_string();

    match compile(&src, args.debug) {
        Ok(out) => {
            for w in &out.warnings {
                println!("{}", w.render(&source_name));
            }
            fs::write(&args.output, out.assembly)
                .with_context(|| format!("failed to write '{}'", args.output.display()))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(CompileError::Rejected { diagnostics }) => {
            for d in &diagnostics {
                println!("{}", d.render(&source_name));
            }
            Ok(ExitCode::from(1))
        }
    }
}
