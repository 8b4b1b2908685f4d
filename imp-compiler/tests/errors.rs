//! Semantic and syntax error detection through the public interface.

use imp_compiler::diagnostics::DiagnosticKind;
use imp_compiler::{compile_to_ir, CompileError};

fn assert_rejected(source: &str, expected: DiagnosticKind) {
    match compile_to_ir(source) {
        Ok(_) => panic!("expected {:?}, but compilation succeeded", expected),
        Err(err @ CompileError::Rejected { .. }) => {
            assert!(
                err.diagnostics().iter().any(|d| d.kind == expected),
                "expected {:?}, got: {:?}",
                expected,
                err.diagnostics()
            );
        }
    }
}

#[test]
fn undeclared_variable() {
    assert_rejected("BEGIN x := 1; END", DiagnosticKind::Undeclared);
}

#[test]
fn undeclared_array() {
    assert_rejected("DECLARE a BEGIN a := t(2); END", DiagnosticKind::Undeclared);
}

#[test]
fn double_declaration() {
    assert_rejected("DECLARE a, a BEGIN a := 1; END", DiagnosticKind::Redeclared);
}

#[test]
fn variable_and_array_share_a_name() {
    assert_rejected(
        "DECLARE a, a(0:3) BEGIN a := 1; END",
        DiagnosticKind::Redeclared,
    );
}

#[test]
fn bad_array_bounds() {
    assert_rejected(
        "DECLARE t(10:4) BEGIN t(5) := 1; END",
        DiagnosticKind::BadArrayBounds,
    );
}

#[test]
fn assignment_to_iterator() {
    assert_rejected(
        "BEGIN FOR i FROM 1 TO 5 DO i := 2; ENDFOR END",
        DiagnosticKind::IteratorAssignment,
    );
}

#[test]
fn read_into_iterator() {
    assert_rejected(
        "BEGIN FOR i FROM 1 TO 5 DO READ i; ENDFOR END",
        DiagnosticKind::IteratorAssignment,
    );
}

#[test]
fn literal_out_of_64_bit_range() {
    assert_rejected(
        "DECLARE a BEGIN a := 18446744073709551616; END",
        DiagnosticKind::LiteralRange,
    );
}

#[test]
fn scalar_indexed_like_an_array() {
    assert_rejected(
        "DECLARE a, b BEGIN b := 1; a := b(0); END",
        DiagnosticKind::NotAnArray,
    );
}

#[test]
fn array_used_as_a_scalar() {
    assert_rejected(
        "DECLARE t(0:3) BEGIN t := 5; END",
        DiagnosticKind::NotAVariable,
    );
}

#[test]
fn syntax_error_is_reported() {
    assert_rejected("BEGIN a := ; END", DiagnosticKind::Syntax);
}

// ── Error positions and accumulation ─────────────────────────────────────

#[test]
fn error_location_is_line_accurate() {
    let source = "DECLARE a\nBEGIN\na := 1;\nx := 2;\nEND";
    let Err(err) = compile_to_ir(source) else {
        panic!("expected a semantic error");
    };
    let d = &err.diagnostics()[0];
    assert_eq!(d.kind, DiagnosticKind::Undeclared);
    assert_eq!(d.line, 4, "error should point at line 4: {:?}", d);
    assert!(d.col >= 1);
}

#[test]
fn several_errors_accumulate_in_one_run() {
    let source = "DECLARE a BEGIN x := 1; y := 2; t(0) := 3; END";
    let Err(err) = compile_to_ir(source) else {
        panic!("expected semantic errors");
    };
    assert!(
        err.diagnostics().len() >= 3,
        "one run should report every error: {:?}",
        err.diagnostics()
    );
}

#[test]
fn valid_program_is_accepted() {
    let ir = compile_to_ir("DECLARE a BEGIN READ a; WRITE a; END").expect("should compile");
    assert!(!ir.blocks.is_empty());
}
