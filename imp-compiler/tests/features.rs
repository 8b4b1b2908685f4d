//! End-to-end behavior: compile a source program and run the emitted
//! assembly on the reference machine.

mod common;

use common::run;
use imp_compiler::ir::Instr;
use imp_compiler::{compile, compile_to_ir};

fn run_program(source: &str, input: &[u64]) -> Vec<String> {
    let out = compile(source, false).expect("compilation failed");
    run(&out.assembly, input)
}

// ── Constant arithmetic and saturation ───────────────────────────────────

#[test]
fn constant_arithmetic() {
    let out = run_program("DECLARE a BEGIN a := 2 + 3; WRITE a; END", &[]);
    assert_eq!(out, vec!["5"]);
}

#[test]
fn saturating_subtraction() {
    let out = run_program(
        "DECLARE a, b, c BEGIN a := 3; b := 5; c := a - b; WRITE c; END",
        &[],
    );
    assert_eq!(out, vec!["0"]);
}

#[test]
fn division_by_zero_yields_zero() {
    let out = run_program(
        "DECLARE a, b, c BEGIN a := 10; b := 0; c := a / b; WRITE c; WRITE a % b; END",
        &[],
    );
    assert_eq!(out, vec!["0", "0"]);
}

#[test]
fn runtime_saturation_matches_folding() {
    // Same computations with run-time operands: the macros must agree with
    // the constant folder.
    let out = run_program(
        "DECLARE a, b BEGIN READ a; READ b; \
         WRITE a - b; WRITE a / b; WRITE a % b; END",
        &[3, 5],
    );
    assert_eq!(out, vec!["0", "0", "3"]);

    let out = run_program(
        "DECLARE a, b BEGIN READ a; READ b; \
         WRITE a - b; WRITE a / b; WRITE a % b; END",
        &[17, 0],
    );
    assert_eq!(out, vec!["17", "0", "0"]);
}

// ── Arithmetic macros ────────────────────────────────────────────────────

#[test]
fn multiplication_division_remainder() {
    let src = "DECLARE a, b BEGIN READ a; READ b; \
               WRITE a * b; WRITE a / b; WRITE a % b; END";
    assert_eq!(run_program(src, &[123, 4]), vec!["492", "30", "3"]);
    assert_eq!(run_program(src, &[7, 123]), vec!["861", "0", "7"]);
    assert_eq!(run_program(src, &[0, 9]), vec!["0", "0", "0"]);
    assert_eq!(run_program(src, &[1000000, 999]), vec!["999000000", "1001", "1"]);
}

#[test]
fn power_of_two_idioms_compute_correctly() {
    let src = "DECLARE x BEGIN READ x; \
               x := x * 2; WRITE x; x := x / 2; WRITE x; WRITE x % 2; END";
    assert_eq!(run_program(src, &[21]), vec!["42", "21", "1"]);
    assert_eq!(run_program(src, &[0]), vec!["0", "0", "0"]);
}

// ── Control flow ─────────────────────────────────────────────────────────

#[test]
fn for_loop_sum() {
    let out = run_program(
        "DECLARE sum BEGIN sum := 0; \
         FOR i FROM 1 TO 5 DO sum := sum + i; ENDFOR WRITE sum; END",
        &[],
    );
    assert_eq!(out, vec!["15"]);
}

#[test]
fn empty_for_range_runs_zero_times() {
    let out = run_program(
        "DECLARE sum BEGIN sum := 7; \
         FOR i FROM 5 TO 1 DO sum := 0; ENDFOR WRITE sum; END",
        &[],
    );
    assert_eq!(out, vec!["7"]);
}

#[test]
fn downto_loop_reaches_zero() {
    let out = run_program(
        "BEGIN FOR i FROM 3 DOWNTO 0 DO WRITE i; ENDFOR END",
        &[],
    );
    assert_eq!(out, vec!["3", "2", "1", "0"]);
}

#[test]
fn while_and_repeat() {
    let out = run_program(
        "DECLARE n, c BEGIN READ n; c := 0; \
         WHILE n > 1 DO \
           IF n % 2 = 0 THEN n := n / 2; ELSE n := 3 * n + 1; ENDIF \
           c := c + 1; \
         ENDWHILE \
         WRITE c; \
         REPEAT c := c - 1; WRITE c; UNTIL c = 0; END",
        &[6],
    );
    // Collatz from 6 takes 8 steps; the REPEAT then counts back down.
    assert_eq!(out.first().map(String::as_str), Some("8"));
    assert_eq!(out.last().map(String::as_str), Some("0"));
    assert_eq!(out.len(), 9);
}

#[test]
fn gcd_by_remainder() {
    let src = "DECLARE a, b, t BEGIN READ a; READ b; \
               WHILE b > 0 DO t := a % b; a := b; b := t; ENDWHILE \
               WRITE a; END";
    assert_eq!(run_program(src, &[48, 36]), vec!["12"]);
    assert_eq!(run_program(src, &[17, 5]), vec!["1"]);
}

// ── Arrays ───────────────────────────────────────────────────────────────

#[test]
fn array_with_literal_offsets_is_promoted() {
    let src = "DECLARE a(0:2), x BEGIN \
               a(0) := 4; a(1) := 5; a(2) := 6; \
               x := a(0) + a(1) + a(2); WRITE x; END";
    let ir = compile_to_ir(src).expect("compilation failed");
    let any_access = ir.blocks.iter().any(|b| {
        b.instrs
            .iter()
            .any(|i| matches!(i, Instr::Load { .. } | Instr::Store { .. }))
    });
    assert!(!any_access, "promoted array must leave no indexed accesses");

    assert_eq!(run_program(src, &[]), vec!["15"]);
}

#[test]
fn array_with_dynamic_indices() {
    let src = "DECLARE t(0:4), i, sum BEGIN \
               FOR j FROM 0 TO 4 DO t(j) := j * j; ENDFOR \
               sum := 0; \
               FOR j FROM 0 TO 4 DO sum := sum + t(j); ENDFOR \
               WRITE sum; END";
    // 0 + 1 + 4 + 9 + 16
    assert_eq!(run_program(src, &[]), vec!["30"]);
}

#[test]
fn negative_lower_bound_addressing() {
    let src = "DECLARE t(-2:2), i BEGIN \
               FOR j FROM 0 TO 4 DO t(j - 2) := j; ENDFOR \
               WRITE t(-2); WRITE t(0); WRITE t(2); END";
    // j - 2 saturates for j < 2... j ranges 0..4, j-2 saturates to 0 for
    // j ≤ 2, so cells -2 and -1 keep their defaults and cell 0 is written
    // three times (last value 2).
    let out = run_program(src, &[]);
    assert_eq!(out, vec!["0", "2", "4"]);
}

// ── Register pressure ────────────────────────────────────────────────────

#[test]
fn deep_expression_forces_a_spill() {
    let src = "DECLARE a, b, c, d, e, f, g, h, x, w BEGIN \
               READ a; READ b; READ c; READ d; READ e; READ f; READ g; READ h; \
               x := a; \
               w := ((a + b) * (c + d)) - ((e + f) * (g + h)); \
               WRITE w; WRITE x; END";
    let out = compile(src, false).expect("compilation failed");
    assert!(
        out.assembly.contains("STORE"),
        "eight live values cannot fit in seven registers:\n{}",
        out.assembly
    );
    assert!(out.assembly.contains("LOAD"), "spilled values must reload");

    // (1+2)*(3+4) = 21, (5+6)*(7+8) = 165, 21 - 165 saturates to 0.
    assert_eq!(
        run(&out.assembly, &[1, 2, 3, 4, 5, 6, 7, 8]),
        vec!["0", "1"]
    );
    // 100*2 - 3*4 = 188 on the other operand order.
    assert_eq!(
        run(&out.assembly, &[99, 1, 1, 1, 1, 2, 2, 2]),
        vec!["188", "99"]
    );
}

// ── Warnings ─────────────────────────────────────────────────────────────

#[test]
fn uninitialized_read_warns_but_compiles() {
    let out = compile("DECLARE a, b BEGIN b := a + 1; WRITE b; END", false)
        .expect("warning must not abort compilation");
    assert_eq!(out.warnings.len(), 1);
    assert!(out.warnings[0].message.contains("'a'"));
}

#[test]
fn debug_output_still_runs() {
    let src = "DECLARE s BEGIN s := 0; FOR i FROM 1 TO 4 DO s := s + i; ENDFOR WRITE s; END";
    let out = compile(src, true).expect("compilation failed");
    assert!(out.assembly.contains("# L0:"));
    assert_eq!(run(&out.assembly, &[]), vec!["10"]);
}
