//! Structural properties of the emitted assembly.

mod common;

use imp_compiler::compile;

fn asm_for(source: &str) -> String {
    compile(source, false).expect("compilation failed").assembly
}

const SAMPLE: &str = "DECLARE a, b, t(0:9) BEGIN \
    READ a; READ b; \
    FOR i FROM 0 TO 9 DO t(i) := i * a; ENDFOR \
    WHILE a > 0 DO \
      IF a % 2 = 0 THEN b := b + t(2); ELSE b := b - 1; ENDIF \
      a := a - 1; \
    ENDWHILE \
    WRITE b; END";

#[test]
fn no_jump_to_the_next_instruction() {
    let asm = asm_for(SAMPLE);
    for (i, line) in asm.lines().enumerate() {
        if let Some(target) = line.strip_prefix("JUMP ") {
            let target: usize = target.trim().parse().expect("numeric target");
            assert_ne!(target, i + 1, "redundant fallthrough jump at line {i}: '{line}'");
        }
    }
}

#[test]
fn all_jump_targets_are_in_range() {
    let asm = asm_for(SAMPLE);
    let count = asm.lines().count();
    for line in asm.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if matches!(parts[0], "JUMP" | "JZERO" | "JODD") {
            let target: usize = parts.last().unwrap().parse().expect("numeric target");
            assert!(target < count, "target {target} out of range in '{line}'");
        }
    }
}

#[test]
fn no_copy_to_itself() {
    let asm = asm_for(SAMPLE);
    for line in asm.lines() {
        if let Some(rest) = line.strip_prefix("COPY ") {
            let regs: Vec<&str> = rest.split_whitespace().collect();
            assert_ne!(regs[0], regs[1], "identity copy survived: '{line}'");
        }
    }
}

#[test]
fn address_register_is_never_allocated() {
    // Register a may only appear as the target of address arithmetic and in
    // LOAD/STORE addressing, never as a GET/PUT operand.
    let asm = asm_for(SAMPLE);
    for line in asm.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if matches!(parts[0], "GET" | "PUT") {
            assert_ne!(parts[1], "a", "address register used for I/O: '{line}'");
        }
    }
}

#[test]
fn byte_identical_across_runs() {
    let first = asm_for(SAMPLE);
    let second = asm_for(SAMPLE);
    assert_eq!(first, second);
}

#[test]
fn debug_mode_annotates_without_changing_code() {
    let plain = asm_for(SAMPLE);
    let debug = compile(SAMPLE, true).expect("compilation failed").assembly;

    assert!(debug.lines().any(|l| l.starts_with("# L")), "label comments missing");

    // Stripping comments from the debug output yields the plain program.
    let stripped: Vec<String> = debug
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(|l| l.split('#').next().unwrap().trim_end().to_string())
        .collect();
    let plain_lines: Vec<String> = plain.lines().map(str::to_string).collect();
    assert_eq!(stripped, plain_lines);
}

#[test]
fn emitted_programs_behave_identically_with_and_without_debug() {
    let plain = compile(SAMPLE, false).unwrap().assembly;
    let debug = compile(SAMPLE, true).unwrap().assembly;
    let a = common::run(&plain, &[5, 100]);
    let b = common::run(&debug, &[5, 100]);
    assert_eq!(a, b);
}
