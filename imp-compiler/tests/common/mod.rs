//! Reference interpreter for the target machine, used to check emitted
//! programs by observable behavior.
//!
//! Registers and memory hold unbounded non-negative integers.  `SUB` and
//! `DEC` saturate at zero; `HALF` floors; `JODD` tests the lowest bit.

use num_bigint::BigUint;
use num_traits::Zero;
use std::collections::HashMap;

const STEP_LIMIT: u64 = 50_000_000;

fn reg_index(name: &str) -> usize {
    match name {
        "a" => 0,
        "b" => 1,
        "c" => 2,
        "d" => 3,
        "e" => 4,
        "f" => 5,
        "g" => 6,
        "h" => 7,
        other => panic!("unknown register '{other}'"),
    }
}

/// Run an assembled program, feeding `input` to `GET` in order.  Returns the
/// values printed by `PUT` as decimal strings.
pub fn run(asm: &str, input: &[u64]) -> Vec<String> {
    let instrs: Vec<Vec<String>> = asm
        .lines()
        .map(|l| l.split('#').next().unwrap_or("").trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.split_whitespace().map(str::to_string).collect())
        .collect();

    let mut regs: Vec<BigUint> = vec![BigUint::zero(); 8];
    let mut mem: HashMap<BigUint, BigUint> = HashMap::new();
    let mut inputs = input.iter();
    let mut outputs = Vec::new();
    let mut pc = 0usize;
    let mut steps = 0u64;

    loop {
        steps += 1;
        assert!(steps <= STEP_LIMIT, "program did not halt within {STEP_LIMIT} steps");
        let ins = instrs.get(pc).unwrap_or_else(|| panic!("pc {pc} out of range"));
        let opcode = ins[0].as_str();
        match opcode {
            "GET" => {
                let r = reg_index(&ins[1]);
                let v = inputs.next().expect("program read past the provided input");
                regs[r] = BigUint::from(*v);
            }
            "PUT" => {
                let r = reg_index(&ins[1]);
                outputs.push(regs[r].to_string());
            }
            "LOAD" => {
                let r = reg_index(&ins[1]);
                regs[r] = mem.get(&regs[0]).cloned().unwrap_or_default();
            }
            "STORE" => {
                let r = reg_index(&ins[1]);
                mem.insert(regs[0].clone(), regs[r].clone());
            }
            "COPY" => {
                let r = reg_index(&ins[1]);
                let s = reg_index(&ins[2]);
                regs[r] = regs[s].clone();
            }
            "ADD" => {
                let r = reg_index(&ins[1]);
                let s = reg_index(&ins[2]);
                regs[r] = &regs[r] + &regs[s];
            }
            "SUB" => {
                let r = reg_index(&ins[1]);
                let s = reg_index(&ins[2]);
                regs[r] = if regs[r] >= regs[s] {
                    &regs[r] - &regs[s]
                } else {
                    BigUint::zero()
                };
            }
            "HALF" => {
                let r = reg_index(&ins[1]);
                regs[r] = &regs[r] / 2u32;
            }
            "INC" => {
                let r = reg_index(&ins[1]);
                regs[r] = &regs[r] + 1u32;
            }
            "DEC" => {
                let r = reg_index(&ins[1]);
                if !regs[r].is_zero() {
                    regs[r] = &regs[r] - 1u32;
                }
            }
            "JUMP" => {
                pc = ins[1].parse().expect("numeric jump target");
                continue;
            }
            "JZERO" => {
                let r = reg_index(&ins[1]);
                if regs[r].is_zero() {
                    pc = ins[2].parse().expect("numeric jump target");
                    continue;
                }
            }
            "JODD" => {
                let r = reg_index(&ins[1]);
                if regs[r].bit(0) {
                    pc = ins[2].parse().expect("numeric jump target");
                    continue;
                }
            }
            "HALT" => return outputs,
            other => panic!("unknown opcode '{other}'"),
        }
        pc += 1;
    }
}
