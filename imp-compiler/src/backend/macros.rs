//! Macro expansions: multi-instruction sequences for constants, arithmetic
//! the machine lacks, and relational branches.
//!
//! Everything here funnels through the register allocator for registers and
//! through [`LabelGen`] for label names, so repeated expansions of the same
//! macro stay distinct and the output is deterministic.

use super::instruction::{AsmItem, Reg, VmInstr};
use super::regalloc::RegAlloc;
use crate::diagnostics::Diagnostics;
use crate::ir::{Operand, RelOp};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::collections::HashMap;

// ── Constant synthesis ──────────────────────────────────────────────────

/// Cost of materializing `v`: the cheaper of an INC chain (`v` steps) and
/// the binary buildup (`5·bitlen + popcount` steps).
pub fn const_cost(v: &BigUint) -> u64 {
    let binary = 5 * v.bits() + v.count_ones();
    match v.to_u64() {
        Some(chain) if chain <= binary => chain,
        _ => binary,
    }
}

/// Synthesize the literal `v` into `r`, which is zeroed first.
///
/// Small values count up from zero; everything else is built bit by bit
/// from the most significant end, doubling and incrementing.
pub fn emit_constant(out: &mut Vec<AsmItem>, r: Reg, v: &BigUint) {
    out.push(AsmItem::plain(VmInstr::Sub(r, r)));
    let binary = 5 * v.bits() + v.count_ones();
    match v.to_u64() {
        Some(chain) if chain <= binary => {
            for _ in 0..chain {
                out.push(AsmItem::plain(VmInstr::Inc(r)));
            }
        }
        _ => {
            for i in (0..v.bits()).rev() {
                out.push(AsmItem::plain(VmInstr::Add(r, r)));
                if v.bit(i) {
                    out.push(AsmItem::plain(VmInstr::Inc(r)));
                }
            }
        }
    }
}

// ── Label generation ────────────────────────────────────────────────────

/// Deterministic per-prefix label counter.
#[derive(Default)]
pub struct LabelGen {
    counters: HashMap<String, usize>,
}

impl LabelGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self, prefix: &str) -> String {
        let n = self.counters.entry(prefix.to_string()).or_insert(0);
        let label = format!("{prefix}.{n}");
        *n += 1;
        label
    }
}

// ── Emitter ─────────────────────────────────────────────────────────────

/// Shared state for one code-generation run: the allocator, the label
/// counter, the output buffer and the diagnostic sink.
pub(crate) struct Emitter<'a> {
    pub regs: RegAlloc<'a>,
    pub labels: LabelGen,
    pub out: Vec<AsmItem>,
    pub diags: &'a mut Diagnostics,
}

impl<'a> Emitter<'a> {
    pub fn new(symbols: &'a crate::ir::SymbolTable, diags: &'a mut Diagnostics) -> Self {
        Self {
            regs: RegAlloc::new(symbols),
            labels: LabelGen::new(),
            out: Vec::new(),
            diags,
        }
    }

    pub fn push(&mut self, instr: VmInstr) {
        self.out.push(AsmItem::plain(instr));
    }

    pub fn label(&mut self, name: String) {
        self.out.push(AsmItem::Label(name));
    }

    pub fn load(&mut self, op: &Operand) -> Reg {
        self.regs.load(op, &mut self.out, &mut *self.diags)
    }

    pub fn select(&mut self) -> Reg {
        self.regs.select(&mut self.out)
    }

    /// Load `op` and copy it into a fresh register that the caller may
    /// clobber freely.
    pub fn copy_to_fresh(&mut self, op: &Operand) -> Reg {
        let rs = self.load(op);
        let rd = self.select();
        self.push(VmInstr::Copy(rd, rs));
        rd
    }

    // ── Small arithmetic macros ─────────────────────────────────────────

    pub fn inc_fresh(&mut self, op: &Operand) -> Reg {
        let r = self.copy_to_fresh(op);
        self.push(VmInstr::Inc(r));
        r
    }

    pub fn dec_fresh(&mut self, op: &Operand) -> Reg {
        let r = self.copy_to_fresh(op);
        self.push(VmInstr::Dec(r));
        r
    }

    pub fn add_fresh(&mut self, left: &Operand, right: &Operand) -> Reg {
        let rd = self.copy_to_fresh(left);
        let rr = self.load(right);
        self.push(VmInstr::Add(rd, rr));
        rd
    }

    pub fn sub_fresh(&mut self, left: &Operand, right: &Operand) -> Reg {
        let rd = self.copy_to_fresh(left);
        let rr = self.load(right);
        self.push(VmInstr::Sub(rd, rr));
        rd
    }

    /// Parity: `op mod 2`, via a JODD probe.
    pub fn rem2(&mut self, op: &Operand) -> Reg {
        let rs = self.load(op);
        let rd = self.select();
        let odd = self.labels.fresh("rem2.odd");
        let end = self.labels.fresh("rem2.end");
        self.push(VmInstr::Sub(rd, rd));
        self.push(VmInstr::Jodd(rs, odd.clone()));
        self.push(VmInstr::Jump(end.clone()));
        self.label(odd);
        self.push(VmInstr::Inc(rd));
        self.label(end);
        rd
    }

    // ── Schoolbook multiplication ───────────────────────────────────────

    /// Binary multiplication: walk the bits of the right operand with
    /// `HALF`/`JODD`, doubling the left and accumulating.
    pub fn long_mul(&mut self, left: &Operand, right: &Operand) -> Reg {
        let acc = self.select();
        let ra = self.copy_to_fresh(left);
        let rb = self.copy_to_fresh(right);
        let head = self.labels.fresh("mul.head");
        let add = self.labels.fresh("mul.add");
        let step = self.labels.fresh("mul.step");
        let end = self.labels.fresh("mul.end");

        self.push(VmInstr::Sub(acc, acc));
        self.label(head.clone());
        self.push(VmInstr::Jzero(rb, end.clone()));
        self.push(VmInstr::Jodd(rb, add.clone()));
        self.label(step.clone());
        self.push(VmInstr::Add(ra, ra));
        self.push(VmInstr::Half(rb));
        self.push(VmInstr::Jump(head));
        self.label(add);
        self.push(VmInstr::Add(acc, ra));
        self.push(VmInstr::Jump(step));
        self.label(end);
        acc
    }

    // ── Schoolbook division ─────────────────────────────────────────────

    /// Restoring division.  Doubles the divisor until it exceeds the
    /// dividend, then shifts back down subtracting where it fits.  Returns
    /// `(quotient, remainder)`; division by zero leaves both at zero.
    pub fn long_divmod(&mut self, left: &Operand, right: &Operand) -> (Reg, Reg) {
        let rn = self.copy_to_fresh(left); // running remainder
        let rm = self.copy_to_fresh(right); // divisor multiple
        let rq = self.select();
        let rc = self.select(); // doubling count
        let rt = self.select(); // comparison scratch

        let scale = self.labels.fresh("div.scale");
        let grow = self.labels.fresh("div.grow");
        let shift = self.labels.fresh("div.shift");
        let fits = self.labels.fresh("div.fits");
        let zero = self.labels.fresh("div.zero");
        let end = self.labels.fresh("div.end");

        self.push(VmInstr::Sub(rq, rq));
        self.push(VmInstr::Sub(rc, rc));
        self.push(VmInstr::Jzero(rm, zero.clone()));

        // Double the divisor until rm > rn.
        self.label(scale.clone());
        self.push(VmInstr::Copy(rt, rm));
        self.push(VmInstr::Sub(rt, rn));
        self.push(VmInstr::Jzero(rt, grow.clone()));
        self.push(VmInstr::Jump(shift.clone()));
        self.label(grow);
        self.push(VmInstr::Add(rm, rm));
        self.push(VmInstr::Inc(rc));
        self.push(VmInstr::Jump(scale));

        // Shift back down, subtracting wherever the multiple fits.
        self.label(shift.clone());
        self.push(VmInstr::Jzero(rc, end.clone()));
        self.push(VmInstr::Dec(rc));
        self.push(VmInstr::Half(rm));
        self.push(VmInstr::Add(rq, rq));
        self.push(VmInstr::Copy(rt, rm));
        self.push(VmInstr::Sub(rt, rn));
        self.push(VmInstr::Jzero(rt, fits.clone()));
        self.push(VmInstr::Jump(shift.clone()));
        self.label(fits);
        self.push(VmInstr::Sub(rn, rm));
        self.push(VmInstr::Inc(rq));
        self.push(VmInstr::Jump(shift));

        // Division by zero: quotient and remainder are both zero.
        self.label(zero);
        self.push(VmInstr::Sub(rn, rn));
        self.label(end);
        (rq, rn)
    }

    pub fn long_div(&mut self, left: &Operand, right: &Operand) -> Reg {
        self.long_divmod(left, right).0
    }

    pub fn long_rem(&mut self, left: &Operand, right: &Operand) -> Reg {
        self.long_divmod(left, right).1
    }

    // ── Relational branches ─────────────────────────────────────────────

    /// Emit a two-way branch on `left op right`.  Saturating subtraction
    /// reduces every relation to `JZERO` tests: `max(0, l − r) = 0` exactly
    /// when `l ≤ r`.
    pub fn branch(&mut self, op: RelOp, left: &Operand, right: &Operand, t: &str, f: &str) {
        let l_zero = left.as_const().is_some_and(num_traits::Zero::is_zero);
        let r_zero = right.as_const().is_some_and(num_traits::Zero::is_zero);
        if r_zero {
            return self.branch_zero(op, left, t, f);
        }
        if l_zero {
            return self.branch_zero(swap(op), right, t, f);
        }

        match op {
            RelOp::Le => {
                let c = self.sub_fresh(left, right);
                self.push(VmInstr::Jzero(c, t.to_string()));
                self.push(VmInstr::Jump(f.to_string()));
            }
            RelOp::Ge => {
                let c = self.sub_fresh(right, left);
                self.push(VmInstr::Jzero(c, t.to_string()));
                self.push(VmInstr::Jump(f.to_string()));
            }
            RelOp::Lt => {
                let c = self.sub_fresh(right, left);
                self.push(VmInstr::Jzero(c, f.to_string()));
                self.push(VmInstr::Jump(t.to_string()));
            }
            RelOp::Gt => {
                let c = self.sub_fresh(left, right);
                self.push(VmInstr::Jzero(c, f.to_string()));
                self.push(VmInstr::Jump(t.to_string()));
            }
            RelOp::Eq => {
                // l ≤ r and r ≤ l.
                let halfway = self.labels.fresh("cmp.le");
                let c = self.sub_fresh(left, right);
                self.push(VmInstr::Jzero(c, halfway.clone()));
                self.push(VmInstr::Jump(f.to_string()));
                self.label(halfway);
                let c2 = self.sub_fresh(right, left);
                self.push(VmInstr::Jzero(c2, t.to_string()));
                self.push(VmInstr::Jump(f.to_string()));
            }
            RelOp::Ne => {
                let halfway = self.labels.fresh("cmp.le");
                let c = self.sub_fresh(left, right);
                self.push(VmInstr::Jzero(c, halfway.clone()));
                self.push(VmInstr::Jump(t.to_string()));
                self.label(halfway);
                let c2 = self.sub_fresh(right, left);
                self.push(VmInstr::Jzero(c2, f.to_string()));
                self.push(VmInstr::Jump(t.to_string()));
            }
        }
    }

    /// Branch on `x op 0`: the comparison collapses to a single `JZERO` (or
    /// to an unconditional jump, since no value is below zero).
    fn branch_zero(&mut self, op: RelOp, x: &Operand, t: &str, f: &str) {
        match op {
            RelOp::Eq | RelOp::Le => {
                let rx = self.load(x);
                self.push(VmInstr::Jzero(rx, t.to_string()));
                self.push(VmInstr::Jump(f.to_string()));
            }
            RelOp::Ne | RelOp::Gt => {
                let rx = self.load(x);
                self.push(VmInstr::Jzero(rx, f.to_string()));
                self.push(VmInstr::Jump(t.to_string()));
            }
            RelOp::Lt => {
                self.push(VmInstr::Jump(f.to_string()));
            }
            RelOp::Ge => {
                self.push(VmInstr::Jump(t.to_string()));
            }
        }
    }
}

/// Mirror a relation: `l op r ⟺ r swap(op) l`.
fn swap(op: RelOp) -> RelOp {
    match op {
        RelOp::Eq => RelOp::Eq,
        RelOp::Ne => RelOp::Ne,
        RelOp::Lt => RelOp::Gt,
        RelOp::Gt => RelOp::Lt,
        RelOp::Le => RelOp::Ge,
        RelOp::Ge => RelOp::Le,
    }
}
