//! Register allocation with location descriptors.
//!
//! Every operand that needs memory gets a home address on first reference:
//! scalars take one word, arrays a contiguous run of `size` words.  The
//! location descriptor maps each live operand to the set of places currently
//! holding its value; a value may legitimately sit in memory and in a
//! register at once.  Between IR instructions at most one operand may claim
//! any register other than `a`.
//!
//! The selection set pins registers handed out while lowering a single IR
//! instruction so one macro expansion cannot evict another's inputs; the
//! code-gen driver clears it before every instruction.

use super::instruction::{emit_c, AsmItem, Reg, VmInstr};
use super::macros::{const_cost, emit_constant};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::ir::{Operand, SymId, SymbolTable};
use num_bigint::{BigInt, BigUint};
use std::collections::{BTreeSet, HashMap, HashSet};

/// One place a value currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Loc {
    Reg(Reg),
    Mem(u64),
}

pub struct RegAlloc<'a> {
    symbols: &'a SymbolTable,
    /// Home addresses of scalars (variables and spilled temporaries).
    addresses: HashMap<Operand, u64>,
    /// Base addresses of arrays.
    array_bases: HashMap<SymId, u64>,
    next_addr: u64,
    locations: HashMap<Operand, BTreeSet<Loc>>,
    selection: HashSet<Reg>,
    warned: HashSet<Operand>,
}

fn unsigned(v: &BigInt) -> BigUint {
    v.to_biguint().unwrap_or_default()
}

impl<'a> RegAlloc<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            addresses: HashMap::new(),
            array_bases: HashMap::new(),
            next_addr: 0,
            locations: HashMap::new(),
            selection: HashSet::new(),
            warned: HashSet::new(),
        }
    }

    fn describe(&self, op: &Operand) -> String {
        match op {
            Operand::Name(id) => self.symbols.get(*id).name.clone(),
            other => other.to_string(),
        }
    }

    // ── Address table ───────────────────────────────────────────────────

    /// Home address of a scalar operand, allocated on first reference.
    pub fn address_of(&mut self, op: &Operand) -> u64 {
        if let Some(&a) = self.addresses.get(op) {
            return a;
        }
        let a = self.next_addr;
        self.next_addr += 1;
        self.addresses.insert(op.clone(), a);
        a
    }

    /// Base address of an array, allocated on first reference.
    pub fn array_base(&mut self, base: SymId) -> u64 {
        if let Some(&a) = self.array_bases.get(&base) {
            return a;
        }
        let a = self.next_addr;
        self.next_addr += self.symbols.get(base).size();
        self.array_bases.insert(base, a);
        a
    }

    // ── Descriptor queries ──────────────────────────────────────────────

    fn register_home(&self, op: &Operand) -> Option<Reg> {
        self.locations.get(op)?.iter().find_map(|l| match l {
            Loc::Reg(r) => Some(*r),
            Loc::Mem(_) => None,
        })
    }

    fn memory_home(&self, op: &Operand) -> Option<u64> {
        self.locations.get(op)?.iter().find_map(|l| match l {
            Loc::Mem(a) => Some(*a),
            Loc::Reg(_) => None,
        })
    }

    fn owner_of(&self, r: Reg) -> Option<&Operand> {
        self.locations
            .iter()
            .find(|(_, locs)| locs.contains(&Loc::Reg(r)))
            .map(|(op, _)| op)
    }

    // ── Core operations ─────────────────────────────────────────────────

    /// Reserve a register for the current IR instruction.  Prefers a free
    /// register; otherwise spills the victim with the cheapest address
    /// constant.
    pub fn select(&mut self, out: &mut Vec<AsmItem>) -> Reg {
        for r in Reg::ALLOCATABLE {
            if !self.selection.contains(&r) && self.owner_of(r).is_none() {
                self.selection.insert(r);
                return r;
            }
        }

        let mut best: Option<(u64, Reg, Operand)> = None;
        for r in Reg::ALLOCATABLE {
            if self.selection.contains(&r) {
                continue;
            }
            let Some(owner) = self.owner_of(r).cloned() else {
                continue;
            };
            let addr = self.address_of(&owner);
            let penalty = const_cost(&BigUint::from(addr)) + 50;
            if best.as_ref().map_or(true, |(p, _, _)| penalty < *p) {
                best = Some((penalty, r, owner));
            }
        }
        let (_, victim, owner) = best.expect("all registers pinned while selecting");

        let addr = self.address_of(&owner);
        emit_constant(out, Reg::ADDRESS, &BigUint::from(addr));
        emit_c(out, VmInstr::Store(victim), format!("spill {}", self.describe(&owner)));
        let locs = self.locations.get_mut(&owner).expect("victim has a descriptor");
        locs.remove(&Loc::Reg(victim));
        locs.insert(Loc::Mem(addr));

        self.selection.insert(victim);
        victim
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Bring an operand into a register.
    ///
    /// Constants are synthesized into a fresh register and never recorded in
    /// the descriptor.  A named operand with no known location is an
    /// uninitialized read: warn once, pointing at the declaration, and hand
    /// out a register anyway so lowering proceeds.
    pub fn load(&mut self, op: &Operand, out: &mut Vec<AsmItem>, diags: &mut Diagnostics) -> Reg {
        if let Operand::Const(c) = op {
            let r = self.select(out);
            emit_constant(out, r, &unsigned(c));
            return r;
        }

        if let Some(r) = self.register_home(op) {
            self.selection.insert(r);
            return r;
        }

        if let Some(addr) = self.memory_home(op) {
            let r = self.select(out);
            emit_constant(out, Reg::ADDRESS, &BigUint::from(addr));
            emit_c(out, VmInstr::Load(r), format!("reload {}", self.describe(op)));
            self.locations.entry(op.clone()).or_default().insert(Loc::Reg(r));
            return r;
        }

        if let Operand::Name(id) = op {
            if self.warned.insert(op.clone()) {
                let sym = self.symbols.get(*id);
                diags.warning(
                    DiagnosticKind::Uninitialized,
                    sym.line,
                    sym.col,
                    format!("variable '{}' may be used before initialization", sym.name),
                );
            }
        }
        let r = self.select(out);
        self.seize(r, op);
        r
    }

    /// Compute an array element's address into register `a`.
    ///
    /// The element lives at `base_addr + (index − lo)`; the relative base
    /// `Δ = base_addr − lo` is synthesized *before* `a` is written so that a
    /// spill inside selection cannot clobber the address register.
    pub fn lea(
        &mut self,
        base: SymId,
        index: &Operand,
        out: &mut Vec<AsmItem>,
        diags: &mut Diagnostics,
    ) {
        let addr = self.array_base(base);
        let (lo, _) = self
            .symbols
            .get(base)
            .array_bounds()
            .expect("effective address of a scalar");

        // A literal offset folds into a single address constant.  This is
        // also the only road to cells below a negative lower bound.
        if let Some(c) = index.as_const() {
            let element = BigInt::from(addr) + (c - BigInt::from(lo));
            emit_constant(out, Reg::ADDRESS, &unsigned(&element));
            return;
        }

        let r_off = self.load(index, out, diags);
        let delta = addr as i128 - lo as i128;

        if delta == 0 {
            out.push(AsmItem::plain(VmInstr::Copy(Reg::ADDRESS, r_off)));
            return;
        }
        let r_delta = self.select(out);
        emit_constant(out, r_delta, &BigUint::from(delta.unsigned_abs()));
        out.push(AsmItem::plain(VmInstr::Copy(Reg::ADDRESS, r_off)));
        if delta > 0 {
            out.push(AsmItem::plain(VmInstr::Add(Reg::ADDRESS, r_delta)));
        } else {
            out.push(AsmItem::plain(VmInstr::Sub(Reg::ADDRESS, r_delta)));
        }
    }

    /// `result ← base[index]`.
    pub fn load_element(
        &mut self,
        base: SymId,
        index: &Operand,
        out: &mut Vec<AsmItem>,
        diags: &mut Diagnostics,
    ) -> Reg {
        let r = self.select(out);
        self.lea(base, index, out, diags);
        emit_c(
            out,
            VmInstr::Load(r),
            format!("{}[..]", self.symbols.get(base).name),
        );
        r
    }

    /// `base[index] ← value`.
    pub fn store_element(
        &mut self,
        value: &Operand,
        base: SymId,
        index: &Operand,
        out: &mut Vec<AsmItem>,
        diags: &mut Diagnostics,
    ) {
        let rs = self.load(value, out, diags);
        self.lea(base, index, out, diags);
        emit_c(
            out,
            VmInstr::Store(rs),
            format!("{}[..]", self.symbols.get(base).name),
        );
    }

    /// Record that register `r` now holds the freshly produced value of
    /// `op`, invalidating every other claim on `r` and every stale location
    /// of `op`.
    pub fn seize(&mut self, r: Reg, op: &Operand) {
        for locs in self.locations.values_mut() {
            locs.remove(&Loc::Reg(r));
        }
        self.locations.retain(|_, locs| !locs.is_empty());
        self.locations
            .insert(op.clone(), BTreeSet::from([Loc::Reg(r)]));
        self.selection.insert(r);
    }

    /// At a control-flow boundary, write register-only named variables back
    /// to memory.  `merge_ahead` is set when some successor is not dominated
    /// by the current block, i.e. it merges with code arriving from
    /// elsewhere, so the value must be in its home regardless of liveness.
    pub fn save_variables(
        &mut self,
        live_out: &HashSet<Operand>,
        merge_ahead: bool,
        out: &mut Vec<AsmItem>,
    ) {
        let mut pending: Vec<(Operand, Reg)> = Vec::new();
        for (op, locs) in &self.locations {
            if !op.is_name() {
                continue;
            }
            let only_reg = if locs.len() == 1 {
                match locs.iter().next() {
                    Some(Loc::Reg(r)) => Some(*r),
                    _ => None,
                }
            } else {
                None
            };
            let Some(r) = only_reg else { continue };
            if live_out.contains(op) || merge_ahead {
                pending.push((op.clone(), r));
            }
        }
        pending.sort();
        for (op, r) in pending {
            let addr = self.address_of(&op);
            emit_constant(out, Reg::ADDRESS, &BigUint::from(addr));
            emit_c(out, VmInstr::Store(r), format!("save {}", self.describe(&op)));
            self.locations
                .get_mut(&op)
                .expect("saved operand has a descriptor")
                .insert(Loc::Mem(addr));
        }
    }

    /// Forget every register binding.  Values survive blocks only through
    /// their memory homes.
    pub fn reset_registers(&mut self) {
        for locs in self.locations.values_mut() {
            locs.retain(|l| matches!(l, Loc::Mem(_)));
        }
        self.locations.retain(|_, locs| !locs.is_empty());
    }

    /// Free the register binding of an operand that has no further use.
    pub fn drop_dead(&mut self, op: &Operand) {
        if let Some(locs) = self.locations.get_mut(op) {
            locs.retain(|l| matches!(l, Loc::Mem(_)));
            if locs.is_empty() {
                self.locations.remove(op);
            }
        }
    }

    /// Descriptor well-formedness: every register other than `a` is claimed
    /// by at most one operand.
    #[cfg(test)]
    pub fn assert_well_formed(&self) {
        use std::collections::HashMap as Map;
        let mut owners: Map<Reg, Vec<&Operand>> = Map::new();
        for (op, locs) in &self.locations {
            for l in locs {
                if let Loc::Reg(r) = l {
                    owners.entry(*r).or_default().push(op);
                }
            }
        }
        for (r, ops) in owners {
            assert!(
                ops.len() <= 1,
                "register {} claimed by {} operands",
                r,
                ops.len()
            );
        }
    }
}
