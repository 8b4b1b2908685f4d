//! AST → IR lowering.
//!
//! Builds the basic-block graph directly while performing the semantic
//! checks: declaration discipline, array/scalar shape, iterator immutability
//! and literal range.  All findings go to the diagnostic sink; lowering keeps
//! going so one run reports as much as possible.

use super::ir::{ArithOp, BasicBlock, BlockId, Instr, Operand, ProgramIr, RelOp};
use super::symbol_table::{SymId, Symbol, SymbolTable};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::frontend::ast::{Cond, Decl, Expr, Program, Stmt, Target};

pub fn lower(program: &Program, diags: &mut Diagnostics) -> ProgramIr {
    let mut gen = Lowerer {
        symbols: SymbolTable::new(),
        blocks: vec![BasicBlock::new("L0")],
        current: BlockId(0),
        temp_count: 0,
        label_count: 1,
        diags,
    };
    gen.declare_all(&program.decls);
    gen.lower_stmts(&program.body);
    gen.seal(Instr::Halt);
    ProgramIr {
        blocks: gen.blocks,
        symbols: gen.symbols,
        temp_count: gen.temp_count,
    }
}

struct Lowerer<'d> {
    symbols: SymbolTable,
    blocks: Vec<BasicBlock>,
    current: BlockId,
    temp_count: usize,
    label_count: usize,
    diags: &'d mut Diagnostics,
}

impl Lowerer<'_> {
    // ── Block plumbing ──────────────────────────────────────────────────

    fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::new(format!("L{}", self.label_count)));
        self.label_count += 1;
        id
    }

    fn emit(&mut self, instr: Instr) {
        self.blocks[self.current.0].instrs.push(instr);
    }

    /// Terminate the current block.
    fn seal(&mut self, terminator: Instr) {
        debug_assert!(terminator.is_terminator());
        debug_assert!(self.blocks[self.current.0].terminator().is_none());
        self.blocks[self.current.0].instrs.push(terminator);
    }

    fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    fn temp(&mut self) -> Operand {
        let t = Operand::Temp(self.temp_count);
        self.temp_count += 1;
        t
    }

    // ── Declarations ────────────────────────────────────────────────────

    fn declare_all(&mut self, decls: &[Decl]) {
        for decl in decls {
            let (symbol, line, col) = match decl {
                Decl::Var { name, line, col } => {
                    (Symbol::variable(name.clone(), *line, *col), *line, *col)
                }
                Decl::Array {
                    name,
                    lo,
                    hi,
                    line,
                    col,
                } => {
                    if hi < lo {
                        self.diags.error(
                            DiagnosticKind::BadArrayBounds,
                            *line,
                            *col,
                            format!("array '{}' has bounds {}:{} with {} < {}", name, lo, hi, hi, lo),
                        );
                        continue;
                    }
                    // hi - lo + 1 must fit in a word count.
                    if *hi as i128 - *lo as i128 >= u64::MAX as i128 {
                        self.diags.error(
                            DiagnosticKind::BadArrayBounds,
                            *line,
                            *col,
                            format!(
                                "array '{}' with bounds {}:{} spans more words than the machine can address",
                                name, lo, hi
                            ),
                        );
                        continue;
                    }
                    (Symbol::array(name.clone(), *lo, *hi, *line, *col), *line, *col)
                }
            };
            let name = symbol.name.clone();
            if self.symbols.declare(symbol).is_err() {
                self.diags.error(
                    DiagnosticKind::Redeclared,
                    line,
                    col,
                    format!("'{}' is already declared", name),
                );
            }
        }
    }

    // ── Symbol resolution ───────────────────────────────────────────────

    /// Resolve a name that must denote a scalar variable.  Unknown names are
    /// reported once and stubbed so lowering can continue.
    fn resolve_scalar(&mut self, name: &str, line: usize, col: usize) -> SymId {
        match self.symbols.lookup(name) {
            Some(id) if self.symbols.get(id).is_array() => {
                self.diags.error(
                    DiagnosticKind::NotAVariable,
                    line,
                    col,
                    format!("array '{}' used as a scalar variable", name),
                );
                id
            }
            Some(id) => id,
            None => {
                self.diags.error(
                    DiagnosticKind::Undeclared,
                    line,
                    col,
                    format!("undeclared variable '{}'", name),
                );
                self.stub(name, line, col)
            }
        }
    }

    fn resolve_array(&mut self, name: &str, line: usize, col: usize) -> Option<SymId> {
        match self.symbols.lookup(name) {
            Some(id) if self.symbols.get(id).is_array() => Some(id),
            Some(_) => {
                self.diags.error(
                    DiagnosticKind::NotAnArray,
                    line,
                    col,
                    format!("variable '{}' indexed like an array", name),
                );
                None
            }
            None => {
                self.diags.error(
                    DiagnosticKind::Undeclared,
                    line,
                    col,
                    format!("undeclared array '{}'", name),
                );
                None
            }
        }
    }

    /// Register a placeholder for an undeclared name so a single typo is
    /// reported once rather than at every use.
    fn stub(&mut self, name: &str, line: usize, col: usize) -> SymId {
        let mut symbol = Symbol::variable(name.to_string(), line, col);
        if let super::symbol_table::SymbolKind::Variable { initialized, .. } = &mut symbol.kind {
            *initialized = true;
        }
        self.symbols
            .declare(symbol)
            .unwrap_or_else(|existing| existing)
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn lower_stmts(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            self.lower_stmt(s);
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign { target, value } => {
                let src = self.eval(value);
                self.assign(target, src);
            }
            Stmt::Read { target } => match target {
                Target::Var { name, line, col } => {
                    let id = self.resolve_scalar(name, *line, *col);
                    self.check_not_iterator(id, *line, *col);
                    self.symbols.mark_initialized(id);
                    self.emit(Instr::Get {
                        dst: Operand::Name(id),
                    });
                }
                Target::Elem {
                    name,
                    index,
                    line,
                    col,
                } => {
                    let idx = self.eval(index);
                    let t = self.temp();
                    self.emit(Instr::Get { dst: t.clone() });
                    if let Some(base) = self.resolve_array(name, *line, *col) {
                        self.emit(Instr::Store {
                            src: t,
                            base,
                            index: idx,
                        });
                    }
                }
            },
            Stmt::Write { value } => {
                let src = self.eval(value);
                self.emit(Instr::Put { src });
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(cond, then_branch, else_branch.as_deref()),
            Stmt::While { cond, body } => self.lower_while(cond, body),
            Stmt::Repeat { body, cond } => self.lower_repeat(body, cond),
            Stmt::For {
                var,
                from,
                downto,
                to,
                body,
                line,
                col,
            } => self.lower_for(var, from, *downto, to, body, *line, *col),
        }
    }

    fn assign(&mut self, target: &Target, src: Operand) {
        match target {
            Target::Var { name, line, col } => {
                let id = self.resolve_scalar(name, *line, *col);
                self.check_not_iterator(id, *line, *col);
                self.symbols.mark_initialized(id);
                self.emit(Instr::Move {
                    src,
                    dst: Operand::Name(id),
                });
            }
            Target::Elem {
                name,
                index,
                line,
                col,
            } => {
                let idx = self.eval(index);
                if let Some(base) = self.resolve_array(name, *line, *col) {
                    self.emit(Instr::Store {
                        src,
                        base,
                        index: idx,
                    });
                }
            }
        }
    }

    fn check_not_iterator(&mut self, id: SymId, line: usize, col: usize) {
        if self.symbols.get(id).is_iterator() {
            let name = self.symbols.get(id).name.clone();
            self.diags.error(
                DiagnosticKind::IteratorAssignment,
                line,
                col,
                format!("loop iterator '{}' cannot be modified", name),
            );
        }
    }

    fn lower_if(&mut self, cond: &Cond, then_branch: &[Stmt], else_branch: Option<&[Stmt]>) {
        let (op, left, right) = self.eval_cond(cond);
        let then_block = self.new_block();
        match else_branch {
            Some(else_stmts) => {
                let else_block = self.new_block();
                let after = self.new_block();
                self.seal(Instr::Branch {
                    op,
                    left,
                    right,
                    if_true: then_block,
                    if_false: else_block,
                });
                self.switch_to(then_block);
                self.lower_stmts(then_branch);
                self.seal(Instr::Jump { target: after });
                self.switch_to(else_block);
                self.lower_stmts(else_stmts);
                self.seal(Instr::Jump { target: after });
                self.switch_to(after);
            }
            None => {
                let after = self.new_block();
                self.seal(Instr::Branch {
                    op,
                    left,
                    right,
                    if_true: then_block,
                    if_false: after,
                });
                self.switch_to(then_block);
                self.lower_stmts(then_branch);
                self.seal(Instr::Jump { target: after });
                self.switch_to(after);
            }
        }
    }

    fn lower_while(&mut self, cond: &Cond, body: &[Stmt]) {
        let head = self.new_block();
        self.seal(Instr::Jump { target: head });
        self.switch_to(head);
        let (op, left, right) = self.eval_cond(cond);
        let body_block = self.new_block();
        let after = self.new_block();
        self.seal(Instr::Branch {
            op,
            left,
            right,
            if_true: body_block,
            if_false: after,
        });
        self.switch_to(body_block);
        self.lower_stmts(body);
        self.seal(Instr::Jump { target: head });
        self.switch_to(after);
    }

    fn lower_repeat(&mut self, body: &[Stmt], cond: &Cond) {
        let body_block = self.new_block();
        self.seal(Instr::Jump { target: body_block });
        self.switch_to(body_block);
        self.lower_stmts(body);
        let (op, left, right) = self.eval_cond(cond);
        let after = self.new_block();
        self.seal(Instr::Branch {
            op,
            left,
            right,
            if_true: after,
            if_false: body_block,
        });
        self.switch_to(after);
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_for(
        &mut self,
        var: &str,
        from: &Expr,
        downto: bool,
        to: &Expr,
        body: &[Stmt],
        line: usize,
        col: usize,
    ) {
        let from_op = self.eval(from);
        let to_op = self.eval(to);

        // The iterator is scoped to the loop and immutable in the body.
        let (iter, declared) = match self.symbols.declare(Symbol::variable(var, line, col)) {
            Ok(id) => (id, true),
            Err(_) => {
                self.diags.error(
                    DiagnosticKind::Redeclared,
                    line,
                    col,
                    format!("iterator '{}' shadows an existing declaration", var),
                );
                (
                    self.symbols.insert_internal(Symbol::variable(var, line, col)),
                    false,
                )
            }
        };
        self.symbols.mark_iterator(iter, true);
        self.symbols.mark_initialized(iter);

        // Hidden down-counter: number of iterations left.  Computed as an
        // overshoot-by-one difference so an empty range yields zero under
        // saturating subtraction.
        let counter = self
            .symbols
            .insert_internal(Symbol::variable(format!("_{}", var), line, col));
        self.symbols.mark_initialized(counter);

        self.emit(Instr::Move {
            src: from_op.clone(),
            dst: Operand::Name(iter),
        });
        let overshoot = self.temp();
        let (base, bound) = if downto {
            (from_op, to_op)
        } else {
            (to_op, from_op)
        };
        self.emit(Instr::Binary {
            op: ArithOp::Add,
            left: base,
            right: Operand::imm(1),
            dst: overshoot.clone(),
        });
        self.emit(Instr::Binary {
            op: ArithOp::Sub,
            left: overshoot,
            right: bound,
            dst: Operand::Name(counter),
        });

        let head = self.new_block();
        self.seal(Instr::Jump { target: head });
        self.switch_to(head);
        let body_block = self.new_block();
        let after = self.new_block();
        self.seal(Instr::Branch {
            op: RelOp::Eq,
            left: Operand::Name(counter),
            right: Operand::imm(0),
            if_true: after,
            if_false: body_block,
        });

        self.switch_to(body_block);
        self.lower_stmts(body);
        let step = if downto { ArithOp::Sub } else { ArithOp::Add };
        self.emit(Instr::Binary {
            op: step,
            left: Operand::Name(iter),
            right: Operand::imm(1),
            dst: Operand::Name(iter),
        });
        self.emit(Instr::Binary {
            op: ArithOp::Sub,
            left: Operand::Name(counter),
            right: Operand::imm(1),
            dst: Operand::Name(counter),
        });
        self.seal(Instr::Jump { target: head });
        self.switch_to(after);

        self.symbols.mark_iterator(iter, false);
        if declared {
            self.symbols.retire(iter);
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn eval_cond(&mut self, cond: &Cond) -> (RelOp, Operand, Operand) {
        let left = self.eval(&cond.left);
        let right = self.eval(&cond.right);
        (cond.op, left, right)
    }

    fn eval(&mut self, expr: &Expr) -> Operand {
        match expr {
            Expr::Num { value, line, col } => {
                if i64::try_from(value).is_err() {
                    self.diags.error(
                        DiagnosticKind::LiteralRange,
                        *line,
                        *col,
                        format!("literal {} does not fit in 64 bits", value),
                    );
                }
                Operand::Const(value.clone())
            }
            Expr::Ref(target) => match target {
                Target::Var { name, line, col } => {
                    let id = self.resolve_scalar(name, *line, *col);
                    Operand::Name(id)
                }
                Target::Elem {
                    name,
                    index,
                    line,
                    col,
                } => {
                    let idx = self.eval(index);
                    match self.resolve_array(name, *line, *col) {
                        Some(base) => {
                            let t = self.temp();
                            self.emit(Instr::Load {
                                base,
                                index: idx,
                                dst: t.clone(),
                            });
                            t
                        }
                        None => Operand::imm(0),
                    }
                }
            },
            Expr::Binary { op, left, right } => {
                let l = self.eval(left);
                let r = self.eval(right);
                let t = self.temp();
                self.emit(Instr::Binary {
                    op: *op,
                    left: l,
                    right: r,
                    dst: t.clone(),
                });
                t
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser;

    fn lower_source(source: &str) -> (ProgramIr, Diagnostics) {
        let mut diags = Diagnostics::new();
        let ast = parser::parse(source, &mut diags).expect("parse failed");
        let ir = lower(&ast, &mut diags);
        (ir, diags)
    }

    /// Every block ends in exactly one terminator and every jump target is a
    /// block in the list.
    fn assert_well_formed(ir: &ProgramIr) {
        for block in &ir.blocks {
            let term = block
                .terminator()
                .unwrap_or_else(|| panic!("block {} has no terminator", block.label));
            for succ in term.successors() {
                assert!(succ.0 < ir.blocks.len(), "dangling jump target {}", succ);
            }
            for ins in &block.instrs[..block.instrs.len() - 1] {
                assert!(!ins.is_terminator(), "terminator in the middle of {}", block.label);
            }
        }
    }

    #[test]
    fn straight_line_program() {
        let (ir, diags) = lower_source("DECLARE a BEGIN a := 2 + 3; WRITE a; END");
        assert!(!diags.has_errors());
        assert_well_formed(&ir);
        assert_eq!(ir.blocks.len(), 1);
        let instrs = &ir.blocks[0].instrs;
        assert!(matches!(instrs[0], Instr::Binary { op: ArithOp::Add, .. }));
        assert!(matches!(instrs[1], Instr::Move { .. }));
        assert!(matches!(instrs[2], Instr::Put { .. }));
        assert!(matches!(instrs[3], Instr::Halt));
    }

    #[test]
    fn while_loop_shape() {
        let (ir, diags) =
            lower_source("DECLARE x BEGIN x := 3; WHILE x > 0 DO x := x - 1; ENDWHILE END");
        assert!(!diags.has_errors());
        assert_well_formed(&ir);
        // entry, head, body, after
        assert_eq!(ir.blocks.len(), 4);
        let head = &ir.blocks[1];
        assert!(matches!(
            head.terminator(),
            Some(Instr::Branch { op: RelOp::Gt, .. })
        ));
        // Body jumps back to the head.
        assert_eq!(ir.blocks[2].successors(), vec![BlockId(1)]);
    }

    #[test]
    fn for_loop_uses_hidden_counter() {
        let (ir, diags) = lower_source(
            "DECLARE sum BEGIN sum := 0; FOR i FROM 1 TO 5 DO sum := sum + i; ENDFOR WRITE sum; END",
        );
        assert!(!diags.has_errors());
        assert_well_formed(&ir);
        let counter = ir
            .symbols
            .iter()
            .find(|(_, s)| s.name == "_i")
            .map(|(id, _)| id)
            .expect("hidden counter not created");
        // The loop head tests the counter against zero.
        let tested = ir.blocks.iter().any(|b| {
            matches!(
                b.terminator(),
                Some(Instr::Branch { op: RelOp::Eq, left: Operand::Name(id), .. }) if *id == counter
            )
        });
        assert!(tested, "loop head does not test the down-counter");
    }

    #[test]
    fn iterator_is_immutable_and_scoped() {
        let (_, diags) =
            lower_source("BEGIN FOR i FROM 1 TO 3 DO i := 0; ENDFOR END");
        assert!(diags.has_errors());
        assert_eq!(diags.entries()[0].kind, DiagnosticKind::IteratorAssignment);

        // The iterator name is free again after the loop.
        let (_, diags) = lower_source(
            "BEGIN FOR i FROM 1 TO 3 DO WRITE i; ENDFOR FOR i FROM 1 TO 3 DO WRITE i; ENDFOR END",
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn undeclared_and_shape_errors() {
        let (_, diags) = lower_source("BEGIN x := 1; END");
        assert_eq!(diags.entries()[0].kind, DiagnosticKind::Undeclared);

        let (_, diags) = lower_source("DECLARE a BEGIN a(3) := 1; END");
        assert_eq!(diags.entries()[0].kind, DiagnosticKind::NotAnArray);

        let (_, diags) = lower_source("DECLARE t(1:5) BEGIN t := 1; END");
        assert_eq!(diags.entries()[0].kind, DiagnosticKind::NotAVariable);

        let (_, diags) = lower_source("DECLARE t(5:1) BEGIN t(2) := 1; END");
        assert_eq!(diags.entries()[0].kind, DiagnosticKind::BadArrayBounds);

        // In-range bounds whose span exceeds the addressable word count.
        let (_, diags) = lower_source(
            "DECLARE t(-9223372036854775808:9223372036854775807) BEGIN READ t(0); END",
        );
        assert_eq!(diags.entries()[0].kind, DiagnosticKind::BadArrayBounds);
    }

    #[test]
    fn literal_range_check() {
        let (_, diags) = lower_source("DECLARE a BEGIN a := 9223372036854775808; END");
        assert!(diags
            .entries()
            .iter()
            .any(|d| d.kind == DiagnosticKind::LiteralRange));

        // Both ends of the signed 64-bit range are themselves legal.
        let (_, diags) = lower_source(
            "DECLARE a, t(-5:5) BEGIN a := 9223372036854775807; READ t(-9223372036854775808); END",
        );
        assert!(diags
            .entries()
            .iter()
            .all(|d| d.kind != DiagnosticKind::LiteralRange));
    }

    #[test]
    fn temps_are_assigned_once() {
        let (ir, _) = lower_source(
            "DECLARE a, b BEGIN READ a; READ b; WRITE a + b * a; WRITE a - b; END",
        );
        let mut seen = std::collections::HashSet::new();
        for block in &ir.blocks {
            for ins in &block.instrs {
                if let Some(Operand::Temp(id)) = ins.defined() {
                    assert!(seen.insert(*id), "temp t{} defined twice", id);
                }
            }
        }
    }
}
