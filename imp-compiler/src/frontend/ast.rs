use crate::ir::{ArithOp, RelOp};
use num_bigint::BigInt;

#[derive(Debug, Clone)]
pub struct Program {
    pub decls: Vec<Decl>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Var {
        name: String,
        line: usize,
        col: usize,
    },
    Array {
        name: String,
        lo: i64,
        hi: i64,
        line: usize,
        col: usize,
    },
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Assign {
        target: Target,
        value: Expr,
    },
    If {
        cond: Cond,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        cond: Cond,
        body: Vec<Stmt>,
    },
    Repeat {
        body: Vec<Stmt>,
        cond: Cond,
    },
    For {
        var: String,
        from: Expr,
        downto: bool,
        to: Expr,
        body: Vec<Stmt>,
        line: usize,
        col: usize,
    },
    Read {
        target: Target,
    },
    Write {
        value: Expr,
    },
}

/// Assignment or READ destination.
#[derive(Debug, Clone)]
pub enum Target {
    Var {
        name: String,
        line: usize,
        col: usize,
    },
    Elem {
        name: String,
        index: Box<Expr>,
        line: usize,
        col: usize,
    },
}

impl Target {
    pub fn position(&self) -> (usize, usize) {
        match self {
            Target::Var { line, col, .. } | Target::Elem { line, col, .. } => (*line, *col),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Num {
        value: BigInt,
        line: usize,
        col: usize,
    },
    Ref(Target),
    Binary {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone)]
pub struct Cond {
    pub op: RelOp,
    pub left: Expr,
    pub right: Expr,
}
