//! Three-address intermediate representation.
//!
//! A program is a list of [`BasicBlock`]s; blocks reference each other by
//! index ([`BlockId`]) so the control-flow graph carries no reference cycles.
//! The first block in the list is the entry.

use super::symbol_table::{SymId, SymbolTable};
use num_bigint::BigInt;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// An instruction operand.  Equality is structural; operands key hash maps
/// throughout the analyses and the register allocator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operand {
    Const(BigInt),
    Name(SymId),
    Temp(usize),
}

impl Operand {
    pub fn imm(v: u64) -> Self {
        Operand::Const(BigInt::from(v))
    }

    pub fn as_const(&self) -> Option<&BigInt> {
        match self {
            Operand::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_name(&self) -> bool {
        matches!(self, Operand::Name(_))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(v) => write!(f, "{v}"),
            Operand::Name(id) => write!(f, "@{}", id.0),
            Operand::Temp(id) => write!(f, "t{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelOp::Eq => "=",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Gt => ">",
            RelOp::Le => "<=",
            RelOp::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

/// A three-address quadruple.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Move {
        src: Operand,
        dst: Operand,
    },
    /// Read an integer from standard input into `dst`.
    Get {
        dst: Operand,
    },
    /// Write `src` to standard output.
    Put {
        src: Operand,
    },
    /// `dst ← base[index]` where `base` is an array symbol.
    Load {
        base: SymId,
        index: Operand,
        dst: Operand,
    },
    /// `base[index] ← src`.
    Store {
        src: Operand,
        base: SymId,
        index: Operand,
    },
    Binary {
        op: ArithOp,
        left: Operand,
        right: Operand,
        dst: Operand,
    },
    Jump {
        target: BlockId,
    },
    Branch {
        op: RelOp,
        left: Operand,
        right: Operand,
        if_true: BlockId,
        if_false: BlockId,
    },
    Halt,
}

impl Instr {
    /// The operand written by this instruction, if any.
    pub fn defined(&self) -> Option<&Operand> {
        match self {
            Instr::Move { dst, .. }
            | Instr::Get { dst }
            | Instr::Load { dst, .. }
            | Instr::Binary { dst, .. } => Some(dst),
            Instr::Put { .. }
            | Instr::Store { .. }
            | Instr::Jump { .. }
            | Instr::Branch { .. }
            | Instr::Halt => None,
        }
    }

    /// The operands read by this instruction.
    pub fn uses(&self) -> Vec<&Operand> {
        match self {
            Instr::Move { src, .. } | Instr::Put { src } => vec![src],
            Instr::Get { .. } => Vec::new(),
            Instr::Load { index, .. } => vec![index],
            Instr::Store { src, index, .. } => vec![src, index],
            Instr::Binary { left, right, .. } => vec![left, right],
            Instr::Branch { left, right, .. } => vec![left, right],
            Instr::Jump { .. } | Instr::Halt => Vec::new(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instr::Jump { .. } | Instr::Branch { .. } | Instr::Halt
        )
    }

    /// Control-flow successors contributed by this instruction.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Instr::Jump { target } => vec![*target],
            Instr::Branch {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            _ => Vec::new(),
        }
    }
}

/// A labelled straight-line instruction sequence ending in one terminator.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub instrs: Vec<Instr>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instrs: Vec::new(),
        }
    }

    pub fn terminator(&self) -> Option<&Instr> {
        self.instrs.last().filter(|i| i.is_terminator())
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator().map(|t| t.successors()).unwrap_or_default()
    }
}

/// The whole program in IR form.  Block 0 is the entry.
#[derive(Debug, Clone)]
pub struct ProgramIr {
    pub blocks: Vec<BasicBlock>,
    pub symbols: SymbolTable,
    pub temp_count: usize,
}

impl ProgramIr {
    /// Human-readable dump, one instruction per line.
    pub fn to_lines(&self) -> Vec<String> {
        let name = |op: &Operand| -> String {
            match op {
                Operand::Name(id) => self.symbols.get(*id).name.clone(),
                other => other.to_string(),
            }
        };
        let mut out = Vec::new();
        for block in &self.blocks {
            out.push(format!("{}:", block.label));
            for ins in &block.instrs {
                let line = match ins {
                    Instr::Move { src, dst } => format!("  {} = {}", name(dst), name(src)),
                    Instr::Get { dst } => format!("  {} = GET", name(dst)),
                    Instr::Put { src } => format!("  PUT {}", name(src)),
                    Instr::Load { base, index, dst } => format!(
                        "  {} = {}[{}]",
                        name(dst),
                        self.symbols.get(*base).name,
                        name(index)
                    ),
                    Instr::Store { src, base, index } => format!(
                        "  {}[{}] = {}",
                        self.symbols.get(*base).name,
                        name(index),
                        name(src)
                    ),
                    Instr::Binary {
                        op,
                        left,
                        right,
                        dst,
                    } => format!("  {} = {} {} {}", name(dst), name(left), op, name(right)),
                    Instr::Jump { target } => {
                        format!("  GOTO {}", self.blocks[target.0].label)
                    }
                    Instr::Branch {
                        op,
                        left,
                        right,
                        if_true,
                        if_false,
                    } => format!(
                        "  if {} {} {} GOTO {} else {}",
                        name(left),
                        op,
                        name(right),
                        self.blocks[if_true.0].label,
                        self.blocks[if_false.0].label
                    ),
                    Instr::Halt => "  HALT".to_string(),
                };
                out.push(line);
            }
        }
        out
    }
}
