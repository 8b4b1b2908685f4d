pub mod ir;
pub mod lower;
pub mod opt;
pub mod symbol_table;

pub use ir::{ArithOp, BasicBlock, BlockId, Instr, Operand, ProgramIr, RelOp};
pub use symbol_table::{SymId, Symbol, SymbolKind, SymbolTable};
