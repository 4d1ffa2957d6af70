pub mod check;
pub mod disasm;
pub mod emit;
pub mod emit_error;
pub mod ir;
pub mod op;

pub use ir::{FnBc, ModuleBc};
pub use op::Op;
