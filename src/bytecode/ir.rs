use std::collections::HashMap;

use crate::lang::value::Value;

/// A compiled bytecode module: the sole input to the VM. Never persisted;
/// re-execution of the same module is fine.
#[derive(Debug, Clone)]
pub struct ModuleBc {
    /// Interned constants, deduplicated by value identity.
    pub consts: Vec<Value>,

    /// Global name → slot index. The names are kept for debugging and
    /// disassembly only; the VM just allocates `globals.len()` slots,
    /// all initialized to null.
    pub globals: HashMap<String, u32>,

    /// Compiled functions by name.
    pub functions: HashMap<String, FnBc>,

    /// Top-level code, terminated by `HALT`.
    pub entry: Vec<u32>,
}

/// A single compiled function.
#[derive(Debug, Clone)]
pub struct FnBc {
    pub code: Vec<u32>,

    /// Declared local slot count; parameters occupy the first slots.
    pub n_locals: usize,
}
