use crate::bytecode::ir::ModuleBc;
use crate::bytecode::op::Op;

#[derive(Debug)]
pub struct CheckError {
    pub message: String,
}

impl CheckError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bytecode error: {}", self.message)
    }
}

impl std::error::Error for CheckError {}

/// Verifies the well-formedness invariants of a module: every opcode is
/// known, every instruction has its operands, every const/global/local
/// index is in range, and every jump target lies within `[0, len]` of its
/// own code array.
///
/// A linear scan is enough — all the checked properties are per
/// instruction. The VM runs this before executing a module.
pub fn check_module(module: &ModuleBc) -> Result<(), CheckError> {
    check_code("entry", &module.entry, 0, module)?;

    let mut names: Vec<_> = module.functions.keys().collect();
    names.sort();
    for name in names {
        let function = &module.functions[name];
        check_code(name, &function.code, function.n_locals, module)?;
    }

    Ok(())
}

fn check_code(
    name: &str,
    code: &[u32],
    n_locals: usize,
    module: &ModuleBc,
) -> Result<(), CheckError> {
    let mut ip = 0;

    while ip < code.len() {
        let raw = code[ip];
        let op = Op::from_u32(raw)
            .ok_or_else(|| CheckError::new(format!("{}: unknown opcode {} at {}", name, raw, ip)))?;

        let operands = op.operand_count();
        if ip + operands >= code.len() && operands > 0 {
            return Err(CheckError::new(format!(
                "{}: truncated {} at {} (missing operands)",
                name,
                op.mnemonic(),
                ip
            )));
        }

        match op {
            Op::Const | Op::CallName => {
                let k = code[ip + 1] as usize;
                if k >= module.consts.len() {
                    return Err(CheckError::new(format!(
                        "{}: constant index {} out of range at {}",
                        name, k, ip
                    )));
                }
            }
            Op::LoadGlobal | Op::StoreGlobal => {
                let i = code[ip + 1] as usize;
                if i >= module.globals.len() {
                    return Err(CheckError::new(format!(
                        "{}: global index {} out of range at {}",
                        name, i, ip
                    )));
                }
            }
            Op::LoadLocal | Op::StoreLocal => {
                let i = code[ip + 1] as usize;
                if i >= n_locals {
                    return Err(CheckError::new(format!(
                        "{}: local slot {} out of range at {} (n_locals = {})",
                        name, i, ip, n_locals
                    )));
                }
            }
            Op::Jmp | Op::JmpIfFalse => {
                let target = code[ip + 1] as usize;
                if target > code.len() {
                    return Err(CheckError::new(format!(
                        "{}: jump target {} out of range at {} (len = {})",
                        name,
                        target,
                        ip,
                        code.len()
                    )));
                }
            }
            _ => {}
        }

        ip += 1 + operands;
    }

    Ok(())
}
