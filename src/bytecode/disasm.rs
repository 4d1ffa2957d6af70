use crate::bytecode::ir::ModuleBc;
use crate::bytecode::op::Op;

/// Print a disassembly of a bytecode module.
pub fn print_bc(module: &ModuleBc) {
    print!("{}", disassemble(module));
}

/// Renders the whole module: the entry first, then functions sorted by
/// name. Returned as a string so the format stays testable.
pub fn disassemble(module: &ModuleBc) -> String {
    let mut out = String::new();

    render_code(&mut out, "entry", &module.entry, 0, module);

    let mut names: Vec<_> = module.functions.keys().collect();
    names.sort();
    for name in names {
        let function = &module.functions[name];
        let header = format!("{} ({} locals)", name, function.n_locals);
        render_code(&mut out, &header, &function.code, function.n_locals, module);
    }

    out
}

fn render_code(out: &mut String, name: &str, code: &[u32], _n_locals: usize, module: &ModuleBc) {
    out.push_str("════════════════════════════════════════\n");
    out.push_str(&format!(" {}\n", name));
    out.push_str("════════════════════════════════════════\n");

    let targets = collect_jump_targets(code);

    let mut ip = 0;
    while ip < code.len() {
        let marker = if targets.contains(&ip) { "► " } else { "  " };

        let op = match Op::from_u32(code[ip]) {
            Some(op) => op,
            None => {
                out.push_str(&format!("{:04} {}?? {}\n", ip, marker, code[ip]));
                ip += 1;
                continue;
            }
        };

        let operands = op.operand_count();
        if ip + operands >= code.len() && operands > 0 {
            out.push_str(&format!("{:04} {}{} <truncated>\n", ip, marker, op.mnemonic()));
            break;
        }

        let mut line = format!("{:04} {}{:<14}", ip, marker, op.mnemonic());
        for n in 0..operands {
            line.push_str(&format!(" {}", code[ip + 1 + n]));
        }
        if let Some(note) = annotate(op, code, ip, module) {
            line.push_str(&format!("   ; {}", note));
        }
        line.push('\n');
        out.push_str(&line);

        ip += 1 + operands;
    }

    out.push('\n');
}

fn collect_jump_targets(code: &[u32]) -> Vec<usize> {
    let mut targets = Vec::new();
    let mut ip = 0;

    while ip < code.len() {
        let op = match Op::from_u32(code[ip]) {
            Some(op) => op,
            None => {
                ip += 1;
                continue;
            }
        };
        let operands = op.operand_count();
        if ip + operands >= code.len() && operands > 0 {
            break;
        }
        if matches!(op, Op::Jmp | Op::JmpIfFalse) {
            let target = code[ip + 1] as usize;
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        ip += 1 + operands;
    }

    targets
}

fn annotate(op: Op, code: &[u32], ip: usize, module: &ModuleBc) -> Option<String> {
    match op {
        Op::Const => {
            let k = code[ip + 1] as usize;
            module.consts.get(k).map(|v| format!("{:?}", v))
        }
        Op::CallName => {
            let k = code[ip + 1] as usize;
            let argc = code[ip + 2];
            module
                .consts
                .get(k)
                .map(|v| format!("{} argc={}", v, argc))
        }
        Op::LoadGlobal | Op::StoreGlobal => {
            let i = code[ip + 1];
            module
                .globals
                .iter()
                .find(|(_, index)| **index == i)
                .map(|(name, _)| name.clone())
        }
        _ => None,
    }
}
