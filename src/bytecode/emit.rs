use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::bytecode::emit_error::CgError;
use crate::bytecode::ir::{FnBc, ModuleBc};
use crate::bytecode::op::Op;
use crate::lang::ast::{BinaryOp, Expr, Stmt, UnaryOp};
use crate::lang::program::Program;
use crate::lang::value::Value;

/// Constant name used for calls whose callee is not a plain identifier.
/// The VM finds the real callee name on the stack beneath the arguments.
pub const DYNAMIC_CALL_SENTINEL: &str = "__call_dynamic";

/// Written at forward-jump sites, overwritten by `patch_jump`. Any
/// surviving placeholder fails the bytecode checker (it cannot be a valid
/// address).
const PATCH_PLACEHOLDER: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Symbol {
    index: u32,
    is_const: bool,
}

/// One scope's symbols with dense slot assignment in definition order.
#[derive(Debug, Default)]
struct Scope {
    symbols: HashMap<String, Symbol>,
    next: u32,
}

impl Scope {
    fn get(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).copied()
    }

    fn define(&mut self, name: &str, is_const: bool) -> Symbol {
        let sym = Symbol {
            index: self.next,
            is_const,
        };
        self.symbols.insert(name.to_string(), sym);
        self.next += 1;
        sym
    }
}

/// Interning key: a pure function of value identity as observable by the
/// language. Scalars key by value, arrays by a hash of their serialized
/// form.
#[derive(Debug, PartialEq, Eq, Hash)]
enum ConstKey {
    Null,
    True,
    False,
    Int(i64),
    Float(u64),
    Str(String),
    Array(u64),
}

impl ConstKey {
    fn of(value: &Value) -> ConstKey {
        match value {
            Value::Null => ConstKey::Null,
            Value::Bool(true) => ConstKey::True,
            Value::Bool(false) => ConstKey::False,
            Value::Int(n) => ConstKey::Int(*n),
            Value::Float(n) => ConstKey::Float(n.to_bits()),
            Value::Str(s) => ConstKey::Str(s.clone()),
            Value::Array(_) => {
                let serialized = serde_json::to_string(value).unwrap_or_default();
                let mut hasher = DefaultHasher::new();
                serialized.hash(&mut hasher);
                ConstKey::Array(hasher.finish())
            }
        }
    }
}

/// Lowers a parsed program to a bytecode module.
///
/// Passes over the root statement list:
/// 1. pre-register every `FunDecl` (descending into blocks, if arms and
///    loop bodies) as a const global — this is what makes forward and
///    cross-include references work;
/// 2. pre-register top-level `let`/`const` names, so functions emitted
///    next can reach them regardless of textual order;
/// 3. emit each function in discovery order with a fresh local scope;
/// 4. emit the entry, skipping `FunDecl`s, and terminate with `HALT`.
pub struct Emitter {
    consts: Vec<Value>,
    const_keys: HashMap<ConstKey, u32>,
    globals: Scope,
    functions: HashMap<String, FnBc>,
    /// Per-function scope, swapped in for the duration of a body.
    locals: Option<Scope>,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Emitter {
            consts: Vec::new(),
            const_keys: HashMap::new(),
            globals: Scope::default(),
            functions: HashMap::new(),
            locals: None,
        }
    }

    pub fn emit(mut self, program: &Program) -> Result<ModuleBc, CgError> {
        // Pass 1: hoist function names.
        let mut pending = Vec::new();
        for stmt in &program.stmts {
            self.register_functions(stmt, &mut pending)?;
        }

        // Pass 2: top-level variable names, so function bodies can use
        // them no matter where the declaration sits.
        for stmt in &program.stmts {
            self.register_globals(stmt)?;
        }

        // Pass 3: function bodies, in discovery order.
        for (name, params, body) in pending {
            let compiled = self.emit_function(&params, &body)?;
            self.functions.insert(name, compiled);
        }

        // Pass 4: the entry.
        let mut entry = Vec::new();
        for stmt in &program.stmts {
            self.emit_stmt(stmt, &mut entry)?;
        }
        entry.push(Op::Halt as u32);

        let globals = self
            .globals
            .symbols
            .into_iter()
            .map(|(name, sym)| (name, sym.index))
            .collect();

        Ok(ModuleBc {
            consts: self.consts,
            globals,
            functions: self.functions,
            entry,
        })
    }

    // ------------------------------------------------------------------
    // Registration walks
    // ------------------------------------------------------------------

    fn register_functions(
        &mut self,
        stmt: &Stmt,
        pending: &mut Vec<(String, Vec<String>, Vec<Stmt>)>,
    ) -> Result<(), CgError> {
        match stmt {
            Stmt::FunDecl { name, params, body } => {
                if self.globals.get(name).is_some() {
                    return Err(CgError::duplicate_global(name));
                }
                self.globals.define(name, true);
                pending.push((name.clone(), params.clone(), body.clone()));
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.register_functions(s, pending)?;
                }
            }
            Stmt::If { then, alt, .. } => {
                self.register_functions(then, pending)?;
                if let Some(alt) = alt {
                    self.register_functions(alt, pending)?;
                }
            }
            Stmt::While { body, .. } => self.register_functions(body, pending)?,
            Stmt::For { body, .. } => self.register_functions(body, pending)?,
            _ => {}
        }
        Ok(())
    }

    fn register_globals(&mut self, stmt: &Stmt) -> Result<(), CgError> {
        match stmt {
            Stmt::Let { name, .. } => match self.globals.get(name) {
                // Re-declaring a const or function name is a collision;
                // a plain re-`let` reuses the slot.
                Some(sym) if sym.is_const => return Err(CgError::duplicate_global(name)),
                Some(_) => {}
                None => {
                    self.globals.define(name, false);
                }
            },
            Stmt::Const { name, .. } => {
                if self.globals.get(name).is_some() {
                    return Err(CgError::duplicate_global(name));
                }
                self.globals.define(name, true);
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.register_globals(s)?;
                }
            }
            Stmt::If { then, alt, .. } => {
                self.register_globals(then)?;
                if let Some(alt) = alt {
                    self.register_globals(alt)?;
                }
            }
            Stmt::While { body, .. } => self.register_globals(body)?,
            Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    self.register_globals(init)?;
                }
                self.register_globals(body)?;
            }
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Function and statement emission
    // ------------------------------------------------------------------

    fn emit_function(&mut self, params: &[String], body: &[Stmt]) -> Result<FnBc, CgError> {
        let mut scope = Scope::default();
        for param in params {
            scope.define(param, false);
        }
        self.locals = Some(scope);

        let mut code = Vec::new();
        let mut result = Ok(());
        for stmt in body {
            result = self.emit_stmt(stmt, &mut code);
            if result.is_err() {
                break;
            }
        }

        // Restore the outer (global-only) scope before propagating.
        let scope = self.locals.take();
        result?;

        // Every function returns, explicit `return` or not.
        let k = self.intern(Value::Null);
        code.push(Op::Const as u32);
        code.push(k);
        code.push(Op::Ret as u32);

        Ok(FnBc {
            code,
            n_locals: scope.map(|s| s.next as usize).unwrap_or(0),
        })
    }

    fn emit_stmt(&mut self, stmt: &Stmt, code: &mut Vec<u32>) -> Result<(), CgError> {
        match stmt {
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.emit_stmt(s, code)?;
                }
            }

            Stmt::Let { name, init } => {
                match init {
                    Some(expr) => self.emit_expr(expr, code)?,
                    None => {
                        let k = self.intern(Value::Null);
                        code.push(Op::Const as u32);
                        code.push(k);
                    }
                }
                let (op, index) = self.declare_variable(name, false)?;
                code.push(op as u32);
                code.push(index);
                code.push(Op::Pop as u32);
            }

            Stmt::Const { name, init } => {
                self.emit_expr(init, code)?;
                let (op, index) = self.declare_variable(name, true)?;
                code.push(op as u32);
                code.push(index);
                code.push(Op::Pop as u32);
            }

            Stmt::Expr(expr) => {
                self.emit_expr(expr, code)?;
                code.push(Op::Pop as u32);
            }

            Stmt::If { cond, then, alt } => {
                // JMP_IF_FALSE keeps the condition on the stack, so both
                // the fall-through and the target pop it explicitly.
                self.emit_expr(cond, code)?;
                let jump_false = self.emit_jump(code, Op::JmpIfFalse);
                code.push(Op::Pop as u32);
                self.emit_stmt(then, code)?;
                let jump_end = self.emit_jump(code, Op::Jmp);
                self.patch_jump(code, jump_false);
                code.push(Op::Pop as u32);
                if let Some(alt) = alt {
                    self.emit_stmt(alt, code)?;
                }
                self.patch_jump(code, jump_end);
            }

            Stmt::While { cond, body } => {
                let start = code.len() as u32;
                self.emit_expr(cond, code)?;
                let exit = self.emit_jump(code, Op::JmpIfFalse);
                code.push(Op::Pop as u32);
                self.emit_stmt(body, code)?;
                code.push(Op::Jmp as u32);
                code.push(start);
                self.patch_jump(code, exit);
                code.push(Op::Pop as u32);
            }

            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.emit_stmt(init, code)?;
                }
                let start = code.len() as u32;
                match cond {
                    Some(cond) => self.emit_expr(cond, code)?,
                    None => {
                        let k = self.intern(Value::Bool(true));
                        code.push(Op::Const as u32);
                        code.push(k);
                    }
                }
                let exit = self.emit_jump(code, Op::JmpIfFalse);
                code.push(Op::Pop as u32);
                self.emit_stmt(body, code)?;
                if let Some(step) = step {
                    self.emit_expr(step, code)?;
                    code.push(Op::Pop as u32);
                }
                code.push(Op::Jmp as u32);
                code.push(start);
                self.patch_jump(code, exit);
                code.push(Op::Pop as u32);
            }

            Stmt::Return(value) => {
                if self.locals.is_none() {
                    return Err(CgError::ReturnOutsideFunction);
                }
                match value {
                    Some(expr) => self.emit_expr(expr, code)?,
                    None => {
                        let k = self.intern(Value::Null);
                        code.push(Op::Const as u32);
                        code.push(k);
                    }
                }
                code.push(Op::Ret as u32);
            }

            Stmt::FunDecl { name, .. } => {
                if self.locals.is_some() {
                    return Err(CgError::nested_function(name));
                }
                // Top-level declarations were pre-registered and compiled;
                // nothing to emit in the entry.
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expression emission
    // ------------------------------------------------------------------

    fn emit_expr(&mut self, expr: &Expr, code: &mut Vec<u32>) -> Result<(), CgError> {
        match expr {
            Expr::Ident(name) => {
                let (op, index) = self.resolve_load(name)?;
                code.push(op as u32);
                code.push(index);
            }

            Expr::Number(raw) => {
                let value = parse_number(raw)?;
                let k = self.intern(value);
                code.push(Op::Const as u32);
                code.push(k);
            }

            Expr::Str(text) => {
                let k = self.intern(Value::Str(text.clone()));
                code.push(Op::Const as u32);
                code.push(k);
            }

            Expr::Bool(b) => {
                let k = self.intern(Value::Bool(*b));
                code.push(Op::Const as u32);
                code.push(k);
            }

            Expr::Null => {
                let k = self.intern(Value::Null);
                code.push(Op::Const as u32);
                code.push(k);
            }

            Expr::Array(elements) => {
                for element in elements {
                    self.emit_expr(element, code)?;
                }
                code.push(Op::ArrayNew as u32);
                code.push(elements.len() as u32);
            }

            Expr::Index { array, index } => {
                self.emit_expr(array, code)?;
                self.emit_expr(index, code)?;
                code.push(Op::ArrayGet as u32);
            }

            Expr::Unary { op, operand } => {
                self.emit_expr(operand, code)?;
                let op = match op {
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Not => Op::Not,
                };
                code.push(op as u32);
            }

            Expr::Binary { op, lhs, rhs } => match op {
                // a && b: a falsy short-circuits with a as the result.
                BinaryOp::And => {
                    self.emit_expr(lhs, code)?;
                    let end = self.emit_jump(code, Op::JmpIfFalse);
                    code.push(Op::Pop as u32);
                    self.emit_expr(rhs, code)?;
                    self.patch_jump(code, end);
                }
                // a || b: a truthy short-circuits with a as the result.
                BinaryOp::Or => {
                    self.emit_expr(lhs, code)?;
                    let falsy = self.emit_jump(code, Op::JmpIfFalse);
                    let end = self.emit_jump(code, Op::Jmp);
                    self.patch_jump(code, falsy);
                    code.push(Op::Pop as u32);
                    self.emit_expr(rhs, code)?;
                    self.patch_jump(code, end);
                }
                _ => {
                    self.emit_expr(lhs, code)?;
                    self.emit_expr(rhs, code)?;
                    let op = match op {
                        BinaryOp::Add => Op::Add,
                        BinaryOp::Sub => Op::Sub,
                        BinaryOp::Mul => Op::Mul,
                        BinaryOp::Div => Op::Div,
                        BinaryOp::Mod => Op::Mod,
                        BinaryOp::Eq => Op::Eq,
                        BinaryOp::NotEq => Op::Ne,
                        BinaryOp::Lt => Op::Lt,
                        BinaryOp::LtEq => Op::Le,
                        BinaryOp::Gt => Op::Gt,
                        BinaryOp::GtEq => Op::Ge,
                        BinaryOp::And | BinaryOp::Or => {
                            return Err(CgError::internal("short-circuit op in plain lowering"));
                        }
                    };
                    code.push(op as u32);
                }
            },

            Expr::Assign { target, value } => {
                self.emit_assign(target, value, code)?;
            }

            Expr::Call { callee, args } => {
                self.emit_call(callee, args, code)?;
            }
        }
        Ok(())
    }

    /// Lowers assignment. The stored value stays on the stack as the
    /// expression's result; statement contexts pop it.
    fn emit_assign(
        &mut self,
        target: &Expr,
        value: &Expr,
        code: &mut Vec<u32>,
    ) -> Result<(), CgError> {
        match target {
            Expr::Ident(name) => {
                self.emit_expr(value, code)?;
                let (op, index) = self.resolve_store(name)?;
                code.push(op as u32);
                code.push(index);
            }

            Expr::Index { array, index } => {
                // Arrays are values: write the element, then store the
                // updated array back into the slot it came from. Only a
                // plain mutable identifier can be that slot.
                let base = match array.as_ref() {
                    Expr::Ident(name) => name,
                    _ => {
                        return Err(CgError::invalid_assign_target(
                            "indexed assignment requires a plain variable base",
                        ));
                    }
                };
                let (load_op, load_index) = self.resolve_load(base)?;
                let (store_op, store_index) = self.resolve_store(base)?;

                code.push(load_op as u32);
                code.push(load_index);
                self.emit_expr(index, code)?;
                self.emit_expr(value, code)?;
                code.push(Op::ArraySet as u32);
                // [rhs, updated-array]: store the array, drop it, keep rhs.
                code.push(store_op as u32);
                code.push(store_index);
                code.push(Op::Pop as u32);
            }

            _ => {
                return Err(CgError::invalid_assign_target(
                    "only identifiers and indexed identifiers are assignable",
                ));
            }
        }
        Ok(())
    }

    fn emit_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        code: &mut Vec<u32>,
    ) -> Result<(), CgError> {
        match callee {
            // The common print(x) form gets the dedicated opcode; other
            // arities go through the builtin dispatch in CALL_NAME.
            Expr::Ident(name) if name == "print" && args.len() == 1 => {
                self.emit_expr(&args[0], code)?;
                code.push(Op::Print as u32);
            }

            Expr::Ident(name) => {
                let k = self.intern(Value::Str(name.clone()));
                for arg in args {
                    self.emit_expr(arg, code)?;
                }
                code.push(Op::CallName as u32);
                code.push(k);
                code.push(args.len() as u32);
            }

            // Dynamic callee: its name value sits beneath the arguments.
            _ => {
                self.emit_expr(callee, code)?;
                let k = self.intern(Value::Str(DYNAMIC_CALL_SENTINEL.to_string()));
                for arg in args {
                    self.emit_expr(arg, code)?;
                }
                code.push(Op::CallName as u32);
                code.push(k);
                code.push(args.len() as u32);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Name resolution
    // ------------------------------------------------------------------

    fn resolve_load(&self, name: &str) -> Result<(Op, u32), CgError> {
        if let Some(scope) = &self.locals {
            if let Some(sym) = scope.get(name) {
                return Ok((Op::LoadLocal, sym.index));
            }
        }
        if let Some(sym) = self.globals.get(name) {
            return Ok((Op::LoadGlobal, sym.index));
        }
        Err(CgError::undefined_variable(name))
    }

    fn resolve_store(&self, name: &str) -> Result<(Op, u32), CgError> {
        if let Some(scope) = &self.locals {
            if let Some(sym) = scope.get(name) {
                if sym.is_const {
                    return Err(CgError::assign_to_const(name));
                }
                return Ok((Op::StoreLocal, sym.index));
            }
        }
        if let Some(sym) = self.globals.get(name) {
            if sym.is_const {
                return Err(CgError::assign_to_const(name));
            }
            return Ok((Op::StoreGlobal, sym.index));
        }
        Err(CgError::undefined_variable(name))
    }

    /// Resolves the slot a `let`/`const` declaration stores into. Globals
    /// were pre-registered; locals are defined here, in definition order.
    fn declare_variable(&mut self, name: &str, is_const: bool) -> Result<(Op, u32), CgError> {
        if let Some(scope) = self.locals.as_mut() {
            return match scope.get(name) {
                Some(sym) if sym.is_const || is_const => Err(CgError::duplicate_global(name)),
                Some(sym) => Ok((Op::StoreLocal, sym.index)),
                None => {
                    let sym = scope.define(name, is_const);
                    Ok((Op::StoreLocal, sym.index))
                }
            };
        }

        match self.globals.get(name) {
            Some(sym) => Ok((Op::StoreGlobal, sym.index)),
            None => Err(CgError::internal(format!(
                "global '{}' missing from registration pass",
                name
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Jump patching and interning
    // ------------------------------------------------------------------

    /// Emits a jump with a placeholder operand; returns the patch site.
    fn emit_jump(&mut self, code: &mut Vec<u32>, op: Op) -> usize {
        code.push(op as u32);
        code.push(PATCH_PLACEHOLDER);
        code.len() - 1
    }

    /// Points a recorded patch site at the current end of code.
    fn patch_jump(&mut self, code: &mut [u32], site: usize) {
        code[site] = code.len() as u32;
    }

    /// Interns a value into the constant pool, collapsing equal values.
    fn intern(&mut self, value: Value) -> u32 {
        let key = ConstKey::of(&value);
        if let Some(&index) = self.const_keys.get(&key) {
            return index;
        }
        let index = self.consts.len() as u32;
        self.consts.push(value);
        self.const_keys.insert(key, index);
        index
    }
}

fn parse_number(raw: &str) -> Result<Value, CgError> {
    if raw.contains('.') {
        raw.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| CgError::bad_number(raw))
    } else {
        raw.parse::<i64>()
            .map(Value::Int)
            .map_err(|_| CgError::bad_number(raw))
    }
}
