use super::ast::Stmt;

/// Parsed wick program: the ordered statement list of the root file,
/// with every `include` already spliced in as a `Block`.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}
