use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::frontend::lexer::Lexer;
use crate::frontend::parser_error::ParseError;
use crate::frontend::token::{Span, Token, TokenKind};
use crate::lang::ast::{BinaryOp, Expr, Stmt, UnaryOp};
use crate::lang::program::Program;

/// Operator precedence, low to high. Assignment is right-associative,
/// everything else left-associative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Lowest,
    Assign,
    Or,
    And,
    Equality,
    Compare,
    Sum,
    Product,
    Prefix,
    Call,
}

fn precedence(kind: TokenKind) -> Prec {
    match kind {
        TokenKind::Assign => Prec::Assign,
        TokenKind::OrOr => Prec::Or,
        TokenKind::AndAnd => Prec::And,
        TokenKind::Eq | TokenKind::NotEq => Prec::Equality,
        TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => Prec::Compare,
        TokenKind::Plus | TokenKind::Minus => Prec::Sum,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Prec::Product,
        TokenKind::LParen | TokenKind::LBracket => Prec::Call,
        _ => Prec::Lowest,
    }
}

/// Parses a root source text into a `Program`, resolving includes along
/// the way. The root file's canonical path is seeded into the dedup set
/// so a file including itself collapses to an empty block.
pub fn parse_source(source: &str, path: &Path) -> Result<Program, ParseError> {
    let mut includes = HashSet::new();
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    includes.insert(canonical);

    let mut parser = Parser::new(source, path.to_path_buf(), &mut includes);
    parser.parse_program()
}

/// Pratt parser with two-token lookahead (`cur`, `peek`) sliding directly
/// over the lexer.
///
/// Every `parse_*` method is entered with `cur` at the first token of its
/// form and returns with `cur` at the last one. Parsing does not recover:
/// the first error aborts with the offending token's position.
///
/// The include-dedup set is threaded by mutable reference through every
/// parser of a compilation; included files are parsed by a fresh `Parser`
/// sharing it and spliced in place as a single `Block`.
pub struct Parser<'a> {
    lexer: Lexer,
    cur: Token,
    peek: Token,
    /// Directory of the file being parsed; include paths resolve here.
    dir: PathBuf,
    includes: &'a mut HashSet<PathBuf>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &str, path: PathBuf, includes: &'a mut HashSet<PathBuf>) -> Parser<'a> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut lexer = Lexer::new(source, path);
        let cur = lexer.next_token();
        let peek = lexer.next_token();

        Parser {
            lexer,
            cur,
            peek,
            dir,
            includes,
        }
    }

    fn bump(&mut self) {
        let next = self.lexer.next_token();
        self.cur = std::mem::replace(&mut self.peek, next);
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek.kind == kind
    }

    fn error_at(&self, span: &Span, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            span: span.clone(),
        }
    }

    /// Advances over `peek` when it matches, errors at `peek` otherwise.
    /// An `Illegal` token is reported as the lexical error it is.
    fn expect_peek(&mut self, kind: TokenKind, context: &str) -> Result<(), ParseError> {
        if self.peek_is(kind) {
            self.bump();
            Ok(())
        } else if self.peek_is(TokenKind::Illegal) {
            Err(self.error_at(
                &self.peek.span,
                format!("illegal token '{}'", self.peek.lexeme),
            ))
        } else {
            Err(self.error_at(
                &self.peek.span,
                format!("expected '{}' {}, found '{}'", kind, context, self.peek.kind),
            ))
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut stmts = Vec::new();

        while self.cur.kind != TokenKind::Eof {
            stmts.push(self.parse_statement()?);
            self.bump();
        }

        Ok(Program { stmts })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.cur.kind {
            TokenKind::Let => self.parse_let(),
            TokenKind::Const => self.parse_const(),
            TokenKind::Fun => self.parse_fun(),
            TokenKind::Return => self.parse_return(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block_stmts()?)),
            TokenKind::Include => self.parse_include(),
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_let(&mut self) -> Result<Stmt, ParseError> {
        self.expect_peek(TokenKind::Ident, "after 'let'")?;
        let name = self.cur.lexeme.clone();

        let init = if self.peek_is(TokenKind::Assign) {
            self.bump();
            self.bump();
            Some(self.parse_expr(Prec::Lowest)?)
        } else {
            None
        };

        self.expect_peek(TokenKind::Semicolon, "after let statement")?;
        Ok(Stmt::Let { name, init })
    }

    fn parse_const(&mut self) -> Result<Stmt, ParseError> {
        self.expect_peek(TokenKind::Ident, "after 'const'")?;
        let name = self.cur.lexeme.clone();

        self.expect_peek(TokenKind::Assign, "after const name")?;
        self.bump();
        let init = self.parse_expr(Prec::Lowest)?;

        self.expect_peek(TokenKind::Semicolon, "after const statement")?;
        Ok(Stmt::Const { name, init })
    }

    fn parse_fun(&mut self) -> Result<Stmt, ParseError> {
        self.expect_peek(TokenKind::Ident, "after 'fun'")?;
        let name = self.cur.lexeme.clone();

        self.expect_peek(TokenKind::LParen, "after function name")?;

        let mut params = Vec::new();
        if self.peek_is(TokenKind::RParen) {
            self.bump();
        } else {
            self.expect_peek(TokenKind::Ident, "in parameter list")?;
            params.push(self.cur.lexeme.clone());
            while self.peek_is(TokenKind::Comma) {
                self.bump();
                self.expect_peek(TokenKind::Ident, "in parameter list")?;
                params.push(self.cur.lexeme.clone());
            }
            self.expect_peek(TokenKind::RParen, "after parameter list")?;
        }

        self.expect_peek(TokenKind::LBrace, "before function body")?;
        let body = self.parse_block_stmts()?;

        Ok(Stmt::FunDecl { name, params, body })
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        if self.peek_is(TokenKind::Semicolon) {
            self.bump();
            return Ok(Stmt::Return(None));
        }

        self.bump();
        let value = self.parse_expr(Prec::Lowest)?;
        self.expect_peek(TokenKind::Semicolon, "after return value")?;
        Ok(Stmt::Return(Some(value)))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect_peek(TokenKind::LParen, "after 'if'")?;
        self.bump();
        let cond = self.parse_expr(Prec::Lowest)?;
        self.expect_peek(TokenKind::RParen, "after if condition")?;

        self.bump();
        let then = Box::new(self.parse_statement()?);

        let alt = if self.peek_is(TokenKind::Else) {
            self.bump();
            self.bump();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(Stmt::If { cond, then, alt })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.expect_peek(TokenKind::LParen, "after 'while'")?;
        self.bump();
        let cond = self.parse_expr(Prec::Lowest)?;
        self.expect_peek(TokenKind::RParen, "after while condition")?;

        self.bump();
        let body = Box::new(self.parse_statement()?);

        Ok(Stmt::While { cond, body })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.expect_peek(TokenKind::LParen, "after 'for'")?;

        // Each header slot may be empty. The init is a full statement
        // (a `let` or an expression statement), so it eats its own ';'.
        let init = if self.peek_is(TokenKind::Semicolon) {
            self.bump();
            None
        } else {
            self.bump();
            let stmt = match self.cur.kind {
                TokenKind::Let => self.parse_let()?,
                _ => self.parse_expr_stmt()?,
            };
            Some(Box::new(stmt))
        };

        let cond = if self.peek_is(TokenKind::Semicolon) {
            self.bump();
            None
        } else {
            self.bump();
            let cond = self.parse_expr(Prec::Lowest)?;
            self.expect_peek(TokenKind::Semicolon, "after for condition")?;
            Some(cond)
        };

        let step = if self.peek_is(TokenKind::RParen) {
            self.bump();
            None
        } else {
            self.bump();
            let step = self.parse_expr(Prec::Lowest)?;
            self.expect_peek(TokenKind::RParen, "after for step")?;
            Some(step)
        };

        self.bump();
        let body = Box::new(self.parse_statement()?);

        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    /// Parses `{ ... }` and returns the inner statements; `cur` ends on
    /// the closing brace.
    fn parse_block_stmts(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();

        while !self.peek_is(TokenKind::RBrace) {
            if self.peek_is(TokenKind::Eof) {
                return Err(self.error_at(&self.peek.span, "unexpected end of file, expected '}'"));
            }
            self.bump();
            stmts.push(self.parse_statement()?);
        }

        self.bump(); // '}'
        Ok(stmts)
    }

    fn parse_expr_stmt(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.parse_expr(Prec::Lowest)?;
        self.expect_peek(TokenKind::Semicolon, "after expression")?;
        Ok(Stmt::Expr(expr))
    }

    /// Resolves and splices an `include "path";` directive.
    ///
    /// The path is joined to the including file's directory unless
    /// absolute, then canonicalized if possible. A path already in the
    /// dedup set collapses to an empty block; a fresh one is read, parsed
    /// with a parser sharing the set, and spliced as one `Block`.
    fn parse_include(&mut self) -> Result<Stmt, ParseError> {
        self.expect_peek(TokenKind::Str, "after 'include'")?;
        let raw = self.cur.lexeme.clone();
        let at = self.cur.span.clone();
        self.expect_peek(TokenKind::Semicolon, "after include path")?;

        let wanted = Path::new(&raw);
        let joined = if wanted.is_absolute() {
            wanted.to_path_buf()
        } else {
            self.dir.join(wanted)
        };
        let canonical = joined.canonicalize().unwrap_or_else(|_| joined.clone());

        if !self.includes.insert(canonical.clone()) {
            return Ok(Stmt::Block(Vec::new()));
        }

        let source = fs::read_to_string(&canonical).map_err(|e| {
            self.error_at(&at, format!("cannot read include '{}': {}", joined.display(), e))
        })?;

        let mut sub = Parser::new(&source, canonical, &mut *self.includes);
        let program = sub.parse_program()?;
        Ok(Stmt::Block(program.stmts))
    }

    fn parse_expr(&mut self, prec: Prec) -> Result<Expr, ParseError> {
        let mut left = self.parse_prefix()?;

        // Terminators (';' ',' ')' ']' '}') all sit at `Lowest`, so the
        // loop leaves them unconsumed for the caller.
        while prec < precedence(self.peek.kind) {
            self.bump();
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        match self.cur.kind {
            TokenKind::Ident => Ok(Expr::Ident(self.cur.lexeme.clone())),
            TokenKind::Number => Ok(Expr::Number(self.cur.lexeme.clone())),
            TokenKind::Str => Ok(Expr::Str(self.cur.lexeme.clone())),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Null => Ok(Expr::Null),
            TokenKind::Minus | TokenKind::Bang => {
                let op = if self.cur.kind == TokenKind::Minus {
                    UnaryOp::Neg
                } else {
                    UnaryOp::Not
                };
                self.bump();
                let operand = Box::new(self.parse_expr(Prec::Prefix)?);
                Ok(Expr::Unary { op, operand })
            }
            TokenKind::LParen => {
                self.bump();
                let expr = self.parse_expr(Prec::Lowest)?;
                self.expect_peek(TokenKind::RParen, "after grouped expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                let elements = self.parse_expr_list(TokenKind::RBracket)?;
                Ok(Expr::Array(elements))
            }
            TokenKind::Illegal => Err(self.error_at(
                &self.cur.span,
                format!("illegal token '{}'", self.cur.lexeme),
            )),
            TokenKind::Eof => {
                Err(self.error_at(&self.cur.span, "unexpected end of file in expression"))
            }
            _ => Err(self.error_at(
                &self.cur.span,
                format!("unexpected token '{}'", self.cur.kind),
            )),
        }
    }

    fn parse_infix(&mut self, left: Expr) -> Result<Expr, ParseError> {
        match self.cur.kind {
            TokenKind::Assign => {
                // Right-associative: the whole remainder binds to the value.
                self.bump();
                let value = Box::new(self.parse_expr(Prec::Lowest)?);
                Ok(Expr::Assign {
                    target: Box::new(left),
                    value,
                })
            }
            TokenKind::LParen => {
                let args = self.parse_expr_list(TokenKind::RParen)?;
                Ok(Expr::Call {
                    callee: Box::new(left),
                    args,
                })
            }
            TokenKind::LBracket => {
                self.bump();
                let index = Box::new(self.parse_expr(Prec::Lowest)?);
                self.expect_peek(TokenKind::RBracket, "after index expression")?;
                Ok(Expr::Index {
                    array: Box::new(left),
                    index,
                })
            }
            kind => {
                let op = match kind {
                    TokenKind::Plus => BinaryOp::Add,
                    TokenKind::Minus => BinaryOp::Sub,
                    TokenKind::Star => BinaryOp::Mul,
                    TokenKind::Slash => BinaryOp::Div,
                    TokenKind::Percent => BinaryOp::Mod,
                    TokenKind::Eq => BinaryOp::Eq,
                    TokenKind::NotEq => BinaryOp::NotEq,
                    TokenKind::Lt => BinaryOp::Lt,
                    TokenKind::LtEq => BinaryOp::LtEq,
                    TokenKind::Gt => BinaryOp::Gt,
                    TokenKind::GtEq => BinaryOp::GtEq,
                    TokenKind::AndAnd => BinaryOp::And,
                    TokenKind::OrOr => BinaryOp::Or,
                    other => {
                        return Err(self.error_at(
                            &self.cur.span,
                            format!("unexpected token '{}' in expression", other),
                        ));
                    }
                };
                let prec = precedence(kind);
                self.bump();
                let rhs = Box::new(self.parse_expr(prec)?);
                Ok(Expr::Binary {
                    op,
                    lhs: Box::new(left),
                    rhs,
                })
            }
        }
    }

    /// Parses a delimited, comma-separated expression list. `cur` starts
    /// on the opening delimiter and ends on `end`.
    fn parse_expr_list(&mut self, end: TokenKind) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();

        if self.peek_is(end) {
            self.bump();
            return Ok(items);
        }

        self.bump();
        items.push(self.parse_expr(Prec::Lowest)?);

        while self.peek_is(TokenKind::Comma) {
            self.bump();
            self.bump();
            items.push(self.parse_expr(Prec::Lowest)?);
        }

        self.expect_peek(end, "at end of list")?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn parse(source: &str) -> Program {
        parse_source(source, Path::new("<test>")).unwrap()
    }

    fn parse_err(source: &str) -> ParseError {
        parse_source(source, Path::new("<test>")).unwrap_err()
    }

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.to_string())
    }

    fn num(raw: &str) -> Expr {
        Expr::Number(raw.to_string())
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    #[test]
    fn test_let_with_and_without_init() {
        let program = parse("let a = 1; let b;");
        assert_eq!(
            program.stmts,
            vec![
                Stmt::Let {
                    name: "a".to_string(),
                    init: Some(num("1")),
                },
                Stmt::Let {
                    name: "b".to_string(),
                    init: None,
                },
            ]
        );
    }

    #[test]
    fn test_const_requires_init() {
        let program = parse("const PI = 3.14;");
        assert_eq!(
            program.stmts,
            vec![Stmt::Const {
                name: "PI".to_string(),
                init: num("3.14"),
            }]
        );

        let err = parse_err("const PI;");
        assert!(err.message.contains("expected '='"), "msg: {}", err.message);
    }

    #[test]
    fn test_product_binds_tighter_than_sum() {
        let program = parse("1 + 2 * 3;");
        assert_eq!(
            program.stmts,
            vec![Stmt::Expr(binary(
                BinaryOp::Add,
                num("1"),
                binary(BinaryOp::Mul, num("2"), num("3")),
            ))]
        );
    }

    #[test]
    fn test_left_associativity() {
        let program = parse("1 - 2 - 3;");
        assert_eq!(
            program.stmts,
            vec![Stmt::Expr(binary(
                BinaryOp::Sub,
                binary(BinaryOp::Sub, num("1"), num("2")),
                num("3"),
            ))]
        );
    }

    #[test]
    fn test_comparison_and_logic_ladder() {
        // (1 + 2 < 4) == true, then && binds looser than ==
        let program = parse("1 + 2 < 4 == true && false;");
        assert_eq!(
            program.stmts,
            vec![Stmt::Expr(binary(
                BinaryOp::And,
                binary(
                    BinaryOp::Eq,
                    binary(
                        BinaryOp::Lt,
                        binary(BinaryOp::Add, num("1"), num("2")),
                        num("4"),
                    ),
                    Expr::Bool(true),
                ),
                Expr::Bool(false),
            ))]
        );
    }

    #[test]
    fn test_or_binds_looser_than_and() {
        let program = parse("a || b && c;");
        assert_eq!(
            program.stmts,
            vec![Stmt::Expr(binary(
                BinaryOp::Or,
                ident("a"),
                binary(BinaryOp::And, ident("b"), ident("c")),
            ))]
        );
    }

    #[test]
    fn test_unary_binds_tighter_than_product() {
        let program = parse("-a * !b;");
        assert_eq!(
            program.stmts,
            vec![Stmt::Expr(binary(
                BinaryOp::Mul,
                Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(ident("a")),
                },
                Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(ident("b")),
                },
            ))]
        );
    }

    #[test]
    fn test_grouping_overrides_precedence() {
        let program = parse("(1 + 2) * 3;");
        assert_eq!(
            program.stmts,
            vec![Stmt::Expr(binary(
                BinaryOp::Mul,
                binary(BinaryOp::Add, num("1"), num("2")),
                num("3"),
            ))]
        );
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let program = parse("a = b = 1;");
        assert_eq!(
            program.stmts,
            vec![Stmt::Expr(Expr::Assign {
                target: Box::new(ident("a")),
                value: Box::new(Expr::Assign {
                    target: Box::new(ident("b")),
                    value: Box::new(num("1")),
                }),
            })]
        );
    }

    #[test]
    fn test_any_expression_parses_as_assign_target() {
        // The emitter rejects this; the parser must not.
        let program = parse("f() = 1;");
        assert!(matches!(
            &program.stmts[0],
            Stmt::Expr(Expr::Assign { .. })
        ));
    }

    #[test]
    fn test_call_and_index() {
        let program = parse("f(1, g(2))[0];");
        assert_eq!(
            program.stmts,
            vec![Stmt::Expr(Expr::Index {
                array: Box::new(Expr::Call {
                    callee: Box::new(ident("f")),
                    args: vec![
                        num("1"),
                        Expr::Call {
                            callee: Box::new(ident("g")),
                            args: vec![num("2")],
                        },
                    ],
                }),
                index: Box::new(num("0")),
            })]
        );
    }

    #[test]
    fn test_chained_index() {
        let program = parse("a[0][1];");
        assert_eq!(
            program.stmts,
            vec![Stmt::Expr(Expr::Index {
                array: Box::new(Expr::Index {
                    array: Box::new(ident("a")),
                    index: Box::new(num("0")),
                }),
                index: Box::new(num("1")),
            })]
        );
    }

    #[test]
    fn test_array_literals() {
        let program = parse("[]; [1, \"two\", [true, null]];");
        assert_eq!(
            program.stmts,
            vec![
                Stmt::Expr(Expr::Array(vec![])),
                Stmt::Expr(Expr::Array(vec![
                    num("1"),
                    Expr::Str("two".to_string()),
                    Expr::Array(vec![Expr::Bool(true), Expr::Null]),
                ])),
            ]
        );
    }

    #[test]
    fn test_if_else() {
        let program = parse("if (a) b; else { c; }");
        assert_eq!(
            program.stmts,
            vec![Stmt::If {
                cond: ident("a"),
                then: Box::new(Stmt::Expr(ident("b"))),
                alt: Some(Box::new(Stmt::Block(vec![Stmt::Expr(ident("c"))]))),
            }]
        );
    }

    #[test]
    fn test_while() {
        let program = parse("while (a < 3) a = a + 1;");
        assert!(matches!(&program.stmts[0], Stmt::While { .. }));
    }

    #[test]
    fn test_for_full_header() {
        let program = parse("for (let i = 0; i < 3; i = i + 1) { print(i); }");
        match &program.stmts[0] {
            Stmt::For {
                init, cond, step, ..
            } => {
                assert!(matches!(init.as_deref(), Some(Stmt::Let { .. })));
                assert!(cond.is_some());
                assert!(step.is_some());
            }
            other => panic!("expected for statement, got {other:?}"),
        }
    }

    #[test]
    fn test_for_empty_header() {
        let program = parse("for (;;) {}");
        assert_eq!(
            program.stmts,
            vec![Stmt::For {
                init: None,
                cond: None,
                step: None,
                body: Box::new(Stmt::Block(vec![])),
            }]
        );
    }

    #[test]
    fn test_for_expression_init() {
        let program = parse("for (i = 0; i < 3;) {}");
        match &program.stmts[0] {
            Stmt::For { init, step, .. } => {
                assert!(matches!(init.as_deref(), Some(Stmt::Expr(Expr::Assign { .. }))));
                assert!(step.is_none());
            }
            other => panic!("expected for statement, got {other:?}"),
        }
    }

    #[test]
    fn test_fun_decl() {
        let program = parse("fun add(a, b) { return a + b; }");
        assert_eq!(
            program.stmts,
            vec![Stmt::FunDecl {
                name: "add".to_string(),
                params: vec!["a".to_string(), "b".to_string()],
                body: vec![Stmt::Return(Some(binary(
                    BinaryOp::Add,
                    ident("a"),
                    ident("b"),
                )))],
            }]
        );
    }

    #[test]
    fn test_fun_no_params() {
        let program = parse("fun nop() {}");
        assert_eq!(
            program.stmts,
            vec![Stmt::FunDecl {
                name: "nop".to_string(),
                params: vec![],
                body: vec![],
            }]
        );
    }

    #[test]
    fn test_return_without_value() {
        let program = parse("fun f() { return; }");
        assert_eq!(
            program.stmts,
            vec![Stmt::FunDecl {
                name: "f".to_string(),
                params: vec![],
                body: vec![Stmt::Return(None)],
            }]
        );
    }

    #[test]
    fn test_parse_determinism() {
        let src = "fun fact(n) { if (n <= 1) return 1; return n * fact(n - 1); } print(fact(5));";
        assert_eq!(parse(src), parse(src));
    }

    #[test]
    fn test_missing_semicolon_errors() {
        let err = parse_err("let a = 1");
        assert!(err.message.contains("expected ';'"), "msg: {}", err.message);
    }

    #[test]
    fn test_error_position_points_at_offender() {
        let err = parse_err("let a = 1;\nlet = 2;");
        assert_eq!(err.span.line, 2);
        assert_eq!(err.span.col, 5);
    }

    #[test]
    fn test_illegal_token_aborts() {
        let err = parse_err("let a = 1 & 2;");
        assert!(err.message.contains("illegal token '&'"), "msg: {}", err.message);
    }

    #[test]
    fn test_unterminated_block_errors_at_eof() {
        let err = parse_err("{ let a = 1;");
        assert!(err.message.contains("expected '}'"), "msg: {}", err.message);
    }

    #[test]
    fn test_missing_rparen_errors() {
        let err = parse_err("f(1, 2;");
        assert!(err.message.contains("expected"), "msg: {}", err.message);
    }

    // ------------------------------------------------------------------
    // Include resolution
    // ------------------------------------------------------------------

    static DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn temp_dir() -> PathBuf {
        let seq = DIR_SEQ.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "wick-parser-tests-{}-{}",
            std::process::id(),
            seq
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn parse_file(path: &Path) -> Result<Program, ParseError> {
        let source = fs::read_to_string(path).unwrap();
        parse_source(&source, path)
    }

    #[test]
    fn test_include_splices_a_block() {
        let dir = temp_dir();
        write_file(&dir, "lib.wick", "fun greet() { print(\"hi\"); }");
        let main = write_file(&dir, "main.wick", "include \"lib.wick\";\ngreet();");

        let program = parse_file(&main).unwrap();
        assert_eq!(program.stmts.len(), 2);
        match &program.stmts[0] {
            Stmt::Block(stmts) => {
                assert!(matches!(&stmts[0], Stmt::FunDecl { name, .. } if name == "greet"));
            }
            other => panic!("expected spliced block, got {other:?}"),
        }
    }

    #[test]
    fn test_repeated_include_collapses_to_empty_block() {
        let dir = temp_dir();
        write_file(&dir, "lib.wick", "fun greet() { print(\"hi\"); }");
        let main = write_file(
            &dir,
            "main.wick",
            "include \"lib.wick\";\ninclude \"lib.wick\";\ngreet();",
        );

        let program = parse_file(&main).unwrap();
        assert_eq!(program.stmts.len(), 3);
        assert!(matches!(&program.stmts[0], Stmt::Block(s) if !s.is_empty()));
        assert!(matches!(&program.stmts[1], Stmt::Block(s) if s.is_empty()));
    }

    #[test]
    fn test_include_cycle_terminates() {
        let dir = temp_dir();
        write_file(&dir, "a.wick", "include \"b.wick\"; let a = 1;");
        write_file(&dir, "b.wick", "include \"a.wick\"; let b = 2;");
        let a = dir.join("a.wick");

        let program = parse_file(&a).unwrap();
        // a: [block-of-b, let a]; block-of-b: [empty block (a again), let b]
        assert_eq!(program.stmts.len(), 2);
        match &program.stmts[0] {
            Stmt::Block(b_stmts) => {
                assert_eq!(b_stmts.len(), 2);
                assert!(matches!(&b_stmts[0], Stmt::Block(s) if s.is_empty()));
                assert!(matches!(&b_stmts[1], Stmt::Let { name, .. } if name == "b"));
            }
            other => panic!("expected spliced block, got {other:?}"),
        }
    }

    #[test]
    fn test_self_include_collapses() {
        let dir = temp_dir();
        let a = write_file(&dir, "self.wick", "include \"self.wick\"; let x = 1;");

        let program = parse_file(&a).unwrap();
        assert_eq!(program.stmts.len(), 2);
        assert!(matches!(&program.stmts[0], Stmt::Block(s) if s.is_empty()));
    }

    #[test]
    fn test_include_relative_to_including_file() {
        let dir = temp_dir();
        fs::create_dir_all(dir.join("sub")).unwrap();
        write_file(&dir.join("sub"), "inner.wick", "let inner = 1;");
        write_file(&dir, "mid.wick", "include \"sub/inner.wick\";");
        let main = write_file(&dir, "main.wick", "include \"mid.wick\";");

        let program = parse_file(&main).unwrap();
        match &program.stmts[0] {
            Stmt::Block(mid) => match &mid[0] {
                Stmt::Block(inner) => {
                    assert!(matches!(&inner[0], Stmt::Let { name, .. } if name == "inner"));
                }
                other => panic!("expected nested block, got {other:?}"),
            },
            other => panic!("expected spliced block, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_include_is_a_parse_error() {
        let dir = temp_dir();
        let main = write_file(&dir, "main.wick", "include \"nope.wick\";");

        let err = parse_file(&main).unwrap_err();
        assert!(err.message.contains("cannot read include"), "msg: {}", err.message);
        assert_eq!(err.span.line, 1);
    }
}
