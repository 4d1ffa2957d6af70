use std::path::PathBuf;
use std::rc::Rc;

use crate::frontend::token::{Span, Token, TokenKind};

/// Hand-written scanner for wick source text.
///
/// The lexer never fails: anything it cannot recognize comes back as an
/// `Illegal` token and the parser decides whether to abort. The stream is
/// terminated by an `Eof` token, which repeats if polled again.
pub struct Lexer {
    source: Vec<char>,
    path: Rc<PathBuf>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str, path: PathBuf) -> Self {
        Lexer {
            source: source.chars().collect(),
            path: Rc::new(path),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if let Some(c) = ch {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                // Columns count bytes, not chars.
                self.col += c.len_utf8();
            }
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            path: Rc::clone(&self.path),
            line: self.line,
            col: self.col,
        }
    }

    fn token(&self, kind: TokenKind, lexeme: impl Into<String>, span: Span) -> Token {
        Token {
            kind,
            lexeme: lexeme.into(),
            span,
        }
    }

    /// Skips whitespace and both comment forms.
    fn skip_trivia(&mut self) {
        loop {
            match self.current() {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek() == Some('/') => {
                    while let Some(ch) = self.current() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek() == Some('*') => {
                    self.advance();
                    self.advance();
                    // Non-nesting; an unterminated block comment runs to EOF.
                    while let Some(ch) = self.current() {
                        if ch == '*' && self.peek() == Some('/') {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_identifier(&mut self, span: Span) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match TokenKind::keyword(&ident) {
            Some(kind) => self.token(kind, ident, span),
            None => self.token(TokenKind::Ident, ident, span),
        }
    }

    fn read_number(&mut self, span: Span) -> Token {
        let mut digits = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // A '.' only belongs to the number when a digit follows it.
        if self.current() == Some('.') && self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            digits.push('.');
            self.advance();
            while let Some(ch) = self.current() {
                if ch.is_ascii_digit() {
                    digits.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        self.token(TokenKind::Number, digits, span)
    }

    fn read_string(&mut self, quote: char, span: Span) -> Token {
        self.advance(); // opening quote

        let mut cooked = String::new();
        loop {
            match self.current() {
                Some(ch) if ch == quote => {
                    self.advance();
                    return self.token(TokenKind::Str, cooked, span);
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => cooked.push('\n'),
                        Some('r') => cooked.push('\r'),
                        Some('t') => cooked.push('\t'),
                        Some('"') => cooked.push('"'),
                        Some('\'') => cooked.push('\''),
                        Some('\\') => cooked.push('\\'),
                        // Unknown escapes keep the escaped character verbatim.
                        Some(ch) => cooked.push(ch),
                        None => break,
                    }
                    self.advance();
                }
                Some(ch) => {
                    cooked.push(ch);
                    self.advance();
                }
                // Unterminated: hand back what we collected; the parser will
                // trip over the missing remainder of the statement.
                None => break,
            }
        }

        self.token(TokenKind::Str, cooked, span)
    }

    fn simple(&mut self, kind: TokenKind, lexeme: &str, span: Span) -> Token {
        for _ in 0..lexeme.chars().count() {
            self.advance();
        }
        self.token(kind, lexeme, span)
    }

    /// Produces the next token in the stream.
    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let span = self.span();

        let ch = match self.current() {
            None => return self.token(TokenKind::Eof, "", span),
            Some(ch) => ch,
        };

        match ch {
            '"' | '\'' => self.read_string(ch, span),
            '=' if self.peek() == Some('=') => self.simple(TokenKind::Eq, "==", span),
            '=' => self.simple(TokenKind::Assign, "=", span),
            '!' if self.peek() == Some('=') => self.simple(TokenKind::NotEq, "!=", span),
            '!' => self.simple(TokenKind::Bang, "!", span),
            '<' if self.peek() == Some('=') => self.simple(TokenKind::LtEq, "<=", span),
            '<' => self.simple(TokenKind::Lt, "<", span),
            '>' if self.peek() == Some('=') => self.simple(TokenKind::GtEq, ">=", span),
            '>' => self.simple(TokenKind::Gt, ">", span),
            '&' if self.peek() == Some('&') => self.simple(TokenKind::AndAnd, "&&", span),
            '|' if self.peek() == Some('|') => self.simple(TokenKind::OrOr, "||", span),
            '+' => self.simple(TokenKind::Plus, "+", span),
            '-' => self.simple(TokenKind::Minus, "-", span),
            '*' => self.simple(TokenKind::Star, "*", span),
            '/' => self.simple(TokenKind::Slash, "/", span),
            '%' => self.simple(TokenKind::Percent, "%", span),
            '(' => self.simple(TokenKind::LParen, "(", span),
            ')' => self.simple(TokenKind::RParen, ")", span),
            '{' => self.simple(TokenKind::LBrace, "{", span),
            '}' => self.simple(TokenKind::RBrace, "}", span),
            '[' => self.simple(TokenKind::LBracket, "[", span),
            ']' => self.simple(TokenKind::RBracket, "]", span),
            ',' => self.simple(TokenKind::Comma, ",", span),
            ';' => self.simple(TokenKind::Semicolon, ";", span),
            ':' => self.simple(TokenKind::Colon, ":", span),
            ch if ch.is_ascii_digit() => self.read_number(span),
            ch if ch.is_ascii_alphabetic() || ch == '_' => self.read_identifier(span),
            ch => {
                self.advance();
                self.token(TokenKind::Illegal, ch.to_string(), span)
            }
        }
    }

    /// Collects the whole stream, `Eof` sentinel included.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }
}
