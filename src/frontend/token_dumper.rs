use crate::frontend::token::{Token, TokenKind};

/// Pretty-printer for the `--tokens` listing.
pub struct TokenDumper {
    pub color: bool,
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self { color: true }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const RED: &'static str = "\x1b[31m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn dump(&self, tokens: &[Token]) {
        for token in tokens {
            self.print_one(token);
        }
    }

    fn print_one(&self, token: &Token) {
        let color = if self.color { self.color_for(token.kind) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        println!(
            "[{:03}:{:03}] {}{:<12} {}{}",
            token.span.line,
            token.span.col,
            color,
            format!("{:?}", token.kind),
            token.lexeme,
            reset,
        );
    }

    fn color_for(&self, kind: TokenKind) -> &'static str {
        match kind {
            TokenKind::Let
            | TokenKind::Const
            | TokenKind::Fun
            | TokenKind::Return
            | TokenKind::If
            | TokenKind::Else
            | TokenKind::While
            | TokenKind::For
            | TokenKind::Include => Self::MAG,
            TokenKind::Number | TokenKind::True | TokenKind::False | TokenKind::Null => Self::GRN,
            TokenKind::Str => Self::YEL,
            TokenKind::Ident => Self::CYN,
            TokenKind::Illegal => Self::RED,
            _ => Self::DIM,
        }
    }
}
