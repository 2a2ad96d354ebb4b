//! Lexer for the NSS subset accepted by the bundled front end.

use crate::diagnostic::Diagnostic;
use crate::span::Span;

/// Kind of a token produced by the lexer.
///
/// The lexer only recognizes keywords and literals; type names are
/// plain identifiers that the parser interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Special
    Eof,

    // Identifiers and literals
    Ident,
    IntLiteral,
    HexLiteral,
    FloatLiteral,
    StringLiteral,

    // Preprocessor
    HashInclude, // #include

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }
    Comma,    // ,
    Semi,     // ;
    Assign,   // =
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    Bang,     // !
    Less,     // <
    Greater,  // >

    // Compound operators
    LessEq,    // <=
    GreaterEq, // >=
    EqEq,      // ==
    NotEq,     // !=
    AndAnd,    // &&
    OrOr,      // ||

    // Keywords
    If,
    Else,
    While,
    Return,
}

/// A single token with its kind and span.
///
/// `text_start` / `text_end` are byte offsets of the token text; for
/// string literals they exclude the surrounding quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text_start: u32,
    pub text_end: u32,
}

impl Token {
    pub fn text<'src>(&self, source: &'src str) -> &'src str {
        &source[self.text_start as usize..self.text_end as usize]
    }
}

/// Result of lexing a source file.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lex a source string into tokens. The token stream always ends with `Eof`.
pub fn lex(source: &str) -> LexResult {
    let mut lexer = Lexer {
        source,
        chars: source.as_bytes(),
        len: source.len(),
        index: 0,
        diagnostics: Vec::new(),
    };
    lexer.run()
}

struct Lexer<'src> {
    source: &'src str,
    chars: &'src [u8],
    len: usize,
    index: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> LexResult {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) {
                self.consume_char();
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'/') {
                self.skip_line_comment();
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'*') {
                self.skip_block_comment();
                continue;
            }

            let start = self.index as u32;
            let token = match ch {
                b'(' => self.single(TokenKind::LParen, start),
                b')' => self.single(TokenKind::RParen, start),
                b'{' => self.single(TokenKind::LBrace, start),
                b'}' => self.single(TokenKind::RBrace, start),
                b',' => self.single(TokenKind::Comma, start),
                b';' => self.single(TokenKind::Semi, start),
                b'+' => self.single(TokenKind::Plus, start),
                b'-' => self.single(TokenKind::Minus, start),
                b'*' => self.single(TokenKind::Star, start),
                b'/' => self.single(TokenKind::Slash, start),
                b'%' => self.single(TokenKind::Percent, start),
                b'=' => self.one_or_two(b'=', TokenKind::Assign, TokenKind::EqEq, start),
                b'!' => self.one_or_two(b'=', TokenKind::Bang, TokenKind::NotEq, start),
                b'<' => self.one_or_two(b'=', TokenKind::Less, TokenKind::LessEq, start),
                b'>' => self.one_or_two(b'=', TokenKind::Greater, TokenKind::GreaterEq, start),
                b'&' => self.pair(b'&', TokenKind::AndAnd, start),
                b'|' => self.pair(b'|', TokenKind::OrOr, start),
                b'#' => self.lex_directive(start),
                b'"' => self.lex_string(start),
                b'0'..=b'9' => self.lex_number(start),
                b'.' if self.peek_next().is_some_and(|c| c.is_ascii_digit()) => {
                    self.lex_number(start)
                }
                _ => {
                    if is_ident_start(ch) {
                        self.lex_ident_or_keyword(start)
                    } else {
                        self.consume_char();
                        self.unexpected_char(start)
                    }
                }
            };

            if let Some(tok) = token {
                tokens.push(tok);
            }
        }

        let end = self.len as u32;
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::new(end, end),
            text_start: end,
            text_end: end,
        });

        LexResult {
            tokens,
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }

    fn single(&mut self, kind: TokenKind, start: u32) -> Option<Token> {
        self.consume_char();
        self.simple_token(kind, start)
    }

    fn one_or_two(
        &mut self,
        second: u8,
        short: TokenKind,
        long: TokenKind,
        start: u32,
    ) -> Option<Token> {
        self.consume_char();
        if self.peek_char() == Some(second) {
            self.consume_char();
            self.simple_token(long, start)
        } else {
            self.simple_token(short, start)
        }
    }

    fn pair(&mut self, second: u8, kind: TokenKind, start: u32) -> Option<Token> {
        self.consume_char();
        if self.peek_char() == Some(second) {
            self.consume_char();
            self.simple_token(kind, start)
        } else {
            self.unexpected_char(start)
        }
    }

    fn simple_token(&self, kind: TokenKind, start: u32) -> Option<Token> {
        let end = self.index as u32;
        Some(Token {
            kind,
            span: Span::new(start, end),
            text_start: start,
            text_end: end,
        })
    }

    fn unexpected_char(&mut self, start: u32) -> Option<Token> {
        // Step over the whole character so the slice ends on a boundary.
        let width = self.source[start as usize..]
            .chars()
            .next()
            .map_or(1, char::len_utf8);
        self.index = self.index.max(start as usize + width).min(self.len);
        let span = Span::new(start, self.index as u32);
        let text = &self.source[start as usize..self.index as usize];
        self.diagnostics
            .push(Diagnostic::error(format!("unexpected character \"{text}\""), span));
        None
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == b'\n' {
                break;
            }
            self.consume_char();
        }
    }

    fn skip_block_comment(&mut self) {
        let start = self.index as u32;
        self.consume_char(); // '/'
        self.consume_char(); // '*'
        while let Some(ch) = self.peek_char() {
            if ch == b'*' && self.peek_next() == Some(b'/') {
                self.consume_char();
                self.consume_char();
                return;
            }
            self.consume_char();
        }
        self.diagnostics.push(Diagnostic::error(
            "unterminated comment",
            Span::new(start, self.index as u32),
        ));
    }

    fn lex_directive(&mut self, start: u32) -> Option<Token> {
        self.consume_char(); // '#'
        let word_start = self.index;
        while self.peek_char().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.consume_char();
        }
        let word = &self.source[word_start..self.index];
        match word {
            "include" => self.simple_token(TokenKind::HashInclude, start),
            _ => {
                let span = Span::new(start, self.index as u32);
                self.diagnostics.push(Diagnostic::error(
                    format!("unknown preprocessor directive \"#{word}\""),
                    span,
                ));
                self.skip_line_comment();
                None
            }
        }
    }

    fn lex_string(&mut self, start: u32) -> Option<Token> {
        self.consume_char(); // opening quote

        let content_start = self.index;
        while let Some(ch) = self.peek_char() {
            match ch {
                b'"' => {
                    let content_end = self.index;
                    self.consume_char(); // closing quote
                    return Some(Token {
                        kind: TokenKind::StringLiteral,
                        span: Span::new(start, self.index as u32),
                        text_start: content_start as u32,
                        text_end: content_end as u32,
                    });
                }
                b'\n' => break,
                b'\\' => {
                    self.consume_char();
                    if self.peek_char().is_some() {
                        self.consume_char();
                    }
                }
                _ => self.consume_char(),
            }
        }

        self.diagnostics.push(Diagnostic::error(
            "unterminated string literal",
            Span::new(start, self.index as u32),
        ));
        None
    }

    fn lex_number(&mut self, start: u32) -> Option<Token> {
        if self.peek_char() == Some(b'0') && matches!(self.peek_next(), Some(b'x' | b'X')) {
            self.consume_char();
            self.consume_char();
            let digits_start = self.index;
            while self.peek_char().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.consume_char();
            }
            if self.index == digits_start {
                return self.unexpected_char(start);
            }
            return self.simple_token(TokenKind::HexLiteral, start);
        }

        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.consume_char();
        }

        let mut is_float = false;
        if self.peek_char() == Some(b'.') {
            is_float = true;
            self.consume_char();
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.consume_char();
            }
        }

        let end = self.index as u32;
        // Trailing `f` is part of the literal but not of its text.
        if matches!(self.peek_char(), Some(b'f' | b'F')) {
            is_float = true;
            self.consume_char();
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        };
        Some(Token {
            kind,
            span: Span::new(start, self.index as u32),
            text_start: start,
            text_end: end,
        })
    }

    fn lex_ident_or_keyword(&mut self, start: u32) -> Option<Token> {
        while self.peek_char().is_some_and(is_ident_continue) {
            self.consume_char();
        }

        let end = self.index as u32;
        let kind = match &self.source[start as usize..end as usize] {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            _ => TokenKind::Ident,
        };
        self.simple_token(kind, start)
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }

    fn consume_char(&mut self) {
        if self.index < self.len {
            self.index += 1;
        }
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}
