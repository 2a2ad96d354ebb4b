//! The parser seam and the bundled NSS front end.
//!
//! The emitter only sees [`ParseEvent`]s: include directives, finished
//! declarations and diagnostics, in source order. Anything that can
//! produce that stream can drive the compiler; [`NssParser`] is the
//! recursive-descent implementation shipped with the crate.

use crate::ast::{BinaryOp, Expr, ExprKind, FunctionDecl, Item, Param, Stmt, UnaryOp, VarDecl};
use crate::diagnostic::Diagnostic;
use crate::lexer::{Token, TokenKind, lex};
use crate::span::Span;
use crate::types::Type;

/// One signal from the parser to the bytecode emitter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    Include { path: String, span: Span },
    Declaration(Item),
    Diagnostic(Diagnostic),
}

/// Front end producing parse events for one translation unit.
pub trait Parser {
    fn parse(&self, unit: &str, source: &str) -> Vec<ParseEvent>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NssParser;

impl Parser for NssParser {
    fn parse(&self, _unit: &str, source: &str) -> Vec<ParseEvent> {
        parse_events(source)
    }
}

/// Lex and parse `source` into an ordered event stream.
pub fn parse_events(source: &str) -> Vec<ParseEvent> {
    let lexed = lex(source);
    let mut events: Vec<ParseEvent> = lexed
        .diagnostics
        .into_iter()
        .map(ParseEvent::Diagnostic)
        .collect();
    let mut state = ParseState {
        source,
        tokens: &lexed.tokens,
        position: 0,
        depth: 0,
        events: Vec::new(),
    };
    state.parse_unit();
    events.append(&mut state.events);
    events
}

type PResult<T> = Result<T, Diagnostic>;

/// Deepest nesting of expressions or statements the parser accepts.
pub const MAX_NESTING: usize = 128;

struct ParseState<'src> {
    source: &'src str,
    tokens: &'src [Token],
    position: usize,
    depth: usize,
    events: Vec<ParseEvent>,
}

impl<'src> ParseState<'src> {
    fn parse_unit(&mut self) {
        while !self.at(TokenKind::Eof) {
            let result = if self.at(TokenKind::HashInclude) {
                self.parse_include()
            } else {
                self.parse_declaration()
            };
            if let Err(diag) = result {
                self.events.push(ParseEvent::Diagnostic(diag));
                self.synchronize_top_level();
            }
        }
    }

    fn parse_include(&mut self) -> PResult<()> {
        let directive = self.advance().span;
        let name = self.expect(TokenKind::StringLiteral, "expected include file name")?;
        let path = name.text(self.source).to_string();
        self.events.push(ParseEvent::Include {
            path,
            span: directive.to(name.span),
        });
        Ok(())
    }

    fn parse_declaration(&mut self) -> PResult<()> {
        if self.at_word("const") {
            self.advance();
        }
        let start = self.peek().span;
        let ty = self.parse_type()?;
        let name_token = self.expect(TokenKind::Ident, "expected identifier")?;
        let name = name_token.text(self.source).to_string();

        if self.eat(TokenKind::LParen) {
            let params = self.parse_params()?;
            let body = if self.eat(TokenKind::Semi) {
                None
            } else {
                Some(self.parse_block_body()?)
            };
            let span = start.to(self.previous_span());
            self.events
                .push(ParseEvent::Declaration(Item::Function(FunctionDecl {
                    ret: ty,
                    name,
                    params,
                    body,
                    span,
                })));
            return Ok(());
        }

        if ty.is_void() {
            return Err(Diagnostic::error(
                format!("variable \"{name}\" cannot be declared void"),
                name_token.span,
            ));
        }
        let init = if self.eat(TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi, "expected \";\" after declaration")?;
        let span = start.to(self.previous_span());
        self.events.push(ParseEvent::Declaration(Item::Global(VarDecl {
            ty,
            name,
            init,
            span,
        })));
        Ok(())
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        if self.eat(TokenKind::RParen) {
            return Ok(params);
        }
        if self.at_word("void") && self.peek_nth(1).kind == TokenKind::RParen {
            self.advance();
            self.advance();
            return Ok(params);
        }
        loop {
            let ty = self.parse_type()?;
            if ty.is_void() {
                return Err(Diagnostic::error(
                    "parameter cannot be void",
                    self.previous_span(),
                ));
            }
            let name = self.expect(TokenKind::Ident, "expected parameter name")?;
            params.push(Param {
                ty,
                name: name.text(self.source).to_string(),
            });
            if self.eat(TokenKind::RParen) {
                return Ok(params);
            }
            self.expect(TokenKind::Comma, "expected \",\" or \")\"")?;
        }
    }

    fn parse_block_body(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "expected \"{\"")?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(Diagnostic::error(
                    "unexpected end of file, expected \"}\"",
                    self.peek().span,
                ));
            }
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(diag) => {
                    self.events.push(ParseEvent::Diagnostic(diag));
                    self.synchronize_statement();
                }
            }
        }
        self.advance();
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        self.nested("statement too deeply nested", Self::parse_stmt_inner)
    }

    fn parse_stmt_inner(&mut self) -> PResult<Stmt> {
        match self.peek().kind {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block_body()?)),
            TokenKind::Semi => {
                self.advance();
                Ok(Stmt::Block(Vec::new()))
            }
            TokenKind::If => {
                self.advance();
                self.expect(TokenKind::LParen, "expected \"(\" after if")?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen, "expected \")\"")?;
                let then_branch = Box::new(self.parse_stmt()?);
                let else_branch = if self.eat(TokenKind::Else) {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                })
            }
            TokenKind::While => {
                self.advance();
                self.expect(TokenKind::LParen, "expected \"(\" after while")?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen, "expected \")\"")?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { cond, body })
            }
            TokenKind::Return => {
                let start = self.advance().span;
                let value = if self.at(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semi, "expected \";\" after return")?;
                Ok(Stmt::Return {
                    value,
                    span: start.to(self.previous_span()),
                })
            }
            TokenKind::Ident if self.at_type_keyword() => {
                let start = self.peek().span;
                let ty = self.parse_type()?;
                if ty.is_void() {
                    return Err(Diagnostic::error("variable cannot be declared void", start));
                }
                let name = self.expect(TokenKind::Ident, "expected variable name")?;
                let init = if self.eat(TokenKind::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect(TokenKind::Semi, "expected \";\" after declaration")?;
                Ok(Stmt::Local(VarDecl {
                    ty,
                    name: name.text(self.source).to_string(),
                    init,
                    span: start.to(self.previous_span()),
                }))
            }
            TokenKind::Ident if self.peek_nth(1).kind == TokenKind::Assign => {
                let target = self.advance().clone();
                self.advance();
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semi, "expected \";\" after assignment")?;
                Ok(Stmt::Assign {
                    name: target.text(self.source).to_string(),
                    value,
                    span: target.span.to(self.previous_span()),
                })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi, "expected \";\" after expression")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_level: usize) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some((op, level)) = binary_op(self.peek().kind) {
            if level < min_level {
                break;
            }
            self.advance();
            let right = self.parse_binary(level + 1)?;
            let span = left.span.to(right.span);
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        self.nested("expression too deeply nested", Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> PResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        let start = self.advance().span;
        let operand = self.parse_unary()?;
        let span = start.to(operand.span);
        // Negative literals are folded so they encode as a single constant.
        let kind = match (op, operand.kind) {
            (UnaryOp::Neg, ExprKind::Int(value)) => ExprKind::Int(value.wrapping_neg()),
            (UnaryOp::Neg, ExprKind::Float(value)) => ExprKind::Float(-value),
            (op, kind) => ExprKind::Unary {
                op,
                operand: Box::new(Expr {
                    kind,
                    span: operand.span,
                }),
            },
        };
        Ok(Expr { kind, span })
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.advance().clone();
        let text = token.text(self.source);
        let kind = match token.kind {
            TokenKind::IntLiteral => {
                let value: i64 = text.parse().map_err(|_| {
                    Diagnostic::error(format!("invalid integer \"{text}\""), token.span)
                })?;
                // 2147483648 is accepted so that -2147483648 folds correctly.
                if value > i64::from(i32::MAX) + 1 {
                    return Err(Diagnostic::error(
                        format!("integer constant \"{text}\" is too large"),
                        token.span,
                    ));
                }
                ExprKind::Int(value as i32)
            }
            TokenKind::HexLiteral => {
                let value = u32::from_str_radix(&text[2..], 16).map_err(|_| {
                    Diagnostic::error(format!("integer constant \"{text}\" is too large"), token.span)
                })?;
                ExprKind::Int(value as i32)
            }
            TokenKind::FloatLiteral => {
                let value: f32 = text.parse().map_err(|_| {
                    Diagnostic::error(format!("invalid float \"{text}\""), token.span)
                })?;
                ExprKind::Float(value)
            }
            TokenKind::StringLiteral => ExprKind::String(unescape(text)),
            TokenKind::Ident => match text {
                "TRUE" => ExprKind::Int(1),
                "FALSE" => ExprKind::Int(0),
                "OBJECT_SELF" => ExprKind::Object(0),
                "OBJECT_INVALID" => ExprKind::Object(1),
                _ if self.at(TokenKind::LParen) => {
                    self.advance();
                    let args = self.parse_args()?;
                    return Ok(Expr {
                        kind: ExprKind::Call {
                            name: text.to_string(),
                            args,
                        },
                        span: token.span.to(self.previous_span()),
                    });
                }
                _ => ExprKind::Ident(text.to_string()),
            },
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "expected \")\"")?;
                return Ok(Expr {
                    kind: inner.kind,
                    span: token.span.to(self.previous_span()),
                });
            }
            TokenKind::Eof => {
                return Err(Diagnostic::error(
                    "unexpected end of file in expression",
                    token.span,
                ));
            }
            _ => {
                return Err(Diagnostic::error(
                    format!("unexpected \"{text}\" in expression"),
                    token.span,
                ));
            }
        };
        Ok(Expr {
            kind,
            span: token.span,
        })
    }

    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(TokenKind::Comma, "expected \",\" or \")\" in argument list")?;
        }
    }

    fn parse_type(&mut self) -> PResult<Type> {
        let token = self.peek().clone();
        if token.kind == TokenKind::Ident {
            if let Some(ty) = Type::from_keyword(token.text(self.source)) {
                self.advance();
                return Ok(ty);
            }
        }
        Err(Diagnostic::error(
            format!("expected type, found \"{}\"", token.text(self.source)),
            token.span,
        ))
    }

    fn at_type_keyword(&self) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Ident && Type::from_keyword(token.text(self.source)).is_some()
    }

    fn at_word(&self, word: &str) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Ident && token.text(self.source) == word
    }

    /// Skips to just past the next top-level `;` or closing `}`.
    fn synchronize_top_level(&mut self) {
        let mut depth = 0usize;
        while !self.at(TokenKind::Eof) {
            match self.advance().kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                TokenKind::Semi if depth == 0 => return,
                _ => {}
            }
        }
    }

    fn nested<T>(
        &mut self,
        message: &str,
        parse: impl FnOnce(&mut Self) -> PResult<T>,
    ) -> PResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(Diagnostic::error(message, self.peek().span));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Skips to just past the next `;`, or stops before the enclosing `}`.
    fn synchronize_statement(&mut self) {
        while !self.at(TokenKind::Eof) && !self.at(TokenKind::RBrace) {
            if self.advance().kind == TokenKind::Semi {
                return;
            }
        }
    }

    fn peek(&self) -> &'src Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &'src Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.position + n).min(last)]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> &'src Token {
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> PResult<&'src Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(Diagnostic::error(message, self.peek().span))
        }
    }

    fn previous_span(&self) -> Span {
        self.tokens[self.position.saturating_sub(1)].span
    }
}

/// Binding level of each binary operator; higher binds tighter.
fn binary_op(kind: TokenKind) -> Option<(BinaryOp, usize)> {
    let entry = match kind {
        TokenKind::OrOr => (BinaryOp::Or, 0),
        TokenKind::AndAnd => (BinaryOp::And, 1),
        TokenKind::EqEq => (BinaryOp::Eq, 2),
        TokenKind::NotEq => (BinaryOp::NotEq, 2),
        TokenKind::Less => (BinaryOp::Less, 3),
        TokenKind::LessEq => (BinaryOp::LessEq, 3),
        TokenKind::Greater => (BinaryOp::Greater, 3),
        TokenKind::GreaterEq => (BinaryOp::GreaterEq, 3),
        TokenKind::Plus => (BinaryOp::Add, 4),
        TokenKind::Minus => (BinaryOp::Sub, 4),
        TokenKind::Star => (BinaryOp::Mul, 5),
        TokenKind::Slash => (BinaryOp::Div, 5),
        TokenKind::Percent => (BinaryOp::Mod, 5),
        _ => return None,
    };
    Some(entry)
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
