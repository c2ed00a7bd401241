//! The Pratt parser.

use rill_diagnostic::{Diagnostic, ErrorCode};
use rill_ir::{BinaryOp, ExprArena, ExprId, ExprKind, Name, Span, StringInterner, UnaryOp};
use rill_lexer::{lex, Token, TokenKind};

/// Result of parsing one source file.
pub struct Parsed {
    pub arena: ExprArena,
    /// Top-level statements in source order.
    pub top: Vec<ExprId>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Parsed {
    /// True if parsing produced any error diagnostic.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Lex and parse a source string.
pub fn parse_source(source: &str, interner: &StringInterner) -> Parsed {
    let (tokens, mut diagnostics) = lex(source, interner);
    let mut parsed = parse_tokens(tokens);
    diagnostics.append(&mut parsed.diagnostics);
    parsed.diagnostics = diagnostics;
    parsed
}

/// Parse a pre-lexed token stream.
pub fn parse_tokens(tokens: Vec<Token>) -> Parsed {
    let mut parser = Parser {
        tokens,
        pos: 0,
        arena: ExprArena::new(),
        diagnostics: Vec::new(),
        no_brace: false,
    };
    let top = parser.parse_script();
    Parsed {
        arena: parser.arena,
        top,
        diagnostics: parser.diagnostics,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    arena: ExprArena,
    diagnostics: Vec<Diagnostic>,
    /// Set while parsing a match subject, where `{` opens the arm list
    /// rather than an operand.
    no_brace: bool,
}

impl Parser {
    // Token access

    fn peek(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_at(&self, offset: usize) -> Token {
        self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn prev_end(&self) -> u32 {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> bool {
        if self.eat(kind) {
            return true;
        }
        let tok = self.peek();
        let code = match kind {
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => ErrorCode::E0004,
            _ if tok.kind == TokenKind::Eof => ErrorCode::E0001,
            _ => ErrorCode::E0005,
        };
        self.diagnostics.push(
            Diagnostic::error(code)
                .with_message(format!(
                    "expected {}, found {}",
                    kind.describe(),
                    tok.kind.describe()
                ))
                .with_label(tok.span, format!("expected {}", kind.describe())),
        );
        false
    }

    fn skip_newlines(&mut self) {
        while self.peek_kind() == TokenKind::Newline {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Semi) {
            self.advance();
        }
    }

    fn alloc(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.arena.alloc(kind, span)
    }

    fn span_of(&self, id: ExprId) -> Span {
        self.arena.get(id).span
    }

    fn error_expr(&mut self, span: Span) -> ExprId {
        self.alloc(ExprKind::Error, span)
    }

    // Entry points

    fn parse_script(&mut self) -> Vec<ExprId> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while self.peek_kind() != TokenKind::Eof {
            let before = self.pos;
            stmts.push(self.parse_stmt());
            if self.pos == before {
                // No progress: report and step over the offending token.
                let tok = self.advance();
                self.diagnostics.push(
                    Diagnostic::error(ErrorCode::E0005)
                        .with_message(format!("unexpected {}", tok.kind.describe()))
                        .with_label(tok.span, "could not parse a statement here"),
                );
            }
            self.skip_separators();
        }
        stmts
    }

    fn parse_stmt(&mut self) -> ExprId {
        if self.peek_kind() == TokenKind::Export {
            return self.parse_export();
        }
        self.parse_expr()
    }

    fn parse_export(&mut self) -> ExprId {
        let start = self.advance().span;
        let value_or_pattern = self.parse_expr_no_assign();
        if self.eat(TokenKind::Walrus) {
            self.skip_newlines();
            let value = self.parse_expr();
            let span = start.merge(self.span_of(value));
            self.alloc(
                ExprKind::Export {
                    pattern: value_or_pattern,
                    value,
                },
                span,
            )
        } else {
            let span = start.merge(self.span_of(value_or_pattern));
            self.alloc(
                ExprKind::Export {
                    pattern: ExprId::INVALID,
                    value: value_or_pattern,
                },
                span,
            )
        }
    }

    /// Full expression: operators plus `:=`/`=`/`+=` forms.
    fn parse_expr(&mut self) -> ExprId {
        let lhs = self.parse_expr_no_assign();
        let kind = match self.peek_kind() {
            TokenKind::Walrus => 0,
            TokenKind::Assign => 1,
            TokenKind::PlusAssign => 2,
            _ => return lhs,
        };
        self.advance();
        self.skip_newlines();
        let value = self.parse_expr();
        let span = self.span_of(lhs).merge(self.span_of(value));
        let node = match kind {
            0 => ExprKind::Declare {
                pattern: lhs,
                value,
            },
            1 => ExprKind::Assign {
                pattern: lhs,
                value,
            },
            _ => ExprKind::AddAssign {
                pattern: lhs,
                value,
            },
        };
        self.alloc(node, span)
    }

    fn parse_expr_no_assign(&mut self) -> ExprId {
        self.parse_binary(0)
    }

    // Pratt core

    fn parse_binary(&mut self, min_bp: u8) -> ExprId {
        let mut lhs = self.parse_prefix();

        loop {
            let (op_bp, right_bp) = match self.peek_kind() {
                TokenKind::Or => (10, 11),
                TokenKind::And => (20, 21),
                TokenKind::EqEq
                | TokenKind::NotEq
                | TokenKind::EqEqEq
                | TokenKind::NotEqEq
                | TokenKind::Lt
                | TokenKind::LtEq
                | TokenKind::Gt
                | TokenKind::GtEq
                | TokenKind::In
                | TokenKind::Is => (30, 31),
                TokenKind::At => (32, 33),
                TokenKind::SendArrow | TokenKind::SendTry => (35, 36),
                TokenKind::Plus | TokenKind::Minus => (40, 41),
                TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (50, 51),
                // Power is right-associative.
                TokenKind::Caret => (60, 60),
                _ => break,
            };
            if op_bp < min_bp {
                break;
            }
            let op_tok = self.advance();
            self.skip_newlines();
            let rhs = self.parse_binary(right_bp);
            let span = self.span_of(lhs).merge(self.span_of(rhs));
            let kind = match op_tok.kind {
                TokenKind::Or => ExprKind::Or { lhs, rhs },
                TokenKind::And => ExprKind::And { lhs, rhs },
                TokenKind::Is => ExprKind::Is {
                    value: lhs,
                    pattern: rhs,
                },
                TokenKind::At => ExprKind::Bind {
                    left: lhs,
                    right: rhs,
                },
                TokenKind::SendArrow => ExprKind::Send {
                    channel: lhs,
                    value: rhs,
                },
                TokenKind::SendTry => ExprKind::TrySend {
                    channel: lhs,
                    value: rhs,
                },
                other => ExprKind::Binary {
                    op: binary_op(other),
                    lhs,
                    rhs,
                },
            };
            lhs = self.alloc(kind, span);
        }

        lhs
    }

    fn parse_prefix(&mut self) -> ExprId {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Not => {
                self.advance();
                let operand = self.parse_binary(26);
                let span = tok.span.merge(self.span_of(operand));
                self.alloc(
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand,
                    },
                    span,
                )
            }
            TokenKind::Await => {
                self.advance();
                let operand = self.parse_binary(26);
                let span = tok.span.merge(self.span_of(operand));
                self.alloc(
                    ExprKind::Unary {
                        op: UnaryOp::Await,
                        operand,
                    },
                    span,
                )
            }
            TokenKind::Mut => {
                self.advance();
                let operand = self.parse_binary(26);
                let span = tok.span.merge(self.span_of(operand));
                self.alloc(ExprKind::MutPat(operand), span)
            }
            TokenKind::Like => {
                self.advance();
                let operand = self.parse_binary(26);
                let span = tok.span.merge(self.span_of(operand));
                self.alloc(ExprKind::LikePat(operand), span)
            }
            TokenKind::Strict => {
                self.advance();
                let operand = self.parse_binary(26);
                let span = tok.span.merge(self.span_of(operand));
                self.alloc(ExprKind::StrictPat(operand), span)
            }
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_application();
                let span = tok.span.merge(self.span_of(operand));
                self.alloc(
                    ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand,
                    },
                    span,
                )
            }
            TokenKind::SendArrow => {
                self.advance();
                let operand = self.parse_application();
                let span = tok.span.merge(self.span_of(operand));
                self.alloc(ExprKind::Receive(operand), span)
            }
            TokenKind::RecvTry => {
                self.advance();
                let operand = self.parse_application();
                let span = tok.span.merge(self.span_of(operand));
                self.alloc(ExprKind::TryReceive(operand), span)
            }
            TokenKind::Caret => {
                self.advance();
                let operand = self.parse_application();
                let span = tok.span.merge(self.span_of(operand));
                self.alloc(ExprKind::Pin(operand), span)
            }
            _ => self.parse_application(),
        }
    }

    /// Application by juxtaposition: `f x`, `self(n - 1)`, `amb [1,2,3]`.
    fn parse_application(&mut self) -> ExprId {
        let mut func = self.parse_postfix();
        while self.starts_operand() {
            let arg = self.parse_postfix();
            let span = self.span_of(func).merge(self.span_of(arg));
            func = self.alloc(ExprKind::Apply { func, arg }, span);
        }
        func
    }

    /// Does the next token begin an application operand?
    fn starts_operand(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Number(_)
            | TokenKind::Str(_)
            | TokenKind::Ident(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Underscore
            | TokenKind::LParen
            | TokenKind::LBracket => true,
            TokenKind::LBrace => !self.no_brace,
            // Atom literal `:name` (colon immediately followed by a name).
            TokenKind::Colon => self.at_atom(),
            _ => false,
        }
    }

    /// True when the current token is a `:` immediately followed by an
    /// identifier with no space between them (an atom literal).
    fn at_atom(&self) -> bool {
        let colon = self.peek();
        if colon.kind != TokenKind::Colon {
            return false;
        }
        let next = self.peek_at(1);
        matches!(next.kind, TokenKind::Ident(_)) && next.span.start == colon.span.end
    }

    fn parse_postfix(&mut self) -> ExprId {
        let mut expr = self.parse_primary();
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let tok = self.peek();
                    if let TokenKind::Ident(name) = tok.kind {
                        self.advance();
                        let key = self.alloc(ExprKind::Atom(name), tok.span);
                        let span = self.span_of(expr).merge(tok.span);
                        self.alloc_index_into(&mut expr, key, span);
                    } else {
                        self.diagnostics.push(
                            Diagnostic::error(ErrorCode::E0005)
                                .with_message(format!(
                                    "expected a field name after `.`, found {}",
                                    tok.kind.describe()
                                ))
                                .with_label(tok.span, "expected a name"),
                        );
                        return expr;
                    }
                }
                // Index only when the bracket is flush against the target:
                // `a[i]` indexes, `f [1, 2]` applies a list argument.
                TokenKind::LBracket if self.peek().span.start == self.prev_end() => {
                    self.advance();
                    self.skip_newlines();
                    let index = self.parse_expr_no_assign();
                    self.skip_newlines();
                    self.expect(TokenKind::RBracket);
                    let span = Span::new(self.span_of(expr).start, self.prev_end());
                    self.alloc_index_into(&mut expr, index, span);
                }
                _ => break,
            }
        }
        expr
    }

    fn alloc_index_into(&mut self, target: &mut ExprId, index: ExprId, span: Span) {
        let node = ExprKind::Index {
            target: *target,
            index,
        };
        *target = self.alloc(node, span);
    }

    fn parse_primary(&mut self) -> ExprId {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Number(n) => {
                self.advance();
                self.alloc(ExprKind::Number(n.to_bits()), tok.span)
            }
            TokenKind::Str(name) => {
                self.advance();
                self.alloc(ExprKind::Str(name), tok.span)
            }
            TokenKind::True => {
                self.advance();
                self.alloc(ExprKind::Bool(true), tok.span)
            }
            TokenKind::False => {
                self.advance();
                self.alloc(ExprKind::Bool(false), tok.span)
            }
            TokenKind::Ident(name) => {
                self.advance();
                self.alloc(ExprKind::Ident(name), tok.span)
            }
            TokenKind::Underscore => {
                self.advance();
                self.alloc(ExprKind::Placeholder, tok.span)
            }
            TokenKind::Colon if self.at_atom() => {
                self.advance();
                let ident = self.advance();
                let TokenKind::Ident(name) = ident.kind else {
                    return self.error_expr(ident.span);
                };
                self.alloc(ExprKind::Atom(name), tok.span.merge(ident.span))
            }
            TokenKind::Ellipsis => {
                // Spread is only meaningful inside tuple contexts, but it
                // parses anywhere; the evaluator rejects stray spreads.
                self.advance();
                let operand = self.parse_binary(26);
                let span = tok.span.merge(self.span_of(operand));
                self.alloc(ExprKind::Spread(operand), span)
            }

            TokenKind::LParen => self.parse_paren_group(),
            TokenKind::LBracket => self.parse_bracket_group(),
            TokenKind::LBrace => self.parse_brace_group(),

            TokenKind::Fn => self.parse_lambda(),
            TokenKind::If => self.parse_if(),
            TokenKind::Match => self.parse_match(),
            TokenKind::Loop => {
                self.advance();
                self.skip_newlines();
                let body = self.parse_expr_no_assign();
                let span = tok.span.merge(self.span_of(body));
                self.alloc(ExprKind::Loop { body }, span)
            }
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr_no_assign();
                self.expect(TokenKind::Do);
                self.skip_newlines();
                let body = self.parse_expr();
                let span = tok.span.merge(self.span_of(body));
                self.alloc(ExprKind::While { cond, body }, span)
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Inject => {
                self.advance();
                self.skip_newlines();
                let handlers = self.parse_expr_no_assign();
                self.expect(TokenKind::Do);
                self.skip_newlines();
                let body = self.parse_expr();
                let span = tok.span.merge(self.span_of(body));
                self.alloc(ExprKind::Inject { handlers, body }, span)
            }
            TokenKind::Mask => self.parse_mask(false),
            TokenKind::Without => self.parse_mask(true),
            TokenKind::Label => {
                self.advance();
                let name_tok = self.peek();
                let name = if let TokenKind::Ident(name) = name_tok.kind {
                    self.advance();
                    name
                } else {
                    self.diagnostics.push(
                        Diagnostic::error(ErrorCode::E0005)
                            .with_message("expected a label name after `label`")
                            .with_label(name_tok.span, "expected a name"),
                    );
                    Name::EMPTY
                };
                self.skip_newlines();
                let body = self.parse_expr_no_assign();
                let span = tok.span.merge(self.span_of(body));
                self.alloc(ExprKind::CodeLabel { name, body }, span)
            }
            TokenKind::Async => {
                self.advance();
                let body = self.parse_expr_no_assign();
                let span = tok.span.merge(self.span_of(body));
                self.alloc(ExprKind::Async(body), span)
            }
            TokenKind::Parallel => self.parse_parallel(),
            TokenKind::Try => {
                self.advance();
                let body = self.parse_expr_no_assign();
                let span = tok.span.merge(self.span_of(body));
                self.alloc(ExprKind::TryOp(body), span)
            }
            TokenKind::Import => {
                self.advance();
                let name_tok = self.peek();
                if let TokenKind::Str(name) = name_tok.kind {
                    self.advance();
                    self.alloc(ExprKind::Import(name), tok.span.merge(name_tok.span))
                } else {
                    self.diagnostics.push(
                        Diagnostic::error(ErrorCode::E0005)
                            .with_message("expected a module name string after `import`")
                            .with_label(name_tok.span, "expected a string literal"),
                    );
                    self.error_expr(tok.span)
                }
            }

            other => {
                self.diagnostics.push(
                    Diagnostic::error(if other == TokenKind::Eof {
                        ErrorCode::E0001
                    } else {
                        ErrorCode::E0006
                    })
                    .with_message(format!("expected expression, found {}", other.describe()))
                    .with_label(tok.span, "expected an expression here"),
                );
                self.error_expr(tok.span)
            }
        }
    }

    // Grouping forms

    /// `(...)`: empty list, grouping, or tuple/record builder.
    fn parse_paren_group(&mut self) -> ExprId {
        let open = self.advance().span;
        let saved = std::mem::replace(&mut self.no_brace, false);
        let result = self.parse_paren_group_inner(open);
        self.no_brace = saved;
        result
    }

    fn parse_paren_group_inner(&mut self, open: Span) -> ExprId {
        self.skip_newlines();

        if self.eat(TokenKind::RParen) {
            let span = Span::new(open.start, self.prev_end());
            return self.alloc(ExprKind::Parens(ExprId::INVALID), span);
        }

        let (elements, saw_comma) = self.parse_elements(TokenKind::RParen);
        self.expect(TokenKind::RParen);
        let span = Span::new(open.start, self.prev_end());

        if elements.len() == 1 && !saw_comma && !self.is_tuple_element(elements[0]) {
            return self.alloc(ExprKind::Parens(elements[0]), span);
        }
        let range = self.arena.alloc_list(elements);
        self.alloc(ExprKind::Tuple(range), span)
    }

    /// `[...]`: dynamic name lookup (single element) or list builder.
    fn parse_bracket_group(&mut self) -> ExprId {
        let open = self.advance().span;
        let saved = std::mem::replace(&mut self.no_brace, false);
        let result = self.parse_bracket_group_inner(open);
        self.no_brace = saved;
        result
    }

    fn parse_bracket_group_inner(&mut self, open: Span) -> ExprId {
        self.skip_newlines();

        if self.eat(TokenKind::RBracket) {
            let span = Span::new(open.start, self.prev_end());
            let range = self.arena.alloc_list(Vec::new());
            return self.alloc(ExprKind::Tuple(range), span);
        }

        let (elements, saw_comma) = self.parse_elements(TokenKind::RBracket);
        self.expect(TokenKind::RBracket);
        let span = Span::new(open.start, self.prev_end());

        if elements.len() == 1 && !saw_comma && !self.is_tuple_element(elements[0]) {
            return self.alloc(ExprKind::Brackets(elements[0]), span);
        }
        let range = self.arena.alloc_list(elements);
        self.alloc(ExprKind::Tuple(range), span)
    }

    /// True for elements that force the tuple interpretation of a group.
    fn is_tuple_element(&self, id: ExprId) -> bool {
        matches!(
            self.arena.get(id).kind,
            ExprKind::Spread(_) | ExprKind::Labeled { .. }
        )
    }

    /// Comma-separated tuple elements: plain values, `...spread`,
    /// `key: value` labels. Returns the elements and whether a comma
    /// appeared (to tell `(x)` grouping from `(x,)` one-tuples).
    fn parse_elements(&mut self, close: TokenKind) -> (Vec<ExprId>, bool) {
        let mut elements = Vec::new();
        let mut saw_comma = false;
        loop {
            self.skip_newlines();
            if self.peek_kind() == close || self.peek_kind() == TokenKind::Eof {
                break;
            }
            elements.push(self.parse_element());
            self.skip_newlines();
            if self.eat(TokenKind::Comma) {
                saw_comma = true;
            } else {
                break;
            }
        }
        (elements, saw_comma)
    }

    fn parse_element(&mut self) -> ExprId {
        // Label: `name: value` (a colon that is not an atom literal).
        if let TokenKind::Ident(name) = self.peek_kind() {
            if self.peek_at(1).kind == TokenKind::Colon && !self.at_atom_at(1) {
                let key_tok = self.advance();
                self.advance(); // colon
                self.skip_newlines();
                let key = self.alloc(ExprKind::Atom(name), key_tok.span);
                // Full expression so record patterns can carry defaults
                // (`key: pat = default`).
                let value = self.parse_expr();
                let span = key_tok.span.merge(self.span_of(value));
                return self.alloc(ExprKind::Labeled { key, value }, span);
            }
        }
        // String keys: `"a b": value`.
        if let TokenKind::Str(name) = self.peek_kind() {
            if self.peek_at(1).kind == TokenKind::Colon {
                let key_tok = self.advance();
                self.advance(); // colon
                self.skip_newlines();
                let key = self.alloc(ExprKind::Str(name), key_tok.span);
                let value = self.parse_expr();
                let span = key_tok.span.merge(self.span_of(value));
                return self.alloc(ExprKind::Labeled { key, value }, span);
            }
        }
        self.parse_expr_no_assign()
    }

    /// Is the token at `offset` a `:` starting an atom literal?
    fn at_atom_at(&self, offset: usize) -> bool {
        let colon = self.peek_at(offset);
        if colon.kind != TokenKind::Colon {
            return false;
        }
        let next = self.peek_at(offset + 1);
        matches!(next.kind, TokenKind::Ident(_)) && next.span.start == colon.span.end
    }

    /// `{...}`: record builder if it opens with `key:` or `...`, else a
    /// block of statements.
    fn parse_brace_group(&mut self) -> ExprId {
        let open = self.advance().span;
        let saved = std::mem::replace(&mut self.no_brace, false);
        let result = self.parse_brace_group_inner(open);
        self.no_brace = saved;
        result
    }

    fn parse_brace_group_inner(&mut self, open: Span) -> ExprId {
        self.skip_newlines();

        let is_record = match self.peek_kind() {
            TokenKind::Ellipsis => true,
            TokenKind::Ident(_) => {
                self.peek_at(1).kind == TokenKind::Colon && !self.at_atom_at(1)
            }
            TokenKind::Str(_) => self.peek_at(1).kind == TokenKind::Colon,
            _ => false,
        };

        if is_record {
            let (elements, _) = self.parse_elements(TokenKind::RBrace);
            self.expect(TokenKind::RBrace);
            let span = Span::new(open.start, self.prev_end());
            let range = self.arena.alloc_list(elements);
            return self.alloc(ExprKind::Tuple(range), span);
        }

        let mut stmts = Vec::new();
        self.skip_separators();
        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            let before = self.pos;
            stmts.push(self.parse_stmt());
            if self.pos == before {
                let tok = self.advance();
                self.diagnostics.push(
                    Diagnostic::error(ErrorCode::E0005)
                        .with_message(format!("unexpected {}", tok.kind.describe()))
                        .with_label(tok.span, "could not parse a statement here"),
                );
            }
            self.skip_separators();
        }
        self.expect(TokenKind::RBrace);
        let span = Span::new(open.start, self.prev_end());
        let range = self.arena.alloc_list(stmts);
        self.alloc(ExprKind::Block(range), span)
    }

    // Control forms

    fn parse_lambda(&mut self) -> ExprId {
        let start = self.advance().span;
        let mut params = Vec::new();
        while self.peek_kind() != TokenKind::Arrow && self.peek_kind() != TokenKind::Eof {
            let before = self.pos;
            params.push(self.parse_param());
            if self.pos == before {
                break;
            }
        }
        if params.is_empty() {
            // `fn -> body` takes a single ignored argument.
            params.push(self.alloc(ExprKind::Placeholder, start));
        }
        self.expect(TokenKind::Arrow);
        self.skip_newlines();
        let mut body = self.parse_expr();
        let span = start.merge(self.span_of(body));

        // Curry inner parameters; the outermost binds `self`.
        for &param in params.iter().skip(1).rev() {
            body = self.alloc(
                ExprKind::Fn {
                    param,
                    body,
                    top: false,
                },
                span,
            );
        }
        self.alloc(
            ExprKind::Fn {
                param: params[0],
                body,
                top: true,
            },
            span,
        )
    }

    fn parse_param(&mut self) -> ExprId {
        match self.peek_kind() {
            TokenKind::Mut | TokenKind::Like | TokenKind::Strict => {
                let tok = self.advance();
                let inner = self.parse_postfix();
                let span = tok.span.merge(self.span_of(inner));
                let kind = match tok.kind {
                    TokenKind::Mut => ExprKind::MutPat(inner),
                    TokenKind::Like => ExprKind::LikePat(inner),
                    _ => ExprKind::StrictPat(inner),
                };
                self.alloc(kind, span)
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_if(&mut self) -> ExprId {
        let start = self.advance().span;
        let cond = self.parse_expr_no_assign();
        self.expect(TokenKind::Then);
        self.skip_newlines();
        let then_branch = self.parse_expr();

        // `else` may sit on its own line; look past newlines, but restore
        // the separator if there is no else branch.
        let checkpoint = self.pos;
        self.skip_newlines();
        let else_branch = if self.eat(TokenKind::Else) {
            self.skip_newlines();
            self.parse_expr()
        } else {
            self.pos = checkpoint;
            ExprId::INVALID
        };

        let end = if else_branch.is_valid() {
            self.span_of(else_branch)
        } else {
            self.span_of(then_branch)
        };
        let span = start.merge(end);
        self.alloc(
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            },
            span,
        )
    }

    fn parse_match(&mut self) -> ExprId {
        let start = self.advance().span;
        let saved = self.no_brace;
        self.no_brace = true;
        let subject = self.parse_expr_no_assign();
        self.no_brace = saved;

        self.skip_newlines();
        self.expect(TokenKind::LBrace);
        let mut arms = Vec::new();
        self.skip_separators();
        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            let before = self.pos;
            let pattern = self.parse_expr_no_assign();
            self.expect(TokenKind::Arrow);
            self.skip_newlines();
            let body = self.parse_expr();
            let span = self.span_of(pattern).merge(self.span_of(body));
            arms.push(self.alloc(ExprKind::MatchArm { pattern, body }, span));
            if self.pos == before {
                self.advance();
            }
            if !self.eat(TokenKind::Comma) {
                self.skip_separators();
                if !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
                    continue;
                }
            }
            self.skip_separators();
        }
        self.expect(TokenKind::RBrace);
        let span = Span::new(start.start, self.prev_end());
        let range = self.arena.alloc_list(arms);
        self.alloc(ExprKind::Match { subject, arms: range }, span)
    }

    fn parse_for(&mut self) -> ExprId {
        let start = self.advance().span;
        let pattern = self.parse_param();
        self.expect(TokenKind::In);
        self.skip_newlines();
        let iter = self.parse_expr_no_assign();
        self.expect(TokenKind::Do);
        self.skip_newlines();
        let body = self.parse_expr();
        let span = start.merge(self.span_of(body));
        self.alloc(
            ExprKind::For {
                pattern,
                iter,
                body,
            },
            span,
        )
    }

    fn parse_mask(&mut self, is_without: bool) -> ExprId {
        let start = self.advance().span;
        self.expect(TokenKind::LBracket);
        let (tags, _) = self.parse_elements(TokenKind::RBracket);
        self.expect(TokenKind::RBracket);
        self.expect(TokenKind::Do);
        self.skip_newlines();
        let body = self.parse_expr();
        let span = start.merge(self.span_of(body));
        let range = self.arena.alloc_list(tags);
        let kind = if is_without {
            ExprKind::Without { tags: range, body }
        } else {
            ExprKind::Mask { tags: range, body }
        };
        self.alloc(kind, span)
    }

    fn parse_parallel(&mut self) -> ExprId {
        let start = self.advance().span;
        self.expect(TokenKind::LParen);
        let (elements, _) = self.parse_elements(TokenKind::RParen);
        self.expect(TokenKind::RParen);
        let span = Span::new(start.start, self.prev_end());
        let range = self.arena.alloc_list(elements);
        self.alloc(ExprKind::Parallel(range), span)
    }
}

fn binary_op(kind: TokenKind) -> BinaryOp {
    match kind {
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::NotEq,
        TokenKind::EqEqEq => BinaryOp::DeepEq,
        TokenKind::NotEqEq => BinaryOp::DeepNotEq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::LtEq => BinaryOp::LtEq,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::GtEq => BinaryOp::GtEq,
        TokenKind::In => BinaryOp::In,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Rem,
        TokenKind::Caret => BinaryOp::Pow,
        // parse_binary only routes operator tokens here.
        _ => BinaryOp::Add,
    }
}

#[cfg(test)]
mod tests;
