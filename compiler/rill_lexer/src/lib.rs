//! Rill lexer - turns source text into cooked tokens.
//!
//! Tokenization happens in two steps: a logos-derived raw pass
//! ([`raw_token`]) and a cooking pass that interns identifiers and string
//! contents, parses numeric literals, and reports lexical diagnostics.

mod raw_token;

use logos::Logos;

use raw_token::RawToken;
use rill_diagnostic::{Diagnostic, ErrorCode};
use rill_ir::{Name, Span, StringInterner};

/// A cooked token with its source span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Cooked token kinds consumed by the parser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(Name),
    Ident(Name),

    If,
    Then,
    Else,
    Match,
    Is,
    And,
    Or,
    Not,
    In,
    Fn,
    Do,
    Loop,
    While,
    For,
    Async,
    Await,
    Parallel,
    Inject,
    Mask,
    Without,
    Label,
    Mut,
    Export,
    Import,
    Try,
    Like,
    Strict,
    True,
    False,

    Walrus,
    Assign,
    PlusAssign,
    Arrow,
    Ellipsis,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    SendArrow,
    SendTry,
    RecvTry,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Colon,
    Dot,
    At,
    Caret,
    Underscore,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    Newline,
    Eof,
}

impl TokenKind {
    /// Short display name for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Number(_) => "number",
            TokenKind::Str(_) => "string",
            TokenKind::Ident(_) => "identifier",
            TokenKind::Newline => "newline",
            TokenKind::Eof => "end of input",
            TokenKind::If => "`if`",
            TokenKind::Then => "`then`",
            TokenKind::Else => "`else`",
            TokenKind::Match => "`match`",
            TokenKind::Is => "`is`",
            TokenKind::And => "`and`",
            TokenKind::Or => "`or`",
            TokenKind::Not => "`not`",
            TokenKind::In => "`in`",
            TokenKind::Fn => "`fn`",
            TokenKind::Do => "`do`",
            TokenKind::Loop => "`loop`",
            TokenKind::While => "`while`",
            TokenKind::For => "`for`",
            TokenKind::Async => "`async`",
            TokenKind::Await => "`await`",
            TokenKind::Parallel => "`parallel`",
            TokenKind::Inject => "`inject`",
            TokenKind::Mask => "`mask`",
            TokenKind::Without => "`without`",
            TokenKind::Label => "`label`",
            TokenKind::Mut => "`mut`",
            TokenKind::Export => "`export`",
            TokenKind::Import => "`import`",
            TokenKind::Try => "`try`",
            TokenKind::Like => "`like`",
            TokenKind::Strict => "`strict`",
            TokenKind::True => "`true`",
            TokenKind::False => "`false`",
            TokenKind::Walrus => "`:=`",
            TokenKind::Assign => "`=`",
            TokenKind::PlusAssign => "`+=`",
            TokenKind::Arrow => "`->`",
            TokenKind::Ellipsis => "`...`",
            TokenKind::EqEq => "`==`",
            TokenKind::NotEq => "`!=`",
            TokenKind::EqEqEq => "`===`",
            TokenKind::NotEqEq => "`!==`",
            TokenKind::Lt => "`<`",
            TokenKind::LtEq => "`<=`",
            TokenKind::Gt => "`>`",
            TokenKind::GtEq => "`>=`",
            TokenKind::SendArrow => "`<-`",
            TokenKind::SendTry => "`<-?`",
            TokenKind::RecvTry => "`?<-`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::Comma => "`,`",
            TokenKind::Semi => "`;`",
            TokenKind::Colon => "`:`",
            TokenKind::Dot => "`.`",
            TokenKind::At => "`@`",
            TokenKind::Caret => "`^`",
            TokenKind::Underscore => "`_`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
        }
    }
}

/// Tokenize `source`, interning names and string contents into `interner`.
///
/// Always produces a token stream ending in `Eof`; lexical problems are
/// returned as diagnostics alongside, with an `Error`-free best-effort
/// stream so the parser can keep going.
pub fn lex(source: &str, interner: &StringInterner) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();
    let mut lexer = RawToken::lexer(source);

    while let Some(result) = lexer.next() {
        let span = Span::from_range(lexer.span());
        let raw = match result {
            Ok(raw) => raw,
            Err(()) => {
                diagnostics.push(
                    Diagnostic::error(ErrorCode::E0005)
                        .with_message(format!("unexpected character `{}`", lexer.slice()))
                        .with_label(span, "not a Rill token"),
                );
                continue;
            }
        };

        let kind = match raw {
            RawToken::LineComment => continue,
            RawToken::Newline => TokenKind::Newline,

            RawToken::If => TokenKind::If,
            RawToken::Then => TokenKind::Then,
            RawToken::Else => TokenKind::Else,
            RawToken::Match => TokenKind::Match,
            RawToken::Is => TokenKind::Is,
            RawToken::And => TokenKind::And,
            RawToken::Or => TokenKind::Or,
            RawToken::Not => TokenKind::Not,
            RawToken::In => TokenKind::In,
            RawToken::Fn => TokenKind::Fn,
            RawToken::Do => TokenKind::Do,
            RawToken::Loop => TokenKind::Loop,
            RawToken::While => TokenKind::While,
            RawToken::For => TokenKind::For,
            RawToken::Async => TokenKind::Async,
            RawToken::Await => TokenKind::Await,
            RawToken::Parallel => TokenKind::Parallel,
            RawToken::Inject => TokenKind::Inject,
            RawToken::Mask => TokenKind::Mask,
            RawToken::Without => TokenKind::Without,
            RawToken::Label => TokenKind::Label,
            RawToken::Mut => TokenKind::Mut,
            RawToken::Export => TokenKind::Export,
            RawToken::Import => TokenKind::Import,
            RawToken::Try => TokenKind::Try,
            RawToken::Like => TokenKind::Like,
            RawToken::Strict => TokenKind::Strict,
            RawToken::True => TokenKind::True,
            RawToken::False => TokenKind::False,

            RawToken::Walrus => TokenKind::Walrus,
            RawToken::Assign => TokenKind::Assign,
            RawToken::PlusAssign => TokenKind::PlusAssign,
            RawToken::Arrow => TokenKind::Arrow,
            RawToken::Ellipsis => TokenKind::Ellipsis,
            RawToken::EqEq => TokenKind::EqEq,
            RawToken::NotEq => TokenKind::NotEq,
            RawToken::EqEqEq => TokenKind::EqEqEq,
            RawToken::NotEqEq => TokenKind::NotEqEq,
            RawToken::Lt => TokenKind::Lt,
            RawToken::LtEq => TokenKind::LtEq,
            RawToken::Gt => TokenKind::Gt,
            RawToken::GtEq => TokenKind::GtEq,
            RawToken::SendArrow => TokenKind::SendArrow,
            RawToken::SendTry => TokenKind::SendTry,
            RawToken::RecvTry => TokenKind::RecvTry,
            RawToken::LParen => TokenKind::LParen,
            RawToken::RParen => TokenKind::RParen,
            RawToken::LBracket => TokenKind::LBracket,
            RawToken::RBracket => TokenKind::RBracket,
            RawToken::LBrace => TokenKind::LBrace,
            RawToken::RBrace => TokenKind::RBrace,
            RawToken::Comma => TokenKind::Comma,
            RawToken::Semi => TokenKind::Semi,
            RawToken::Colon => TokenKind::Colon,
            RawToken::Dot => TokenKind::Dot,
            RawToken::At => TokenKind::At,
            RawToken::Caret => TokenKind::Caret,
            RawToken::Underscore => TokenKind::Underscore,
            RawToken::Plus => TokenKind::Plus,
            RawToken::Minus => TokenKind::Minus,
            RawToken::Star => TokenKind::Star,
            RawToken::Slash => TokenKind::Slash,
            RawToken::Percent => TokenKind::Percent,

            RawToken::Number => match cook_decimal(lexer.slice()) {
                Some(n) => TokenKind::Number(n),
                None => {
                    diagnostics.push(invalid_literal(span, lexer.slice()));
                    continue;
                }
            },
            RawToken::HexNumber => match cook_radix(lexer.slice(), 16) {
                Some(n) => TokenKind::Number(n),
                None => {
                    diagnostics.push(invalid_literal(span, lexer.slice()));
                    continue;
                }
            },
            RawToken::OctalNumber => match cook_radix(lexer.slice(), 8) {
                Some(n) => TokenKind::Number(n),
                None => {
                    diagnostics.push(invalid_literal(span, lexer.slice()));
                    continue;
                }
            },
            RawToken::BinaryNumber => match cook_radix(lexer.slice(), 2) {
                Some(n) => TokenKind::Number(n),
                None => {
                    diagnostics.push(invalid_literal(span, lexer.slice()));
                    continue;
                }
            },

            RawToken::String => {
                let slice = lexer.slice();
                let contents = cook_string(&slice[1..slice.len() - 1]);
                TokenKind::Str(interner.intern_owned(contents))
            }
            RawToken::UnterminatedString => {
                diagnostics.push(
                    Diagnostic::error(ErrorCode::E0002)
                        .with_message("unterminated string literal")
                        .with_label(span, "string starts here and never closes"),
                );
                continue;
            }

            RawToken::Ident => TokenKind::Ident(interner.intern(lexer.slice())),
        };

        tokens.push(Token { kind, span });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::from_range(source.len()..source.len()),
    });

    (tokens, diagnostics)
}

#[cold]
fn invalid_literal(span: Span, slice: &str) -> Diagnostic {
    Diagnostic::error(ErrorCode::E0003)
        .with_message(format!("invalid numeric literal `{slice}`"))
        .with_label(span, "cannot be parsed as a number")
}

/// Parse a decimal literal, ignoring `_` separators.
fn cook_decimal(slice: &str) -> Option<f64> {
    let cleaned: String = slice.chars().filter(|&c| c != '_').collect();
    cleaned.parse().ok()
}

/// Parse a radix literal (`0x`/`0o`/`0b` prefix), ignoring `_` separators.
fn cook_radix(slice: &str, radix: u32) -> Option<f64> {
    let digits: String = slice[2..].chars().filter(|&c| c != '_').collect();
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(&digits, radix).ok().map(|n| n as f64)
}

/// Process escape sequences in a string literal body.
fn cook_string(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            // Unknown escapes pass through verbatim.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let interner = StringInterner::new();
        let (tokens, diags) = lex(source, &interner);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_declaration() {
        let interner = StringInterner::new();
        let (tokens, diags) = lex("x := 1", &interner);
        assert!(diags.is_empty());
        let x = interner.intern("x");
        assert_eq!(tokens[0].kind, TokenKind::Ident(x));
        assert_eq!(tokens[1].kind, TokenKind::Walrus);
        assert_eq!(tokens[2].kind, TokenKind::Number(1.0));
        assert_eq!(tokens[3].kind, TokenKind::Eof);
    }

    #[test]
    fn test_lex_operators_longest_match() {
        assert_eq!(
            kinds("=== == != !== <- <-? ?<- <= ..."),
            vec![
                TokenKind::EqEqEq,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::NotEqEq,
                TokenKind::SendArrow,
                TokenKind::SendTry,
                TokenKind::RecvTry,
                TokenKind::LtEq,
                TokenKind::Ellipsis,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_numbers() {
        assert_eq!(
            kinds("42 3.14 1_000 0xff 0o17 0b101 2.5e-8"),
            vec![
                TokenKind::Number(42.0),
                TokenKind::Number(3.14),
                TokenKind::Number(1000.0),
                TokenKind::Number(255.0),
                TokenKind::Number(15.0),
                TokenKind::Number(5.0),
                TokenKind::Number(2.5e-8),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_invalid_radix_literal() {
        let interner = StringInterner::new();
        let (_, diags) = lex("0x", &interner);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, ErrorCode::E0003);

        let (_, diags) = lex("0b102", &interner);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, ErrorCode::E0003);
    }

    #[test]
    fn test_lex_string_with_escapes() {
        let interner = StringInterner::new();
        let (tokens, diags) = lex(r#""a\nb""#, &interner);
        assert!(diags.is_empty());
        let TokenKind::Str(name) = tokens[0].kind else {
            panic!("expected string token");
        };
        assert_eq!(interner.lookup(name), "a\nb");
    }

    #[test]
    fn test_lex_unterminated_string() {
        let interner = StringInterner::new();
        let (_, diags) = lex("\"oops", &interner);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, ErrorCode::E0002);
    }

    #[test]
    fn test_lex_comments_skipped() {
        assert_eq!(
            kinds("1 // comment\n2"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Newline,
                TokenKind::Number(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_vs_idents() {
        let interner = StringInterner::new();
        let (tokens, _) = lex("if iffy", &interner);
        assert_eq!(tokens[0].kind, TokenKind::If);
        let iffy = interner.intern("iffy");
        assert_eq!(tokens[1].kind, TokenKind::Ident(iffy));
    }
}
