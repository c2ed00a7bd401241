//! Raw token definition.
//!
//! The `RawToken` enum is the logos-derived tokenizer output before
//! string interning, escape cooking, and numeric parsing.

use logos::Logos;

/// Raw token from logos (before cooking).
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r]+")] // Skip horizontal whitespace
pub(crate) enum RawToken {
    #[regex(r"//[^\n]*")]
    LineComment,

    #[token("\n")]
    Newline,

    // Keywords
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("match")]
    Match,
    #[token("is")]
    Is,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("in")]
    In,
    #[token("fn")]
    Fn,
    #[token("do")]
    Do,
    #[token("loop")]
    Loop,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("async")]
    Async,
    #[token("await")]
    Await,
    #[token("parallel")]
    Parallel,
    #[token("inject")]
    Inject,
    #[token("mask")]
    Mask,
    #[token("without")]
    Without,
    #[token("label")]
    Label,
    #[token("mut")]
    Mut,
    #[token("export")]
    Export,
    #[token("import")]
    Import,
    #[token("try")]
    Try,
    #[token("like")]
    Like,
    #[token("strict")]
    Strict,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Punctuation and operators, longest first where prefixes overlap.
    #[token(":=")]
    Walrus,
    #[token("+=")]
    PlusAssign,
    #[token("->")]
    Arrow,
    #[token("...")]
    Ellipsis,
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    NotEqEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<-?")]
    SendTry,
    #[token("<-")]
    SendArrow,
    #[token("?<-")]
    RecvTry,
    #[token("=")]
    Assign,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("@")]
    At,
    #[token("^")]
    Caret,
    #[token("_", priority = 3)]
    Underscore,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    // Literals. Radix literals keep their tail loose so the cooker can
    // report an invalid-literal diagnostic instead of a generic lex error.
    #[regex(r"0[xX][0-9a-zA-Z_]*")]
    HexNumber,
    #[regex(r"0[oO][0-9a-zA-Z_]*")]
    OctalNumber,
    #[regex(r"0[bB][0-9a-zA-Z_]*")]
    BinaryNumber,
    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?([eE][+-]?[0-9]+)?")]
    Number,

    /// String literal including quotes; may be unterminated at EOF.
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    String,
    #[regex(r#""([^"\\\n]|\\.)*"#)]
    UnterminatedString,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}
