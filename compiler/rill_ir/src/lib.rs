//! Rill IR - spans, interned names, and the syntax tree.
//!
//! This crate is the vocabulary shared by the lexer, the parser, and the
//! evaluator: byte-offset [`Span`]s, interned [`Name`]s, and the
//! arena-allocated expression tree ([`ExprArena`], [`ExprKind`]).

/// Assert that a type has an exact size, at compile time.
///
/// Used to keep hot node types from silently growing.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

mod ast;
mod interner;
mod span;

pub use ast::{BinaryOp, Expr, ExprArena, ExprId, ExprKind, ExprRange, UnaryOp};
pub use interner::{Name, SharedInterner, StringInterner};
pub use span::Span;
