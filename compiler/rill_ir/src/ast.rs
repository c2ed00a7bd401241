//! The Rill syntax tree.
//!
//! Expressions are arena-allocated and referenced by `ExprId` indices, not
//! boxes; child lists live in a shared side array addressed by `ExprRange`.
//! Patterns are a subset of the expression grammar, so there is no separate
//! pattern tree: the pattern compiler interprets these same nodes.

use std::fmt;

use crate::{Name, Span};

/// Index of an expression in an [`ExprArena`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    /// Sentinel for "no expression" (missing else branch, default export).
    pub const INVALID: ExprId = ExprId(u32::MAX);

    #[inline]
    pub const fn new(index: u32) -> Self {
        ExprId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "e{}", self.0)
        } else {
            write!(f, "e-")
        }
    }
}

/// A contiguous run of child ids in the arena's side array.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct ExprRange {
    pub start: u32,
    pub len: u32,
}

impl ExprRange {
    pub const EMPTY: ExprRange = ExprRange { start: 0, len: 0 };

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// Binary operators that evaluate both operands strictly.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    NotEq,
    DeepEq,
    DeepNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
}

/// Unary operators that evaluate their operand strictly.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum UnaryOp {
    Neg,
    Not,
    Await,
}

/// Expression node.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} @ {:?}", self.kind, self.span)
    }
}

/// Expression variants. All children are indices, not boxes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ExprKind {
    /// Number literal (stored as bits for Hash).
    Number(u64),
    /// String literal (interned).
    Str(Name),
    /// Atom literal: `:name`
    Atom(Name),
    /// Boolean literal.
    Bool(bool),
    /// Name reference.
    Ident(Name),
    /// Placeholder: `_`
    Placeholder,

    /// Parenthesised expression; `ExprId::INVALID` = `()` (the empty list).
    Parens(ExprId),
    /// Single-child square brackets: dynamic name lookup `[e]`.
    Brackets(ExprId),
    /// Tuple / list / record builder: `(a, k: v, ...rest)` or `[a, b, c]`.
    /// Elements may be `Spread` and `Labeled` nodes.
    Tuple(ExprRange),
    /// Spread element: `...e`
    Spread(ExprId),
    /// Labeled element: `k: v` (key is an `Atom` node or a computed key).
    Labeled { key: ExprId, value: ExprId },
    /// Statement sequence in braces, own lexical scope.
    Block(ExprRange),
    /// Index access: `target[index]` (also `target.name` with an atom key).
    Index { target: ExprId, index: ExprId },

    /// Strict binary operation.
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    /// Strict unary operation.
    Unary { op: UnaryOp, operand: ExprId },

    /// Short-circuit conjunction.
    And { lhs: ExprId, rhs: ExprId },
    /// Short-circuit disjunction.
    Or { lhs: ExprId, rhs: ExprId },
    /// Conditional; `else_branch` may be `ExprId::INVALID`.
    If {
        cond: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    },
    /// Match expression; arms are `MatchArm` nodes.
    Match { subject: ExprId, arms: ExprRange },
    /// One arm of a match.
    MatchArm { pattern: ExprId, body: ExprId },
    /// Pattern test: `e is p`.
    Is { value: ExprId, pattern: ExprId },

    /// `loop body`
    Loop { body: ExprId },
    /// `while cond do body`
    While { cond: ExprId, body: ExprId },
    /// `for pattern in iter do body`
    For {
        pattern: ExprId,
        iter: ExprId,
        body: ExprId,
    },

    /// Function literal; `top` marks the outermost of a curried chain
    /// (the one that binds `self`).
    Fn {
        param: ExprId,
        body: ExprId,
        top: bool,
    },
    /// Application by juxtaposition.
    Apply { func: ExprId, arg: ExprId },
    /// `try e`
    TryOp(ExprId),

    /// `inject handlers do body`
    Inject { handlers: ExprId, body: ExprId },
    /// `mask [tags] do body`
    Mask { tags: ExprRange, body: ExprId },
    /// `without [tags] do body`
    Without { tags: ExprRange, body: ExprId },
    /// `label name body`
    CodeLabel { name: Name, body: ExprId },

    /// `async e`
    Async(ExprId),
    /// `parallel (e1, e2, ...)`
    Parallel(ExprRange),
    /// `channel <- value`
    Send { channel: ExprId, value: ExprId },
    /// `<- channel`
    Receive(ExprId),
    /// `channel <-? value`
    TrySend { channel: ExprId, value: ExprId },
    /// `?<- channel`
    TryReceive(ExprId),

    /// Declaration: `pattern := value`
    Declare { pattern: ExprId, value: ExprId },
    /// Assignment: `pattern = value`
    Assign { pattern: ExprId, value: ExprId },
    /// Compound assignment: `pattern += value`
    AddAssign { pattern: ExprId, value: ExprId },
    /// Export: `export pattern := value`; `pattern == INVALID` is a
    /// default export `export value`.
    Export { pattern: ExprId, value: ExprId },
    /// `import "name"`
    Import(Name),

    /// Pattern: match-by-value against an evaluated expression: `^e`.
    Pin(ExprId),
    /// Pattern: bind both sides: `p @ q`.
    Bind { left: ExprId, right: ExprId },
    /// Pattern: mutable binding modifier: `mut p`.
    MutPat(ExprId),
    /// Pattern: relaxed-match modifier: `like p`.
    LikePat(ExprId),
    /// Pattern: strict-match modifier: `strict p`.
    StrictPat(ExprId),

    /// Parse error placeholder.
    Error,
}

/// Arena holding every expression of one source file.
#[derive(Default)]
pub struct ExprArena {
    exprs: Vec<Expr>,
    lists: Vec<ExprId>,
}

impl ExprArena {
    pub fn new() -> Self {
        ExprArena::default()
    }

    /// Allocate an expression, returning its id.
    pub fn alloc(&mut self, kind: ExprKind, span: Span) -> ExprId {
        let id = u32::try_from(self.exprs.len())
            .unwrap_or_else(|_| panic!("expression arena exceeded capacity"));
        self.exprs.push(Expr::new(kind, span));
        ExprId::new(id)
    }

    /// Allocate a child list, returning its range.
    pub fn alloc_list(&mut self, children: Vec<ExprId>) -> ExprRange {
        let start = u32::try_from(self.lists.len())
            .unwrap_or_else(|_| panic!("expression arena exceeded capacity"));
        let len = u32::try_from(children.len())
            .unwrap_or_else(|_| panic!("expression arena exceeded capacity"));
        self.lists.extend(children);
        ExprRange { start, len }
    }

    /// Get an expression by id.
    #[inline]
    pub fn get(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// Get a child list by range.
    #[inline]
    pub fn list(&self, range: ExprRange) -> &[ExprId] {
        let start = range.start as usize;
        &self.lists[start..start + range.len as usize]
    }

    /// Number of expressions allocated.
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

// Size assertions to prevent accidental regressions.
#[cfg(target_pointer_width = "64")]
mod size_asserts {
    use super::{Expr, ExprKind};
    crate::static_assert_size!(ExprKind, 16);
    crate::static_assert_size!(Expr, 24);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_alloc_and_get() {
        let mut arena = ExprArena::new();
        let a = arena.alloc(ExprKind::Number(1.0f64.to_bits()), Span::new(0, 1));
        let b = arena.alloc(ExprKind::Placeholder, Span::new(2, 3));
        assert_ne!(a, b);
        assert!(matches!(arena.get(a).kind, ExprKind::Number(_)));
        assert!(matches!(arena.get(b).kind, ExprKind::Placeholder));
    }

    #[test]
    fn test_arena_lists() {
        let mut arena = ExprArena::new();
        let a = arena.alloc(ExprKind::Placeholder, Span::DUMMY);
        let b = arena.alloc(ExprKind::Placeholder, Span::DUMMY);
        let range = arena.alloc_list(vec![a, b]);
        assert_eq!(arena.list(range), &[a, b]);
        assert_eq!(arena.list(ExprRange::EMPTY), &[] as &[ExprId]);
    }

    #[test]
    fn test_invalid_id() {
        assert!(!ExprId::INVALID.is_valid());
        assert!(ExprId::new(0).is_valid());
    }
}
