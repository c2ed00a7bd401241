//! Rill parser - tokens to syntax tree.
//!
//! A hand-written Pratt parser. Patterns share the expression grammar, so
//! there is a single `expr` entry point; pattern-only nodes (`pin`, `mut`,
//! `@`-bind, `like`/`strict`) parse as ordinary prefixes and infixes and
//! are validated by the evaluator's pattern compiler.

mod parser;

pub use parser::{parse_source, parse_tokens, Parsed};
