//! The pattern matcher.
//!
//! Patterns are a subset of the expression grammar; this module compiles
//! those nodes once per site into closures producing a [`PatternMatch`].
//! The matcher is the single entry point for declaration (`:=`),
//! assignment (`=`), compound assignment (`+=`), match arms, `is` tests,
//! and exports.

use std::rc::Rc;

use crate::error::{self, EvalResult, RuntimeError};
use crate::exec::{Compiled, Compiler, Vm};
use crate::value::{Record, Value};
use rill_ir::{ExprId, ExprKind, Name, Span, UnaryOp};

/// Where a binding lands when a pattern is applied.
#[derive(Clone, Debug)]
pub enum BindKey {
    /// A plain name.
    Name(Name),
    /// A compound l-value `target[index]`, mutated in place on assignment.
    Slot { target: Value, index: Value },
}

/// The result of testing a pattern against a value.
#[derive(Default)]
pub struct PatternMatch {
    pub matched: bool,
    /// Names to bind immutably (on assignment these hold the new values).
    pub readonly: Vec<(BindKey, Value)>,
    /// Names to bind mutably.
    pub mutable: Vec<(BindKey, Value)>,
    /// Names that would have been bound had the match gone the other way.
    pub not_envs: Vec<(Name, Value)>,
}

impl PatternMatch {
    pub fn success() -> Self {
        PatternMatch {
            matched: true,
            ..Default::default()
        }
    }

    pub fn failure() -> Self {
        PatternMatch::default()
    }

    /// Fold a child result into this one. A failed child fails the whole
    /// match and demotes every gathered binding to `not_envs`.
    fn absorb(&mut self, child: PatternMatch) {
        if !child.matched {
            self.matched = false;
        }
        self.readonly.extend(child.readonly);
        self.mutable.extend(child.mutable);
        self.not_envs.extend(child.not_envs);
    }

    /// Move all name bindings into `not_envs` (used on failure and by
    /// negation).
    fn demote(&mut self) {
        let drain = self
            .readonly
            .drain(..)
            .chain(self.mutable.drain(..))
            .filter_map(|(key, value)| match key {
                BindKey::Name(name) => Some((name, value)),
                BindKey::Slot { .. } => None,
            });
        let demoted: Vec<_> = drain.collect();
        self.not_envs.extend(demoted);
    }

    /// Invert for a `not` pattern: swap bindings with `not_envs`.
    fn negate(mut self) -> Self {
        let matched = !self.matched;
        let promoted: Vec<(BindKey, Value)> = self
            .not_envs
            .drain(..)
            .map(|(name, value)| (BindKey::Name(name), value))
            .collect();
        let demoted: Vec<(Name, Value)> = self
            .readonly
            .drain(..)
            .chain(self.mutable.drain(..))
            .filter_map(|(key, value)| match key {
                BindKey::Name(name) => Some((name, value)),
                BindKey::Slot { .. } => None,
            })
            .collect();
        PatternMatch {
            matched,
            readonly: promoted,
            mutable: Vec::new(),
            not_envs: demoted,
        }
    }
}

/// A compiled pattern: `(value, context) -> PatternMatch`.
pub type CompiledPattern = Rc<dyn Fn(&mut Vm, &Value) -> Result<PatternMatch, RuntimeError>>;

/// Modifiers inherited down a pattern tree.
#[derive(Copy, Clone, Default)]
struct PatFlags {
    /// Bind mutably (`mut p`).
    mutable: bool,
    /// `like` mode: missing record fields and null values do not fail.
    relaxed: bool,
}

/// Compile a pattern node.
pub fn compile_pattern(compiler: &Compiler, id: ExprId) -> CompiledPattern {
    compile_with(compiler, id, PatFlags::default())
}

fn compile_with(compiler: &Compiler, id: ExprId, flags: PatFlags) -> CompiledPattern {
    let expr = compiler.arena().get(id);
    let span = expr.span;
    match expr.kind {
        ExprKind::Placeholder => Rc::new(|_, _| Ok(PatternMatch::success())),

        ExprKind::Ident(name) => {
            let key = if flags.mutable {
                Bind::Mutable
            } else {
                Bind::Readonly
            };
            Rc::new(move |_, value| {
                let mut m = PatternMatch::success();
                let entry = (BindKey::Name(name), value.clone());
                match key {
                    Bind::Mutable => m.mutable.push(entry),
                    Bind::Readonly => m.readonly.push(entry),
                }
                Ok(m)
            })
        }

        ExprKind::Number(bits) => literal_pattern(Value::Number(f64::from_bits(bits))),
        ExprKind::Bool(b) => literal_pattern(Value::Bool(b)),
        ExprKind::Str(name) => {
            let text = compiler.interner().lookup(name);
            literal_pattern(Value::string(text))
        }
        ExprKind::Atom(name) => {
            let atom = compiler.atom_of(name);
            literal_pattern(Value::Atom(atom))
        }

        ExprKind::Parens(child) => {
            if child.is_valid() {
                compile_with(compiler, child, flags)
            } else {
                // `()` matches the empty list.
                Rc::new(|_, value| {
                    Ok(match value {
                        Value::List(items) if items.borrow().is_empty() => {
                            PatternMatch::success()
                        }
                        _ => PatternMatch::failure(),
                    })
                })
            }
        }

        ExprKind::Pin(inner) => {
            let compiled = compiler.compile(inner);
            Rc::new(move |vm, value| {
                let expected = compiled(vm)?;
                Ok(if expected.shallow_eq(value) {
                    PatternMatch::success()
                } else {
                    PatternMatch::failure()
                })
            })
        }

        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => {
            let inner = compile_with(compiler, operand, flags);
            Rc::new(move |vm, value| Ok(inner(vm, value)?.negate()))
        }

        ExprKind::Bind { left, right } => {
            let left = compile_with(compiler, left, flags);
            let right = compile_with(compiler, right, flags);
            Rc::new(move |vm, value| {
                let mut m = left(vm, value)?;
                if m.matched {
                    m.absorb(right(vm, value)?);
                } else {
                    m.demote();
                }
                Ok(m)
            })
        }

        ExprKind::MutPat(inner) => compile_with(
            compiler,
            inner,
            PatFlags {
                mutable: true,
                ..flags
            },
        ),
        ExprKind::LikePat(inner) => compile_with(
            compiler,
            inner,
            PatFlags {
                relaxed: true,
                ..flags
            },
        ),
        ExprKind::StrictPat(inner) => compile_with(
            compiler,
            inner,
            PatFlags {
                relaxed: false,
                ..flags
            },
        ),

        ExprKind::Tuple(range) => compile_tuple(compiler, range, flags, span),

        ExprKind::Index { target, index } => {
            // Compound assignment target `a[i]`; the value binds to the
            // slot and assignment mutates the container in place.
            let target = compiler.compile(target);
            let index = compiler.compile(index);
            Rc::new(move |vm, value| {
                let target = target(vm)?;
                let index = index(vm)?;
                let mut m = PatternMatch::success();
                m.readonly
                    .push((BindKey::Slot { target, index }, value.clone()));
                Ok(m)
            })
        }

        _ => Rc::new(move |_, _| {
            Err(error::invalid_pattern("this expression form cannot be matched against")
                .with_span(span))
        }),
    }
}

#[derive(Copy, Clone)]
enum Bind {
    Readonly,
    Mutable,
}

fn literal_pattern(expected: Value) -> CompiledPattern {
    Rc::new(move |_, value| {
        Ok(if expected.shallow_eq(value) {
            PatternMatch::success()
        } else {
            PatternMatch::failure()
        })
    })
}

/// One compiled element of a tuple or record pattern.
enum ElementPattern {
    Plain(CompiledPattern),
    /// `...rest` — binds the unconsumed remainder.
    Spread { name: Name, mutable: bool },
    /// `key: pattern`, with an optional default used when the key is
    /// absent.
    Field {
        key: Compiled,
        pattern: CompiledPattern,
        default: Option<Compiled>,
    },
}

fn compile_tuple(
    compiler: &Compiler,
    range: rill_ir::ExprRange,
    flags: PatFlags,
    span: Span,
) -> CompiledPattern {
    let mut elements = Vec::new();
    let mut has_fields = false;
    let mut spread_seen = false;

    for &child in compiler.arena().list(range) {
        let kind = compiler.arena().get(child).kind;
        match kind {
            ExprKind::Spread(inner) => {
                let (name, mutable) = match compiler.arena().get(inner).kind {
                    ExprKind::Ident(name) => (name, flags.mutable),
                    ExprKind::MutPat(p) => match compiler.arena().get(p).kind {
                        ExprKind::Ident(name) => (name, true),
                        _ => {
                            return invalid_spread_pattern(span);
                        }
                    },
                    _ => {
                        return invalid_spread_pattern(span);
                    }
                };
                if spread_seen {
                    return invalid_spread_pattern(span);
                }
                spread_seen = true;
                elements.push(ElementPattern::Spread { name, mutable });
            }
            ExprKind::Labeled { key, value } => {
                has_fields = true;
                // `key: pat = default` parses as an assignment node in the
                // value position; unpack it into pattern + default.
                let (pattern_id, default) = match compiler.arena().get(value).kind {
                    ExprKind::Assign {
                        pattern,
                        value: default,
                    } => (pattern, Some(compiler.compile(default))),
                    _ => (value, None),
                };
                elements.push(ElementPattern::Field {
                    key: compiler.compile(key),
                    pattern: compile_with(compiler, pattern_id, flags),
                    default,
                });
            }
            _ => {
                elements.push(ElementPattern::Plain(compile_with(compiler, child, flags)));
            }
        }
    }

    let elements = Rc::new(elements);
    let relaxed = flags.relaxed;
    if has_fields {
        Rc::new(move |vm, value| match_record(vm, &elements, value, relaxed))
    } else {
        Rc::new(move |vm, value| match_list(vm, &elements, value, relaxed))
    }
}

fn invalid_spread_pattern(span: Span) -> CompiledPattern {
    Rc::new(move |_, _| {
        Err(error::invalid_spread("spread in a pattern must bind a plain name").with_span(span))
    })
}

/// Tuple matching: fixed prefix, optional spread middle, right-anchored
/// suffix.
fn match_list(
    vm: &mut Vm,
    elements: &Rc<Vec<ElementPattern>>,
    value: &Value,
    relaxed: bool,
) -> Result<PatternMatch, RuntimeError> {
    let items = match value {
        Value::List(items) => items.borrow().clone(),
        Value::Null if relaxed => Vec::new(),
        _ => return Ok(PatternMatch::failure()),
    };

    let spread_at = elements
        .iter()
        .position(|e| matches!(e, ElementPattern::Spread { .. }));
    let fixed = elements.len() - usize::from(spread_at.is_some());

    if items.len() < fixed && !relaxed {
        return Ok(PatternMatch::failure());
    }

    let mut m = PatternMatch::success();
    let mut item_idx = 0usize;

    for (elem_idx, element) in elements.iter().enumerate() {
        match element {
            ElementPattern::Spread { name, mutable } => {
                // Everything up to the right-anchored suffix.
                let suffix = elements.len() - elem_idx - 1;
                let take = items.len().saturating_sub(item_idx + suffix);
                let middle: Vec<Value> = items[item_idx..item_idx + take].to_vec();
                item_idx += take;
                let entry = (BindKey::Name(*name), Value::list(middle));
                if *mutable {
                    m.mutable.push(entry);
                } else {
                    m.readonly.push(entry);
                }
            }
            ElementPattern::Plain(pattern) => {
                let item = items.get(item_idx).cloned().unwrap_or(Value::Null);
                if item_idx >= items.len() && !relaxed {
                    m.demote();
                    return Ok(m);
                }
                item_idx += 1;
                let child = pattern(vm, &item)?;
                m.absorb(child);
                if !m.matched {
                    m.demote();
                    return Ok(m);
                }
            }
            ElementPattern::Field { .. } => {
                return Err(error::invalid_pattern(
                    "cannot mix labeled fields into a tuple pattern",
                ));
            }
        }
    }

    // Leftover items with no spread to absorb them fail a strict match.
    if spread_at.is_none() && item_idx < items.len() && !relaxed {
        m.demote();
        return Ok(m);
    }

    Ok(m)
}

/// Record matching: labeled fields consume keys; a spread binds the rest.
fn match_record(
    vm: &mut Vm,
    elements: &Rc<Vec<ElementPattern>>,
    value: &Value,
    relaxed: bool,
) -> Result<PatternMatch, RuntimeError> {
    let entries: Record = match value {
        Value::Record(entries) => entries.borrow().clone(),
        Value::Null if relaxed => Record::default(),
        _ => return Ok(PatternMatch::failure()),
    };

    let mut m = PatternMatch::success();
    let mut consumed: Vec<Value> = Vec::new();

    for element in elements.iter() {
        match element {
            ElementPattern::Field {
                key,
                pattern,
                default,
            } => {
                let key = key(vm)?;
                let found = entries.get(&key).cloned();
                consumed.push(key);
                let field_value = match found {
                    Some(v) => v,
                    None => match default {
                        Some(default) => default(vm)?,
                        None if relaxed => Value::Null,
                        None => {
                            m.demote();
                            return Ok(m);
                        }
                    },
                };
                let child = pattern(vm, &field_value)?;
                m.absorb(child);
                if !m.matched {
                    m.demote();
                    return Ok(m);
                }
            }
            ElementPattern::Spread { name, mutable } => {
                let mut rest = Record::default();
                for (k, v) in &entries {
                    if !consumed.iter().any(|c| c == k) {
                        rest.insert(k.clone(), v.clone());
                    }
                }
                let entry = (BindKey::Name(*name), Value::record(rest));
                if *mutable {
                    m.mutable.push(entry);
                } else {
                    m.readonly.push(entry);
                }
            }
            ElementPattern::Plain(_) => {
                return Err(error::invalid_pattern(
                    "cannot mix positional elements into a record pattern",
                ));
            }
        }
    }

    Ok(m)
}

/// How a successful match is applied to the environment.
pub enum ApplyMode {
    /// `:=` — introduce new bindings in the current scope.
    Declare,
    /// `=` — overwrite existing bindings and slots.
    Assign,
    /// `+=` — combine old and new values, then overwrite.
    Increment,
}

/// Apply a successful pattern match to the environment.
pub fn apply_bindings(vm: &mut Vm, m: &PatternMatch, mode: &ApplyMode) -> EvalResult {
    match mode {
        ApplyMode::Declare => {
            for (key, value) in &m.readonly {
                declare_one(vm, key, value.clone(), true)?;
            }
            for (key, value) in &m.mutable {
                declare_one(vm, key, value.clone(), false)?;
            }
        }
        ApplyMode::Assign => {
            for (key, value) in m.readonly.iter().chain(m.mutable.iter()) {
                assign_one(vm, key, value.clone())?;
            }
        }
        ApplyMode::Increment => {
            for (key, value) in m.readonly.iter().chain(m.mutable.iter()) {
                increment_one(vm, key, value.clone())?;
            }
        }
    }
    Ok(Value::Null)
}

fn declare_one(vm: &mut Vm, key: &BindKey, value: Value, readonly: bool) -> EvalResult {
    match key {
        BindKey::Name(name) => {
            let ok = if readonly {
                vm.env.add_readonly(*name, value)
            } else {
                vm.env.add(*name, value)
            };
            if !ok {
                let text = vm.interner.lookup(*name);
                return Err(error::evaluation(format!(
                    "`{text}` is already declared in this scope"
                )));
            }
            Ok(Value::Null)
        }
        BindKey::Slot { .. } => Err(error::invalid_pattern(
            "an index target cannot appear in a declaration",
        )),
    }
}

fn assign_one(vm: &mut Vm, key: &BindKey, value: Value) -> EvalResult {
    match key {
        BindKey::Name(name) => {
            use crate::env::AssignError;
            match vm.env.set(*name, value) {
                Ok(()) => Ok(Value::Null),
                Err(AssignError::Immutable) => {
                    Err(error::immutable_assignment(vm.interner.lookup(*name)))
                }
                Err(AssignError::Undefined) => {
                    let text = vm.interner.lookup(*name);
                    let closest = vm.closest_name(text);
                    Err(error::undeclared_assignment(text, closest.as_deref()))
                }
            }
        }
        BindKey::Slot { target, index } => store_slot(target, index, value),
    }
}

fn increment_one(vm: &mut Vm, key: &BindKey, addend: Value) -> EvalResult {
    let old = match key {
        BindKey::Name(name) => {
            let text = vm.interner.lookup(*name);
            match vm.env.get(*name) {
                Some(v) => v,
                None => {
                    let closest = vm.closest_name(text);
                    return Err(error::undeclared_assignment(text, closest.as_deref()));
                }
            }
        }
        BindKey::Slot { target, index } => crate::exec::index_value(vm, target, index)?,
    };

    let combined = match (&old, &addend) {
        (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
        (Value::Str(a), Value::Str(b)) => Value::string(format!("{}{}", &**a, &**b)),
        (Value::Number(_) | Value::Str(_), other) => {
            return Err(error::invalid_increment_value(other));
        }
        (other, _) => {
            let name = match key {
                BindKey::Name(name) => vm.interner.lookup(*name).to_string(),
                BindKey::Slot { .. } => "the index target".to_string(),
            };
            return Err(error::invalid_increment(&name, other));
        }
    };
    assign_one(vm, key, combined)
}

/// Write through a compound l-value.
fn store_slot(target: &Value, index: &Value, value: Value) -> EvalResult {
    match (target, index) {
        (Value::List(items), Value::Number(n)) => {
            let mut items = items.borrow_mut();
            let idx = *n as isize;
            if *n < 0.0 || n.fract() != 0.0 || idx as usize >= items.len() {
                return Err(error::index_out_of_bounds(*n, items.len()));
            }
            items[idx as usize] = value;
            Ok(Value::Null)
        }
        (Value::Record(entries), key) => {
            entries.borrow_mut().insert(key.clone(), value);
            Ok(Value::Null)
        }
        (other, index) => Err(error::invalid_index(other, index)),
    }
}
