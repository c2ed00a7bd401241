//! Runtime values for the Rill evaluator.
//!
//! `Value` is a closed tagged sum. Scalars are inline; everything else
//! lives behind [`Heap`] handles created only through the factory methods
//! here, so identity (`==`) and structural (`===`) equality have one
//! authoritative implementation.
//!
//! Records are insertion-ordered maps from `Value` to `Value`. The `Eq` and
//! `Hash` impls on `Value` exist for record keys: scalars compare by
//! content (numbers by bit pattern, so a NaN key can be retrieved),
//! compound values by heap identity. The `==` operator of the language is
//! [`Value::shallow_eq`], which differs only on NaN, where IEEE rules win.

mod heap;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};

pub use heap::Heap;

use crate::atoms::{Atom, AtomTable};
use crate::effect::EffectData;
use crate::exec::{Closure, NativeFn};
use crate::sched::{ChannelState, TaskState};
use rill_ir::StringInterner;

/// Insertion-ordered mapping from value keys to values.
pub type Record = IndexMap<Value, Value>;

/// A value paired with its method-lookup prototypes.
pub struct Prototyped {
    pub inner: Value,
    /// Records consulted in order on index miss.
    pub protos: Vec<Value>,
}

/// Runtime value in the Rill evaluator.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    /// IEEE-754 double; the only numeric type.
    Number(f64),
    Str(Heap<String>),
    /// Interned symbol (record key, effect tag).
    Atom(Atom),
    /// Ordered, mutable sequence.
    List(Heap<RefCell<Vec<Value>>>),
    /// Insertion-ordered mapping.
    Record(Heap<RefCell<Record>>),
    Channel(Heap<RefCell<ChannelState>>),
    Task(Heap<RefCell<TaskState>>),
    /// User function (closure).
    Fn(Heap<Closure>),
    /// Host function.
    Native(Heap<NativeFn>),
    /// A callable earmarked as an effect interceptor.
    Handler(Heap<Value>),
    /// A value with an explicit prototype chain.
    Prototyped(Heap<Prototyped>),
    /// Reified suspended computation propagating outward.
    Effect(Heap<EffectData>),
}

// Factory methods (the only way to construct heap values)

impl Value {
    #[inline]
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Heap::new(s.into()))
    }

    #[inline]
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Heap::new(RefCell::new(items)))
    }

    #[inline]
    pub fn record(entries: Record) -> Self {
        Value::Record(Heap::new(RefCell::new(entries)))
    }

    #[inline]
    pub fn closure(closure: Closure) -> Self {
        Value::Fn(Heap::new(closure))
    }

    #[inline]
    pub fn native(native: NativeFn) -> Self {
        Value::Native(Heap::new(native))
    }

    #[inline]
    pub fn handler(callable: Value) -> Self {
        Value::Handler(Heap::new(callable))
    }

    #[inline]
    pub fn prototyped(inner: Value, protos: Vec<Value>) -> Self {
        Value::Prototyped(Heap::new(Prototyped { inner, protos }))
    }

    #[inline]
    pub fn effect(effect: EffectData) -> Self {
        Value::Effect(Heap::new(effect))
    }

    #[inline]
    pub fn channel(state: ChannelState) -> Self {
        Value::Channel(Heap::new(RefCell::new(state)))
    }

    #[inline]
    pub fn task(state: TaskState) -> Self {
        Value::Task(Heap::new(RefCell::new(state)))
    }

    /// The empty list, which doubles as the unit value `()`.
    #[inline]
    pub fn unit() -> Self {
        Value::list(Vec::new())
    }
}

// Inspection

impl Value {
    /// Conditions treat `false` and `null` as false, all else as true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<Atom> {
        match self {
            Value::Atom(a) => Some(*a),
            _ => None,
        }
    }

    /// Get the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Atom(_) => "atom",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Channel(_) => "channel",
            Value::Task(_) => "task",
            Value::Fn(_) | Value::Native(_) => "function",
            Value::Handler(_) => "handler",
            Value::Prototyped(_) => "prototyped",
            Value::Effect(_) => "effect",
        }
    }

    /// Is this value callable by `application`?
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Fn(_) | Value::Native(_) | Value::Handler(_)
        )
    }
}

// Equality

impl Value {
    /// The `==` operator: identity for compound values, structural for
    /// scalars, IEEE semantics for numbers (`NaN != NaN`).
    pub fn shallow_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => self.key_eq(other),
        }
    }

    /// Key equality: like `shallow_eq` but numbers compare by bit pattern,
    /// keeping `Eq` reflexive for record keys.
    fn key_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Heap::same(a, b) || **a == **b,
            (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::List(a), Value::List(b)) => Heap::same(a, b),
            (Value::Record(a), Value::Record(b)) => Heap::same(a, b),
            (Value::Channel(a), Value::Channel(b)) => Heap::same(a, b),
            (Value::Task(a), Value::Task(b)) => Heap::same(a, b),
            (Value::Fn(a), Value::Fn(b)) => Heap::same(a, b),
            (Value::Native(a), Value::Native(b)) => Heap::same(a, b),
            (Value::Handler(a), Value::Handler(b)) => Heap::same(a, b),
            (Value::Prototyped(a), Value::Prototyped(b)) => Heap::same(a, b),
            (Value::Effect(a), Value::Effect(b)) => Heap::same(a, b),
            _ => false,
        }
    }

    /// The `===` operator: deep structural equality over containers, with
    /// cycle detection so self-referential lists and records terminate.
    pub fn deep_eq(&self, other: &Value) -> bool {
        let mut visited = FxHashSet::default();
        self.deep_eq_inner(other, &mut visited)
    }

    fn deep_eq_inner(&self, other: &Value, visited: &mut FxHashSet<(usize, usize)>) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Heap::same(a, b) {
                    return true;
                }
                // A revisited pair means we are inside a cycle that has
                // matched so far; treat it as equal to terminate.
                if !visited.insert((Heap::addr(a), Heap::addr(b))) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.deep_eq_inner(y, visited))
            }
            (Value::Record(a), Value::Record(b)) => {
                if Heap::same(a, b) {
                    return true;
                }
                if !visited.insert((Heap::addr(a), Heap::addr(b))) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.get(k).is_some_and(|bv| v.deep_eq_inner(bv, visited))
                    })
            }
            (Value::Prototyped(a), Value::Prototyped(b)) => {
                a.inner.deep_eq_inner(&b.inner, visited)
            }
            _ => self.key_eq(other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.key_eq(other)
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => n.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Atom(a) => a.hash(state),
            Value::List(h) => Heap::addr(h).hash(state),
            Value::Record(h) => Heap::addr(h).hash(state),
            Value::Channel(h) => Heap::addr(h).hash(state),
            Value::Task(h) => Heap::addr(h).hash(state),
            Value::Fn(h) => Heap::addr(h).hash(state),
            Value::Native(h) => Heap::addr(h).hash(state),
            Value::Handler(h) => Heap::addr(h).hash(state),
            Value::Prototyped(h) => Heap::addr(h).hash(state),
            Value::Effect(h) => Heap::addr(h).hash(state),
        }
    }
}

// Rendering

/// Format a number the way the language prints it: integral values
/// without a decimal point.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl Value {
    /// Render for user output. Atoms need the table and interner; cyclic
    /// containers render as `...` on revisit.
    pub fn render(&self, atoms: &AtomTable, interner: &StringInterner) -> String {
        let mut visited = FxHashSet::default();
        self.render_inner(atoms, interner, &mut visited)
    }

    fn render_inner(
        &self,
        atoms: &AtomTable,
        interner: &StringInterner,
        visited: &mut FxHashSet<usize>,
    ) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => format!("\"{}\"", &**s),
            Value::Atom(a) => atoms.display(*a, interner),
            Value::List(items) => {
                if !visited.insert(Heap::addr(items)) {
                    return "[...]".to_string();
                }
                let inner: Vec<_> = items
                    .borrow()
                    .iter()
                    .map(|v| v.render_inner(atoms, interner, visited))
                    .collect();
                visited.remove(&Heap::addr(items));
                format!("[{}]", inner.join(", "))
            }
            Value::Record(entries) => {
                if !visited.insert(Heap::addr(entries)) {
                    return "{...}".to_string();
                }
                let inner: Vec<_> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| {
                        let key = match k {
                            Value::Atom(a) => {
                                let text = atoms.display(*a, interner);
                                text.trim_start_matches(':').to_string()
                            }
                            other => other.render_inner(atoms, interner, visited),
                        };
                        format!("{key}: {}", v.render_inner(atoms, interner, visited))
                    })
                    .collect();
                visited.remove(&Heap::addr(entries));
                format!("{{{}}}", inner.join(", "))
            }
            Value::Channel(state) => format!("<channel {}>", state.borrow().name),
            Value::Task(_) => "<task>".to_string(),
            Value::Fn(_) => "<function>".to_string(),
            Value::Native(n) => format!("<native {}>", n.name),
            Value::Handler(_) => "<handler>".to_string(),
            Value::Prototyped(p) => p.inner.render_inner(atoms, interner, visited),
            Value::Effect(e) => format!("<effect {}>", atoms.display(e.tag, interner)),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({:?})", &**s),
            Value::Atom(a) => write!(f, "{a:?}"),
            Value::List(items) => match items.try_borrow() {
                Ok(items) => write!(f, "List({:?})", &*items),
                Err(_) => write!(f, "List(<borrowed>)"),
            },
            Value::Record(entries) => match entries.try_borrow() {
                Ok(entries) => {
                    write!(f, "Record(")?;
                    f.debug_map().entries(entries.iter()).finish()?;
                    write!(f, ")")
                }
                Err(_) => write!(f, "Record(<borrowed>)"),
            },
            Value::Channel(state) => write!(f, "Channel({})", state.borrow().name),
            Value::Task(_) => write!(f, "Task"),
            Value::Fn(_) => write!(f, "Fn"),
            Value::Native(n) => write!(f, "Native({})", n.name),
            Value::Handler(_) => write!(f, "Handler"),
            Value::Prototyped(p) => write!(f, "Prototyped({:?})", p.inner),
            Value::Effect(e) => write!(f, "Effect({:?})", e.tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::unit().is_truthy());
    }

    #[test]
    fn test_shallow_eq_scalars() {
        assert!(Value::Number(1.0).shallow_eq(&Value::Number(1.0)));
        assert!(!Value::Number(f64::NAN).shallow_eq(&Value::Number(f64::NAN)));
        assert!(Value::string("a").shallow_eq(&Value::string("a")));
        assert!(Value::Null.shallow_eq(&Value::Null));
    }

    #[test]
    fn test_shallow_eq_is_identity_for_lists() {
        let a = Value::list(vec![Value::Number(1.0)]);
        let b = Value::list(vec![Value::Number(1.0)]);
        assert!(!a.shallow_eq(&b));
        assert!(a.shallow_eq(&a.clone()));
    }

    #[test]
    fn test_deep_eq_structural() {
        let a = Value::list(vec![Value::Number(1.0), Value::string("x")]);
        let b = Value::list(vec![Value::Number(1.0), Value::string("x")]);
        assert!(a.deep_eq(&b));
        assert!(!a.shallow_eq(&b));
    }

    #[test]
    fn test_deep_eq_detects_cycles() {
        let a = Value::list(vec![]);
        let b = Value::list(vec![]);
        if let (Value::List(ah), Value::List(bh)) = (&a, &b) {
            ah.borrow_mut().push(a.clone());
            bh.borrow_mut().push(b.clone());
        }
        // Both are the infinite list [[[...]]]; deep equality terminates.
        assert!(a.deep_eq(&b));
    }

    #[test]
    fn test_nan_record_key_retrievable() {
        let mut record = Record::default();
        record.insert(Value::Number(f64::NAN), Value::Number(1.0));
        assert!(record.get(&Value::Number(f64::NAN)).is_some());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(-0.0), "0");
    }
}
