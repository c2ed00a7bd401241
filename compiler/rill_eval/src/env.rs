//! Environments: lexically scoped readonly/mutable bindings.
//!
//! An environment is a chain of nodes, each holding two insertion-ordered
//! maps (readonly and mutable). A key appears in at most one map of a
//! node. `copy_up_to` and `replace` exist exclusively to make multi-shot
//! continuation resumption observationally independent: they deep-copy and
//! restore the chain contents below a handler boundary while keeping node
//! identity stable, so closures holding a node handle see the restored
//! world.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;
use rill_ir::Name;

/// Error returned by `Env::set` when assignment fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignError {
    /// Nearest binding exists but is readonly.
    Immutable,
    /// No binding anywhere in the chain.
    Undefined,
}

struct EnvNode {
    parent: Option<Env>,
    readonly: IndexMap<Name, Value>,
    mutable: IndexMap<Name, Value>,
}

/// A handle to one environment node (and, through parents, a whole chain).
#[derive(Clone)]
pub struct Env(Rc<RefCell<EnvNode>>);

impl Env {
    /// Create a root environment with no parent.
    pub fn new() -> Self {
        Env(Rc::new(RefCell::new(EnvNode {
            parent: None,
            readonly: IndexMap::new(),
            mutable: IndexMap::new(),
        })))
    }

    /// Create a child scope of this environment.
    #[must_use]
    pub fn fork(&self) -> Self {
        Env(Rc::new(RefCell::new(EnvNode {
            parent: Some(self.clone()),
            readonly: IndexMap::new(),
            mutable: IndexMap::new(),
        })))
    }

    /// Identity comparison of nodes.
    #[inline]
    pub fn same(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn parent(&self) -> Option<Env> {
        self.0.borrow().parent.clone()
    }

    /// Nearest binding for `key`, or `None`.
    pub fn get(&self, key: Name) -> Option<Value> {
        let node = self.0.borrow();
        if let Some(v) = node.readonly.get(&key) {
            return Some(v.clone());
        }
        if let Some(v) = node.mutable.get(&key) {
            return Some(v.clone());
        }
        node.parent.as_ref().and_then(|p| p.get(key))
    }

    /// Mutate the nearest mutable binding.
    ///
    /// Fails if the nearest binding is readonly, or if no binding exists.
    pub fn set(&self, key: Name, value: Value) -> Result<(), AssignError> {
        let mut node = self.0.borrow_mut();
        if node.readonly.contains_key(&key) {
            return Err(AssignError::Immutable);
        }
        if let Some(slot) = node.mutable.get_mut(&key) {
            *slot = value;
            return Ok(());
        }
        match node.parent.clone() {
            Some(parent) => {
                drop(node);
                parent.set(key, value)
            }
            None => Err(AssignError::Undefined),
        }
    }

    /// Introduce a mutable binding at this node.
    ///
    /// Fails (returns `false`) if the key already exists at this node.
    #[must_use]
    pub fn add(&self, key: Name, value: Value) -> bool {
        let mut node = self.0.borrow_mut();
        if node.readonly.contains_key(&key) || node.mutable.contains_key(&key) {
            return false;
        }
        node.mutable.insert(key, value);
        true
    }

    /// Introduce a readonly binding at this node.
    ///
    /// Fails (returns `false`) if the key already exists at this node.
    #[must_use]
    pub fn add_readonly(&self, key: Name, value: Value) -> bool {
        let mut node = self.0.borrow_mut();
        if node.readonly.contains_key(&key) || node.mutable.contains_key(&key) {
            return false;
        }
        node.readonly.insert(key, value);
        true
    }

    /// Is the nearest binding for `key` readonly?
    pub fn has_readonly(&self, key: Name) -> bool {
        let node = self.0.borrow();
        if node.readonly.contains_key(&key) {
            return true;
        }
        if node.mutable.contains_key(&key) {
            return false;
        }
        node.parent.as_ref().is_some_and(|p| p.has_readonly(key))
    }

    /// All names visible from this node, nearest first.
    ///
    /// Used for closest-name suggestions on failed assignment.
    pub fn visible_names(&self) -> Vec<Name> {
        let mut names = Vec::new();
        let mut current = Some(self.clone());
        while let Some(env) = current {
            let node = env.0.borrow();
            names.extend(node.readonly.keys().copied());
            names.extend(node.mutable.keys().copied());
            current = node.parent.clone();
        }
        names
    }

    /// Deep copy of the chain strictly below `boundary`.
    ///
    /// The copied chain shares keys by value and terminates at `boundary`
    /// by identity. If `self` is `boundary`, the copy is just `boundary`.
    #[must_use]
    pub fn copy_up_to(&self, boundary: &Env) -> Env {
        if self.same(boundary) {
            return boundary.clone();
        }
        let node = self.0.borrow();
        let parent = node.parent.as_ref().map(|p| p.copy_up_to(boundary));
        Env(Rc::new(RefCell::new(EnvNode {
            parent,
            readonly: node.readonly.clone(),
            mutable: node.mutable.clone(),
        })))
    }

    /// Overwrite the contents of this chain down to `boundary` from
    /// `other`, node by node. Node identity in `self` is preserved; only
    /// the binding maps change.
    pub fn replace(&self, other: &Env, boundary: &Env) {
        let mut target = self.clone();
        let mut source = other.clone();
        loop {
            if target.same(boundary) {
                break;
            }
            {
                let mut t = target.0.borrow_mut();
                let s = source.0.borrow();
                t.readonly = s.readonly.clone();
                t.mutable = s.mutable.clone();
            }
            let next_target = target.parent();
            let next_source = source.parent();
            match (next_target, next_source) {
                (Some(t), Some(s)) => {
                    target = t;
                    source = s;
                }
                _ => break,
            }
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.0.borrow();
        write!(
            f,
            "Env({} readonly, {} mutable{})",
            node.readonly.len(),
            node.mutable.len(),
            if node.parent.is_some() { ", parented" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_ir::StringInterner;

    fn name(interner: &StringInterner, s: &str) -> Name {
        interner.intern(s)
    }

    #[test]
    fn test_get_nearest_binding() {
        let interner = StringInterner::new();
        let x = name(&interner, "x");
        let root = Env::new();
        assert!(root.add(x, Value::Number(1.0)));
        let child = root.fork();
        assert!(child.add(x, Value::Number(2.0)));
        assert_eq!(child.get(x).and_then(|v| v.as_number()), Some(2.0));
        assert_eq!(root.get(x).and_then(|v| v.as_number()), Some(1.0));
    }

    #[test]
    fn test_set_walks_to_mutable_binding() {
        let interner = StringInterner::new();
        let x = name(&interner, "x");
        let root = Env::new();
        assert!(root.add(x, Value::Number(1.0)));
        let child = root.fork();
        assert_eq!(child.set(x, Value::Number(9.0)), Ok(()));
        assert_eq!(root.get(x).and_then(|v| v.as_number()), Some(9.0));
    }

    #[test]
    fn test_set_fails_on_readonly_and_missing() {
        let interner = StringInterner::new();
        let x = name(&interner, "x");
        let y = name(&interner, "y");
        let env = Env::new();
        assert!(env.add_readonly(x, Value::Number(1.0)));
        assert_eq!(env.set(x, Value::Number(2.0)), Err(AssignError::Immutable));
        assert_eq!(env.set(y, Value::Number(2.0)), Err(AssignError::Undefined));
    }

    #[test]
    fn test_add_rejects_duplicates_at_same_node() {
        let interner = StringInterner::new();
        let x = name(&interner, "x");
        let env = Env::new();
        assert!(env.add_readonly(x, Value::Number(1.0)));
        assert!(!env.add(x, Value::Number(2.0)));
        assert!(!env.add_readonly(x, Value::Number(2.0)));
    }

    #[test]
    fn test_has_readonly_sees_nearest() {
        let interner = StringInterner::new();
        let x = name(&interner, "x");
        let root = Env::new();
        assert!(root.add_readonly(x, Value::Number(1.0)));
        let child = root.fork();
        assert!(child.has_readonly(x));
        // Shadowing with a mutable binding flips the answer.
        assert!(child.add(x, Value::Number(2.0)));
        assert!(!child.has_readonly(x));
    }

    #[test]
    fn test_copy_then_replace_round_trips() {
        let interner = StringInterner::new();
        let x = name(&interner, "x");
        let boundary = Env::new();
        let inner = boundary.fork();
        assert!(inner.add(x, Value::Number(1.0)));

        // Snapshot, mutate, restore.
        let snapshot = inner.copy_up_to(&boundary);
        assert_eq!(inner.set(x, Value::Number(42.0)), Ok(()));
        assert_eq!(inner.get(x).and_then(|v| v.as_number()), Some(42.0));

        inner.replace(&snapshot, &boundary);
        assert_eq!(inner.get(x).and_then(|v| v.as_number()), Some(1.0));
    }

    #[test]
    fn test_copy_shares_boundary_by_identity() {
        let boundary = Env::new();
        let inner = boundary.fork();
        let copy = inner.copy_up_to(&boundary);
        assert!(!copy.same(&inner));
        let copy_parent = copy.parent();
        assert!(copy_parent.is_some_and(|p| p.same(&boundary)));
    }

    #[test]
    fn test_replace_preserves_node_identity() {
        let interner = StringInterner::new();
        let x = name(&interner, "x");
        let boundary = Env::new();
        let inner = boundary.fork();
        assert!(inner.add(x, Value::Number(1.0)));
        let snapshot = inner.copy_up_to(&boundary);

        // A closure holding `inner` must observe restored contents.
        let handle = inner.clone();
        assert_eq!(inner.set(x, Value::Number(2.0)), Ok(()));
        inner.replace(&snapshot, &boundary);
        assert_eq!(handle.get(x).and_then(|v| v.as_number()), Some(1.0));
    }
}
