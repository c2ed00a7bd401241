//! String interner for identifiers, atoms, and string literals.
//!
//! Interned strings compare by `Name` (a `u32` index), giving O(1)
//! equality and hashing everywhere names flow through the runtime.

// Arc is needed here for SharedInterner - the interner is shared between
// the parser, the evaluator, and every compiled closure.
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// An interned string.
///
/// Equality and hashing are on the index, not the contents; two `Name`s
/// from the same interner are equal iff their strings are equal.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Name(u32);

impl Name {
    /// The pre-interned empty string.
    pub const EMPTY: Name = Name(0);

    #[inline]
    pub(crate) const fn new(index: u32) -> Self {
        Name(index)
    }

    /// Raw index into the interner's storage.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

struct InternerInner {
    /// Map from string content to index.
    map: FxHashMap<&'static str, u32>,
    /// Storage for string contents.
    strings: Vec<&'static str>,
}

/// String interner.
///
/// Interned strings are leaked, so lookups return `'static` references.
/// Wrapped in a `RwLock` so a `SharedInterner` can be consulted from the
/// parser and the evaluator without borrow gymnastics.
pub struct StringInterner {
    inner: RwLock<InternerInner>,
}

impl StringInterner {
    /// Create a new interner with the empty string pre-interned at index 0.
    pub fn new() -> Self {
        let mut inner = InternerInner {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(256),
        };
        let empty: &'static str = "";
        inner.map.insert(empty, 0);
        inner.strings.push(empty);
        let interner = StringInterner {
            inner: RwLock::new(inner),
        };
        interner.pre_intern_keywords();
        interner
    }

    /// Intern a string, returning its `Name`.
    pub fn intern(&self, s: &str) -> Name {
        // Fast path: already interned.
        {
            let guard = self.inner.read();
            if let Some(&idx) = guard.map.get(s) {
                return Name::new(idx);
            }
        }

        let mut guard = self.inner.write();
        // Double-check after acquiring the write lock.
        if let Some(&idx) = guard.map.get(s) {
            return Name::new(idx);
        }

        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let idx = u32::try_from(guard.strings.len()).unwrap_or_else(|_| {
            panic!("interner exceeded capacity: {} strings", guard.strings.len())
        });
        guard.strings.push(leaked);
        guard.map.insert(leaked, idx);
        Name::new(idx)
    }

    /// Intern an owned String, avoiding the extra allocation of `intern`.
    pub fn intern_owned(&self, s: String) -> Name {
        {
            let guard = self.inner.read();
            if let Some(&idx) = guard.map.get(s.as_str()) {
                return Name::new(idx);
            }
        }

        let mut guard = self.inner.write();
        if let Some(&idx) = guard.map.get(s.as_str()) {
            return Name::new(idx);
        }

        let leaked: &'static str = Box::leak(s.into_boxed_str());
        let idx = u32::try_from(guard.strings.len()).unwrap_or_else(|_| {
            panic!("interner exceeded capacity: {} strings", guard.strings.len())
        });
        guard.strings.push(leaked);
        guard.map.insert(leaked, idx);
        Name::new(idx)
    }

    /// Look up the string for a `Name`.
    ///
    /// Safe to hand out `'static` because interned strings are never freed.
    pub fn lookup(&self, name: Name) -> &'static str {
        let guard = self.inner.read();
        guard.strings[name.index()]
    }

    /// Pre-intern keywords and prelude names the runtime consults often.
    fn pre_intern_keywords(&self) {
        const KEYWORDS: &[&str] = &[
            "if", "then", "else", "match", "is", "and", "or", "not", "in", "fn", "do", "loop",
            "while", "for", "break", "continue", "return", "async", "await", "parallel", "inject",
            "mask", "without", "label", "mut", "export", "import", "try", "like", "strict",
            "self", "true", "false",
            // Well-known effect tags and prelude names
            "fn-try", "yield", "create-task", "chan-recv", "ok", "error", "channel", "close",
            "print", "length", "symbol", "cancelled", "default",
        ];
        for kw in KEYWORDS {
            self.intern(kw);
        }
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.inner.read().strings.len()
    }

    /// Check if the interner only holds the empty string.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared interner handle.
///
/// This newtype enforces that interner sharing goes through one type
/// instead of ad-hoc `Arc<StringInterner>` values.
#[derive(Clone)]
pub struct SharedInterner(Arc<StringInterner>);

impl SharedInterner {
    /// Create a new shared interner.
    pub fn new() -> Self {
        SharedInterner(Arc::new(StringInterner::new()))
    }
}

impl Default for SharedInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for SharedInterner {
    type Target = StringInterner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_lookup() {
        let interner = StringInterner::new();

        let hello = interner.intern("hello");
        let world = interner.intern("world");
        let hello2 = interner.intern("hello");

        assert_eq!(hello, hello2);
        assert_ne!(hello, world);

        assert_eq!(interner.lookup(hello), "hello");
        assert_eq!(interner.lookup(world), "world");
    }

    #[test]
    fn test_empty_string() {
        let interner = StringInterner::new();
        let empty = interner.intern("");
        assert_eq!(empty, Name::EMPTY);
        assert_eq!(interner.lookup(Name::EMPTY), "");
    }

    #[test]
    fn test_keywords_pre_interned() {
        let interner = StringInterner::new();
        let before = interner.len();
        interner.intern("inject");
        interner.intern("while");
        assert_eq!(interner.len(), before);
    }

    #[test]
    fn test_intern_owned() {
        let interner = StringInterner::new();
        let name1 = interner.intern_owned(String::from("owned_string"));
        let name2 = interner.intern("owned_string");
        assert_eq!(name1, name2);
    }

    #[test]
    fn test_shared_interner() {
        let interner = SharedInterner::new();
        let interner2 = interner.clone();
        assert_eq!(interner.intern("shared"), interner2.intern("shared"));
    }
}
