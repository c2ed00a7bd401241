//! Runtime atoms.
//!
//! An atom is an interned symbol used as a record key or effect tag. Most
//! atoms mirror an interned [`Name`]; `fresh` atoms (for code labels) get a
//! unique identity that never compares equal to any other atom, even one
//! with the same display name.

use rustc_hash::FxHashMap;
use std::fmt;

use rill_ir::{Name, StringInterner};

/// An interned or fresh symbol.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Atom(u32);

impl Atom {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({})", self.0)
    }
}

struct AtomInfo {
    name: Name,
    fresh: bool,
}

/// Table of live atoms.
///
/// Interned atoms are deduplicated by `Name`; fresh atoms always allocate
/// a new slot.
pub struct AtomTable {
    atoms: Vec<AtomInfo>,
    by_name: FxHashMap<Name, Atom>,
}

impl AtomTable {
    pub fn new() -> Self {
        AtomTable {
            atoms: Vec::with_capacity(64),
            by_name: FxHashMap::default(),
        }
    }

    /// The atom for an interned name, creating it on first use.
    pub fn of_name(&mut self, name: Name) -> Atom {
        if let Some(&atom) = self.by_name.get(&name) {
            return atom;
        }
        let atom = self.push(name, false);
        self.by_name.insert(name, atom);
        atom
    }

    /// A fresh atom that equals nothing but itself.
    pub fn fresh(&mut self, display: Name) -> Atom {
        self.push(display, true)
    }

    fn push(&mut self, name: Name, fresh: bool) -> Atom {
        let idx = u32::try_from(self.atoms.len())
            .unwrap_or_else(|_| panic!("atom table exceeded capacity"));
        self.atoms.push(AtomInfo { name, fresh });
        Atom(idx)
    }

    /// The display name of an atom.
    pub fn name(&self, atom: Atom) -> Name {
        self.atoms[atom.index()].name
    }

    /// Whether the atom is a fresh (label) symbol.
    pub fn is_fresh(&self, atom: Atom) -> bool {
        self.atoms[atom.index()].fresh
    }

    /// Render an atom for user output.
    pub fn display(&self, atom: Atom, interner: &StringInterner) -> String {
        let info = &self.atoms[atom.index()];
        let text = interner.lookup(info.name);
        if info.fresh {
            format!(":{text}#{}", atom.0)
        } else {
            format!(":{text}")
        }
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Atoms the runtime itself raises and matches on.
///
/// Created once at interpreter startup so hot paths compare by `Atom`
/// without touching the table.
#[derive(Copy, Clone)]
pub struct WellKnown {
    pub ok: Atom,
    pub error: Atom,
    pub ret: Atom,
    pub fn_try: Atom,
    pub brk: Atom,
    pub cont: Atom,
    pub yld: Atom,
    pub create_task: Atom,
    pub chan_recv: Atom,
    pub awaiting: Atom,
    pub cancelled: Atom,
    pub none: Atom,
    pub closed: Atom,
    pub default: Atom,
}

impl WellKnown {
    pub fn new(table: &mut AtomTable, interner: &StringInterner) -> Self {
        let mut atom = |s: &str| table.of_name(interner.intern(s));
        WellKnown {
            ok: atom("ok"),
            error: atom("error"),
            ret: atom("return"),
            fn_try: atom("fn-try"),
            brk: atom("break"),
            cont: atom("continue"),
            yld: atom("yield"),
            create_task: atom("create-task"),
            chan_recv: atom("chan-recv"),
            awaiting: atom("await"),
            cancelled: atom("cancelled"),
            none: atom("none"),
            closed: atom("closed"),
            default: atom("default"),
        }
    }

    /// Tags reserved for the scheduler; user handlers never see them.
    pub fn is_scheduler_tag(&self, tag: Atom) -> bool {
        tag == self.yld || tag == self.create_task || tag == self.chan_recv || tag == self.awaiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interned_atoms_deduplicate() {
        let interner = StringInterner::new();
        let mut table = AtomTable::new();
        let a = table.of_name(interner.intern("ok"));
        let b = table.of_name(interner.intern("ok"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fresh_atoms_are_unique() {
        let interner = StringInterner::new();
        let mut table = AtomTable::new();
        let name = interner.intern("outer");
        let a = table.fresh(name);
        let b = table.fresh(name);
        assert_ne!(a, b);
        assert!(table.is_fresh(a));
    }

    #[test]
    fn test_display() {
        let interner = StringInterner::new();
        let mut table = AtomTable::new();
        let ok = table.of_name(interner.intern("ok"));
        assert_eq!(table.display(ok, &interner), ":ok");
    }
}
