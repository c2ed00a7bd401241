//! Module loading interfaces and export collection.
//!
//! The core never touches the filesystem for imports; it consumes a
//! [`ModuleLoader`]. The CLI wires in a file-based loader, tests use
//! in-memory ones.

use indexmap::IndexMap;

use crate::atoms::Atom;
use crate::value::Value;

/// What a loader hands back for an import.
pub enum LoadedModule {
    /// A script: an already-computed value.
    Script(Value),
    /// A module: an insertion-ordered record of its exports, plus an
    /// optional default export.
    Module {
        record: Value,
        default: Option<Value>,
    },
    /// An opaque byte buffer.
    Buffer(Vec<u8>),
}

/// Resolves `import "name"` from the file identified by `from`.
pub trait ModuleLoader {
    fn load(&mut self, name: &str, from: &str) -> Result<LoadedModule, String>;
}

/// A loader that refuses every import. The default for plain scripts.
pub struct NullLoader;

impl ModuleLoader for NullLoader {
    fn load(&mut self, name: &str, _from: &str) -> Result<LoadedModule, String> {
        let _ = name;
        Err("no module loader is configured".to_string())
    }
}

/// Collects `export` results while a module evaluates.
#[derive(Default)]
pub struct ModuleExports {
    /// Exported bindings in declaration order.
    pub entries: IndexMap<Atom, Value>,
    /// The default export, at most one.
    pub default: Option<Value>,
}
