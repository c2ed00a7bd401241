//! File-based module loader.
//!
//! Resolves `import "name"` relative to the importing file, evaluates
//! `.rill` files as modules through the owning interpreter, and hands back
//! other files as opaque buffers. Results are cached per resolved path.

use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use rill_eval::{Interpreter, LoadedModule, ModuleLoader, Value};
use thiserror::Error;

/// Why a load failed; rendered into the import diagnostic's message.
#[derive(Debug, Error)]
enum LoadFailure {
    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("import cycle through {path}")]
    Cycle { path: String },
    #[error("module evaluation failed: {detail}")]
    Evaluation { detail: String },
    #[error("loader is not attached to an interpreter")]
    Detached,
}

struct Inner {
    interp: Weak<Interpreter>,
    cache: FxHashMap<PathBuf, Value>,
    loading: FxHashSet<PathBuf>,
}

/// The CLI's module loader. Cloneable shell over shared state so the
/// driver can attach the interpreter after construction.
#[derive(Clone)]
pub struct FileLoader {
    inner: Rc<RefCell<Inner>>,
}

impl FileLoader {
    pub fn new() -> Self {
        FileLoader {
            inner: Rc::new(RefCell::new(Inner {
                interp: Weak::new(),
                cache: FxHashMap::default(),
                loading: FxHashSet::default(),
            })),
        }
    }

    /// Wire the loader to the interpreter that owns it.
    pub fn attach(&self, interp: &Rc<Interpreter>) {
        self.inner.borrow_mut().interp = Rc::downgrade(interp);
    }

    fn resolve(&self, name: &str, from: &str) -> PathBuf {
        let base = Path::new(from).parent().unwrap_or_else(|| Path::new("."));
        let mut path = base.join(name);
        if path.extension().is_none() {
            path.set_extension("rill");
        }
        path
    }

    fn load_inner(&self, name: &str, from: &str) -> Result<LoadedModule, LoadFailure> {
        let path = self.resolve(name, from);

        if let Some(cached) = self.inner.borrow().cache.get(&path) {
            return Ok(LoadedModule::Module {
                record: cached.clone(),
                default: None,
            });
        }

        // Non-source files come back as opaque buffers.
        if path.extension().is_some_and(|ext| ext != "rill") {
            let bytes = std::fs::read(&path).map_err(|e| LoadFailure::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            return Ok(LoadedModule::Buffer(bytes));
        }

        let source = std::fs::read_to_string(&path).map_err(|e| LoadFailure::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let interp = self
            .inner
            .borrow()
            .interp
            .upgrade()
            .ok_or(LoadFailure::Detached)?;

        if !self.inner.borrow_mut().loading.insert(path.clone()) {
            return Err(LoadFailure::Cycle {
                path: path.display().to_string(),
            });
        }
        let result = interp.evaluate_module_string(&source, &path.display().to_string());
        self.inner.borrow_mut().loading.remove(&path);

        let record = result.map_err(|diags| LoadFailure::Evaluation {
            detail: diags
                .first()
                .map(|d| d.message.clone())
                .unwrap_or_else(|| "unknown error".to_string()),
        })?;

        self.inner.borrow_mut().cache.insert(path, record.clone());
        Ok(LoadedModule::Module {
            record,
            default: None,
        })
    }
}

impl Default for FileLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLoader for FileLoader {
    fn load(&mut self, name: &str, from: &str) -> Result<LoadedModule, String> {
        self.load_inner(name, from).map_err(|e| e.to_string())
    }
}
