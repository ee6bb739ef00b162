use std::{
    cell::RefCell,
    collections::HashMap,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{backend::ModuleBackend, model::Module, Error, Result};

/// A backend that keeps modules in a map keyed by path.
///
/// Loading returns a copy of the stored module; writing stores the handle under the target
/// path and records the path in [`MemoryBackend::writes`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    modules: RefCell<HashMap<PathBuf, Module>>,
    loads: RefCell<Vec<PathBuf>>,
    writes: RefCell<Vec<PathBuf>>,
}

impl MemoryBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `module` under `path`
    pub fn insert(&self, path: impl Into<PathBuf>, module: Module) {
        self.modules.borrow_mut().insert(path.into(), module);
    }

    /// A copy of the module stored under `path`
    #[must_use]
    pub fn module(&self, path: &Path) -> Option<Module> {
        self.modules.borrow().get(path).cloned()
    }

    /// Every path loaded so far, in order
    #[must_use]
    pub fn loads(&self) -> Vec<PathBuf> {
        self.loads.borrow().clone()
    }

    /// Every path written so far, in order
    #[must_use]
    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.borrow().clone()
    }
}

impl ModuleBackend for MemoryBackend {
    type Handle = Box<Module>;

    fn load(&self, path: &Path) -> Result<Self::Handle> {
        let module = self.module(path).ok_or_else(|| {
            Error::FileError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no module stored at '{}'", path.display()),
            ))
        })?;

        self.loads.borrow_mut().push(path.to_path_buf());
        Ok(Box::new(module))
    }

    fn write(&self, mut module: Self::Handle, path: &Path) -> Result<()> {
        debug!("Storing module '{}' at '{}'", module.name(), path.display());

        module.commit_internals_visible_to();
        self.modules.borrow_mut().insert(path.to_path_buf(), *module);
        self.writes.borrow_mut().push(path.to_path_buf());
        Ok(())
    }
}
