//! Loading and persisting modules.
//!
//! The patch engine never touches bytes itself. It asks a [`ModuleBackend`] for a handle to a
//! loaded [`Module`], edits the module through that handle, and gives the handle back to be
//! written. Two backends are provided:
//!
//! - [`CilBackend`] - Reads and writes .NET PE images
//! - [`MemoryBackend`] - Keeps modules in memory, for tests and dry runs
//!
//! # Example
//!
//! ```rust
//! use dotpatch::backend::{MemoryBackend, ModuleBackend};
//! use dotpatch::model::Module;
//! use std::path::Path;
//!
//! let backend = MemoryBackend::new();
//! backend.insert("bin/Core.dll", Module::new("Core"));
//!
//! let mut module = backend.load(Path::new("bin/Core.dll"))?;
//! module.add_internals_visible_to("Core.Tests");
//! backend.write(module, Path::new("obj/Core.dll"))?;
//!
//! let written = backend.module(Path::new("obj/Core.dll")).unwrap();
//! assert_eq!(written.internals_visible_to().collect::<Vec<_>>(), vec!["Core.Tests"]);
//! # Ok::<(), dotpatch::Error>(())
//! ```

mod cil;
mod memory;

pub use cil::{CilBackend, CilModule};
pub use memory::MemoryBackend;

use std::{ops::DerefMut, path::Path};

use crate::{model::Module, Result};

/// Loads modules from and writes them to some storage.
///
/// A handle is consumed by [`ModuleBackend::write`], so a module is written at most once per
/// load.
pub trait ModuleBackend {
    /// The loaded module, together with whatever the backend needs to write it back
    type Handle: DerefMut<Target = Module>;

    /// Load the module stored at `path`.
    ///
    /// # Errors
    /// Returns an error if the module does not exist or can not be decoded.
    fn load(&self, path: &Path) -> Result<Self::Handle>;

    /// Persist `module` to `path`, replacing anything stored there.
    ///
    /// # Errors
    /// Returns an error if the module can not be encoded or stored.
    fn write(&self, module: Self::Handle, path: &Path) -> Result<()>;
}
