// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # dotpatch
//!
//! A post-compilation patcher for .NET assemblies. Run as a build step, `dotpatch` takes
//! already-built modules and applies a small set of declarative metadata edits:
//!
//! - **Grant internals access** - Add an assembly-level `InternalsVisibleTo` marker for a
//!   friend assembly
//! - **Unseal types** - Clear the `sealed` flag of types matching a name pattern
//! - **Virtualize members** - Make matching methods, property and event accessors virtual
//! - **Publicize members** - Make matching methods, property and event accessors public
//!
//! Only flags and a single marker attribute (with the references it needs) are touched; method
//! bodies are never rewritten.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotpatch::prelude::*;
//!
//! let request = PatchRequest::new("obj/patched")
//!     .source("bin/Core.dll")
//!     .grant("Core", "Core.Tests")
//!     .unseal("Core", Some("MyApp.*Options"))
//!     .publicize("Core", Some("MyApp.Service::*"));
//!
//! let report = dotpatch::patch(&request)?;
//! for target in &report.targets {
//!     for outcome in &target.outcomes {
//!         println!("{}", outcome.description(&target.output));
//!     }
//! }
//! # Ok::<(), dotpatch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`patch`] - Requests, name patterns, target resolution, the mutation rules and the
//!   [`patch::Patcher`] that drives them
//! - [`model`] - The editable [`model::Module`] the rules work on
//! - [`backend`] - The [`backend::ModuleBackend`] trait, with a PE backend and an in-memory one
//! - [`metadata`] - The ECMA-335 metadata codec: CLI header, root, heaps, tables
//! - [`file`] - The PE container and little-endian I/O helpers
//! - [`Error`] and [`Result`] - Error handling
//!
//! Rules depend on [`model`] only. The binary codec is reached exclusively through
//! [`backend::CilBackend`].

#[macro_use]
pub(crate) mod error;

pub mod backend;
pub mod file;
pub mod metadata;
pub mod model;
pub mod patch;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use dotpatch::prelude::*;
///
/// let module = CilBackend::new().load("bin/Core.dll".as_ref())?;
/// println!("{} declares {} types", module.name(), module.type_count());
/// # Ok::<(), dotpatch::Error>(())
/// ```
pub mod prelude;

/// `dotpatch` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. This is used consistently throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `dotpatch` Error type
///
/// The main error type for all operations in this crate. See [`Error`] for the variants.
pub use error::Error;

use backend::CilBackend;
use patch::{PatchReport, PatchRequest, Patcher};

/// Run `request` against .NET PE images on disk.
///
/// Shorthand for a [`Patcher`] over a [`CilBackend`].
///
/// # Errors
/// See [`Patcher::run`].
pub fn patch(request: &PatchRequest) -> Result<PatchReport> {
    Patcher::new(CilBackend::new()).run(request)
}
