//! Metadata heaps for .NET assemblies.
//!
//! The metadata root lists a set of named streams. This module provides the owned, editable
//! views of the two heaps that patching needs to extend:
//!
//! - **`#Strings`** ([`Strings`]) - UTF-8 identifier strings heap containing type, member and
//!   namespace names. The first entry is always the empty string.
//! - **`#Blob`** ([`Blob`]) - Binary heap containing signatures and custom attribute values,
//!   each entry prefixed with its compressed length.
//!
//! The `#GUID` and `#US` heaps, and any non-standard streams, are carried as opaque bytes and
//! written back unchanged. The `#~` tables stream lives in [`crate::metadata::tables`].
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::metadata::streams::{Blob, Strings};
//!
//! let mut strings = Strings::new();
//! let name = strings.intern("Core.Tests")?;
//! assert_eq!(strings.get(name)?, "Core.Tests");
//!
//! let mut blob = Blob::new();
//! let sig = blob.append(&[0x20, 0x01, 0x01, 0x0E])?;
//! assert_eq!(blob.get(sig)?, &[0x20, 0x01, 0x01, 0x0E]);
//! # Ok::<(), dotpatch::Error>(())
//! ```
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 24.2.2 - Stream Headers

mod blob;
mod streamheader;
mod strings;

pub use blob::Blob;
pub use streamheader::StreamHeader;
pub use strings::Strings;
