//! ECMA-335 metadata codec.
//!
//! This module reads and writes the parts of a .NET assembly's metadata that patching needs:
//!
//! - [`cor20header`] - The CLI header that locates the metadata inside the PE image
//! - [`root`] - The metadata root (`BSJB`) and its stream directory
//! - [`streams`] - The `#Strings` and `#Blob` heaps
//! - [`tables`] - The `#~` tables stream
//!
//! Higher level code works on [`crate::model::Module`] instead; [`crate::backend::CilBackend`]
//! translates between the two.
//!
//! # References
//!
//! - [ECMA-335 Partition II](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

pub mod cor20header;
pub mod root;
pub mod streams;
pub mod tables;
