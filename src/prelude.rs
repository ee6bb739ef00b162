//! # dotpatch Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the dotpatch library.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotpatch operations
pub use crate::Error;

/// The result type used throughout dotpatch
pub use crate::Result;

// ================================================================================================
// Patch Engine
// ================================================================================================

/// Patch requests and their instruction lists
pub use crate::patch::{GrantInstruction, PatchInstructionSet, PatchRequest, PatternInstruction};

/// Running requests and reading the results
pub use crate::patch::{MutationOutcome, PatchReport, Patcher, RuleKind, TargetReport};

/// Name patterns and target resolution
pub use crate::patch::{resolve, NamePredicate, ResolvedTarget};

/// The mutation rules
pub use crate::patch::{
    GrantInternalsAccess, MutationRule, PublicizeMembers, UnsealTypes, VirtualizeMembers,
};

// ================================================================================================
// Module Model and Backends
// ================================================================================================

/// The editable module model
pub use crate::model::{
    MemberAccess, MemberKind, MemberRef, MethodModifiers, Module, TypeAttributes,
};

/// Module storage
pub use crate::backend::{CilBackend, CilModule, MemoryBackend, ModuleBackend};
