//! The patch engine.
//!
//! A run starts from a [`PatchRequest`]: per-kind instruction lists naming target assemblies,
//! the candidate module files, and an output directory. The [`Patcher`] regroups the
//! instructions by target ([`TargetInstructions`]), finds each target's module with
//! [`resolve`], and applies the [`MutationRule`]s built from the instructions:
//!
//! - [`GrantInternalsAccess`] - Add an `InternalsVisibleTo` marker for a friend assembly
//! - [`UnsealTypes`] - Clear the sealed flag of matching types
//! - [`VirtualizeMembers`] - Make matching methods, properties and events virtual
//! - [`PublicizeMembers`] - Make matching methods, properties and events public
//!
//! Types and members are selected with [`NamePredicate`]s compiled from `;`-separated glob
//! lists. Types match by full name (`MyApp.Outer/Inner`), members by `Type::Member`.

mod instructions;
mod orchestrator;
mod pattern;
mod resolver;
mod rules;

pub use instructions::{
    GrantInstruction, PatchInstructionSet, PatchRequest, PatternInstruction, TargetInstructions,
};
pub use orchestrator::{PatchReport, Patcher, TargetReport};
pub use pattern::{NamePredicate, MATCH_ALL, PATTERN_SEPARATOR};
pub use resolver::{resolve, ResolvedTarget};
pub use rules::{
    GrantInternalsAccess, MutationOutcome, MutationRule, PublicizeMembers, RuleKind,
    UnsealTypes, VirtualizeMembers,
};
