//! The editable module model that patch rules operate on.
//!
//! A [`Module`] holds just enough of a compiled module for flag-level edits: types with their
//! nesting, methods with their attributes, properties and events with their accessors, and the
//! assembly-level `InternalsVisibleTo` friends. Items are addressed by small copyable ids
//! ([`TypeId`], [`MethodId`], [`PropertyId`], [`EventId`]) rather than references, so rules
//! can walk a type's members and edit methods in the same pass.
//!
//! [`MemberRef`] is the view a name predicate gets of a member; its `Type::Member` string form
//! is only built when a pattern is matched.

mod flags;
mod member;
mod module;

pub use flags::{MemberAccess, MethodModifiers, TypeAttributes, METHOD_ACCESS_MASK};
pub use member::{MemberKind, MemberRef};
pub use module::{EventDef, EventId, MethodDef, MethodId, Module, PropertyDef, PropertyId, TypeDef, TypeId};
