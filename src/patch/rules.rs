//! The mutation rules.
//!
//! Each rule edits a [`Module`] in place and reports how many items it changed. Rules never fail:
//! a pattern that selects nothing is a normal outcome. Running a rule twice changes nothing the
//! second time, except [`GrantInternalsAccess`] which adds a marker on every run.
//!
//! Member rules look at every type's methods, then its properties, then its events. A selected
//! property stands for its getter and setter, a selected event for its add, remove and raise
//! methods. Edits happen as soon as a method is visited, so an accessor selected both directly
//! and through its property is changed, and counted, once.

use std::{fmt, path::Path};

use serde::Serialize;

use crate::{
    model::{MemberAccess, MemberKind, MemberRef, MethodDef, MethodId, MethodModifiers, Module, TypeId},
    patch::NamePredicate,
};

/// The kinds of mutation, in the order they are applied to a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    /// Add an assembly-level `InternalsVisibleTo` marker
    GrantInternalsAccess,
    /// Clear the sealed flag of types
    UnsealTypes,
    /// Make methods virtual
    VirtualizeMembers,
    /// Make methods public
    PublicizeMembers,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleKind::GrantInternalsAccess => "grant-internals",
            RuleKind::UnsealTypes => "unseal",
            RuleKind::VirtualizeMembers => "virtualize",
            RuleKind::PublicizeMembers => "publicize",
        };
        f.write_str(name)
    }
}

/// What one rule application did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    /// The rule that ran
    pub rule: RuleKind,
    /// Number of items changed
    pub matched: usize,
    /// The friend assembly for grants, the effective pattern list otherwise
    pub detail: String,
}

impl MutationOutcome {
    /// A human readable summary naming the patched module at `path`
    #[must_use]
    pub fn description(&self, path: &Path) -> String {
        let path = path.display();
        match self.rule {
            RuleKind::GrantInternalsAccess => format!(
                "Added 'InternalsVisibleToAttribute' for '{}' in '{}'",
                self.detail, path
            ),
            RuleKind::UnsealTypes => format!(
                "Removed 'sealed' from {} types in '{}' matching patterns: {}",
                self.matched, path, self.detail
            ),
            RuleKind::VirtualizeMembers => format!(
                "Made {} methods virtual in '{}' matching patterns: {}",
                self.matched, path, self.detail
            ),
            RuleKind::PublicizeMembers => format!(
                "Made {} methods public in '{}' matching patterns: {}",
                self.matched, path, self.detail
            ),
        }
    }
}

/// An edit that can be applied to a module.
pub trait MutationRule {
    /// Which kind of rule this is
    fn kind(&self) -> RuleKind;

    /// Apply the edit and report what changed
    fn apply(&self, module: &mut Module) -> MutationOutcome;
}

/// Let `friend` see the internals of the module.
#[derive(Clone, Debug)]
pub struct GrantInternalsAccess {
    friend: String,
}

impl GrantInternalsAccess {
    /// Create the rule for the friend assembly `friend`
    #[must_use]
    pub fn new(friend: &str) -> Self {
        GrantInternalsAccess {
            friend: friend.to_string(),
        }
    }
}

impl MutationRule for GrantInternalsAccess {
    fn kind(&self) -> RuleKind {
        RuleKind::GrantInternalsAccess
    }

    fn apply(&self, module: &mut Module) -> MutationOutcome {
        module.add_internals_visible_to(&self.friend);
        MutationOutcome {
            rule: self.kind(),
            matched: 1,
            detail: self.friend.clone(),
        }
    }
}

/// Clear the sealed flag of every matching type, nested types included.
#[derive(Clone, Debug)]
pub struct UnsealTypes {
    predicate: NamePredicate,
}

impl UnsealTypes {
    /// Create the rule for types whose full name matches `predicate`
    #[must_use]
    pub fn new(predicate: NamePredicate) -> Self {
        UnsealTypes { predicate }
    }
}

impl MutationRule for UnsealTypes {
    fn kind(&self) -> RuleKind {
        RuleKind::UnsealTypes
    }

    fn apply(&self, module: &mut Module) -> MutationOutcome {
        let mut matched = 0;
        let type_ids: Vec<TypeId> = module.type_ids().collect();

        for type_id in type_ids {
            let full_name = module.full_name(type_id);
            let Some(type_def) = module.type_def_mut(type_id) else {
                continue;
            };

            if type_def.is_sealed() && self.predicate.matches(&full_name) {
                type_def.set_sealed(false);
                matched += 1;
            }
        }

        MutationOutcome {
            rule: self.kind(),
            matched,
            detail: self.predicate.to_string(),
        }
    }
}

/// Make every matching method virtual, and remove `final` from it.
///
/// Static methods, constructors, abstract methods, and methods that are private or
/// compiler-controlled are left alone.
#[derive(Clone, Debug)]
pub struct VirtualizeMembers {
    predicate: NamePredicate,
}

impl VirtualizeMembers {
    /// Create the rule for members whose `Type::Member` name matches `predicate`
    #[must_use]
    pub fn new(predicate: NamePredicate) -> Self {
        VirtualizeMembers { predicate }
    }

    fn qualifies(method: &MethodDef) -> bool {
        let modifiers = method.modifiers();
        !modifiers.intersects(
            MethodModifiers::VIRTUAL | MethodModifiers::STATIC | MethodModifiers::ABSTRACT,
        ) && !method.is_constructor()
            && !matches!(
                method.access(),
                MemberAccess::Private | MemberAccess::CompilerControlled
            )
    }
}

impl MutationRule for VirtualizeMembers {
    fn kind(&self) -> RuleKind {
        RuleKind::VirtualizeMembers
    }

    fn apply(&self, module: &mut Module) -> MutationOutcome {
        let matched = edit_selected_methods(module, &self.predicate, |method| {
            if !Self::qualifies(method) {
                return false;
            }

            let modifiers = (method.modifiers() | MethodModifiers::VIRTUAL) - MethodModifiers::FINAL;
            method.set_modifiers(modifiers);
            true
        });

        MutationOutcome {
            rule: self.kind(),
            matched,
            detail: self.predicate.to_string(),
        }
    }
}

/// Make every matching method public.
///
/// Compiler-controlled methods keep their access level.
#[derive(Clone, Debug)]
pub struct PublicizeMembers {
    predicate: NamePredicate,
}

impl PublicizeMembers {
    /// Create the rule for members whose `Type::Member` name matches `predicate`
    #[must_use]
    pub fn new(predicate: NamePredicate) -> Self {
        PublicizeMembers { predicate }
    }
}

impl MutationRule for PublicizeMembers {
    fn kind(&self) -> RuleKind {
        RuleKind::PublicizeMembers
    }

    fn apply(&self, module: &mut Module) -> MutationOutcome {
        let matched = edit_selected_methods(module, &self.predicate, |method| {
            if !method.access().is_narrower_than_public() {
                return false;
            }

            method.set_access(MemberAccess::Public);
            true
        });

        MutationOutcome {
            rule: self.kind(),
            matched,
            detail: self.predicate.to_string(),
        }
    }
}

/// Visit the methods selected by `predicate` in traversal order and count those `edit` changed
fn edit_selected_methods(
    module: &mut Module,
    predicate: &NamePredicate,
    mut edit: impl FnMut(&mut MethodDef) -> bool,
) -> usize {
    let type_ids: Vec<TypeId> = module.type_ids().collect();
    let mut changed = 0;

    for type_id in type_ids {
        for method_id in selected_methods(module, type_id, predicate) {
            if module.method_mut(method_id).is_some_and(&mut edit) {
                changed += 1;
            }
        }
    }

    changed
}

/// The methods of one type selected by `predicate`: matching methods, then the accessors of
/// matching properties, then the accessors of matching events.
fn selected_methods(module: &Module, type_id: TypeId, predicate: &NamePredicate) -> Vec<MethodId> {
    let Some(type_def) = module.type_def(type_id) else {
        return Vec::new();
    };

    let type_name = module.full_name(type_id);
    let selects = |kind, name: &str| predicate.matches_member(&MemberRef::new(kind, &type_name, name));
    let mut selected = Vec::new();

    for method_id in type_def.methods() {
        if let Some(method) = module.method(*method_id) {
            if selects(MemberKind::Method, &method.name) {
                selected.push(*method_id);
            }
        }
    }

    for property_id in type_def.properties() {
        if let Some(property) = module.property(*property_id) {
            if selects(MemberKind::Property, &property.name) {
                selected.extend(property.accessors());
            }
        }
    }

    for event_id in type_def.events() {
        if let Some(event) = module.event(*event_id) {
            if selects(MemberKind::Event, &event.name) {
                selected.extend(event.accessors());
            }
        }
    }

    selected
}
