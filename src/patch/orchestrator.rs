use std::path::PathBuf;

use log::{debug, info};
use serde::Serialize;

use crate::{
    backend::ModuleBackend,
    patch::{
        resolve, GrantInternalsAccess, MutationOutcome, MutationRule, NamePredicate,
        PatchRequest, PublicizeMembers, ResolvedTarget, TargetInstructions, UnsealTypes,
        VirtualizeMembers,
    },
    Error, Result,
};

/// What happened to one target assembly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    /// The assembly name
    pub assembly: String,
    /// The module that was loaded
    pub source: PathBuf,
    /// The module that was written
    pub output: PathBuf,
    /// One entry per applied rule, in application order
    pub outcomes: Vec<MutationOutcome>,
}

/// The result of a patch run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    /// Patched targets, in processing order
    pub targets: Vec<TargetReport>,
    /// Targets for which no source reference was found
    pub skipped: Vec<String>,
}

impl PatchReport {
    /// The report of a target, by assembly name
    #[must_use]
    pub fn target(&self, assembly: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|target| target.assembly == assembly)
    }
}

/// Runs patch requests against a [`ModuleBackend`].
///
/// Every target is resolved, loaded once, edited by its rules in a fixed order (grants, unseal,
/// virtualize, publicize) and written once, before the next target is started. A target with
/// no matching source reference is skipped. Failing to load or write a module ends the run.
///
/// # Examples
///
/// ```rust
/// use dotpatch::backend::MemoryBackend;
/// use dotpatch::model::{Module, TypeAttributes};
/// use dotpatch::patch::{PatchRequest, Patcher};
///
/// let dir = std::env::temp_dir().join("dotpatch-doc-orchestrator");
/// let backend = MemoryBackend::new();
/// let mut core = Module::new("Core");
/// core.add_type("MyApp", "FooOptions", TypeAttributes::PUBLIC | TypeAttributes::SEALED);
/// backend.insert(dir.join("Core.dll"), core);
///
/// let request = PatchRequest::new(&dir)
///     .source("Core.dll")
///     .unseal("Core", Some("MyApp.*Options"));
///
/// let patcher = Patcher::new(backend);
/// let report = patcher.run(&request)?;
/// assert_eq!(report.targets[0].outcomes[0].matched, 1);
/// # Ok::<(), dotpatch::Error>(())
/// ```
pub struct Patcher<B: ModuleBackend> {
    backend: B,
}

impl<B: ModuleBackend> Patcher<B> {
    /// Create a patcher using `backend` for module I/O
    pub fn new(backend: B) -> Self {
        Patcher { backend }
    }

    /// The backend modules are loaded from and written to
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Execute `request`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Configuration`] if the request has no source references,
    /// [`crate::Error::FileError`] if the output directory can not be created, and any error of
    /// the backend while loading or writing a module.
    pub fn run(&self, request: &PatchRequest) -> Result<PatchReport> {
        let Some(sources) = request.source_references.as_deref() else {
            return Err(Error::Configuration(
                "source_references must be provided".to_string(),
            ));
        };

        let base = &request.intermediate_output_path;
        std::fs::create_dir_all(base)?;

        let mut report = PatchReport::default();
        for instructions in request.instructions.group() {
            let Some(target) = resolve(&instructions.assembly, sources, base) else {
                info!(
                    "Skipping '{}': no matching source reference",
                    instructions.assembly
                );
                report.skipped.push(instructions.assembly);
                continue;
            };

            let outcomes = self.patch_target(&target, &instructions)?;
            report.targets.push(TargetReport {
                assembly: target.assembly,
                source: target.source,
                output: target.output,
                outcomes,
            });
        }

        Ok(report)
    }

    fn patch_target(
        &self,
        target: &ResolvedTarget,
        instructions: &TargetInstructions,
    ) -> Result<Vec<MutationOutcome>> {
        let mut module = self.backend.load(&target.source)?;

        let mut outcomes = Vec::new();
        for rule in rules(instructions) {
            let outcome = rule.apply(&mut *module);
            info!("{}", outcome.description(&target.output));
            outcomes.push(outcome);
        }

        self.backend.write(module, &target.output)?;
        Ok(outcomes)
    }
}

/// The rules for one target, in application order
fn rules(instructions: &TargetInstructions) -> Vec<Box<dyn MutationRule>> {
    let mut rules: Vec<Box<dyn MutationRule>> = Vec::new();

    for friend in &instructions.grants {
        if friend.is_empty() {
            debug!(
                "Ignoring grant without a friend assembly for '{}'",
                instructions.assembly
            );
            continue;
        }
        rules.push(Box::new(GrantInternalsAccess::new(friend)));
    }

    let predicates = |kind: &str, lists: &[Option<String>]| -> Vec<NamePredicate> {
        lists
            .iter()
            .map(|patterns| {
                let predicate = NamePredicate::compile(patterns.as_deref());
                if predicate.is_match_all() {
                    debug!(
                        "Applying {} to every member of '{}'",
                        kind, instructions.assembly
                    );
                }
                predicate
            })
            .collect()
    };

    for predicate in predicates("unseal", &instructions.unseal) {
        rules.push(Box::new(UnsealTypes::new(predicate)));
    }
    for predicate in predicates("virtualize", &instructions.virtualize) {
        rules.push(Box::new(VirtualizeMembers::new(predicate)));
    }
    for predicate in predicates("publicize", &instructions.publicize) {
        rules.push(Box::new(PublicizeMembers::new(predicate)));
    }

    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::RuleKind;

    #[test]
    fn rule_order() {
        let instructions = TargetInstructions {
            assembly: "Core".to_string(),
            grants: vec!["Core.Tests".to_string(), String::new()],
            unseal: vec![None],
            virtualize: vec![Some("A".to_string()), Some("B".to_string())],
            publicize: vec![Some("C".to_string())],
        };

        let kinds: Vec<RuleKind> = rules(&instructions).iter().map(|rule| rule.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                RuleKind::GrantInternalsAccess,
                RuleKind::UnsealTypes,
                RuleKind::VirtualizeMembers,
                RuleKind::VirtualizeMembers,
                RuleKind::PublicizeMembers,
            ]
        );
    }

    #[test]
    fn no_rules() {
        assert!(rules(&TargetInstructions::default()).is_empty());
    }
}
