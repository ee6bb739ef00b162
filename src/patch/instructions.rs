//! Patch requests and their instructions.
//!
//! A [`PatchRequest`] is what a build step hands to the [`crate::patch::Patcher`]: the candidate
//! module files, the output directory, and one list of instructions per mutation kind. It can
//! be built in code or read from a JSON instruction file:
//!
//! ```json
//! {
//!   "intermediate_output_path": "obj/patched",
//!   "source_references": ["bin/Core.dll"],
//!   "internals_visible_to": [{ "assembly": "Core", "friend": "Core.Tests" }],
//!   "remove_sealed": [{ "assembly": "Core", "patterns": "MyApp.*Options" }],
//!   "make_virtual": [{ "assembly": "Core", "patterns": "MyApp.Service::*" }],
//!   "make_public": [{ "assembly": "Core" }]
//! }
//! ```

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Grant a friend assembly access to the internals of a target assembly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantInstruction {
    /// The assembly to patch, without extension
    #[serde(alias = "target_assembly_id")]
    pub assembly: String,
    /// The assembly that gains access; an empty name is ignored
    #[serde(default, alias = "granted_assembly_name")]
    pub friend: String,
}

/// Apply a pattern-driven rule to a target assembly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternInstruction {
    /// The assembly to patch, without extension
    #[serde(alias = "target_assembly_id")]
    pub assembly: String,
    /// `;`-separated glob patterns; absent or blank selects everything
    #[serde(default, alias = "name_patterns", skip_serializing_if = "Option::is_none")]
    pub patterns: Option<String>,
}

/// The instruction lists of a request, one per mutation kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchInstructionSet {
    /// Add `InternalsVisibleTo` markers
    pub internals_visible_to: Vec<GrantInstruction>,
    /// Unseal types
    pub remove_sealed: Vec<PatternInstruction>,
    /// Make members virtual
    pub make_virtual: Vec<PatternInstruction>,
    /// Make members public
    pub make_public: Vec<PatternInstruction>,
}

/// Everything requested for one target assembly, in instruction order per kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetInstructions {
    /// The assembly to patch
    pub assembly: String,
    /// Friend assemblies to grant access to
    pub grants: Vec<String>,
    /// Pattern lists for unsealing types
    pub unseal: Vec<Option<String>>,
    /// Pattern lists for virtualizing members
    pub virtualize: Vec<Option<String>>,
    /// Pattern lists for publicizing members
    pub publicize: Vec<Option<String>>,
}

impl TargetInstructions {
    fn new(assembly: &str) -> Self {
        TargetInstructions {
            assembly: assembly.to_string(),
            ..TargetInstructions::default()
        }
    }
}

impl PatchInstructionSet {
    /// Distinct target assemblies, in order of first appearance across grants, unseal,
    /// virtualize and publicize instructions
    #[must_use]
    pub fn target_ids(&self) -> Vec<String> {
        self.group()
            .into_iter()
            .map(|target| target.assembly)
            .collect()
    }

    /// Regroup all instructions by target assembly, in a single pass per list
    #[must_use]
    pub fn group(&self) -> Vec<TargetInstructions> {
        let mut targets: Vec<TargetInstructions> = Vec::new();
        let mut seen = HashSet::new();

        let mut target = |assembly: &str| -> usize {
            if seen.insert(assembly.to_string()) {
                targets.push(TargetInstructions::new(assembly));
                targets.len() - 1
            } else {
                targets
                    .iter()
                    .position(|target| target.assembly == assembly)
                    .unwrap_or_default()
            }
        };

        let mut grants = Vec::new();
        for grant in &self.internals_visible_to {
            grants.push((target(&grant.assembly), grant.friend.clone()));
        }

        let mut patterns = Vec::new();
        for (kind, list) in [&self.remove_sealed, &self.make_virtual, &self.make_public]
            .into_iter()
            .enumerate()
        {
            for instruction in list {
                patterns.push((kind, target(&instruction.assembly), instruction.patterns.clone()));
            }
        }

        for (index, friend) in grants {
            targets[index].grants.push(friend);
        }
        for (kind, index, pattern) in patterns {
            let target = &mut targets[index];
            match kind {
                0 => target.unseal.push(pattern),
                1 => target.virtualize.push(pattern),
                _ => target.publicize.push(pattern),
            }
        }

        targets
    }

    /// True if there is no instruction at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.internals_visible_to.is_empty()
            && self.remove_sealed.is_empty()
            && self.make_virtual.is_empty()
            && self.make_public.is_empty()
    }
}

/// A complete patch invocation.
///
/// # Examples
///
/// ```rust
/// use dotpatch::patch::PatchRequest;
///
/// let request = PatchRequest::new("obj/patched")
///     .source("bin/Core.dll")
///     .grant("Core", "Core.Tests")
///     .unseal("Core", Some("MyApp.*Options"));
///
/// assert_eq!(request.instructions.target_ids(), vec!["Core".to_string()]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchRequest {
    /// Directory the patched modules are written to; relative candidates are resolved
    /// against it
    pub intermediate_output_path: PathBuf,
    /// Candidate module files; `None` makes the request invalid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_references: Option<Vec<PathBuf>>,
    /// What to do
    #[serde(flatten)]
    pub instructions: PatchInstructionSet,
}

impl PatchRequest {
    /// An empty request writing to `intermediate_output_path`
    #[must_use]
    pub fn new(intermediate_output_path: impl Into<PathBuf>) -> Self {
        PatchRequest {
            intermediate_output_path: intermediate_output_path.into(),
            ..PatchRequest::default()
        }
    }

    /// Read a request from a JSON instruction file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file can not be read and
    /// [`crate::Error::InstructionFile`] if it is not a valid request.
    pub fn from_path(path: &Path) -> Result<PatchRequest> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a request from JSON text.
    ///
    /// # Errors
    /// Returns [`crate::Error::InstructionFile`] if `text` is not a valid request.
    pub fn from_json(text: &str) -> Result<PatchRequest> {
        Ok(serde_json::from_str(text)?)
    }

    /// Add a candidate module file
    #[must_use]
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_references
            .get_or_insert_with(Vec::new)
            .push(path.into());
        self
    }

    /// Add a grant instruction
    #[must_use]
    pub fn grant(mut self, assembly: &str, friend: &str) -> Self {
        self.instructions.internals_visible_to.push(GrantInstruction {
            assembly: assembly.to_string(),
            friend: friend.to_string(),
        });
        self
    }

    /// Add an unseal instruction
    #[must_use]
    pub fn unseal(mut self, assembly: &str, patterns: Option<&str>) -> Self {
        self.instructions
            .remove_sealed
            .push(pattern_instruction(assembly, patterns));
        self
    }

    /// Add a virtualize instruction
    #[must_use]
    pub fn virtualize(mut self, assembly: &str, patterns: Option<&str>) -> Self {
        self.instructions
            .make_virtual
            .push(pattern_instruction(assembly, patterns));
        self
    }

    /// Add a publicize instruction
    #[must_use]
    pub fn publicize(mut self, assembly: &str, patterns: Option<&str>) -> Self {
        self.instructions
            .make_public
            .push(pattern_instruction(assembly, patterns));
        self
    }
}

fn pattern_instruction(assembly: &str, patterns: Option<&str>) -> PatternInstruction {
    PatternInstruction {
        assembly: assembly.to_string(),
        patterns: patterns.map(str::to_string),
    }
}
