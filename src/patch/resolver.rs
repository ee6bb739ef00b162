//! Mapping assembly names to module files.

use std::path::{Component, Path, PathBuf};

use log::debug;
use serde::Serialize;

/// A target assembly together with the file it is read from and the file it is written to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    /// Assembly name, without extension
    pub assembly: String,
    /// The module to load
    pub source: PathBuf,
    /// Where the patched module is written: the base directory joined with the source file name
    pub output: PathBuf,
}

/// Find the module for `assembly` among `candidates`.
///
/// Relative candidates are taken relative to `base`; absolute ones are normalized. A candidate
/// matches if its file stem equals `assembly` exactly, and the first match wins.
///
/// # Examples
///
/// ```rust
/// use dotpatch::patch::resolve;
/// use std::path::{Path, PathBuf};
///
/// let candidates = [PathBuf::from("/build/bin/Core.dll"), PathBuf::from("/other/Core.dll")];
/// let target = resolve("Core", &candidates, Path::new("obj/patched")).unwrap();
///
/// assert_eq!(target.source, Path::new("/build/bin/Core.dll"));
/// assert_eq!(target.output, Path::new("obj/patched/Core.dll"));
/// assert!(resolve("Missing", &candidates, Path::new("obj")).is_none());
/// ```
#[must_use]
pub fn resolve(assembly: &str, candidates: &[PathBuf], base: &Path) -> Option<ResolvedTarget> {
    let source = candidates
        .iter()
        .map(|candidate| full_path(base, candidate))
        .find(|path| path.file_stem().is_some_and(|stem| stem == assembly))?;

    let file_name = source.file_name()?;
    let output = base.join(file_name);

    debug!(
        "Resolved '{}' to '{}' (output '{}')",
        assembly,
        source.display(),
        output.display()
    );

    Some(ResolvedTarget {
        assembly: assembly.to_string(),
        source,
        output,
    })
}

fn full_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        base.join(path)
    }
}

/// Drop `.` components and fold `..` into its parent, without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never climb above the root
                if !matches!(
                    normalized.components().next_back(),
                    None | Some(Component::RootDir | Component::Prefix(_))
                ) {
                    normalized.pop();
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn first_match_wins() {
        let candidates = paths(&["/a/Core.dll", "/b/Core.dll"]);
        let target = resolve("Core", &candidates, Path::new("/out")).unwrap();
        assert_eq!(target.source, PathBuf::from("/a/Core.dll"));
        assert_eq!(target.output, PathBuf::from("/out/Core.dll"));
        assert_eq!(target.assembly, "Core");
    }

    #[test]
    fn stem_must_match_exactly() {
        let candidates = paths(&["/a/Core.Tests.dll", "/a/core.dll", "/a/CoreX.dll"]);
        assert!(resolve("Core", &candidates, Path::new("/out")).is_none());

        let target = resolve("Core.Tests", &candidates, Path::new("/out")).unwrap();
        assert_eq!(target.output, PathBuf::from("/out/Core.Tests.dll"));
    }

    #[test]
    fn relative_candidates() {
        let candidates = paths(&["../bin/Core.dll"]);
        let target = resolve("Core", &candidates, Path::new("obj/patched")).unwrap();
        assert_eq!(target.source, PathBuf::from("obj/patched/../bin/Core.dll"));
        assert_eq!(target.output, PathBuf::from("obj/patched/Core.dll"));
    }

    #[test]
    fn absolute_candidates_are_normalized() {
        let candidates = paths(&["/build/./bin/../lib/Core.exe"]);
        let target = resolve("Core", &candidates, Path::new("/out")).unwrap();
        assert_eq!(target.source, PathBuf::from("/build/lib/Core.exe"));
        assert_eq!(target.output, PathBuf::from("/out/Core.exe"));

        assert_eq!(normalize(Path::new("/../../x")), PathBuf::from("/x"));
    }

    #[test]
    fn no_candidates() {
        assert!(resolve("Core", &[], Path::new("/out")).is_none());
    }
}
