use anyhow::Context;
use dotpatch::prelude::*;

use crate::{
    app::{GlobalOptions, PatchArgs},
    output::{print_output, Align, TabWriter},
};

/// Build the request from the instruction file and the command line, run it and print the
/// report.
pub fn run(args: &PatchArgs, opts: &GlobalOptions) -> anyhow::Result<()> {
    let request = build_request(args)?;
    let report = dotpatch::patch(&request).context("patching failed")?;

    print_output(&report, opts, print_report)
}

fn build_request(args: &PatchArgs) -> anyhow::Result<PatchRequest> {
    let mut request = match &args.config {
        Some(path) => PatchRequest::from_path(path)
            .with_context(|| format!("failed to read instruction file: {}", path.display()))?,
        None => PatchRequest::default(),
    };

    if let Some(out_dir) = &args.out_dir {
        request.intermediate_output_path.clone_from(out_dir);
    }
    if request.intermediate_output_path.as_os_str().is_empty() {
        anyhow::bail!("no output directory: pass --out-dir or set intermediate_output_path");
    }

    for source in &args.sources {
        request = request.source(source);
    }
    for (assembly, friend) in &args.grants {
        request = request.grant(assembly, friend);
    }
    for (assembly, patterns) in &args.unseal {
        request = request.unseal(assembly, patterns.as_deref());
    }
    for (assembly, patterns) in &args.virtualize {
        request = request.virtualize(assembly, patterns.as_deref());
    }
    for (assembly, patterns) in &args.publicize {
        request = request.publicize(assembly, patterns.as_deref());
    }

    Ok(request)
}

fn print_report(report: &PatchReport) {
    if report.targets.is_empty() && report.skipped.is_empty() {
        println!("Nothing to patch.");
        return;
    }

    let mut table = TabWriter::new(&[
        ("ASSEMBLY", Align::Left),
        ("RULE", Align::Left),
        ("CHANGED", Align::Right),
        ("DETAIL", Align::Left),
    ]);
    for target in &report.targets {
        for outcome in &target.outcomes {
            table.row(vec![
                target.assembly.clone(),
                outcome.rule.to_string(),
                outcome.matched.to_string(),
                outcome.detail.clone(),
            ]);
        }
    }
    for assembly in &report.skipped {
        table.row(vec![
            assembly.clone(),
            "skipped".to_string(),
            "-".to_string(),
            "no matching source reference".to_string(),
        ]);
    }
    table.print();

    if !report.targets.is_empty() {
        println!();
        for target in &report.targets {
            println!("{} -> {}", target.source.display(), target.output.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn args() -> PatchArgs {
        PatchArgs {
            config: None,
            sources: vec![PathBuf::from("bin/Core.dll")],
            out_dir: Some(PathBuf::from("obj/patched")),
            grants: vec![("Core".to_string(), "Core.Tests".to_string())],
            unseal: vec![("Core".to_string(), None)],
            virtualize: Vec::new(),
            publicize: vec![("Core".to_string(), Some("MyApp.*".to_string()))],
        }
    }

    #[test]
    fn request_from_arguments() {
        let request = build_request(&args()).unwrap();
        assert_eq!(request.intermediate_output_path, PathBuf::from("obj/patched"));
        assert_eq!(
            request.source_references,
            Some(vec![PathBuf::from("bin/Core.dll")])
        );
        assert_eq!(request.instructions.internals_visible_to[0].friend, "Core.Tests");
        assert_eq!(request.instructions.remove_sealed[0].patterns, None);
        assert_eq!(
            request.instructions.make_public[0].patterns.as_deref(),
            Some("MyApp.*")
        );
    }

    #[test]
    fn arguments_extend_instruction_file() {
        let dir = std::env::temp_dir().join(format!("dotpatch-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = dir.join("patch.json");
        std::fs::write(
            &config,
            r#"{
                "intermediate_output_path": "obj/from-file",
                "source_references": ["bin/Util.dll"],
                "remove_sealed": [{ "assembly": "Util" }]
            }"#,
        )
        .unwrap();

        let request = build_request(&PatchArgs {
            config: Some(config),
            ..args()
        })
        .unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(request.intermediate_output_path, PathBuf::from("obj/patched"));
        assert_eq!(
            request.source_references,
            Some(vec![PathBuf::from("bin/Util.dll"), PathBuf::from("bin/Core.dll")])
        );
        assert_eq!(request.instructions.target_ids(), ["Core", "Util"]);
    }

    #[test]
    fn missing_output_directory() {
        let result = build_request(&PatchArgs {
            out_dir: None,
            ..args()
        });
        assert!(result.is_err());
    }
}
