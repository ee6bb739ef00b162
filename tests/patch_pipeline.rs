//! Patch runs over the in-memory backend.

use std::path::{Path, PathBuf};

use dotpatch::{model::TypeId, prelude::*};

const PUBLIC_SEALED: u32 = TypeAttributes::PUBLIC | TypeAttributes::SEALED;

struct Workspace {
    _dir: tempfile::TempDir,
    bin: PathBuf,
    out: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        let out = dir.path().join("obj").join("patched");
        Workspace { _dir: dir, bin, out }
    }

    fn source(&self, file: &str) -> PathBuf {
        self.bin.join(file)
    }

    fn request(&self) -> PatchRequest {
        PatchRequest::new(&self.out)
    }
}

fn options_module() -> Module {
    let mut module = Module::new("Core");
    module.add_type("MyApp", "FooOptions", PUBLIC_SEALED);
    module.add_type("MyApp", "Bar", PUBLIC_SEALED);
    module.add_type("MyApp", "BazOptions", TypeAttributes::PUBLIC);
    module
}

fn is_sealed(module: &Module, full_name: &str) -> bool {
    let id: TypeId = module.find_type(full_name).unwrap();
    module.type_def(id).unwrap().is_sealed()
}

#[test]
fn unseal_matching_types_only() {
    let ws = Workspace::new();
    let backend = MemoryBackend::new();
    backend.insert(ws.source("Core.dll"), options_module());

    let request = ws
        .request()
        .source(ws.source("Core.dll"))
        .unseal("Core", Some("MyApp.*Options"));
    let patcher = Patcher::new(backend);
    let report = patcher.run(&request).unwrap();

    let target = report.target("Core").unwrap();
    assert_eq!(target.outcomes.len(), 1);
    assert_eq!(target.outcomes[0].rule, RuleKind::UnsealTypes);
    assert_eq!(target.outcomes[0].matched, 1);
    assert_eq!(
        target.outcomes[0].description(&target.output),
        format!(
            "Removed 'sealed' from 1 types in '{}' matching patterns: MyApp.*Options",
            ws.out.join("Core.dll").display()
        )
    );

    let written = patcher.backend().module(&ws.out.join("Core.dll")).unwrap();
    assert!(!is_sealed(&written, "MyApp.FooOptions"));
    assert!(is_sealed(&written, "MyApp.Bar"));
    assert!(!is_sealed(&written, "MyApp.BazOptions"));

    // The source module is left as it was
    let source = patcher.backend().module(&ws.source("Core.dll")).unwrap();
    assert!(is_sealed(&source, "MyApp.FooOptions"));
    assert!(ws.out.is_dir());
}

#[test]
fn duplicate_grants_add_two_markers() {
    let ws = Workspace::new();
    let backend = MemoryBackend::new();
    backend.insert(ws.source("Core.dll"), Module::new("Core"));

    let request = ws
        .request()
        .source(ws.source("Core.dll"))
        .grant("Core", "Core.Tests")
        .grant("Core", "Core.Tests");
    let patcher = Patcher::new(backend);
    let report = patcher.run(&request).unwrap();

    let outcomes = &report.target("Core").unwrap().outcomes;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes
        .iter()
        .all(|outcome| outcome.rule == RuleKind::GrantInternalsAccess));

    let written = patcher.backend().module(&ws.out.join("Core.dll")).unwrap();
    assert_eq!(
        written.internals_visible_to().collect::<Vec<_>>(),
        ["Core.Tests", "Core.Tests"]
    );
}

#[test]
fn unresolved_target_is_skipped() {
    let ws = Workspace::new();
    let backend = MemoryBackend::new();
    backend.insert(ws.source("Util.dll"), Module::new("Util"));

    let request = ws
        .request()
        .source(ws.source("Util.dll"))
        .grant("Core", "Core.Tests")
        .unseal("Core", None);
    let patcher = Patcher::new(backend);
    let report = patcher.run(&request).unwrap();

    assert!(report.targets.is_empty());
    assert_eq!(report.skipped, ["Core"]);
    assert!(patcher.backend().loads().is_empty());
    assert!(patcher.backend().writes().is_empty());
}

#[test]
fn missing_source_references() {
    let ws = Workspace::new();
    let request = ws.request().grant("Core", "Core.Tests");

    let result = Patcher::new(MemoryBackend::new()).run(&request);
    assert!(matches!(result, Err(Error::Configuration(_))));
    assert!(!ws.out.exists());
}

#[test]
fn empty_instructions_load_nothing() {
    let ws = Workspace::new();
    let backend = MemoryBackend::new();
    backend.insert(ws.source("Core.dll"), options_module());

    let request = ws.request().source(ws.source("Core.dll"));
    let patcher = Patcher::new(backend);
    let report = patcher.run(&request).unwrap();

    assert_eq!(report, PatchReport::default());
    assert!(patcher.backend().loads().is_empty());
}

#[test]
fn each_target_is_loaded_and_written_once() {
    let ws = Workspace::new();
    let backend = MemoryBackend::new();
    backend.insert(ws.source("Core.dll"), options_module());

    let mut util = Module::new("Util");
    let helpers = util.add_type("Util", "Helpers", TypeAttributes::PUBLIC);
    util.add_method(helpers, "Format", 0x0083).unwrap();
    backend.insert(ws.source("Util.dll"), util);

    let request = ws
        .request()
        .source(ws.source("Core.dll"))
        .source(ws.source("Util.dll"))
        .publicize("Util", Some("Util.Helpers::*"))
        .unseal("Core", Some("MyApp.FooOptions"))
        .grant("Core", "Core.Tests")
        .unseal("Core", Some("MyApp.Bar"));
    let patcher = Patcher::new(backend);
    let report = patcher.run(&request).unwrap();

    // Targets follow first appearance across grants, unseal, virtualize and publicize lists
    let order: Vec<&str> = report.targets.iter().map(|t| t.assembly.as_str()).collect();
    assert_eq!(order, ["Core", "Util"]);
    assert_eq!(
        patcher.backend().loads(),
        vec![ws.source("Core.dll"), ws.source("Util.dll")]
    );
    assert_eq!(
        patcher.backend().writes(),
        vec![ws.out.join("Core.dll"), ws.out.join("Util.dll")]
    );

    let core = report.target("Core").unwrap();
    let rules: Vec<RuleKind> = core.outcomes.iter().map(|outcome| outcome.rule).collect();
    assert_eq!(
        rules,
        [
            RuleKind::GrantInternalsAccess,
            RuleKind::UnsealTypes,
            RuleKind::UnsealTypes
        ]
    );

    let written = patcher.backend().module(&ws.out.join("Core.dll")).unwrap();
    assert!(!is_sealed(&written, "MyApp.FooOptions"));
    assert!(!is_sealed(&written, "MyApp.Bar"));

    let util = report.target("Util").unwrap();
    assert_eq!(util.outcomes[0].matched, 1);
    assert_eq!(
        util.outcomes[0].description(Path::new("Util.dll")),
        "Made 1 methods public in 'Util.dll' matching patterns: Util.Helpers::*"
    );
}

#[test]
fn request_from_instruction_file() {
    let ws = Workspace::new();
    let file = ws.bin.with_file_name("patch.json");
    std::fs::write(
        &file,
        format!(
            r#"{{
                "intermediate_output_path": {out:?},
                "source_references": [{src:?}],
                "remove_sealed": [{{ "target_assembly_id": "Core", "name_patterns": "MyApp.Bar" }}]
            }}"#,
            out = ws.out.display().to_string(),
            src = ws.source("Core.dll").display().to_string()
        ),
    )
    .unwrap();

    let request = PatchRequest::from_path(&file).unwrap();
    let backend = MemoryBackend::new();
    backend.insert(ws.source("Core.dll"), options_module());

    let patcher = Patcher::new(backend);
    let report = patcher.run(&request).unwrap();
    assert_eq!(report.target("Core").unwrap().outcomes[0].matched, 1);

    let written = patcher.backend().module(&ws.out.join("Core.dll")).unwrap();
    assert!(!is_sealed(&written, "MyApp.Bar"));
    assert!(is_sealed(&written, "MyApp.FooOptions"));
}

#[test]
fn relative_sources_resolve_against_output_directory() {
    let ws = Workspace::new();
    let backend = MemoryBackend::new();
    backend.insert(ws.out.join("Core.dll"), options_module());

    let request = ws.request().source("Core.dll").unseal("Core", None);
    let patcher = Patcher::new(backend);
    let report = patcher.run(&request).unwrap();

    let target = report.target("Core").unwrap();
    assert_eq!(target.source, ws.out.join("Core.dll"));
    assert_eq!(target.outcomes[0].matched, 2);
}
