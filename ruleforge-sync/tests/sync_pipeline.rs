use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use filetime::{set_file_mtime, FileTime};
use rstest::rstest;
use tempfile::TempDir;

use ruleforge_core::config::{lockfile_path_at, LockMode};
use ruleforge_sync::lockfile::approve;
use ruleforge_sync::{
    sync, DriftStatus, Lockfile, ManualEdit, Resolution, SyncContext, SyncError, SyncOptions,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn project(config: &str) -> TempDir {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join(".ruleforge");
    fs::create_dir_all(dir.join("rules")).unwrap();
    fs::write(dir.join("config.yaml"), config).unwrap();
    tmp
}

fn write_rule(root: &Path, name: &str, text: &str) -> PathBuf {
    let path = root.join(".ruleforge").join("rules").join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, text).unwrap();
    path
}

fn ctx(root: &Path, options: SyncOptions) -> SyncContext {
    SyncContext::load(root, options).unwrap()
}

fn run(root: &Path) -> ruleforge_sync::SyncOutcome {
    sync(&ctx(root, SyncOptions::default()), None).unwrap()
}

const TESTING: &str = "---\ntitle: Testing Standards\nseverity: error\nglobs: [\"**/*.rs\"]\n---\n\nWrite tests for every public function.\n";
const DOCS: &str = "---\ntitle: Docs Style\nnested_location: apps/docs\n---\n\nUse sentence case.\n";

#[test]
fn rerun_without_changes_writes_nothing() {
    let tmp = project("exporters: [agents, cursor, claude, gemini-settings, aider-config]\n");
    write_rule(tmp.path(), "testing.md", TESTING);
    write_rule(tmp.path(), "docs.md", DOCS);

    let first = run(tmp.path());
    assert!(first.success, "{:?}", first.exporters);
    assert!(!first.written_files.is_empty());

    let second = run(tmp.path());
    assert!(second.success);
    assert!(second.written_files.is_empty(), "{:?}", second.written_files);
    for (a, b) in first.exporters.iter().zip(&second.exporters) {
        assert_eq!(a.exporter, b.exporter);
        assert_eq!(a.content_hash, b.content_hash, "{}", a.exporter);
        assert!(b.files_written.is_empty(), "{}", b.exporter);
    }
}

#[test]
fn nested_rule_exports_under_its_location() {
    let tmp = project("exporters: [cursor]\n");
    write_rule(tmp.path(), "docs.md", DOCS);
    run(tmp.path());
    assert!(tmp.path().join("apps/docs/.cursor/rules/docs.mdc").exists());
}

#[rstest]
#[case(&["a.md", "b.md"])]
#[case(&["b.md", "a.md"])]
fn later_mtime_wins(#[case] write_order: &[&str]) {
    let tmp = project("exporters: [claude]\n");
    let base = SystemTime::now() - Duration::from_secs(3600);
    for name in write_order {
        let path = write_rule(
            tmp.path(),
            name,
            &format!("## Testing Standards\n\nFrom {name}.\n"),
        );
        let offset = if *name == "b.md" { 60 } else { 0 };
        set_file_mtime(&path, FileTime::from_system_time(base + Duration::from_secs(offset))).unwrap();
    }

    let outcome = run(tmp.path());
    assert_eq!(outcome.conflicts.len(), 1);
    assert_eq!(outcome.conflicts[0].winner, PathBuf::from(".ruleforge/rules/b.md"));
    let claude = fs::read_to_string(tmp.path().join("CLAUDE.md")).unwrap();
    assert!(claude.contains("From b.md."));
    assert!(!claude.contains("From a.md."));
    assert!(fs::metadata(tmp.path().join(".ruleforge/rules/a.md")).is_ok(), "sources untouched");
}

#[test]
fn manual_edit_blocks_only_that_exporter() {
    let tmp = project("exporters: [agents, claude]\n");
    write_rule(tmp.path(), "testing.md", TESTING);
    run(tmp.path());

    fs::write(tmp.path().join("AGENTS.md"), "hand edited\n").unwrap();
    write_rule(tmp.path(), "testing.md", &TESTING.replace("every public", "each"));

    let outcome = run(tmp.path());
    assert!(!outcome.success);
    let agents = outcome.exporters.iter().find(|r| r.exporter == "agents").unwrap();
    assert!(!agents.success);
    assert!(agents.error.as_deref().unwrap().contains("modified outside ruleforge"));
    let claude = outcome.exporters.iter().find(|r| r.exporter == "claude").unwrap();
    assert!(claude.success);
    assert_eq!(fs::read_to_string(tmp.path().join("AGENTS.md")).unwrap(), "hand edited\n");

    let forced = SyncOptions {
        force: true,
        ..SyncOptions::default()
    };
    let outcome = sync(&ctx(tmp.path(), forced), None).unwrap();
    assert!(outcome.success);
    assert!(fs::read_to_string(tmp.path().join("AGENTS.md")).unwrap().contains("each"));
}

#[test]
fn abort_rolls_back_the_run() {
    let tmp = project("exporters: [claude, agents]\n");
    write_rule(tmp.path(), "testing.md", TESTING);
    run(tmp.path());
    let claude_before = fs::read_to_string(tmp.path().join("CLAUDE.md")).unwrap();

    fs::write(tmp.path().join("AGENTS.md"), "hand edited\n").unwrap();
    write_rule(tmp.path(), "testing.md", &TESTING.replace("every public", "each"));

    let handler = Box::new(|_: &ManualEdit| Resolution::Abort);
    let err = sync(&ctx(tmp.path(), SyncOptions::default()), Some(handler)).unwrap_err();
    assert!(matches!(err, SyncError::Aborted { .. }));
    assert_eq!(fs::read_to_string(tmp.path().join("CLAUDE.md")).unwrap(), claude_before);
    assert_eq!(fs::read_to_string(tmp.path().join("AGENTS.md")).unwrap(), "hand edited\n");
}

#[test]
fn strict_lockfile_blocks_until_forced() {
    let tmp = project("exporters: [agents]\nlockfile: {mode: strict}\n");
    write_rule(tmp.path(), "testing.md", TESTING);

    let blocked = run(tmp.path());
    assert_eq!(blocked.drift, DriftStatus::StaleStrict);
    let h1 = blocked.bundle_hash.clone();
    approve(tmp.path(), &h1, "alice").unwrap();

    let first = run(tmp.path());
    assert!(first.success);
    assert_eq!(first.drift, DriftStatus::Current);
    assert_eq!(Lockfile::load_at(tmp.path()).unwrap().unwrap().bundle_hash, h1);
    let agents_h1 = fs::read_to_string(tmp.path().join("AGENTS.md")).unwrap();

    write_rule(tmp.path(), "testing.md", &TESTING.replace("every public", "each"));
    let stale = run(tmp.path());
    assert!(!stale.success);
    assert_eq!(stale.drift, DriftStatus::StaleStrict);
    assert!(stale.written_files.is_empty());
    assert_eq!(fs::read_to_string(tmp.path().join("AGENTS.md")).unwrap(), agents_h1);
    let lock = Lockfile::load_at(tmp.path()).unwrap().unwrap();
    assert_eq!(lock.bundle_hash, h1);
    assert_eq!(lock.mode, LockMode::Strict);

    let forced = SyncOptions {
        force: true,
        ..SyncOptions::default()
    };
    let outcome = sync(&ctx(tmp.path(), forced), None).unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.drift, DriftStatus::Forced);
    let h2 = Lockfile::load_at(tmp.path()).unwrap().unwrap().bundle_hash;
    assert_eq!(h2, outcome.bundle_hash);
    assert_ne!(h2, h1);
}

#[test]
fn soft_lockfile_warns_and_proceeds() {
    let tmp = project("exporters: [agents]\nlockfile: {mode: soft}\n");
    write_rule(tmp.path(), "testing.md", TESTING);
    let outcome = run(tmp.path());
    assert!(outcome.success);
    assert_eq!(outcome.drift, DriftStatus::StaleSoft);
    assert!(outcome.warnings.iter().any(|w| w.contains("not approved")));
    assert!(lockfile_path_at(tmp.path()).exists());
    assert!(!tmp.path().join(".ruleforge/allow.yaml").exists(), "never auto-approves");
}

#[test]
fn stale_exports_warn_then_clean() {
    let tmp = project("exporters: [cursor]\n");
    write_rule(tmp.path(), "testing.md", TESTING);
    let docs = write_rule(tmp.path(), "docs.md", DOCS);
    run(tmp.path());
    let exported = tmp.path().join("apps/docs/.cursor/rules/docs.mdc");
    assert!(exported.exists());

    fs::remove_file(docs).unwrap();
    let outcome = run(tmp.path());
    assert!(outcome.success);
    assert_eq!(outcome.stale.len(), 1);
    assert_eq!(outcome.stale[0].path, "apps/docs/.cursor/rules/docs.mdc");
    assert!(exported.exists(), "warn-only by default");

    let clean = SyncOptions {
        clean: true,
        ..SyncOptions::default()
    };
    let outcome = sync(&ctx(tmp.path(), clean), None).unwrap();
    let report = outcome.cleaned.expect("clean report");
    assert_eq!(report.deleted, vec!["apps/docs/.cursor/rules/docs.mdc".to_string()]);
    assert!(!exported.exists());

    let after = run(tmp.path());
    assert!(after.stale.is_empty());
}

#[test]
fn disabled_rule_becomes_stale() {
    let tmp = project("exporters: [cursor]\n");
    write_rule(tmp.path(), "testing.md", TESTING);
    run(tmp.path());
    write_rule(
        tmp.path(),
        "testing.md",
        &TESTING.replace("severity: error\n", "severity: error\nenabled: false\n"),
    );
    let outcome = run(tmp.path());
    assert_eq!(outcome.stale.len(), 1);
    assert_eq!(outcome.stale[0].path, ".cursor/rules/testing.mdc");
}

#[test]
fn preserved_user_section_survives_sync() {
    let tmp = project("exporters: [agents]\n");
    write_rule(tmp.path(), "testing.md", TESTING);
    run(tmp.path());

    let path = tmp.path().join("AGENTS.md");
    let mut text = fs::read_to_string(&path).unwrap();
    text.push_str("\n## Local Notes\n\nKeep this.\n");
    fs::write(&path, &text).unwrap();

    let forced = SyncOptions {
        force: true,
        ..SyncOptions::default()
    };
    write_rule(tmp.path(), "testing.md", &TESTING.replace("every public", "each"));
    sync(&ctx(tmp.path(), forced), None).unwrap();
    let after = fs::read_to_string(&path).unwrap();
    assert!(after.contains("## Local Notes"));
    assert!(after.contains("Keep this."));
    assert!(after.contains("each"));
}

#[test]
fn body_heading_does_not_duplicate_on_rerun() {
    let tmp = project("exporters: [agents]\n");
    write_rule(
        tmp.path(),
        "testing.md",
        "---\ntitle: Testing\n---\n\nIntro.\n\n## Details\n\nMore.\n",
    );
    let first = run(tmp.path());
    assert!(first.success);

    let forced = SyncOptions {
        force: true,
        ..SyncOptions::default()
    };
    let second = sync(&ctx(tmp.path(), forced), None).unwrap();
    assert!(second.success);
    assert!(second.written_files.is_empty(), "{:?}", second.written_files);
    let agents = fs::read_to_string(tmp.path().join("AGENTS.md")).unwrap();
    assert_eq!(agents.matches("## Details").count(), 1, "{agents}");
    assert_eq!(first.exporters[0].content_hash, second.exporters[0].content_hash);
}

#[test]
fn nested_location_cannot_leave_the_project() {
    let tmp = project("exporters: [cursor]\n");
    write_rule(
        tmp.path(),
        "evil.md",
        "---\ntitle: Evil\nnested_location: ../escaped\n---\n\nbody\n",
    );
    let err = sync(&ctx(tmp.path(), SyncOptions::default()), None).unwrap_err();
    assert!(err.to_string().contains("escapes the project root"), "{err}");
    assert!(!tmp.path().join("../escaped").exists());
    assert!(!tmp.path().join(".cursor").exists());
}

#[test]
fn config_exports_reference_only_written_files() {
    let tmp = project("exporters: [agents, gemini-settings]\nscopes: [{path: apps/docs}]\n");
    write_rule(tmp.path(), "testing.md", TESTING);
    write_rule(tmp.path(), "docs.md", DOCS);
    let outcome = run(tmp.path());
    assert!(outcome.success, "{:?}", outcome.exporters);

    let settings = fs::read_to_string(tmp.path().join(".gemini/settings.json")).unwrap();
    let settings: serde_json::Value = serde_json::from_str(&settings).unwrap();
    let referenced = settings["contextFileName"].as_array().unwrap();
    assert!(!referenced.is_empty());
    for file in referenced {
        let file = file.as_str().unwrap();
        assert!(tmp.path().join(file).exists(), "{file} is referenced but missing");
    }
}
