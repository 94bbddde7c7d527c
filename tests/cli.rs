use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const FIXTURE: &str = include_str!("fixtures/minimal.pbxproj");

fn pbxedit() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pbxedit"));
    cmd.env_remove("PBXEDIT_PROJECT").env("NO_COLOR", "1");
    cmd
}

/// A scratch `Demo.xcodeproj/project.pbxproj` holding the fixture.
fn scratch_project() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let bundle = dir.path().join("Demo.xcodeproj");
    fs::create_dir(&bundle).expect("create bundle");
    let descriptor = bundle.join("project.pbxproj");
    fs::write(&descriptor, FIXTURE).expect("write fixture");
    (dir, descriptor)
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("failed to run pbxedit")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("read descriptor")
}

// --- add ---

#[test]
fn add_writes_file_into_every_section() {
    let (_dir, descriptor) = scratch_project();
    let out = run(pbxedit().arg("add").arg(&descriptor).arg("Camera.swift"));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("+ Camera.swift (compile-sources)"));

    let text = read(&descriptor);
    assert!(text.contains("/* Camera.swift in Sources */ = {isa = PBXBuildFile; fileRef = "));
    assert!(text.contains("lastKnownFileType = sourcecode.swift; path = Camera.swift; sourceTree = \"<group>\"; };"));
    assert_eq!(text.matches("/* Camera.swift in Sources */").count(), 2, "build file record and phase member");
    assert_eq!(text.matches("/* Camera.swift */").count(), 3, "file record, group child, build file ref");

    let check = run(pbxedit().arg("check").arg(&descriptor));
    assert!(check.status.success(), "check failed: {}", stdout(&check));
}

#[test]
fn add_twice_leaves_file_unchanged() {
    let (_dir, descriptor) = scratch_project();
    let first = run(pbxedit().arg("add").arg(&descriptor).arg("Camera.swift"));
    assert!(first.status.success(), "stderr: {}", stderr(&first));
    let once = read(&descriptor);

    let second = run(pbxedit().arg("add").arg(&descriptor).arg("Camera.swift"));
    assert!(second.status.success(), "stderr: {}", stderr(&second));
    assert!(stdout(&second).contains("= Camera.swift (already present)"));
    assert_eq!(read(&descriptor), once);
}

#[test]
fn add_accepts_the_bundle_directory() {
    let (_dir, descriptor) = scratch_project();
    let bundle = descriptor.parent().unwrap();
    let out = run(pbxedit().arg("add").arg(bundle).arg("Lens.swift"));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(read(&descriptor).contains("path = Lens.swift;"));
}

#[test]
fn project_from_environment() {
    let (_dir, descriptor) = scratch_project();
    let out = run(pbxedit().env("PBXEDIT_PROJECT", &descriptor).arg("check"));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).starts_with("ok: "));
}

#[test]
fn add_into_nested_group() {
    let (_dir, descriptor) = scratch_project();
    let out = run(pbxedit()
        .args(["add", "--group", "Core/Camera"])
        .arg(&descriptor)
        .arg("Lens.swift"));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = read(&descriptor);
    assert!(text.contains("\t\t\tpath = Core;\n"), "got:\n{text}");
    assert!(text.contains("\t\t\tpath = Camera;\n"), "got:\n{text}");
}

#[test]
fn dry_run_does_not_write() {
    let (_dir, descriptor) = scratch_project();
    let out = run(pbxedit().args(["add", "--dry-run"]).arg(&descriptor).arg("Camera.swift"));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("1 added"));
    assert_eq!(read(&descriptor), FIXTURE);
}

#[test]
fn stdout_prints_descriptor_and_keeps_file() {
    let (_dir, descriptor) = scratch_project();
    let out = run(pbxedit().args(["add", "--stdout"]).arg(&descriptor).arg("Camera.swift"));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).starts_with("// !$*UTF8*$!\n"));
    assert!(stdout(&out).contains("Camera.swift in Sources"));
    assert!(stderr(&out).contains("1 added"), "report belongs on stderr: {}", stderr(&out));
    assert_eq!(read(&descriptor), FIXTURE);
}

#[test]
fn add_from_plan_with_json_report() {
    let (dir, descriptor) = scratch_project();
    let plan = dir.path().join("plan.json");
    fs::write(
        &plan,
        r#"{"files": [
            {"path": "Shaders/Blur.metal", "group": "Shaders"},
            {"path": "AppDelegate.swift"}
        ]}"#,
    )
    .unwrap();
    let out = run(pbxedit().args(["--json", "add"]).arg(&descriptor).arg("--plan").arg(&plan));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let report: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("JSON report");
    assert_eq!(report["added"][0]["path"], "Shaders/Blur.metal");
    assert_eq!(report["added"][0]["bucket"], "compile-sources");
    assert_eq!(report["already_present"][0], "AppDelegate.swift");
}

#[test]
fn add_from_scan() {
    let (dir, descriptor) = scratch_project();
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("Core")).unwrap();
    fs::write(src.join("Core/Camera.swift"), "").unwrap();
    fs::write(src.join("Notes.txt"), "").unwrap();
    let out = run(pbxedit().arg("add").arg(&descriptor).arg("--scan").arg(&src));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = read(&descriptor);
    assert!(text.contains("\t\t\tpath = Core;\n"), "got:\n{text}");
    assert!(text.contains("path = Camera.swift;"), "got:\n{text}");
    assert!(!text.contains("Core/Camera.swift"), "got:\n{text}");
    assert!(!text.contains("Notes.txt"));
}

#[test]
fn scan_finds_files_added_by_hand() {
    let (dir, descriptor) = scratch_project();
    let first = run(pbxedit()
        .args(["add", "--group", "Core"])
        .arg(&descriptor)
        .arg("Camera.swift"));
    assert!(first.status.success(), "stderr: {}", stderr(&first));
    let once = read(&descriptor);

    let src = dir.path().join("src");
    fs::create_dir_all(src.join("Core")).unwrap();
    fs::write(src.join("Core/Camera.swift"), "").unwrap();
    let out = run(pbxedit().arg("add").arg(&descriptor).arg("--scan").arg(&src));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("= Camera.swift (already present)"), "stdout: {}", stdout(&out));
    assert_eq!(read(&descriptor), once);

    let missing = run(pbxedit().arg("missing").arg(&descriptor).arg("--scan").arg(&src));
    assert!(missing.status.success(), "stdout: {}", stdout(&missing));
}

#[test]
fn missing_phase_fails_but_keeps_other_requests() {
    let (_dir, descriptor) = scratch_project();
    let out = run(pbxedit()
        .args(["add", "--bucket", "resources"])
        .arg(&descriptor)
        .arg("Logo.png"));
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("error[PBX-E006]"), "stderr: {}", stderr(&out));
    assert_eq!(read(&descriptor), FIXTURE);
}

#[test]
fn unknown_target_is_reported() {
    let (_dir, descriptor) = scratch_project();
    let out = run(pbxedit()
        .args(["add", "--target", "Widget"])
        .arg(&descriptor)
        .arg("A.swift"));
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("PBX-E008"), "stderr: {}", stderr(&out));
}

#[test]
fn malformed_descriptor_is_left_alone() {
    let (_dir, descriptor) = scratch_project();
    let broken = FIXTURE.replace("/* End PBXGroup section */\n", "");
    fs::write(&descriptor, &broken).unwrap();
    let out = run(pbxedit().arg("add").arg(&descriptor).arg("A.swift"));
    assert_eq!(out.status.code(), Some(2));
    let err = stderr(&out);
    assert!(err.contains("error[PBX-F001]"), "stderr: {err}");
    assert!(err.contains("-->"), "expected a source snippet: {err}");
    assert_eq!(read(&descriptor), broken);
}

#[test]
fn json_diagnostics_on_stderr() {
    let (_dir, descriptor) = scratch_project();
    let broken = FIXTURE.replace("/* End PBXGroup section */\n", "");
    fs::write(&descriptor, &broken).unwrap();
    let out = run(pbxedit().args(["--json", "check"]).arg(&descriptor));
    assert_eq!(out.status.code(), Some(2));
    let line = stderr(&out);
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("JSON diagnostic");
    assert_eq!(v["code"], "PBX-F001");
}

// --- framework ---

#[test]
fn framework_links_system_framework() {
    let (_dir, descriptor) = scratch_project();
    let out = run(pbxedit().arg("framework").arg(&descriptor).arg("Metal"));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = read(&descriptor);
    assert!(text.contains("path = System/Library/Frameworks/Metal.framework; sourceTree = SDKROOT;"));
    assert!(text.contains("/* Metal.framework in Frameworks */"));

    let again = run(pbxedit().arg("framework").arg(&descriptor).arg("Metal.framework"));
    assert!(again.status.success());
    assert!(stdout(&again).contains("already present"));
}

// --- check ---

#[test]
fn check_reports_dangling_reference() {
    let (_dir, descriptor) = scratch_project();
    let broken = FIXTURE.replace(
        "fileRef = F00000000000000000000001",
        "fileRef = F00000000000000000000009",
    );
    fs::write(&descriptor, broken).unwrap();
    let out = run(pbxedit().arg("check").arg(&descriptor));
    assert_eq!(out.status.code(), Some(1));
    let text = stdout(&out);
    assert!(text.contains("error[PBX-V001]"), "got: {text}");
    assert!(text.contains("1 problem(s) found"), "got: {text}");
}

// --- missing ---

#[test]
fn missing_lists_unreferenced_files() {
    let (dir, descriptor) = scratch_project();
    let src = dir.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("AppDelegate.swift"), "").unwrap();
    fs::write(src.join("Camera.swift"), "").unwrap();
    let out = run(pbxedit().arg("missing").arg(&descriptor).arg("--scan").arg(&src));
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(stdout(&out), "Camera.swift\n");
}

// --- explain ---

#[test]
fn explain_known_code() {
    let out = run(pbxedit().args(["explain", "PBX-E003"]));
    assert!(out.status.success());
    assert!(stdout(&out).starts_with("## PBX-E003"));
}

#[test]
fn explain_unknown_code() {
    let out = run(pbxedit().args(["explain", "PBX-Z999"]));
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("unknown code"));
}

#[test]
fn explain_list() {
    let out = run(pbxedit().args(["explain", "--list"]));
    assert!(out.status.success());
    assert!(stdout(&out).lines().any(|l| l.starts_with("PBX-F001")));
}
