//! Integration tests for the bingen binary.
//!
//! Builds go through a fake `go` executable so the real command lines the
//! Go toolchain receives are exercised without a Go installation.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn bingen(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("bingen").unwrap();
    cmd.current_dir(project)
        .env_remove("RUST_LOG")
        .env_remove("BINGEN_MANIFEST")
        .env_remove("BINGEN_CACHE_DIR")
        .env_remove("BINGEN_JOBS")
        .env_remove("BINGEN_GO")
        .env_remove("BINGEN_LOG_FORMAT");
    cmd
}

/// A stand-in for `go` that answers `go env`, and whose `build`/`install`
/// write shell scripts exiting 5 (build) or 6 (install).
#[cfg(unix)]
fn fake_go(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-go");
    std::fs::write(
        &path,
        r#"#!/bin/sh
case "$1" in
  env)
    printf 'go1.22.0\nlinux\namd64\n'
    ;;
  build)
    case "$4" in
      *broken*) echo "$4: cannot find package" >&2; exit 1 ;;
    esac
    printf '#!/bin/sh\necho "built $*"\nexit 5\n' > "$3"
    chmod +x "$3"
    ;;
  install)
    pkg="${2%@*}"
    out="$GOBIN/$(basename "$pkg")"
    printf '#!/bin/sh\nexit 6\n' > "$out"
    chmod +x "$out"
    ;;
  *)
    exit 2
    ;;
esac
"#,
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn version_prints_name_and_version() {
    let project = TempDir::new().unwrap();
    bingen(project.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(format!("bingen {}\n", env!("CARGO_PKG_VERSION")));
}

#[test]
fn no_arguments_prints_help() {
    let project = TempDir::new().unwrap();
    bingen(project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("--add"))
        .stdout(predicate::str::contains("--build"));
}

#[test]
fn help_flag_prints_help() {
    let project = TempDir::new().unwrap();
    bingen(project.path())
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn add_writes_the_manifest() {
    let project = TempDir::new().unwrap();
    bingen(project.path())
        .args(["--add", "example.org/tool/a", "example.org/tool/b@v1.0.0"])
        .assert()
        .success();

    let manifest = std::fs::read_to_string(project.path().join("bingen.toml")).unwrap();
    assert!(manifest.contains("import_path = \"example.org/tool/a\""));
    assert!(manifest.contains("version = \"v1.0.0\""));
}

#[test]
fn add_wins_over_version() {
    let project = TempDir::new().unwrap();
    bingen(project.path())
        .args(["--version", "--add", "example.org/tool/a"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert!(project.path().join("bingen.toml").exists());
}

#[test]
fn invalid_import_path_fails_without_writing() {
    let project = TempDir::new().unwrap();
    bingen(project.path())
        .args(["--add", "not a/valid path"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid import path"));
    assert!(!project.path().join("bingen.toml").exists());
}

#[test]
fn unknown_tool_fails() {
    let project = TempDir::new().unwrap();
    bingen(project.path())
        .args(["nope", "--flag"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown tool 'nope'"));
}

#[test]
fn build_with_empty_manifest_succeeds() {
    let project = TempDir::new().unwrap();
    bingen(project.path())
        .args(["--build", "--go", "/nonexistent/go"])
        .assert()
        .success();
}

#[test]
fn corrupt_manifest_is_reported() {
    let project = TempDir::new().unwrap();
    std::fs::write(project.path().join("bingen.toml"), "[[tools]\n").unwrap();
    bingen(project.path())
        .arg("--build")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("corrupt"));
}

#[test]
fn missing_go_is_reported() {
    let project = TempDir::new().unwrap();
    bingen(project.path())
        .args(["--add", "example.org/tool/a"])
        .assert()
        .success();
    bingen(project.path())
        .args(["--build", "--go", "/nonexistent/go"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("/nonexistent/go"));
}

#[cfg(unix)]
#[test]
fn run_mirrors_the_tools_exit_code() {
    let project = TempDir::new().unwrap();
    let go = fake_go(project.path());

    bingen(project.path())
        .args(["--add", "example.org/tool/a", "example.org/other/b@v1.2.3"])
        .assert()
        .success();

    bingen(project.path())
        .arg("--go")
        .arg(&go)
        .args(["a", "--verbose", "x"])
        .assert()
        .code(5)
        .stdout(predicate::str::contains("built --verbose x"));

    bingen(project.path())
        .env("BINGEN_GO", &go)
        .arg("b")
        .assert()
        .code(6);

    assert!(project.path().join(".bingen/bin/a").is_dir());
    assert!(project.path().join(".bingen/bin/b").is_dir());
}

#[cfg(unix)]
#[test]
fn build_reports_every_failure() {
    let project = TempDir::new().unwrap();
    let go = fake_go(project.path());

    bingen(project.path())
        .args([
            "--add",
            "example.org/tool/a",
            "example.org/broken/x",
            "example.org/broken/y",
        ])
        .assert()
        .success();

    bingen(project.path())
        .arg("--go")
        .arg(&go)
        .arg("--build")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("example.org/broken/x"))
        .stderr(predicate::str::contains("example.org/broken/y"))
        .stderr(predicate::str::contains("cannot find package"));

    // The healthy tool was still built
    bingen(project.path())
        .arg("--go")
        .arg(&go)
        .arg("a")
        .assert()
        .code(5);
}

#[cfg(unix)]
#[test]
fn cache_dir_can_be_relocated() {
    let project = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let go = fake_go(project.path());

    bingen(project.path())
        .args(["--add", "example.org/tool/a"])
        .assert()
        .success();
    bingen(project.path())
        .env("BINGEN_GO", &go)
        .env("BINGEN_CACHE_DIR", cache.path())
        .arg("--build")
        .assert()
        .success();

    assert!(cache.path().join("a").is_dir());
    assert!(!project.path().join(".bingen/bin/a").exists());
}

#[cfg(unix)]
#[test]
fn tool_that_cannot_start_fails_with_exit_code_one() {
    let project = TempDir::new().unwrap();
    let go = fake_go(project.path());

    bingen(project.path())
        .args(["--add", "example.org/tool/a"])
        .assert()
        .success();
    bingen(project.path())
        .env("BINGEN_GO", &go)
        .arg("a")
        .assert()
        .code(5);

    let entry = std::fs::read_dir(project.path().join(".bingen/bin/a"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.is_dir())
        .unwrap();
    std::fs::write(entry.join("a"), "#!/nonexistent/interpreter\n").unwrap();

    bingen(project.path())
        .env("BINGEN_GO", &go)
        .arg("a")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to execute"));
}

#[cfg(unix)]
#[test]
fn pinned_tool_with_plus_in_its_name_runs() {
    let project = TempDir::new().unwrap();
    let go = fake_go(project.path());

    bingen(project.path())
        .args(["--add", "example.org/tool/c++filt@v1.0.0"])
        .assert()
        .success();
    bingen(project.path())
        .env("BINGEN_GO", &go)
        .arg("c++filt")
        .assert()
        .code(6);
    assert!(project.path().join(".bingen/bin/c++filt").is_dir());
}
