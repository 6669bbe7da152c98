use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// `esorex` running in `dir`, with `dir` as home and no EsoRex variables
/// inherited from the calling environment
fn esorex_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("esorex").unwrap();
    for (var, _) in std::env::vars() {
        if var.starts_with("ESOREX_") {
            cmd.env_remove(var);
        }
    }
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("ESOREX_SYSCONFDIR", dir.path().join("etc"));
    cmd
}

// ============================================================================
// Version and help output
// ============================================================================

#[test]
fn test_version_flag() {
    let dir = TempDir::new().unwrap();
    esorex_cmd(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("***** EsoRex, version"))
        .stdout(predicate::str::contains("Libraries used: esorex_core"))
        .stdout(predicate::str::contains("Report bugs to"));
}

/// Output text with every run of whitespace collapsed to one blank, so
/// that checks do not depend on where help texts were wrapped
fn unwrapped(output: &[u8]) -> String {
    String::from_utf8_lossy(output).split_whitespace().collect::<Vec<_>>().join(" ")
}

#[test]
fn test_help_flag() {
    let dir = TempDir::new().unwrap();
    let assert = esorex_cmd(&dir).arg("--help").assert().success();
    let text = unwrapped(&assert.get_output().stdout);
    assert!(text.contains("Usage: esorex [esorex-options] recipe [recipe-options] sof"));
    assert!(text.contains("--output-dir"));
    assert!(text.contains("ESOREX_PLUGIN_DIR"));
    assert!(text.contains("<debug | info | warning | error | off>"), "{text}");
}

#[test]
fn test_no_arguments_lists_libraries() {
    let dir = TempDir::new().unwrap();
    esorex_cmd(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("\nLibraries used: esorex_core"));
}

#[test]
fn test_params_listing() {
    let dir = TempDir::new().unwrap();
    esorex_cmd(&dir)
        .args(["--params", "--output-prefix=night"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Caller Parameters :"))
        .stdout(predicate::str::contains("night"));
}

// ============================================================================
// Recipe discovery
// ============================================================================

#[test]
fn test_recipes_in_empty_directory() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("recipes")).unwrap();
    esorex_cmd(&dir)
        .args(["--recipes", "--recipe-dir=recipes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("List of Available Recipes"))
        .stdout(predicate::str::contains("No recipes were found"));
}

#[test]
fn test_unknown_recipe_fails() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("recipes")).unwrap();
    esorex_cmd(&dir)
        .args(["--recipe-dir=recipes", "no_such_recipe"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("no_such_recipe"));
}

#[test]
fn test_missing_recipe_dir_warns() {
    let dir = TempDir::new().unwrap();
    esorex_cmd(&dir)
        .args(["--recipes", "--recipe-dir=/nonexistent/a"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Only non-existent directory"));
}

// ============================================================================
// Option validation
// ============================================================================

#[test]
fn test_unknown_option_fails() {
    let dir = TempDir::new().unwrap();
    esorex_cmd(&dir)
        .arg("--bogus-option")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("bogus-option"));
}

#[test]
fn test_bad_output_dir() {
    let dir = TempDir::new().unwrap();
    esorex_cmd(&dir)
        .args(["--output-dir=/nonexistent/out", "some_recipe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("'--output-dir' [/nonexistent/out] is not a valid directory"));
}

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    esorex_cmd(&dir)
        .arg("--config=missing.rc")
        .assert()
        .failure()
        .stderr(predicate::str::contains("the file 'missing.rc' could not be found"));
}

#[test]
fn test_environment_and_command_line_precedence() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("recipes")).unwrap();

    esorex_cmd(&dir)
        .env("ESOREX_OUTPUT_DIR", "/nonexistent/env")
        .args(["--recipe-dir=recipes", "some_recipe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/env"));

    // The command line wins, so the run gets as far as the recipe lookup
    esorex_cmd(&dir)
        .env("ESOREX_OUTPUT_DIR", "/nonexistent/env")
        .args(["--output-dir=.", "--recipe-dir=recipes", "some_recipe"])
        .assert()
        .code(3);
}

#[test]
fn test_local_config_file_is_read() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("local.rc"), "esorex.caller.output-prefix=fromfile\n").unwrap();
    esorex_cmd(&dir)
        .args(["--config=local.rc", "--params"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fromfile"));
}

// ============================================================================
// Configuration file creation
// ============================================================================

#[test]
fn test_create_config_in_home() {
    let dir = TempDir::new().unwrap();
    esorex_cmd(&dir)
        .args(["--create-config", "--output-prefix=night"])
        .assert()
        .success();

    let rc = dir.path().join(".esorex").join("esorex.rc");
    let text = fs::read_to_string(&rc).unwrap();
    assert!(text.contains("esorex.caller.output-prefix=\"night\""));
    assert!(text.contains("# End of file"));

    // A second run keeps the first file as backup
    esorex_cmd(&dir).arg("--create-config=TRUE").assert().success();
    assert!(dir.path().join(".esorex").join("esorex.rc.bak").is_file());
}

#[test]
fn test_create_config_json() {
    let dir = TempDir::new().unwrap();
    esorex_cmd(&dir)
        .arg("--create-config=caller.json")
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("caller.json")).unwrap()).unwrap();
    let text = json.to_string();
    assert!(text.contains("esorex.caller.output-dir"));
}

#[test]
fn test_global_config_from_home() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join(".esorex")).unwrap();
    fs::write(
        dir.path().join(".esorex").join("esorex.rc"),
        "esorex.caller.output-prefix=global\n",
    )
    .unwrap();
    esorex_cmd(&dir)
        .arg("--params")
        .assert()
        .success()
        .stdout(predicate::str::contains("global"));
}
