//! Integration tests for the erbdoc binary

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::cargo_bin;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn erbdoc(dir: &TempDir) -> Command {
    let mut cmd = Command::new(cargo_bin!(env!("CARGO_PKG_NAME")));
    cmd.current_dir(dir.path());
    cmd
}

#[test]
fn test_renders_default_paths_without_arguments() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(".README.erb"), "Version: <%= 1+1 %>").unwrap();

    erbdoc(&temp).assert().success().stdout(predicate::str::is_empty());

    assert_eq!(
        fs::read_to_string(temp.path().join("README.md")).unwrap(),
        "Version: 2"
    );
}

#[test]
fn test_plain_template_copied_verbatim() {
    let temp = TempDir::new().unwrap();
    let template = "# Project\n\nNo code here, just 50% text.\n";
    fs::write(temp.path().join(".README.erb"), template).unwrap();

    erbdoc(&temp).assert().success();
    erbdoc(&temp).assert().success();

    assert_eq!(
        fs::read_to_string(temp.path().join("README.md")).unwrap(),
        template
    );
}

#[test]
fn test_missing_template_fails_without_output() {
    let temp = TempDir::new().unwrap();

    erbdoc(&temp)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error: File not found"))
        .stderr(predicate::str::contains(".README.erb"));

    assert!(!temp.path().join("README.md").exists());
}

#[test]
fn test_evaluation_error_keeps_previous_output() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(".README.erb"), "ok\n<%= 1 / 0 %>\n").unwrap();
    fs::write(temp.path().join("README.md"), "previous").unwrap();

    erbdoc(&temp)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Evaluation error on line 2: divided by 0"));

    assert_eq!(
        fs::read_to_string(temp.path().join("README.md")).unwrap(),
        "previous"
    );
}

#[test]
fn test_syntax_error_reports_line() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(".README.erb"), "a\n<% if true %>\nno end\n").unwrap();

    erbdoc(&temp)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Syntax error"));

    assert!(!temp.path().join("README.md").exists());
}

#[test]
fn test_template_reads_project_files() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("VERSION"), "3.1.4\n").unwrap();
    fs::write(
        temp.path().join("features.yml"),
        "- fast\n- small\n",
    )
    .unwrap();
    fs::write(
        temp.path().join(".README.erb"),
        "v<%= File.read(\"VERSION\").strip %>\n<% YAML.load_file(\"features.yml\").each do |f| -%>\n* <%= f %>\n<% end -%>\n",
    )
    .unwrap();

    erbdoc(&temp).assert().success();

    assert_eq!(
        fs::read_to_string(temp.path().join("README.md")).unwrap(),
        "v3.1.4\n* fast\n* small\n"
    );
}

#[test]
fn test_template_cannot_escape_base_dir() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("project");
    fs::create_dir(&project).unwrap();
    fs::write(temp.path().join("secret.txt"), "hidden").unwrap();
    fs::write(project.join(".README.erb"), "<%= File.read(\"../secret.txt\") %>").unwrap();

    Command::new(cargo_bin!(env!("CARGO_PKG_NAME")))
        .current_dir(&project)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path traversal"));

    assert!(!project.join("README.md").exists());
}

#[test]
fn test_check_mode() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(".README.erb"), "n=<%= 6 * 7 %>\n").unwrap();

    erbdoc(&temp)
        .arg("--check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of date"));
    assert!(!temp.path().join("README.md").exists());

    erbdoc(&temp).assert().success();
    erbdoc(&temp).arg("--check").assert().success();

    fs::write(temp.path().join("README.md"), "n=0\n").unwrap();
    erbdoc(&temp).arg("--check").assert().failure();
    assert_eq!(
        fs::read_to_string(temp.path().join("README.md")).unwrap(),
        "n=0\n"
    );
}

#[test]
fn test_custom_paths_and_stdout() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("docs")).unwrap();
    fs::write(temp.path().join("docs/intro.erb"), "<%= [1, 2, 3].sum %>").unwrap();

    erbdoc(&temp)
        .args(["-t", "docs/intro.erb", "-o", "-"])
        .assert()
        .success()
        .stdout("6");

    erbdoc(&temp)
        .args(["--template", "docs/intro.erb", "--output", "docs/intro.md"])
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(temp.path().join("docs/intro.md")).unwrap(),
        "6"
    );
}

#[test]
fn test_template_from_stdin() {
    let temp = TempDir::new().unwrap();

    assert_cmd::Command::new(cargo_bin!(env!("CARGO_PKG_NAME")))
        .current_dir(temp.path())
        .args(["--template", "-", "--output", "-"])
        .write_stdin("Version: <%= 1+1 %>\n")
        .assert()
        .success()
        .stdout("Version: 2\n");
}

#[test]
fn test_trim_mode_flag() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join(".README.erb"),
        "<% if true %>\nyes\n<% end %>\n",
    )
    .unwrap();

    erbdoc(&temp)
        .args(["--trim-mode", "none", "-o", "-"])
        .assert()
        .success()
        .stdout("\nyes\n\n");

    erbdoc(&temp)
        .args(["--trim-mode", "gt", "-o", "-"])
        .assert()
        .success()
        .stdout("yes\n");

    erbdoc(&temp)
        .args(["--trim-mode", "sideways"])
        .assert()
        .failure();
}

#[test]
fn test_list_tags() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join(".README.erb"),
        "Title\n<%# generated %>\n<%= name %>\n",
    )
    .unwrap();

    erbdoc(&temp)
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("2: <%# generated %>"))
        .stdout(predicate::str::contains("3: <%= name %>"));

    let output = erbdoc(&temp).arg("--list=json").output().unwrap();
    assert!(output.status.success());
    let tags: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(tags.as_array().unwrap().len(), 2);
    assert_eq!(tags[0]["kind"], "comment");
    assert_eq!(tags[1]["kind"], "output");
    assert_eq!(tags[1]["line"], 3);

    // Listing never renders, so the undefined `name` is not an error
    assert!(!temp.path().join("README.md").exists());
}

#[test]
fn test_verbose_logging_goes_to_stderr() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(".README.erb"), "x").unwrap();

    erbdoc(&temp)
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("rendered"));
}

#[test]
fn test_repository_readme_is_current() {
    Command::new(cargo_bin!(env!("CARGO_PKG_NAME")))
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .arg("--check")
        .assert()
        .success();
}
