use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;

use crate::common::TestContext;

mod common;

#[test]
fn session_statement_picks_highest_installed_patch() {
    let context = TestContext::new();
    for version in ["1.24.0", "1.25.1", "1.25.4"] {
        context.seed_install(version);
    }

    let expected = format!(
        "export PATH=\"{}/versions/go1.25.4/bin:$PATH\"\n",
        context.home().display()
    );
    context
        .use_version()
        .arg("1.25")
        .arg("--shell")
        .arg("bash")
        .assert()
        .success()
        .stdout(expected);
}

#[test]
fn session_statement_renders_the_requested_dialect() {
    let context = TestContext::new();
    context.seed_install("1.25.4");

    let expected = format!(
        "set -gx PATH \"{}/versions/go1.25.4/bin\" $PATH\n",
        context.home().display()
    );
    context
        .use_version()
        .arg("1.25.4")
        .arg("--shell")
        .arg("fish")
        .assert()
        .success()
        .stdout(expected);
}

#[test]
fn unknown_version_fails_with_exit_3_and_empty_stdout() {
    let context = TestContext::new();
    context.seed_install("1.24.0");

    context
        .use_version()
        .arg("1.26")
        .arg("--shell")
        .arg("bash")
        .assert()
        .failure()
        .code(3)
        .stdout("")
        .stderr(predicate::str::contains("no installed version matches `1.26`"));
}

#[test]
fn local_scope_writes_the_original_partial_form() {
    let context = TestContext::new();
    for version in ["1.25.1", "1.25.4"] {
        context.seed_install(version);
    }

    context
        .use_version()
        .arg("1.25")
        .arg("--local")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pinned 1.25"));

    let pin = fs_err::read_to_string(context.workdir().path().join(".govman-goversion")).unwrap();
    assert_eq!(pin, "1.25\n");
}

#[test]
fn missing_shell_is_an_error() {
    let context = TestContext::new();
    context.seed_install("1.25.4");

    // SHELL is scrubbed from the environment by the test context.
    #[cfg(unix)]
    context
        .use_version()
        .arg("1.25.4")
        .assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("could not detect the current shell"));
}

#[cfg(unix)]
#[test]
fn default_scope_persists_config_and_symlink() {
    let context = TestContext::new();
    context.seed_install("1.25.1");

    context
        .use_version()
        .arg("1.25.1")
        .arg("--default")
        .assert()
        .success()
        .stdout(predicate::str::contains("Now using go1.25.1 (default)"));

    let config = fs_err::read_to_string(context.home().join("config.yaml")).unwrap();
    assert!(config.contains("default_version: 1.25.1"), "{config}");

    let link = context.home().join("bin").join("go");
    let target = fs_err::read_link(&link).unwrap();
    assert!(target.to_string_lossy().contains("go1.25.1"));

    context
        .current()
        .assert()
        .success()
        .stdout("go1.25.1 (default)\n");
}

#[cfg(unix)]
#[test]
fn use_default_twice_repoints_atomically() {
    let context = TestContext::new();
    context.seed_install("1.24.0");
    context.seed_install("1.25.1");

    context
        .use_version()
        .arg("1.24.0")
        .arg("--default")
        .assert()
        .success();
    context
        .use_version()
        .arg("1.25.1")
        .arg("--default")
        .assert()
        .success();

    let target = fs_err::read_link(context.home().join("bin").join("go")).unwrap();
    assert!(target.to_string_lossy().contains("go1.25.1"));
}
