use assert_cmd::assert::OutputAssertExt;

use crate::common::{cmd_snapshot, TestContext};

mod common;

#[test]
fn empty_store_suggests_an_install() {
    let context = TestContext::new();

    cmd_snapshot!(context.filters(), context.list(), @r#"
    success: true
    exit_code: 0
    ----- stdout -----
    No Go versions installed. Run `govman install latest` to get started.

    ----- stderr -----
    "#);
}

#[test]
fn installed_versions_are_listed_newest_first() {
    let context = TestContext::new();
    for version in ["1.24.0", "1.25.4", "1.25.1", "1.24rc1"] {
        context.seed_install(version);
    }

    context
        .list()
        .assert()
        .success()
        .stdout("go1.25.4\ngo1.25.1\ngo1.24.0\ngo1.24rc1\n");
}

#[test]
fn incomplete_installations_are_ignored() {
    let context = TestContext::new();
    context.seed_install("1.25.1");
    // A bare directory without bin/go is a failed install.
    fs_err::create_dir_all(context.home().join("versions").join("go1.30.0")).unwrap();

    context.list().assert().success().stdout("go1.25.1\n");
}
