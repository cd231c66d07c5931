// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs the compiled `bbgen` binary against small configurations on disk.

use bbgen_metadata::BbgenExitCode;
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use camino_tempfile_ext::prelude::*;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::process::{Command, Output};

const WATERFALLS: &str = indoc! {r#"
    [
      {
        'name': 'chromium.linux',
        'machines': {
          'Linux Tests': {
            'os_type': 'linux',
            'swarming': {
              'dimensions': {
                'os': 'Ubuntu-22.04',
              },
            },
            'test_suites': {
              'gtest_tests': 'linux_gtests',
            },
          },
        },
      },
    ]
"#};

const TEST_SUITES: &str = indoc! {r#"
    {
      'basic_suites': {
        'linux_gtests': {
          'base_unittests': {},
        },
      },
    }
"#};

const MILO_CONFIG: &str = indoc! {r#"
    consoles {
      builders {
        name: "buildbucket/luci.chromium.ci/Linux Tests"
      }
    }
"#};

struct TempConfig {
    dir: Utf8TempDir,
}

impl TempConfig {
    fn new() -> Self {
        let config = Self {
            dir: Utf8TempDir::new().expect("created temp dir"),
        };
        config.write("waterfalls.pyl", WATERFALLS);
        config.write("test_suites.pyl", TEST_SUITES);
        for name in [
            "test_suite_exceptions.pyl",
            "mixins.pyl",
            "gn_isolate_map.pyl",
            "variants.pyl",
        ] {
            config.write(name, "{}");
        }
        config
            .dir
            .child("infra/config/generated/luci/luci-milo.cfg")
            .write_str(MILO_CONFIG)
            .expect("wrote milo config");
        config
    }

    fn pyl_dir(&self) -> Utf8PathBuf {
        self.dir.path().join("testing/buildbot")
    }

    fn write(&self, name: &str, contents: &str) {
        self.dir
            .child(format!("testing/buildbot/{name}"))
            .write_str(contents)
            .expect("wrote input file");
    }

    fn read_output(&self, name: &str) -> String {
        std::fs::read_to_string(self.pyl_dir().join(name)).expect("read generated file")
    }

    fn run(&self, args: &[&str]) -> Output {
        let infra_dir = self.dir.path().join("infra/config");
        Command::new(env!("CARGO_BIN_EXE_bbgen"))
            .arg("--pyl-files-dir")
            .arg(self.pyl_dir())
            .arg("--infra-config-dir")
            .arg(infra_dir)
            .args(args)
            .env("BBGEN_COLOR", "never")
            .env_remove("BBGEN_LOG")
            .env_remove("BBGEN_OUTPUT_DIR")
            .env_remove("BBGEN_TOOL_CONFIG")
            .output()
            .expect("ran bbgen")
    }
}

#[track_caller]
fn assert_exit_code(output: &Output, expected: i32) {
    assert_eq!(
        output.status.code(),
        Some(expected),
        "unexpected exit code; stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn generate_then_check() {
    let config = TempConfig::new();

    let output = config.run(&[]);
    assert_exit_code(&output, BbgenExitCode::OK);
    insta::assert_snapshot!(config.read_output("chromium.linux.json"), @r#"
    {
      "AAAAA1 AUTOGENERATED FILE DO NOT EDIT": {},
      "AAAAA2 See generate_buildbot_json.py to make changes": {},
      "Linux Tests": {
        "gtest_tests": [
          {
            "merge": {
              "script": "//testing/merge_scripts/standard_gtest_merge.py"
            },
            "name": "base_unittests",
            "swarming": {
              "dimensions": {
                "os": "Ubuntu-22.04"
              }
            },
            "test": "base_unittests"
          }
        ]
      }
    }
    "#);

    let output = config.run(&["--check"]);
    assert_exit_code(&output, BbgenExitCode::OK);

    // Editing a suite makes the checked-in file stale.
    config.write(
        "test_suites.pyl",
        "{'basic_suites': {'linux_gtests': {'base_unittests': {'args': ['--foo']}}}}",
    );
    let output = config.run(&["--check"]);
    assert_exit_code(&output, BbgenExitCode::CHECK_FAILED);
    assert!(
        stderr(&output).contains("chromium.linux.json"),
        "stale file is named: {}",
        stderr(&output)
    );

    let output = config.run(&["--check", "--verbose"]);
    assert_exit_code(&output, BbgenExitCode::CHECK_FAILED);
    assert!(
        stderr(&output).contains("+++ current"),
        "diff is printed: {}",
        stderr(&output)
    );
}

#[test]
fn new_files_leave_originals_alone() {
    let config = TempConfig::new();
    let output = config.run(&["--new-files"]);
    assert_exit_code(&output, BbgenExitCode::OK);
    assert!(config.pyl_dir().join("chromium.linux.new.json").exists());
    assert!(!config.pyl_dir().join("chromium.linux.json").exists());
}

#[test]
fn output_dir_is_honored() {
    let config = TempConfig::new();
    // Missing output directories are created.
    let out_dir = config.dir.path().join("out/gen");

    let output = config.run(&["--output-dir", out_dir.as_str()]);
    assert_exit_code(&output, BbgenExitCode::OK);
    assert!(out_dir.join("chromium.linux.json").exists());

    let output = config.run(&["--check", "--output-dir", out_dir.as_str()]);
    assert_exit_code(&output, BbgenExitCode::OK);
}

#[test]
fn queries() {
    let config = TempConfig::new();

    let output = config.run(&["--query", "test/base_unittests/bots"]);
    assert_exit_code(&output, BbgenExitCode::OK);
    let bots: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(bots, serde_json::json!(["Linux Tests"]));

    let json_path = config.dir.path().join("tests.json");
    let output = config.run(&["--query", "tests", "--json", json_path.as_str()]);
    assert_exit_code(&output, BbgenExitCode::OK);
    assert!(output.stdout.is_empty(), "result goes to the file");
    let tests: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&json_path).expect("read query output"),
    )
    .expect("valid JSON");
    assert_eq!(
        tests,
        serde_json::json!({"base_unittests": {"name": "base_unittests"}})
    );
}

#[test]
fn exit_codes() {
    let config = TempConfig::new();

    let output = config.run(&["--query", "frobnicate"]);
    assert_exit_code(&output, BbgenExitCode::QUERY_FAILED);

    let output = config.run(&["--query", "bot/Nonexistent"]);
    assert_exit_code(&output, BbgenExitCode::QUERY_FAILED);
    assert!(stderr(&output).contains("No bot named 'Nonexistent' found."));

    config.write(
        "test_suites.pyl",
        "{'basic_suites': {'linux_gtests': {'base_unittests': {'mixins': ['nope']}}}}",
    );
    let output = config.run(&[]);
    assert_exit_code(&output, BbgenExitCode::INVALID_CONFIG);

    config.write("test_suites.pyl", "{'basic_suites': {");
    let output = config.run(&[]);
    assert_exit_code(&output, BbgenExitCode::SETUP_ERROR);
    assert!(stderr(&output).contains("test_suites.pyl"));

    let output = run_in(config.dir.path().join("nowhere").as_path(), &[]);
    assert_exit_code(&output, BbgenExitCode::SETUP_ERROR);
}

#[test]
fn unknown_bots_fail_the_check() {
    let config = TempConfig::new();
    config
        .dir
        .child("infra/config/generated/luci/luci-milo.cfg")
        .write_str("consoles {}\n")
        .expect("wrote milo config");

    let output = config.run(&[]);
    assert_exit_code(&output, BbgenExitCode::OK);

    let output = config.run(&["--check"]);
    assert_exit_code(&output, BbgenExitCode::CHECK_FAILED);
    assert!(
        stderr(&output).contains(r#"Unknown bot name "Linux Tests" on waterfall "chromium.linux""#)
    );

    // Projects may opt out of builder validation.
    config
        .dir
        .child("infra/config/generated/project.pyl")
        .write_str("{'validate_source_side_specs_have_builder': False}")
        .expect("wrote project.pyl");
    let output = config.run(&["--check"]);
    assert_exit_code(&output, BbgenExitCode::OK);
}

fn run_in(pyl_dir: &Utf8Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bbgen"))
        .arg("--pyl-files-dir")
        .arg(pyl_dir)
        .args(args)
        .env("BBGEN_COLOR", "never")
        .output()
        .expect("ran bbgen")
}
