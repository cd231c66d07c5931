// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{TEST_SUITES, TempCheckout, settings};
use bbgen_runner::{check::ConsistencyChecker, errors::CheckError, generate::Generator};
use pretty_assertions::assert_eq;

#[test]
fn generated_files_pass_the_check() {
    let checkout = TempCheckout::new();
    let config = checkout.load();
    let settings = settings();
    let checker = ConsistencyChecker::new(&config, &checkout.paths, &settings);

    checker.check_input().expect("inputs are consistent");
    let err = checker
        .check_output(&checkout.output_dir(), false)
        .expect_err("nothing generated yet");
    let CheckError::StaleFiles { files } = err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(files, ["chromium.linux.json", "chromium.mac.json"]);

    Generator::new(&config)
        .and_then(|generator| generator.generate_outputs(&[]))
        .expect("generation succeeds")
        .write(&checkout.output_dir(), &settings.output_suffix(false))
        .expect("wrote outputs");
    checker
        .check_consistency(&checkout.output_dir(), true)
        .expect("everything is up to date");
}

#[test]
fn edits_make_outputs_stale() {
    let checkout = TempCheckout::new();
    let settings = settings();
    {
        let config = checkout.load();
        Generator::new(&config)
            .and_then(|generator| generator.generate_outputs(&[]))
            .expect("generation succeeds")
            .write(&checkout.output_dir(), &settings.output_suffix(false))
            .expect("wrote outputs");
    }

    // Only the Linux builders run url_unittests.
    checkout.write_pyl(
        "test_suites.pyl",
        &TEST_SUITES.replace("'--verbose'", "'--quiet'"),
    );
    let config = checkout.load();
    let err = ConsistencyChecker::new(&config, &checkout.paths, &settings)
        .check_consistency(&checkout.output_dir(), true)
        .expect_err("linux output is stale");
    let CheckError::StaleFiles { files } = err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(files, ["chromium.linux.json"]);
}

#[test]
fn unreferenced_definitions() {
    let checkout = TempCheckout::new();
    let settings = settings();

    checkout.write_pyl(
        "test_suites.pyl",
        &TEST_SUITES.replace(
            "'basic_suites': {",
            "'basic_suites': {\n    'orphan_gtests': {'orphan_unittests': {}},",
        ),
    );
    let config = checkout.load();
    let err = ConsistencyChecker::new(&config, &checkout.paths, &settings)
        .check_input()
        .expect_err("orphan suite");
    assert_eq!(
        err.to_string(),
        "The following test suites were unreferenced by bots on the waterfalls: orphan_gtests"
    );

    checkout.write_pyl("test_suites.pyl", TEST_SUITES);
    checkout.write_pyl(
        "variants.pyl",
        "{'DAWN_VULKAN': {'identifier': 'vulkan', 'mixins': ['gpu_nvidia']}, \
         'DISABLED_VARIANT': {'identifier': 'disabled', 'enabled': False}, \
         'UNUSED': {'identifier': 'unused'}}",
    );
    let config = checkout.load();
    let err = ConsistencyChecker::new(&config, &checkout.paths, &settings)
        .check_input()
        .expect_err("unused variant");
    assert!(
        matches!(&err, CheckError::UnreferencedVariants { variants } if variants.iter().eq(["UNUSED"])),
        "unexpected error: {err:?}"
    );
}
