// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{TempCheckout, settings};
use bbgen_metadata::{TestSpec, WaterfallSpec};
use bbgen_runner::{
    config::{ConfigParts, LoadedConfig},
    errors::{ConfigErrorKind, LoadConfigError},
    generate::Generator,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn names(tests: &[TestSpec]) -> Vec<&str> {
    tests
        .iter()
        .filter_map(|test| test.get("name").and_then(Value::as_str))
        .collect()
}

fn args(test: &TestSpec) -> Vec<&str> {
    test.get("args")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect()
}

#[test]
fn full_pipeline() {
    let checkout = TempCheckout::new();
    let config = checkout.load();
    let generator = Generator::new(&config).expect("suites resolve");
    let outputs = generator.generate_outputs(&[]).expect("generation succeeds");
    assert_eq!(outputs.len(), 2);

    let linux = outputs.get("chromium.linux").expect("linux waterfall");
    let builders: Vec<_> = linux.iter_builders().map(|(name, _)| name).collect();
    assert_eq!(builders, ["Linux Tests", "Linux Tests (dbg)"]);
    for key in WaterfallSpec::SENTINEL_KEYS {
        assert!(linux.builders.contains_key(key), "{key} is present");
    }

    let release = &linux.builders["Linux Tests"];
    assert_eq!(release.additional_compile_targets, Some(json!(["all"])));

    let gtests = &release.tests["gtest_tests"];
    assert_eq!(names(gtests), ["base_unittests", "url_unittests"]);
    let base = &gtests[0];
    assert_eq!(
        base["swarming"]["dimensions"],
        json!({"os": "Ubuntu-22.04", "pool": "chromium.tests"}),
        "builder and waterfall mixins are applied"
    );
    let base_args = args(base);
    assert!(base_args.contains(&"--linux-only"), "linux_args resolved");
    assert!(base_args.contains(&"--test-launcher-retry-limit=2"));
    assert_eq!(base["test_id_prefix"], json!("ninja://base:base_unittests/"));
    assert!(base.get("mixins").is_none(), "mixins are consumed");
    assert!(base.get("linux_args").is_none(), "conditionals are consumed");

    let scripts = &release.tests["isolated_scripts"];
    assert_eq!(
        names(scripts),
        ["webgpu_cts_tests swiftshader", "webgpu_cts_tests vulkan"],
        "disabled variants are skipped and tests are sorted by name"
    );
    let vulkan = &scripts[1];
    assert_eq!(vulkan["variant_id"], json!("vulkan"));
    assert_eq!(vulkan["swarming"]["dimensions"]["gpu"], json!("10de"));
    assert_eq!(vulkan["swarming"]["shards"], json!(3), "autoshard override");
    assert_eq!(args(vulkan), ["--use-vulkan"]);
    assert_eq!(
        vulkan["test_id_prefix"],
        json!("ninja://third_party/dawn/test:webgpu_cts_tests/"),
        "extra isolate maps are merged"
    );
    assert_eq!(
        vulkan["merge"]["script"],
        json!("//testing/merge_scripts/standard_isolated_script_merge.py")
    );
    assert_eq!(args(&scripts[0]), ["--use-swiftshader"]);

    let debug = &linux.builders["Linux Tests (dbg)"];
    let gtests = &debug.tests["gtest_tests"];
    assert_eq!(names(gtests), ["base_unittests"], "url_unittests is removed");
    assert_eq!(gtests[0]["swarming"]["shards"], json!(2), "modification applied");

    let mac = outputs.get("chromium.mac").expect("mac waterfall");
    let base = &mac.builders["Mac Tests"].tests["gtest_tests"][0];
    assert_eq!(args(base), ["--test-launcher-retry-limit=0"], "replacement applied");
    assert_eq!(
        base["swarming"]["dimensions"],
        json!({"os": "Mac-14", "cpu": "arm64"})
    );
}

#[test]
fn filters_and_writing() {
    let checkout = TempCheckout::new();
    let config = checkout.load();
    let generator = Generator::new(&config).expect("suites resolve");

    let outputs = generator
        .generate_outputs(&["chromium.mac".to_owned()])
        .expect("generation succeeds");
    assert_eq!(outputs.iter().map(|(name, _)| name).collect::<Vec<_>>(), ["chromium.mac"]);

    let suffix = settings().output_suffix(true);
    outputs
        .write(&checkout.output_dir(), &suffix)
        .expect("wrote outputs");
    let written = std::fs::read_to_string(checkout.output_dir().join("chromium.mac.new.json"))
        .expect("read output");
    let rendered = outputs.render().expect("renders");
    assert_eq!(written, rendered["chromium.mac"]);
    assert!(written.starts_with("{\n  \"AAAAA1 AUTOGENERATED FILE DO NOT EDIT\": {},\n"));
    assert!(written.ends_with("}\n"));
}

#[test]
fn load_errors() {
    let checkout = TempCheckout::new();

    checkout.write_pyl("mixins.pyl", "{'a': {}, 'a': {}}");
    let err = LoadedConfig::load(&checkout.paths).expect_err("duplicate keys are rejected");
    assert!(
        matches!(&err, LoadConfigError::Parse { path, .. } if path.ends_with("mixins.pyl")),
        "unexpected error: {err:?}"
    );

    checkout.write_pyl("mixins.pyl", "{'a': {'$mixin_append': {}}, 'b': ['not', 'a', 'dict']}");
    let err = LoadedConfig::load(&checkout.paths).expect_err("mixins must be dictionaries");
    assert!(
        matches!(&err, LoadConfigError::Deserialize { path, .. } if path.ends_with("mixins.pyl")),
        "unexpected error: {err:?}"
    );

    std::fs::remove_file(checkout.paths.pyl_file("variants.pyl")).expect("removed variants");
    let err = LoadedConfig::load(&checkout.paths).expect_err("variants.pyl is required");
    assert!(matches!(&err, LoadConfigError::Read { .. }), "unexpected error: {err:?}");
}

#[test]
fn invalid_isolate_labels() {
    let parts = ConfigParts {
        test_suites: json!({"basic_suites": {"base_gtests": {"base_unittests": {}}}}),
        gn_isolate_map: json!({"base_unittests": {"label": "//base"}}),
        ..Default::default()
    };
    let Err(LoadConfigError::Invalid(err)) = LoadedConfig::from_parts(parts) else {
        panic!("implicit labels are rejected");
    };
    assert_eq!(err.kind(), ConfigErrorKind::Structural);
    assert!(err.message().starts_with("Malformed GN label \"//base\""));
}
