// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single resolved test, as it appears in a generated file.
///
/// Every test has at least a `name`. The remaining fields depend on the kind
/// of test and are passed through as written.
pub type TestSpec = Map<String, Value>;

/// The tests generated for a single builder.
///
/// Serialized as an object mapping each output category (`gtest_tests`,
/// `isolated_scripts` and so on) to a list of tests sorted by name, plus an
/// optional `additional_compile_targets` entry copied from the builder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuilderSpec {
    /// Compile targets copied verbatim from the builder definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_compile_targets: Option<Value>,

    /// Tests by output category, in the order the categories were first produced.
    #[serde(flatten)]
    pub tests: IndexMap<String, Vec<TestSpec>>,
}

impl BuilderSpec {
    /// Iterates over all tests for this builder, across all categories.
    pub fn iter_tests(&self) -> impl Iterator<Item = (&str, &TestSpec)> + '_ {
        self.tests
            .iter()
            .flat_map(|(category, tests)| tests.iter().map(move |test| (category.as_str(), test)))
    }
}

/// The contents of a generated `<waterfall>.json` file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaterfallSpec {
    /// Builder name to generated tests.
    ///
    /// Once [`add_sentinels`](Self::add_sentinels) has been called, this also
    /// contains the do-not-edit entries, which are always empty.
    pub builders: IndexMap<String, BuilderSpec>,
}

impl WaterfallSpec {
    /// Keys added to every generated file to warn against hand-editing.
    ///
    /// They sort before any real builder name, so they appear at the top of
    /// the file.
    pub const SENTINEL_KEYS: [&'static str; 2] = [
        "AAAAA1 AUTOGENERATED FILE DO NOT EDIT",
        "AAAAA2 See generate_buildbot_json.py to make changes",
    ];

    /// Inserts the do-not-edit sentinel entries.
    pub fn add_sentinels(&mut self) {
        for key in Self::SENTINEL_KEYS {
            self.builders.insert(key.to_owned(), BuilderSpec::default());
        }
    }

    /// Iterates over real builders, skipping the sentinel entries.
    pub fn iter_builders(&self) -> impl Iterator<Item = (&str, &BuilderSpec)> + '_ {
        self.builders
            .iter()
            .filter(|(name, _)| !Self::SENTINEL_KEYS.contains(&name.as_str()))
            .map(|(name, spec)| (name.as_str(), spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn builder_spec_round_trips_through_json() {
        let input = json!({
            "additional_compile_targets": ["all"],
            "gtest_tests": [{"name": "base_unittests", "test": "base_unittests"}],
            "isolated_scripts": [{"name": "telemetry_unittests"}],
        });
        let spec: BuilderSpec = serde_json::from_value(input.clone()).expect("valid spec");
        assert_eq!(
            spec.additional_compile_targets,
            Some(json!(["all"])),
            "compile targets are split out"
        );
        assert_eq!(
            spec.tests.keys().collect::<Vec<_>>(),
            ["gtest_tests", "isolated_scripts"]
        );
        assert_eq!(serde_json::to_value(&spec).expect("serializes"), input);
    }

    #[test]
    fn sentinels_are_skipped_when_iterating() {
        let mut spec = WaterfallSpec::default();
        spec.builders
            .insert("Linux Tests".to_owned(), BuilderSpec::default());
        spec.add_sentinels();

        assert_eq!(spec.builders.len(), 3);
        let names: Vec<_> = spec.iter_builders().map(|(name, _)| name).collect();
        assert_eq!(names, ["Linux Tests"]);
        assert_eq!(
            serde_json::to_value(&spec).expect("serializes")
                ["AAAAA1 AUTOGENERATED FILE DO NOT EDIT"],
            json!({}),
            "sentinel entries serialize as empty objects"
        );
    }
}
