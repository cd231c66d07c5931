// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestConfig;
use indexmap::IndexMap;
use serde::Deserialize;

/// Replacement values for one argument list: flag to new value, where `None`
/// removes the flag.
pub type ArgReplacements = IndexMap<String, Option<String>>;

/// Per-test overrides from `test_suite_exceptions.pyl`, keyed by test name.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TestException {
    /// Builders (or `"<builder> <waterfall>"`) the test is removed from.
    #[serde(default)]
    pub remove_from: Vec<String>,

    /// Historical removal list. Only validated, never applied.
    #[serde(default)]
    pub remove_gtest_from: Vec<String>,

    /// Builder name to a patch deep-merged into the test.
    #[serde(default)]
    pub modifications: IndexMap<String, TestConfig>,

    /// Builder name to argument-list key to replacements.
    #[serde(default)]
    pub replacements: IndexMap<String, IndexMap<String, ArgReplacements>>,
}

impl TestException {
    /// Returns every builder name this exception refers to.
    pub(crate) fn referenced_builders(&self) -> impl Iterator<Item = &str> + '_ {
        self.remove_from
            .iter()
            .chain(&self.remove_gtest_from)
            .chain(self.modifications.keys())
            .map(String::as_str)
    }
}
