// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{TestConfig, Variant};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A basic suite: test name to test configuration.
pub type BasicSuite = IndexMap<String, TestConfig>;

/// The contents of `test_suites.pyl`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TestSuites {
    /// Leaf suites, keyed by suite name.
    #[serde(default)]
    pub basic_suites: IndexMap<String, BasicSuite>,

    /// Unions of basic suites, keyed by suite name.
    #[serde(default)]
    pub compound_suites: IndexMap<String, Vec<String>>,

    /// Variant expansions of basic suites, keyed by suite name.
    #[serde(default)]
    pub matrix_compound_suites: IndexMap<String, IndexMap<String, MatrixSubSuite>>,
}

impl TestSuites {
    /// Returns true if `name` is a suite of any kind.
    pub fn contains(&self, name: &str) -> bool {
        self.basic_suites.contains_key(name)
            || self.compound_suites.contains_key(name)
            || self.matrix_compound_suites.contains_key(name)
    }

    /// Iterates over all suite names: basic, then compound, then matrix.
    pub fn all_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.basic_suites
            .keys()
            .chain(self.compound_suites.keys())
            .chain(self.matrix_compound_suites.keys())
            .map(String::as_str)
    }

    /// Iterates over every composite suite with the names of the basic suites
    /// it is built from.
    pub(crate) fn composite_members(
        &self,
    ) -> impl Iterator<Item = (&str, Vec<&str>)> + '_ {
        let compound = self
            .compound_suites
            .iter()
            .map(|(name, members)| (name.as_str(), members.iter().map(String::as_str).collect()));
        let matrix = self
            .matrix_compound_suites
            .iter()
            .map(|(name, members)| (name.as_str(), members.keys().map(String::as_str).collect()));
        compound.chain(matrix)
    }
}

/// How one basic suite contributes to a matrix compound suite.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MatrixSubSuite {
    /// Variants to expand the basic suite's tests with. If empty, the tests
    /// are used as they are.
    #[serde(default)]
    pub variants: Vec<VariantRef>,

    /// Mixins attached to every expanded test.
    #[serde(default)]
    pub mixins: Vec<String>,
}

/// A variant, either named (defined in `variants.pyl`) or written inline.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum VariantRef {
    /// A reference to a variant in `variants.pyl`.
    Named(String),
    /// An anonymous variant.
    Inline(Variant),
}

impl VariantRef {
    /// Returns a key identifying this reference, used to tell variant
    /// expansions of the same test apart.
    pub(crate) fn key(&self) -> String {
        match self {
            Self::Named(name) => name.clone(),
            // Serializing a variant can't fail: it only holds JSON values.
            Self::Inline(variant) => serde_json::to_string(variant).unwrap_or_default(),
        }
    }
}
