// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolving compound and matrix compound suites into flat test maps.

use super::variants::resolve_variants;
use crate::{
    config::{BasicSuite, LoadedConfig, TestConfig, TestSuites, Variant, VariantRef},
    errors::ConfigError,
};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::{collections::HashMap, fmt, slice};
use tracing::debug;

/// The kind of a composite suite.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompositionKind {
    /// A union of basic suites.
    Compound,
    /// A variant expansion of basic suites.
    Matrix,
}

impl CompositionKind {
    /// The `test_suites.pyl` section this kind is defined in.
    pub fn section(self) -> &'static str {
        match self {
            Self::Compound => "compound_suites",
            Self::Matrix => "matrix_compound_suites",
        }
    }
}

impl fmt::Display for CompositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

/// One test in a resolved suite.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SuiteEntry {
    /// A test defined once.
    Single(TestConfig),
    /// A test expanded by a matrix suite, possibly into several
    /// configurations.
    Expanded(Vec<TestConfig>),
}

impl SuiteEntry {
    /// Returns every configuration of this test.
    pub fn configs(&self) -> &[TestConfig] {
        match self {
            Self::Single(test) => slice::from_ref(test),
            Self::Expanded(tests) => tests,
        }
    }
}

/// A resolved suite: test name to its configurations.
pub type ResolvedSuite = IndexMap<String, SuiteEntry>;

/// Every suite, resolved and flattened into one namespace.
///
/// Basic suites come first, then compound suites, then matrix compound
/// suites.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct ResolvedSuites {
    suites: IndexMap<String, ResolvedSuite>,
}

impl ResolvedSuites {
    /// Checks and resolves the suites in `config`.
    pub fn resolve(config: &LoadedConfig) -> Result<Self, ConfigError> {
        let test_suites = config.test_suites();
        let basic_suites = prepare_basic_suites(config);

        check_composition(test_suites, &basic_suites, CompositionKind::Compound, config.variants())?;
        let mut suites: IndexMap<String, ResolvedSuite> = basic_suites
            .iter()
            .map(|(name, suite)| {
                let resolved = suite
                    .iter()
                    .map(|(test_name, test)| (test_name.clone(), SuiteEntry::Single(test.clone())))
                    .collect();
                (name.clone(), resolved)
            })
            .collect();

        for (name, members) in &test_suites.compound_suites {
            let mut resolved = ResolvedSuite::new();
            for member in members {
                // Existence was checked by check_composition.
                if let Some(basic) = suites.get(member) {
                    resolved.extend(basic.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            suites.insert(name.clone(), resolved);
        }

        check_composition(test_suites, &basic_suites, CompositionKind::Matrix, config.variants())?;
        for (name, sub_suites) in &test_suites.matrix_compound_suites {
            let mut expanded: IndexMap<String, Vec<TestConfig>> = IndexMap::new();
            for (member, sub_suite) in sub_suites {
                let Some(basic) = basic_suites.get(member) else {
                    continue;
                };
                let tests: IndexMap<String, Vec<TestConfig>> = if sub_suite.variants.is_empty() {
                    basic
                        .iter()
                        .map(|(test_name, test)| (test_name.clone(), vec![test.clone()]))
                        .collect()
                } else {
                    resolve_variants(basic, &sub_suite.variants, &sub_suite.mixins, config.variants())?
                };
                for (test_name, new_tests) in tests {
                    let for_name = expanded.entry(test_name).or_default();
                    for test in new_tests {
                        if !for_name.contains(&test) {
                            for_name.push(test);
                        }
                    }
                }
            }
            let resolved = expanded
                .into_iter()
                .map(|(test_name, tests)| (test_name, SuiteEntry::Expanded(tests)))
                .collect();
            suites.insert(name.clone(), resolved);
        }

        debug!(suites = suites.len(), "resolved test suites");
        Ok(Self { suites })
    }

    /// Returns the resolved suite called `name`.
    pub fn get(&self, name: &str) -> Option<&ResolvedSuite> {
        self.suites.get(name)
    }

    /// Returns true if a suite called `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.suites.contains_key(name)
    }

    /// Iterates over suites in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResolvedSuite)> + '_ {
        self.suites.iter().map(|(name, suite)| (name.as_str(), suite))
    }

    /// Collapses all suites into a single test name to entry map, later
    /// suites overwriting earlier ones.
    pub fn flattened_tests(&self) -> IndexMap<&str, &SuiteEntry> {
        let mut tests = IndexMap::new();
        for suite in self.suites.values() {
            for (test_name, entry) in suite {
                tests.insert(test_name.as_str(), entry);
            }
        }
        tests
    }
}

/// Sets `name` on every basic test, and `test_id_prefix` on those with an
/// isolate map entry.
fn prepare_basic_suites(config: &LoadedConfig) -> IndexMap<String, BasicSuite> {
    let mut basic_suites = config.test_suites().basic_suites.clone();
    for suite in basic_suites.values_mut() {
        for (test_name, test) in suite.iter_mut() {
            test.insert("name".to_owned(), Value::String(test_name.clone()));

            let isolate = test
                .get("test")
                .and_then(Value::as_str)
                .filter(|isolate| !isolate.is_empty())
                .unwrap_or(test_name);
            if let Some(entry) = config.isolate_map().get(isolate) {
                let prefix = entry.test_id_prefix();
                test.insert("test_id_prefix".to_owned(), Value::String(prefix));
            }
        }
    }
    basic_suites
}

/// Checks the composite suites of one kind.
///
/// For each suite, in order:
///
/// * its name must not be a basic suite's
/// * it may only refer to basic suites, which must exist
/// * a test reachable through several of its members must be defined
///   identically by all of them
/// * for matrix suites, every variant must exist and have a non-empty
///   identifier without surrounding whitespace
fn check_composition(
    test_suites: &TestSuites,
    basic_suites: &IndexMap<String, BasicSuite>,
    kind: CompositionKind,
    all_variants: &IndexMap<String, Variant>,
) -> Result<(), ConfigError> {
    let composites: Vec<(&str, Vec<&str>)> = match kind {
        CompositionKind::Compound => test_suites
            .compound_suites
            .iter()
            .map(|(name, members)| (name.as_str(), members.iter().map(String::as_str).collect()))
            .collect(),
        CompositionKind::Matrix => test_suites
            .matrix_compound_suites
            .iter()
            .map(|(name, members)| (name.as_str(), members.keys().map(String::as_str).collect()))
            .collect(),
    };

    for (suite, members) in composites {
        if basic_suites.contains_key(suite) {
            return Err(ConfigError::structural(format!(
                "{kind} names may not duplicate basic test suite names \
                 (error found while processsing {suite})"
            )));
        }

        let mut seen_tests: HashMap<(&str, Option<String>), &str> = HashMap::new();
        for member in members {
            if test_suites.compound_suites.contains_key(member)
                || test_suites.matrix_compound_suites.contains_key(member)
            {
                return Err(ConfigError::structural(format!(
                    "{kind} may not refer to other composition type test suites \
                     (error found while processing {suite})"
                )));
            }
            let Some(basic) = basic_suites.get(member) else {
                return Err(ConfigError::unknown_reference(format!(
                    "Unable to find reference to {member} while processing {suite}"
                )));
            };

            let variant_keys: Vec<Option<String>> = match kind {
                CompositionKind::Matrix => {
                    let variants = test_suites.matrix_compound_suites[suite][member]
                        .variants
                        .iter()
                        .map(|v| Some(v.key()))
                        .collect::<Vec<_>>();
                    if variants.is_empty() { vec![None] } else { variants }
                }
                CompositionKind::Compound => vec![None],
            };

            for (test_name, test) in basic {
                for variant in &variant_keys {
                    let key = (test_name.as_str(), variant.clone());
                    if let Some(seen_member) = seen_tests.get(&key) {
                        if basic_suites[*seen_member].get(test_name) != Some(test) {
                            let description = match variant {
                                Some(variant) => format!("{test_name} with variant {variant} applied"),
                                None => test_name.clone(),
                            };
                            return Err(ConfigError::conflicting(format!(
                                "Conflicting test definitions for {description} from {seen_member} \
                                 and {member} in {kind} (error found while processing {suite})"
                            )));
                        }
                    }
                    seen_tests.insert(key, member);
                }
            }

            if kind == CompositionKind::Matrix {
                check_matrix_identifiers(test_suites, suite, member, all_variants)?;
            }
        }
    }
    Ok(())
}

fn check_matrix_identifiers(
    test_suites: &TestSuites,
    suite: &str,
    member: &str,
    all_variants: &IndexMap<String, Variant>,
) -> Result<(), ConfigError> {
    for variant_ref in &test_suites.matrix_compound_suites[suite][member].variants {
        let variant = match variant_ref {
            VariantRef::Named(name) => all_variants.get(name).ok_or_else(|| {
                ConfigError::unknown_reference(format!(
                    "Missing variant definition for {name} in variants.pyl"
                ))
            })?,
            VariantRef::Inline(variant) => variant,
        };
        match variant.identifier.as_deref() {
            None => {
                return Err(ConfigError::structural(format!(
                    "Missing required identifier field in matrix compound suite {suite}, {member}"
                )));
            }
            Some("") => {
                return Err(ConfigError::structural(format!(
                    "Identifier field can not be \"\" in matrix compound suite {suite}, {member}"
                )));
            }
            Some(identifier) if identifier.trim() != identifier => {
                return Err(ConfigError::structural(format!(
                    "Identifier field can not have leading and trailing whitespace in \
                     matrix compound suite {suite}, {member}"
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}
