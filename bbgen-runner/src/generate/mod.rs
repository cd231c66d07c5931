// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generating test specs for waterfalls.
//!
//! A [`Generator`] resolves test suites once, then produces a
//! [`WaterfallSpec`] for each waterfall by running every test in every suite a
//! builder references through the generator for its [`TestCategory`].

mod categories;
mod gpu;
mod kinds;

pub use categories::TestCategory;

use crate::{
    config::{LoadedConfig, TestConfig, Waterfall},
    errors::{ConfigError, WriteOutputError},
    resolve::{BuilderContext, ResolvedSuite, ResolvedSuites, TestResolver},
};
use bbgen_metadata::{BuilderSpec, TestSpec, WaterfallSpec, json::to_spec_string};
use camino::Utf8Path;
use gpu::GpuFlavor;
use indexmap::IndexMap;
use itertools::Itertools;
use kinds::GenerationContext;
use serde_json::{Map, Value};
use std::io::Write;
use tracing::{debug, info};

/// Generates test specs from loaded configuration.
#[derive(Clone, Debug)]
pub struct Generator<'cfg> {
    config: &'cfg LoadedConfig,
    suites: ResolvedSuites,
    resolver: TestResolver<'cfg>,
}

impl<'cfg> Generator<'cfg> {
    /// Resolves the test suites in `config` and checks that every suite a
    /// builder references exists.
    pub fn new(config: &'cfg LoadedConfig) -> Result<Self, ConfigError> {
        let suites = ResolvedSuites::resolve(config)?;
        link_builders(config, &suites)?;
        Ok(Self {
            config,
            suites,
            resolver: TestResolver::new(config),
        })
    }

    /// Returns the configuration this generator was built from.
    pub fn config(&self) -> &'cfg LoadedConfig {
        self.config
    }

    /// Returns the resolved test suites.
    pub fn resolved_suites(&self) -> &ResolvedSuites {
        &self.suites
    }

    /// Generates the tests for a single builder.
    ///
    /// Tests are grouped by output category and sorted by name within each
    /// category. Categories appear in the order the builder first produces
    /// them.
    pub fn generate_builder(&self, builder: BuilderContext<'cfg>) -> Result<BuilderSpec, ConfigError> {
        let mut spec = BuilderSpec {
            additional_compile_targets: builder.config.additional_compile_targets.clone(),
            tests: IndexMap::new(),
        };
        let cx = GenerationContext {
            config: self.config,
            resolver: self.resolver,
            builder,
        };

        for (category_name, suite_name) in &builder.config.test_suites {
            let category = TestCategory::parse(category_name).ok_or_else(|| {
                unknown_category(category_name, builder.name, &builder.waterfall.name)
            })?;
            let suite = self
                .suites
                .get(suite_name)
                .ok_or_else(|| missing_suite(suite_name, builder.name, &builder.waterfall.name))?;
            let tests = generate_category(&cx, category, suite)?;
            spec.tests
                .entry(category.output_category().name().to_owned())
                .or_default()
                .extend(tests);
        }

        for tests in spec.tests.values_mut() {
            tests.sort_by(|a, b| test_name(a).cmp(test_name(b)));
        }
        Ok(spec)
    }

    /// Generates the tests for every builder on a waterfall, and applies
    /// autoshard overrides.
    pub fn generate_waterfall(&self, waterfall: &'cfg Waterfall) -> Result<WaterfallSpec, ConfigError> {
        let mut spec = WaterfallSpec::default();
        for (name, config) in &waterfall.machines {
            let builder = BuilderContext {
                waterfall,
                name,
                config,
            };
            let builder_spec = self.generate_builder(builder)?;
            debug!(
                waterfall = %waterfall.name,
                builder = %name,
                tests = builder_spec.iter_tests().count(),
                "generated builder"
            );
            spec.builders.insert(name.clone(), builder_spec);
        }

        let autoshards = self.config.autoshards();
        if !autoshards.is_empty() {
            for (builder_name, builder_spec) in &mut spec.builders {
                for tests in builder_spec.tests.values_mut() {
                    for test in tests {
                        let Some(shards) =
                            autoshards.shards_for(&waterfall.name, builder_name, test_name(test))?
                        else {
                            continue;
                        };
                        set_shards(test, shards)?;
                    }
                }
            }
        }
        Ok(spec)
    }

    /// Generates every waterfall, or only those named in `filters` if it is
    /// non-empty. Each waterfall gets the do-not-edit sentinel entries.
    pub fn generate_outputs(&self, filters: &[String]) -> Result<GeneratedOutputs, ConfigError> {
        let mut waterfalls = IndexMap::new();
        for waterfall in self.config.waterfalls() {
            if !filters.is_empty() && !filters.contains(&waterfall.name) {
                debug!(waterfall = %waterfall.name, "skipping filtered-out waterfall");
                continue;
            }
            let mut spec = self.generate_waterfall(waterfall)?;
            spec.add_sentinels();
            waterfalls.insert(waterfall.name.clone(), spec);
        }
        Ok(GeneratedOutputs { waterfalls })
    }
}

/// Generated specs for a set of waterfalls, in configuration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeneratedOutputs {
    waterfalls: IndexMap<String, WaterfallSpec>,
}

impl GeneratedOutputs {
    /// Returns the spec for a waterfall, if it was generated.
    pub fn get(&self, waterfall: &str) -> Option<&WaterfallSpec> {
        self.waterfalls.get(waterfall)
    }

    /// Iterates over generated waterfalls.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &WaterfallSpec)> + '_ {
        self.waterfalls.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// The number of generated waterfalls.
    pub fn len(&self) -> usize {
        self.waterfalls.len()
    }

    /// Returns true if no waterfalls were generated.
    pub fn is_empty(&self) -> bool {
        self.waterfalls.is_empty()
    }

    /// Renders each waterfall as it is written to disk.
    pub fn render(&self) -> Result<IndexMap<&str, String>, serde_json::Error> {
        self.iter()
            .map(|(name, spec)| Ok((name, to_spec_string(spec)?)))
            .collect()
    }

    /// Writes `<output_dir>/<waterfall><suffix>` for each waterfall, replacing
    /// any existing file atomically. `output_dir` is created if needed.
    pub fn write(&self, output_dir: &Utf8Path, suffix: &str) -> Result<(), WriteOutputError> {
        std::fs::create_dir_all(output_dir).map_err(|error| WriteOutputError {
            path: output_dir.to_owned(),
            error,
        })?;
        for (name, spec) in self.iter() {
            let path = output_dir.join(format!("{name}{suffix}"));
            let contents = to_spec_string(spec).map_err(|error| WriteOutputError {
                path: path.clone(),
                error: error.into(),
            })?;

            atomicwrites::AtomicFile::new(&path, atomicwrites::AllowOverwrite)
                .write(|file| file.write_all(contents.as_bytes()))
                .map_err(|error| WriteOutputError {
                    path: path.clone(),
                    error: error.into(),
                })?;
            info!(path = %path, "wrote");
        }
        Ok(())
    }
}

fn generate_category(
    cx: &GenerationContext<'_>,
    category: TestCategory,
    suite: &ResolvedSuite,
) -> Result<Vec<TestSpec>, ConfigError> {
    let mut tests = Vec::new();
    for (test_name, entry) in suite.iter().sorted_by(|(a, _), (b, _)| a.cmp(b)) {
        for test_config in entry.configs() {
            if let Some(test) = generate_test(cx, category, test_name, test_config)? {
                tests.push(test);
            }
        }
    }
    Ok(tests)
}

fn generate_test(
    cx: &GenerationContext<'_>,
    category: TestCategory,
    test_name: &str,
    test_config: &TestConfig,
) -> Result<Option<TestConfig>, ConfigError> {
    match category {
        TestCategory::AndroidWebviewGpuTelemetryTests => {
            cx.gpu_telemetry(test_name, test_config, GpuFlavor::AndroidWebview)
        }
        TestCategory::CastStreamingTests => {
            cx.gpu_telemetry(test_name, test_config, GpuFlavor::CastStreaming)
        }
        TestCategory::GpuTelemetryTests => {
            cx.gpu_telemetry(test_name, test_config, GpuFlavor::Regular)
        }
        TestCategory::GtestTests => cx.gtest(test_name, test_config),
        TestCategory::IsolatedScripts => cx.isolated_script(test_name, test_config),
        TestCategory::JunitTests => cx.junit(test_name, test_config),
        TestCategory::Scripts => cx.script(test_name, test_config),
        TestCategory::SkylabTests => cx.skylab(test_name, test_config),
        TestCategory::SkylabGpuTelemetryTests => {
            cx.gpu_telemetry(test_name, test_config, GpuFlavor::Skylab)
        }
    }
}

/// Checks that every suite referenced by a builder exists.
fn link_builders(config: &LoadedConfig, suites: &ResolvedSuites) -> Result<(), ConfigError> {
    for waterfall in config.waterfalls() {
        for (builder_name, builder) in &waterfall.machines {
            for suite_name in builder.test_suites.values() {
                if !suites.contains(suite_name) {
                    return Err(missing_suite(suite_name, builder_name, &waterfall.name));
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn unknown_category(category: &str, builder: &str, waterfall: &str) -> ConfigError {
    ConfigError::unknown_reference(format!(
        "Unknown test suite type {category} in bot {builder} on waterfall {waterfall}"
    ))
}

pub(crate) fn missing_suite(suite: &str, builder: &str, waterfall: &str) -> ConfigError {
    ConfigError::unknown_reference(format!(
        "Test suite {suite} from machine {builder} on waterfall {waterfall} \
         not present in test_suites.pyl"
    ))
}

fn test_name(test: &TestSpec) -> &str {
    test.get("name").and_then(Value::as_str).unwrap_or_default()
}

fn set_shards(test: &mut TestSpec, shards: u64) -> Result<(), ConfigError> {
    if test.get("swarming").is_some_and(|swarming| !swarming.is_object()) {
        return Err(ConfigError::structural(format!(
            "cannot shard {}: \"swarming\" is not a dictionary",
            test_name(test)
        )));
    }
    if let Value::Object(swarming) = test
        .entry("swarming")
        .or_insert_with(|| Value::Object(Map::new()))
    {
        swarming.insert("shards".to_owned(), Value::from(shards));
    }
    Ok(())
}
