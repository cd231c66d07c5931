// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generators for each kind of test.
//!
//! Each generator takes one test configuration from a suite and returns the
//! test as it should appear in the output for a builder, or `None` if an
//! exception removes it from the builder.

use crate::{
    config::{LoadedConfig, TestConfig},
    errors::ConfigError,
    helpers::{array_entry, dimensions, is_truthy},
    resolve::{BuilderContext, TestResolver, TransformOptions},
};
use serde_json::{Value, json};

const DEFAULT_RESULTS_BUCKET: &str = "chromium-result-details";
const PRESENTATION_MERGE_SCRIPT: &str =
    "//build/android/pylib/results/presentation/test_results_presentation.py";
const CHROMEOS_TRIGGER_SCRIPT: &str = "//testing/trigger_scripts/chromeos_device_trigger.py";

/// Everything a generator needs to know about where a test is generated.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GenerationContext<'a> {
    pub(crate) config: &'a LoadedConfig,
    pub(crate) resolver: TestResolver<'a>,
    pub(crate) builder: BuilderContext<'a>,
}

impl GenerationContext<'_> {
    fn should_run(&self, test_config: &TestConfig) -> bool {
        self.resolver.should_run_on_tester(self.builder, test_config)
    }

    fn transform(
        &self,
        result: TestConfig,
        test_name: &str,
        options: TransformOptions,
    ) -> Result<TestConfig, ConfigError> {
        self.resolver
            .apply_common_transformations(self.builder, result, test_name, options)
    }

    fn with_default_test(test_config: &TestConfig, test_name: &str) -> TestConfig {
        let mut result = test_config.clone();
        result
            .entry("test")
            .or_insert_with(|| Value::String(test_name.to_owned()));
        result
    }

    /// Generates a GoogleTest test.
    pub(crate) fn gtest(
        &self,
        test_name: &str,
        test_config: &TestConfig,
    ) -> Result<Option<TestConfig>, ConfigError> {
        if !self.should_run(test_config) {
            return Ok(None);
        }
        // The suite key, not `name`, which has the variant identifier.
        let result = Self::with_default_test(test_config, test_name);
        let mut result = self.transform(result, test_name, TransformOptions::default())?;

        let tester = self.builder.config;
        if tester.is_android()
            && result.contains_key("swarming")
            && !is_truthy(result.get("use_isolated_scripts_api"))
        {
            self.add_android_presentation_args(&mut result)?;
            args(&mut result)?.push(Value::String("--recover-devices".to_owned()));
        }
        self.add_common_test_properties(&mut result);

        if result.contains_key("swarming") && !is_truthy(result.get("merge")) {
            let merge_script = if is_truthy(test_config.get("use_isolated_scripts_api")) {
                "standard_isolated_script_merge"
            } else {
                "standard_gtest_merge"
            };
            result.insert(
                "merge".to_owned(),
                json!({"script": format!("//testing/merge_scripts/{merge_script}.py")}),
            );
        }
        Ok(Some(result))
    }

    /// Generates an isolated script test.
    pub(crate) fn isolated_script(
        &self,
        test_name: &str,
        test_config: &TestConfig,
    ) -> Result<Option<TestConfig>, ConfigError> {
        if !self.should_run(test_config) {
            return Ok(None);
        }
        let result = Self::with_default_test(test_config, test_name);
        let mut result = self.transform(result, test_name, TransformOptions::default())?;

        let tester = self.builder.config;
        if tester.is_android() && result.contains_key("swarming") && tester.use_android_presentation
        {
            self.add_android_presentation_args(&mut result)?;
        }
        self.add_common_test_properties(&mut result);

        if result.contains_key("swarming") && !is_truthy(result.get("merge")) {
            result.insert(
                "merge".to_owned(),
                json!({"script": "//testing/merge_scripts/standard_isolated_script_merge.py"}),
            );
        }
        Ok(Some(result))
    }

    /// Generates a script run directly on the builder.
    pub(crate) fn script(
        &self,
        test_name: &str,
        test_config: &TestConfig,
    ) -> Result<Option<TestConfig>, ConfigError> {
        let builder = self.builder;
        if builder.waterfall.forbid_script_tests || builder.config.forbid_script_tests {
            return Err(ConfigError::precondition(format!(
                "Attempted to generate a script test on tester {}, which explicitly \
                 forbids script tests",
                builder.name
            )));
        }
        if !self.should_run(test_config) {
            return Ok(None);
        }

        let script = test_config.get("script").cloned().ok_or_else(|| {
            ConfigError::structural(format!("script test {test_name} must specify script"))
        })?;
        let mut result = TestConfig::new();
        result.insert(
            "name".to_owned(),
            test_config
                .get("name")
                .cloned()
                .unwrap_or_else(|| Value::String(test_name.to_owned())),
        );
        result.insert("script".to_owned(), script);

        self.transform(
            result,
            test_name,
            TransformOptions {
                swarmable: false,
                supports_args: false,
            },
        )
        .map(Some)
    }

    /// Generates a JUnit test.
    pub(crate) fn junit(
        &self,
        test_name: &str,
        test_config: &TestConfig,
    ) -> Result<Option<TestConfig>, ConfigError> {
        if !self.should_run(test_config) {
            return Ok(None);
        }
        let result = Self::with_default_test(test_config, test_name);
        self.transform(
            result,
            test_name,
            TransformOptions {
                swarmable: false,
                ..Default::default()
            },
        )
        .map(Some)
    }

    /// Generates a ChromeOS test run in Skylab.
    pub(crate) fn skylab(
        &self,
        test_name: &str,
        test_config: &TestConfig,
    ) -> Result<Option<TestConfig>, ConfigError> {
        if !self.should_run(test_config) {
            return Ok(None);
        }
        let mut result = Self::with_default_test(test_config, test_name);

        let tester = self.builder.config;
        if !copy_skylab_field(&mut result, "cros_board", tester.cros_board.as_ref()) {
            return Err(ConfigError::precondition("skylab tests must specify cros_board."));
        }
        copy_skylab_field(&mut result, "cros_model", tester.cros_model.as_ref());
        copy_skylab_field(&mut result, "dut_pool", tester.cros_dut_pool.as_ref());
        copy_skylab_field(&mut result, "run_cft", tester.run_cft.as_ref());

        self.transform(
            result,
            test_name,
            TransformOptions {
                swarmable: false,
                ..Default::default()
            },
        )
        .map(Some)
    }

    /// Adds arguments for the Android results presentation service, and makes
    /// it the merge script.
    fn add_android_presentation_args(&self, result: &mut TestConfig) -> Result<(), ConfigError> {
        let tester = self.builder.config;
        let bucket = tester
            .results_bucket
            .as_deref()
            .unwrap_or(DEFAULT_RESULTS_BUCKET);
        args(result)?.push(Value::String(format!("--gs-results-bucket={bucket}")));

        // Any merge script set earlier is replaced.
        if result.contains_key("swarming") && !tester.skip_merge_script {
            let name = result.get("name").cloned().unwrap_or(Value::Null);
            result.insert(
                "merge".to_owned(),
                json!({
                    "args": ["--bucket", bucket, "--test-name", name],
                    "script": PRESENTATION_MERGE_SCRIPT,
                }),
            );
        }
        Ok(())
    }

    /// Tests targeting ChromeOS hardware (those with a `device_type`
    /// dimension) need a trigger script.
    fn add_common_test_properties(&self, result: &mut TestConfig) {
        let tester = self.builder.config;
        if tester.is_chromeos()
            && tester.use_swarming
            && dimensions(result).is_some_and(|dims| dims.contains_key("device_type"))
        {
            result.insert(
                "trigger_script".to_owned(),
                json!({"script": CHROMEOS_TRIGGER_SCRIPT}),
            );
        }
    }
}

fn args(result: &mut TestConfig) -> Result<&mut Vec<Value>, ConfigError> {
    array_entry(result, "args").ok_or_else(|| ConfigError::structural("\"args\" must be a list"))
}

/// Sets a Skylab field on the test if either the test or the builder sets it,
/// preferring the builder's value. Returns false if neither does.
fn copy_skylab_field(result: &mut TestConfig, key: &str, tester_value: Option<&Value>) -> bool {
    if !result.contains_key(key) && tester_value.is_none() {
        return false;
    }
    let value = match tester_value {
        Some(value) if is_truthy(Some(value)) => value.clone(),
        _ => result.get(key).cloned().unwrap_or(Value::Null),
    };
    result.insert(key.to_owned(), value);
    true
}
