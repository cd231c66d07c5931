// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checks run once on freshly loaded configuration, before any resolution.

use super::{LoadedConfig, TestConfig};
use crate::{
    errors::ConfigError,
    resolve::{CONDITIONAL_SWARMING_KEYS, MagicSubstitution},
};
use serde_json::Value;

pub(super) fn validate(config: &LoadedConfig) -> Result<(), ConfigError> {
    for (suite_name, suite) in &config.test_suites().basic_suites {
        for (test_name, test) in suite {
            if test.contains_key("name") {
                return Err(ConfigError::structural(format!(
                    "The name field is set in test {test_name} in basic suite {suite_name}, \
                     this is not supported, the test name is the key within the basic suite"
                )));
            }
            if test.contains_key("isolate_name") {
                return Err(ConfigError::structural(format!(
                    "The isolate_name field is set in test {test_name} in basic suite \
                     {suite_name}, the test field should be used instead"
                )));
            }
        }
    }

    for (swarming_sections, location) in swarming_definitions(config) {
        if swarming_sections
            .iter()
            .any(|swarming| swarming.contains_key("dimension_sets"))
        {
            return Err(ConfigError::structural(format!(
                "dimension_sets is no longer supported (set in {location}), \
                 instead, use set dimensions to a single dict"
            )));
        }
    }

    let suite_tests = config
        .test_suites()
        .basic_suites
        .values()
        .flat_map(|suite| suite.values());
    let modifications = config
        .exceptions()
        .values()
        .flat_map(|exception| exception.modifications.values());
    let variants = config.variants().values().map(|variant| &variant.fragment);
    for definition in suite_tests
        .chain(config.mixins().values())
        .chain(modifications)
        .chain(variants)
    {
        check_magic_args(definition)?;
    }
    for builder in config
        .waterfalls()
        .iter()
        .flat_map(|waterfall| waterfall.machines.values())
    {
        for arg in &builder.args {
            check_magic_arg(arg)?;
        }
    }

    // Only isolates that some test runs are checked: the map also describes
    // targets bbgen never sees.
    for suite in config.test_suites().basic_suites.values() {
        for (test_name, test) in suite {
            let isolate = test
                .get("test")
                .and_then(Value::as_str)
                .filter(|isolate| !isolate.is_empty())
                .unwrap_or(test_name);
            if let Some(entry) = config.isolate_map().get(isolate) {
                entry.validate_label(isolate)?;
            }
        }
    }

    Ok(())
}

/// Every place swarming settings can be written, with a description for
/// messages.
fn swarming_definitions(config: &LoadedConfig) -> Vec<(Vec<&TestConfig>, String)> {
    let mut definitions = Vec::new();
    for (suite_name, suite) in &config.test_suites().basic_suites {
        for (test_name, test) in suite {
            definitions.push((
                swarming_sections(test),
                format!("test {test_name} in basic suite {suite_name}"),
            ));
        }
    }
    for (mixin_name, mixin) in config.mixins() {
        definitions.push((swarming_sections(mixin), format!("mixin {mixin_name}")));
    }
    for waterfall in config.waterfalls() {
        for (builder_name, builder) in &waterfall.machines {
            definitions.push((
                vec![&builder.swarming],
                format!("builder {builder_name} in waterfall {}", waterfall.name),
            ));
        }
    }
    for (test_name, exception) in config.exceptions() {
        for (builder_name, modifications) in &exception.modifications {
            definitions.push((
                swarming_sections(modifications),
                format!("exception for test {test_name} on builder {builder_name}"),
            ));
        }
    }
    definitions
}

fn swarming_sections(definition: &TestConfig) -> Vec<&TestConfig> {
    std::iter::once("swarming")
        .chain(CONDITIONAL_SWARMING_KEYS)
        .filter_map(|key| definition.get(key).and_then(Value::as_object))
        .collect()
}

/// Checks that every magic substitution in an argument list names a known
/// substitution. Argument lists live under keys ending in `args`, at any
/// depth.
fn check_magic_args(definition: &TestConfig) -> Result<(), ConfigError> {
    for (key, value) in definition {
        match value {
            Value::Array(items) if key.ends_with("args") => {
                for item in items {
                    check_magic_arg(item)?;
                }
            }
            Value::Object(nested) => check_magic_args(nested)?,
            _ => {}
        }
    }
    Ok(())
}

fn check_magic_arg(arg: &Value) -> Result<(), ConfigError> {
    match arg.as_str().and_then(MagicSubstitution::parse_arg) {
        Some(result) => result.map(|_| ()),
        None => Ok(()),
    }
}
