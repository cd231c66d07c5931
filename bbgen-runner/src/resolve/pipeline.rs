// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    conditionals::resolve_os_conditional_values, exceptions::ExceptionSet,
    magic::substitute_magic_args, mixins::MixinSet,
};
use crate::{
    config::{BuilderConfig, LoadedConfig, TestConfig, Waterfall},
    errors::ConfigError,
    helpers::{array_entry, canonicalize_args_in, dictionary_merge, is_truthy, object_entry},
};
use serde_json::Value;

/// Marks a swarming section as usable until the end of the pipeline.
const CAN_USE_ON_SWARMING_BUILDERS: &str = "can_use_on_swarming_builders";

/// A builder and the waterfall it belongs to.
#[derive(Clone, Copy, Debug)]
pub struct BuilderContext<'cfg> {
    /// The waterfall.
    pub waterfall: &'cfg Waterfall,
    /// The builder's name.
    pub name: &'cfg str,
    /// The builder's configuration.
    pub config: &'cfg BuilderConfig,
}

/// Per-kind switches for [`TestResolver::apply_common_transformations`].
#[derive(Clone, Copy, Debug)]
pub struct TransformOptions {
    /// Whether the test kind can run on swarming at all.
    pub swarmable: bool,
    /// Whether the test kind takes the builder's `args`.
    pub supports_args: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            swarmable: true,
            supports_args: true,
        }
    }
}

/// Turns a suite's test definition into the final test for one builder.
#[derive(Clone, Copy, Debug)]
pub struct TestResolver<'cfg> {
    mixins: MixinSet<'cfg>,
    exceptions: ExceptionSet<'cfg>,
}

impl<'cfg> TestResolver<'cfg> {
    /// Creates a resolver over the mixins and exceptions in `config`.
    pub fn new(config: &'cfg LoadedConfig) -> Self {
        Self {
            mixins: MixinSet::new(config.mixins()),
            exceptions: ExceptionSet::new(config.exceptions()),
        }
    }

    /// Returns false if an exception removes the test from this builder.
    pub fn should_run_on_tester(&self, builder: BuilderContext<'_>, test: &TestConfig) -> bool {
        self.exceptions
            .should_run_on_tester(&builder.waterfall.name, builder.name, test)
    }

    /// Runs the transformations shared by every test kind.
    ///
    /// In order: conditional fields are resolved, then the test's own mixins
    /// (minus `remove_mixins`) are applied, then the builder's swarming and
    /// arguments are merged in, then waterfall and builder mixins are applied,
    /// then the builder-specific exception patch. Finally the swarming
    /// section is cleaned up, argument replacements are made and magic
    /// arguments are substituted.
    pub fn apply_common_transformations(
        &self,
        builder: BuilderContext<'_>,
        mut test: TestConfig,
        test_name: &str,
        options: TransformOptions,
    ) -> Result<TestConfig, ConfigError> {
        let tester = builder.config;
        let swarmable = options.swarmable && tester.use_swarming;
        swarming_mut(&mut test)?
            .entry(CAN_USE_ON_SWARMING_BUILDERS)
            .or_insert(Value::Bool(swarmable));

        let mixins_to_ignore = self.mixins.take_list(
            test.shift_remove("remove_mixins"),
            &format!("test {test_name} remove_mixins"),
        )?;

        resolve_os_conditional_values(&mut test, tester)?;

        let test_mixins = self
            .mixins
            .take_list(test.shift_remove("mixins"), &format!("test {test_name} mixins"))?;
        test = self
            .mixins
            .apply_all(test, &test_mixins, &mixins_to_ignore, Some(tester))?;

        dictionary_merge(swarming_mut(&mut test)?, &tester.swarming)?;
        if options.supports_args {
            args_mut(&mut test)?.extend(tester.args.iter().cloned());
        }

        let waterfall = builder.waterfall;
        self.mixins.ensure_valid(
            &waterfall.mixins,
            &format!("waterfall {} mixins", waterfall.name),
        )?;
        test = self
            .mixins
            .apply_all(test, &waterfall.mixins, &mixins_to_ignore, Some(tester))?;

        self.mixins
            .ensure_valid(&tester.mixins, &format!("builder {} mixins", builder.name))?;
        test = self
            .mixins
            .apply_all(test, &tester.mixins, &mixins_to_ignore, Some(tester))?;

        if let Some(modifications) = self.exceptions.modifications(&test, builder.name) {
            dictionary_merge(&mut test, modifications)?;
        }

        clean_swarming(&mut test);

        if tester.is_android() {
            default_android_build_type(&mut test);
        }

        self.exceptions
            .replace_test_args(&mut test, test_name, builder.name)?;

        match test.get("args") {
            Some(Value::Array(args)) if args.is_empty() => {
                test.shift_remove("args");
            }
            Some(_) => {
                substitute_magic_args(&mut test, builder.name, tester)?;
                canonicalize_args_in(&mut test, "args");
            }
            None => {}
        }

        Ok(test)
    }
}

fn swarming_mut(test: &mut TestConfig) -> Result<&mut TestConfig, ConfigError> {
    object_entry(test, "swarming")
        .ok_or_else(|| ConfigError::structural("\"swarming\" must be a dictionary"))
}

fn args_mut(test: &mut TestConfig) -> Result<&mut Vec<Value>, ConfigError> {
    array_entry(test, "args")
        .ok_or_else(|| ConfigError::structural("\"args\" must be a list"))
}

/// Drops the swarming section of tests that can't use swarming, and
/// redundant fields from the rest.
fn clean_swarming(test: &mut TestConfig) {
    let Some(swarming) = test.get_mut("swarming") else {
        return;
    };
    let Some(swarming) = swarming.as_object_mut().filter(|swarming| {
        is_truthy(swarming.get(CAN_USE_ON_SWARMING_BUILDERS))
    }) else {
        test.shift_remove("swarming");
        return;
    };

    let equals = |value: Option<&Value>, expected: f64| {
        value
            .and_then(|value| match value {
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                other => other.as_f64(),
            })
            .is_some_and(|n| n == expected)
    };
    if equals(swarming.get("shards"), 1.0) {
        swarming.shift_remove("shards");
    }
    if equals(swarming.get("hard_timeout"), 0.0) {
        swarming.shift_remove("hard_timeout");
    }
    swarming.shift_remove(CAN_USE_ON_SWARMING_BUILDERS);
}

/// Android tests on devices run on userdebug builds unless another build type
/// is asked for.
fn default_android_build_type(test: &mut TestConfig) {
    let Some(dimensions) = test
        .get_mut("swarming")
        .and_then(|swarming| swarming.get_mut("dimensions"))
        .and_then(Value::as_object_mut)
    else {
        return;
    };
    if dimensions.get("os").and_then(Value::as_str) == Some("Android")
        && !is_truthy(dimensions.get("device_os_type"))
    {
        dimensions.insert(
            "device_os_type".to_owned(),
            Value::String("userdebug".to_owned()),
        );
    }
}
