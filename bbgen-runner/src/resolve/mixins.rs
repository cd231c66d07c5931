// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::conditionals::resolve_os_conditional_values;
use crate::{
    config::{BuilderConfig, Mixin, TestConfig},
    errors::ConfigError,
    helpers::{array_entry, canonicalize_args_in, display_value, object_entry},
};
use indexmap::IndexMap;
use serde_json::Value;

const MIXIN_ARG_KEYS: [&str; 3] = ["args", "precommit_args", "non_precommit_args"];

/// Applies a mixin to a test, returning the new test.
///
/// Fields are copied from the mixin into the test, except:
///
/// * `description` is appended to the test's description on a new line.
/// * In `swarming`, `dimensions` are updated key by key and `named_caches` are
///   appended to. Other swarming fields replace the test's.
/// * The argument lists `args`, `precommit_args` and `non_precommit_args`
///   are appended to.
///
/// If `builder` is given, platform-conditional fields are resolved for it
/// afterwards.
pub fn apply_mixin(
    mixin: &Mixin,
    test: &TestConfig,
    builder: Option<&BuilderConfig>,
) -> Result<TestConfig, ConfigError> {
    let mut new_test = test.clone();
    let mut mixin = mixin.clone();

    if let Some(description) = mixin.shift_remove("description") {
        let joined = match new_test.get("description") {
            Some(existing) => format!("{}\n{}", display_value(existing), display_value(&description)),
            None => display_value(&description),
        };
        new_test.insert("description".to_owned(), Value::String(joined));
    }

    if let Some(swarming_mixin) = mixin.shift_remove("swarming") {
        let Value::Object(mut swarming_mixin) = swarming_mixin else {
            return Err(ConfigError::structural("\"swarming\" must be a dictionary"));
        };
        let swarming = object_entry(&mut new_test, "swarming")
            .ok_or_else(|| ConfigError::structural("\"swarming\" must be a dictionary"))?;

        if let Some(dimensions) = swarming_mixin.shift_remove("dimensions") {
            let Value::Object(dimensions) = dimensions else {
                return Err(ConfigError::structural("\"dimensions\" must be a dictionary"));
            };
            object_entry(swarming, "dimensions")
                .ok_or_else(|| ConfigError::structural("\"dimensions\" must be a dictionary"))?
                .extend(dimensions);
        }
        if let Some(named_caches) = swarming_mixin.shift_remove("named_caches") {
            let Value::Array(named_caches) = named_caches else {
                return Err(ConfigError::structural("\"named_caches\" must be a list"));
            };
            array_entry(swarming, "named_caches")
                .ok_or_else(|| ConfigError::structural("\"named_caches\" must be a list"))?
                .extend(named_caches);
        }
        swarming.extend(swarming_mixin);
    }

    for key in MIXIN_ARG_KEYS {
        match mixin.shift_remove(key) {
            None | Some(Value::Null) => {}
            Some(Value::Array(values)) => {
                array_entry(&mut new_test, key)
                    .ok_or_else(|| ConfigError::structural(format!("\"{key}\" must be a list")))?
                    .extend(values);
            }
            Some(_) => {
                return Err(ConfigError::structural(format!("\"{key}\" must be a list")));
            }
        }
    }

    // Conditional fields are resolved before any mixin is applied, so
    // whatever remains can overwrite the test's.
    new_test.extend(mixin);
    if let Some(builder) = builder {
        resolve_os_conditional_values(&mut new_test, builder)?;
    }

    canonicalize_args_in(&mut new_test, "args");
    Ok(new_test)
}

/// The mixins defined in `mixins.pyl`, and operations on lists of mixin
/// names.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MixinSet<'cfg> {
    mixins: &'cfg IndexMap<String, Mixin>,
}

impl<'cfg> MixinSet<'cfg> {
    pub(crate) fn new(mixins: &'cfg IndexMap<String, Mixin>) -> Self {
        Self { mixins }
    }

    /// Interprets a value taken out of a test as a list of mixin names and
    /// checks that every name is defined.
    ///
    /// A missing value is an empty list.
    pub(crate) fn take_list(
        &self,
        value: Option<Value>,
        location: &str,
    ) -> Result<Vec<String>, ConfigError> {
        let names = match value {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(name) => Ok(name.clone()),
                    other => Err(ConfigError::unknown_reference(format!(
                        "bad mixin {}: {location}",
                        display_value(other)
                    ))),
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(ConfigError::structural(format!(
                    "got '{}', should be a list of mixin names: {location}",
                    display_value(&other)
                )));
            }
        };
        self.ensure_valid(&names, location)?;
        Ok(names)
    }

    /// Checks that every name in `names` is a defined mixin.
    pub(crate) fn ensure_valid(&self, names: &[String], location: &str) -> Result<(), ConfigError> {
        match names.iter().find(|name| !self.mixins.contains_key(*name)) {
            Some(name) => Err(ConfigError::unknown_reference(format!(
                "bad mixin {name}: {location}"
            ))),
            None => Ok(()),
        }
    }

    /// Applies the named mixins in order, skipping those in `ignore`.
    pub(crate) fn apply_all(
        &self,
        mut test: TestConfig,
        names: &[String],
        ignore: &[String],
        builder: Option<&BuilderConfig>,
    ) -> Result<TestConfig, ConfigError> {
        for name in names {
            if ignore.contains(name) {
                continue;
            }
            let mixin = self.mixins.get(name).ok_or_else(|| {
                ConfigError::unknown_reference(format!("bad mixin {name}"))
            })?;
            test = apply_mixin(mixin, &test, builder)?;
        }
        Ok(test)
    }
}
