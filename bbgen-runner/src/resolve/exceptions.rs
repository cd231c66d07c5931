// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    config::{TestConfig, TestException},
    errors::ConfigError,
};
use indexmap::IndexMap;
use itertools::Itertools;
use serde_json::Value;

/// Argument lists that replacements may target.
const REPLACEABLE_KEYS: [&str; 3] = ["args", "non_precommit_args", "precommit_args"];

/// The per-test exceptions from `test_suite_exceptions.pyl`.
///
/// Exceptions are looked up by the `name` field of a test, so tests expanded
/// from variants have exceptions of their own.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ExceptionSet<'cfg> {
    exceptions: &'cfg IndexMap<String, TestException>,
}

impl<'cfg> ExceptionSet<'cfg> {
    pub(crate) fn new(exceptions: &'cfg IndexMap<String, TestException>) -> Self {
        Self { exceptions }
    }

    fn for_test(&self, test: &TestConfig) -> Option<&'cfg TestException> {
        let name = test.get("name").and_then(Value::as_str)?;
        self.exceptions.get(name)
    }

    /// Returns false if the test's exception removes it from `tester_name`.
    ///
    /// A removal entry matches either the bare builder name or
    /// `"<builder> <waterfall>"`, for builders whose names are shared between
    /// waterfalls.
    pub(crate) fn should_run_on_tester(
        &self,
        waterfall_name: &str,
        tester_name: &str,
        test: &TestConfig,
    ) -> bool {
        let Some(exception) = self.for_test(test) else {
            return true;
        };
        let remove_from = &exception.remove_from;
        if remove_from.is_empty() {
            return true;
        }
        if remove_from.iter().any(|r| r == tester_name) {
            return false;
        }
        let qualified = format!("{tester_name} {waterfall_name}");
        !remove_from.contains(&qualified)
    }

    /// Returns the patch to merge into the test on `tester_name`.
    pub(crate) fn modifications(&self, test: &TestConfig, tester_name: &str) -> Option<&'cfg TestConfig> {
        self.for_test(test)?.modifications.get(tester_name)
    }

    /// Applies the argument replacements configured for the test on
    /// `tester_name`.
    ///
    /// A replacement matches the first argument that either equals the flag
    /// (the value is the next argument) or starts with `<flag>=`. A `None`
    /// value removes the flag.
    pub(crate) fn replace_test_args(
        &self,
        test: &mut TestConfig,
        test_name: &str,
        tester_name: &str,
    ) -> Result<(), ConfigError> {
        let Some(replacements) = self
            .for_test(test)
            .and_then(|exception| exception.replacements.get(tester_name))
        else {
            return Ok(());
        };

        for (key, flags) in replacements {
            if !REPLACEABLE_KEYS.contains(&key.as_str()) {
                return Err(ConfigError::structural(format!(
                    "Given replacement key {key} for {test_name} on {tester_name} is not in \
                     the list of valid keys [{}]",
                    REPLACEABLE_KEYS.iter().map(|k| format!("'{k}'")).join(", ")
                )));
            }

            for (flag, replacement) in flags {
                let mut empty = Vec::new();
                let args = match test.get_mut(key.as_str()) {
                    Some(Value::Array(args)) => args,
                    _ => &mut empty,
                };
                if !replace_arg(args, flag, replacement.as_deref(), test_name, tester_name)? {
                    return Err(ConfigError::target_not_found(format!(
                        "Could not find {flag} in existing list of values for key {key} in \
                         {test_name} on {tester_name}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Returns false if the flag isn't in `args`.
fn replace_arg(
    args: &mut Vec<Value>,
    flag: &str,
    replacement: Option<&str>,
    test_name: &str,
    tester_name: &str,
) -> Result<bool, ConfigError> {
    let with_value = format!("{flag}=");
    for idx in 0..args.len() {
        let Some(arg) = args[idx].as_str() else {
            continue;
        };
        if arg == flag {
            match replacement {
                None => {
                    args.remove(idx);
                }
                Some(value) => {
                    let next = args.get_mut(idx + 1).ok_or_else(|| {
                        ConfigError::target_not_found(format!(
                            "Flag {flag} has no value to replace in {test_name} on {tester_name}"
                        ))
                    })?;
                    *next = Value::String(value.to_owned());
                }
            }
            return Ok(true);
        }
        if arg.starts_with(&with_value) {
            match replacement {
                None => {
                    args.remove(idx);
                }
                Some(value) => args[idx] = Value::String(format!("{flag}={value}")),
            }
            return Ok(true);
        }
    }
    Ok(false)
}
