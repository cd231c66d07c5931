// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fields that only apply on some platforms, like `mac_args` or
//! `android_swarming`.

use crate::{
    config::{BuilderConfig, TestConfig},
    errors::ConfigError,
    helpers::{array_entry, dictionary_merge, is_truthy, object_entry, shape_name},
};
use serde_json::Value;

#[derive(Copy, Clone, Debug)]
enum Platform {
    Android,
    ChromeOs,
    Desktop,
    Lacros,
    Linux,
    Mac,
    Win,
    Win64,
}

impl Platform {
    fn matches(self, builder: &BuilderConfig) -> bool {
        match self {
            Self::Android => builder.is_android(),
            Self::ChromeOs => builder.is_chromeos(),
            // Anything that isn't Android.
            Self::Desktop => !builder.is_android(),
            Self::Lacros => builder.is_lacros(),
            Self::Linux => builder.is_linux(),
            Self::Mac => builder.is_mac(),
            Self::Win => builder.is_win(),
            Self::Win64 => builder.is_win64(),
        }
    }
}

/// Keys holding swarming settings for a single platform. They are merged in
/// this order, so a later platform's value wins when several apply.
pub(crate) const CONDITIONAL_SWARMING_KEYS: [&str; 7] = [
    "android_swarming",
    "chromeos_swarming",
    "lacros_swarming",
    "linux_swarming",
    "mac_swarming",
    "win_swarming",
    "win64_swarming",
];

const CONDITIONAL_SWARMING: [(&str, Platform); 7] = [
    (CONDITIONAL_SWARMING_KEYS[0], Platform::Android),
    (CONDITIONAL_SWARMING_KEYS[1], Platform::ChromeOs),
    (CONDITIONAL_SWARMING_KEYS[2], Platform::Lacros),
    (CONDITIONAL_SWARMING_KEYS[3], Platform::Linux),
    (CONDITIONAL_SWARMING_KEYS[4], Platform::Mac),
    (CONDITIONAL_SWARMING_KEYS[5], Platform::Win),
    (CONDITIONAL_SWARMING_KEYS[6], Platform::Win64),
];

const CONDITIONAL_ARGS: [(&str, Platform); 8] = [
    ("desktop_args", Platform::Desktop),
    ("lacros_args", Platform::Lacros),
    ("linux_args", Platform::Linux),
    ("android_args", Platform::Android),
    ("chromeos_args", Platform::ChromeOs),
    ("mac_args", Platform::Mac),
    ("win_args", Platform::Win),
    ("win64_args", Platform::Win64),
];

/// Removes every platform-conditional field from `test`, folding the ones
/// that apply to `builder` into `swarming` and `args`.
pub(crate) fn resolve_os_conditional_values(
    test: &mut TestConfig,
    builder: &BuilderConfig,
) -> Result<(), ConfigError> {
    for (key, platform) in CONDITIONAL_SWARMING {
        let Some(value) = test.shift_remove(key) else {
            continue;
        };
        if !is_truthy(Some(&value)) || !platform.matches(builder) {
            continue;
        }
        let Value::Object(overlay) = value else {
            return Err(ConfigError::structural(format!(
                "\"{key}\" must be a dictionary, got {}",
                shape_name(&value)
            )));
        };
        let swarming = object_entry(test, "swarming")
            .ok_or_else(|| ConfigError::structural("\"swarming\" must be a dictionary"))?;
        dictionary_merge(swarming, &overlay)?;
    }

    for (key, platform) in CONDITIONAL_ARGS {
        let Some(value) = test.shift_remove(key) else {
            continue;
        };
        if !platform.matches(builder) {
            continue;
        }
        let extra = match value {
            Value::Null => Vec::new(),
            Value::Array(extra) => extra,
            other => {
                return Err(ConfigError::structural(format!(
                    "\"{key}\" must be a list, got {}",
                    shape_name(&other)
                )));
            }
        };
        array_entry(test, "args")
            .ok_or_else(|| ConfigError::structural("\"args\" must be a list"))?
            .extend(extra);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    fn resolve(test: Value, builder: Value) -> Value {
        let mut test = test.as_object().cloned().expect("test is an object");
        let builder: BuilderConfig = serde_json::from_value(builder).expect("valid builder");
        resolve_os_conditional_values(&mut test, &builder).expect("resolution succeeds");
        Value::Object(test)
    }

    fn all_conditional_args() -> Value {
        json!({
            "args": ["--base"],
            "desktop_args": ["--desktop"],
            "lacros_args": ["--lacros"],
            "linux_args": ["--linux"],
            "android_args": ["--android"],
            "chromeos_args": ["--chromeos"],
            "mac_args": ["--mac"],
            "win_args": ["--win"],
            "win64_args": ["--win64"],
        })
    }

    #[test_case(json!({"os_type": "linux"}), json!(["--base", "--desktop", "--linux"]); "linux")]
    #[test_case(json!({"os_type": "android"}), json!(["--base", "--android"]); "android")]
    #[test_case(json!({"os_type": "chromeos"}), json!(["--base", "--desktop", "--chromeos"]); "chromeos")]
    #[test_case(
        json!({"os_type": "win", "browser_config": "release_x64"}),
        json!(["--base", "--desktop", "--win", "--win64"])
        ; "win64"
    )]
    #[test_case(json!({}), json!(["--base", "--desktop"]); "unknown os")]
    fn conditional_args(builder: Value, expected: Value) {
        assert_eq!(resolve(all_conditional_args(), builder), json!({"args": expected}));
    }

    #[test]
    fn conditional_swarming() {
        let test = json!({
            "swarming": {"dimensions": {"os": "Ubuntu"}, "shards": 2},
            "android_swarming": {"dimensions": {"device_type": "walleye"}, "shards": 4},
            "chromeos_swarming": {"shards": 8},
        });
        assert_eq!(
            resolve(test.clone(), json!({"os_type": "android"})),
            json!({"swarming": {"dimensions": {"os": "Ubuntu", "device_type": "walleye"}, "shards": 4}}),
        );
        assert_eq!(
            resolve(test, json!({"os_type": "mac"})),
            json!({"swarming": {"dimensions": {"os": "Ubuntu"}, "shards": 2}}),
        );
    }

    #[test_case(json!({"os_type": "linux"}), json!({"shards": 4}); "linux")]
    #[test_case(json!({"os_type": "mac"}), json!({"shards": 9, "dimensions": {"cpu": "arm64"}}); "mac")]
    #[test_case(json!({"os_type": "win"}), json!({"shards": 3}); "win")]
    #[test_case(
        json!({"os_type": "win", "browser_config": "release_x64"}),
        json!({"shards": 6})
        ; "win64 after win"
    )]
    fn desktop_conditional_swarming(builder: Value, expected: Value) {
        let test = json!({
            "swarming": {},
            "linux_swarming": {"shards": 4},
            "mac_swarming": {"shards": 9, "dimensions": {"cpu": "arm64"}},
            "win_swarming": {"shards": 3},
            "win64_swarming": {"shards": 6},
        });
        assert_eq!(resolve(test, builder), json!({"swarming": expected}));
    }

    #[test]
    fn empty_values_are_dropped() {
        let test = json!({"android_swarming": {}, "android_args": null});
        assert_eq!(resolve(test, json!({"os_type": "android"})), json!({"args": []}));
    }

    #[test]
    fn non_list_args_are_rejected() {
        let mut test = json!({"mac_args": "--oops"}).as_object().cloned().unwrap();
        let builder: BuilderConfig = serde_json::from_value(json!({"os_type": "mac"})).unwrap();
        let err = resolve_os_conditional_values(&mut test, &builder).expect_err("not a list");
        assert_eq!(err.message(), "\"mac_args\" must be a list, got a string");
    }
}
