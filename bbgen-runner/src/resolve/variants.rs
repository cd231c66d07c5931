// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::mixins::apply_mixin;
use crate::{
    config::{BasicSuite, TestConfig, Variant, VariantRef},
    errors::ConfigError,
};
use indexmap::IndexMap;
use serde_json::Value;

/// Skylab fields that describe the image rather than the test, and are not
/// copied onto expanded tests.
const SKYLAB_IMAGE_ONLY_FIELDS: [&str; 1] = ["cros_chrome_version"];

/// Expands every test in `basic` once per enabled variant.
///
/// Returns test name to expanded configurations, in variant order. Each
/// expansion is named `"<test> <identifier>"` and carries the variant's
/// identifier as `variant_id`. Its `mixins` are the test's, then the
/// variant's, then `extra_mixins`.
pub(crate) fn resolve_variants(
    basic: &BasicSuite,
    refs: &[VariantRef],
    extra_mixins: &[String],
    all_variants: &IndexMap<String, Variant>,
) -> Result<IndexMap<String, Vec<TestConfig>>, ConfigError> {
    let mut expanded: IndexMap<String, Vec<TestConfig>> = IndexMap::new();

    for variant_ref in refs {
        let variant = match variant_ref {
            VariantRef::Named(name) => all_variants.get(name).ok_or_else(|| {
                ConfigError::unknown_reference(format!(
                    "Missing variant definition for {name} in variants.pyl"
                ))
            })?,
            VariantRef::Inline(variant) => variant,
        };
        if !variant.is_enabled() {
            continue;
        }
        let identifier = variant.identifier.as_deref().ok_or_else(|| {
            ConfigError::structural(format!(
                "Missing required identifier field in variant {}",
                variant_ref.key()
            ))
        })?;

        for (test_name, test) in basic {
            let mut new_test = apply_mixin(&variant.fragment, test, None)?;

            let mixins: Vec<Value> = mixin_names(test)
                .chain(variant.mixins.iter().map(String::as_str))
                .chain(extra_mixins.iter().map(String::as_str))
                .map(|name| Value::String(name.to_owned()))
                .collect();
            new_test.insert("mixins".to_owned(), Value::Array(mixins));
            new_test.insert(
                "name".to_owned(),
                Value::String(format!("{test_name} {identifier}")),
            );
            new_test.insert("variant_id".to_owned(), Value::String(identifier.to_owned()));

            for (key, value) in &variant.skylab {
                if !SKYLAB_IMAGE_ONLY_FIELDS.contains(&key.as_str()) {
                    new_test.insert(key.clone(), value.clone());
                }
            }
            if !variant.skylab.is_empty() && !new_test.contains_key("autotest_name") {
                new_test.insert(
                    "autotest_name".to_owned(),
                    Value::String(autotest_name(test).to_owned()),
                );
            }

            expanded.entry(test_name.clone()).or_default().push(new_test);
        }
    }

    Ok(expanded)
}

fn mixin_names(test: &TestConfig) -> impl Iterator<Item = &str> {
    test.get("mixins")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

/// The wrapper Skylab runs a test with.
fn autotest_name(test: &TestConfig) -> &'static str {
    if test.contains_key("tast_expr") {
        let is_lacros = test
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| name.contains("lacros"));
        if is_lacros {
            "tast.lacros-from-gcs"
        } else {
            "tast.chrome-from-gcs"
        }
    } else if test.contains_key("benchmark") {
        "chromium_Telemetry"
    } else {
        "chromium"
    }
}
