// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for bbgen-runner.

use crate::errors::ConfigError;
use serde_json::{Map, Value};

/// Flags whose repeated occurrences are folded into one, with the separator
/// used to join their values. Applied in this order.
const MERGED_FLAGS: [(&str, &str); 4] = [
    ("--enable-features=", ","),
    ("--extra-browser-args=", " "),
    ("--test-launcher-filter-file=", ";"),
    ("--extra-app-args=", ","),
];

/// Canonicalizes a command-line argument list.
///
/// Repeated occurrences of the flags in [`MERGED_FLAGS`] are folded into a
/// single occurrence at the position of the first one, e.g.
/// `--enable-features=A --enable-features=B` becomes `--enable-features=A,B`.
/// Arguments that aren't strings are left alone.
pub(crate) fn canonicalize_args(args: &mut Vec<Value>) {
    for (prefix, separator) in MERGED_FLAGS {
        merge_command_line_args(args, prefix, separator);
    }
}

fn merge_command_line_args(args: &mut Vec<Value>, prefix: &str, separator: &str) {
    let mut first_idx = None;
    let mut accumulated: Vec<String> = Vec::new();
    let mut idx = 0;
    while idx < args.len() {
        let value = args[idx].as_str().and_then(|flag| flag.strip_prefix(prefix));
        match value {
            Some(value) => {
                accumulated.extend(value.split(separator).map(str::to_owned));
                if first_idx.is_none() {
                    first_idx = Some(idx);
                    idx += 1;
                } else {
                    args.remove(idx);
                }
            }
            None => idx += 1,
        }
    }

    if let Some(first_idx) = first_idx {
        args[first_idx] = Value::String(format!("{prefix}{}", accumulated.join(separator)));
    }
}

/// Canonicalizes `map[key]` if it is an argument list.
pub(crate) fn canonicalize_args_in(map: &mut Map<String, Value>, key: &str) {
    if let Some(Value::Array(args)) = map.get_mut(key) {
        canonicalize_args(args);
    }
}

/// Deep-merges `overlay` into `base`.
///
/// * keys missing from `base` are copied over, unless the overlay value is null
/// * objects are merged recursively
/// * lists are concatenated, and canonicalized if the key ends with `args`
/// * a null overlay value deletes the key
/// * otherwise the overlay value replaces the base value
///
/// Merging a list or object with a value of a different shape is an error.
pub(crate) fn dictionary_merge(
    base: &mut Map<String, Value>,
    overlay: &Map<String, Value>,
) -> Result<(), ConfigError> {
    merge_impl(base, overlay, &mut Vec::new())
}

fn merge_impl<'a>(
    base: &mut Map<String, Value>,
    overlay: &'a Map<String, Value>,
    path: &mut Vec<&'a str>,
) -> Result<(), ConfigError> {
    for (key, new) in overlay {
        if new.is_null() {
            if base.get(key).is_some_and(|existing| !existing.is_null()) {
                base.shift_remove(key);
            }
            continue;
        }
        let Some(existing) = base.get_mut(key) else {
            base.insert(key.clone(), new.clone());
            continue;
        };

        match (existing, new) {
            (Value::Object(existing), Value::Object(new)) => {
                path.push(key);
                merge_impl(existing, new, path)?;
                path.pop();
            }
            (existing, new) if *existing == *new => {}
            (Value::Array(existing), Value::Array(new)) => {
                existing.extend(new.iter().cloned());
                if key.ends_with("args") {
                    canonicalize_args(existing);
                }
            }
            (existing, new) if shape_conflicts(existing, new) => {
                path.push(key);
                return Err(ConfigError::structural(format!(
                    "cannot merge {} into {} at `{}`",
                    shape_name(new),
                    shape_name(existing),
                    path.join("."),
                )));
            }
            (existing, new) => *existing = new.clone(),
        }
    }
    Ok(())
}

fn shape_conflicts(existing: &Value, new: &Value) -> bool {
    let is_container = |v: &Value| v.is_object() || v.is_array();
    if existing.is_null() {
        return false;
    }
    (is_container(existing) || is_container(new))
        && std::mem::discriminant(existing) != std::mem::discriminant(new)
}

pub(crate) fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a dictionary",
    }
}

/// Returns `map[key]` as an object, inserting an empty one if it is missing.
///
/// Returns `None` if the key holds something other than an object.
pub(crate) fn object_entry<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
) -> Option<&'a mut Map<String, Value>> {
    map.entry(key.to_owned())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

/// Returns `map[key]` as a list, inserting an empty one if it is missing.
///
/// Returns `None` if the key holds something other than a list.
pub(crate) fn array_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Vec<Value>> {
    map.entry(key.to_owned())
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
}

/// Returns the string elements of `map[key]` if it is a list.
pub(crate) fn string_list<'a>(map: &'a Map<String, Value>, key: &str) -> Vec<&'a str> {
    match map.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Returns true if a configuration value counts as set: not null, false,
/// zero or empty.
pub(crate) fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Returns the swarming dimensions of a test, if it has any.
pub(crate) fn dimensions(test: &Map<String, Value>) -> Option<&Map<String, Value>> {
    test.get("swarming")?.get("dimensions")?.as_object()
}

/// Returns a string-valued swarming dimension of a test.
pub(crate) fn dimension<'a>(test: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    dimensions(test)?.get(key)?.as_str()
}

/// Formats a value the way the configuration was written, for messages.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
