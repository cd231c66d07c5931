// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ConfigError;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Deserialize;
use serde_json::{Map, Value};

/// An entry in the GN isolate map.
#[derive(Clone, Debug, Deserialize)]
pub struct IsolateMapEntry {
    /// The GN label of the target, like `//base:base_unittests`.
    pub label: String,

    /// Other fields (`type`, `args`, ...), which bbgen doesn't interpret.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl IsolateMapEntry {
    /// Returns the test id prefix for tests using this isolate.
    pub fn test_id_prefix(&self) -> String {
        format!("ninja:{}/", self.label)
    }

    /// Checks that the label names its target explicitly and that the
    /// target matches `key`.
    pub(crate) fn validate_label(&self, key: &str) -> Result<(), ConfigError> {
        let mut parts = self.label.split(':');
        let (Some(_), Some(target), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ConfigError::structural(format!(
                "Malformed GN label \"{}\" in gn_isolate_map for key \"{key}\", \
                 implicit names (like //f/b meaning //f/b:b) are disallowed.",
                self.label
            )));
        };
        if target != key {
            return Err(ConfigError::structural(format!(
                "gn_isolate_map key name \"{key}\" doesn't match GN target name in \
                 label \"{}\" see http://crbug.com/1071091 for details.",
                self.label
            )));
        }
        Ok(())
    }
}

/// The GN isolate map: isolate name to GN target.
#[derive(Clone, Debug, Default)]
pub struct IsolateMap {
    entries: IndexMap<String, IsolateMapEntry>,
}

impl IsolateMap {
    pub(crate) fn new(entries: IndexMap<String, IsolateMapEntry>) -> Self {
        Self { entries }
    }

    /// Merges the entries of another map file into this one. Keys may only be
    /// defined in one file.
    pub(crate) fn merge(
        &mut self,
        other: IndexMap<String, IsolateMapEntry>,
    ) -> Result<(), ConfigError> {
        let duplicates: Vec<_> = other
            .keys()
            .filter(|key| self.entries.contains_key(*key))
            .sorted()
            .collect();
        if !duplicates.is_empty() {
            return Err(ConfigError::structural(format!(
                "Duplicate targets in isolate map files: {}.",
                duplicates.iter().join(", ")
            )));
        }
        self.entries.extend(other);
        Ok(())
    }

    /// Looks up an isolate.
    pub fn get(&self, name: &str) -> Option<&IsolateMapEntry> {
        self.entries.get(name)
    }

    /// Returns the number of isolates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
