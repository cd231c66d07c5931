// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestConfig;
use serde::{Deserialize, Serialize};

/// A variant: an identifier-tagged partial test configuration used to fan
/// out one test into several differently configured tests.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Variant {
    /// Appended to the test name, separated by a space, to make expanded
    /// tests unique. Required by every variant used in a matrix suite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Disabled variants are skipped during expansion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Mixins attached to each expanded test.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<String>,

    /// Skylab fields copied onto each expanded test.
    #[serde(default, skip_serializing_if = "TestConfig::is_empty")]
    pub skylab: TestConfig,

    /// Everything else, applied to each test like a mixin.
    #[serde(flatten)]
    pub fragment: TestConfig,
}

impl Variant {
    /// Returns true unless the variant is explicitly disabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}
