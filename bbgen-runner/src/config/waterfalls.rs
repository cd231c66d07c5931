// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestConfig;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// A waterfall (builder group) from `waterfalls.pyl`.
#[derive(Clone, Debug, Deserialize)]
pub struct Waterfall {
    /// The waterfall name, also the name of its generated file.
    pub name: String,

    /// Builder name to builder configuration, in file order.
    #[serde(default)]
    pub machines: IndexMap<String, BuilderConfig>,

    /// Mixins applied to every test on every builder of this waterfall.
    #[serde(default)]
    pub mixins: Vec<String>,

    /// If true, no builder on this waterfall may run script tests.
    #[serde(default)]
    pub forbid_script_tests: bool,
}

/// The configuration of a single builder (tester).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BuilderConfig {
    /// The operating system tests run on: `android`, `chromeos`, `fuchsia`,
    /// `lacros`, `linux`, `mac` or `win`.
    #[serde(default)]
    pub os_type: Option<String>,

    /// The browser configuration, for example `release` or `release_x64`.
    #[serde(default)]
    pub browser_config: Option<String>,

    /// Mixins applied to every test on this builder.
    #[serde(default)]
    pub mixins: Vec<String>,

    /// Swarming settings merged into every test.
    #[serde(default)]
    pub swarming: TestConfig,

    /// Arguments appended to every test that accepts arguments.
    #[serde(default)]
    pub args: Vec<Value>,

    /// Test category to suite name.
    #[serde(default)]
    pub test_suites: IndexMap<String, String>,

    /// Compile targets copied verbatim into the output.
    #[serde(default)]
    pub additional_compile_targets: Option<Value>,

    /// Whether tests on this builder run on swarming.
    #[serde(default = "default_true")]
    pub use_swarming: bool,

    /// If true, script tests may not be scheduled on this builder.
    #[serde(default)]
    pub forbid_script_tests: bool,

    /// Storage bucket for Android test result details.
    #[serde(default)]
    pub results_bucket: Option<String>,

    /// If true, Android presentation args don't install a merge script.
    #[serde(default)]
    pub skip_merge_script: bool,

    /// If true, isolated scripts on Android get presentation args.
    #[serde(default)]
    pub use_android_presentation: bool,

    /// The ChromeOS board Skylab tests run on.
    #[serde(default)]
    pub cros_board: Option<Value>,

    /// The ChromeOS model Skylab tests run on.
    #[serde(default)]
    pub cros_model: Option<Value>,

    /// The device pool Skylab tests are scheduled in.
    #[serde(default)]
    pub cros_dut_pool: Option<Value>,

    /// Whether Skylab tests run via CFT.
    #[serde(default)]
    pub run_cft: Option<Value>,
}

fn default_true() -> bool {
    true
}

// Platform predicates, keyed on `os_type`.
impl BuilderConfig {
    fn os_type_is(&self, os_type: &str) -> bool {
        self.os_type.as_deref() == Some(os_type)
    }

    /// Returns true if `os_type` is `android`.
    pub fn is_android(&self) -> bool {
        self.os_type_is("android")
    }

    /// Returns true if `os_type` is `chromeos`.
    pub fn is_chromeos(&self) -> bool {
        self.os_type_is("chromeos")
    }

    /// Returns true if `os_type` is `fuchsia`.
    pub fn is_fuchsia(&self) -> bool {
        self.os_type_is("fuchsia")
    }

    /// Returns true if `os_type` is `lacros`.
    pub fn is_lacros(&self) -> bool {
        self.os_type_is("lacros")
    }

    /// Returns true if `os_type` is `linux`.
    pub fn is_linux(&self) -> bool {
        self.os_type_is("linux")
    }

    /// Returns true if `os_type` is `mac`.
    pub fn is_mac(&self) -> bool {
        self.os_type_is("mac")
    }

    /// Returns true if `os_type` is `win`.
    pub fn is_win(&self) -> bool {
        self.os_type_is("win")
    }

    /// 64-bit Windows: `win` with the `release_x64` browser configuration.
    pub fn is_win64(&self) -> bool {
        self.is_win() && self.browser_config.as_deref() == Some("release_x64")
    }

    /// Returns true if this builder runs a desktop OS.
    pub fn is_desktop(&self) -> bool {
        self.is_lacros() || self.is_linux() || self.is_mac() || self.is_win()
    }

    /// Returns true for ChromeOS builders that run tests through Skylab
    /// rather than swarming.
    pub fn is_skylab(&self) -> bool {
        self.browser_config.as_deref() == Some("cros-chrome") && !self.use_swarming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_defaults() {
        let builder: BuilderConfig = serde_json::from_value(json!({})).expect("valid builder");
        assert!(builder.use_swarming, "swarming is used by default");
        assert!(builder.mixins.is_empty());
        assert!(!builder.is_desktop());
    }

    #[test]
    fn os_predicates() {
        let builder: BuilderConfig = serde_json::from_value(json!({
            "os_type": "win",
            "browser_config": "release_x64",
        }))
        .expect("valid builder");
        assert!(builder.is_win());
        assert!(builder.is_win64());
        assert!(builder.is_desktop());
        assert!(!builder.is_android());

        let builder: BuilderConfig = serde_json::from_value(json!({
            "os_type": "win",
            "browser_config": "release",
        }))
        .expect("valid builder");
        assert!(!builder.is_win64());
    }
}
