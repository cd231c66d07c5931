// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

/// A kind of test a builder can run, as named in `waterfalls.pyl`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TestCategory {
    /// GPU Telemetry tests run in Android WebView.
    AndroidWebviewGpuTelemetryTests,
    /// GPU Telemetry tests run in the Cast Streaming shell.
    CastStreamingTests,
    /// GPU Telemetry tests.
    GpuTelemetryTests,
    /// Tests using GoogleTest.
    GtestTests,
    /// Tests run through an isolated script.
    IsolatedScripts,
    /// JUnit tests run on the host.
    JunitTests,
    /// Scripts run on the builder itself.
    Scripts,
    /// ChromeOS tests run in Skylab.
    SkylabTests,
    /// GPU Telemetry tests run in Skylab.
    SkylabGpuTelemetryTests,
}

impl TestCategory {
    /// All categories.
    pub const ALL: [Self; 9] = [
        Self::AndroidWebviewGpuTelemetryTests,
        Self::CastStreamingTests,
        Self::GpuTelemetryTests,
        Self::GtestTests,
        Self::IsolatedScripts,
        Self::JunitTests,
        Self::Scripts,
        Self::SkylabTests,
        Self::SkylabGpuTelemetryTests,
    ];

    /// The name used in configuration.
    pub fn name(self) -> &'static str {
        match self {
            Self::AndroidWebviewGpuTelemetryTests => "android_webview_gpu_telemetry_tests",
            Self::CastStreamingTests => "cast_streaming_tests",
            Self::GpuTelemetryTests => "gpu_telemetry_tests",
            Self::GtestTests => "gtest_tests",
            Self::IsolatedScripts => "isolated_scripts",
            Self::JunitTests => "junit_tests",
            Self::Scripts => "scripts",
            Self::SkylabTests => "skylab_tests",
            Self::SkylabGpuTelemetryTests => "skylab_gpu_telemetry_tests",
        }
    }

    /// Parses a category name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.name() == name)
    }

    /// The category tests of this kind are listed under in generated files.
    ///
    /// GPU Telemetry tests are specialized isolated scripts, and Skylab GPU
    /// tests specialized Skylab tests.
    pub fn output_category(self) -> Self {
        match self {
            Self::AndroidWebviewGpuTelemetryTests
            | Self::CastStreamingTests
            | Self::GpuTelemetryTests => Self::IsolatedScripts,
            Self::SkylabGpuTelemetryTests => Self::SkylabTests,
            other => other,
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn names_round_trip() {
        for category in TestCategory::ALL {
            assert_eq!(TestCategory::parse(category.name()), Some(category));
        }
        assert_eq!(TestCategory::parse("instrumentation_tests"), None);
    }

    #[test_case(TestCategory::GpuTelemetryTests, "isolated_scripts")]
    #[test_case(TestCategory::AndroidWebviewGpuTelemetryTests, "isolated_scripts")]
    #[test_case(TestCategory::CastStreamingTests, "isolated_scripts")]
    #[test_case(TestCategory::SkylabGpuTelemetryTests, "skylab_tests")]
    #[test_case(TestCategory::GtestTests, "gtest_tests")]
    #[test_case(TestCategory::Scripts, "scripts")]
    fn output_categories(category: TestCategory, expected: &str) {
        assert_eq!(category.output_category().name(), expected);
    }
}
