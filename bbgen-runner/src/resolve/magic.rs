// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    config::{BuilderConfig, TestConfig},
    errors::ConfigError,
    helpers::{canonicalize_args, dimension, display_value},
};
use serde_json::Value;
use std::fmt;
use tracing::trace;

/// Arguments starting with this prefix are replaced by the output of the
/// named [`MagicSubstitution`].
pub const MAGIC_SUBSTITUTION_PREFIX: &str = "$$MAGIC_SUBSTITUTION_";

/// Device types whose devices are not rooted.
const UNROOTED_DEVICE_TYPES: [&str; 2] = ["a13", "a23"];

/// A substitution that expands a placeholder argument into arguments computed
/// from the test and the builder it runs on.
///
/// Written in configuration as `$$MAGIC_SUBSTITUTION_<name>`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MagicSubstitution {
    /// How Telemetry reaches the ChromeOS device under test.
    ChromeOsTelemetryRemote,
    /// The gtest filter file for the ChromeOS board the test runs on.
    ChromeOsGtestFilterFile,
    /// The vendor ids of the GPUs the test runs on.
    GpuExpectedVendorId,
    /// The device ids of the GPUs the test runs on.
    GpuExpectedDeviceId,
    /// How many browsers GPU tests run in parallel.
    GpuParallelJobs,
    /// Relaxes the rooted-device requirement on unrooted Android devices.
    GpuTelemetryNoRootForUnrootedDevices,
}

impl MagicSubstitution {
    /// All substitutions.
    pub const ALL: [Self; 6] = [
        Self::ChromeOsTelemetryRemote,
        Self::ChromeOsGtestFilterFile,
        Self::GpuExpectedVendorId,
        Self::GpuExpectedDeviceId,
        Self::GpuParallelJobs,
        Self::GpuTelemetryNoRootForUnrootedDevices,
    ];

    /// The name used in configuration.
    pub fn name(self) -> &'static str {
        match self {
            Self::ChromeOsTelemetryRemote => "ChromeOSTelemetryRemote",
            Self::ChromeOsGtestFilterFile => "ChromeOSGtestFilterFile",
            Self::GpuExpectedVendorId => "GPUExpectedVendorId",
            Self::GpuExpectedDeviceId => "GPUExpectedDeviceId",
            Self::GpuParallelJobs => "GPUParallelJobs",
            Self::GpuTelemetryNoRootForUnrootedDevices => "GPUTelemetryNoRootForUnrootedDevices",
        }
    }

    /// Looks up a substitution by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Parses an argument. Returns `None` if it isn't a magic substitution
    /// at all, and an error if it names an unknown one.
    pub(crate) fn parse_arg(arg: &str) -> Option<Result<Self, ConfigError>> {
        let name = arg.strip_prefix(MAGIC_SUBSTITUTION_PREFIX)?;
        Some(Self::from_name(name).ok_or_else(|| {
            ConfigError::unknown_reference(format!(
                "Magic substitution function {name} does not exist"
            ))
        }))
    }

    /// Computes the arguments this substitution expands to for `test` on the
    /// builder called `tester_name`.
    pub fn expand(
        self,
        test: &TestConfig,
        tester_name: &str,
        tester: &BuilderConfig,
    ) -> Vec<String> {
        trace!(substitution = %self, builder = tester_name, "expanding magic argument");
        match self {
            Self::ChromeOsTelemetryRemote => {
                if tester.is_skylab() {
                    // Skylab picks the device itself.
                    Vec::new()
                } else if dimension(test, "device_type").is_some() {
                    vec!["--remote=variable_chromeos_device_hostname".to_owned()]
                } else {
                    // Tests on VMs reach the guest through a forwarded port.
                    vec!["--remote=127.0.0.1".to_owned(), "--remote-ssh-port=9222".to_owned()]
                }
            }
            Self::ChromeOsGtestFilterFile => {
                let board = tester
                    .cros_board
                    .as_ref()
                    .or_else(|| test.get("cros_board"))
                    .map(display_value)
                    .or_else(|| dimension(test, "device_type").map(str::to_owned))
                    .unwrap_or_else(|| "amd64-generic".to_owned());
                let name = test
                    .get("test")
                    .or_else(|| test.get("name"))
                    .map(display_value)
                    .unwrap_or_default();
                vec![format!(
                    "--test-launcher-filter-file=../../testing/buildbot/filters/chromeos.{board}.{name}.filter"
                )]
            }
            Self::GpuExpectedVendorId => gpu_id_args(test, "--expected-vendor-id", |gpu| gpu.vendor),
            Self::GpuExpectedDeviceId => gpu_id_args(test, "--expected-device-id", |gpu| gpu.device),
            Self::GpuParallelJobs => {
                let jobs = if tester.is_desktop() { 4 } else { 1 };
                vec![format!("--jobs={jobs}")]
            }
            Self::GpuTelemetryNoRootForUnrootedDevices => {
                match dimension(test, "device_type") {
                    Some(device_type) if UNROOTED_DEVICE_TYPES.contains(&device_type) => {
                        vec!["--compatibility-mode=dont-require-rooted-device".to_owned()]
                    }
                    _ => Vec::new(),
                }
            }
        }
    }
}

impl fmt::Display for MagicSubstitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MAGIC_SUBSTITUTION_PREFIX}{}", self.name())
    }
}

/// A GPU from the `gpu` dimension, like `10de:1cb3-27.21.14.5638`.
struct GpuId<'a> {
    vendor: &'a str,
    device: &'a str,
}

/// Parses the `gpu` dimension, which may list alternatives separated by `|`.
fn gpus(test: &TestConfig) -> Vec<GpuId<'_>> {
    let Some(gpu) = dimension(test, "gpu") else {
        return Vec::new();
    };
    gpu.split('|')
        .filter(|gpu| !gpu.is_empty() && *gpu != "none")
        .map(|gpu| {
            // Strip the driver version.
            let gpu = gpu.split('-').next().unwrap_or(gpu);
            let mut parts = gpu.split(':');
            GpuId {
                vendor: parts.next().unwrap_or("0"),
                device: parts.next().unwrap_or("0"),
            }
        })
        .collect()
}

fn gpu_id_args(test: &TestConfig, flag: &str, id: impl for<'a, 'b> Fn(&'b GpuId<'a>) -> &'a str) -> Vec<String> {
    let gpus = gpus(test);
    if gpus.is_empty() {
        return vec![flag.to_owned(), "0".to_owned()];
    }
    gpus.iter()
        .flat_map(|gpu| [flag.to_owned(), id(gpu).to_owned()])
        .collect()
}

/// Replaces magic substitution arguments in `test["args"]` with their
/// expansions.
pub(crate) fn substitute_magic_args(
    test: &mut TestConfig,
    tester_name: &str,
    tester: &BuilderConfig,
) -> Result<(), ConfigError> {
    let Some(Value::Array(original)) = test.get("args") else {
        return Ok(());
    };

    let mut substituted = Vec::with_capacity(original.len());
    for arg in original {
        match arg.as_str().and_then(MagicSubstitution::parse_arg) {
            Some(substitution) => substituted.extend(
                substitution?
                    .expand(test, tester_name, tester)
                    .into_iter()
                    .map(Value::String),
            ),
            None => substituted.push(arg.clone()),
        }
    }

    if substituted != *original {
        canonicalize_args(&mut substituted);
        test.insert("args".to_owned(), Value::Array(substituted));
    }
    Ok(())
}
