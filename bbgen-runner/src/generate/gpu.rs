// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GPU Telemetry tests: isolated scripts with a standard Telemetry command
//! line.

use super::kinds::GenerationContext;
use crate::{
    config::{BuilderConfig, TestConfig},
    errors::ConfigError,
    helpers::{canonicalize_args, dimension, is_truthy},
};
use serde_json::Value;

/// Isolate name suffixes for Android browser configurations.
const ANDROID_TARGET_SUFFIXES: [(&str, &str); 3] = [
    ("android-chromium", "_android_chrome"),
    ("android-chromium-monochrome", "_android_monochrome"),
    ("android-webview", "_android_webview"),
];

/// Which browser a GPU Telemetry test drives, and where it runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum GpuFlavor {
    /// The builder's own browser.
    Regular,
    /// Android WebView, through the instrumentation shell.
    AndroidWebview,
    /// The Cast Streaming shell.
    CastStreaming,
    /// The builder's browser, run in Skylab.
    Skylab,
}

impl GenerationContext<'_> {
    /// Generates a GPU Telemetry test.
    pub(crate) fn gpu_telemetry(
        &self,
        test_name: &str,
        test_config: &TestConfig,
        flavor: GpuFlavor,
    ) -> Result<Option<TestConfig>, ConfigError> {
        // Dashboards pick up results by this naming convention.
        if !(test_name.ends_with("test") || test_name.ends_with("tests")) {
            return Err(ConfigError::precondition(format!(
                "telemetry test names must end with test or tests, got {test_name}"
            )));
        }
        let Some(mut result) = self.isolated_script(test_name, test_config)? else {
            return Ok(None);
        };

        let tester = self.builder.config;
        let isolate = match test_config.get("test").and_then(Value::as_str) {
            Some(isolate) if !isolate.is_empty() => isolate.to_owned(),
            _ => self.default_isolate_name(flavor)?,
        };
        let entry = self.config.isolate_map().get(&isolate).ok_or_else(|| {
            ConfigError::unknown_reference(format!(
                "isolate {isolate} for GPU test {test_name} is not in the GN isolate map"
            ))
        })?;
        result.insert("test_id_prefix".to_owned(), Value::String(entry.test_id_prefix()));
        result.insert("test".to_owned(), Value::String(isolate));

        let test_to_run = result
            .shift_remove("telemetry_test_name")
            .unwrap_or_else(|| Value::String(test_name.to_owned()));

        // Results go through cloud storage, so reruns aren't equivalent.
        if let Some(Value::Object(swarming)) = result.get_mut("swarming") {
            swarming.insert("idempotent".to_owned(), Value::Bool(false));
        }

        let browser = match flavor {
            GpuFlavor::CastStreaming => "cast-streaming-shell",
            GpuFlavor::AndroidWebview => "android-webview-instrumentation",
            GpuFlavor::Regular | GpuFlavor::Skylab => {
                tester.browser_config.as_deref().ok_or_else(|| {
                    ConfigError::structural(format!(
                        "builder {} must set browser_config to run GPU telemetry tests",
                        self.builder.name
                    ))
                })?
            }
        };

        let mut extra_browser_args = Vec::new();
        if tester.is_chromeos() {
            // Chrome's stderr goes nowhere on ChromeOS, and JavaScript console
            // messages need the lower log level.
            extra_browser_args.push("--log-level=0");
        } else if !tester.is_fuchsia() || browser != "fuchsia-chrome" {
            extra_browser_args.push("--enable-logging=stderr");
        }
        extra_browser_args.push("--js-flags=--expose-gc");

        if flavor == GpuFlavor::Skylab && !result.contains_key("shards") {
            let shards = test_config
                .get("swarming")
                .and_then(|swarming| swarming.get("shards"))
                .filter(|shards| is_truthy(Some(shards)));
            if let Some(shards) = shards {
                result.insert("shards".to_owned(), shards.clone());
            }
        }

        let mut args: Vec<Value> = vec![
            test_to_run,
            "--show-stdout".into(),
            format!("--browser={browser}").into(),
            "--passthrough".into(),
            "-v".into(),
            "--stable-jobs".into(),
            format!("--extra-browser-args={}", extra_browser_args.join(" ")).into(),
            "--enforce-browser-version".into(),
        ];
        if let Some(Value::Array(existing)) = result.shift_remove("args") {
            args.extend(existing);
        }

        let substitutions = GpuSubstitutions::new(tester, &result, self.builder.name)?;
        let mut args: Vec<Value> = args
            .into_iter()
            .map(|arg| match arg {
                Value::String(arg) => Value::String(substitutions.apply(&arg)),
                other => other,
            })
            .collect();
        canonicalize_args(&mut args);
        result.insert("args".to_owned(), Value::Array(args));

        if flavor == GpuFlavor::Skylab {
            skylab_post_process(&mut result);
        }
        Ok(Some(result))
    }

    fn default_isolate_name(&self, flavor: GpuFlavor) -> Result<String, ConfigError> {
        let tester = self.builder.config;
        if tester.is_android() {
            if flavor == GpuFlavor::AndroidWebview {
                return Ok("telemetry_gpu_integration_test_android_webview".to_owned());
            }
            let browser_config = tester.browser_config.as_deref().unwrap_or_default();
            let suffix = ANDROID_TARGET_SUFFIXES
                .iter()
                .find(|(config, _)| *config == browser_config)
                .map(|(_, suffix)| *suffix)
                .ok_or_else(|| {
                    ConfigError::structural(format!(
                        "no GPU telemetry isolate for Android browser config \"{browser_config}\" \
                         on builder {}",
                        self.builder.name
                    ))
                })?;
            return Ok(format!("telemetry_gpu_integration_test{suffix}"));
        }
        if tester.is_fuchsia() {
            return Ok("telemetry_gpu_integration_test_fuchsia".to_owned());
        }
        Ok("telemetry_gpu_integration_test".to_owned())
    }
}

/// Skylab runs GPU tests through an Autotest wrapper which doesn't understand
/// nested browser arguments, so they get a field of their own.
fn skylab_post_process(result: &mut TestConfig) {
    result.insert(
        "autotest_name".to_owned(),
        Value::String("chromium_Graphics".to_owned()),
    );
    let Some(Value::Array(args)) = result.get_mut("args") else {
        return;
    };
    let Some(idx) = args.iter().position(|arg| {
        arg.as_str()
            .is_some_and(|arg| arg.contains("--extra-browser-args"))
    }) else {
        return;
    };
    let arg = args.remove(idx);
    let value = arg
        .as_str()
        .unwrap_or_default()
        .replace("--extra-browser-args=", "");
    result.insert("extra_browser_args".to_owned(), Value::String(value));
}

/// Values for `$os_type`, `$gpu_vendor_id` and `$gpu_device_id` in GPU test
/// arguments.
struct GpuSubstitutions {
    os_type: String,
    gpu_vendor_id: String,
    gpu_device_id: String,
}

impl GpuSubstitutions {
    fn new(
        tester: &BuilderConfig,
        test: &TestConfig,
        tester_name: &str,
    ) -> Result<Self, ConfigError> {
        let os_type = tester.os_type.clone().ok_or_else(|| {
            ConfigError::structural(format!(
                "builder {tester_name} must set os_type to run GPU telemetry tests"
            ))
        })?;
        let mut substitutions = Self {
            os_type,
            gpu_vendor_id: "0".to_owned(),
            gpu_device_id: "0".to_owned(),
        };
        if let Some(gpu) = dimension(test, "gpu").filter(|gpu| *gpu != "none") {
            // Drop the driver version, then split into vendor and device.
            let gpu = gpu.split('-').next().unwrap_or(gpu);
            let mut parts = gpu.split(':');
            if let Some(vendor) = parts.next() {
                substitutions.gpu_vendor_id = vendor.to_owned();
            }
            if let Some(device) = parts.next() {
                substitutions.gpu_device_id = device.to_owned();
            }
        }
        Ok(substitutions)
    }

    fn get(&self, name: &str) -> Option<&str> {
        match name {
            "os_type" => Some(&self.os_type),
            "gpu_vendor_id" => Some(&self.gpu_vendor_id),
            "gpu_device_id" => Some(&self.gpu_device_id),
            _ => None,
        }
    }

    /// Replaces `$name` and `${name}` placeholders. `$$` is a literal `$`, and
    /// unknown or malformed placeholders are left as they are.
    fn apply(&self, arg: &str) -> String {
        let mut out = String::with_capacity(arg.len());
        let mut rest = arg;
        while let Some(idx) = rest.find('$') {
            out.push_str(&rest[..idx]);
            let after = &rest[idx + 1..];

            if let Some(after) = after.strip_prefix('$') {
                out.push('$');
                rest = after;
                continue;
            }

            let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
                match braced.find('}') {
                    Some(end) if is_identifier(&braced[..end]) => {
                        (Some(&braced[..end]), end + 2)
                    }
                    _ => (None, 0),
                }
            } else {
                let len = identifier_len(after);
                ((len > 0).then(|| &after[..len]), len)
            };

            match name.and_then(|name| self.get(name)) {
                Some(value) => out.push_str(value),
                None => {
                    out.push('$');
                    out.push_str(&after[..consumed]);
                }
            }
            rest = &after[consumed..];
        }
        out.push_str(rest);
        out
    }
}

fn identifier_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(*c == '_' || c.is_ascii_alphanumeric()))
        .map_or(s.len(), |(idx, _)| idx)
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && identifier_len(s) == s.len()
}
