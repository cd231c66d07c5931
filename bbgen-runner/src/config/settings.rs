// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{ToolSettingsError, ToolSettingsErrorKind};
use camino::Utf8Path;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::warn;

/// bbgen's own settings, as opposed to the buildbot configuration it
/// processes.
///
/// The defaults are embedded in the binary and may be overridden by
/// `.config/bbgen.toml` in the `.pyl` files directory.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolSettings {
    /// Waterfalls defined in internal configuration, exempt from bot name
    /// validation.
    pub internal_waterfalls: Vec<String>,

    /// Waterfalls whose bots are configured elsewhere, exempt from bot name
    /// validation.
    pub unvalidated_waterfalls: Vec<String>,

    /// The file name suffix of generated files.
    pub output_suffix: String,

    /// Settings for `--query`.
    pub query: QuerySettings,
}

/// Settings for `--query`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QuerySettings {
    /// Query parameters compared against swarming dimensions.
    pub dimension_params: Vec<String>,

    /// Query parameters compared against swarming fields.
    pub swarming_params: Vec<String>,
}

impl ToolSettings {
    /// The default settings.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The settings file, relative to the `.pyl` files directory.
    pub const CONFIG_PATH: &'static str = ".config/bbgen.toml";

    /// Reads settings, layering the repository file (or `config_file`, if
    /// given) over the defaults.
    ///
    /// The repository file is optional, but an explicitly named file must
    /// exist.
    pub fn from_sources(
        pyl_files_dir: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ToolSettingsError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = pyl_files_dir.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (settings, unknown) = Self::build_and_deserialize(&builder)
            .map_err(|kind| ToolSettingsError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            warn_unknown_keys(&config_file, &unknown);
        }
        Ok(settings)
    }

    /// Returns the embedded default settings.
    pub fn default_settings() -> Result<Self, ToolSettingsError> {
        Self::build_and_deserialize(&Self::make_default_config())
            .map(|(settings, _)| settings)
            .map_err(|kind| ToolSettingsError::new("<default config>", kind))
    }

    /// Returns true if bot names on `waterfall` are checked against the LUCI
    /// configuration.
    pub fn validates_bots_on(&self, waterfall: &str) -> bool {
        !self.internal_waterfalls.iter().any(|w| w == waterfall)
            && !self.unvalidated_waterfalls.iter().any(|w| w == waterfall)
    }

    /// Returns the suffix generated files are written with.
    pub fn output_suffix(&self, new_files: bool) -> String {
        if new_files {
            format!(".new{}", self.output_suffix)
        } else {
            self.output_suffix.clone()
        }
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(Self, BTreeSet<String>), ToolSettingsErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ToolSettingsErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let settings: Self = serde_path_to_error::deserialize(ignored_de).map_err(|error| {
            // The config crate also reports the key, which serde_path_to_error
            // already tracks.
            let path = error.path().clone();
            let error = match error.into_inner() {
                ConfigError::At { error, .. } => *error,
                other => other,
            };
            ToolSettingsErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                path, error,
            )))
        })?;
        Ok((settings, ignored))
    }
}

fn warn_unknown_keys(config_file: &Utf8Path, unknown: &BTreeSet<String>) {
    let mut unknown_str = String::new();
    if unknown.len() == 1 {
        // Print this on the same line.
        unknown_str.push_str("key: ");
        unknown_str.extend(unknown.iter().map(String::as_str));
    } else {
        unknown_str.push_str("keys:\n");
        for ignored_key in unknown {
            unknown_str.push('\n');
            unknown_str.push_str("  - ");
            unknown_str.push_str(ignored_key);
        }
    }

    warn!("ignoring unknown bbgen settings in {config_file}: {unknown_str}");
}
