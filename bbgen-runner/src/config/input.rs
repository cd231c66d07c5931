// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};

/// Locations of the files that make up a buildbot configuration.
#[derive(Clone, Debug)]
pub struct InputPaths {
    /// The directory containing the `.pyl` files.
    pub pyl_files_dir: Utf8PathBuf,

    /// Additional GN isolate map files, merged into `gn_isolate_map.pyl`.
    pub extra_isolate_maps: Vec<Utf8PathBuf>,

    /// The LUCI services configuration directory.
    pub infra_config_dir: Utf8PathBuf,
}

impl InputPaths {
    /// File name of the waterfall definitions.
    pub const WATERFALLS: &'static str = "waterfalls.pyl";
    /// File name of the test suite definitions.
    pub const TEST_SUITES: &'static str = "test_suites.pyl";
    /// File name of the per-test exceptions.
    pub const EXCEPTIONS: &'static str = "test_suite_exceptions.pyl";
    /// File name of the mixin definitions.
    pub const MIXINS: &'static str = "mixins.pyl";
    /// File name of the GN isolate map.
    pub const GN_ISOLATE_MAP: &'static str = "gn_isolate_map.pyl";
    /// File name of the variant definitions.
    pub const VARIANTS: &'static str = "variants.pyl";

    /// Creates a new `InputPaths` with the infra configuration directory at
    /// its conventional location, `<pyl-files-dir>/../../infra/config`.
    pub fn new(pyl_files_dir: impl Into<Utf8PathBuf>) -> Self {
        let pyl_files_dir = pyl_files_dir.into();
        let infra_config_dir = pyl_files_dir.join("..").join("..").join("infra").join("config");
        Self {
            pyl_files_dir,
            extra_isolate_maps: Vec::new(),
            infra_config_dir,
        }
    }

    /// Sets the infra configuration directory.
    pub fn with_infra_config_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.infra_config_dir = dir.into();
        self
    }

    /// Adds extra isolate map files.
    pub fn with_extra_isolate_maps(
        mut self,
        paths: impl IntoIterator<Item = impl Into<Utf8PathBuf>>,
    ) -> Self {
        self.extra_isolate_maps.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Returns the path of an input file inside the `.pyl` files directory.
    pub fn pyl_file(&self, name: &str) -> Utf8PathBuf {
        self.pyl_files_dir.join(name)
    }

    /// Returns the path of the optional autoshard exceptions file.
    pub fn autoshard_exceptions(&self) -> Utf8PathBuf {
        self.infra_config_dir
            .join("targets")
            .join("autoshard_exceptions.json")
    }

    /// Returns the path of the generated LUCI project settings file.
    pub fn project_pyl(&self) -> Utf8PathBuf {
        self.infra_config_dir.join("generated").join("project.pyl")
    }

    /// Returns the directory holding the generated LUCI milo configs.
    pub fn luci_config_dir(&self) -> Utf8PathBuf {
        self.infra_config_dir.join("generated").join("luci")
    }

    /// Returns the infra configuration directory.
    pub fn infra_config_dir(&self) -> &Utf8Path {
        &self.infra_config_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infra_dir_defaults_relative_to_pyl_files() {
        let paths = InputPaths::new("/src/testing/buildbot");
        assert_eq!(
            paths.autoshard_exceptions(),
            "/src/testing/buildbot/../../infra/config/targets/autoshard_exceptions.json"
        );

        let paths = paths.with_infra_config_dir("/infra");
        assert_eq!(paths.project_pyl(), "/infra/generated/project.pyl");
        assert_eq!(paths.luci_config_dir(), "/infra/generated/luci");
        assert_eq!(
            paths.pyl_file(InputPaths::MIXINS),
            "/src/testing/buildbot/mixins.pyl"
        );
    }
}
