// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    AutoshardExceptions, InputPaths, IsolateMap, IsolateMapEntry, Mixin, TestException,
    TestSuites, Variant, Waterfall, validate,
};
use crate::errors::LoadConfigError;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::{collections::BTreeSet, io};
use tracing::{debug, warn};

/// The buildbot configuration, loaded and validated.
///
/// This is the immutable input to resolution: generating, checking and
/// querying all borrow it and never modify it.
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    waterfalls: Vec<Waterfall>,
    test_suites: TestSuites,
    exceptions: IndexMap<String, TestException>,
    mixins: IndexMap<String, Mixin>,
    isolate_map: IsolateMap,
    variants: IndexMap<String, Variant>,
    autoshards: AutoshardExceptions,
}

/// Unparsed configuration values, for building a [`LoadedConfig`] without
/// touching the file system.
#[derive(Clone, Debug)]
pub struct ConfigParts {
    /// The contents of `waterfalls.pyl`.
    pub waterfalls: Value,
    /// The contents of `test_suites.pyl`.
    pub test_suites: Value,
    /// The contents of `test_suite_exceptions.pyl`.
    pub exceptions: Value,
    /// The contents of `mixins.pyl`.
    pub mixins: Value,
    /// The contents of `gn_isolate_map.pyl`.
    pub gn_isolate_map: Value,
    /// The contents of any extra isolate map files.
    pub extra_isolate_maps: Vec<Value>,
    /// The contents of `variants.pyl`.
    pub variants: Value,
    /// The contents of `autoshard_exceptions.json`, if present.
    pub autoshards: Option<Value>,
}

impl Default for ConfigParts {
    fn default() -> Self {
        Self {
            waterfalls: json!([]),
            test_suites: json!({}),
            exceptions: json!({}),
            mixins: json!({}),
            gn_isolate_map: json!({}),
            extra_isolate_maps: Vec::new(),
            variants: json!({}),
            autoshards: None,
        }
    }
}

impl LoadedConfig {
    /// Reads, parses and validates the configuration files.
    ///
    /// Files are read in a fixed order: waterfalls, test suites, exceptions,
    /// mixins, isolate maps, variants, and finally the optional autoshard
    /// exceptions.
    pub fn load(paths: &InputPaths) -> Result<Self, LoadConfigError> {
        Self::load_with_warnings(paths, &mut DefaultLoadWarnings)
    }

    fn load_with_warnings(
        paths: &InputPaths,
        warnings: &mut impl LoadWarnings,
    ) -> Result<Self, LoadConfigError> {
        let read = |name: &str| read_pyl(&paths.pyl_file(name));

        let waterfalls = read(InputPaths::WATERFALLS)?;
        let test_suites = read(InputPaths::TEST_SUITES)?;
        let exceptions = read(InputPaths::EXCEPTIONS)?;
        let mixins = read(InputPaths::MIXINS)?;
        let gn_isolate_map = read(InputPaths::GN_ISOLATE_MAP)?;
        let extra_isolate_maps = paths
            .extra_isolate_maps
            .iter()
            .map(|path| read_pyl(path))
            .collect::<Result<Vec<_>, _>>()?;
        let variants = read(InputPaths::VARIANTS)?;
        let autoshard_path = paths.autoshard_exceptions();
        let autoshards = read_optional_json(&autoshard_path)?;

        let mut sources: Vec<Utf8PathBuf> = [
            InputPaths::WATERFALLS,
            InputPaths::TEST_SUITES,
            InputPaths::EXCEPTIONS,
            InputPaths::MIXINS,
            InputPaths::GN_ISOLATE_MAP,
        ]
        .into_iter()
        .map(|name| paths.pyl_file(name))
        .collect();
        sources.extend(paths.extra_isolate_maps.iter().cloned());
        sources.push(paths.pyl_file(InputPaths::VARIANTS));
        sources.push(autoshard_path);

        let parts = ConfigParts {
            waterfalls,
            test_suites,
            exceptions,
            mixins,
            gn_isolate_map,
            extra_isolate_maps,
            variants,
            autoshards,
        };
        Self::from_parts_impl(parts, &sources, warnings)
    }

    /// Builds and validates a configuration from in-memory values.
    pub fn from_parts(parts: ConfigParts) -> Result<Self, LoadConfigError> {
        let mut sources: Vec<Utf8PathBuf> = [
            InputPaths::WATERFALLS,
            InputPaths::TEST_SUITES,
            InputPaths::EXCEPTIONS,
            InputPaths::MIXINS,
            InputPaths::GN_ISOLATE_MAP,
        ]
        .into_iter()
        .map(Utf8PathBuf::from)
        .collect();
        sources.extend(
            (0..parts.extra_isolate_maps.len()).map(|idx| format!("isolate-map-{idx}.pyl").into()),
        );
        sources.push(InputPaths::VARIANTS.into());
        sources.push("autoshard_exceptions.json".into());
        Self::from_parts_impl(parts, &sources, &mut DefaultLoadWarnings)
    }

    // `sources` names the origin of each part, in load order.
    fn from_parts_impl(
        parts: ConfigParts,
        sources: &[Utf8PathBuf],
        warnings: &mut impl LoadWarnings,
    ) -> Result<Self, LoadConfigError> {
        let mut sources = sources.iter();
        let mut next_source = || sources.next().map_or(Utf8Path::new("<unknown>"), |p| p.as_path());

        let waterfalls: Vec<Waterfall> =
            deserialize_part(next_source(), parts.waterfalls, warnings)?;
        let test_suites: TestSuites = deserialize_part(next_source(), parts.test_suites, warnings)?;
        let exceptions = deserialize_part(next_source(), parts.exceptions, warnings)?;
        let mixins = deserialize_part(next_source(), parts.mixins, warnings)?;
        let mut isolate_map = IsolateMap::new(deserialize_part(
            next_source(),
            parts.gn_isolate_map,
            warnings,
        )?);
        for extra in parts.extra_isolate_maps {
            let extra: IndexMap<String, IsolateMapEntry> =
                deserialize_part(next_source(), extra, warnings)?;
            isolate_map.merge(extra)?;
        }
        let variants = deserialize_part(next_source(), parts.variants, warnings)?;
        let autoshard_source = next_source();
        let autoshards = match parts.autoshards {
            Some(value) => deserialize_part(autoshard_source, value, warnings)?,
            None => AutoshardExceptions::default(),
        };

        let config = Self {
            waterfalls,
            test_suites,
            exceptions,
            mixins,
            isolate_map,
            variants,
            autoshards,
        };
        validate::validate(&config)?;

        debug!(
            "loaded {} waterfalls, {} basic suites, {} mixins, {} variants",
            config.waterfalls.len(),
            config.test_suites.basic_suites.len(),
            config.mixins.len(),
            config.variants.len(),
        );
        Ok(config)
    }

    /// Returns the waterfalls, in file order.
    pub fn waterfalls(&self) -> &[Waterfall] {
        &self.waterfalls
    }

    /// Returns the suite definitions as written.
    pub fn test_suites(&self) -> &TestSuites {
        &self.test_suites
    }

    /// Returns the per-test exceptions.
    pub fn exceptions(&self) -> &IndexMap<String, TestException> {
        &self.exceptions
    }

    /// Returns the mixin definitions.
    pub fn mixins(&self) -> &IndexMap<String, Mixin> {
        &self.mixins
    }

    /// Returns the merged GN isolate map.
    pub fn isolate_map(&self) -> &IsolateMap {
        &self.isolate_map
    }

    /// Returns the named variant definitions.
    pub fn variants(&self) -> &IndexMap<String, Variant> {
        &self.variants
    }

    /// Returns the autoshard overrides.
    pub fn autoshards(&self) -> &AutoshardExceptions {
        &self.autoshards
    }
}

fn read_pyl(path: &Utf8Path) -> Result<Value, LoadConfigError> {
    debug!("reading {path}");
    let contents = std::fs::read_to_string(path).map_err(|error| LoadConfigError::Read {
        path: path.to_owned(),
        error,
    })?;
    bbgen_pyl::parse(&contents).map_err(|error| LoadConfigError::Parse {
        path: path.to_owned(),
        error,
    })
}

fn read_optional_json(path: &Utf8Path) -> Result<Option<Value>, LoadConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!("{path} does not exist, skipping");
            return Ok(None);
        }
        Err(error) => {
            return Err(LoadConfigError::Read {
                path: path.to_owned(),
                error,
            });
        }
    };
    debug!("reading {path}");
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|error| LoadConfigError::ParseJson {
            path: path.to_owned(),
            error,
        })
}

fn deserialize_part<T: DeserializeOwned>(
    path: &Utf8Path,
    value: Value,
    warnings: &mut impl LoadWarnings,
) -> Result<T, LoadConfigError> {
    let mut ignored = BTreeSet::new();
    let mut cb = |path: serde_ignored::Path| {
        ignored.insert(path.to_string());
    };
    let ignored_de = serde_ignored::Deserializer::new(value, &mut cb);
    let result: T =
        serde_path_to_error::deserialize(ignored_de).map_err(|error| LoadConfigError::Deserialize {
            path: path.to_owned(),
            error,
        })?;

    if !ignored.is_empty() {
        warnings.unknown_config_keys(path, &ignored);
    }
    Ok(result)
}

/// Receives warnings produced while loading configuration files.
trait LoadWarnings {
    /// Called with the keys in a file that bbgen doesn't know about.
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

/// Logs warnings through `tracing`.
struct DefaultLoadWarnings;

impl LoadWarnings for DefaultLoadWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
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

        warn!("in {config_file}, ignoring unknown configuration {unknown_str}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigErrorKind;
    use camino_tempfile_ext::prelude::*;
    use indoc::indoc;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct TestLoadWarnings {
        unknown: Vec<(Utf8PathBuf, BTreeSet<String>)>,
    }

    impl LoadWarnings for TestLoadWarnings {
        fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
            self.unknown
                .push((config_file.to_owned(), unknown.clone()));
        }
    }

    fn write_inputs(dir: &Utf8TempDir) {
        dir.child(InputPaths::WATERFALLS)
            .write_str(indoc! {r#"
                [
                  {
                    'name': 'chromium.linux',
                    'machines': {
                      'Linux Tests': {
                        'os_type': 'linux',
                        'test_suites': {'gtest_tests': 'linux_gtests'},
                        'unknown_builder_key': True,
                      },
                    },
                  },
                ]
            "#})
            .unwrap();
        dir.child(InputPaths::TEST_SUITES)
            .write_str(indoc! {r#"
                {
                  'basic_suites': {
                    'linux_gtests': {
                      'base_unittests': {},
                    },
                  },
                }
            "#})
            .unwrap();
        dir.child(InputPaths::EXCEPTIONS).write_str("{}").unwrap();
        dir.child(InputPaths::MIXINS).write_str("{}").unwrap();
        dir.child(InputPaths::GN_ISOLATE_MAP)
            .write_str(indoc! {r#"
                {
                  'base_unittests': {
                    'label': '//base:base_unittests',
                    'type': 'console_test_launcher',
                  },
                }
            "#})
            .unwrap();
        dir.child(InputPaths::VARIANTS).write_str("{}").unwrap();
    }

    #[test]
    fn load_reads_all_files_and_reports_unknown_keys() {
        let dir = camino_tempfile::Builder::new()
            .prefix("bbgen-load")
            .tempdir()
            .unwrap();
        write_inputs(&dir);

        let paths = InputPaths::new(dir.path()).with_infra_config_dir(dir.path().join("infra"));
        let mut warnings = TestLoadWarnings::default();
        let config =
            LoadedConfig::load_with_warnings(&paths, &mut warnings).expect("config loads");

        assert_eq!(config.waterfalls().len(), 1);
        assert_eq!(config.waterfalls()[0].machines.len(), 1);
        assert!(config.isolate_map().get("base_unittests").is_some());
        assert!(config.autoshards().is_empty(), "autoshard file is optional");

        assert_eq!(warnings.unknown.len(), 1);
        let (file, keys) = &warnings.unknown[0];
        assert_eq!(file, &dir.path().join(InputPaths::WATERFALLS));
        assert_eq!(
            keys,
            &btreeset! {"0.machines.Linux Tests.unknown_builder_key".to_owned()}
        );
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let dir = camino_tempfile::Builder::new()
            .prefix("bbgen-load")
            .tempdir()
            .unwrap();
        let paths = InputPaths::new(dir.path());
        let err = LoadedConfig::load(&paths).expect_err("no files");
        assert!(
            matches!(&err, LoadConfigError::Read { path, .. } if path.ends_with(InputPaths::WATERFALLS)),
            "unexpected error: {err:?}"
        );

        write_inputs(&dir);
        dir.child(InputPaths::MIXINS)
            .write_str("{'a': {}, 'a': {}}")
            .unwrap();
        let err = LoadedConfig::load(&paths).expect_err("duplicate key");
        assert!(
            matches!(&err, LoadConfigError::Parse { path, .. } if path.ends_with(InputPaths::MIXINS)),
            "unexpected error: {err:?}"
        );

        dir.child(InputPaths::MIXINS).write_str("[]").unwrap();
        let err = LoadedConfig::load(&paths).expect_err("mixins must be a dict");
        let LoadConfigError::Deserialize { path, .. } = &err else {
            panic!("unexpected error: {err:?}");
        };
        assert!(path.ends_with(InputPaths::MIXINS));
    }

    #[test]
    fn extra_isolate_maps_may_not_overlap() {
        let parts = ConfigParts {
            gn_isolate_map: json!({"a": {"label": "//x:a"}}),
            extra_isolate_maps: vec![json!({"a": {"label": "//y:a"}})],
            ..Default::default()
        };
        let err = LoadedConfig::from_parts(parts).expect_err("duplicate isolate");
        let LoadConfigError::Invalid(err) = err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(err.kind(), ConfigErrorKind::Structural);
        assert_eq!(err.message(), "Duplicate targets in isolate map files: a.");
    }

    #[test]
    fn deserialize_errors_name_the_field() {
        let parts = ConfigParts {
            waterfalls: json!([{"name": "w", "machines": {"b": {"mixins": "not-a-list"}}}]),
            ..Default::default()
        };
        let err = LoadedConfig::from_parts(parts).expect_err("mixins must be a list");
        let LoadConfigError::Deserialize { path, error } = err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(path, InputPaths::WATERFALLS);
        assert_eq!(error.path().to_string(), "[0].machines.b.mixins");
    }
}
