// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consistency checks over the input configuration and the generated files
//! checked in next to it.

use crate::{
    config::{InputPaths, LoadedConfig, ToolSettings, VariantRef},
    errors::{CheckError, SwarmingProblem},
    generate::{Generator, TestCategory, missing_suite, unknown_category},
    helpers::{dimension, dimensions, is_truthy, string_list},
};
use bbgen_metadata::{TestSpec, WaterfallSpec};
use camino::{Utf8Path, Utf8PathBuf};
use globset::Glob;
use serde_json::Value;
use similar::TextDiff;
use std::{
    collections::{BTreeSet, HashSet},
    io,
};
use tracing::{debug, info};

const MILO_CONFIG_GLOB: &str = "luci-milo*.cfg";
const MILO_BUILDER_PREFIXES: [&str; 2] = [
    "name: \"buildbucket/luci.chromium.",
    "name: \"buildbucket/luci.chrome.",
];

/// Checks configuration files and generated files for consistency.
#[derive(Clone, Copy, Debug)]
pub struct ConsistencyChecker<'a> {
    config: &'a LoadedConfig,
    paths: &'a InputPaths,
    settings: &'a ToolSettings,
}

impl<'a> ConsistencyChecker<'a> {
    /// Creates a new checker.
    pub fn new(config: &'a LoadedConfig, paths: &'a InputPaths, settings: &'a ToolSettings) -> Self {
        Self {
            config,
            paths,
            settings,
        }
    }

    /// Runs the input checks, then the output checks against files in
    /// `output_dir`.
    pub fn check_consistency(&self, output_dir: &Utf8Path, verbose: bool) -> Result<(), CheckError> {
        self.check_input()?;
        self.check_output(output_dir, verbose)
    }

    /// Checks the input configuration.
    ///
    /// Beyond what loading and resolution already validate, every suite, mixin
    /// and named variant must be used, every builder must be known to LUCI,
    /// and exceptions may only name builders that exist.
    pub fn check_input(&self) -> Result<(), CheckError> {
        // Composition checks run as part of resolution.
        Generator::new(self.config)?;

        self.check_suites_referenced()?;
        self.check_bot_names()?;
        self.check_exception_machines()?;

        for (name, mixin) in self.config.mixins() {
            if mixin.contains_key("$mixin_append") {
                return Err(CheckError::MixinAppend {
                    mixin: name.clone(),
                });
            }
        }
        self.check_mixins_referenced()?;
        self.check_variants_referenced()?;
        debug!("input configuration is consistent");
        Ok(())
    }

    /// Regenerates every waterfall and compares the result with the files in
    /// `output_dir`, then checks swarming dimensions on the generated tests.
    ///
    /// With `verbose`, a diff is logged for each stale file.
    pub fn check_output(&self, output_dir: &Utf8Path, verbose: bool) -> Result<(), CheckError> {
        let generator = Generator::new(self.config)?;
        let outputs = generator.generate_outputs(&[])?;
        let suffix = self.settings.output_suffix(false);

        let mut stale = Vec::new();
        for (name, spec) in outputs.iter() {
            let file_name = format!("{name}{suffix}");
            let path = output_dir.join(&file_name);
            let expected = bbgen_metadata::json::to_spec_string(spec).map_err(|error| {
                CheckError::ReadOutput {
                    path: path.clone(),
                    error: error.into(),
                }
            })?;
            let current = read_optional(&path)?;
            if current.as_deref() == Some(expected.as_str()) {
                continue;
            }
            if verbose {
                let current = current.unwrap_or_default();
                let diff = TextDiff::from_lines(&expected, &current);
                info!(
                    "File {file_name} did not have the following expected contents:\n{}",
                    diff.unified_diff().header("expected", "current")
                );
            }
            stale.push(file_name);
        }
        if !stale.is_empty() {
            return Err(CheckError::StaleFiles { files: stale });
        }

        for (name, spec) in outputs.iter() {
            check_swarming(name, spec)?;
        }
        debug!(waterfalls = outputs.len(), "generated files are up to date");
        Ok(())
    }

    fn check_suites_referenced(&self) -> Result<(), CheckError> {
        let test_suites = self.config.test_suites();
        let mut unused: BTreeSet<&str> = test_suites.all_names().collect();
        for waterfall in self.config.waterfalls() {
            for (builder_name, builder) in &waterfall.machines {
                for (category, suite) in &builder.test_suites {
                    if TestCategory::parse(category).is_none() {
                        return Err(unknown_category(category, builder_name, &waterfall.name).into());
                    }
                    if !test_suites.contains(suite) {
                        return Err(missing_suite(suite, builder_name, &waterfall.name).into());
                    }
                    unused.remove(suite.as_str());
                }
            }
        }

        // A composite suite in use keeps its members alive.
        for (name, members) in test_suites.composite_members() {
            if !unused.contains(name) {
                for member in members {
                    unused.remove(member);
                }
            }
        }
        if unused.is_empty() {
            Ok(())
        } else {
            Err(CheckError::UnreferencedSuites {
                suites: unused.into_iter().map(str::to_owned).collect(),
            })
        }
    }

    fn check_bot_names(&self) -> Result<(), CheckError> {
        let Some(bot_names) = self.valid_bot_names()? else {
            debug!("builder validation is disabled for this project");
            return Ok(());
        };
        for waterfall in self.config.waterfalls() {
            if !self.settings.validates_bots_on(&waterfall.name) {
                continue;
            }
            for bot in waterfall.machines.keys() {
                if !bot_names.contains(bot.as_str()) {
                    return Err(CheckError::UnknownBot {
                        bot: bot.clone(),
                        waterfall: waterfall.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Reads builder names from the generated LUCI milo configs, or returns
    /// `None` if the project doesn't require builders to be defined there.
    fn valid_bot_names(&self) -> Result<Option<HashSet<String>>, CheckError> {
        let project_pyl = self.paths.project_pyl();
        if let Some(contents) = read_infra_optional(&project_pyl)? {
            let project = bbgen_pyl::parse(&contents).map_err(|error| {
                CheckError::ParseInfraConfig {
                    path: project_pyl.clone(),
                    error,
                }
            })?;
            let validate = project.get("validate_source_side_specs_have_builder");
            if validate.is_some() && !is_truthy(validate) {
                return Ok(None);
            }
        }

        let matcher = Glob::new(MILO_CONFIG_GLOB)
            .map_err(|error| CheckError::InvalidGlob {
                pattern: MILO_CONFIG_GLOB.to_owned(),
                error,
            })?
            .compile_matcher();

        let mut bot_names = HashSet::new();
        for path in milo_configs(&self.paths.luci_config_dir(), |name| matcher.is_match(name))? {
            let Some(contents) = read_infra_optional(&path)? else {
                continue;
            };
            bot_names.extend(contents.lines().filter_map(milo_builder_name));
        }
        debug!(count = bot_names.len(), "read builder names from milo configs");
        Ok(Some(bot_names))
    }

    fn check_exception_machines(&self) -> Result<(), CheckError> {
        let mut all_bots = HashSet::new();
        for waterfall in self.config.waterfalls() {
            for bot in waterfall.machines.keys() {
                all_bots.insert(bot.clone());
                // Exceptions may qualify a builder with its waterfall.
                all_bots.insert(format!("{bot} {}", waterfall.name));
            }
        }

        let missing: BTreeSet<String> = self
            .config
            .exceptions()
            .values()
            .flat_map(|exception| exception.referenced_builders())
            .filter(|bot| !all_bots.contains(*bot))
            .map(str::to_owned)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CheckError::NonexistentMachines { machines: missing })
        }
    }

    fn check_mixins_referenced(&self) -> Result<(), CheckError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for waterfall in self.config.waterfalls() {
            seen.extend(waterfall.mixins.iter().map(String::as_str));
            for builder in waterfall.machines.values() {
                seen.extend(builder.mixins.iter().map(String::as_str));
            }
        }

        let test_suites = self.config.test_suites();
        for suite in test_suites.basic_suites.values() {
            for test in suite.values() {
                seen.extend(string_list(test, "mixins"));
            }
        }
        for sub_suites in test_suites.matrix_compound_suites.values() {
            for sub_suite in sub_suites.values() {
                seen.extend(sub_suite.mixins.iter().map(String::as_str));
                for variant in &sub_suite.variants {
                    if let VariantRef::Inline(variant) = variant {
                        seen.extend(variant.mixins.iter().map(String::as_str));
                    }
                }
            }
        }
        for variant in self.config.variants().values() {
            seen.extend(variant.mixins.iter().map(String::as_str));
        }

        let missing: BTreeSet<String> = self
            .config
            .mixins()
            .keys()
            .filter(|name| !seen.contains(name.as_str()))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CheckError::UnreferencedMixins { mixins: missing })
        }
    }

    fn check_variants_referenced(&self) -> Result<(), CheckError> {
        let mut seen: HashSet<&str> = HashSet::new();
        let test_suites = self.config.test_suites();
        for sub_suites in test_suites.matrix_compound_suites.values() {
            for sub_suite in sub_suites.values() {
                seen.extend(sub_suite.variants.iter().filter_map(|variant| match variant {
                    VariantRef::Named(name) => Some(name.as_str()),
                    VariantRef::Inline(_) => None,
                }));
            }
        }
        for suite in test_suites.basic_suites.values() {
            for test in suite.values() {
                seen.extend(string_list(test, "variants"));
            }
        }

        let missing: BTreeSet<String> = self
            .config
            .variants()
            .keys()
            .filter(|name| !seen.contains(name.as_str()))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CheckError::UnreferencedVariants { variants: missing })
        }
    }
}

/// Extracts the builder name from a milo config line like
/// `name: "buildbucket/luci.chromium.try/win_chromium_dbg_ng"`.
fn milo_builder_name(line: &str) -> Option<String> {
    if !MILO_BUILDER_PREFIXES.iter().any(|prefix| line.contains(prefix)) {
        return None;
    }
    let start = line.rfind('/')? + 1;
    let end = line.rfind('"')?;
    line.get(start..end).map(str::to_owned)
}

/// Lists the files in `dir` whose names match, sorted. A missing directory has
/// no files.
fn milo_configs(
    dir: &Utf8Path,
    is_match: impl Fn(&str) -> bool,
) -> Result<Vec<Utf8PathBuf>, CheckError> {
    let entries = match dir.read_dir_utf8() {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => {
            return Err(CheckError::ReadInfraConfig {
                path: dir.to_owned(),
                error,
            });
        }
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|error| CheckError::ReadInfraConfig {
            path: dir.to_owned(),
            error,
        })?;
        if is_match(entry.file_name()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

fn read_infra_optional(path: &Utf8Path) -> Result<Option<String>, CheckError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(CheckError::ReadInfraConfig {
            path: path.to_owned(),
            error,
        }),
    }
}

fn read_optional(path: &Utf8Path) -> Result<Option<String>, CheckError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(CheckError::ReadOutput {
            path: path.to_owned(),
            error,
        }),
    }
}

fn check_swarming(waterfall: &str, spec: &WaterfallSpec) -> Result<(), CheckError> {
    for (builder, builder_spec) in spec.iter_builders() {
        for category in [TestCategory::GtestTests, TestCategory::IsolatedScripts] {
            let Some(tests) = builder_spec.tests.get(category.name()) else {
                continue;
            };
            for test in tests {
                if let Some(problem) = swarming_problem(test) {
                    return Err(CheckError::InvalidSwarming {
                        waterfall: waterfall.to_owned(),
                        builder: builder.to_owned(),
                        test: test
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_owned(),
                        problem,
                    });
                }
            }
        }
    }
    Ok(())
}

fn swarming_problem(test: &TestSpec) -> Option<SwarmingProblem> {
    if !test.contains_key("swarming") {
        return None;
    }
    if dimensions(test).is_none_or(|dims| dims.is_empty()) {
        return Some(SwarmingProblem::MissingDimensions);
    }
    let Some(os) = dimension(test, "os").filter(|os| !os.is_empty()) else {
        return Some(SwarmingProblem::MissingOs);
    };
    let has_cpu = dimensions(test).is_some_and(|dims| is_truthy(dims.get("cpu")));
    if os.contains("Mac") && !has_cpu {
        return Some(SwarmingProblem::MissingMacCpu);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParts;
    use camino_tempfile::Utf8TempDir;
    use camino_tempfile_ext::prelude::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    fn parts() -> ConfigParts {
        ConfigParts {
            waterfalls: json!([{
                "name": "chromium.linux",
                "mixins": ["linux_mixin"],
                "machines": {
                    "Linux Tests": {
                        "os_type": "linux",
                        "swarming": {"dimensions": {"os": "Ubuntu-22.04"}},
                        "test_suites": {"gtest_tests": "linux_gtests"},
                    },
                },
            }]),
            test_suites: json!({
                "basic_suites": {
                    "base_gtests": {"base_unittests": {}},
                    "url_gtests": {"url_unittests": {"mixins": ["url_mixin"]}},
                },
                "compound_suites": {
                    "linux_gtests": ["base_gtests", "url_gtests"],
                },
            }),
            mixins: json!({
                "linux_mixin": {"swarming": {"dimensions": {"pool": "chromium.tests"}}},
                "url_mixin": {"args": ["--url"]},
            }),
            ..Default::default()
        }
    }

    struct Fixture {
        dir: Utf8TempDir,
        paths: InputPaths,
        settings: ToolSettings,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = Utf8TempDir::new().expect("created temp dir");
            let paths = InputPaths::new(dir.path().join("testing/buildbot"))
                .with_infra_config_dir(dir.path().join("infra/config"));
            dir.child("infra/config/generated/luci/luci-milo.cfg")
                .write_str(indoc! {r#"
                    consoles {
                      builders {
                        name: "buildbucket/luci.chromium.ci/Linux Tests"
                      }
                      builders {
                        name: "buildbucket/luci.v8.ci/V8 Linux"
                      }
                    }
                "#})
                .expect("wrote milo config");
            Self {
                dir,
                paths,
                settings: ToolSettings::default_settings().expect("default settings are valid"),
            }
        }

        fn check_input(&self, parts: ConfigParts) -> Result<(), CheckError> {
            let config = LoadedConfig::from_parts(parts).expect("valid configuration");
            ConsistencyChecker::new(&config, &self.paths, &self.settings).check_input()
        }
    }

    #[test]
    fn consistent_input() {
        Fixture::new().check_input(parts()).expect("input is consistent");
    }

    #[test]
    fn unreferenced_suites() {
        let mut parts = parts();
        parts.test_suites["basic_suites"]["unused_gtests"] = json!({"foo_unittests": {}});
        let err = Fixture::new().check_input(parts).expect_err("suite is unused");
        assert_eq!(
            err.to_string(),
            "The following test suites were unreferenced by bots on the waterfalls: unused_gtests"
        );
    }

    #[test]
    fn unknown_bots() {
        let fixture = Fixture::new();
        let mut parts = parts();
        parts.waterfalls[0]["machines"]["Ghost Tests"] = json!({});
        let err = fixture.check_input(parts.clone()).expect_err("bot is unknown");
        assert_eq!(
            err.to_string(),
            "Unknown bot name \"Ghost Tests\" on waterfall \"chromium.linux\""
        );

        // Exempt waterfalls aren't checked.
        parts.waterfalls[0]["name"] = json!("client.v8.fyi");
        fixture.check_input(parts.clone()).expect("waterfall is exempt");

        // Nor is anything if the project turns validation off.
        parts.waterfalls[0]["name"] = json!("chromium.linux");
        fixture
            .dir
            .child("infra/config/generated/project.pyl")
            .write_str("{'validate_source_side_specs_have_builder': False}")
            .expect("wrote project.pyl");
        fixture.check_input(parts).expect("validation disabled");
    }

    #[test]
    fn exceptions_must_name_existing_machines() {
        let mut parts = parts();
        parts.exceptions = json!({
            "base_unittests": {
                "remove_from": ["Linux Tests chromium.linux", "Gone"],
                "modifications": {"Linux Tests": {}, "Also Gone": {}},
            },
        });
        let err = Fixture::new().check_input(parts).expect_err("machines are missing");
        assert_eq!(
            err.to_string(),
            "The following nonexistent machines were referenced in the test suite \
             exceptions: Also Gone, Gone"
        );
    }

    #[test]
    fn mixin_checks() {
        let fixture = Fixture::new();
        let mut parts = parts();
        parts.mixins["unused_mixin"] = json!({});
        let err = fixture.check_input(parts.clone()).expect_err("mixin is unused");
        assert!(matches!(
            err,
            CheckError::UnreferencedMixins { ref mixins } if mixins.iter().eq(["unused_mixin"])
        ));

        parts.mixins["url_mixin"] = json!({"$mixin_append": {"args": ["--x"]}});
        let err = fixture.check_input(parts).expect_err("mixin appends");
        assert!(matches!(err, CheckError::MixinAppend { ref mixin } if mixin == "url_mixin"));
    }

    #[test]
    fn unreferenced_variants() {
        let mut parts = parts();
        parts.variants = json!({"UNUSED": {"identifier": "unused"}});
        let err = Fixture::new().check_input(parts).expect_err("variant is unused");
        assert!(matches!(
            err,
            CheckError::UnreferencedVariants { ref variants } if variants.iter().eq(["UNUSED"])
        ));
    }

    #[test]
    fn output_check_finds_stale_files() {
        let fixture = Fixture::new();
        let config = LoadedConfig::from_parts(parts()).expect("valid configuration");
        let checker = ConsistencyChecker::new(&config, &fixture.paths, &fixture.settings);
        let output_dir = fixture.dir.path().join("testing/buildbot");

        let err = checker
            .check_output(&output_dir, true)
            .expect_err("nothing generated yet");
        assert!(matches!(
            err,
            CheckError::StaleFiles { ref files } if files == &["chromium.linux.json"]
        ));

        Generator::new(&config)
            .and_then(|generator| generator.generate_outputs(&[]))
            .expect("generated")
            .write(&output_dir, ".json")
            .expect("wrote outputs");
        checker
            .check_consistency(&output_dir, false)
            .expect("files are up to date");

        fixture
            .dir
            .child("testing/buildbot/chromium.linux.json")
            .write_str("{}\n")
            .expect("overwrote output");
        checker
            .check_output(&output_dir, false)
            .expect_err("file was edited");
    }

    #[test_case(json!({"name": "t"}), None; "not swarmed")]
    #[test_case(json!({"name": "t", "swarming": {}}), Some(SwarmingProblem::MissingDimensions); "no dimensions")]
    #[test_case(json!({"name": "t", "swarming": {"dimensions": {"pool": "p"}}}), Some(SwarmingProblem::MissingOs); "no os")]
    #[test_case(json!({"name": "t", "swarming": {"dimensions": {"os": "Mac-14"}}}), Some(SwarmingProblem::MissingMacCpu); "mac without cpu")]
    #[test_case(json!({"name": "t", "swarming": {"dimensions": {"os": "Mac-14", "cpu": "arm64"}}}), None; "mac with cpu")]
    fn swarming_problems(test: Value, expected: Option<SwarmingProblem>) {
        let test = test.as_object().cloned().expect("test is an object");
        assert_eq!(swarming_problem(&test), expected);
    }

    #[test_case(r#"  name: "buildbucket/luci.chromium.try/win_chromium_dbg_ng""#, Some("win_chromium_dbg_ng"))]
    #[test_case(r#"  name: "buildbucket/luci.chrome.ci/Linux Chrome""#, Some("Linux Chrome"))]
    #[test_case(r#"  name: "buildbucket/luci.v8.ci/V8 Linux""#, None)]
    #[test_case("  header: {}", None)]
    fn milo_builder_names(line: &str, expected: Option<&str>) {
        assert_eq!(milo_builder_name(line).as_deref(), expected);
    }
}
