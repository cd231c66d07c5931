// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts, OutputWriter, clap_styles},
};
use atomicwrites::{AllowOverwrite, AtomicFile};
use bbgen_metadata::{
    BbgenExitCode,
    json::{KeyOrder, to_string_pretty},
};
use bbgen_runner::{
    check::ConsistencyChecker,
    config::{InputPaths, LoadedConfig, ToolSettings},
    generate::Generator,
    query::{Query, QueryRunner},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser};
use serde_json::Value;
use std::io::Write;
use tracing::{debug, info};

/// Generates the JSON test specs for buildbot waterfalls from `.pyl`
/// configuration.
///
/// With no options, every waterfall (or just the ones named) is regenerated
/// into the output directory. Use --check to verify that the checked-in files
/// are up to date, or --query to explore the resolved configuration.
#[derive(Debug, Parser)]
#[command(version, styles = clap_styles::style(), max_term_width = 100)]
pub struct BbgenApp {
    /// Waterfalls to generate [default: all]
    #[arg(value_name = "WATERFALL")]
    waterfalls: Vec<String>,

    #[command(flatten)]
    mode: ModeOpts,

    #[command(flatten)]
    input: InputOpts,

    #[command(flatten)]
    output: OutputOpts,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Mode options")]
struct ModeOpts {
    /// Check that the inputs are consistent and the generated files are up to date
    #[arg(short, long, conflicts_with = "query")]
    check: bool,

    /// Query the resolved configuration, for example `bots` or `test/<name>/bots`
    #[arg(long, value_name = "QUERY")]
    query: Option<String>,

    /// Write the query result to this file instead of stdout
    #[arg(long, value_name = "PATH", requires = "query")]
    json: Option<Utf8PathBuf>,

    /// Write generated files with a `.new` suffix, leaving the originals alone
    #[arg(short, long)]
    new_files: bool,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Input options")]
struct InputOpts {
    /// Directory containing the .pyl input files
    #[arg(
        long,
        value_name = "DIR",
        default_value = ".",
        env = "BBGEN_PYL_FILES_DIR"
    )]
    pyl_files_dir: Utf8PathBuf,

    /// Directory generated files are written to [default: the .pyl files directory]
    #[arg(long, value_name = "DIR", env = "BBGEN_OUTPUT_DIR")]
    output_dir: Option<Utf8PathBuf>,

    /// Additional GN isolate map file, merged into gn_isolate_map.pyl (may be repeated)
    #[arg(long = "isolate-map-file", value_name = "PATH")]
    isolate_map_files: Vec<Utf8PathBuf>,

    /// LUCI infra config directory [default: <pyl-files-dir>/../../infra/config]
    #[arg(long, value_name = "DIR", env = "BBGEN_INFRA_CONFIG_DIR")]
    infra_config_dir: Option<Utf8PathBuf>,

    /// bbgen settings file [default: <pyl-files-dir>/.config/bbgen.toml]
    #[arg(long, value_name = "PATH", env = "BBGEN_TOOL_CONFIG")]
    tool_config: Option<Utf8PathBuf>,
}

impl InputOpts {
    fn make_paths(&self) -> InputPaths {
        let mut paths = InputPaths::new(&self.pyl_files_dir)
            .with_extra_isolate_maps(self.isolate_map_files.iter().cloned());
        if let Some(dir) = &self.infra_config_dir {
            paths = paths.with_infra_config_dir(dir);
        }
        paths
    }

    fn output_dir(&self) -> &Utf8Path {
        self.output_dir.as_deref().unwrap_or(&self.pyl_files_dir)
    }
}

impl BbgenApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code on success.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let paths = self.input.make_paths();
        let settings =
            ToolSettings::from_sources(&paths.pyl_files_dir, self.input.tool_config.as_deref())?;
        let config = LoadedConfig::load(&paths)?;
        debug!(
            waterfalls = config.waterfalls().len(),
            "loaded configuration from {}", paths.pyl_files_dir
        );

        if self.mode.check {
            ConsistencyChecker::new(&config, &paths, &settings)
                .check_consistency(self.input.output_dir(), output.verbose)?;
            info!("all generated files are up to date");
            return Ok(BbgenExitCode::OK);
        }

        let generator = Generator::new(&config)?;

        if let Some(query) = &self.mode.query {
            let query = Query::parse(query)?;
            let result = QueryRunner::new(&generator, &settings.query).run(&query)?;
            write_query_result(&result, self.mode.json.as_deref(), output_writer)?;
            return Ok(BbgenExitCode::OK);
        }

        let outputs = generator.generate_outputs(&self.waterfalls)?;
        outputs.write(
            self.input.output_dir(),
            &settings.output_suffix(self.mode.new_files),
        )?;
        Ok(BbgenExitCode::OK)
    }
}

fn write_query_result(
    result: &Value,
    json_path: Option<&Utf8Path>,
    output_writer: &mut OutputWriter,
) -> Result<()> {
    let mut text = to_string_pretty(result, KeyOrder::Insertion)
        .map_err(|err| ExpectedError::SerializeQuery { err })?;
    text.push('\n');

    match json_path {
        Some(path) => {
            AtomicFile::new(path, AllowOverwrite)
                .write(|f| f.write_all(text.as_bytes()))
                .map_err(|err| ExpectedError::WriteQueryOutput {
                    path: path.to_owned(),
                    err: err.into(),
                })?;
            info!(path = %path, "wrote query result");
        }
        None => {
            let mut writer = output_writer.stdout_writer();
            writer
                .write_all(text.as_bytes())
                .map_err(|err| ExpectedError::WriteStdout { err })?;
            writer
                .flush()
                .map_err(|err| ExpectedError::WriteStdout { err })?;
        }
    }
    Ok(())
}
