// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use bbgen_metadata::BbgenExitCode;
use bbgen_runner::errors::{
    CheckError, ConfigError, LoadConfigError, QueryError, ToolSettingsError, WriteOutputError,
};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders. Errors are meant to be printed with
// display_to_stderr, which colorizes them and prints the cause chain.

/// An expected failure: a problem with the inputs or the environment rather
/// than a bug in bbgen.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("tool settings error")]
    ToolSettings {
        #[from]
        err: ToolSettingsError,
    },
    #[error("load config error")]
    LoadConfig {
        #[from]
        err: LoadConfigError,
    },
    #[error("config error")]
    Config {
        #[from]
        err: ConfigError,
    },
    #[error("check failed")]
    Check {
        #[from]
        err: CheckError,
    },
    #[error("query failed")]
    Query {
        #[from]
        err: QueryError,
    },
    #[error("write output error")]
    WriteOutput {
        #[from]
        err: WriteOutputError,
    },
    #[error("failed to serialize query result")]
    SerializeQuery {
        #[source]
        err: serde_json::Error,
    },
    #[error("failed to write query result to `{path}`")]
    WriteQueryOutput {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to write to stdout")]
    WriteStdout {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ToolSettings { .. } => BbgenExitCode::SETUP_ERROR,
            Self::LoadConfig { err } => match err {
                LoadConfigError::Invalid(_) => BbgenExitCode::INVALID_CONFIG,
                _ => BbgenExitCode::SETUP_ERROR,
            },
            Self::Config { .. } => BbgenExitCode::INVALID_CONFIG,
            Self::Check { err } => match err {
                CheckError::Config(_) => BbgenExitCode::INVALID_CONFIG,
                CheckError::ReadInfraConfig { .. }
                | CheckError::ParseInfraConfig { .. }
                | CheckError::InvalidGlob { .. }
                | CheckError::ReadOutput { .. } => BbgenExitCode::SETUP_ERROR,
                _ => BbgenExitCode::CHECK_FAILED,
            },
            Self::Query { err } => match err {
                QueryError::Config(_) => BbgenExitCode::INVALID_CONFIG,
                _ => BbgenExitCode::QUERY_FAILED,
            },
            Self::SerializeQuery { .. } => BbgenExitCode::QUERY_FAILED,
            Self::WriteOutput { .. } | Self::WriteQueryOutput { .. } | Self::WriteStdout { .. } => {
                BbgenExitCode::WRITE_OUTPUT_ERROR
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::ToolSettings { err } => {
                error!(
                    "failed to parse bbgen settings at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::LoadConfig { err } => match err {
                LoadConfigError::Parse { path, error } => {
                    // The diagnostic points into the file, so it is rendered
                    // with miette instead of as a cause.
                    let report = miette::Report::new(error.clone());
                    error!(target: NO_HEADING, "{report:?}");
                    error!("failed to parse `{}`", path.style(styles.bold));
                    None
                }
                LoadConfigError::Invalid(error) => {
                    error!("{error}");
                    None
                }
                other => {
                    error!("{other}");
                    other.source()
                }
            },
            Self::Config { err } => {
                error!("{err}");
                None
            }
            Self::Check { err } => match err {
                CheckError::ParseInfraConfig { path, error } => {
                    let report = miette::Report::new(error.clone());
                    error!(target: NO_HEADING, "{report:?}");
                    error!("failed to parse `{}`", path.style(styles.bold));
                    None
                }
                CheckError::StaleFiles { .. } => {
                    error!("{err}");
                    error!(
                        target: NO_HEADING,
                        "{}",
                        "(rerun bbgen without --check to regenerate them, or pass -v to see diffs)"
                            .style(styles.warning_text)
                    );
                    None
                }
                other => {
                    error!("{other}");
                    other.source()
                }
            },
            Self::Query { err } => {
                error!("{err}");
                None
            }
            Self::WriteOutput { err } => {
                error!("failed to write `{}`", err.path.style(styles.bold));
                Some(&err.error as &dyn Error)
            }
            Self::SerializeQuery { err } => {
                error!("failed to serialize query result");
                Some(err as &dyn Error)
            }
            Self::WriteQueryOutput { path, err } => {
                error!("failed to write query result to `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::WriteStdout { err } => {
                error!("failed to write to stdout");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
