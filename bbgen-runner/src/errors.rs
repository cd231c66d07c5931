// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by bbgen.

use bbgen_pyl::errors::PylParseError;
use camino::Utf8PathBuf;
use itertools::Itertools;
use std::{collections::BTreeSet, fmt, io};
use thiserror::Error;

/// The category of a [`ConfigError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// A mixin, variant, suite, builder, test or isolate was referred to by a
    /// name that doesn't exist.
    UnknownReference,

    /// The configuration has an invalid shape: nested composite suites, name
    /// collisions, missing required fields, malformed labels or removed
    /// features.
    Structural,

    /// Two suites disagree on the definition of a shared test.
    ConflictingDefinitions,

    /// A replacement or modification names a target that isn't present.
    TargetNotFound,

    /// A test kind's precondition was violated on a builder.
    TestTypePrecondition,
}

/// A fatal error in the buildbot configuration.
///
/// Every problem detected while loading, composing or resolving the
/// configuration is reported through this type. There is no recovery: one bad
/// definition aborts the whole run.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ConfigError {
    kind: ConfigErrorKind,
    message: String,
}

impl ConfigError {
    pub(crate) fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn unknown_reference(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::UnknownReference, message)
    }

    pub(crate) fn structural(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Structural, message)
    }

    pub(crate) fn conflicting(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::ConflictingDefinitions, message)
    }

    pub(crate) fn target_not_found(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::TargetNotFound, message)
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::TestTypePrecondition, message)
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An error that occurred while loading the input configuration files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadConfigError {
    /// An input file could not be read.
    #[error("failed to read `{path}`")]
    Read {
        /// The path that was being read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A `.pyl` file is not a valid Python literal.
    #[error("failed to parse `{path}`")]
    Parse {
        /// The path of the file.
        path: Utf8PathBuf,

        /// The parse error, which carries the file contents for rendering.
        #[source]
        error: PylParseError,
    },

    /// A JSON input file could not be parsed.
    #[error("failed to parse JSON in `{path}`")]
    ParseJson {
        /// The path of the file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// A file was syntactically valid but had the wrong structure.
    #[error("invalid configuration in `{path}`")]
    Deserialize {
        /// The path of the file.
        path: Utf8PathBuf,

        /// The error, along with the path to the offending field.
        #[source]
        error: serde_path_to_error::Error<serde_json::Error>,
    },

    /// The files were read successfully but failed validation.
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// An error that occurred while reading the tool settings file.
#[derive(Debug, Error)]
#[error("failed to parse bbgen settings at `{config_file}`")]
pub struct ToolSettingsError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ToolSettingsErrorKind,
}

impl ToolSettingsError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ToolSettingsErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the settings file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the underlying error.
    pub fn kind(&self) -> &ToolSettingsErrorKind {
        &self.kind
    }
}

/// The kind of a [`ToolSettingsError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolSettingsErrorKind {
    /// The layered configuration could not be built.
    #[error(transparent)]
    BuildError(Box<config::ConfigError>),

    /// The layered configuration could not be deserialized.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<config::ConfigError>>),
}

/// A problem with a generated test's swarming configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SwarmingProblem {
    /// The test has no dimensions at all.
    MissingDimensions,
    /// The `os` dimension is missing.
    MissingOs,
    /// The test runs on Mac but doesn't pin a `cpu`.
    MissingMacCpu,
}

impl fmt::Display for SwarmingProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDimensions => {
                write!(f, "dimensions must be specified for all swarmed tests")
            }
            Self::MissingOs => write!(f, "os must be specified for all swarmed tests"),
            Self::MissingMacCpu => write!(f, "cpu must be specified for mac swarmed tests"),
        }
    }
}

/// An error found while checking the configuration and generated files for
/// consistency.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CheckError {
    /// Resolving the configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Some suites are not used by any builder.
    #[error(
        "The following test suites were unreferenced by bots on the waterfalls: {}",
        suites.iter().join(", ")
    )]
    UnreferencedSuites {
        /// The unreferenced suite names.
        suites: BTreeSet<String>,
    },

    /// A builder isn't known to the LUCI configuration.
    #[error("Unknown bot name \"{bot}\" on waterfall \"{waterfall}\"")]
    UnknownBot {
        /// The builder name.
        bot: String,
        /// The waterfall the builder is on.
        waterfall: String,
    },

    /// Exceptions refer to builders that don't exist.
    #[error(
        "The following nonexistent machines were referenced in the test suite exceptions: {}",
        machines.iter().join(", ")
    )]
    NonexistentMachines {
        /// The missing builder names.
        machines: BTreeSet<String>,
    },

    /// A mixin uses the removed `$mixin_append` key.
    #[error(
        "$mixin_append is no longer supported (set in mixin \"{mixin}\"), \
         args and named caches specified as normal will be appended"
    )]
    MixinAppend {
        /// The mixin name.
        mixin: String,
    },

    /// Some mixins are never referenced.
    #[error(
        "The following mixins are unreferenced: {}. They must be referenced in a \
         waterfall, machine, or test suite.",
        mixins.iter().join(", ")
    )]
    UnreferencedMixins {
        /// The unreferenced mixin names.
        mixins: BTreeSet<String>,
    },

    /// Some named variants are never referenced.
    #[error(
        "The following variants were unreferenced: {}. They must be referenced in \
         a matrix test suite under the variants key.",
        variants.iter().join(", ")
    )]
    UnreferencedVariants {
        /// The unreferenced variant names.
        variants: BTreeSet<String>,
    },

    /// An infra configuration file could not be read.
    #[error("failed to read `{path}`")]
    ReadInfraConfig {
        /// The path that was being read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The infra project file is not a valid Python literal.
    #[error("failed to parse `{path}`")]
    ParseInfraConfig {
        /// The path of the file.
        path: Utf8PathBuf,

        /// The parse error.
        #[source]
        error: PylParseError,
    },

    /// A glob pattern used to locate infra configuration was invalid.
    #[error("invalid glob pattern `{pattern}`")]
    InvalidGlob {
        /// The pattern.
        pattern: String,

        /// The underlying error.
        #[source]
        error: globset::Error,
    },

    /// A generated file on disk could not be read.
    #[error("failed to read generated file `{path}`")]
    ReadOutput {
        /// The path of the file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Generated files on disk differ from freshly generated output.
    #[error(
        "The following files have not been properly autogenerated by bbgen: {}",
        files.iter().join(", ")
    )]
    StaleFiles {
        /// The stale file names, relative to the output directory.
        files: Vec<String>,
    },

    /// A swarmed test is missing required dimensions.
    #[error("{waterfall}: {builder} / {test} : {problem}")]
    InvalidSwarming {
        /// The waterfall name.
        waterfall: String,
        /// The builder name.
        builder: String,
        /// The test name.
        test: String,
        /// What is wrong.
        problem: SwarmingProblem,
    },
}

/// An error that occurred while evaluating a query.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// The query string could not be parsed.
    #[error("invalid query `{query}`: {reason}")]
    Malformed {
        /// The query string.
        query: String,
        /// Why it is invalid.
        reason: String,
    },

    /// The query names a bot that doesn't exist.
    #[error("No bot named '{0}' found.")]
    UnknownBot(String),

    /// The query names a test that doesn't exist.
    #[error("There is no test named {0}.")]
    UnknownTest(String),

    /// Resolving the configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl QueryError {
    pub(crate) fn malformed(query: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            query: query.to_owned(),
            reason: reason.into(),
        }
    }
}

/// An error that occurred while writing a generated file.
#[derive(Debug, Error)]
#[error("failed to write `{path}`")]
pub struct WriteOutputError {
    /// The path being written.
    pub path: Utf8PathBuf,

    /// The underlying error.
    #[source]
    pub error: io::Error,
}
