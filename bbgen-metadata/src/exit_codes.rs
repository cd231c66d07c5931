// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `bbgen` failures.
///
/// `bbgen` runs may fail for a variety of reasons. This structure documents the exit codes that
/// may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum BbgenExitCode {}

impl BbgenExitCode {
    /// No errors occurred and bbgen exited normally.
    pub const OK: i32 = 0;

    /// A user issue happened while setting up a bbgen invocation: for example, an input file
    /// could not be read or parsed, or the tool settings were invalid.
    pub const SETUP_ERROR: i32 = 96;

    /// The test configuration is invalid: an unknown mixin or suite was referenced, composite
    /// suites conflict, a replacement target was not found, and so on.
    pub const INVALID_CONFIG: i32 = 97;

    /// `bbgen --check` found that the inputs are inconsistent or that checked-in output files
    /// are stale.
    pub const CHECK_FAILED: i32 = 98;

    /// A `--query` was malformed or named a bot or test that doesn't exist.
    pub const QUERY_FAILED: i32 = 99;

    /// Writing generated files, query results or data to stdout produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
