// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for bbgen, the buildbot test specification generator.
//!
//! The basic flow is:
//!
//! 1. [`LoadedConfig::load`](config::LoadedConfig::load) reads and validates
//!    the `.pyl` configuration files.
//! 2. [`Generator::new`](generate::Generator::new) resolves compound and
//!    matrix test suites once.
//! 3. [`Generator::generate_outputs`](generate::Generator::generate_outputs)
//!    produces a spec per waterfall, which can be written to disk, compared
//!    against the checked-in files by [`check::ConsistencyChecker`], or
//!    explored with [`query::QueryRunner`].

pub mod check;
pub mod config;
pub mod errors;
pub mod generate;
mod helpers;
pub mod query;
pub mod resolve;
