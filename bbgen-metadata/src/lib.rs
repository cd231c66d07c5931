// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to the test specifications generated by `bbgen`.
//!
//! Generated `<waterfall>.json` files map builder names to [`BuilderSpec`]s.
//! The [`json`] module writes them out in the stable textual form that
//! consistency checks diff against.

mod exit_codes;
pub mod json;
mod spec;

pub use exit_codes::*;
pub use spec::*;
