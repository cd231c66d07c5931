// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Parser for `.pyl` files, the Python-literal format that waterfall, test
//! suite, mixin and variant definitions are written in.
//!
//! The parsed result is a [`serde_json::Value`] whose objects preserve key
//! order, so typed records can be deserialized from it directly.

pub mod errors;
mod parsing;

use errors::PylParseError;
use serde_json::Value;

/// Parses a `.pyl` document into a JSON value.
///
/// Tuples are read as arrays and `None` as `null`. Dictionary keys must be
/// strings and must be unique within their dictionary.
pub fn parse(input: &str) -> Result<Value, PylParseError> {
    parsing::parse(input)?.into_value(input)
}
