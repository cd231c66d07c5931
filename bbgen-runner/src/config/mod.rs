// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loading the buildbot configuration and bbgen's own settings.
//!
//! Configuration files are read once and deserialized into typed records.
//! Test configurations stay as insertion-ordered JSON maps, since arbitrary
//! fields pass straight through to the generated output.

mod autoshard;
mod exceptions;
mod input;
mod isolate_map;
mod loader;
mod settings;
mod suites;
mod validate;
mod variants;
mod waterfalls;

pub use autoshard::*;
pub use exceptions::*;
pub use input::*;
pub use isolate_map::*;
pub use loader::*;
pub use settings::*;
pub use suites::*;
pub use variants::*;
pub use waterfalls::*;

/// A test configuration: a JSON object with arbitrary fields.
pub type TestConfig = serde_json::Map<String, serde_json::Value>;

/// A mixin: a partial test configuration merged into tests by name.
pub type Mixin = TestConfig;
