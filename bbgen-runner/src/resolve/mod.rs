// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolving loaded configuration into concrete tests.
//!
//! Suites are resolved once, up front, into [`ResolvedSuites`]. Each test is
//! then run through [`TestResolver::apply_common_transformations`] for every
//! builder it is attached to.

mod composition;
mod conditionals;
mod exceptions;
mod magic;
mod mixins;
mod pipeline;
mod variants;

pub(crate) use conditionals::CONDITIONAL_SWARMING_KEYS;
pub use composition::{CompositionKind, ResolvedSuite, ResolvedSuites, SuiteEntry};
pub use magic::{MAGIC_SUBSTITUTION_PREFIX, MagicSubstitution};
pub use mixins::apply_mixin;
pub use pipeline::{BuilderContext, TestResolver, TransformOptions};
