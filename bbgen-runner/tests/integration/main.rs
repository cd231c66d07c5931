// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests that load `.pyl` files from disk and run them through
//! generation, consistency checks and queries.

mod consistency;
mod fixtures;
mod generation;
mod queries;
