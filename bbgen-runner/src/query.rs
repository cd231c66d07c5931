// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queries over bots and tests.
//!
//! A query is a `/`-separated path:
//!
//! | query                 | result                                          |
//! |-----------------------|-------------------------------------------------|
//! | `bots`                | every bot's generated tests, by category        |
//! | `bots/tests`          | every bot's generated tests as one list         |
//! | `bot/<name>`          | one bot's generated tests, by category          |
//! | `bot/<name>/tests`    | one bot's generated tests as one list           |
//! | `tests`               | every test definition, by test name             |
//! | `tests/<filters>`     | names of test definitions matching all filters  |
//! | `test/<name>`         | one test definition                             |
//! | `test/<name>/bots`    | the bots that run a test                        |
//!
//! Filters are separated by `&`. Each is either a flag like `--enable-gpu`,
//! which must appear in the test's `args`, or `key:value`.

use crate::{
    config::QuerySettings,
    errors::QueryError,
    generate::{Generator, TestCategory},
    resolve::{BuilderContext, SuiteEntry},
};
use bbgen_metadata::BuilderSpec;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// A parsed query.
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    /// `bots`
    Bots,
    /// `bots/tests`
    BotsTests,
    /// `bot/<name>`
    Bot(String),
    /// `bot/<name>/tests`
    BotTests(String),
    /// `tests`
    Tests,
    /// `tests/<filters>`
    TestsMatching(QueryFilter),
    /// `test/<name>`
    Test(String),
    /// `test/<name>/bots`
    TestBots(String),
}

impl Query {
    /// Parses a query string.
    pub fn parse(query: &str) -> Result<Self, QueryError> {
        let parts: Vec<&str> = query.split('/').collect();
        let slashes = parts.len() - 1;
        match parts[0] {
            "bots" => match parts[1..] {
                [] => Ok(Self::Bots),
                ["tests"] => Ok(Self::BotsTests),
                [_] => Err(QueryError::malformed(
                    query,
                    "This query should be in the format: bots/tests.",
                )),
                _ => Err(QueryError::malformed(
                    query,
                    format!("This query should have 0 or 1 '/', found {slashes} instead."),
                )),
            },
            "bot" => match parts[1..] {
                [bot] => Ok(Self::Bot(bot.to_owned())),
                [bot, "tests"] => Ok(Self::BotTests(bot.to_owned())),
                [_, _] => Err(QueryError::malformed(
                    query,
                    "The query should be in the format: bot/<bot-name>/tests.",
                )),
                _ => Err(QueryError::malformed(
                    query,
                    format!("Command should have 1 or 2 '/', found {slashes} instead."),
                )),
            },
            "tests" => match parts[1..] {
                [] => Ok(Self::Tests),
                [filters] => QueryFilter::parse(query, filters).map(Self::TestsMatching),
                _ => Err(QueryError::malformed(
                    query,
                    format!("The query should have 0 or 1 '/', found {slashes} instead."),
                )),
            },
            "test" => match parts[1..] {
                [test] => Ok(Self::Test(test.to_owned())),
                [test, "bots"] => Ok(Self::TestBots(test.to_owned())),
                [_, _] => Err(QueryError::malformed(
                    query,
                    "The query should be in the format: test/<test-name>/bots",
                )),
                _ => Err(QueryError::malformed(
                    query,
                    format!("The query should have 1 or 2 '/', found {slashes} instead."),
                )),
            },
            _ => Err(QueryError::malformed(
                query,
                "Your command did not match any valid commands. \
                 Try starting with 'bots', 'bot', 'tests', or 'test'.",
            )),
        }
    }
}

/// Filters for a `tests/...` query: parameter name to expected value.
///
/// Flags map to `true`. Values spelled `true` or `false` (in any case) are
/// booleans, anything else a string. A repeated parameter keeps its last
/// value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryFilter {
    params: IndexMap<String, Value>,
}

impl QueryFilter {
    fn parse(query: &str, filters: &str) -> Result<Self, QueryError> {
        let mut params = IndexMap::new();
        for param in filters.split('&') {
            if param.starts_with("--") {
                params.insert(param.to_owned(), Value::Bool(true));
                continue;
            }
            let pair: Vec<&str> = param.split(':').collect();
            let [key, value] = pair[..] else {
                return Err(QueryError::malformed(query, "Invalid command."));
            };
            let value = match value.to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(value.to_owned()),
            };
            params.insert(key.to_owned(), value);
        }
        Ok(Self { params })
    }

    /// Returns true if the test definition matches every filter. A test
    /// expanded into several configurations matches if any of them does.
    pub fn matches(&self, entry: &SuiteEntry, settings: &QuerySettings) -> bool {
        entry
            .configs()
            .iter()
            .any(|test| self.matches_test(test, settings))
    }

    fn matches_test(&self, test: &Map<String, Value>, settings: &QuerySettings) -> bool {
        self.params.iter().all(|(param, expected)| {
            let is_dimension = settings.dimension_params.contains(param);
            let is_swarming = settings.swarming_params.contains(param);
            if is_dimension || is_swarming {
                let Some(swarming) = test.get("swarming") else {
                    return false;
                };
                if is_swarming {
                    // Swarming fields are compared as text, so "shards:4"
                    // matches an integer.
                    swarming
                        .get(param)
                        .is_some_and(|actual| PythonStr(actual).to_string() == PythonStr(expected).to_string())
                } else {
                    swarming
                        .get("dimensions")
                        .and_then(|dimensions| dimensions.get(param))
                        .is_some_and(|actual| actual == expected)
                }
            } else if param.starts_with("--") {
                test.get("args")
                    .and_then(Value::as_array)
                    .is_some_and(|args| args.iter().any(|arg| arg.as_str() == Some(param)))
            } else {
                test.get(param).is_some_and(|actual| actual == expected)
            }
        })
    }
}

/// Formats a JSON scalar the way Python's `str` would.
struct PythonStr<'a>(&'a Value);

impl fmt::Display for PythonStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Null => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// Runs queries against generated tests and resolved suites.
#[derive(Debug)]
pub struct QueryRunner<'g, 'cfg> {
    generator: &'g Generator<'cfg>,
    settings: &'g QuerySettings,
}

impl<'g, 'cfg> QueryRunner<'g, 'cfg> {
    /// Creates a new query runner.
    pub fn new(generator: &'g Generator<'cfg>, settings: &'g QuerySettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    /// Runs a query, returning its result as JSON.
    pub fn run(&self, query: &Query) -> Result<Value, QueryError> {
        debug!(?query, "running query");
        match query {
            Query::Bots => {
                let bots = self.bots()?;
                Ok(Value::Object(
                    bots.iter()
                        .map(|(name, spec)| (name.clone(), builder_value(spec)))
                        .collect(),
                ))
            }
            Query::BotsTests => {
                let bots = self.bots()?;
                Ok(Value::Object(
                    bots.iter()
                        .map(|(name, spec)| (name.clone(), Value::Array(flatten_tests(spec))))
                        .collect(),
                ))
            }
            Query::Bot(name) | Query::BotTests(name) => {
                let bots = self.bots()?;
                let spec = bots
                    .get(name)
                    .ok_or_else(|| QueryError::UnknownBot(name.clone()))?;
                if matches!(query, Query::Bot(_)) {
                    Ok(builder_value(spec))
                } else {
                    Ok(Value::Array(flatten_tests(spec)))
                }
            }
            Query::Tests => Ok(Value::Object(
                self.generator
                    .resolved_suites()
                    .flattened_tests()
                    .into_iter()
                    .map(|(name, entry)| (name.to_owned(), entry_value(entry)))
                    .collect(),
            )),
            Query::TestsMatching(filter) => Ok(Value::Array(
                self.generator
                    .resolved_suites()
                    .flattened_tests()
                    .into_iter()
                    .filter(|(_, entry)| filter.matches(entry, self.settings))
                    .map(|(name, _)| Value::String(name.to_owned()))
                    .collect(),
            )),
            Query::Test(name) => self
                .generator
                .resolved_suites()
                .flattened_tests()
                .get(name.as_str())
                .map(|entry| entry_value(entry))
                .ok_or_else(|| QueryError::UnknownTest(name.clone())),
            Query::TestBots(name) => {
                let bots = self.bots()?;
                let matching = bots
                    .iter()
                    .filter(|(_, spec)| {
                        spec.iter_tests().any(|(_, test)| {
                            test.get("name").and_then(Value::as_str) == Some(name.as_str())
                        })
                    })
                    .map(|(bot, _)| Value::String(bot.clone()));
                Ok(Value::Array(matching.collect()))
            }
        }
    }

    /// Generates tests for every bot on every waterfall. A bot name used on
    /// several waterfalls keeps the last waterfall's tests.
    fn bots(&self) -> Result<IndexMap<String, BuilderSpec>, QueryError> {
        let mut bots = IndexMap::new();
        for waterfall in self.generator.config().waterfalls() {
            for (name, config) in &waterfall.machines {
                let spec = self.generator.generate_builder(BuilderContext {
                    waterfall,
                    name,
                    config,
                })?;
                bots.insert(name.clone(), spec);
            }
        }
        Ok(bots)
    }
}

fn builder_value(spec: &BuilderSpec) -> Value {
    let mut map = Map::new();
    if let Some(targets) = &spec.additional_compile_targets {
        map.insert("additional_compile_targets".to_owned(), targets.clone());
    }
    for (category, tests) in &spec.tests {
        map.insert(
            category.clone(),
            Value::Array(tests.iter().cloned().map(Value::Object).collect()),
        );
    }
    Value::Object(map)
}

/// Lists a bot's tests across categories, in category order.
fn flatten_tests(spec: &BuilderSpec) -> Vec<Value> {
    TestCategory::ALL
        .iter()
        .filter_map(|category| spec.tests.get(category.name()))
        .flatten()
        .cloned()
        .map(Value::Object)
        .collect()
}

fn entry_value(entry: &SuiteEntry) -> Value {
    match entry {
        SuiteEntry::Single(test) => Value::Object(test.clone()),
        SuiteEntry::Expanded(tests) => {
            Value::Array(tests.iter().cloned().map(Value::Object).collect())
        }
    }
}
