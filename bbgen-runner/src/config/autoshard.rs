// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ConfigError;
use indexmap::IndexMap;
use serde::Deserialize;

/// Shard counts computed by the autosharder, applied after generation.
///
/// Waterfall name to builder name to test name to shard count.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct AutoshardExceptions {
    waterfalls: IndexMap<String, IndexMap<String, IndexMap<String, ShardInfo>>>,
}

#[derive(Clone, Debug, Deserialize)]
struct ShardInfo {
    shards: ShardCount,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum ShardCount {
    Int(u64),
    Str(String),
}

impl AutoshardExceptions {
    /// Returns true if there are no overrides.
    pub fn is_empty(&self) -> bool {
        self.waterfalls.is_empty()
    }

    /// Returns the shard count for a test on a builder, if there is one.
    pub fn shards_for(
        &self,
        waterfall: &str,
        builder: &str,
        test_name: &str,
    ) -> Result<Option<u64>, ConfigError> {
        let Some(info) = self
            .waterfalls
            .get(waterfall)
            .and_then(|builders| builders.get(builder))
            .and_then(|tests| tests.get(test_name))
        else {
            return Ok(None);
        };

        match &info.shards {
            ShardCount::Int(count) => Ok(Some(*count)),
            ShardCount::Str(count) => count.trim().parse().map(Some).map_err(|_| {
                ConfigError::structural(format!(
                    "invalid autoshard count {count:?} for {test_name} on {builder} ({waterfall})"
                ))
            }),
        }
    }
}
