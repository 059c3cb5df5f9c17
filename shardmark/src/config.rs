/*
 * Copyright 2024 Thaddeus Treloar
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

use std::{collections::HashMap, time::Duration};

use serde::Deserialize;
use tracing::warn;

pub const SHARD_ID: &str = "shard.id";
pub const CHECKPOINT_INTERVAL_MS: &str = "checkpoint.interval.ms";

const DEFAULT_CHECKPOINT_INTERVAL_MS: u64 = 60_000;

const REQUIRED_FIELDS: [&str; 1] = [SHARD_ID];

const DEFAULT_FIELDS: [(&str, &str); 1] = [(CHECKPOINT_INTERVAL_MS, "60000")];

const KNOWN_FIELDS: [&str; 2] = [SHARD_ID, CHECKPOINT_INTERVAL_MS];

#[derive(Debug, thiserror::Error)]
pub enum CheckpointConfigError {
    #[error("CheckpointConfigError::MissingConfig: missing required fields {:?}", configs)]
    MissingConfig { configs: Vec<&'static str> },
    #[error("CheckpointConfigError::InvalidInterval: '{}' is not a valid value for '{}'", value, CHECKPOINT_INTERVAL_MS)]
    InvalidInterval { value: String },
    #[error("CheckpointConfigError::ZeroInterval: '{}' must be greater than zero", CHECKPOINT_INTERVAL_MS)]
    ZeroInterval,
    #[error("CheckpointConfigError::ParseError: {0}")]
    ParseError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawCheckpointConfig")]
pub struct CheckpointConfig {
    shard_id: String,
    throttle_interval: Duration,
}

impl CheckpointConfig {
    pub fn new(shard_id: impl Into<String>, throttle_interval: Duration) -> Self {
        Self {
            shard_id: shard_id.into(),
            throttle_interval,
        }
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    pub fn throttle_interval(&self) -> Duration {
        self.throttle_interval
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Deserialize)]
struct RawCheckpointConfig {
    #[serde(rename = "shard.id")]
    shard_id: String,
    #[serde(rename = "checkpoint.interval.ms", default = "default_interval_ms")]
    checkpoint_interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    DEFAULT_CHECKPOINT_INTERVAL_MS
}

impl TryFrom<RawCheckpointConfig> for CheckpointConfig {
    type Error = CheckpointConfigError;

    fn try_from(raw: RawCheckpointConfig) -> Result<Self, Self::Error> {
        if raw.checkpoint_interval_ms == 0 {
            return Err(CheckpointConfigError::ZeroInterval);
        }

        Ok(Self::new(
            raw.shard_id,
            Duration::from_millis(raw.checkpoint_interval_ms),
        ))
    }
}

#[derive(Debug, Clone, Default, derive_more::From)]
pub struct CheckpointConfigBuilder {
    config_map: HashMap<String, String>,
}

impl CheckpointConfigBuilder {
    pub fn new() -> Self {
        Self {
            ..Default::default()
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.config_map.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.config_map.get(key).map(String::as_str)
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> &mut Self {
        self.config_map.insert(key.into(), value.into());

        self
    }

    pub fn remove(&mut self, key: &str) -> &mut Self {
        self.config_map.remove(key);

        self
    }

    fn fill_defaults(mut self) -> Self {
        for (key, value) in DEFAULT_FIELDS {
            self.config_map
                .entry(key.to_owned())
                .or_insert_with(|| value.to_owned());
        }

        self
    }

    fn check_missing_required(self) -> Result<Self, CheckpointConfigError> {
        let missing_fields: Vec<_> = REQUIRED_FIELDS
            .into_iter()
            .filter(|field| !self.config_map.contains_key(*field))
            .collect();

        if !missing_fields.is_empty() {
            return Err(CheckpointConfigError::MissingConfig {
                configs: missing_fields,
            });
        }

        Ok(self)
    }

    fn warn_unknown(self) -> Self {
        self.config_map
            .keys()
            .filter(|key| !KNOWN_FIELDS.iter().any(|known| *known == key.as_str()))
            .for_each(|key| warn!("Unknown checkpoint config key: '{}', ignoring.", key));

        self
    }

    pub fn build(&self) -> Result<CheckpointConfig, CheckpointConfigError> {
        let builder = self
            .clone()
            .fill_defaults()
            .check_missing_required()?
            .warn_unknown();

        // Both keys are present after the two passes above.
        let shard_id = builder.get(SHARD_ID).unwrap_or_default().to_owned();
        let raw_interval = builder.get(CHECKPOINT_INTERVAL_MS).unwrap_or_default();

        let interval_ms: u64 =
            raw_interval
                .trim()
                .parse()
                .map_err(|_| CheckpointConfigError::InvalidInterval {
                    value: raw_interval.to_owned(),
                })?;

        CheckpointConfig::try_from(RawCheckpointConfig {
            shard_id,
            checkpoint_interval_ms: interval_ms,
        })
    }
}
