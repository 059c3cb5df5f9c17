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

use std::{
    cmp::Ordering,
    fmt::Display,
    hash::{Hash, Hasher},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionParseError {
    #[error("PositionParseError::Empty: sequence number is empty")]
    Empty,
    #[error("PositionParseError::InvalidDigit: '{}' is not a valid sequence number, found '{}' at index {}", input, found, index)]
    InvalidDigit {
        input: String,
        found: char,
        index: usize,
    },
}

/// Unsigned sequence number of unbounded width.
///
/// Shard sequence numbers routinely exceed the range of a u64 so the
/// value is kept as its normalised decimal digits. Normalised means no
/// leading zeros, which lets two numbers be ordered by digit count first
/// and lexicographically second.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceNumber {
    digits: String,
}

impl SequenceNumber {
    pub fn as_str(&self) -> &str {
        &self.digits
    }

    pub fn is_zero(&self) -> bool {
        self.digits == "0"
    }
}

impl FromStr for SequenceNumber {
    type Err = PositionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.is_empty() {
            return Err(PositionParseError::Empty);
        }

        if let Some((index, found)) = input.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
            return Err(PositionParseError::InvalidDigit {
                input: input.to_owned(),
                found,
                index,
            });
        }

        let trimmed = input.trim_start_matches('0');

        let digits = if trimmed.is_empty() {
            String::from("0")
        } else {
            trimmed.to_owned()
        };

        Ok(Self { digits })
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self {
            digits: value.to_string(),
        }
    }
}

impl From<u128> for SequenceNumber {
    fn from(value: u128) -> Self {
        Self {
            digits: value.to_string(),
        }
    }
}

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.digits)
    }
}

impl PartialOrd for SequenceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SequenceNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.digits
            .len()
            .cmp(&other.digits.len())
            .then_with(|| self.digits.cmp(&other.digits))
    }
}

impl Serialize for SequenceNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.digits)
    }
}

impl<'de> Deserialize<'de> for SequenceNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;

        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A point of progress within a single shard.
///
/// A position without a sequence number is unset, meaning nothing has been
/// observed yet. Unset sorts below every real position, including one with
/// sequence number zero. There is only one unset position, whatever its
/// sub sequence says.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamPosition {
    #[serde(rename = "sequenceNumber")]
    sequence: Option<SequenceNumber>,
    #[serde(rename = "subSequenceNumber", default)]
    sub_sequence: u64,
}

impl StreamPosition {
    pub const UNSET: Self = Self {
        sequence: None,
        sub_sequence: 0,
    };

    pub fn new(sequence: impl Into<SequenceNumber>, sub_sequence: u64) -> Self {
        Self {
            sequence: Some(sequence.into()),
            sub_sequence,
        }
    }

    pub fn parse(sequence: &str, sub_sequence: u64) -> Result<Self, PositionParseError> {
        Ok(Self {
            sequence: Some(sequence.parse()?),
            sub_sequence,
        })
    }

    pub fn is_unset(&self) -> bool {
        self.sequence.is_none()
    }

    pub fn sequence(&self) -> Option<&SequenceNumber> {
        self.sequence.as_ref()
    }

    pub fn sub_sequence(&self) -> u64 {
        self.sub_sequence
    }

    /// Whether a caller holding `current` should advance to `self`.
    pub fn supersedes(&self, current: &StreamPosition) -> bool {
        current.is_unset() || current < self
    }
}

impl Display for StreamPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sequence {
            None => f.write_str("<unset>"),
            Some(sequence) => write!(f, "{}:{}", sequence, self.sub_sequence),
        }
    }
}

impl PartialOrd for StreamPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StreamPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.sequence, &other.sequence) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(lhs), Some(rhs)) => lhs
                .cmp(rhs)
                .then_with(|| self.sub_sequence.cmp(&other.sub_sequence)),
        }
    }
}

impl PartialEq for StreamPosition {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for StreamPosition {}

impl Hash for StreamPosition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sequence.hash(state);

        if self.sequence.is_some() {
            self.sub_sequence.hash(state);
        }
    }
}
