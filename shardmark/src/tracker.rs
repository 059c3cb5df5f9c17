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

use crate::position::StreamPosition;

/// Largest position a record handler has seen for its shard.
///
/// The coordinator trusts the order in which positions are submitted, so a
/// handler that may see records out of order filters through this first
/// and only submits [`PositionTracker::largest`].
#[derive(Debug, Default, Clone)]
pub struct PositionTracker {
    largest: StreamPosition,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn largest(&self) -> &StreamPosition {
        &self.largest
    }

    /// Returns true if the tracker advanced.
    pub fn observe(&mut self, position: StreamPosition) -> bool {
        if position.supersedes(&self.largest) {
            self.largest = position;
            true
        } else {
            false
        }
    }

    pub fn observe_all<I>(&mut self, positions: I) -> bool
    where
        I: IntoIterator<Item = StreamPosition>,
    {
        positions
            .into_iter()
            .fold(false, |advanced, position| self.observe(position) || advanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_starts_unset() {
        let tracker = PositionTracker::new();

        assert!(tracker.largest().is_unset());
    }

    #[test]
    fn test_tracker_ignores_regressions() {
        let mut tracker = PositionTracker::new();

        assert!(tracker.observe(StreamPosition::new(30u64, 0)));
        assert!(!tracker.observe(StreamPosition::new(20u64, 5)));
        assert!(!tracker.observe(StreamPosition::new(30u64, 0)));
        assert!(tracker.observe(StreamPosition::new(30u64, 1)));

        assert_eq!(tracker.largest(), &StreamPosition::new(30u64, 1));
    }

    #[test]
    fn test_tracker_observe_all() {
        let mut tracker = PositionTracker::new();

        let advanced = tracker.observe_all(vec![
            StreamPosition::new(5u64, 0),
            StreamPosition::new(9u64, 0),
            StreamPosition::new(7u64, 0),
        ]);

        assert!(advanced);
        assert_eq!(tracker.largest(), &StreamPosition::new(9u64, 0));

        assert!(!tracker.observe_all(vec![StreamPosition::new(1u64, 0)]));
    }
}
