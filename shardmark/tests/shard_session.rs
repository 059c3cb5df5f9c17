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

use std::time::Duration;

use shardmark::{
    config::{CHECKPOINT_INTERVAL_MS, SHARD_ID},
    CheckpointConfigBuilder, CheckpointCoordinator, InMemoryCheckpointStore, PositionTracker,
    StreamPosition,
};

const SHARD: &str = "shardId-000000000003";

// Batches as a record handler would see them: (sequence number, sub sequence).
const BATCHES: [&[(&str, u64)]; 3] = [
    &[
        ("49590338271490256608559692538361571095921575989136588898", 0),
        ("49590338271490256608559692538361571095921575989136588898", 1),
    ],
    &[
        ("49590338271490256608559692540925702759324208523137515618", 0),
        // A retransmitted record from the first batch.
        ("49590338271490256608559692538361571095921575989136588898", 1),
    ],
    &[
        ("49590338271490256608559692540925702759324208523137515618", 4),
        ("not-a-sequence-number", 0),
    ],
];

#[tokio::test(start_paused = true)]
async fn test_session_checkpoints_largest_position() {
    let config = CheckpointConfigBuilder::new()
        .set(SHARD_ID, SHARD)
        .set(CHECKPOINT_INTERVAL_MS, "10000")
        .build()
        .unwrap();

    let store = InMemoryCheckpointStore::new();
    let coordinator = CheckpointCoordinator::from_config(store.checkpointer(SHARD), &config);

    let mut tracker = PositionTracker::new();
    let mut rejected = 0;

    for batch in BATCHES {
        for (sequence, sub_sequence) in batch {
            match StreamPosition::parse(sequence, *sub_sequence) {
                Ok(position) => {
                    tracker.observe(position);
                }
                Err(_) => rejected += 1,
            }
        }

        coordinator.submit(tracker.largest().clone()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    assert_eq!(rejected, 1);

    // The first batch committed straight away, the rest is still throttled.
    assert_eq!(
        store.get_checkpoint(SHARD),
        Some(
            StreamPosition::parse("49590338271490256608559692538361571095921575989136588898", 1)
                .unwrap()
        )
    );
    assert!(!store.is_shut_down(SHARD));

    coordinator.shutdown().await.unwrap().await.unwrap();

    assert_eq!(
        store.get_checkpoint(SHARD),
        Some(
            StreamPosition::parse("49590338271490256608559692540925702759324208523137515618", 4)
                .unwrap()
        )
    );
    assert!(store.is_shut_down(SHARD));
}

#[test]
fn test_position_wire_shape() {
    let position =
        StreamPosition::parse("49590338271490256608559692538361571095921575989136588898", 2)
            .unwrap();

    let json = serde_json::to_value(&position).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "sequenceNumber": "49590338271490256608559692538361571095921575989136588898",
            "subSequenceNumber": 2,
        })
    );

    let unset = serde_json::to_value(&StreamPosition::UNSET).unwrap();
    assert_eq!(unset["sequenceNumber"], serde_json::Value::Null);

    let parsed: StreamPosition =
        serde_json::from_str(r#"{"sequenceNumber": "0042"}"#).unwrap();
    assert_eq!(parsed, StreamPosition::new(42u64, 0));

    assert!(serde_json::from_str::<StreamPosition>(r#"{"sequenceNumber": "4x2"}"#).is_err());
}
