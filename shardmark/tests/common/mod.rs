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

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use shardmark::{Checkpointer, CheckpointerError, StreamPosition};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Checkpoint(StreamPosition),
    Shutdown,
}

/// Checkpointer that records every call and when it returned.
#[derive(Clone)]
pub struct RecordingCheckpointer {
    calls: Arc<Mutex<Vec<(Instant, Call)>>>,
    shutdown_delay: Duration,
    fail_checkpoint: bool,
    fail_shutdown: bool,
}

impl RecordingCheckpointer {
    pub fn new() -> Self {
        Self {
            calls: Default::default(),
            shutdown_delay: Duration::ZERO,
            fail_checkpoint: false,
            fail_shutdown: false,
        }
    }

    pub fn with_shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = delay;
        self
    }

    pub fn failing_checkpoint(mut self) -> Self {
        self.fail_checkpoint = true;
        self
    }

    pub fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(_, call)| call.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().clone()
    }

    pub fn checkpoints(&self) -> Vec<(Instant, StreamPosition)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|(at, call)| match call {
                Call::Checkpoint(position) => Some((*at, position.clone())),
                Call::Shutdown => None,
            })
            .collect()
    }

    pub fn shutdown_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(_, call)| *call == Call::Shutdown)
            .count()
    }
}

impl Checkpointer for RecordingCheckpointer {
    async fn checkpoint(&self, position: StreamPosition) -> Result<(), CheckpointerError> {
        if self.fail_checkpoint {
            return Err(CheckpointerError::fatal("lease lost"));
        }

        self.calls.lock().push((Instant::now(), Call::Checkpoint(position)));

        Ok(())
    }

    async fn shutdown(&self) -> Result<(), CheckpointerError> {
        if !self.shutdown_delay.is_zero() {
            tokio::time::sleep(self.shutdown_delay).await;
        }

        if self.fail_shutdown {
            return Err(CheckpointerError::fatal("connection closed"));
        }

        self.calls.lock().push((Instant::now(), Call::Shutdown));

        Ok(())
    }
}

pub fn position(sequence: u64) -> StreamPosition {
    StreamPosition::new(sequence, 0)
}

/// Lets the actor drain whatever is already in its mailbox.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
