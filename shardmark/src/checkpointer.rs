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

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tracing::debug;

use crate::position::StreamPosition;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointerError {
    #[error("CheckpointerError::Fatal: {0}")]
    Fatal(Box<dyn std::error::Error + Send + Sync>),
}

impl CheckpointerError {
    pub fn fatal<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Fatal(err.into())
    }
}

/// Durable sink for shard progress.
///
/// The coordinator awaits each call to completion before handling its next
/// message, so implementations are never driven concurrently by the same
/// coordinator.
#[trait_variant::make(Send)]
pub trait Checkpointer {
    async fn checkpoint(&self, position: StreamPosition) -> Result<(), CheckpointerError>;

    /// Called exactly once, after the final checkpoint attempt.
    async fn shutdown(&self) -> Result<(), CheckpointerError>;
}

/// Shared in-process store of the latest checkpoint per shard.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<DashMap<String, StreamPosition>>,
    shut_down: Arc<DashSet<String>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpointer(&self, shard_id: &str) -> InMemoryCheckpointer {
        InMemoryCheckpointer {
            shard_id: shard_id.to_owned(),
            store: self.clone(),
        }
    }

    pub fn get_checkpoint(&self, shard_id: &str) -> Option<StreamPosition> {
        self.checkpoints
            .get(shard_id)
            .map(|position| position.value().clone())
    }

    pub fn is_shut_down(&self, shard_id: &str) -> bool {
        self.shut_down.contains(shard_id)
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryCheckpointer {
    shard_id: String,
    store: InMemoryCheckpointStore,
}

impl InMemoryCheckpointer {
    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }
}

impl Checkpointer for InMemoryCheckpointer {
    async fn checkpoint(&self, position: StreamPosition) -> Result<(), CheckpointerError> {
        debug!("Storing checkpoint for shard: {}, position: {}", self.shard_id, position);

        self.store
            .checkpoints
            .insert(self.shard_id.clone(), position);

        Ok(())
    }

    async fn shutdown(&self) -> Result<(), CheckpointerError> {
        debug!("Marking shard: {} as shut down", self.shard_id);

        self.store.shut_down.insert(self.shard_id.clone());

        Ok(())
    }
}
