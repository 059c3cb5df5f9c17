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

pub mod checkpointer;
pub mod config;
pub mod coordinator;
pub mod init;
pub mod position;
pub mod tracker;

pub use checkpointer::{
    Checkpointer, CheckpointerError, InMemoryCheckpointStore, InMemoryCheckpointer,
};
pub use config::{CheckpointConfig, CheckpointConfigBuilder, CheckpointConfigError};
pub use coordinator::{
    CheckpointCoordinator, CheckpointCoordinatorError, CheckpointHandle, ShutdownSignal,
};
pub use position::{PositionParseError, SequenceNumber, StreamPosition};
pub use tracker::PositionTracker;
