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

//! Throttled, single writer checkpoint pipeline for one shard.
//!
//! All mutable checkpoint state lives inside a single actor task that is only
//! reachable through its mailbox. Positions and the shutdown request travel
//! through the same mailbox, so a shutdown can pre-empt a debounce wait that
//! is already in progress.

use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::{ready, Future};
use pin_project_lite::pin_project;
use tokio::{
    select,
    sync::{mpsc, oneshot},
    task::{JoinError, JoinHandle},
    time::Instant,
};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::{
    checkpointer::{Checkpointer, CheckpointerError},
    config::CheckpointConfig,
    position::StreamPosition,
};

// A single slot makes submit a handoff: the caller waits until the actor
// has room for the value, nothing is dropped.
const MAILBOX_CAPACITY: usize = 1;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointCoordinatorError {
    #[error("CheckpointCoordinatorError::Terminated: checkpoint actor is no longer running")]
    Terminated,
    #[error("CheckpointCoordinatorError::CheckpointFailed: failed to checkpoint position {}, caused by: {}", position, err)]
    CheckpointFailed {
        position: StreamPosition,
        err: CheckpointerError,
    },
    #[error("CheckpointCoordinatorError::ShutdownFailed: checkpointer failed to shut down, caused by: {0}")]
    ShutdownFailed(CheckpointerError),
    #[error("CheckpointCoordinatorError::ActorPanicked: {0}")]
    ActorPanicked(#[from] JoinError),
}

enum Command {
    Checkpoint(StreamPosition),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable, submit only view of a [`CheckpointCoordinator`].
#[derive(Debug, Clone)]
pub struct CheckpointHandle {
    mailbox: mpsc::Sender<Command>,
}

impl CheckpointHandle {
    /// Hands `position` to the actor, waiting until the mailbox accepts it.
    ///
    /// The actor trusts submission order. A position submitted after a
    /// larger one replaces it as the next checkpoint.
    pub async fn submit(&self, position: StreamPosition) -> Result<(), CheckpointCoordinatorError> {
        self.mailbox
            .send(Command::Checkpoint(position))
            .await
            .map_err(|_| CheckpointCoordinatorError::Terminated)
    }

    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checkpoint(position) => write!(f, "Checkpoint({})", position),
            Self::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

pub struct CheckpointCoordinator {
    handle: CheckpointHandle,
    actor: JoinHandle<Result<(), CheckpointCoordinatorError>>,
}

impl CheckpointCoordinator {
    /// Starts the checkpoint actor on the current tokio runtime.
    pub fn new<C>(checkpointer: C, throttle_interval: Duration) -> Self
    where
        C: Checkpointer + Send + Sync + 'static,
    {
        let span = info_span!("checkpoint_coordinator");

        Self::spawn(checkpointer, throttle_interval, span)
    }

    pub fn from_config<C>(checkpointer: C, config: &CheckpointConfig) -> Self
    where
        C: Checkpointer + Send + Sync + 'static,
    {
        let span = info_span!("checkpoint_coordinator", shard_id = config.shard_id());

        Self::spawn(checkpointer, config.throttle_interval(), span)
    }

    fn spawn<C>(checkpointer: C, throttle_interval: Duration, span: Span) -> Self
    where
        C: Checkpointer + Send + Sync + 'static,
    {
        let (sender, receiver) = mpsc::channel(MAILBOX_CAPACITY);

        let actor = CheckpointActor {
            checkpointer,
            throttle_interval,
            mailbox: receiver,
            pending: StreamPosition::UNSET,
            last_checkpoint: None,
            checkpoints_sent: 0,
        };

        let actor = tokio::spawn(actor.run().instrument(span));

        Self {
            handle: CheckpointHandle { mailbox: sender },
            actor,
        }
    }

    pub fn handle(&self) -> CheckpointHandle {
        self.handle.clone()
    }

    pub async fn submit(&self, position: StreamPosition) -> Result<(), CheckpointCoordinatorError> {
        self.handle.submit(position).await
    }

    /// Requests a graceful shutdown.
    ///
    /// Returns once the actor has accepted the request. The returned signal
    /// resolves after the final checkpoint attempt and the checkpointer's
    /// own shutdown have both completed.
    pub async fn shutdown(self) -> Result<ShutdownSignal, CheckpointCoordinatorError> {
        let Self { handle, actor } = self;

        let (done_sender, done_receiver) = oneshot::channel();

        if handle
            .mailbox
            .send(Command::Shutdown(done_sender))
            .await
            .is_err()
        {
            return Err(actor_exit_error(actor.await));
        }

        Ok(ShutdownSignal {
            done: Some(done_receiver),
            actor,
        })
    }
}

fn actor_exit_error(
    exit: Result<Result<(), CheckpointCoordinatorError>, JoinError>,
) -> CheckpointCoordinatorError {
    match exit {
        Ok(Ok(())) => CheckpointCoordinatorError::Terminated,
        Ok(Err(e)) => e,
        Err(e) => CheckpointCoordinatorError::ActorPanicked(e),
    }
}

pin_project! {
    /// Completion handle returned by [`CheckpointCoordinator::shutdown`].
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct ShutdownSignal {
        done: Option<oneshot::Receiver<()>>,
        #[pin]
        actor: JoinHandle<Result<(), CheckpointCoordinatorError>>,
    }
}

impl Future for ShutdownSignal {
    type Output = Result<(), CheckpointCoordinatorError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if let Some(done) = this.done.as_mut() {
            match ready!(Pin::new(done).poll(cx)) {
                Ok(()) => return Poll::Ready(Ok(())),
                // The actor dropped the completion sender, its exit value says why.
                Err(_) => {
                    this.done.take();
                }
            }
        }

        let exit = ready!(this.actor.poll(cx));

        Poll::Ready(Err(actor_exit_error(exit)))
    }
}

struct CheckpointActor<C> {
    checkpointer: C,
    throttle_interval: Duration,
    mailbox: mpsc::Receiver<Command>,
    pending: StreamPosition,
    last_checkpoint: Option<Instant>,
    checkpoints_sent: u64,
}

impl<C> CheckpointActor<C>
where
    C: Checkpointer + Send + Sync,
{
    async fn run(mut self) -> Result<(), CheckpointCoordinatorError> {
        info!(
            "Checkpoint actor running, throttle interval: {:?}",
            self.throttle_interval
        );

        loop {
            let shutdown = match self.mailbox.recv().await {
                None => return self.close_abandoned().await,
                Some(Command::Shutdown(done)) => Some(done),
                Some(Command::Checkpoint(position)) => {
                    self.accept(position);
                    self.debounce().await
                }
            };

            self.flush().await?;

            if let Some(done) = shutdown {
                return self.finish(done).await;
            }
        }
    }

    fn accept(&mut self, position: StreamPosition) {
        if position.is_unset() {
            debug!("Ignoring unset position");
        } else {
            debug!("Received position: {}", position);
            self.pending = position;
        }
    }

    /// Waits out the rest of the throttle window, absorbing newer positions.
    ///
    /// Returns the completion sender if a shutdown request cut the wait short.
    async fn debounce(&mut self) -> Option<oneshot::Sender<()>> {
        // An interval too large to add to the clock never elapses, only a
        // newer position or a shutdown request ends the wait.
        let deadline = self.last_checkpoint?.checked_add(self.throttle_interval);

        match deadline {
            Some(deadline) if Instant::now() >= deadline => return None,
            Some(deadline) => debug!(
                "Within throttle window, debouncing for {:?}",
                deadline - Instant::now()
            ),
            None => debug!("Throttle window never elapses, debouncing until shutdown"),
        }

        let sleep = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => futures::future::pending().await,
            }
        };
        tokio::pin!(sleep);

        loop {
            select! {
                command = self.mailbox.recv() => match command {
                    Some(Command::Checkpoint(position)) => self.accept(position),
                    Some(Command::Shutdown(done)) => {
                        debug!("Shutdown requested while debouncing");
                        return Some(done);
                    }
                    None => {
                        if deadline.is_some() {
                            (&mut sleep).await;
                        }
                        return None;
                    }
                },
                () = &mut sleep => return None,
            }
        }
    }

    async fn flush(&mut self) -> Result<(), CheckpointCoordinatorError> {
        if self.pending.is_unset() {
            return Ok(());
        }

        let position = std::mem::take(&mut self.pending);

        if let Err(err) = self.checkpointer.checkpoint(position.clone()).await {
            error!("Failed to checkpoint position: {}, caused by: {}", position, err);

            return Err(CheckpointCoordinatorError::CheckpointFailed { position, err });
        }

        self.last_checkpoint = Some(Instant::now());
        self.checkpoints_sent += 1;

        info!(
            checkpoints_sent = self.checkpoints_sent,
            "Checkpointed position: {}", position
        );

        Ok(())
    }

    async fn finish(self, done: oneshot::Sender<()>) -> Result<(), CheckpointCoordinatorError> {
        info!("Shutting down checkpointer...");

        if let Err(err) = self.checkpointer.shutdown().await {
            error!("Checkpointer failed to shut down: {}", err);

            return Err(CheckpointCoordinatorError::ShutdownFailed(err));
        }

        // The requester may have stopped waiting, that is not an error here.
        let _ = done.send(());

        info!("Checkpoint actor stopped.");

        Ok(())
    }

    async fn close_abandoned(mut self) -> Result<(), CheckpointCoordinatorError> {
        warn!("Every coordinator handle dropped without a shutdown request, flushing and stopping.");

        self.flush().await
    }
}
