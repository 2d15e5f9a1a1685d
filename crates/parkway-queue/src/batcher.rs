// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Asynchronous command batcher.
//!
//! `finish`, `notify`, `register_callback` and `set_to_error` do not touch
//! the store on the caller's task. They enqueue a [`BatchCommand`] on a
//! bounded channel and return; a single worker drains the channel and
//! applies up to `max_batch` commands per transaction.
//!
//! Every command is idempotent, so a batch that is retried, or re-applied
//! one command at a time after a permanent failure, leaves the same state.

use std::time::Instant;

use async_trait::async_trait;
use sqlx::AnyConnection;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, env_positive};
use crate::error::{QueueError, Result};
use crate::model::{ProcessingState, RegisterCall, WaitState, now_millis, to_millis};
use crate::retry::Transactional;
use crate::stats::points;
use crate::store::{Store, placeholders};

/// Correlation ids bound per `IN (...)` list.
const ID_CHUNK: usize = 500;

/// `last_error` of an instance whose every correlation id is owned elsewhere.
const COLLIDED_WAITS: &str = "all correlation ids are awaited by other instances";

/// Command batcher sizing.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Commands buffered before `submit` waits and `try_submit` fails.
    pub capacity: usize,
    /// Maximum commands applied per transaction.
    pub max_batch: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_batch: 100,
        }
    }
}

impl BatcherConfig {
    /// Load configuration from environment variables.
    ///
    /// - `PARKWAY_BATCHER_CAPACITY`: channel bound (default: 1024)
    /// - `PARKWAY_BATCHER_MAX_BATCH`: commands per transaction (default: 100)
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            capacity: env_positive("PARKWAY_BATCHER_CAPACITY", defaults.capacity)?,
            max_batch: env_positive("PARKWAY_BATCHER_MAX_BATCH", defaults.max_batch)?,
        })
    }
}

/// A deferred store mutation.
#[derive(Debug, Clone)]
pub enum BatchCommand {
    /// Store a response; a response already stored for the id wins.
    RecordResponse {
        /// Correlation id being answered.
        correlation_id: String,
        /// Response body.
        payload: Option<Vec<u8>>,
    },
    /// Suspend an instance on new waits.
    RegisterWait(RegisterCall),
    /// Retire a finished instance.
    Remove {
        /// Finished instance.
        instance_id: String,
        /// Responses it consumed.
        correlation_ids: Vec<String>,
        /// Delete the row instead of marking it `FINISHED`.
        remove_when_finished: bool,
    },
    /// Mark an instance `ERROR`.
    SetToError {
        /// Failed instance.
        instance_id: String,
        /// Failure description stored in `last_error`.
        message: String,
    },
}

impl BatchCommand {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RecordResponse { .. } => "record_response",
            Self::RegisterWait(_) => "register_wait",
            Self::Remove { .. } => "remove",
            Self::SetToError { .. } => "set_to_error",
        }
    }

    async fn apply(&self, conn: &mut AnyConnection, now: i64) -> Result<()> {
        match self {
            Self::RecordResponse {
                correlation_id,
                payload,
            } => {
                sqlx::query(
                    "INSERT INTO workflow_response (correlation_id, payload, arrived_at) \
                     VALUES ($1, $2, $3) ON CONFLICT (correlation_id) DO NOTHING",
                )
                .bind(correlation_id)
                .bind(payload.clone())
                .bind(now)
                .execute(&mut *conn)
                .await?;
            }

            Self::RegisterWait(call) => register_wait(&mut *conn, call, now).await?,

            Self::Remove {
                instance_id,
                correlation_ids,
                remove_when_finished,
            } => {
                delete_responses(&mut *conn, correlation_ids).await?;
                sqlx::query("DELETE FROM workflow_wait WHERE instance_id = $1")
                    .bind(instance_id)
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("DELETE FROM workflow_queue WHERE instance_id = $1")
                    .bind(instance_id)
                    .execute(&mut *conn)
                    .await?;

                if *remove_when_finished {
                    sqlx::query("DELETE FROM workflow_instance WHERE id = $1")
                        .bind(instance_id)
                        .execute(&mut *conn)
                        .await?;
                } else {
                    sqlx::query(
                        "UPDATE workflow_instance SET state = $3, last_modified_at = $2 WHERE id = $1",
                    )
                    .bind(instance_id)
                    .bind(now)
                    .bind(ProcessingState::Finished.as_str())
                    .execute(&mut *conn)
                    .await?;
                }
            }

            // Waits and responses stay so a restart redelivers the same responses.
            Self::SetToError {
                instance_id,
                message,
            } => {
                sqlx::query(
                    "UPDATE workflow_instance SET state = $4, last_error = $2, last_modified_at = $3 WHERE id = $1",
                )
                .bind(instance_id)
                .bind(message)
                .bind(now)
                .bind(ProcessingState::Error.as_str())
                .execute(&mut *conn)
                .await?;
                sqlx::query("DELETE FROM workflow_queue WHERE instance_id = $1")
                    .bind(instance_id)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        Ok(())
    }
}

async fn register_wait(conn: &mut AnyConnection, call: &RegisterCall, now: i64) -> Result<()> {
    let updated = sqlx::query(
        "UPDATE workflow_instance SET state = $6, payload = $2, pool_id = $3, priority = $4, \
         last_modified_at = $5 WHERE id = $1",
    )
    .bind(&call.instance_id)
    .bind(call.payload.clone())
    .bind(&call.pool_id)
    .bind(call.priority)
    .bind(now)
    .bind(ProcessingState::Waiting.as_str())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        debug!(instance_id = %call.instance_id, "Instance gone, dropping wait registration");
        return Ok(());
    }

    delete_responses(&mut *conn, &call.consumed_correlation_ids).await?;
    sqlx::query("DELETE FROM workflow_wait WHERE instance_id = $1")
        .bind(&call.instance_id)
        .execute(&mut *conn)
        .await?;

    let min_responses = call.wait_mode.min_responses(call.correlation_ids.len());
    let timeout_at = call.timeout.map(to_millis);
    let mut registered = 0i64;
    for correlation_id in &call.correlation_ids {
        // A correlation id belongs to the instance that registered it first.
        let inserted = sqlx::query(
            "INSERT INTO workflow_wait \
             (correlation_id, instance_id, state, pool_id, priority, min_responses, timeout_at, registered_at) \
             VALUES ($1, $2, $8, $3, $4, $5, $6, $7) \
             ON CONFLICT (correlation_id) DO NOTHING",
        )
        .bind(correlation_id)
        .bind(&call.instance_id)
        .bind(&call.pool_id)
        .bind(call.priority)
        .bind(min_responses)
        .bind(timeout_at)
        .bind(now)
        .bind(WaitState::Waiting.as_str())
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if inserted == 0 {
            warn!(
                instance_id = %call.instance_id,
                correlation_id = %correlation_id,
                "Correlation id already awaited by another instance, skipping"
            );
        } else {
            registered += 1;
        }
    }

    if registered == 0 && !call.correlation_ids.is_empty() {
        sqlx::query(
            "UPDATE workflow_instance SET state = $2, last_error = $3, last_modified_at = $4 WHERE id = $1",
        )
        .bind(&call.instance_id)
        .bind(ProcessingState::Error.as_str())
        .bind(COLLIDED_WAITS)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    } else if registered < min_responses {
        sqlx::query("UPDATE workflow_wait SET min_responses = $2 WHERE instance_id = $1")
            .bind(&call.instance_id)
            .bind(registered)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

async fn delete_responses(conn: &mut AnyConnection, correlation_ids: &[String]) -> Result<()> {
    for chunk in correlation_ids.chunks(ID_CHUNK) {
        let sql = format!(
            "DELETE FROM workflow_response WHERE correlation_id IN ({})",
            placeholders(1, chunk.len())
        );
        let mut query = sqlx::query(&sql);
        for id in chunk {
            query = query.bind(id);
        }
        query.execute(&mut *conn).await?;
    }
    Ok(())
}

struct ApplyBatch<'a> {
    commands: &'a [BatchCommand],
}

#[async_trait]
impl Transactional for ApplyBatch<'_> {
    type Output = ();

    fn operation(&self) -> &'static str {
        "apply_batch"
    }

    async fn execute(&self, conn: &mut AnyConnection) -> Result<()> {
        let now = now_millis();
        for command in self.commands {
            command.apply(&mut *conn, now).await?;
        }
        Ok(())
    }
}

enum Envelope {
    Command(BatchCommand),
    Flush(oneshot::Sender<()>),
}

/// Submitting side of the batcher. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Batcher {
    sender: mpsc::Sender<Envelope>,
}

impl Batcher {
    /// Create the channel. Commands are buffered until the returned worker runs.
    pub fn channel(store: Store, config: BatcherConfig) -> (Batcher, BatchWorker) {
        let (sender, receiver) = mpsc::channel(config.capacity);
        (
            Batcher { sender },
            BatchWorker {
                store,
                receiver,
                max_batch: config.max_batch,
            },
        )
    }

    /// Submit a command, waiting for channel capacity.
    pub async fn submit(&self, command: BatchCommand) -> Result<()> {
        self.sender
            .send(Envelope::Command(command))
            .await
            .map_err(|_| QueueError::BatcherClosed)
    }

    /// Submit a command without waiting; fails with [`QueueError::BatcherFull`]
    /// when the channel is at capacity.
    pub fn try_submit(&self, command: BatchCommand) -> Result<()> {
        self.sender
            .try_send(Envelope::Command(command))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::BatcherFull,
                mpsc::error::TrySendError::Closed(_) => QueueError::BatcherClosed,
            })
    }

    /// Resolve once every command submitted before this call has been applied
    /// (or dropped after a permanent failure).
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Envelope::Flush(ack))
            .await
            .map_err(|_| QueueError::BatcherClosed)?;
        done.await.map_err(|_| QueueError::BatcherClosed)
    }
}

/// Receiving side of the batcher; applies commands against the store.
pub struct BatchWorker {
    store: Store,
    receiver: mpsc::Receiver<Envelope>,
    max_batch: usize,
}

impl BatchWorker {
    /// Apply commands until `shutdown` turns `true`, then close the channel
    /// and drain whatever is still buffered.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(max_batch = self.max_batch, "Command batcher started");

        loop {
            let first = tokio::select! {
                biased;

                envelope = self.receiver.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            let batch = self.collect(first);
            self.process(batch).await;
        }

        self.receiver.close();
        let mut drained = 0usize;
        while let Some(first) = self.receiver.recv().await {
            let batch = self.collect(first);
            drained += batch.len();
            self.process(batch).await;
        }

        info!(drained, "Command batcher stopped");
    }

    /// Take `first` plus whatever is already buffered, up to `max_batch` commands.
    fn collect(&mut self, first: Envelope) -> Vec<Envelope> {
        let mut commands = usize::from(matches!(first, Envelope::Command(_)));
        let mut batch = vec![first];
        while commands < self.max_batch {
            match self.receiver.try_recv() {
                Ok(envelope) => {
                    if matches!(envelope, Envelope::Command(_)) {
                        commands += 1;
                    }
                    batch.push(envelope);
                }
                Err(_) => break,
            }
        }
        batch
    }

    async fn process(&self, batch: Vec<Envelope>) {
        let mut commands = Vec::with_capacity(batch.len());
        let mut flushes = Vec::new();
        for envelope in batch {
            match envelope {
                Envelope::Command(command) => commands.push(command),
                Envelope::Flush(ack) => flushes.push(ack),
            }
        }

        self.apply(&commands).await;

        for ack in flushes {
            // The flusher may have given up waiting
            let _ = ack.send(());
        }
    }

    async fn apply(&self, commands: &[BatchCommand]) {
        if commands.is_empty() {
            return;
        }

        let started = Instant::now();
        match self.store.run(&ApplyBatch { commands }).await {
            Ok(()) => {
                self.store.record(points::BATCHER_APPLY, commands.len(), started.elapsed());
                debug!(count = commands.len(), "Applied command batch");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    count = commands.len(),
                    "Command batch failed, applying commands one by one"
                );
                for command in commands {
                    let single = ApplyBatch {
                        commands: std::slice::from_ref(command),
                    };
                    if let Err(e) = self.store.run(&single).await {
                        error!(
                            error = %e,
                            command = command.kind(),
                            "Dropping command that could not be applied"
                        );
                    }
                }
            }
        }
    }
}
