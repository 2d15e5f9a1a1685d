// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The persistent queue engine.
//!
//! [`PersistentQueue`] is the caller-facing API. `insert`, `dequeue` and
//! `restart` each run as one retried transaction on the caller's task.
//! `finish`, `notify`, `register_callback` and `set_to_error` hand a command
//! to the [`Batcher`] and return before it is persisted.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use parkway_queue::{Backend, JsonCodec, PersistentQueue, WorkflowInstance};
//!
//! let queue = PersistentQueue::builder()
//!     .pool(pool)
//!     .backend(Backend::Postgres)
//!     .codec(JsonCodec::<serde_json::Value>::new())
//!     .build()?;
//! queue.startup().await?;
//!
//! queue.insert(&WorkflowInstance::new("billing", 5, serde_json::json!({"step": 0}))).await?;
//! for instance in queue.dequeue("billing", 10).await? {
//!     // run it, then:
//!     queue.finish(&instance).await?;
//! }
//!
//! queue.shutdown().await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{AnyConnection, AnyPool, Row};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::batcher::{BatchCommand, BatchWorker, Batcher};
use crate::codec::WorkflowCodec;
use crate::config::{ConfigError, QueueConfig};
use crate::dialect::Backend;
use crate::error::{QueueError, Result};
use crate::model::{
    ProcessingState, RESTARTABLE_STATE_PREDICATE, RegisterCall, Response, WaitMode, WorkflowInstance, from_millis,
    now_millis, to_millis,
};
use crate::reaper::{Reaper, delete_stale_responses};
use crate::reconciler::Reconciler;
use crate::recovery::recover;
use crate::retry::Transactional;
use crate::stats::{NullStatisticsCollector, StatisticsCollector, points};
use crate::store::{Store, placeholders};

/// Queue ids bound per `DELETE ... IN (...)` during dequeue.
const DELETE_CHUNK: usize = 100;

/// Builder for a [`PersistentQueue`].
pub struct PersistentQueueBuilder<C> {
    pool: Option<AnyPool>,
    backend: Option<Backend>,
    codec: Option<C>,
    config: QueueConfig,
    statistics: Arc<dyn StatisticsCollector>,
}

impl<C: WorkflowCodec> Default for PersistentQueueBuilder<C> {
    fn default() -> Self {
        Self {
            pool: None,
            backend: None,
            codec: None,
            config: QueueConfig::default(),
            statistics: Arc::new(NullStatisticsCollector),
        }
    }
}

impl<C: WorkflowCodec> PersistentQueueBuilder<C> {
    /// Set the connection pool (required).
    pub fn pool(mut self, pool: AnyPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set the backend the pool connects to (required).
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the workflow codec (required).
    pub fn codec(mut self, codec: C) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Set engine settings.
    ///
    /// Default: [`QueueConfig::default()`]
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the statistics collector.
    ///
    /// Default: [`NullStatisticsCollector`]
    pub fn statistics(mut self, statistics: Arc<dyn StatisticsCollector>) -> Self {
        self.statistics = statistics;
        self
    }

    /// Build the queue. Nothing touches the store until [`PersistentQueue::startup`].
    pub fn build(self) -> Result<PersistentQueue<C>> {
        let pool = self.pool.ok_or(ConfigError::Missing("pool"))?;
        let backend = self.backend.ok_or(ConfigError::Missing("backend"))?;
        let codec = self.codec.ok_or(ConfigError::Missing("codec"))?;
        self.config.validate()?;

        let store = Store::new(
            pool,
            backend.dialect(),
            self.config.retry.clone(),
            self.statistics,
        );
        let (batcher, worker) = Batcher::channel(store.clone(), self.config.batcher.clone());

        Ok(PersistentQueue {
            store,
            codec,
            config: self.config,
            batcher,
            serving: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::Idle(worker)),
        })
    }
}

enum Lifecycle {
    /// Built; the batch worker has not been spawned yet.
    Idle(BatchWorker),
    Running {
        shutdown: watch::Sender<bool>,
        tasks: Vec<(&'static str, JoinHandle<()>)>,
    },
    Stopped,
}

/// SQL-backed queue of suspended workflow instances.
pub struct PersistentQueue<C: WorkflowCodec> {
    store: Store,
    codec: C,
    config: QueueConfig,
    batcher: Batcher,
    serving: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

impl<C: WorkflowCodec> PersistentQueue<C> {
    /// Create a builder.
    pub fn builder() -> PersistentQueueBuilder<C> {
        PersistentQueueBuilder::default()
    }

    /// Store handle shared with the background tasks.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Engine settings.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Whether `startup` has completed and `shutdown` has not been called.
    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }

    /// Sweep stale responses, run crash recovery, then start the
    /// reconciler, the reaper and the batch worker.
    ///
    /// Fails with [`QueueError::AlreadyStarted`] on a second call. Any store
    /// failure is returned as [`QueueError::Startup`] and the queue keeps
    /// refusing dequeues.
    pub async fn startup(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !matches!(*lifecycle, Lifecycle::Idle(_)) {
            return Err(QueueError::AlreadyStarted);
        }

        info!("Starting persistent queue");

        if let Err(e) = self.prepare().await {
            error!(error = %e, "Persistent queue startup failed");
            return Err(QueueError::Startup(Box::new(e)));
        }

        let worker = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle(worker) => worker,
            other => {
                *lifecycle = other;
                return Err(QueueError::AlreadyStarted);
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);

        let reconciler = Reconciler::new(
            self.store.clone(),
            self.config.reconciler.clone(),
            shutdown_rx.clone(),
        );
        let reaper = Reaper::new(
            self.store.clone(),
            self.config.reaper.clone(),
            shutdown_rx.clone(),
        );

        let tasks = vec![
            ("reconciler", tokio::spawn(reconciler.run())),
            ("reaper", tokio::spawn(reaper.run())),
            ("batcher", tokio::spawn(worker.run(shutdown_rx))),
        ];

        *lifecycle = Lifecycle::Running { shutdown, tasks };
        self.serving.store(true, Ordering::SeqCst);

        info!("Persistent queue started");
        Ok(())
    }

    async fn prepare(&self) -> Result<()> {
        delete_stale_responses(&self.store, &self.config.reaper).await?;
        recover(&self.store, self.config.reconciler.recovery_batch_size).await?;
        Ok(())
    }

    /// Stop the background tasks and wait for them to finish.
    ///
    /// Buffered batcher commands are applied before this returns. Calling it
    /// again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.serving.store(false, Ordering::SeqCst);

        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running { shutdown, tasks } => {
                info!("Shutting down persistent queue");
                let _ = shutdown.send(true);
                for (name, task) in tasks {
                    if let Err(e) = task.await {
                        error!(task = name, error = %e, "Background task failed during shutdown");
                    }
                }
                info!("Persistent queue shutdown complete");
            }
            Lifecycle::Idle(worker) => {
                // Never started: closing the channel rejects further commands.
                drop(worker);
                debug!("Persistent queue shut down before startup");
            }
            Lifecycle::Stopped => {
                debug!("Persistent queue already shut down");
            }
        }

        Ok(())
    }

    /// Insert one instance as `READY` with a queue entry.
    pub async fn insert(&self, instance: &WorkflowInstance<C::Workflow>) -> Result<()> {
        self.insert_batch(std::slice::from_ref(instance)).await
    }

    /// Insert many instances in one transaction, `insert_chunk_size` rows per
    /// statement.
    ///
    /// Every workflow is encoded before anything is written, so a codec
    /// failure leaves the store untouched.
    pub async fn insert_batch(&self, instances: &[WorkflowInstance<C::Workflow>]) -> Result<()> {
        if instances.is_empty() {
            return Ok(());
        }

        let rows = self.encode_rows(instances)?;
        let samples = self
            .store
            .run(&InsertInstances {
                rows: &rows,
                chunk_size: self.config.insert_chunk_size,
            })
            .await?;
        self.record_inserts(samples);

        debug!(count = instances.len(), "Inserted workflow instances");
        Ok(())
    }

    /// Insert one instance on a connection the caller controls.
    ///
    /// See [`insert_batch_in`](Self::insert_batch_in).
    pub async fn insert_in(
        &self,
        conn: &mut AnyConnection,
        instance: &WorkflowInstance<C::Workflow>,
    ) -> Result<()> {
        self.insert_batch_in(conn, std::slice::from_ref(instance)).await
    }

    /// Insert many instances inside the caller's open transaction.
    ///
    /// No transaction is started or committed here and nothing is retried:
    /// the rows become visible, or vanish, with the caller's commit or
    /// rollback.
    pub async fn insert_batch_in(
        &self,
        conn: &mut AnyConnection,
        instances: &[WorkflowInstance<C::Workflow>],
    ) -> Result<()> {
        if instances.is_empty() {
            return Ok(());
        }

        let rows = self.encode_rows(instances)?;
        let samples = InsertInstances {
            rows: &rows,
            chunk_size: self.config.insert_chunk_size,
        }
        .execute(conn)
        .await?;
        self.record_inserts(samples);

        debug!(
            count = instances.len(),
            "Inserted workflow instances in caller transaction"
        );
        Ok(())
    }

    /// Encode every workflow up front, so a codec failure writes nothing.
    fn encode_rows<'a>(
        &self,
        instances: &'a [WorkflowInstance<C::Workflow>],
    ) -> Result<Vec<EncodedInstance<'a>>> {
        instances
            .iter()
            .map(|instance| -> Result<EncodedInstance<'a>> {
                Ok(EncodedInstance {
                    id: &instance.id,
                    pool_id: &instance.pool_id,
                    priority: instance.priority,
                    created_at: to_millis(instance.created_at),
                    payload: self.codec.encode(&instance.workflow)?,
                })
            })
            .collect()
    }

    fn record_inserts(&self, samples: Vec<(usize, Duration)>) {
        for (count, elapsed) in samples {
            self.store.record(points::INSERT, count, elapsed);
        }
    }

    /// Claim up to `max` ready instances of `pool_id`, highest priority
    /// first, oldest first within a priority.
    ///
    /// Each returned instance's queue entry is deleted in the same
    /// transaction, so it is never handed out twice. Instances whose payload
    /// cannot be decoded are marked `INVALID` and left out of the result.
    pub async fn dequeue(
        &self,
        pool_id: &str,
        max: usize,
    ) -> Result<Vec<WorkflowInstance<C::Workflow>>> {
        if !self.is_serving() {
            return Err(QueueError::NotStarted);
        }
        if max == 0 {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let outcome = self
            .store
            .run(&DequeueWork {
                query: self.store.dialect().dequeue_query(),
                codec: &self.codec,
                pool_id,
                max: max as i64,
                lookup_chunk: self.config.response_lookup_chunk,
            })
            .await?;

        self.store
            .record(points::DELETE, outcome.deleted, outcome.delete_elapsed);
        self.store
            .record(points::DEQUEUE, outcome.instances.len(), started.elapsed());

        for (instance_id, reason) in &outcome.invalid {
            error!(
                pool_id,
                instance_id = %instance_id,
                error = %reason,
                "Failed to decode workflow payload, instance marked INVALID"
            );
        }
        debug!(pool_id, count = outcome.instances.len(), "Dequeued workflow instances");

        Ok(outcome.instances)
    }

    /// Retire a finished instance: its consumed responses and waits are
    /// deleted, and the instance row is deleted or marked `FINISHED`
    /// depending on `remove_when_finished`.
    pub async fn finish(&self, instance: &WorkflowInstance<C::Workflow>) -> Result<()> {
        self.batcher
            .submit(BatchCommand::Remove {
                instance_id: instance.id.clone(),
                correlation_ids: instance.consumed_correlation_ids(),
                remove_when_finished: self.config.remove_when_finished,
            })
            .await
    }

    /// Requeue an instance in `ERROR` or `INVALID` state.
    ///
    /// Returns `false` (and changes nothing) for any other state or an
    /// unknown id, so repeated calls are harmless.
    pub async fn restart(&self, instance_id: &str) -> Result<bool> {
        let restarted = self.store.run(&RestartInstance { instance_id }).await?;
        if restarted {
            info!(instance_id, "Restarted workflow instance");
        } else {
            debug!(instance_id, "Restart skipped, instance not in a restartable state");
        }
        Ok(restarted)
    }

    /// Not supported; restart instances one at a time.
    pub async fn restart_all(&self) -> Result<()> {
        Err(QueueError::Unsupported("restart_all"))
    }

    /// Deliver a response for a correlation id.
    ///
    /// The response may arrive before or after the matching wait is
    /// registered. A second response for the same id is ignored.
    pub async fn notify(&self, response: Response) -> Result<()> {
        self.batcher
            .submit(BatchCommand::RecordResponse {
                correlation_id: response.correlation_id,
                payload: response.payload,
            })
            .await
    }

    /// Deliver several responses.
    pub async fn notify_all(&self, responses: impl IntoIterator<Item = Response>) -> Result<()> {
        for response in responses {
            self.notify(response).await?;
        }
        Ok(())
    }

    /// Suspend a dequeued instance until responses arrive for
    /// `correlation_ids` (all or the first of them, per `wait_mode`) or
    /// until `timeout` passes.
    ///
    /// The instance's current workflow state, pool and priority are saved.
    /// Responses it was dequeued with are deleted.
    pub async fn register_callback(
        &self,
        instance: &WorkflowInstance<C::Workflow>,
        correlation_ids: Vec<String>,
        wait_mode: WaitMode,
        timeout: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if correlation_ids.is_empty() {
            return Err(QueueError::InvalidArgument(
                "register_callback needs at least one correlation id".into(),
            ));
        }

        let payload = self.codec.encode(&instance.workflow)?;
        self.batcher
            .submit(BatchCommand::RegisterWait(RegisterCall {
                instance_id: instance.id.clone(),
                pool_id: instance.pool_id.clone(),
                priority: instance.priority,
                payload,
                correlation_ids,
                wait_mode,
                timeout,
                consumed_correlation_ids: instance.consumed_correlation_ids(),
            }))
            .await
    }

    /// Mark an instance `ERROR`; [`restart`](Self::restart) requeues it.
    pub async fn set_to_error(&self, instance_id: &str, message: impl Into<String>) -> Result<()> {
        self.batcher
            .submit(BatchCommand::SetToError {
                instance_id: instance_id.to_string(),
                message: message.into(),
            })
            .await
    }

    /// Wait until every command submitted so far has been applied.
    pub async fn flush(&self) -> Result<()> {
        if !self.is_serving() {
            return Err(QueueError::NotStarted);
        }
        self.batcher.flush().await
    }
}

struct EncodedInstance<'a> {
    id: &'a str,
    pool_id: &'a str,
    priority: i64,
    created_at: i64,
    payload: Vec<u8>,
}

struct InsertInstances<'a> {
    rows: &'a [EncodedInstance<'a>],
    chunk_size: usize,
}

#[async_trait]
impl Transactional for InsertInstances<'_> {
    /// (rows, elapsed) per chunk.
    type Output = Vec<(usize, Duration)>;

    fn operation(&self) -> &'static str {
        "insert"
    }

    async fn execute(&self, conn: &mut AnyConnection) -> Result<Self::Output> {
        let now = now_millis();
        let mut samples = Vec::new();

        for chunk in self.rows.chunks(self.chunk_size) {
            let started = Instant::now();

            // $1 is the shared READY state, rows follow in groups of six.
            let values = (0..chunk.len())
                .map(|i| {
                    let b = i * 6 + 1;
                    format!(
                        "(${}, $1, ${}, ${}, ${}, NULL, ${}, ${})",
                        b + 1,
                        b + 2,
                        b + 3,
                        b + 4,
                        b + 5,
                        b + 6
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO workflow_instance \
                 (id, state, priority, pool_id, payload, last_error, created_at, last_modified_at) \
                 VALUES {values}"
            );
            let mut query = sqlx::query(&sql).bind(ProcessingState::Ready.as_str());
            for row in chunk {
                query = query
                    .bind(row.id)
                    .bind(row.priority)
                    .bind(row.pool_id)
                    .bind(row.payload.as_slice())
                    .bind(row.created_at)
                    .bind(now);
            }
            query.execute(&mut *conn).await?;

            let values = (0..chunk.len())
                .map(|i| format!("({})", placeholders(i * 4 + 1, 4)))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO workflow_queue (instance_id, pool_id, priority, last_modified_at) VALUES {values}"
            );
            let mut query = sqlx::query(&sql);
            for row in chunk {
                query = query
                    .bind(row.id)
                    .bind(row.pool_id)
                    .bind(row.priority)
                    .bind(now);
            }
            query.execute(&mut *conn).await?;

            samples.push((chunk.len(), started.elapsed()));
        }

        Ok(samples)
    }
}

struct DequeueOutcome<W> {
    instances: Vec<WorkflowInstance<W>>,
    /// (instance id, decode error)
    invalid: Vec<(String, String)>,
    deleted: usize,
    delete_elapsed: Duration,
}

struct DequeueWork<'a, C> {
    query: &'a str,
    codec: &'a C,
    pool_id: &'a str,
    max: i64,
    lookup_chunk: usize,
}

#[async_trait]
impl<C: WorkflowCodec> Transactional for DequeueWork<'_, C> {
    type Output = DequeueOutcome<C::Workflow>;

    fn operation(&self) -> &'static str {
        "dequeue"
    }

    async fn execute(&self, conn: &mut AnyConnection) -> Result<Self::Output> {
        let now = now_millis();
        let rows = sqlx::query(self.query)
            .bind(self.pool_id)
            .bind(self.max)
            .fetch_all(&mut *conn)
            .await?;

        let mut decoded = Vec::with_capacity(rows.len());
        let mut invalid = Vec::new();
        for row in &rows {
            let id: String = row.try_get("instance_id")?;
            let priority: i64 = row.try_get("priority")?;
            let created_at: i64 = row.try_get("created_at")?;
            let payload: Option<Vec<u8>> = row.try_get("payload")?;

            let workflow = match payload {
                Some(bytes) => self.codec.decode(&bytes).map_err(|e| e.to_string()),
                None => Err("missing payload".to_string()),
            };
            match workflow {
                Ok(workflow) => decoded.push(WorkflowInstance {
                    id,
                    pool_id: self.pool_id.to_string(),
                    priority,
                    created_at: from_millis(created_at),
                    workflow,
                    responses: Vec::new(),
                }),
                Err(reason) => invalid.push((id, reason)),
            }
        }

        // Only rows this transaction actually removed are handed out.
        let delete_started = Instant::now();
        let mut claimed = HashSet::with_capacity(rows.len());
        let ids: Vec<&str> = decoded
            .iter()
            .map(|i| i.id.as_str())
            .chain(invalid.iter().map(|(id, _)| id.as_str()))
            .collect();
        for chunk in ids.chunks(DELETE_CHUNK) {
            let sql = format!(
                "DELETE FROM workflow_queue WHERE instance_id IN ({}) RETURNING instance_id",
                placeholders(1, chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(*id);
            }
            for row in query.fetch_all(&mut *conn).await? {
                claimed.insert(row.try_get::<String, _>("instance_id")?);
            }
        }
        let delete_elapsed = delete_started.elapsed();
        let deleted = claimed.len();

        decoded.retain(|instance| claimed.contains(&instance.id));
        invalid.retain(|(id, _)| claimed.contains(id));

        for (id, reason) in &invalid {
            sqlx::query(
                "UPDATE workflow_instance SET state = $4, last_error = $2, last_modified_at = $3 WHERE id = $1",
            )
            .bind(id)
            .bind(reason)
            .bind(now)
            .bind(ProcessingState::Invalid.as_str())
            .execute(&mut *conn)
            .await?;
        }

        attach_responses(conn, &mut decoded, self.lookup_chunk).await?;

        Ok(DequeueOutcome {
            instances: decoded,
            invalid,
            deleted,
            delete_elapsed,
        })
    }
}

/// Attach each instance's responses, or a timeout response for every wait
/// without one, querying `chunk_size` instance ids at a time.
async fn attach_responses<W>(
    conn: &mut AnyConnection,
    instances: &mut [WorkflowInstance<W>],
    chunk_size: usize,
) -> Result<()> {
    let index: HashMap<String, usize> = instances
        .iter()
        .enumerate()
        .map(|(i, instance)| (instance.id.clone(), i))
        .collect();
    let ids: Vec<String> = instances.iter().map(|i| i.id.clone()).collect();

    for chunk in ids.chunks(chunk_size.max(1)) {
        let sql = format!(
            "SELECT w.instance_id, w.correlation_id, r.correlation_id AS response_id, r.payload \
             FROM workflow_wait w \
             LEFT JOIN workflow_response r ON r.correlation_id = w.correlation_id \
             WHERE w.instance_id IN ({}) \
             ORDER BY w.instance_id, w.correlation_id",
            placeholders(1, chunk.len())
        );
        let mut query = sqlx::query(&sql);
        for id in chunk {
            query = query.bind(id);
        }

        for row in query.fetch_all(&mut *conn).await? {
            let instance_id: String = row.try_get("instance_id")?;
            let correlation_id: String = row.try_get("correlation_id")?;
            let response_id: Option<String> = row.try_get("response_id")?;
            let payload: Option<Vec<u8>> = row.try_get("payload")?;

            let Some(&i) = index.get(&instance_id) else {
                continue;
            };
            let response = match response_id {
                Some(_) => Response::new(correlation_id, payload),
                None => Response::timeout(correlation_id),
            };
            instances[i].responses.push(response);
        }
    }

    Ok(())
}

struct RestartInstance<'a> {
    instance_id: &'a str,
}

#[async_trait]
impl Transactional for RestartInstance<'_> {
    type Output = bool;

    fn operation(&self) -> &'static str {
        "restart"
    }

    async fn execute(&self, conn: &mut AnyConnection) -> Result<bool> {
        let now = now_millis();

        // Both statements share one predicate; the insert runs first, while
        // the state still matches.
        let enqueue = format!(
            "INSERT INTO workflow_queue (instance_id, pool_id, priority, last_modified_at) \
             SELECT id, pool_id, priority, $2 FROM workflow_instance \
             WHERE id = $1 AND {RESTARTABLE_STATE_PREDICATE} \
             ON CONFLICT (instance_id) DO NOTHING"
        );
        sqlx::query(&enqueue)
            .bind(self.instance_id)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        let update = format!(
            "UPDATE workflow_instance SET state = $3, last_error = NULL, last_modified_at = $2 \
             WHERE id = $1 AND {RESTARTABLE_STATE_PREDICATE}"
        );
        let updated = sqlx::query(&update)
            .bind(self.instance_id)
            .bind(now)
            .bind(ProcessingState::Ready.as_str())
            .execute(&mut *conn)
            .await?
            .rows_affected();

        Ok(updated > 0)
    }
}
