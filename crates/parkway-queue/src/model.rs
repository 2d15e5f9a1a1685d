// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Records and state enums persisted by the queue.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing state of a workflow instance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingState {
    /// Eligible for dequeue (has a queue entry, or is being executed).
    Ready,
    /// Suspended until its registered waits are satisfied or time out.
    Waiting,
    /// Failed during execution; restartable.
    Error,
    /// Payload could not be decoded; restartable.
    Invalid,
    /// Completed and retained as history.
    Finished,
}

impl ProcessingState {
    /// All states, in declaration order.
    pub const ALL: [ProcessingState; 5] = [
        Self::Ready,
        Self::Waiting,
        Self::Error,
        Self::Invalid,
        Self::Finished,
    ];

    /// Stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Waiting => "WAITING",
            Self::Error => "ERROR",
            Self::Invalid => "INVALID",
            Self::Finished => "FINISHED",
        }
    }

    /// Whether `restart` may requeue an instance in this state.
    pub fn is_restartable(&self) -> bool {
        matches!(self, Self::Error | Self::Invalid)
    }
}

/// SQL predicate over `state` matching exactly the restartable states.
///
/// Shared by both restart statements so the queue insert and the state
/// update can never disagree.
pub const RESTARTABLE_STATE_PREDICATE: &str = "state IN ('ERROR', 'INVALID')";

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a wait registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitState {
    /// Still blocked on its response.
    Waiting,
    /// Promoted: the owning instance has been queued but has not registered new waits yet.
    Satisfied,
}

impl WaitState {
    /// Stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Satisfied => "SATISFIED",
        }
    }
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fan-in policy for an instance waiting on several correlation ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaitMode {
    /// Promote once every correlation id has a response.
    #[default]
    All,
    /// Promote as soon as any correlation id has a response.
    First,
}

impl WaitMode {
    /// Number of responses needed before the instance is promotable.
    pub fn min_responses(&self, correlation_count: usize) -> i64 {
        match self {
            Self::All => correlation_count as i64,
            Self::First => 1,
        }
    }
}

/// An asynchronous response attached to a dequeued instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id the response answers.
    pub correlation_id: String,
    /// Response body, if any.
    pub payload: Option<Vec<u8>>,
    /// True when no response arrived and the wait timed out.
    pub timed_out: bool,
}

impl Response {
    /// A delivered response.
    pub fn new(correlation_id: impl Into<String>, payload: Option<Vec<u8>>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            payload,
            timed_out: false,
        }
    }

    /// Synthesized when a wait is promoted without a stored response.
    pub fn timeout(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            payload: None,
            timed_out: true,
        }
    }
}

/// A workflow instance as inserted into and dequeued from the queue.
///
/// `workflow` is the program state handled by the [`WorkflowCodec`](crate::codec::WorkflowCodec);
/// the remaining fields are stored as columns.
#[derive(Debug, Clone)]
pub struct WorkflowInstance<W> {
    /// Unique instance id.
    pub id: String,
    /// Processor pool that executes the instance.
    pub pool_id: String,
    /// Higher dequeues first.
    pub priority: i64,
    /// When the instance was first created.
    pub created_at: DateTime<Utc>,
    /// Suspended workflow state.
    pub workflow: W,
    /// Responses attached at dequeue time.
    pub responses: Vec<Response>,
}

impl<W> WorkflowInstance<W> {
    /// New instance with a random id.
    pub fn new(pool_id: impl Into<String>, priority: i64, workflow: W) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), pool_id, priority, workflow)
    }

    /// New instance with a caller-chosen id.
    pub fn with_id(
        id: impl Into<String>,
        pool_id: impl Into<String>,
        priority: i64,
        workflow: W,
    ) -> Self {
        Self {
            id: id.into(),
            pool_id: pool_id.into(),
            priority,
            created_at: Utc::now(),
            workflow,
            responses: Vec::new(),
        }
    }

    /// Correlation ids of the responses delivered with this instance.
    pub fn consumed_correlation_ids(&self) -> Vec<String> {
        self.responses
            .iter()
            .map(|r| r.correlation_id.clone())
            .collect()
    }

    /// Response for `correlation_id`, if one was delivered.
    pub fn response(&self, correlation_id: &str) -> Option<&Response> {
        self.responses
            .iter()
            .find(|r| r.correlation_id == correlation_id)
    }
}

/// Wait registration handed to the batcher by `register_callback`.
#[derive(Debug, Clone)]
pub struct RegisterCall {
    /// Instance suspending itself.
    pub instance_id: String,
    /// Pool to requeue into on promotion.
    pub pool_id: String,
    /// Priority to requeue with on promotion.
    pub priority: i64,
    /// Encoded workflow state at suspension.
    pub payload: Vec<u8>,
    /// Correlation ids the instance waits on.
    pub correlation_ids: Vec<String>,
    /// Fan-in policy.
    pub wait_mode: WaitMode,
    /// Promote regardless of responses after this instant.
    pub timeout: Option<DateTime<Utc>>,
    /// Responses delivered with the previous dequeue; deleted on registration.
    pub consumed_correlation_ids: Vec<String>,
}

/// Current time as stored in timestamp columns.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_values_match_serde_names() {
        for state in ProcessingState::ALL {
            assert_eq!(
                serde_json::to_string(&state).unwrap(),
                format!("\"{}\"", state.as_str())
            );
        }
        for state in [WaitState::Waiting, WaitState::Satisfied] {
            assert_eq!(
                serde_json::to_string(&state).unwrap(),
                format!("\"{}\"", state.as_str())
            );
        }
    }

    #[test]
    fn test_restartable_predicate_matches_enum() {
        let restartable: Vec<_> = ProcessingState::ALL
            .into_iter()
            .filter(ProcessingState::is_restartable)
            .collect();
        assert_eq!(restartable, vec![ProcessingState::Error, ProcessingState::Invalid]);

        for state in ProcessingState::ALL {
            let quoted = format!("'{}'", state.as_str());
            assert_eq!(
                RESTARTABLE_STATE_PREDICATE.contains(&quoted),
                state.is_restartable(),
                "predicate disagrees with enum for {state}"
            );
        }
    }

    #[test]
    fn test_wait_mode_min_responses() {
        assert_eq!(WaitMode::All.min_responses(3), 3);
        assert_eq!(WaitMode::First.min_responses(3), 1);
        assert_eq!(WaitMode::default(), WaitMode::All);
    }

    #[test]
    fn test_timestamp_millis_round_trip() {
        let ts = from_millis(1_700_000_000_123);
        assert_eq!(to_millis(ts), 1_700_000_000_123);
    }

    #[test]
    fn test_consumed_correlation_ids() {
        let mut instance = WorkflowInstance::new("pool", 1, ());
        instance.responses.push(Response::new("a", Some(vec![1])));
        instance.responses.push(Response::timeout("b"));

        assert_eq!(instance.consumed_correlation_ids(), vec!["a", "b"]);
        assert!(instance.response("b").unwrap().timed_out);
        assert!(instance.response("c").is_none());
    }
}
