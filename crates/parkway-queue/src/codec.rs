// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow payload serialization.
//!
//! The queue stores suspended workflows as opaque bytes. A [`WorkflowCodec`]
//! turns the caller's workflow type into those bytes and back; it is also
//! where workflow types are resolved by name, if the caller needs that.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Payload conversion failure.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The workflow could not be serialized.
    #[error("failed to encode workflow: {0}")]
    Encode(String),

    /// The stored payload is corrupt or names an unknown workflow type.
    #[error("failed to decode workflow: {0}")]
    Decode(String),
}

/// Converts workflows to and from stored payloads.
pub trait WorkflowCodec: Send + Sync + 'static {
    /// In-memory workflow representation.
    type Workflow: Send + Sync + 'static;

    /// Serialize a workflow for storage.
    fn encode(&self, workflow: &Self::Workflow) -> Result<Vec<u8>, CodecError>;

    /// Rebuild a workflow from a stored payload.
    fn decode(&self, payload: &[u8]) -> Result<Self::Workflow, CodecError>;
}

/// JSON codec for any serde type.
pub struct JsonCodec<W> {
    _marker: PhantomData<fn() -> W>,
}

impl<W> JsonCodec<W> {
    /// Create a JSON codec.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<W> Default for JsonCodec<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> Clone for JsonCodec<W> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<W> fmt::Debug for JsonCodec<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec")
            .field("workflow", &std::any::type_name::<W>())
            .finish()
    }
}

impl<W> WorkflowCodec for JsonCodec<W>
where
    W: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Workflow = W;

    fn encode(&self, workflow: &W) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(workflow).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<W, CodecError> {
        serde_json::from_slice(payload).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
