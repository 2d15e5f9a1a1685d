// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL query hooks.

use super::Dialect;

/// PostgreSQL dialect: claims rows with `FOR UPDATE ... SKIP LOCKED` so
/// concurrent engine processes never block on or double-claim a row.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

const DEQUEUE: &str = "\
SELECT q.instance_id, i.priority, i.payload, i.created_at \
FROM workflow_queue q \
JOIN workflow_instance i ON i.id = q.instance_id \
WHERE q.pool_id = $1 \
ORDER BY q.priority DESC, q.last_modified_at ASC \
LIMIT $2 \
FOR UPDATE OF q SKIP LOCKED";

// Locks the instance rows rather than the waits: the grouped wait scan
// cannot carry a locking clause in PostgreSQL.
const PROMOTABLE: &str = "\
SELECT i.id AS instance_id, i.pool_id, i.priority \
FROM workflow_instance i \
WHERE i.state = 'WAITING' AND i.id IN (\
SELECT w.instance_id FROM workflow_wait w \
LEFT JOIN workflow_response r ON r.correlation_id = w.correlation_id \
WHERE w.state = 'WAITING' \
GROUP BY w.instance_id \
HAVING COUNT(r.correlation_id) >= MAX(w.min_responses) OR MIN(w.timeout_at) <= $1) \
LIMIT $2 \
FOR UPDATE OF i SKIP LOCKED";

const DELETE_STALE_RESPONSES: &str = "\
DELETE FROM workflow_response WHERE correlation_id IN (\
SELECT r.correlation_id FROM workflow_response r \
WHERE r.arrived_at < $1 \
AND NOT EXISTS (SELECT 1 FROM workflow_wait w WHERE w.correlation_id = r.correlation_id) \
LIMIT $2 \
FOR UPDATE OF r SKIP LOCKED)";

impl Dialect for PostgresDialect {
    fn dequeue_query(&self) -> &'static str {
        DEQUEUE
    }

    fn promotable_query(&self) -> &'static str {
        PROMOTABLE
    }

    fn delete_stale_responses_query(&self) -> &'static str {
        DELETE_STALE_RESPONSES
    }
}
