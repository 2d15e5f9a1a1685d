// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite query hooks.

use super::Dialect;

/// SQLite dialect.
///
/// SQLite has no row locks; a write transaction holds the database lock, so
/// the plain selects are already exclusive once the transaction writes.
/// Callers still guard their updates with state predicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

const DEQUEUE: &str = "\
SELECT q.instance_id, i.priority, i.payload, i.created_at \
FROM workflow_queue q \
JOIN workflow_instance i ON i.id = q.instance_id \
WHERE q.pool_id = $1 \
ORDER BY q.priority DESC, q.last_modified_at ASC \
LIMIT $2";

const PROMOTABLE: &str = "\
SELECT w.instance_id, MIN(w.pool_id) AS pool_id, MAX(w.priority) AS priority \
FROM workflow_wait w \
JOIN workflow_instance i ON i.id = w.instance_id \
LEFT JOIN workflow_response r ON r.correlation_id = w.correlation_id \
WHERE w.state = 'WAITING' AND i.state = 'WAITING' \
GROUP BY w.instance_id \
HAVING COUNT(r.correlation_id) >= MAX(w.min_responses) OR MIN(w.timeout_at) <= $1 \
LIMIT $2";

const DELETE_STALE_RESPONSES: &str = "\
DELETE FROM workflow_response WHERE correlation_id IN (\
SELECT r.correlation_id FROM workflow_response r \
WHERE r.arrived_at < $1 \
AND NOT EXISTS (SELECT 1 FROM workflow_wait w WHERE w.correlation_id = r.correlation_id) \
LIMIT $2)";

impl Dialect for SqliteDialect {
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
