//! Session store and call log sink traits

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::session::{CallFinalRecord, CallSnapshot, ToolCallLogRecord, TurnRecord};

/// Externalized session store, keyed by session id with TTL semantics.
///
/// Writes are unconditional idempotent upserts: recovery and monitoring
/// processes may read or overwrite entries concurrently, and re-delivery of
/// the same snapshot must be harmless.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: Uuid) -> Result<Option<CallSnapshot>>;

    /// Insert or replace the snapshot, refreshing its TTL
    async fn upsert(&self, snapshot: &CallSnapshot, ttl: Duration) -> Result<()>;

    /// Remove the entry on normal close. Deleting a missing entry is Ok.
    async fn delete(&self, session_id: Uuid) -> Result<()>;
}

/// Call log sink, routed into time-range-partitioned storage.
///
/// `bucket` is the partition key computed by the logger from the record's
/// own timestamp, never by the caller.
#[async_trait]
pub trait CallLogSink: Send + Sync {
    async fn append_turn(&self, bucket: &str, record: &TurnRecord) -> Result<()>;

    async fn append_tool_call(&self, bucket: &str, record: &ToolCallLogRecord) -> Result<()>;

    async fn finalize_call(&self, bucket: &str, record: &CallFinalRecord) -> Result<()>;
}
