//! Asynchronous call logger
//!
//! Fronts any [`CallLogSink`] with a bounded queue and a flush worker, so
//! appends are enqueue-and-return on the audio path. Transient sink failures
//! are retried with backoff; a sink outage never stalls a call. The logger,
//! not the caller, computes the time-partition bucket for each record from
//! the record's own timestamp.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use async_trait::async_trait;
use call_agent_core::{
    CallFinalRecord, CallLogSink, Error, Result, ToolCallLogRecord, TurnRecord,
};

/// Delivery attempts per record before it is abandoned.
const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Partition key for time-range-partitioned log storage.
pub fn partition_bucket(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d").to_string()
}

enum LogCommand {
    Turn(TurnRecord),
    ToolCall(ToolCallLogRecord),
    Finalize(CallFinalRecord),
}

impl LogCommand {
    fn bucket(&self) -> String {
        match self {
            LogCommand::Turn(r) => partition_bucket(r.turn.timestamp),
            LogCommand::ToolCall(r) => partition_bucket(r.timestamp),
            LogCommand::Finalize(r) => partition_bucket(r.ended_at),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            LogCommand::Turn(_) => "turn",
            LogCommand::ToolCall(_) => "tool_call",
            LogCommand::Finalize(_) => "finalize",
        }
    }
}

/// Join handle for the flush worker; await it after dropping every logger
/// clone to flush remaining records on shutdown.
pub struct LoggerHandle {
    pub worker: JoinHandle<()>,
}

/// Cloneable non-blocking front for a call log sink.
#[derive(Clone)]
pub struct AsyncCallLogger {
    tx: mpsc::Sender<LogCommand>,
    dropped: Arc<AtomicU64>,
}

impl AsyncCallLogger {
    /// Spawn the flush worker and return the logger front.
    pub fn spawn(
        sink: Arc<dyn CallLogSink>,
        buffer: usize,
        retry_backoff: Duration,
    ) -> (Self, LoggerHandle) {
        let (tx, mut rx) = mpsc::channel::<LogCommand>(buffer.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        let worker = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                deliver(&*sink, command, retry_backoff).await;
            }
            tracing::debug!("call logger flush worker finished");
        });

        (Self { tx, dropped }, LoggerHandle { worker })
    }

    /// Enqueue a turn record. Never blocks.
    pub fn append_turn(&self, record: TurnRecord) {
        self.enqueue(LogCommand::Turn(record));
    }

    /// Enqueue a tool-call record. Never blocks.
    pub fn append_tool_call(&self, record: ToolCallLogRecord) {
        self.enqueue(LogCommand::ToolCall(record));
    }

    /// Enqueue the final call record. Never blocks.
    pub fn finalize_call(&self, record: CallFinalRecord) {
        self.enqueue(LogCommand::Finalize(record));
    }

    /// Records dropped because the buffer was full during a sink outage.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, command: LogCommand) {
        if let Err(err) = self.tx.try_send(command) {
            // A full buffer means the sink has been down long enough to
            // exhaust the queue; shedding the record keeps the call alive.
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(kind = err.into_inner().kind(), "call log buffer full, record dropped");
        }
    }
}

async fn deliver(sink: &dyn CallLogSink, command: LogCommand, retry_backoff: Duration) {
    let bucket = command.bucket();
    for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
        let result = match &command {
            LogCommand::Turn(record) => sink.append_turn(&bucket, record).await,
            LogCommand::ToolCall(record) => sink.append_tool_call(&bucket, record).await,
            LogCommand::Finalize(record) => sink.finalize_call(&bucket, record).await,
        };
        match result {
            Ok(()) => return,
            Err(err) if attempt < MAX_DELIVERY_ATTEMPTS => {
                tracing::warn!(
                    kind = command.kind(),
                    bucket = %bucket,
                    attempt,
                    error = %err,
                    "call log delivery failed, retrying"
                );
                tokio::time::sleep(retry_backoff * attempt).await;
            }
            Err(err) => {
                tracing::error!(
                    kind = command.kind(),
                    bucket = %bucket,
                    error = %err,
                    "call log record abandoned after retries"
                );
            }
        }
    }
}

/// In-memory sink, bucketed like the real storage. Used by tests and as the
/// degraded-mode sink.
#[derive(Default)]
pub struct MemoryCallLogSink {
    turns: Mutex<HashMap<String, Vec<TurnRecord>>>,
    tool_calls: Mutex<HashMap<String, Vec<ToolCallLogRecord>>>,
    finals: Mutex<HashMap<String, Vec<CallFinalRecord>>>,
    /// When nonzero, the next N operations fail (transient-outage injection)
    fail_next: AtomicUsize,
}

impl MemoryCallLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` sink operations fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn maybe_fail(&self) -> Result<()> {
        let remaining = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if remaining {
            return Err(Error::Sink("injected failure".into()));
        }
        Ok(())
    }

    pub fn turns(&self, bucket: &str) -> Vec<TurnRecord> {
        self.turns.lock().get(bucket).cloned().unwrap_or_default()
    }

    pub fn tool_calls(&self, bucket: &str) -> Vec<ToolCallLogRecord> {
        self.tool_calls
            .lock()
            .get(bucket)
            .cloned()
            .unwrap_or_default()
    }

    pub fn finals(&self, bucket: &str) -> Vec<CallFinalRecord> {
        self.finals.lock().get(bucket).cloned().unwrap_or_default()
    }

    pub fn total_turns(&self) -> usize {
        self.turns.lock().values().map(Vec::len).sum()
    }

    pub fn total_tool_calls(&self) -> usize {
        self.tool_calls.lock().values().map(Vec::len).sum()
    }

    pub fn total_finals(&self) -> usize {
        self.finals.lock().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl CallLogSink for MemoryCallLogSink {
    async fn append_turn(&self, bucket: &str, record: &TurnRecord) -> Result<()> {
        self.maybe_fail()?;
        self.turns
            .lock()
            .entry(bucket.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn append_tool_call(&self, bucket: &str, record: &ToolCallLogRecord) -> Result<()> {
        self.maybe_fail()?;
        self.tool_calls
            .lock()
            .entry(bucket.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn finalize_call(&self, bucket: &str, record: &CallFinalRecord) -> Result<()> {
        self.maybe_fail()?;
        self.finals
            .lock()
            .entry(bucket.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_agent_core::{CallOutcome, Speaker, StageLatency, Turn};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn turn_record(ts: DateTime<Utc>) -> TurnRecord {
        TurnRecord {
            session_id: Uuid::new_v4(),
            tenant: "kolesoplus".into(),
            turn: Turn {
                number: 1,
                speaker: Speaker::Caller,
                content: "Де мій заказ?".into(),
                response: Some("Ваше замовлення вже в дорозі.".into()),
                latency: StageLatency::default(),
                tool_calls: Vec::new(),
                timestamp: ts,
            },
        }
    }

    #[test]
    fn test_partition_bucket_format() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 7, 14, 30, 0).unwrap();
        assert_eq!(partition_bucket(ts), "20260807");
    }

    #[tokio::test]
    async fn test_records_land_in_timestamp_bucket() {
        let sink = Arc::new(MemoryCallLogSink::new());
        let (logger, handle) =
            AsyncCallLogger::spawn(sink.clone(), 16, Duration::from_millis(1));

        let ts = Utc.with_ymd_and_hms(2026, 8, 7, 10, 0, 0).unwrap();
        logger.append_turn(turn_record(ts));
        drop(logger);
        handle.worker.await.unwrap();

        assert_eq!(sink.turns("20260807").len(), 1);
        assert!(sink.turns("20260806").is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let sink = Arc::new(MemoryCallLogSink::new());
        sink.fail_next(2);

        let (logger, handle) =
            AsyncCallLogger::spawn(sink.clone(), 16, Duration::from_millis(1));
        logger.append_turn(turn_record(Utc::now()));
        drop(logger);
        handle.worker.await.unwrap();

        // Two failures, then the retry lands it
        assert_eq!(sink.total_turns(), 1);
    }

    #[tokio::test]
    async fn test_append_never_blocks_on_full_buffer() {
        let sink = Arc::new(MemoryCallLogSink::new());
        // Keep the worker busy failing so the 1-slot buffer fills
        sink.fail_next(1000);

        let (logger, _handle) =
            AsyncCallLogger::spawn(sink.clone(), 1, Duration::from_millis(50));
        for _ in 0..10 {
            logger.append_turn(turn_record(Utc::now()));
        }

        // Some records were shed instead of blocking the caller
        assert!(logger.dropped() > 0);
    }

    #[tokio::test]
    async fn test_finalize_recorded() {
        let sink = Arc::new(MemoryCallLogSink::new());
        let (logger, handle) =
            AsyncCallLogger::spawn(sink.clone(), 16, Duration::from_millis(1));

        let ended = Utc.with_ymd_and_hms(2026, 8, 7, 10, 5, 0).unwrap();
        logger.finalize_call(CallFinalRecord {
            session_id: Uuid::new_v4(),
            tenant: "kolesoplus".into(),
            caller_id: "380501234567".into(),
            outcome: CallOutcome::Completed,
            turn_count: 1,
            tools_called: vec!["get_order_status".into()],
            started_at: ended - chrono::Duration::minutes(3),
            ended_at: ended,
        });
        drop(logger);
        handle.worker.await.unwrap();

        let finals = sink.finals("20260807");
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].outcome, CallOutcome::Completed);
    }
}
