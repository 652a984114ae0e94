//! Event recorder: turns user actions into the durable journal.
//!
//! DESIGN
//! ======
//! `record` is synchronous and never blocks the caller. In recording mode the
//! event is handed to a single writer task over an unbounded channel, so
//! appends reach the provider strictly in record order and never interleave.
//! Before `start` the recorder is pending and queues events in memory; while
//! replaying it drops them, since the events being re-executed are already
//! in the journal.
//!
//! Timestamps are wall-clock milliseconds, bumped when needed so that every
//! record is strictly later than the one before it.
//!
//! ERROR HANDLING
//! ==============
//! Appends are retried with linear back-off. A record that still fails is
//! dropped with a warning and counted; the session keeps running.

#[cfg(test)]
#[path = "recorder_test.rs"]
mod recorder_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use journal::RecordedEvent;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::storage::{StorageError, StorageProvider};

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("recorder needs a tokio runtime to start its writer")]
    NoRuntime,
    #[error("journal writer has stopped")]
    WriterClosed,
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

/// Where a recorded event goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderMode {
    /// Not started; events are queued.
    Pending,
    /// Events go to the writer task.
    Recording,
    /// Events are suppressed.
    Replaying,
}

enum WriterMsg {
    Append(RecordedEvent),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone, Copy)]
struct RetryPolicy {
    retries: usize,
    retry_base_ms: u64,
}

pub struct EventRecorder {
    project_id: String,
    storage: Arc<dyn StorageProvider>,
    mode: RecorderMode,
    resume_mode: RecorderMode,
    pending: Vec<RecordedEvent>,
    last_timestamp: i64,
    policy: RetryPolicy,
    tx: Option<mpsc::UnboundedSender<WriterMsg>>,
    dropped: Arc<AtomicUsize>,
}

impl EventRecorder {
    #[must_use]
    pub fn new(project_id: impl Into<String>, storage: Arc<dyn StorageProvider>, config: &EngineConfig) -> Self {
        Self {
            project_id: project_id.into(),
            storage,
            mode: RecorderMode::Pending,
            resume_mode: RecorderMode::Pending,
            pending: Vec::new(),
            last_timestamp: 0,
            policy: RetryPolicy { retries: config.append_retries.max(1), retry_base_ms: config.append_retry_base_ms },
            tx: None,
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Idle recorder for another project on the same storage. Nothing queued
    /// here carries over; timestamps keep increasing.
    #[must_use]
    pub fn fork(&self, project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            storage: Arc::clone(&self.storage),
            mode: RecorderMode::Pending,
            resume_mode: RecorderMode::Pending,
            pending: Vec::new(),
            last_timestamp: self.last_timestamp,
            policy: self.policy,
            tx: None,
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[must_use]
    pub fn storage(&self) -> Arc<dyn StorageProvider> {
        Arc::clone(&self.storage)
    }

    #[must_use]
    pub fn mode(&self) -> RecorderMode {
        self.mode
    }

    /// Events queued before `start`.
    #[must_use]
    pub fn pending(&self) -> &[RecordedEvent] {
        &self.pending
    }

    /// Records the writer gave up on.
    #[must_use]
    pub fn dropped_writes(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Timestamp of the latest recorded or replayed event.
    #[must_use]
    pub fn last_timestamp(&self) -> i64 {
        self.last_timestamp
    }

    /// Append one event. Returns the event unless it was suppressed by replay.
    pub fn record(&mut self, kind: &str, data: Value) -> Option<RecordedEvent> {
        if self.mode == RecorderMode::Replaying {
            debug!(kind, "replaying; record suppressed");
            return None;
        }
        let event = RecordedEvent::new(kind, self.next_timestamp(), data);
        match (&self.tx, self.mode) {
            (Some(tx), RecorderMode::Recording) => {
                if tx.send(WriterMsg::Append(event.clone())).is_err() {
                    warn!(kind, project_id = %self.project_id, "journal writer gone; dropping record");
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            _ => self.pending.push(event.clone()),
        }
        Some(event)
    }

    /// Serialize `payload` and record it. Encoding failures are logged.
    pub fn record_payload<T: Serialize>(&mut self, kind: &str, payload: &T) -> Option<RecordedEvent> {
        match serde_json::to_value(payload) {
            Ok(data) => self.record(kind, data),
            Err(e) => {
                warn!(error = %e, kind, "record payload not serializable; skipped");
                None
            }
        }
    }

    /// Enter or leave replay mode. Leaving restores the previous mode.
    pub fn set_replaying(&mut self, replaying: bool) {
        if replaying {
            if self.mode != RecorderMode::Replaying {
                self.resume_mode = self.mode;
                self.mode = RecorderMode::Replaying;
            }
        } else if self.mode == RecorderMode::Replaying {
            self.mode = self.resume_mode;
        }
    }

    /// Keep later records after a replayed event's timestamp.
    pub fn note_timestamp(&mut self, timestamp: i64) {
        self.last_timestamp = self.last_timestamp.max(timestamp);
    }

    /// Spawn the writer task and hand it everything queued so far.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::NoRuntime`] when called outside a tokio
    /// runtime.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        if self.tx.is_some() {
            if self.mode == RecorderMode::Pending {
                self.mode = RecorderMode::Recording;
            }
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| RecorderError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(run_writer(
            self.project_id.clone(),
            Arc::clone(&self.storage),
            rx,
            self.policy,
            Arc::clone(&self.dropped),
        ));

        let queued = std::mem::take(&mut self.pending);
        info!(project_id = %self.project_id, queued = queued.len(), "event recorder started");
        for event in queued {
            if tx.send(WriterMsg::Append(event)).is_err() {
                return Err(RecorderError::WriterClosed);
            }
        }
        self.tx = Some(tx);
        if self.mode == RecorderMode::Replaying {
            self.resume_mode = RecorderMode::Recording;
        } else {
            self.mode = RecorderMode::Recording;
        }
        Ok(())
    }

    /// Wait until every record sent so far has been written or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::WriterClosed`] if the writer task has exited.
    pub async fn flush(&self) -> Result<(), RecorderError> {
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(WriterMsg::Flush(ack_tx)).map_err(|_| RecorderError::WriterClosed)?;
        ack_rx.await.map_err(|_| RecorderError::WriterClosed)
    }

    fn next_timestamp(&mut self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        self.last_timestamp = now.max(self.last_timestamp.saturating_add(1));
        self.last_timestamp
    }
}

async fn run_writer(
    project_id: String,
    storage: Arc<dyn StorageProvider>,
    mut rx: mpsc::UnboundedReceiver<WriterMsg>,
    policy: RetryPolicy,
    dropped: Arc<AtomicUsize>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            WriterMsg::Append(event) => {
                if !append_with_retry(storage.as_ref(), &project_id, &event, policy).await {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            WriterMsg::Flush(ack) => {
                if ack.send(()).is_err() {
                    debug!("flush waiter went away");
                }
            }
        }
    }
    debug!(project_id, "journal writer stopped");
}

async fn append_with_retry(
    storage: &dyn StorageProvider,
    project_id: &str,
    event: &RecordedEvent,
    policy: RetryPolicy,
) -> bool {
    for attempt in 1..=policy.retries {
        match storage.append(project_id, event).await {
            Ok(()) => return true,
            Err(e) if attempt < policy.retries => {
                warn!(
                    error = %e,
                    attempt,
                    total = policy.retries,
                    kind = %event.kind,
                    "journal append failed; retrying"
                );
                tokio::time::sleep(Duration::from_millis((attempt as u64) * policy.retry_base_ms)).await;
            }
            Err(e) => {
                warn!(error = %e, kind = %event.kind, project_id, "journal append failed after retries; dropping record");
            }
        }
    }
    false
}
