//! Write-through audit sink with a local retry buffer
//!
//! Every record goes to the backing sink right away. A failed write is kept
//! in a bounded in-memory buffer and retried by a background task with
//! exponential backoff. A database outage never blocks relaying, and every
//! record reaches the store at least once after it recovers. When the buffer
//! is full the oldest record is dropped and logged at error level.

use crate::config::StorageSettings;
use crate::metrics::MetricsCollector;
use crate::store::{AuditSink, StoreError, StoreResult};
use crate::types::{AdminAction, MessageRecord, SessionRecord};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// One pending audit write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditRecord {
    Message(MessageRecord),
    Session(SessionRecord),
    AdminAction(AdminAction),
}

impl AuditRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditRecord::Message(_) => "message",
            AuditRecord::Session(_) => "session",
            AuditRecord::AdminAction(_) => "admin_action",
        }
    }

    async fn write_to(&self, sink: &dyn AuditSink) -> StoreResult<()> {
        match self {
            AuditRecord::Message(record) => sink.record_message(record).await,
            AuditRecord::Session(record) => sink.record_session(record).await,
            AuditRecord::AdminAction(record) => sink.record_admin_action(record).await,
        }
    }
}

/// Retry policy for the buffered sink
#[derive(Debug, Clone)]
pub struct AuditBufferConfig {
    pub capacity: usize,
    pub retry_interval: Duration,
    pub max_backoff: Duration,
}

impl Default for AuditBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            retry_interval: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30_000),
        }
    }
}

impl From<&StorageSettings> for AuditBufferConfig {
    fn from(settings: &StorageSettings) -> Self {
        Self {
            capacity: settings.audit_buffer_capacity,
            retry_interval: Duration::from_millis(settings.audit_retry_interval_ms),
            max_backoff: Duration::from_millis(settings.audit_max_backoff_ms),
        }
    }
}

pub struct BufferedAuditSink {
    inner: Arc<dyn AuditSink>,
    pending: Mutex<VecDeque<AuditRecord>>,
    config: AuditBufferConfig,
    metrics_collector: Arc<MetricsCollector>,
}

impl BufferedAuditSink {
    pub fn new(
        inner: Arc<dyn AuditSink>,
        config: AuditBufferConfig,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            inner,
            pending: Mutex::new(VecDeque::new()),
            config,
            metrics_collector,
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, VecDeque<AuditRecord>>> {
        self.pending.lock().map_err(|_| {
            StoreError::Unavailable("Failed to acquire audit buffer lock".to_string())
        })
    }

    /// Records waiting for a retry
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    async fn write(&self, record: AuditRecord) -> StoreResult<()> {
        match record.write_to(self.inner.as_ref()).await {
            Ok(()) => {
                self.metrics_collector.record_audit_write(record.kind(), true);
                Ok(())
            }
            Err(e) => {
                self.metrics_collector.record_audit_write(record.kind(), false);
                warn!("Audit write failed, buffering {} record: {}", record.kind(), e);
                self.buffer(record, false)
            }
        }
    }

    /// Keep a record for retry. `front` puts it back at the head after a
    /// failed retry so ordering is preserved.
    fn buffer(&self, record: AuditRecord, front: bool) -> StoreResult<()> {
        let mut pending = self.lock()?;
        if front {
            pending.push_front(record);
        } else {
            pending.push_back(record);
        }

        while pending.len() > self.config.capacity {
            if let Some(dropped) = pending.pop_front() {
                self.metrics_collector.record_audit_dropped();
                error!(
                    "Audit buffer full ({} records), dropping oldest {} record: {:?}",
                    self.config.capacity,
                    dropped.kind(),
                    dropped
                );
            }
        }

        self.metrics_collector.set_audit_pending(pending.len());
        Ok(())
    }

    /// Retry buffered records in order until one fails.
    ///
    /// Returns how many records were written.
    pub async fn flush_pending(&self) -> StoreResult<usize> {
        let mut flushed = 0;

        loop {
            let next = self.lock()?.pop_front();
            let Some(record) = next else {
                break;
            };

            match record.write_to(self.inner.as_ref()).await {
                Ok(()) => {
                    self.metrics_collector
                        .record_audit_write(record.kind(), true);
                    flushed += 1;
                }
                Err(e) => {
                    self.metrics_collector
                        .record_audit_write(record.kind(), false);
                    debug!("Audit retry failed for {} record: {}", record.kind(), e);
                    self.buffer(record, true)?;
                    break;
                }
            }
        }

        let remaining = self.pending_count();
        self.metrics_collector.set_audit_pending(remaining);
        if flushed > 0 {
            info!(
                "Flushed {} buffered audit records, {} remaining",
                flushed, remaining
            );
        }
        Ok(flushed)
    }

    /// Delay before the next retry round
    pub fn next_delay(&self, current: Duration, made_progress: bool) -> Duration {
        if made_progress || self.pending_count() == 0 {
            self.config.retry_interval
        } else {
            (current * 2).min(self.config.max_backoff)
        }
    }

    /// Background retry loop; runs while `is_running` is set
    pub async fn run_retry_loop(self: Arc<Self>, is_running: Arc<RwLock<bool>>) {
        let mut delay = self.config.retry_interval;
        info!(
            "Audit retry task started (interval {:?}, max backoff {:?})",
            self.config.retry_interval, self.config.max_backoff
        );

        while *is_running.read().await {
            sleep(delay).await;

            if self.pending_count() == 0 {
                delay = self.config.retry_interval;
                continue;
            }

            let made_progress = match self.flush_pending().await {
                Ok(flushed) => flushed > 0,
                Err(e) => {
                    warn!("Audit retry round failed: {}", e);
                    false
                }
            };
            delay = self.next_delay(delay, made_progress);
        }

        info!("Audit retry task stopped");
    }
}

#[async_trait]
impl AuditSink for BufferedAuditSink {
    async fn record_message(&self, message: &MessageRecord) -> StoreResult<()> {
        self.write(AuditRecord::Message(message.clone())).await
    }

    async fn record_session(&self, session: &SessionRecord) -> StoreResult<()> {
        self.write(AuditRecord::Session(session.clone())).await
    }

    async fn record_admin_action(&self, action: &AdminAction) -> StoreResult<()> {
        self.write(AuditRecord::AdminAction(action.clone())).await
    }
}
