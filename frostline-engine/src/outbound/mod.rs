//! Outbound queues and their drain tasks.
//!
//! The ingestion path never awaits a sink: it pushes onto an in-memory
//! queue and moves on. Each queue has exactly one drain task that flushes
//! on a timer. A failed delivery re-prepends the batch so nothing is lost
//! across transient outages; a batch that keeps failing is dropped after a
//! bounded number of attempts with a loud log.

pub mod webhook;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::error::Result;
use crate::store::{DoorRow, Store, TelemetryRow};
use crate::tracing::prelude::*;

/// Multi-producer, single-consumer queue with front re-prepend.
#[derive(Debug)]
pub struct OutboundQueue<T> {
    inner: Arc<Mutex<VecDeque<T>>>,
}

impl<T> Clone for OutboundQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for OutboundQueue<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }
}

impl<T> OutboundQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).push_back(item);
    }

    /// Take everything currently queued, preserving order.
    pub fn drain_all(&self) -> Vec<T> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect()
    }

    /// Put a failed batch back at the front, ahead of anything enqueued
    /// while the delivery was in flight.
    pub fn requeue_front(&self, batch: Vec<T>) {
        let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for item in batch.into_iter().rev() {
            queue.push_front(item);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Delivery target of a drain task.
#[async_trait]
pub trait Sink<T>: Send + Sync {
    async fn deliver(&self, batch: &[T]) -> Result<()>;
}

/// Telemetry rows into the store.
pub struct TelemetrySink(pub Arc<dyn Store>);

#[async_trait]
impl Sink<TelemetryRow> for TelemetrySink {
    async fn deliver(&self, batch: &[TelemetryRow]) -> Result<()> {
        self.0.insert_telemetry(batch).await
    }
}

/// Door transition rows into the store.
pub struct DoorSink(pub Arc<dyn Store>);

#[async_trait]
impl Sink<DoorRow> for DoorSink {
    async fn deliver(&self, batch: &[DoorRow]) -> Result<()> {
        self.0.insert_door_logs(batch).await
    }
}

/// Alert batches to the webhook.
pub struct WebhookSink(pub webhook::WebhookClient);

#[async_trait]
impl Sink<Alert> for WebhookSink {
    async fn deliver(&self, batch: &[Alert]) -> Result<()> {
        self.0.post_alerts(batch).await
    }
}

/// Run one drain task until cancellation.
///
/// `flush_on_shutdown` gives the queue one final delivery attempt on the
/// way out (telemetry wants this; alerts and door rows may be abandoned).
pub async fn run_drain<T, S>(
    label: &'static str,
    queue: OutboundQueue<T>,
    sink: S,
    period: Duration,
    max_attempts: u32,
    flush_on_shutdown: bool,
    cancellation: CancellationToken,
) where
    T: Send,
    S: Sink<T>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // Consecutive failed deliveries for the batch currently at the front.
    let mut attempts: u32 = 0;

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                if flush_on_shutdown && !queue.is_empty() {
                    debug!(queue = label, "final flush before shutdown");
                    flush_once(label, &queue, &sink, &mut attempts, max_attempts).await;
                }
                break;
            }
            _ = interval.tick() => {
                flush_once(label, &queue, &sink, &mut attempts, max_attempts).await;
            }
        }
    }

    trace!(queue = label, "drain task stopped");
}

async fn flush_once<T, S>(
    label: &'static str,
    queue: &OutboundQueue<T>,
    sink: &S,
    attempts: &mut u32,
    max_attempts: u32,
) where
    T: Send,
    S: Sink<T>,
{
    let batch = queue.drain_all();
    if batch.is_empty() {
        return;
    }

    match sink.deliver(&batch).await {
        Ok(()) => {
            debug!(queue = label, count = batch.len(), "batch delivered");
            *attempts = 0;
        }
        Err(e) => {
            *attempts += 1;
            if *attempts >= max_attempts {
                error!(
                    queue = label,
                    count = batch.len(),
                    attempts = *attempts,
                    "delivery failed repeatedly -- dropping batch: {e}"
                );
                *attempts = 0;
            } else {
                warn!(
                    queue = label,
                    count = batch.len(),
                    attempt = *attempts,
                    "delivery failed, re-queued: {e}"
                );
                queue.requeue_front(batch);
            }
        }
    }
}
