// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded single-producer/single-consumer queues between stage instances.
//!
//! A row set is split into three parts:
//! - [`RowSet`]: the shared, read-only view kept in the pipeline arena for
//!   diagnostics (capacity, buffered rows, done flag, endpoint names)
//! - [`RowSetWriter`]: owned by the producing stage instance
//! - [`RowSetReader`]: owned by the consuming stage instance
//!
//! The queue itself is a bounded `tokio::sync::mpsc` channel, so a full queue
//! parks the producer until the consumer drains a row (backpressure). Every
//! blocking operation also watches the pipeline's stop token and returns as
//! soon as it fires. [`InputSet`] merges several readers for fan-in.

use std::future::poll_fn;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;

use crate::errors::RowSetError;
use crate::row::{Row, Schema};

/// Handle of a row set inside the pipeline arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowSetId(pub usize);

/// A row together with the schema of the stream it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub schema: Arc<Schema>,
    pub row: Row,
}

impl Record {
    pub fn new(schema: Arc<Schema>, row: Row) -> Self {
        Self { schema, row }
    }
}

/// Shared view of one bounded queue.
#[derive(Debug)]
pub struct RowSet {
    id: RowSetId,
    producer: String,
    consumer: String,
    capacity: usize,
    buffered: AtomicUsize,
    done: AtomicBool,
}

impl RowSet {
    /// Create a row set and its two endpoints.
    ///
    /// `capacity` must be greater than zero; validation rejects zero
    /// capacities before this is reached.
    pub fn channel(
        id: RowSetId,
        producer: impl Into<String>,
        consumer: impl Into<String>,
        capacity: usize,
        stop: CancellationToken,
    ) -> (Arc<RowSet>, RowSetWriter, RowSetReader) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let shared = Arc::new(RowSet {
            id,
            producer: producer.into(),
            consumer: consumer.into(),
            capacity,
            buffered: AtomicUsize::new(0),
            done: AtomicBool::new(false),
        });

        let writer = RowSetWriter {
            shared: shared.clone(),
            sender: Some(sender),
            stop: stop.clone(),
        };
        let reader = RowSetReader {
            shared: shared.clone(),
            receiver,
            stop,
            exhausted: false,
        };
        (shared, writer, reader)
    }

    pub fn id(&self) -> RowSetId {
        self.id
    }

    /// Producer endpoint, `stage.copy`.
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Consumer endpoint, `stage.copy`.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rows currently buffered.
    pub fn size(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    /// Whether the producer has declared end-of-stream.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Producer endpoint of a row set.
#[derive(Debug)]
pub struct RowSetWriter {
    shared: Arc<RowSet>,
    sender: Option<mpsc::Sender<Record>>,
    stop: CancellationToken,
}

impl RowSetWriter {
    pub fn id(&self) -> RowSetId {
        self.shared.id
    }

    pub fn row_set(&self) -> &Arc<RowSet> {
        &self.shared
    }

    /// Enqueue a record, waiting while the queue is full.
    ///
    /// Fails with [`RowSetError::Closed`] when the queue was marked done, the
    /// consumer is gone, or the stop token fires while waiting for space.
    pub async fn put(&mut self, record: Record) -> Result<(), RowSetError> {
        let sender = self.sender.as_ref().ok_or(RowSetError::Closed)?;

        let permit = tokio::select! {
            biased;
            permit = sender.reserve() => permit.map_err(|_| RowSetError::Closed)?,
            _ = self.stop.cancelled() => return Err(RowSetError::Closed),
        };

        self.shared.buffered.fetch_add(1, Ordering::SeqCst);
        permit.send(record);
        Ok(())
    }

    /// Declare that no further rows will be put. Idempotent.
    pub fn mark_done(&mut self) {
        if self.sender.take().is_some() {
            self.shared.done.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_done(&self) -> bool {
        self.sender.is_none()
    }
}

impl Drop for RowSetWriter {
    fn drop(&mut self) {
        self.mark_done();
    }
}

/// Consumer endpoint of a row set.
#[derive(Debug)]
pub struct RowSetReader {
    shared: Arc<RowSet>,
    receiver: mpsc::Receiver<Record>,
    stop: CancellationToken,
    exhausted: bool,
}

impl RowSetReader {
    pub fn id(&self) -> RowSetId {
        self.shared.id
    }

    pub fn row_set(&self) -> &Arc<RowSet> {
        &self.shared
    }

    /// Take the next record.
    ///
    /// Returns `Ok(Some(_))` while rows are available (even after a stop was
    /// signalled), `Ok(None)` once the producer marked the queue done and it
    /// is drained, and [`RowSetError::Cancelled`] when the stop token fires
    /// while waiting on an empty queue.
    pub async fn get(&mut self) -> Result<Option<Record>, RowSetError> {
        match self.receiver.try_recv() {
            Ok(record) => return Ok(Some(self.took(record))),
            Err(TryRecvError::Disconnected) => {
                self.exhausted = true;
                return Ok(None);
            }
            Err(TryRecvError::Empty) => {}
        }

        let received = tokio::select! {
            biased;
            received = self.receiver.recv() => received,
            _ = self.stop.cancelled() => return Err(RowSetError::Cancelled),
        };

        match received {
            Some(record) => Ok(Some(self.took(record))),
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Take a row only if one is already buffered. Never waits.
    pub fn try_get(&mut self) -> Option<Record> {
        match self.receiver.try_recv() {
            Ok(record) => Some(self.took(record)),
            Err(TryRecvError::Disconnected) => {
                self.exhausted = true;
                None
            }
            Err(TryRecvError::Empty) => None,
        }
    }

    fn took(&self, record: Record) -> Record {
        self.shared.buffered.fetch_sub(1, Ordering::SeqCst);
        record
    }

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<Record>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(record)) => Poll::Ready(Some(self.took(record))),
            Poll::Ready(None) => {
                self.exhausted = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Fan-in over the input row sets of one stage instance.
///
/// Reads from whichever queue has a row ready. The scan starts after the
/// queue that produced the previous row so a busy queue cannot starve the
/// others.
#[derive(Debug)]
pub struct InputSet {
    readers: Vec<RowSetReader>,
    next: usize,
    stop: CancellationToken,
}

impl InputSet {
    pub fn new(readers: Vec<RowSetReader>, stop: CancellationToken) -> Self {
        Self {
            readers,
            next: 0,
            stop,
        }
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// Next record from any input; `Ok(None)` once every input is drained
    /// and done.
    pub async fn get(&mut self) -> Result<Option<Record>, RowSetError> {
        if let [single] = self.readers.as_mut_slice() {
            return single.get().await;
        }

        let stop = self.stop.clone();
        tokio::select! {
            biased;
            record = poll_fn(|cx| self.poll_next(cx)) => Ok(record),
            _ = stop.cancelled() => Err(RowSetError::Cancelled),
        }
    }

    /// Take a buffered row from any input, rotating like `get`. `None` when
    /// every input is empty or finished.
    pub fn try_get(&mut self) -> Option<Record> {
        let len = self.readers.len();
        for offset in 0..len {
            let idx = (self.next + offset) % len;
            let reader = &mut self.readers[idx];
            if reader.exhausted {
                continue;
            }
            if let Some(record) = reader.try_get() {
                self.next = (idx + 1) % len;
                return Some(record);
            }
        }
        None
    }

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<Record>> {
        let len = self.readers.len();
        let mut open = 0;

        for offset in 0..len {
            let idx = (self.next + offset) % len;
            let reader = &mut self.readers[idx];
            if reader.exhausted {
                continue;
            }
            match reader.poll_next(cx) {
                Poll::Ready(Some(record)) => {
                    self.next = (idx + 1) % len;
                    return Poll::Ready(Some(record));
                }
                Poll::Ready(None) => {}
                Poll::Pending => open += 1,
            }
        }

        if open == 0 {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}
