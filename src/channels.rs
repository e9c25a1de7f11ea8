// Queues and history shared between handler tasks and the test driver
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::recorded::RecordedRequest;
use crate::response::ResponseFunc;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking driver thread must not wedge later tests.
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// The two bounded FIFO queues. Requests flow from handlers to the driver,
/// response producers from the driver to handlers.
pub(crate) struct Channels {
    req_tx: mpsc::Sender<RecordedRequest>,
    req_rx: Mutex<mpsc::Receiver<RecordedRequest>>,
    resp_tx: mpsc::Sender<ResponseFunc>,
    // Many handlers wait on one receiver; the async mutex queues them fairly,
    // so producers go out in the order handlers started waiting.
    resp_rx: tokio::sync::Mutex<mpsc::Receiver<ResponseFunc>>,
    // Held from stamping a request until it is queued, so queue order and
    // sequence numbers agree.
    arrival: tokio::sync::Mutex<()>,
}

impl Channels {
    pub fn new(capacity: usize) -> Self {
        let (req_tx, req_rx) = mpsc::channel(capacity);
        let (resp_tx, resp_rx) = mpsc::channel(capacity);
        Channels {
            req_tx,
            req_rx: Mutex::new(req_rx),
            resp_tx,
            resp_rx: tokio::sync::Mutex::new(resp_rx),
            arrival: tokio::sync::Mutex::new(()),
        }
    }

    /// Record `r` in `history` and queue it for the driver. Suspends while the
    /// request queue is full.
    pub async fn push_request(&self, history: &History, r: RecordedRequest) -> RecordedRequest {
        let _arrival = self.arrival.lock().await;
        let r = history.record(r);
        if self.req_tx.send(r.clone()).await.is_err() {
            crate::log::warn("request queue closed, dropping request");
        }
        r
    }

    /// Next scheduled producer, or None once `timeout` has elapsed.
    pub async fn next_responder(&self, timeout: Duration) -> Option<ResponseFunc> {
        let wait = async { self.resp_rx.lock().await.recv().await };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }

    /// Driver side. Blocks while the response queue is full.
    pub fn schedule(&self, f: ResponseFunc) {
        if self.resp_tx.blocking_send(f).is_err() {
            crate::log::warn("response queue closed, dropping scheduled response");
        }
    }

    /// Driver side. Takes exactly `n` requests in arrival order, each bounded by
    /// `timeout`; never returns a partial batch.
    pub fn recv_requests(&self, rt: &Runtime, n: usize, timeout: Duration) -> Result<Vec<RecordedRequest>> {
        let mut rx = lock(&self.req_rx);
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            // The timer must be created inside the runtime.
            match rt.block_on(async { tokio::time::timeout(timeout, rx.recv()).await }) {
                Ok(Some(r)) => out.push(r),
                _ => {
                    return Err(Error::RequestTimeout { received: out.len(), expected: n, timeout });
                }
            }
        }
        Ok(out)
    }

    /// Discard whatever is queued right now on both sides. Entries enqueued
    /// concurrently may or may not survive.
    pub fn flush(&self) -> (usize, usize) {
        let mut requests = 0;
        {
            let mut rx = lock(&self.req_rx);
            while rx.try_recv().is_ok() {
                requests += 1;
            }
        }
        let mut responses = 0;
        // A held lock means a handler is parked on an empty queue.
        if let Ok(mut rx) = self.resp_rx.try_lock() {
            while rx.try_recv().is_ok() {
                responses += 1;
            }
        }
        (requests, responses)
    }
}

/// Append-only log of every recorded request, in arrival order.
#[derive(Default)]
pub(crate) struct History {
    entries: Mutex<Vec<RecordedRequest>>,
    next_seq: AtomicU64,
}

impl History {
    /// Stamp `r` with the next sequence number and append it.
    pub fn record(&self, mut r: RecordedRequest) -> RecordedRequest {
        let mut entries = lock(&self.entries);
        r.set_seq(self.next_seq.fetch_add(1, Ordering::Relaxed) + 1);
        entries.push(r.clone());
        r
    }

    pub fn snapshot(&self) -> Vec<RecordedRequest> {
        lock(&self.entries).clone()
    }

    /// Drop entry `seq`. When it was the latest one stamped, its number is
    /// handed out again, so a hidden request leaves no gap.
    pub fn remove(&self, seq: u64) {
        let mut entries = lock(&self.entries);
        entries.retain(|r| r.seq() != seq);
        let _ = self.next_seq.compare_exchange(seq, seq.saturating_sub(1), Ordering::Relaxed, Ordering::Relaxed);
    }
}
