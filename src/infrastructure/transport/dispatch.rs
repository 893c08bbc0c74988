//! Report Dispatcher
//!
//! Single writer per session: producers hand off encoded reports without
//! blocking, one worker task awaits the transport in submission order.
//!
//! Movement is best effort and the next sample supersedes a lost one. Button
//! reports are not: a lost HID release leaves the host holding the button, so
//! a reliable report displaces the oldest queued best-effort one instead of
//! being dropped.

use super::{TransportError, TransportSink};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Reports that may wait behind the one in flight
pub const DISPATCH_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// May be dropped under backpressure
    BestEffort,
    /// Never dropped for backpressure
    Reliable,
}

struct Queued {
    payload: Vec<u8>,
    delivery: Delivery,
}

#[derive(Default)]
struct Queue {
    reports: VecDeque<Queued>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    ready: Notify,
    dropped: AtomicU64,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        self.queue().closed = true;
        self.ready.notify_one();
    }
}

/// Producer side. Dropping it lets the worker drain and exit.
struct Outbox(Arc<Shared>);

impl Drop for Outbox {
    fn drop(&mut self) {
        self.0.close();
    }
}

pub struct Dispatcher {
    outbox: Outbox,
    worker: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(sink: Arc<dyn TransportSink>) -> Self {
        let shared = Arc::new(Shared::default());
        let worker = tokio::spawn(run(sink, shared.clone()));
        Self {
            outbox: Outbox(shared),
            worker,
        }
    }

    /// Queue a report. Returns `false` if a report was lost to make this call.
    ///
    /// A full queue drops a new best-effort report. A reliable report instead
    /// evicts the oldest queued best-effort one; if none is queued it is
    /// appended past the depth.
    pub fn submit(&self, payload: Vec<u8>, delivery: Delivery) -> bool {
        let shared = &self.outbox.0;
        let mut queue = shared.queue();
        if queue.closed {
            return false;
        }

        let mut accepted = true;
        if queue.reports.len() >= DISPATCH_DEPTH {
            accepted = false;
            match delivery {
                Delivery::BestEffort => {
                    drop(queue);
                    self.count_drop();
                    return false;
                }
                Delivery::Reliable => {
                    let evict = queue
                        .reports
                        .iter()
                        .position(|r| r.delivery == Delivery::BestEffort);
                    match evict {
                        Some(index) => {
                            queue.reports.remove(index);
                            self.count_drop();
                        }
                        None => accepted = true,
                    }
                }
            }
        }

        queue.reports.push_back(Queued { payload, delivery });
        drop(queue);
        shared.ready.notify_one();
        accepted
    }

    fn count_drop(&self) {
        let total = self.outbox.0.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Transport busy, report dropped ({} so far)", total);
    }

    pub fn dropped(&self) -> u64 {
        self.outbox.0.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting reports. The worker drains what is queued and exits.
    pub fn shutdown(self) -> JoinHandle<()> {
        let Self { outbox, worker } = self;
        drop(outbox);
        worker
    }
}

async fn run(sink: Arc<dyn TransportSink>, shared: Arc<Shared>) {
    loop {
        let next = {
            let mut queue = shared.queue();
            match queue.reports.pop_front() {
                Some(report) => Some(report),
                None if queue.closed => break,
                None => None,
            }
        };

        // notify_one keeps a permit, so a submit between the check and here is not missed
        let Some(report) = next else {
            shared.ready.notified().await;
            continue;
        };

        match sink.send(&report.payload).await {
            Ok(()) => {}
            Err(TransportError::NotConnected) => trace!("No host bound, report discarded"),
            Err(e) => debug!("Report discarded: {}", e),
        }
    }
    debug!("{} dispatcher stopped", sink.kind());
}
