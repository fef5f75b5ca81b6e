//! In-process request queue, result store, and the single worker thread.
//!
//! HTTP boundary threads only touch the queue and the result store; the
//! one worker owns every worktree and compiler invocation. Requests are
//! processed strictly in enqueue order.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use uuid::Uuid;

use crate::model::{CancelFlag, ModRequest, ModResult, ResultStatus};

/// Seam between the worker and the engine; lets tests drive the worker
/// with a stub.
pub trait RequestProcessor: Send + Sync {
    fn process(&self, request: &ModRequest, cancel: &CancelFlag) -> ModResult;
}

// ============================================================================
// Result store
// ============================================================================

/// Shared `request-id → result` map. Reads return snapshots; writes enforce
/// the monotone status transition rule.
#[derive(Default)]
pub struct ResultStore {
    inner: Mutex<HashMap<Uuid, ModResult>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or transition. A write that would move a status backwards is
    /// dropped with a warning; results only move forward.
    pub fn update(&self, id: Uuid, result: ModResult) {
        let mut inner = self.inner.lock().expect("result store poisoned");
        match inner.get(&id) {
            Some(existing) if !existing.status.can_transition_to(result.status) => {
                tracing::warn!(
                    %id,
                    from = ?existing.status,
                    to = ?result.status,
                    "dropping non-monotone status update"
                );
            }
            _ => {
                inner.insert(id, result);
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Option<ModResult> {
        self.inner.lock().expect("result store poisoned").get(&id).cloned()
    }

    pub fn snapshot(&self) -> HashMap<Uuid, ModResult> {
        self.inner.lock().expect("result store poisoned").clone()
    }
}

// ============================================================================
// Queue
// ============================================================================

pub struct RequestQueue {
    tx: Mutex<mpsc::Sender<ModRequest>>,
    size: AtomicUsize,
    /// Requests cancelled before the worker picked them up.
    cancelled: Mutex<HashSet<Uuid>>,
    /// Cancel flag of the request currently being processed, if any.
    in_flight: Mutex<Option<(Uuid, CancelFlag)>>,
}

impl RequestQueue {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<ModRequest>) {
        let (tx, rx) = mpsc::channel();
        let queue = Arc::new(Self {
            tx: Mutex::new(tx),
            size: AtomicUsize::new(0),
            cancelled: Mutex::new(HashSet::new()),
            in_flight: Mutex::new(None),
        });
        (queue, rx)
    }

    pub fn push(&self, request: ModRequest) {
        self.size.fetch_add(1, Ordering::SeqCst);
        let tx = self.tx.lock().expect("queue sender poisoned");
        if tx.send(request).is_err() {
            tracing::error!("worker is gone; request dropped");
            self.size.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn len(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel a request. Pending requests are skipped by the worker; the
    /// in-flight request gets its flag set and finalizes early.
    pub fn cancel(&self, id: Uuid) {
        if let Some((current, flag)) = self.in_flight.lock().expect("in-flight poisoned").as_ref() {
            if *current == id {
                flag.cancel();
                return;
            }
        }
        self.cancelled.lock().expect("cancel set poisoned").insert(id);
    }

    fn take_cancelled(&self, id: Uuid) -> bool {
        self.cancelled.lock().expect("cancel set poisoned").remove(&id)
    }

    fn set_in_flight(&self, entry: Option<(Uuid, CancelFlag)>) {
        *self.in_flight.lock().expect("in-flight poisoned") = entry;
    }
}

// ============================================================================
// Worker
// ============================================================================

pub struct WorkerHandle {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal shutdown and wait for the worker to finish its current
    /// request and exit.
    pub fn join_worker(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if self.join.join().is_err() {
            tracing::error!("worker thread panicked");
        }
    }
}

/// Spawn the single background worker. The pop timeout keeps the loop
/// responsive to shutdown without busy-waiting.
pub fn start_worker(
    queue: Arc<RequestQueue>,
    rx: mpsc::Receiver<ModRequest>,
    results: Arc<ResultStore>,
    processor: Arc<dyn RequestProcessor>,
) -> WorkerHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();

    let join = std::thread::Builder::new()
        .name("levelup-worker".into())
        .spawn(move || {
            tracing::info!("worker started");
            loop {
                if shutdown_flag.load(Ordering::SeqCst) {
                    break;
                }
                let request = match rx.recv_timeout(Duration::from_secs(1)) {
                    Ok(request) => request,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                queue.size.fetch_sub(1, Ordering::SeqCst);

                if queue.take_cancelled(request.id) {
                    tracing::info!(id = %request.id, "request cancelled before pickup");
                    results.update(request.id, ModResult::new(ResultStatus::Failed, "cancelled"));
                    continue;
                }

                results.update(request.id, ModResult::processing());
                let cancel = CancelFlag::default();
                queue.set_in_flight(Some((request.id, cancel.clone())));

                let result = processor.process(&request, &cancel);
                tracing::info!(id = %request.id, status = ?result.status, "request finished");

                queue.set_in_flight(None);
                results.update(request.id, result);
            }
            tracing::info!("worker stopped");
        })
        .expect("failed to spawn worker thread");

    WorkerHandle { shutdown, join }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::mod_from_id;

    struct StubProcessor {
        order: Mutex<Vec<Uuid>>,
    }

    impl RequestProcessor for StubProcessor {
        fn process(&self, request: &ModRequest, _cancel: &CancelFlag) -> ModResult {
            self.order.lock().unwrap().push(request.id);
            let mut result = ModResult::new(ResultStatus::Success, &request.description);
            result.accepted_commits = vec!["stub commit".into()];
            result
        }
    }

    fn request(description: &str) -> ModRequest {
        ModRequest::builtin(
            "https://example.com/org/widget.git",
            "widget",
            description,
            mod_from_id("remove_inline").unwrap(),
        )
    }

    fn wait_for<F: Fn() -> bool>(predicate: F) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn worker_processes_requests_in_fifo_order() {
        let (queue, rx) = RequestQueue::new();
        let results = Arc::new(ResultStore::new());
        let processor = Arc::new(StubProcessor {
            order: Mutex::new(Vec::new()),
        });

        let handle = start_worker(queue.clone(), rx, results.clone(), processor.clone());

        let requests: Vec<ModRequest> = (0..3).map(|i| request(&format!("req {i}"))).collect();
        let ids: Vec<Uuid> = requests.iter().map(|r| r.id).collect();
        for req in requests {
            results.update(req.id, ModResult::queued());
            queue.push(req);
        }

        wait_for(|| {
            ids.iter()
                .all(|id| results.get(*id).is_some_and(|r| r.status.is_terminal()))
        });
        handle.join_worker();

        assert_eq!(*processor.order.lock().unwrap(), ids);
        for id in &ids {
            let result = results.get(*id).unwrap();
            assert_eq!(result.status, ResultStatus::Success);
        }
    }

    #[test]
    fn cancel_before_pickup_fails_with_cancelled_message() {
        let (queue, rx) = RequestQueue::new();
        let results = Arc::new(ResultStore::new());
        let processor = Arc::new(StubProcessor {
            order: Mutex::new(Vec::new()),
        });

        // Cancel while no worker is draining the queue yet.
        let req = request("to be cancelled");
        let id = req.id;
        results.update(id, ModResult::queued());
        queue.push(req);
        queue.cancel(id);

        let handle = start_worker(queue.clone(), rx, results.clone(), processor.clone());
        wait_for(|| results.get(id).is_some_and(|r| r.status.is_terminal()));
        handle.join_worker();

        let result = results.get(id).unwrap();
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.message, "cancelled");
        assert!(processor.order.lock().unwrap().is_empty());
    }

    #[test]
    fn store_rejects_backward_transitions() {
        let store = ResultStore::new();
        let id = Uuid::new_v4();
        store.update(id, ModResult::new(ResultStatus::Success, "done"));
        store.update(id, ModResult::queued());
        assert_eq!(store.get(id).unwrap().status, ResultStatus::Success);
    }

    #[test]
    fn queue_size_tracks_pending_requests() {
        let (queue, _rx) = RequestQueue::new();
        assert!(queue.is_empty());
        queue.push(request("a"));
        queue.push(request("b"));
        assert_eq!(queue.len(), 2);
    }
}
