//! The worker pool owned by each [`Node`](crate::node::Node): lifecycle
//! bookkeeping (`NotStarted` → `Running` → `Finished`) shared by every
//! node regardless of what its `action` does.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::ids::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    NotStarted,
    Running,
    Finished,
}

struct WorkerSlot {
    finished: Arc<AtomicBool>,
    handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

/// Lifecycle state machine for a node's `num_processes` workers.
///
/// This is deliberately ignorant of what a worker actually runs — `Node`
/// supplies a spawn closure at `start` time that wires up `setup` /
/// `action` / `teardown` and the liveness flag this pool hands it.
pub(crate) struct Pool {
    node: NodeId,
    num_processes: AtomicUsize,
    state: Mutex<PoolState>,
    workers: Mutex<Vec<WorkerSlot>>,
    killed: AtomicBool,
}

impl Pool {
    pub fn new(node: NodeId, num_processes: usize) -> Self {
        Self {
            node,
            num_processes: AtomicUsize::new(num_processes),
            state: Mutex::new(PoolState::NotStarted),
            workers: Mutex::new(Vec::new()),
            killed: AtomicBool::new(false),
        }
    }

    /// True once `kill` has run and hasn't since been cleared by `reset`.
    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn num_processes(&self) -> usize {
        self.num_processes.load(Ordering::SeqCst)
    }

    pub fn set_num_processes(&self, n: usize) -> Result<()> {
        if n == 0 {
            tracing::warn!(node = %self.node, "rejected set_num_processes(0)");
            return Err(Error::InvalidArgument("num_processes must be at least 1".into()));
        }
        let state = self.state.lock();
        if *state != PoolState::NotStarted {
            tracing::warn!(node = %self.node, "rejected set_num_processes after the pool started");
            return Err(Error::RuntimeState(
                "num_processes cannot change after the pool has started".into(),
            ));
        }
        self.num_processes.store(n, Ordering::SeqCst);
        Ok(())
    }

    /// Spawns `num_processes` workers via `spawn_worker(index, finished_flag)`.
    /// Errors if the pool was already started.
    pub fn start<F>(&self, spawn_worker: F) -> Result<()>
    where
        F: Fn(usize, Arc<AtomicBool>) -> JoinHandle<std::result::Result<(), String>>,
    {
        let mut state = self.state.lock();
        if *state != PoolState::NotStarted {
            tracing::warn!(node = %self.node, "rejected starting an already-started pool");
            return Err(Error::RuntimeState("pool has already been started".into()));
        }
        *state = PoolState::Running;
        drop(state);

        let mut workers = self.workers.lock();
        for idx in 0..self.num_processes() {
            let finished = Arc::new(AtomicBool::new(false));
            let handle = spawn_worker(idx, finished.clone());
            workers.push(WorkerSlot { finished, handle: Some(handle) });
        }
        tracing::debug!(node = %self.node, workers = workers.len(), "pool started");
        Ok(())
    }

    /// Joins every worker thread. Returns the first panic encountered, if
    /// any, after every worker has been joined.
    pub fn join(&self) -> Result<()> {
        {
            let state = self.state.lock();
            if *state == PoolState::NotStarted {
                tracing::warn!(node = %self.node, "rejected joining a pool that was never started");
                return Err(Error::RuntimeState("pool was never started".into()));
            }
        }
        let mut first_panic = None;
        {
            let mut workers = self.workers.lock();
            for worker in workers.iter_mut() {
                if let Some(handle) = worker.handle.take() {
                    match handle.join() {
                        Ok(Ok(())) => {}
                        Ok(Err(message)) => first_panic.get_or_insert(message),
                        Err(_) => first_panic.get_or_insert("worker thread did not unwind cleanly".into()),
                    };
                }
            }
        }
        *self.state.lock() = PoolState::Finished;
        tracing::debug!(node = %self.node, "pool joined");
        match first_panic {
            Some(message) => {
                tracing::warn!(node = %self.node, panic = %message, "worker panicked");
                Err(Error::WorkerPanicked { node: self.node, message })
            }
            None => Ok(()),
        }
    }

    /// Marks every worker finished immediately and detaches its thread
    /// handle without joining or running `teardown`.
    pub fn kill(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == PoolState::NotStarted {
            tracing::warn!(node = %self.node, "rejected killing a pool that was never started");
            return Err(Error::RuntimeState("cannot kill a pool that was never started".into()));
        }
        for worker in self.workers.lock().iter_mut() {
            worker.finished.store(true, Ordering::SeqCst);
            worker.handle.take();
        }
        *state = PoolState::Finished;
        self.killed.store(true, Ordering::SeqCst);
        tracing::warn!(node = %self.node, "pool killed");
        Ok(())
    }

    /// Returns the pool to a pre-start state. Only valid once finished.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != PoolState::Finished {
            tracing::warn!(node = %self.node, "rejected resetting a pool that hasn't finished");
            return Err(Error::RuntimeState(
                "reset is only valid once every worker has finished".into(),
            ));
        }
        self.workers.lock().clear();
        *state = PoolState::NotStarted;
        self.killed.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        let workers = self.workers.lock();
        !workers.is_empty() && workers.iter().all(|w| w.finished.load(Ordering::SeqCst))
    }
}
