//! Per-user action queues
//!
//! Every player gets one worker thread fed by an unbounded channel. Tasks for
//! the same player run one at a time in submission order, so a later input
//! can never be overtaken by an earlier one. A failing or panicking task is
//! logged and the worker moves on to the next.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};
use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::game::state::{MatchId, PlayerId};

/// Failure of a queued task itself
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Match {0} not found")]
    UnknownMatch(MatchId),
    #[error("Player {0} is not in any running match")]
    UnknownPlayer(PlayerId),
    #[error("Player {0} is not choosing an upgrade")]
    NotChoosing(PlayerId),
}

/// Failure to hand a task to a queue
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Action queues are shut down")]
    ShutDown,
    #[error("Failed to spawn worker for player {0}: {1}")]
    Spawn(PlayerId, String),
    #[error("Worker for player {0} is gone")]
    Disconnected(PlayerId),
}

pub type Task = Box<dyn FnOnce() -> Result<(), ActionError> + Send + 'static>;

struct Worker {
    tx: Sender<Task>,
    handle: JoinHandle<()>,
}

/// Counters shared with the worker threads
#[derive(Debug, Default)]
struct QueueStats {
    executed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Default)]
pub struct ActionQueues {
    workers: Mutex<HashMap<PlayerId, Worker>>,
    stats: Arc<QueueStats>,
    shut_down: AtomicBool,
}

impl ActionQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` behind everything already submitted for `player_id`
    pub fn submit<F>(&self, player_id: PlayerId, task: F) -> Result<(), QueueError>
    where
        F: FnOnce() -> Result<(), ActionError> + Send + 'static,
    {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(QueueError::ShutDown);
        }

        // Sending under the map lock keeps channel order equal to submit order
        let mut workers = self.workers.lock();
        if !workers.contains_key(&player_id) {
            let worker = self.spawn_worker(player_id)?;
            workers.insert(player_id, worker);
        }
        let worker = workers.get(&player_id).ok_or(QueueError::Disconnected(player_id))?;
        worker
            .tx
            .send(Box::new(task))
            .map_err(|_| QueueError::Disconnected(player_id))
    }

    fn spawn_worker(&self, player_id: PlayerId) -> Result<Worker, QueueError> {
        let (tx, rx) = unbounded::<Task>();
        let stats = self.stats.clone();

        let handle = thread::Builder::new()
            .name(format!("user-{}-actions", player_id))
            .spawn(move || {
                for task in rx.iter() {
                    stats.executed.fetch_add(1, Ordering::Relaxed);
                    match catch_unwind(AssertUnwindSafe(task)) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            stats.failed.fetch_add(1, Ordering::Relaxed);
                            warn!("Action for player {} failed: {}", player_id, e);
                        }
                        Err(_) => {
                            stats.failed.fetch_add(1, Ordering::Relaxed);
                            warn!("Action for player {} panicked", player_id);
                        }
                    }
                }
            })
            .map_err(|e| QueueError::Spawn(player_id, e.to_string()))?;

        debug!("Action queue created for player {}", player_id);
        Ok(Worker { tx, handle })
    }

    /// Block until every task submitted so far for `player_id` has run
    pub fn flush(&self, player_id: PlayerId) -> Result<(), QueueError> {
        let (done_tx, done_rx) = bounded::<()>(1);
        {
            let workers = self.workers.lock();
            let Some(worker) = workers.get(&player_id) else {
                return Ok(());
            };
            let marker: Task = Box::new(move || {
                let _ = done_tx.send(());
                Ok(())
            });
            worker
                .tx
                .send(marker)
                .map_err(|_| QueueError::Disconnected(player_id))?;
        }
        done_rx.recv().map_err(|_| QueueError::Disconnected(player_id))
    }

    /// Stop a player's worker after it finishes its queued tasks
    pub fn remove(&self, player_id: PlayerId) -> bool {
        let worker = self.workers.lock().remove(&player_id);
        match worker {
            Some(worker) => {
                Self::join(player_id, worker);
                true
            }
            None => false,
        }
    }

    /// Detach the workers of `player_ids` without waiting for them. Each
    /// thread exits once it has drained what was already queued. Safe to call
    /// while holding a runtime lock that queued tasks may be waiting on.
    pub fn release(&self, player_ids: &[PlayerId]) -> usize {
        let released: Vec<Worker> = {
            let mut workers = self.workers.lock();
            player_ids.iter().filter_map(|id| workers.remove(id)).collect()
        };
        if !released.is_empty() {
            debug!("Released {} action queues", released.len());
        }
        // Dropping the sender closes the channel; dropping the handle detaches
        released.len()
    }

    /// Refuse new work and stop every worker
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let workers: Vec<(PlayerId, Worker)> = self.workers.lock().drain().collect();
        let count = workers.len();
        for (player_id, worker) in workers {
            Self::join(player_id, worker);
        }
        if count > 0 {
            debug!("Stopped {} action queues", count);
        }
    }

    fn join(player_id: PlayerId, worker: Worker) {
        let Worker { tx, handle } = worker;
        // Closing the channel ends the worker loop once it is drained
        drop(tx);
        if handle.join().is_err() {
            warn!("Action queue for player {} did not shut down cleanly", player_id);
        }
    }

    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.lock().is_empty()
    }

    /// Tasks started so far, including failed ones and flush markers
    pub fn executed(&self) -> u64 {
        self.stats.executed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }
}

impl Drop for ActionQueues {
    fn drop(&mut self) {
        self.shutdown();
    }
}
