//! Runtime registry
//!
//! Maps match ids to their live runtimes. The scheduler iterates a snapshot
//! of it every frame; the lobby collaborator drives lifecycle through it.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::FogConfig;
use crate::game::runtime::MatchRuntime;
use crate::game::state::{MatchId, PlayerId, PlayerSpec};

/// A runtime shared between the scheduler and the action queues
pub type SharedRuntime = Arc<Mutex<MatchRuntime>>;

#[derive(Default)]
pub struct RuntimeRegistry {
    runtimes: RwLock<HashMap<MatchId, SharedRuntime>>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new runtime for `match_id`. An existing runtime under the
    /// same id is kept and returned.
    pub fn create_runtime(&self, match_id: MatchId, fog: FogConfig) -> SharedRuntime {
        self.insert(MatchRuntime::new(match_id, fog))
    }

    /// Register an already built runtime
    pub fn insert(&self, runtime: MatchRuntime) -> SharedRuntime {
        let match_id = runtime.match_id();
        let mut runtimes = self.runtimes.write();
        if let Some(existing) = runtimes.get(&match_id) {
            debug!("Runtime for match {} already exists", match_id);
            return existing.clone();
        }

        let shared = Arc::new(Mutex::new(runtime));
        runtimes.insert(match_id, shared.clone());
        info!("Runtime created for match {}", match_id);
        shared
    }

    /// Add a roster entry to a registered match
    pub fn add_player(&self, match_id: MatchId, spec: &PlayerSpec) -> bool {
        match self.get(match_id) {
            Some(runtime) => runtime.lock().add_player(spec),
            None => false,
        }
    }

    /// Start a match created earlier. Unknown or already started matches are ignored.
    pub fn start_existing_runtime(&self, match_id: MatchId) -> bool {
        match self.get(match_id) {
            Some(runtime) => runtime.lock().start(),
            None => false,
        }
    }

    /// Create and start in one step, for matches without a countdown
    pub fn start_runtime(&self, match_id: MatchId, fog: FogConfig) -> SharedRuntime {
        let runtime = self.create_runtime(match_id, fog);
        runtime.lock().start();
        runtime
    }

    /// Explicit stop: end the runtime without match-end side effects and
    /// drop it from the registry
    pub fn stop(&self, match_id: MatchId) -> bool {
        let Some(runtime) = self.end(match_id) else {
            return false;
        };
        let stopped = runtime.lock().stop();
        stopped
    }

    /// Remove a runtime. Idempotent; returns it on first removal only.
    pub fn end(&self, match_id: MatchId) -> Option<SharedRuntime> {
        let removed = self.runtimes.write().remove(&match_id);
        if removed.is_some() {
            info!("Runtime for match {} removed", match_id);
        }
        removed
    }

    pub fn get(&self, match_id: MatchId) -> Option<SharedRuntime> {
        self.runtimes.read().get(&match_id).cloned()
    }

    pub fn contains(&self, match_id: MatchId) -> bool {
        self.runtimes.read().contains_key(&match_id)
    }

    /// Snapshot of every registered runtime, in match id order
    pub fn active(&self) -> Vec<(MatchId, SharedRuntime)> {
        let mut active: Vec<_> = self
            .runtimes
            .read()
            .iter()
            .map(|(id, rt)| (*id, rt.clone()))
            .collect();
        active.sort_unstable_by_key(|(id, _)| *id);
        active
    }

    /// The runtime that currently holds `player_id`, if any
    pub fn find_by_player(&self, player_id: PlayerId) -> Option<SharedRuntime> {
        // Registry lock is released before any runtime lock is taken
        self.active()
            .into_iter()
            .map(|(_, rt)| rt)
            .find(|rt| rt.lock().contains_player(player_id))
    }

    pub fn len(&self) -> usize {
        self.runtimes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.read().is_empty()
    }
}
