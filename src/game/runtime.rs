//! Authoritative state of one match and its fixed-step tick
//!
//! A `MatchRuntime` owns its players, enemies and wave state by value. The
//! scheduler calls `tick` once per frame; action queues call `set_move` and
//! `apply_upgrade` between frames.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::config::FogConfig;
use crate::game::constants::{enemy, sim};
use crate::game::match_result::{check_match_end, determine_result, MatchEndReason, MatchResult};
use crate::game::state::{Enemy, MatchId, Player, PlayerId, PlayerSpec, Players};
use crate::game::systems::ai::{self, FogRadii};
use crate::game::systems::combat::{self, find_enemy, MatchEvents};
use crate::game::systems::snapshot::{self, PlayerSnapshot};
use crate::game::systems::waves::WaveManager;
use crate::game::systems::{attack, physics};
use crate::game::upgrades::UpgradeType;

/// Wall-clock milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Match lifecycle; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchPhase {
    Created,
    Started,
    Ended,
}

/// Everything one tick produced
#[derive(Debug, Clone, Default)]
pub struct MatchDelta {
    pub events: MatchEvents,
    /// Per-player views, in player id order
    pub snapshots: Vec<PlayerSnapshot>,
    pub should_end: bool,
}

impl MatchDelta {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub struct MatchRuntime {
    match_id: MatchId,
    players: Players,
    /// Sorted by id; ids are assigned in increasing order
    enemies: Vec<Enemy>,
    waves: WaveManager,
    fog: FogConfig,
    radii: FogRadii,
    phase: MatchPhase,
    start_time: i64,
    next_enemy_id: i64,
    rng: StdRng,
    /// Set when the lobby stopped the match rather than it ending in play
    stopped: bool,
    /// Set once match-end side effects have been claimed
    finalized: bool,
}

impl MatchRuntime {
    pub fn new(match_id: MatchId, fog: FogConfig) -> Self {
        Self::with_rng(match_id, fog, StdRng::from_entropy())
    }

    /// Deterministic runtime for tests and benches
    pub fn with_seed(match_id: MatchId, fog: FogConfig, seed: u64) -> Self {
        Self::with_rng(match_id, fog, StdRng::seed_from_u64(seed))
    }

    fn with_rng(match_id: MatchId, fog: FogConfig, rng: StdRng) -> Self {
        Self {
            match_id,
            players: Players::new(),
            enemies: Vec::new(),
            waves: WaveManager::new(),
            fog,
            radii: fog.radii(),
            phase: MatchPhase::Created,
            start_time: 0,
            next_enemy_id: enemy::FIRST_ID,
            rng,
            stopped: false,
            finalized: false,
        }
    }

    // === accessors ===

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn is_started(&self) -> bool {
        self.phase == MatchPhase::Started
    }

    pub fn is_ended(&self) -> bool {
        self.phase == MatchPhase::Ended
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn fog(&self) -> FogConfig {
        self.fog
    }

    pub fn world_level(&self) -> u32 {
        self.waves.level()
    }

    pub fn waves(&self) -> &WaveManager {
        &self.waves
    }

    pub fn players(&self) -> &Players {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn contains_player(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn enemies(&self) -> &[Enemy] {
        &self.enemies
    }

    pub fn enemies_mut(&mut self) -> &mut [Enemy] {
        &mut self.enemies
    }

    pub fn living_players(&self) -> usize {
        self.players.values().filter(|p| p.is_alive()).count()
    }

    pub fn living_enemies(&self) -> usize {
        self.enemies.iter().filter(|e| e.is_alive()).count()
    }

    pub fn active_enemies(&self) -> usize {
        self.enemies.iter().filter(|e| e.active && e.is_alive()).count()
    }

    pub fn end_reason(&self) -> Option<MatchEndReason> {
        match (self.phase, self.stopped) {
            (MatchPhase::Ended, true) => Some(MatchEndReason::Stopped),
            (MatchPhase::Ended, false) => Some(MatchEndReason::AllPlayersDead),
            _ => None,
        }
    }

    // === lifecycle ===

    /// Add a player from the lobby roster. Ignored after the match ended or
    /// when the id is already present.
    pub fn add_player(&mut self, spec: &PlayerSpec) -> bool {
        if self.is_ended() || self.players.contains_key(&spec.player_id) {
            return false;
        }
        self.players.insert(spec.player_id, Player::new(spec));
        info!(
            "Player {} joined match {} at ({:.0}, {:.0}) with {:?}",
            spec.player_id, self.match_id, spec.spawn_position.x, spec.spawn_position.y, spec.style
        );
        true
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!("Player {} left match {}", id, self.match_id);
        }
        removed
    }

    pub fn start(&mut self) -> bool {
        self.start_at(now_ms())
    }

    /// Created -> Started and spawn the first wave. No-op in any other phase.
    pub fn start_at(&mut self, now: i64) -> bool {
        if self.phase != MatchPhase::Created {
            return false;
        }
        self.phase = MatchPhase::Started;
        self.start_time = now;
        self.waves
            .start_first_wave(&mut self.enemies, &self.players, &mut self.next_enemy_id, &mut self.rng);
        info!(
            "Match {} started with {} players, {} enemies in wave 1",
            self.match_id,
            self.players.len(),
            self.enemies.len()
        );
        true
    }

    /// Explicit stop. Match-end side effects are not run for stopped matches.
    pub fn stop(&mut self) -> bool {
        if self.is_ended() {
            return false;
        }
        self.phase = MatchPhase::Ended;
        self.stopped = true;
        info!("Match {} stopped", self.match_id);
        true
    }

    /// Claim the match-end side effects. Returns true exactly once per match,
    /// and never for a stopped match.
    pub fn begin_finalize(&mut self) -> bool {
        if self.finalized || self.stopped {
            return false;
        }
        self.finalized = true;
        self.phase = MatchPhase::Ended;
        true
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn result(&self, now: i64) -> MatchResult {
        determine_result(&self.players, self.start_time, now)
    }

    // === player commands ===

    /// Record movement input for a player. Unknown players are ignored.
    pub fn set_move(&mut self, player: PlayerId, mx: f64, my: f64, seq: u64) -> bool {
        self.players
            .get_mut(&player)
            .is_some_and(|p| p.set_move(mx, my, seq))
    }

    /// Apply a level-up pick. Unknown players and players not choosing are ignored.
    pub fn apply_upgrade(&mut self, player: PlayerId, upgrade: UpgradeType) -> bool {
        if self.is_ended() {
            return false;
        }
        self.players
            .get_mut(&player)
            .is_some_and(|p| p.apply_upgrade(upgrade))
    }

    // === simulation ===

    pub fn tick(&mut self) -> MatchDelta {
        self.tick_at(now_ms())
    }

    /// Advance one fixed step at wall-clock time `now` (ms)
    pub fn tick_at(&mut self, now: i64) -> MatchDelta {
        if self.phase != MatchPhase::Started {
            return MatchDelta::empty();
        }
        let dt = sim::DT;

        physics::integrate_players(&mut self.players, dt);
        physics::integrate_enemies(&mut self.enemies, dt);

        ai::gate_activity(&mut self.enemies, &self.players, &self.radii);
        let enemy_hits = ai::step(&mut self.enemies, &self.players, &self.radii, now, &mut self.rng);

        let player_hits = attack::resolve_player_attacks(&mut self.players, &self.enemies, now, dt, &mut self.rng);

        let events = combat::resolve(
            &mut self.players,
            &mut self.enemies,
            &player_hits,
            &enemy_hits,
            &mut self.rng,
        );

        // Ended before the wave manager runs so a dying match never spawns
        let should_end = check_match_end(&self.players).is_some();
        if should_end {
            self.phase = MatchPhase::Ended;
            info!("Match {} ended: no living players", self.match_id);
        }

        let spawned = self.waves.handle_deaths(
            events.enemy_deaths(),
            &mut self.enemies,
            &self.players,
            &mut self.next_enemy_id,
            &mut self.rng,
            should_end,
        );
        if spawned {
            info!(
                "Match {} advanced to world level {} ({} enemies)",
                self.match_id,
                self.waves.level(),
                self.waves.total()
            );
        }

        let snapshots = snapshot::build(&self.players, &self.enemies, self.radii.light_px);

        self.prune_dead_enemies();

        MatchDelta {
            events,
            snapshots,
            should_end,
        }
    }

    /// Drop dead enemies and orbit cooldowns that point at them
    fn prune_dead_enemies(&mut self) {
        let before = self.enemies.len();
        self.enemies.retain(|e| e.is_alive());
        if self.enemies.len() == before {
            return;
        }

        let enemies = &self.enemies;
        for player in self.players.values_mut() {
            player
                .orbit_last_hit
                .retain(|id, _| find_enemy(enemies, *id).is_some());
        }
        debug!(
            "Match {} pruned {} dead enemies",
            self.match_id,
            before - self.enemies.len()
        );
    }
}
