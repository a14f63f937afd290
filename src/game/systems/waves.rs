//! World-level manager
//!
//! A wave is spawned all at once at the start of a world level; clearing it
//! advances the level. Spawn count grows linearly up to `SPAWN_CAP`, after
//! which difficulty grows through enemy stats instead.

use rand::Rng;
use tracing::{debug, info};

use crate::game::constants::{arena_bounds, waves};
use crate::game::state::{Enemy, EnemyId, EnemyType, Players};
use crate::game::stats::Stats;
use crate::util::vec2::Vec2;

/// Enemies spawned for world level `level` (1-based)
#[inline]
pub fn spawn_count(level: u32) -> u32 {
    (waves::BASE_COUNT + waves::COUNT_PER_LEVEL * level.saturating_sub(1)).min(waves::SPAWN_CAP)
}

/// Per-match wave state
#[derive(Debug, Clone)]
pub struct WaveManager {
    level: u32,
    remaining: u32,
    total: u32,
    /// First level whose spawn count hit the cap
    cap_level: Option<u32>,
    active: bool,
}

impl Default for WaveManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveManager {
    pub fn new() -> Self {
        Self {
            level: 1,
            remaining: 0,
            total: 0,
            cap_level: None,
            active: false,
        }
    }

    /// Manager already running `level` with `remaining` enemies left
    #[cfg(test)]
    pub(crate) fn tracking(level: u32, remaining: u32) -> Self {
        Self {
            level,
            remaining,
            total: spawn_count(level),
            cap_level: None,
            active: true,
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn cap_level(&self) -> Option<u32> {
        self.cap_level
    }

    /// Levels past the cap level; zero until the cap is reached
    pub fn scale_level(&self) -> u32 {
        self.cap_level.map_or(0, |cap| self.level.saturating_sub(cap))
    }

    /// Reset to level 1 and spawn its wave
    pub fn start_first_wave<R: Rng + ?Sized>(
        &mut self,
        enemies: &mut Vec<Enemy>,
        players: &Players,
        next_id: &mut EnemyId,
        rng: &mut R,
    ) {
        self.level = 1;
        self.active = true;
        self.spawn_wave(enemies, players, next_id, rng);
    }

    /// Count this tick's enemy deaths against the wave.
    ///
    /// Spawns the next wave when the current one is cleared, unless the match
    /// is ending. Returns true if a wave was spawned.
    pub fn handle_deaths<R: Rng + ?Sized>(
        &mut self,
        enemy_deaths: usize,
        enemies: &mut Vec<Enemy>,
        players: &Players,
        next_id: &mut EnemyId,
        rng: &mut R,
        match_ending: bool,
    ) -> bool {
        if !self.active || enemy_deaths == 0 {
            return false;
        }

        let deaths = u32::try_from(enemy_deaths).unwrap_or(u32::MAX);
        self.remaining = self.remaining.saturating_sub(deaths);

        if self.remaining > 0 || match_ending {
            return false;
        }

        self.level += 1;
        self.spawn_wave(enemies, players, next_id, rng);
        true
    }

    fn spawn_wave<R: Rng + ?Sized>(
        &mut self,
        enemies: &mut Vec<Enemy>,
        players: &Players,
        next_id: &mut EnemyId,
        rng: &mut R,
    ) {
        let count = spawn_count(self.level);
        self.total = count;
        self.remaining = count;

        if count == waves::SPAWN_CAP && self.cap_level.is_none() {
            self.cap_level = Some(self.level);
            info!("Wave spawn cap reached at world level {}", self.level);
        }

        let swipers = (count / 4).max(1);
        let bumpers = count.saturating_sub(swipers);
        enemies.reserve(count as usize);

        let kinds = std::iter::repeat(EnemyType::Bumper)
            .take(bumpers as usize)
            .chain(std::iter::repeat(EnemyType::Swiper).take(swipers as usize));
        for kind in kinds {
            let position = spawn_position(players, rng);
            let stats = self.scaled_stats(kind.base_stats());
            let hp = stats.health.max(1);
            enemies.push(Enemy::new(*next_id, position, stats, hp, kind));
            *next_id += 1;
        }

        debug!(
            "Spawned wave for level {}: {} bumpers, {} swipers (scale level {})",
            self.level,
            bumpers,
            swipers,
            self.scale_level()
        );
    }

    /// Base stats with post-cap growth applied to health, damage and speed
    pub fn scaled_stats(&self, base: Stats) -> Stats {
        let scale = self.scale_level() as f64;
        let grow = |v: i32, per_level: f64| (v as f64 * (1.0 + per_level * scale)).round() as i32;
        Stats {
            health: grow(base.health, waves::HP_SCALE_PER_LEVEL),
            damage_mult: grow(base.damage_mult, waves::DAMAGE_SCALE_PER_LEVEL),
            move_speed: grow(base.move_speed, waves::SPEED_SCALE_PER_LEVEL),
            ..base
        }
    }
}

/// Uniform point in the arena, away from players when a few tries allow it
fn spawn_position<R: Rng + ?Sized>(players: &Players, rng: &mut R) -> Vec2 {
    let (min, max) = arena_bounds();
    let mut sample = || Vec2::new(rng.gen_range(min.x..=max.x), rng.gen_range(min.y..=max.y));
    let safe_sq = waves::SAFE_PLAYER_RADIUS_PX * waves::SAFE_PLAYER_RADIUS_PX;

    for _ in 0..waves::MAX_SPAWN_ATTEMPTS {
        let candidate = sample();
        if players.values().all(|p| candidate.distance_sq_to(p.position) >= safe_sq) {
            return candidate;
        }
    }
    sample()
}
