//! Match entities: players and enemies
//!
//! Entities are owned by value inside their `MatchRuntime`; everything that
//! refers to another entity does so by id.

use std::collections::BTreeMap;

use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::constants::{enemy, movement, player, upgrades};
use crate::game::stats::Stats;
use crate::game::upgrades::{generate_options, UpgradeOptions, UpgradeType};
use crate::util::vec2::Vec2;

/// Client account id, supplied by the lobby
pub type PlayerId = i64;

/// Server-assigned enemy id (monotonic per match, from 1000)
pub type EnemyId = i64;

/// Match identifier, supplied by the lobby
pub type MatchId = i64;

/// Players of one match, ordered by id
pub type Players = BTreeMap<PlayerId, Player>;

/// Player weapon behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttackStyle {
    #[default]
    Aoe,
    Cone,
    Orbit,
}

/// Enemy archetype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnemyType {
    /// Damages on contact overlap at a cadence
    Bumper,
    /// Strikes a cone in front of itself
    Swiper,
}

impl EnemyType {
    pub fn name(self) -> &'static str {
        match self {
            EnemyType::Bumper => "BUMPER",
            EnemyType::Swiper => "SWIPER",
        }
    }

    pub fn base_stats(self) -> Stats {
        match self {
            EnemyType::Bumper => enemy::BUMPER_BASE,
            EnemyType::Swiper => enemy::SWIPER_BASE,
        }
    }
}

/// Latest accepted movement input
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PendingMove {
    pub x: f64,
    pub y: f64,
    pub seq: u64,
}

impl PendingMove {
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn as_vec(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Starting roster entry handed over by the lobby
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSpec {
    pub player_id: PlayerId,
    pub spawn_position: Vec2,
    pub stats: Stats,
    #[serde(default)]
    pub style: AttackStyle,
}

impl PlayerSpec {
    pub fn new(player_id: PlayerId, spawn_position: Vec2, stats: Stats) -> Self {
        Self {
            player_id,
            spawn_position,
            stats,
            style: AttackStyle::Aoe,
        }
    }

    pub fn with_style(mut self, style: AttackStyle) -> Self {
        self.style = style;
        self
    }
}

/// XP required to leave `level`
#[inline]
pub fn xp_to_next(level: u32) -> u32 {
    player::XP_BASE + player::XP_PER_LEVEL * level
}

/// Player state
#[derive(Debug, Clone)]
pub struct Player {
    // === movement ===
    pub position: Vec2,
    pub velocity: Vec2,
    /// Last nonzero movement direction; aim for CONE when standing still
    pub last_dir: Vec2,
    pending: PendingMove,

    // === combat ===
    pub stats: Stats,
    pub style: AttackStyle,
    pub hp: i32,
    pub max_hp: i32,
    dead: bool,
    pub last_attack_at: i64,
    pub damage_multiplier: f64,
    pub move_speed_multiplier: f64,
    pub orbit_angle: f64,
    /// enemy id -> last orbit hit time (ms)
    pub orbit_last_hit: FxHashMap<EnemyId, i64>,

    // === progress ===
    pub score: u32,
    pub coins_earned: u32,
    xp: u32,
    level: u32,
    xp_to_next: u32,
    choosing_upgrade: bool,
    invincible: bool,
    upgrade_options: UpgradeOptions,

    pub id: PlayerId,
}

impl Player {
    pub fn new(spec: &PlayerSpec) -> Self {
        Self {
            position: spec.spawn_position,
            velocity: Vec2::ZERO,
            last_dir: Vec2::RIGHT,
            pending: PendingMove::default(),
            stats: spec.stats,
            style: spec.style,
            hp: spec.stats.health,
            max_hp: spec.stats.health,
            dead: false,
            last_attack_at: 0,
            damage_multiplier: 1.0,
            move_speed_multiplier: 1.0,
            orbit_angle: 0.0,
            orbit_last_hit: FxHashMap::default(),
            score: 0,
            coins_earned: 0,
            xp: 0,
            level: 1,
            xp_to_next: xp_to_next(1),
            choosing_upgrade: false,
            invincible: false,
            upgrade_options: UpgradeOptions::new(),
            id: spec.player_id,
        }
    }

    pub fn radius(&self) -> f64 {
        player::RADIUS_PX
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn is_alive(&self) -> bool {
        !self.dead
    }

    pub fn xp(&self) -> u32 {
        self.xp
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn xp_to_next(&self) -> u32 {
        self.xp_to_next
    }

    pub fn is_choosing_upgrade(&self) -> bool {
        self.choosing_upgrade
    }

    pub fn is_invincible(&self) -> bool {
        self.invincible
    }

    pub fn upgrade_options(&self) -> &[UpgradeType] {
        &self.upgrade_options
    }

    pub fn pending_move(&self) -> PendingMove {
        self.pending
    }

    /// Record a movement input.
    ///
    /// Components are clamped to `[-1, 1]`. Dropped (returns false) while
    /// choosing an upgrade, when dead, or when `seq` is older than the last
    /// accepted input.
    pub fn set_move(&mut self, mx: f64, my: f64, seq: u64) -> bool {
        if self.choosing_upgrade || self.dead || seq < self.pending.seq {
            return false;
        }
        self.pending = PendingMove {
            x: clamp_axis(mx),
            y: clamp_axis(my),
            seq,
        };
        true
    }

    /// Current aim: movement direction when moving, else the last one
    pub fn aim_dir(&self) -> Vec2 {
        let p = self.pending;
        if p.x.abs() > movement::INPUT_EPSILON || p.y.abs() > movement::INPUT_EPSILON {
            p.as_vec().normalize()
        } else {
            self.last_dir
        }
    }

    /// Apply damage; returns true if this hit killed the player
    pub fn apply_damage(&mut self, dmg: i32) -> bool {
        if self.dead {
            return false;
        }
        self.hp -= dmg;
        if self.hp <= 0 {
            self.hp = 0;
            self.dead = true;
            return true;
        }
        false
    }

    pub fn award_score(&mut self, points: u32) {
        if !self.dead {
            self.score += points;
        }
    }

    pub fn award_coins(&mut self, coins: u32) {
        if !self.dead {
            self.coins_earned += coins;
        }
    }

    /// Accumulate XP, levelling up as many times as it covers.
    ///
    /// Returns the number of levels gained. Leaves `0 <= xp < xp_to_next`.
    pub fn add_xp<R: Rng + ?Sized>(&mut self, amount: u32, rng: &mut R) -> u32 {
        if self.dead || amount == 0 {
            return 0;
        }
        self.xp += amount;
        let mut gained = 0;
        while self.xp >= self.xp_to_next {
            self.xp -= self.xp_to_next;
            self.level_up(rng);
            gained += 1;
        }
        gained
    }

    /// Enter the upgrade-choice pause: frozen, invincible, three fresh options
    fn level_up<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.level += 1;
        self.xp_to_next = xp_to_next(self.level);
        self.choosing_upgrade = true;
        self.invincible = true;
        self.pending.x = 0.0;
        self.pending.y = 0.0;
        self.upgrade_options = generate_options(rng);
        debug!(
            "Player {} reached level {} (xp {}/{})",
            self.id, self.level, self.xp, self.xp_to_next
        );
    }

    /// Install an upgrade and leave the pause.
    ///
    /// No-op (returns false) unless the player is choosing.
    pub fn apply_upgrade(&mut self, upgrade: UpgradeType) -> bool {
        if !self.choosing_upgrade {
            return false;
        }
        match upgrade {
            UpgradeType::DamageUp => self.damage_multiplier *= upgrades::DAMAGE_FACTOR,
            UpgradeType::AtkspeedUp => self.move_speed_multiplier += upgrades::MOVE_SPEED_BONUS,
            UpgradeType::MaxHpUp => {
                self.max_hp += upgrades::MAX_HP_BONUS;
                self.hp = self.max_hp.min(self.hp + upgrades::MAX_HP_BONUS);
            }
            UpgradeType::WeaponCone => self.style = AttackStyle::Cone,
            UpgradeType::WeaponOrbit => self.style = AttackStyle::Orbit,
        }
        self.choosing_upgrade = false;
        self.invincible = false;
        self.upgrade_options.clear();
        debug!("Player {} applied upgrade {}", self.id, upgrade);
        true
    }
}

#[inline]
fn clamp_axis(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-1.0, 1.0)
    }
}

/// Enemy state
#[derive(Debug, Clone)]
pub struct Enemy {
    pub position: Vec2,
    /// Set by the AI step; never zeroed between ticks
    pub velocity: Vec2,
    pub active: bool,
    pub hp: i32,
    dead: bool,
    pub last_attack_at: i64,
    pub last_contact_at: i64,
    pub stats: Stats,
    pub kind: EnemyType,
    pub id: EnemyId,
}

impl Enemy {
    pub fn new(id: EnemyId, position: Vec2, stats: Stats, hp: i32, kind: EnemyType) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            active: false,
            hp,
            dead: false,
            last_attack_at: 0,
            last_contact_at: 0,
            stats,
            kind,
            id,
        }
    }

    pub fn radius(&self) -> f64 {
        enemy::RADIUS_PX
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn is_alive(&self) -> bool {
        !self.dead
    }

    /// Point velocity at `target` with the enemy's steering speed
    pub fn seek(&mut self, target: Vec2) {
        let dir = (target - self.position).normalize();
        let speed = (self.stats.move_speed as f64).max(movement::ENEMY_MIN_SPEED) * movement::ENEMY_SPEED_FACTOR;
        self.velocity = dir * speed;
    }

    /// Apply damage; returns true if this hit killed the enemy
    pub fn apply_damage(&mut self, dmg: i32) -> bool {
        if self.dead {
            return false;
        }
        self.hp -= dmg;
        if self.hp <= 0 {
            self.hp = 0;
            self.dead = true;
            return true;
        }
        false
    }
}
