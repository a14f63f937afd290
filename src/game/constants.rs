/// Simulation timing constants
pub mod sim {
    /// Default scheduler tick rate in Hz
    pub const TICK_RATE: u32 = 20;
    /// Fixed simulation step in seconds (independent of scheduler jitter)
    pub const DT: f64 = 1.0 / 20.0;
    /// Tick duration in milliseconds at the default rate
    pub const TICK_DURATION_MS: u64 = 1000 / TICK_RATE as u64;
}

/// Arena geometry
pub mod arena {
    /// Arena width in pixels
    pub const WIDTH: f64 = 2000.0;
    /// Arena height in pixels
    pub const HEIGHT: f64 = 2000.0;
    /// Size of one fog-of-war / range tile in pixels
    pub const TILE_PX: f64 = 24.0;
}

/// Movement constants shared by players and enemies
pub mod movement {
    /// Hard cap on any entity's speed (px/s)
    pub const MAX_SPEED: f64 = 190.0;
    /// Player base speed before the moveSpeed stat (px/s)
    pub const PLAYER_BASE_SPEED: f64 = 60.0;
    /// Player speed gained per moveSpeed point (px/s)
    pub const PLAYER_SPEED_PER_STAT: f64 = 3.0;
    /// Minimum enemy moveSpeed used for steering
    pub const ENEMY_MIN_SPEED: f64 = 20.0;
    /// Fraction of moveSpeed enemies actually steer with
    pub const ENEMY_SPEED_FACTOR: f64 = 0.8;
    /// Input components below this magnitude count as "not moving"
    pub const INPUT_EPSILON: f64 = 1e-4;
}

/// Player entity constants
pub mod player {
    /// Hitbox radius in pixels
    pub const RADIUS_PX: f64 = 12.0;
    /// Base XP needed to level up (xpToNext = BASE + PER_LEVEL * level)
    pub const XP_BASE: u32 = 100;
    /// Additional XP needed per level
    pub const XP_PER_LEVEL: u32 = 50;
    /// Number of upgrade options offered on level-up
    pub const UPGRADE_CHOICES: usize = 3;
}

/// Player weapon tuning
pub mod weapons {
    /// Damage multiplier applied on a critical roll
    pub const CRIT_MULTIPLIER: f64 = 1.5;

    pub const AOE_BASE_APS: f64 = 1.2;
    pub const AOE_RADIUS_TILES: f64 = 2.0;
    pub const AOE_BASE_DAMAGE: f64 = 7.0;

    pub const CONE_BASE_APS: f64 = 1.6;
    pub const CONE_LENGTH_TILES: f64 = 2.5;
    pub const CONE_ARC_DEG: f64 = 70.0;
    pub const CONE_BASE_DAMAGE: f64 = 12.0;

    /// Orbit radius around the player in tiles
    pub const ORBIT_RADIUS_TILES: f64 = 1.5;
    pub const ORBIT_BASE_DAMAGE: f64 = 8.0;
    /// Base orb angular speed in radians per second
    pub const ORBIT_ROTATION_SPEED: f64 = 3.0;
    /// Orb hitbox radius in pixels
    pub const ORBIT_ORB_RADIUS_PX: f64 = 8.0;
    /// Minimum time between orb hits on the same enemy
    pub const ORBIT_HIT_COOLDOWN_MS: i64 = 300;
}

/// Enemy tuning
pub mod enemy {
    use crate::game::stats::Stats;

    /// Enemy ids start here and increase by one per spawn
    pub const FIRST_ID: i64 = 1000;
    /// Hitbox radius in pixels
    pub const RADIUS_PX: f64 = 12.0;
    /// Extra distance beyond the light radius at which enemies may still attack
    pub const FAIRNESS_MARGIN_PX: f64 = 8.0;

    pub const BUMPER_BASE: Stats = Stats::new(1, 30, 10, 3, 2, 5);
    pub const SWIPER_BASE: Stats = Stats::new(1, 28, 15, 5, 3, 7);

    /// Bumper contact cadence: max(MIN, BASE - PER_STAT * attackSpeed) ms
    pub const BUMPER_CONTACT_BASE_MS: i64 = 600;
    pub const BUMPER_CONTACT_PER_STAT_MS: i64 = 5;
    pub const BUMPER_CONTACT_MIN_MS: i64 = 200;
    pub const BUMPER_BASE_DAMAGE: f64 = 6.0;

    pub const SWIPER_BASE_APS: f64 = 1.2;
    pub const SWIPER_LENGTH_TILES: f64 = 2.0;
    pub const SWIPER_ARC_DEG: f64 = 60.0;
    pub const SWIPER_BASE_DAMAGE: f64 = 8.0;
}

/// World-level / wave progression
pub mod waves {
    /// Enemies in the first wave
    pub const BASE_COUNT: u32 = 20;
    /// Additional enemies per world level
    pub const COUNT_PER_LEVEL: u32 = 10;
    /// Hard cap on enemies per wave
    pub const SPAWN_CAP: u32 = 250;
    /// Enemies never spawn closer than this to a player (best effort)
    pub const SAFE_PLAYER_RADIUS_PX: f64 = 100.0;
    /// Attempts to find a safe spawn before accepting any point
    pub const MAX_SPAWN_ATTEMPTS: u32 = 10;

    /// Post-cap per-level stat growth
    pub const HP_SCALE_PER_LEVEL: f64 = 0.10;
    pub const DAMAGE_SCALE_PER_LEVEL: f64 = 0.08;
    pub const SPEED_SCALE_PER_LEVEL: f64 = 0.05;
}

/// Kill rewards
pub mod rewards {
    pub const BUMPER_SCORE: u32 = 20;
    pub const SWIPER_SCORE: u32 = 30;
    /// Probability that a kill drops coins
    pub const COIN_DROP_CHANCE: f64 = 0.4;
    pub const BUMPER_COINS: u32 = 2;
    pub const SWIPER_COINS: u32 = 5;
    /// XP per kill regardless of enemy type
    pub const KILL_XP: u32 = 25;
}

/// Level-up upgrade effects
pub mod upgrades {
    /// DAMAGE_UP multiplies damageMultiplier by this
    pub const DAMAGE_FACTOR: f64 = 1.01;
    /// ATKSPEED_UP adds this to moveSpeedMultiplier
    pub const MOVE_SPEED_BONUS: f64 = 0.1;
    /// MAX_HP_UP adds this to maxHp and heals the same amount
    pub const MAX_HP_BONUS: i32 = 10;
}

/// Fog-of-war defaults (tiles)
pub mod fog {
    pub const LIGHT: u32 = 10;
    pub const WAKE: u32 = 12;
    pub const SLEEP: u32 = 14;
}

/// Convert a tile count into pixels
#[inline]
pub fn tiles_to_px(tiles: u32) -> f64 {
    tiles as f64 * arena::TILE_PX
}

/// Arena bounds as (min, max) corners, inclusive
#[inline]
pub fn arena_bounds() -> (crate::util::vec2::Vec2, crate::util::vec2::Vec2) {
    use crate::util::vec2::Vec2;
    (Vec2::ZERO, Vec2::new(arena::WIDTH - 1.0, arena::HEIGHT - 1.0))
}
