//! Stat tuple and the formula layer
//!
//! Every derived combat number (attack cadence, damage, crit, reach) goes
//! through these functions so players and enemies scale identically.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Immutable six-stat tuple. Values are dimensionless scaling numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub health: i32,
    pub move_speed: i32,
    pub attack_speed: i32,
    pub damage_mult: i32,
    pub crit_chance: i32,
    pub range: i32,
}

impl Stats {
    pub const fn new(
        health: i32,
        move_speed: i32,
        attack_speed: i32,
        damage_mult: i32,
        crit_chance: i32,
        range: i32,
    ) -> Self {
        Self {
            health,
            move_speed,
            attack_speed,
            damage_mult,
            crit_chance,
            range,
        }
    }
}

/// Shortest and longest attack interval any entity can have
pub const MIN_INTERVAL_MS: i64 = 80;
pub const MAX_INTERVAL_MS: i64 = 400;

#[inline]
pub fn clamp(v: i64, lo: i64, hi: i64) -> i64 {
    v.max(lo).min(hi)
}

/// Milliseconds between attacks for a weapon with `base_aps` attacks/second
pub fn interval_ms(stats: &Stats, base_aps: f64) -> i64 {
    let aps = base_aps * (0.5 + 0.015 * stats.attack_speed as f64);
    let raw = (1000.0 / aps.max(0.0001)).round() as i64;
    clamp(raw, MIN_INTERVAL_MS, MAX_INTERVAL_MS)
}

/// Unrounded damage for a weapon with `base` damage
#[inline]
pub fn damage(stats: &Stats, base: f64) -> f64 {
    base * (0.6 + 0.02 * stats.damage_mult as f64)
}

/// Roll a critical hit with probability `critChance / 100`
pub fn crit<R: Rng + ?Sized>(stats: &Stats, rng: &mut R) -> bool {
    rng.gen::<f64>() < stats.crit_chance as f64 / 100.0
}

/// Multiplier applied to every reach (radius, cone length, orbit radius)
#[inline]
pub fn range_factor(stats: &Stats) -> f64 {
    1.0 + 0.03 * stats.range as f64
}

/// Rounded hit damage, boosted by the crit multiplier on a successful roll
pub fn roll_hit_damage<R: Rng + ?Sized>(stats: &Stats, base: f64, rng: &mut R) -> i32 {
    let dmg = damage(stats, base).round();
    if crit(stats, rng) {
        (dmg * crate::game::constants::weapons::CRIT_MULTIPLIER).round() as i32
    } else {
        dmg as i32
    }
}
