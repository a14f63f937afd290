//! Player weapons
//!
//! Each living player fires its current style against the enemy list and
//! produces `Hit`s; nothing is applied here. AOE and CONE share one attack
//! interval gate, ORBIT runs every tick and is bounded only by a per-enemy
//! cooldown.

use std::f64::consts::TAU;

use rand::Rng;

use crate::game::constants::{arena, weapons};
use crate::game::state::{AttackStyle, Enemy, Player, Players};
use crate::game::stats::{interval_ms, range_factor, roll_hit_damage};
use crate::game::systems::Hit;
use crate::util::geometry::{circles_overlap, cone_contains};
use crate::util::vec2::Vec2;

/// Half-angle of a cone whose full arc is `arc_deg`, widened by range
#[inline]
pub fn cone_half_angle(arc_deg: f64, range: i32) -> f64 {
    arc_deg.to_radians() * (0.9 + 0.005 * range as f64) * 0.5
}

/// Orb angular speed in radians per second
#[inline]
pub fn orbit_rotation_speed(player: &Player) -> f64 {
    weapons::ORBIT_ROTATION_SPEED * (0.8 + 0.01 * player.stats.attack_speed as f64)
}

/// Current orb center for an orbit player
pub fn orb_position(player: &Player) -> Vec2 {
    let radius = weapons::ORBIT_RADIUS_TILES * arena::TILE_PX * range_factor(&player.stats);
    player.position + Vec2::from_angle(player.orbit_angle) * radius
}

/// Resolve every living player's weapon for this tick
pub fn resolve_player_attacks<R: Rng + ?Sized>(
    players: &mut Players,
    enemies: &[Enemy],
    now: i64,
    dt: f64,
    rng: &mut R,
) -> Vec<Hit> {
    let mut hits = Vec::new();

    for player in players.values_mut() {
        if player.is_dead() {
            continue;
        }
        match player.style {
            AttackStyle::Aoe => aoe(player, enemies, now, rng, &mut hits),
            AttackStyle::Cone => cone(player, enemies, now, rng, &mut hits),
            AttackStyle::Orbit => orbit(player, enemies, now, dt, rng, &mut hits),
        }
    }

    hits
}

/// Interval gate shared by AOE and CONE; records the swing on success
fn ready(player: &mut Player, base_aps: f64, now: i64) -> bool {
    let interval = interval_ms(&player.stats, base_aps);
    if now - player.last_attack_at < interval {
        return false;
    }
    player.last_attack_at = now;
    true
}

fn aoe<R: Rng + ?Sized>(player: &mut Player, enemies: &[Enemy], now: i64, rng: &mut R, hits: &mut Vec<Hit>) {
    if !ready(player, weapons::AOE_BASE_APS, now) {
        return;
    }

    let radius = weapons::AOE_RADIUS_TILES * arena::TILE_PX * range_factor(&player.stats);
    let radius_sq = radius * radius;
    // One crit roll per swing
    let damage = roll_hit_damage(&player.stats, weapons::AOE_BASE_DAMAGE, rng);

    hits.extend(
        enemies
            .iter()
            .filter(|e| e.is_alive() && player.position.distance_sq_to(e.position) <= radius_sq)
            .map(|e| Hit::new(player.id, e.id, damage)),
    );
}

fn cone<R: Rng + ?Sized>(player: &mut Player, enemies: &[Enemy], now: i64, rng: &mut R, hits: &mut Vec<Hit>) {
    if !ready(player, weapons::CONE_BASE_APS, now) {
        return;
    }

    let aim = player.aim_dir();
    let length = weapons::CONE_LENGTH_TILES * arena::TILE_PX * range_factor(&player.stats);
    let half_angle = cone_half_angle(weapons::CONE_ARC_DEG, player.stats.range);
    let damage = roll_hit_damage(&player.stats, weapons::CONE_BASE_DAMAGE, rng);

    hits.extend(
        enemies
            .iter()
            .filter(|e| e.is_alive() && cone_contains(player.position, aim, e.position, length, half_angle))
            .map(|e| Hit::new(player.id, e.id, damage)),
    );
}

fn orbit<R: Rng + ?Sized>(
    player: &mut Player,
    enemies: &[Enemy],
    now: i64,
    dt: f64,
    rng: &mut R,
    hits: &mut Vec<Hit>,
) {
    let mut angle = player.orbit_angle + orbit_rotation_speed(player) * dt;
    if angle >= TAU {
        angle %= TAU;
    }
    player.orbit_angle = angle;

    let orb = orb_position(player);
    for enemy in enemies.iter().filter(|e| e.is_alive()) {
        if !circles_overlap(orb, weapons::ORBIT_ORB_RADIUS_PX, enemy.position, enemy.radius()) {
            continue;
        }
        let cooled = player
            .orbit_last_hit
            .get(&enemy.id)
            .map_or(true, |&last| now - last >= weapons::ORBIT_HIT_COOLDOWN_MS);
        if !cooled {
            continue;
        }

        // Crit rolls per orb contact
        let damage = roll_hit_damage(&player.stats, weapons::ORBIT_BASE_DAMAGE, rng);
        hits.push(Hit::new(player.id, enemy.id, damage));
        player.orbit_last_hit.insert(enemy.id, now);
    }
}
