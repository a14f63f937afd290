use rayon::prelude::*;

use crate::game::constants::{arena_bounds, movement};
use crate::game::state::{Enemy, Player, Players};
use crate::util::vec2::Vec2;

/// Player speed before the hard cap
#[inline]
pub fn player_speed(player: &Player) -> f64 {
    let base = movement::PLAYER_BASE_SPEED + movement::PLAYER_SPEED_PER_STAT * player.stats.move_speed as f64;
    (base * player.move_speed_multiplier).min(movement::MAX_SPEED)
}

/// Integrate players from their pending input.
/// Velocity is recomputed every tick; there is no momentum. Dead players stay put.
/// A moving player's facing follows its velocity.
pub fn integrate_players(players: &mut Players, dt: f64) {
    let (min, max) = arena_bounds();

    for player in players.values_mut() {
        if player.is_dead() {
            player.velocity = Vec2::ZERO;
            continue;
        }

        let dir = player.pending_move().as_vec().normalize();
        player.velocity = dir * player_speed(player);
        if player.velocity.length_sq() > 0.0 {
            player.last_dir = player.velocity.normalize();
        }
        player.position += player.velocity * dt;
        player.position = player.position.clamp_to_box(min, max);
    }
}

/// Integrate enemies with the velocity the AI step left on them.
/// Uses rayon; enemies never interact during integration.
pub fn integrate_enemies(enemies: &mut [Enemy], dt: f64) {
    let (min, max) = arena_bounds();

    enemies.par_iter_mut().for_each(|enemy| {
        if enemy.is_dead() {
            return;
        }

        // Clamp velocity to maximum
        enemy.velocity = enemy.velocity.clamp_length(movement::MAX_SPEED);

        enemy.position += enemy.velocity * dt;
        enemy.position = enemy.position.clamp_to_box(min, max);
    });
}
