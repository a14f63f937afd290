//! Enemy AI: fog-of-war gating and the per-type attack step

use rand::Rng;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::game::constants::{arena, enemy as tuning};
use crate::game::state::{Enemy, EnemyType, Player, Players};
use crate::game::stats::{interval_ms, range_factor, roll_hit_damage};
use crate::game::systems::attack::cone_half_angle;
use crate::game::systems::Hit;
use crate::util::geometry::{circles_overlap, cone_contains, direction_or};
use crate::util::vec2::Vec2;

/// Fog radii converted to pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogRadii {
    pub light_px: f64,
    pub wake_px: f64,
    pub sleep_px: f64,
}

/// Wake enemies near a living player, put far ones to sleep.
///
/// Wake and sleep use different radii so enemies at the edge do not flicker.
/// A sleeping enemy stops moving.
pub fn gate_activity(enemies: &mut [Enemy], players: &Players, fog: &FogRadii) {
    let positions: SmallVec<[Vec2; 4]> = players.values().filter(|p| p.is_alive()).map(|p| p.position).collect();

    enemies.par_iter_mut().for_each(|enemy| {
        if enemy.is_dead() {
            return;
        }
        let nearest = positions
            .iter()
            .map(|p| enemy.position.distance_to(*p))
            .fold(f64::MAX, f64::min);

        if !enemy.active && nearest <= fog.wake_px {
            enemy.active = true;
        } else if enemy.active && nearest >= fog.sleep_px {
            enemy.active = false;
            enemy.velocity = Vec2::ZERO;
        }
    });
}

fn nearest_living<'a>(players: &'a Players, pos: Vec2) -> Option<&'a Player> {
    players
        .values()
        .filter(|p| p.is_alive())
        .min_by(|a, b| pos.distance_sq_to(a.position).total_cmp(&pos.distance_sq_to(b.position)))
}

/// Bumper contact cadence in ms
#[inline]
pub fn contact_interval_ms(enemy: &Enemy) -> i64 {
    (tuning::BUMPER_CONTACT_BASE_MS - tuning::BUMPER_CONTACT_PER_STAT_MS * enemy.stats.attack_speed as i64)
        .max(tuning::BUMPER_CONTACT_MIN_MS)
}

/// Steer active enemies toward the nearest living player and collect their hits
pub fn step<R: Rng + ?Sized>(
    enemies: &mut [Enemy],
    players: &Players,
    fog: &FogRadii,
    now: i64,
    rng: &mut R,
) -> Vec<Hit> {
    let mut hits = Vec::new();

    for enemy in enemies.iter_mut() {
        if !enemy.active || enemy.is_dead() {
            continue;
        }
        let Some(target) = nearest_living(players, enemy.position) else {
            continue;
        };

        enemy.seek(target.position);

        // Never strike from outside the target's light
        if enemy.position.distance_to(target.position) > fog.light_px + tuning::FAIRNESS_MARGIN_PX {
            continue;
        }

        match enemy.kind {
            EnemyType::Bumper => {
                if now - enemy.last_contact_at >= contact_interval_ms(enemy)
                    && circles_overlap(enemy.position, enemy.radius(), target.position, target.radius())
                {
                    let dmg = roll_hit_damage(&enemy.stats, tuning::BUMPER_BASE_DAMAGE, rng);
                    hits.push(Hit::new(enemy.id, target.id, dmg));
                    enemy.last_contact_at = now;
                }
            }
            EnemyType::Swiper => {
                if now - enemy.last_attack_at < interval_ms(&enemy.stats, tuning::SWIPER_BASE_APS) {
                    continue;
                }
                enemy.last_attack_at = now;

                let aim = direction_or(enemy.position, target.position, Vec2::RIGHT);
                let length = tuning::SWIPER_LENGTH_TILES * arena::TILE_PX * range_factor(&enemy.stats);
                let half_angle = cone_half_angle(tuning::SWIPER_ARC_DEG, enemy.stats.range);

                if cone_contains(enemy.position, aim, target.position, length, half_angle) {
                    let dmg = roll_hit_damage(&enemy.stats, tuning::SWIPER_BASE_DAMAGE, rng);
                    hits.push(Hit::new(enemy.id, target.id, dmg));
                }
            }
        }
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::tiles_to_px;
    use crate::game::state::PlayerSpec;
    use crate::game::stats::Stats;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const T0: i64 = 1_000_000;

    fn fog() -> FogRadii {
        FogRadii {
            light_px: tiles_to_px(10),
            wake_px: tiles_to_px(12),
            sleep_px: tiles_to_px(14),
        }
    }

    fn players_at(positions: &[(i64, Vec2)]) -> Players {
        positions
            .iter()
            .map(|&(id, pos)| (id, Player::new(&PlayerSpec::new(id, pos, Stats::new(100, 50, 30, 20, 5, 10)))))
            .collect()
    }

    fn enemy(kind: EnemyType, pos: Vec2) -> Enemy {
        let mut stats = kind.base_stats();
        stats.crit_chance = 0;
        Enemy::new(1000, pos, stats, 5, kind)
    }

    #[test]
    fn test_gate_wake_and_sleep_hysteresis() {
        let players = players_at(&[(1, Vec2::new(0.0, 0.0))]);
        // wake 288, sleep 336
        let mut enemies = vec![enemy(EnemyType::Bumper, Vec2::new(300.0, 0.0))];

        gate_activity(&mut enemies, &players, &fog());
        assert!(!enemies[0].active);

        enemies[0].position = Vec2::new(288.0, 0.0);
        gate_activity(&mut enemies, &players, &fog());
        assert!(enemies[0].active);

        // Between wake and sleep: stays awake
        enemies[0].position = Vec2::new(320.0, 0.0);
        gate_activity(&mut enemies, &players, &fog());
        assert!(enemies[0].active);

        enemies[0].position = Vec2::new(336.0, 0.0);
        enemies[0].velocity = Vec2::new(-10.0, 0.0);
        gate_activity(&mut enemies, &players, &fog());
        assert!(!enemies[0].active);
        assert_eq!(enemies[0].velocity, Vec2::ZERO);
    }

    #[test]
    fn test_gate_ignores_dead_players() {
        let mut players = players_at(&[(1, Vec2::new(0.0, 0.0)), (2, Vec2::new(1500.0, 1500.0))]);
        players.get_mut(&1).unwrap().apply_damage(1000);
        let mut enemies = vec![enemy(EnemyType::Bumper, Vec2::new(10.0, 0.0))];

        gate_activity(&mut enemies, &players, &fog());
        assert!(!enemies[0].active);
    }

    #[test]
    fn test_inactive_enemy_does_not_act() {
        let mut rng = StdRng::seed_from_u64(1);
        let players = players_at(&[(1, Vec2::new(100.0, 100.0))]);
        let mut enemies = vec![enemy(EnemyType::Bumper, Vec2::new(100.0, 100.0))];

        let hits = step(&mut enemies, &players, &fog(), T0, &mut rng);
        assert!(hits.is_empty());
        assert_eq!(enemies[0].velocity, Vec2::ZERO);
    }

    #[test]
    fn test_step_seeks_nearest_player() {
        let mut rng = StdRng::seed_from_u64(1);
        let players = players_at(&[(1, Vec2::new(0.0, 500.0)), (2, Vec2::new(500.0, 700.0))]);
        let mut enemies = vec![enemy(EnemyType::Bumper, Vec2::new(500.0, 500.0))];
        enemies[0].active = true;

        step(&mut enemies, &players, &fog(), T0, &mut rng);
        let v = enemies[0].velocity;
        assert!(v.x.abs() < 1e-9);
        assert!(v.y > 0.0);
        // max(20, 30) * 0.8
        assert!((v.length() - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_bumper_contact_cadence() {
        let mut rng = StdRng::seed_from_u64(1);
        let players = players_at(&[(1, Vec2::new(100.0, 100.0))]);
        let mut enemies = vec![enemy(EnemyType::Bumper, Vec2::new(110.0, 100.0))];
        enemies[0].active = true;
        // 600 - 5 * 10 = 550
        assert_eq!(contact_interval_ms(&enemies[0]), 550);

        let hits = step(&mut enemies, &players, &fog(), T0, &mut rng);
        assert_eq!(hits, vec![Hit::new(1000, 1, 4)]);

        assert!(step(&mut enemies, &players, &fog(), T0 + 549, &mut rng).is_empty());
        assert_eq!(step(&mut enemies, &players, &fog(), T0 + 550, &mut rng).len(), 1);
    }

    #[test]
    fn test_bumper_contact_floor() {
        let mut rng = StdRng::seed_from_u64(1);
        let players = players_at(&[(1, Vec2::new(100.0, 100.0))]);
        let mut enemies = vec![enemy(EnemyType::Bumper, Vec2::new(110.0, 100.0))];
        enemies[0].active = true;
        enemies[0].stats.attack_speed = 100;
        // 600 - 5 * 100 = 100, floored
        assert_eq!(contact_interval_ms(&enemies[0]), 200);

        assert_eq!(step(&mut enemies, &players, &fog(), T0, &mut rng).len(), 1);
        assert!(step(&mut enemies, &players, &fog(), T0 + 199, &mut rng).is_empty());
        assert_eq!(step(&mut enemies, &players, &fog(), T0 + 200, &mut rng).len(), 1);
    }

    #[test]
    fn test_bumper_needs_overlap() {
        let mut rng = StdRng::seed_from_u64(1);
        let players = players_at(&[(1, Vec2::new(100.0, 100.0))]);
        let mut enemies = vec![enemy(EnemyType::Bumper, Vec2::new(125.0, 100.0))];
        enemies[0].active = true;

        assert!(step(&mut enemies, &players, &fog(), T0, &mut rng).is_empty());
        assert_eq!(enemies[0].last_contact_at, 0);
    }

    #[test]
    fn test_swiper_cone_strike() {
        let mut rng = StdRng::seed_from_u64(1);
        let players = players_at(&[(1, Vec2::new(100.0, 100.0))]);
        // length = 2 * 24 * 1.21 = 58.08
        let mut enemies = vec![enemy(EnemyType::Swiper, Vec2::new(150.0, 100.0))];
        enemies[0].active = true;

        let hits = step(&mut enemies, &players, &fog(), T0, &mut rng);
        // round(8 * (0.6 + 0.1)) = round(5.6) = 6
        assert_eq!(hits, vec![Hit::new(1000, 1, 6)]);
        assert_eq!(enemies[0].last_attack_at, T0);

        // Interval gate
        assert!(step(&mut enemies, &players, &fog(), T0 + 50, &mut rng).is_empty());
    }

    #[test]
    fn test_swiper_on_top_of_player_aims_right() {
        let mut rng = StdRng::seed_from_u64(1);
        let here = Vec2::new(100.0, 100.0);
        let players = players_at(&[(1, here)]);
        let mut enemies = vec![enemy(EnemyType::Swiper, here)];
        enemies[0].active = true;

        assert_eq!(direction_or(here, here, Vec2::RIGHT), Vec2::RIGHT);
        let hits = step(&mut enemies, &players, &fog(), T0, &mut rng);

        // The swing happens along +x and the coincident target is not inside it
        assert!(hits.is_empty());
        assert_eq!(enemies[0].last_attack_at, T0);
        assert_eq!(enemies[0].velocity, Vec2::ZERO);
        assert!(enemies[0].position.x.is_finite() && enemies[0].position.y.is_finite());
    }

    #[test]
    fn test_swiper_out_of_reach_still_consumes_swing() {
        let mut rng = StdRng::seed_from_u64(1);
        let players = players_at(&[(1, Vec2::new(100.0, 100.0))]);
        let mut enemies = vec![enemy(EnemyType::Swiper, Vec2::new(200.0, 100.0))];
        enemies[0].active = true;

        assert!(step(&mut enemies, &players, &fog(), T0, &mut rng).is_empty());
        assert_eq!(enemies[0].last_attack_at, T0);
    }

    #[test]
    fn test_fairness_margin_blocks_attacks() {
        let mut rng = StdRng::seed_from_u64(1);
        let players = players_at(&[(1, Vec2::new(100.0, 100.0))]);
        // light 240 + 8
        let mut enemies = vec![enemy(EnemyType::Swiper, Vec2::new(349.0, 100.0))];
        enemies[0].active = true;

        step(&mut enemies, &players, &fog(), T0, &mut rng);
        assert_eq!(enemies[0].last_attack_at, 0);
        assert!(enemies[0].velocity.x < 0.0);
    }
}
