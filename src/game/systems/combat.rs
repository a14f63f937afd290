//! Combat resolver
//!
//! Applies the tick's hit lists to entities and turns them into damage and
//! death events. Kill rewards (score, coins, XP) and therefore level-ups
//! happen here.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::constants::rewards;
use crate::game::state::{Enemy, EnemyId, EnemyType, Players};
use crate::game::systems::Hit;

/// Which side of the fight an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Player,
    Enemy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageEvent {
    pub target_id: i64,
    pub target_type: TargetKind,
    pub damage: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathEvent {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: TargetKind,
}

/// Damage and death events of one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchEvents {
    pub damages: Vec<DamageEvent>,
    pub deaths: Vec<DeathEvent>,
}

impl MatchEvents {
    pub fn is_empty(&self) -> bool {
        self.damages.is_empty() && self.deaths.is_empty()
    }

    /// Number of enemies that died this tick
    pub fn enemy_deaths(&self) -> usize {
        self.deaths.iter().filter(|d| d.kind == TargetKind::Enemy).count()
    }
}

/// Score for killing an enemy of `kind`
pub fn kill_score(kind: EnemyType) -> u32 {
    match kind {
        EnemyType::Bumper => rewards::BUMPER_SCORE,
        EnemyType::Swiper => rewards::SWIPER_SCORE,
    }
}

/// Coins dropped by an enemy of `kind` when the drop roll succeeds
pub fn kill_coins(kind: EnemyType) -> u32 {
    match kind {
        EnemyType::Bumper => rewards::BUMPER_COINS,
        EnemyType::Swiper => rewards::SWIPER_COINS,
    }
}

/// Index of an enemy in an id-sorted slice
#[inline]
pub fn find_enemy(enemies: &[Enemy], id: EnemyId) -> Option<usize> {
    enemies.binary_search_by_key(&id, |e| e.id).ok()
}

/// Apply player→enemy hits, then enemy→player hits.
///
/// `enemies` must be sorted by id.
pub fn resolve<R: Rng + ?Sized>(
    players: &mut Players,
    enemies: &mut [Enemy],
    player_hits: &[Hit],
    enemy_hits: &[Hit],
    rng: &mut R,
) -> MatchEvents {
    let mut events = MatchEvents::default();

    for hit in player_hits {
        let Some(idx) = find_enemy(enemies, hit.target) else {
            continue;
        };
        let enemy = &mut enemies[idx];
        if enemy.is_dead() {
            continue;
        }

        let attacker = players.get_mut(&hit.attacker);
        let damage = match &attacker {
            Some(p) => (hit.damage as f64 * p.damage_multiplier).round() as i32,
            None => hit.damage,
        };

        let killed = enemy.apply_damage(damage);
        events.damages.push(DamageEvent {
            target_id: enemy.id,
            target_type: TargetKind::Enemy,
            damage,
        });
        if !killed {
            continue;
        }

        events.deaths.push(DeathEvent {
            id: enemy.id,
            kind: TargetKind::Enemy,
        });

        let Some(killer) = attacker else {
            continue;
        };
        if killer.is_dead() {
            continue;
        }
        killer.award_score(kill_score(enemy.kind));
        if rng.gen::<f64>() < rewards::COIN_DROP_CHANCE {
            killer.award_coins(kill_coins(enemy.kind));
        }
        // Paused players bank no XP
        if !killer.is_choosing_upgrade() {
            killer.add_xp(rewards::KILL_XP, rng);
        }
    }

    for hit in enemy_hits {
        let Some(player) = players.get_mut(&hit.target) else {
            continue;
        };
        if player.is_dead() || player.is_invincible() {
            continue;
        }

        let killed = player.apply_damage(hit.damage);
        events.damages.push(DamageEvent {
            target_id: player.id,
            target_type: TargetKind::Player,
            damage: hit.damage,
        });
        if killed {
            events.deaths.push(DeathEvent {
                id: player.id,
                kind: TargetKind::Player,
            });
        }
    }

    events
}
