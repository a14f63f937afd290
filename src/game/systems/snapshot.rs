//! Visibility-filtered world snapshots
//!
//! Every player sees all living players, and the living enemies inside its own
//! light radius. The broadcast path merges the per-player views into one world
//! view per match.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::state::{Enemy, EnemyType, Player, PlayerId, Players};
use crate::game::systems::combat::TargetKind;

/// One visible entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityView {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub id: i64,
    pub x: f64,
    pub y: f64,
    pub hp: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub enemy_type: Option<EnemyType>,
}

impl EntityView {
    pub fn player(p: &Player) -> Self {
        Self {
            kind: TargetKind::Player,
            id: p.id,
            x: p.position.x,
            y: p.position.y,
            hp: p.hp,
            enemy_type: None,
        }
    }

    pub fn enemy(e: &Enemy) -> Self {
        Self {
            kind: TargetKind::Enemy,
            id: e.id,
            x: e.position.x,
            y: e.position.y,
            hp: e.hp,
            enemy_type: Some(e.kind),
        }
    }
}

/// What one player can see this tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub account_id: PlayerId,
    pub entities: Vec<EntityView>,
}

/// Snapshot per player, in player id order
pub fn build(players: &Players, enemies: &[Enemy], light_px: f64) -> Vec<PlayerSnapshot> {
    let light_sq = light_px * light_px;
    let teammates: Vec<EntityView> = players
        .values()
        .filter(|p| p.is_alive())
        .map(EntityView::player)
        .collect();

    players
        .values()
        .map(|me| {
            let mut entities = teammates.clone();
            entities.extend(
                enemies
                    .iter()
                    .filter(|e| e.is_alive() && me.position.distance_sq_to(e.position) <= light_sq)
                    .map(EntityView::enemy),
            );
            PlayerSnapshot {
                account_id: me.id,
                entities,
            }
        })
        .collect()
}

/// Entity tag in the merged world view; enemies are tagged by archetype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorldEntityKind {
    #[serde(rename = "player")]
    Player,
    #[serde(rename = "BUMPER")]
    Bumper,
    #[serde(rename = "SWIPER")]
    Swiper,
}

impl From<EnemyType> for WorldEntityKind {
    fn from(kind: EnemyType) -> Self {
        match kind {
            EnemyType::Bumper => WorldEntityKind::Bumper,
            EnemyType::Swiper => WorldEntityKind::Swiper,
        }
    }
}

/// One entity of the merged world view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldEntity {
    #[serde(rename = "type")]
    pub kind: WorldEntityKind,
    pub id: i64,
    pub x: f64,
    pub y: f64,
    pub hp: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub enemy_type: Option<EnemyType>,
}

impl From<&EntityView> for WorldEntity {
    fn from(view: &EntityView) -> Self {
        let kind = match (view.kind, view.enemy_type) {
            (TargetKind::Enemy, Some(enemy_type)) => enemy_type.into(),
            // Untyped enemies never come out of `build`
            (TargetKind::Enemy, None) => WorldEntityKind::Bumper,
            (TargetKind::Player, _) => WorldEntityKind::Player,
        };
        Self {
            kind,
            id: view.id,
            x: view.x,
            y: view.y,
            hp: view.hp,
            enemy_type: view.enemy_type,
        }
    }
}

/// Merged view of a whole match: all players plus every enemy anyone can see
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldView {
    pub players: Vec<WorldEntity>,
    pub enemies: Vec<WorldEntity>,
}

pub fn aggregate(snapshots: &[PlayerSnapshot]) -> WorldView {
    let mut players: BTreeMap<i64, WorldEntity> = BTreeMap::new();
    let mut enemies: BTreeMap<i64, WorldEntity> = BTreeMap::new();

    for entity in snapshots.iter().flat_map(|s| s.entities.iter()) {
        let bucket = match entity.kind {
            TargetKind::Player => &mut players,
            TargetKind::Enemy => &mut enemies,
        };
        bucket.entry(entity.id).or_insert_with(|| WorldEntity::from(entity));
    }

    WorldView {
        players: players.into_values().collect(),
        enemies: enemies.into_values().collect(),
    }
}
