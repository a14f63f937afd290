//! JSON message shapes exchanged with the transport collaborator
//!
//! Inbound messages are decoded here; outbound payloads are `GameEvent`s,
//! tagged by their `event` field.

use serde::{Deserialize, Serialize};

use crate::game::match_result::ParticipantResult;
use crate::game::state::{MatchId, PlayerId};
use crate::game::systems::combat::{DamageEvent, DeathEvent};
use crate::game::systems::snapshot::{EntityView, PlayerSnapshot, WorldEntity, WorldView};
use crate::game::upgrades::UpgradeType;

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Movement input
    #[serde(rename = "input")]
    Input(InputMsg),
    /// Level-up choice
    #[serde(rename = "upgrade.pick")]
    UpgradePick(UpgradePick),
}

/// Movement input; axes are clamped to [-1, 1] when applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMsg {
    pub match_id: MatchId,
    pub account_id: PlayerId,
    pub move_x: f64,
    pub move_y: f64,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradePick {
    pub player_id: PlayerId,
    pub selected_upgrade: String,
}

impl UpgradePick {
    /// Selected upgrade; unknown names become `DAMAGE_UP`
    pub fn upgrade(&self) -> UpgradeType {
        UpgradeType::from_name_lenient(&self.selected_upgrade)
    }
}

/// Messages from server to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum GameEvent {
    #[serde(rename = "DAMAGE")]
    Damage { damages: Vec<DamageEvent> },
    #[serde(rename = "DEATH")]
    Death { deaths: Vec<DeathEvent> },
    /// Merged match view, sent every tick
    #[serde(rename = "worldSnapshot")]
    WorldSnapshot {
        players: Vec<WorldEntity>,
        enemies: Vec<WorldEntity>,
        world_level: u32,
    },
    /// One player's own view
    #[serde(rename = "playerSnapshot")]
    PlayerSnapshot {
        account_id: PlayerId,
        entities: Vec<EntityView>,
    },
    #[serde(rename = "xpUpdate")]
    XpUpdate {
        player_id: PlayerId,
        xp: u32,
        level: u32,
        xp_to_next: u32,
    },
    #[serde(rename = "upgradeOptions")]
    UpgradeOptions {
        player_id: PlayerId,
        level: u32,
        options: Vec<UpgradeType>,
    },
    #[serde(rename = "upgradeApplied")]
    UpgradeApplied {
        player_id: PlayerId,
        selected: UpgradeType,
    },
    #[serde(rename = "MATCH_ENDED")]
    MatchEnded {
        winner_id: PlayerId,
        results: Vec<ParticipantResult>,
    },
}

impl GameEvent {
    pub fn world_snapshot(view: WorldView, world_level: u32) -> Self {
        GameEvent::WorldSnapshot {
            players: view.players,
            enemies: view.enemies,
            world_level,
        }
    }

    pub fn player_snapshot(snapshot: PlayerSnapshot) -> Self {
        GameEvent::PlayerSnapshot {
            account_id: snapshot.account_id,
            entities: snapshot.entities,
        }
    }

    /// Wire tag of this event
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::Damage { .. } => "DAMAGE",
            GameEvent::Death { .. } => "DEATH",
            GameEvent::WorldSnapshot { .. } => "worldSnapshot",
            GameEvent::PlayerSnapshot { .. } => "playerSnapshot",
            GameEvent::XpUpdate { .. } => "xpUpdate",
            GameEvent::UpgradeOptions { .. } => "upgradeOptions",
            GameEvent::UpgradeApplied { .. } => "upgradeApplied",
            GameEvent::MatchEnded { .. } => "MATCH_ENDED",
        }
    }
}

/// Encode a message as JSON text
pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decode a JSON message
pub fn decode<T: for<'de> Deserialize<'de>>(data: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(data).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Decode error: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Enemy, EnemyType};
    use crate::game::systems::combat::TargetKind;
    use crate::game::systems::snapshot;
    use crate::util::vec2::Vec2;
    use serde_json::json;

    #[test]
    fn test_decode_input() {
        let msg: ClientMessage =
            decode(r#"{"type":"input","matchId":4,"accountId":9,"moveX":0.5,"moveY":-2.0,"seq":17}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Input(InputMsg {
                match_id: 4,
                account_id: 9,
                move_x: 0.5,
                move_y: -2.0,
                seq: 17,
            })
        );
    }

    #[test]
    fn test_decode_upgrade_pick_lenient() {
        let msg: ClientMessage = decode(r#"{"type":"upgrade.pick","playerId":9,"selectedUpgrade":"WEAPON_CONE"}"#).unwrap();
        let ClientMessage::UpgradePick(pick) = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(pick.upgrade(), UpgradeType::WeaponCone);

        let odd = UpgradePick {
            player_id: 9,
            selected_upgrade: "SUPER_LASER".into(),
        };
        assert_eq!(odd.upgrade(), UpgradeType::DamageUp);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode::<ClientMessage>("{\"type\":\"dance\"}"), Err(ProtocolError::Decode(_))));
        assert!(decode::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn test_encode_damage_event() {
        let event = GameEvent::Damage {
            damages: vec![DamageEvent {
                target_id: 1000,
                target_type: TargetKind::Enemy,
                damage: 7,
            }],
        };
        let value: serde_json::Value = serde_json::from_str(&encode(&event).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "DAMAGE", "damages": [{"targetId": 1000, "targetType": "enemy", "damage": 7}]})
        );
    }

    #[test]
    fn test_encode_xp_and_options() {
        let xp = serde_json::to_value(GameEvent::XpUpdate {
            player_id: 1,
            xp: 25,
            level: 1,
            xp_to_next: 150,
        })
        .unwrap();
        assert_eq!(xp, json!({"event": "xpUpdate", "playerId": 1, "xp": 25, "level": 1, "xpToNext": 150}));

        let opts = serde_json::to_value(GameEvent::UpgradeOptions {
            player_id: 1,
            level: 2,
            options: vec![UpgradeType::MaxHpUp, UpgradeType::WeaponOrbit, UpgradeType::MaxHpUp],
        })
        .unwrap();
        assert_eq!(opts["options"], json!(["MAX_HP_UP", "WEAPON_ORBIT", "MAX_HP_UP"]));
    }

    #[test]
    fn test_encode_world_snapshot_and_match_end() {
        let snap = serde_json::to_value(GameEvent::world_snapshot(WorldView::default(), 3)).unwrap();
        assert_eq!(snap, json!({"event": "worldSnapshot", "players": [], "enemies": [], "worldLevel": 3}));

        let ended = serde_json::to_value(GameEvent::MatchEnded {
            winner_id: -1,
            results: vec![],
        })
        .unwrap();
        assert_eq!(ended, json!({"event": "MATCH_ENDED", "winnerId": -1, "results": []}));
    }

    #[test]
    fn test_encode_world_snapshot_enemy_type() {
        let bumper = Enemy::new(1000, Vec2::new(10.0, 20.0), EnemyType::Bumper.base_stats(), 1, EnemyType::Bumper);
        let snapshot = PlayerSnapshot {
            account_id: 1,
            entities: vec![EntityView::enemy(&bumper)],
        };
        let event = GameEvent::world_snapshot(snapshot::aggregate(&[snapshot]), 1);

        let value: serde_json::Value = serde_json::from_str(&encode(&event).unwrap()).unwrap();
        assert_eq!(value["event"], "worldSnapshot");
        assert_eq!(value["enemies"][0]["type"], "BUMPER");
        assert_eq!(value["enemies"][0]["enemyType"], "BUMPER");
        assert_eq!(value["enemies"][0]["x"], 10.0);
    }

    #[test]
    fn test_event_names_match_tags() {
        let events = [
            GameEvent::Death { deaths: vec![] },
            GameEvent::UpgradeApplied {
                player_id: 2,
                selected: UpgradeType::AtkspeedUp,
            },
        ];
        for e in events {
            let value = serde_json::to_value(&e).unwrap();
            assert_eq!(value["event"], e.name());
        }
    }
}
