//! Inbound client messages
//!
//! Decoded messages become tasks on the sender's action queue. Senders that
//! are not in a live match are turned away before a queue is created. The
//! task repeats the lookup when it runs, so a match that ended in between is
//! just a miss.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::net::protocol::{decode, ClientMessage, GameEvent, InputMsg, ProtocolError, UpgradePick};
use crate::net::sink::MessageSink;
use crate::server::action_queue::{ActionError, ActionQueues, QueueError};
use crate::server::registry::RuntimeRegistry;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Rejected(#[from] ActionError),
}

pub struct Handlers {
    registry: Arc<RuntimeRegistry>,
    queues: Arc<ActionQueues>,
    sink: Arc<dyn MessageSink>,
}

impl Handlers {
    pub fn new(registry: Arc<RuntimeRegistry>, queues: Arc<ActionQueues>, sink: Arc<dyn MessageSink>) -> Self {
        Self { registry, queues, sink }
    }

    /// Decode a JSON frame from the transport and queue it
    pub fn handle_text(&self, text: &str) -> Result<(), HandlerError> {
        let message: ClientMessage = decode(text).map_err(|e| {
            warn!("Dropping malformed client message: {}", e);
            e
        })?;
        self.handle(message)
    }

    pub fn handle(&self, message: ClientMessage) -> Result<(), HandlerError> {
        match message {
            ClientMessage::Input(input) => self.submit_input(input)?,
            ClientMessage::UpgradePick(pick) => self.submit_upgrade_pick(pick)?,
        }
        Ok(())
    }

    /// Queue a movement input. Stale and frozen inputs are dropped when it runs.
    pub fn submit_input(&self, input: InputMsg) -> Result<(), HandlerError> {
        let runtime = self
            .registry
            .get(input.match_id)
            .ok_or(ActionError::UnknownMatch(input.match_id))?;
        if !runtime.lock().contains_player(input.account_id) {
            debug!("Input from player {} not in match {}", input.account_id, input.match_id);
            return Err(ActionError::UnknownPlayer(input.account_id).into());
        }

        let registry = self.registry.clone();
        self.queues.submit(input.account_id, move || {
            let runtime = registry
                .get(input.match_id)
                .ok_or(ActionError::UnknownMatch(input.match_id))?;
            let accepted = runtime
                .lock()
                .set_move(input.account_id, input.move_x, input.move_y, input.seq);
            if !accepted {
                debug!("Input seq {} from player {} dropped", input.seq, input.account_id);
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Queue a level-up pick and confirm it to the match once applied
    pub fn submit_upgrade_pick(&self, pick: UpgradePick) -> Result<(), HandlerError> {
        if self.registry.find_by_player(pick.player_id).is_none() {
            return Err(ActionError::UnknownPlayer(pick.player_id).into());
        }

        let registry = self.registry.clone();
        let sink = self.sink.clone();
        self.queues.submit(pick.player_id, move || {
            let runtime = registry
                .find_by_player(pick.player_id)
                .ok_or(ActionError::UnknownPlayer(pick.player_id))?;
            let selected = pick.upgrade();

            let match_id = {
                let mut runtime = runtime.lock();
                if !runtime.apply_upgrade(pick.player_id, selected) {
                    return Err(ActionError::NotChoosing(pick.player_id));
                }
                runtime.match_id()
            };

            debug!("Player {} picked {} in match {}", pick.player_id, selected.name(), match_id);
            sink.broadcast(
                match_id,
                GameEvent::UpgradeApplied {
                    player_id: pick.player_id,
                    selected,
                },
            );
            Ok(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FogConfig;
    use crate::game::runtime::MatchRuntime;
    use crate::game::state::PlayerSpec;
    use crate::game::stats::Stats;
    use crate::game::upgrades::UpgradeType;
    use crate::net::sink::{BufferedSink, Destination};
    use crate::util::vec2::Vec2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Fixture {
        registry: Arc<RuntimeRegistry>,
        queues: Arc<ActionQueues>,
        sink: Arc<BufferedSink>,
        handlers: Handlers,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(RuntimeRegistry::new());
        let queues = Arc::new(ActionQueues::new());
        let sink = Arc::new(BufferedSink::new());
        let mut rt = MatchRuntime::with_seed(4, FogConfig::default(), 4);
        rt.add_player(&PlayerSpec::new(9, Vec2::new(100.0, 100.0), Stats::new(100, 50, 30, 20, 5, 10)));
        rt.start_at(1_000);
        registry.insert(rt);
        let handlers = Handlers::new(registry.clone(), queues.clone(), sink.clone());
        Fixture {
            registry,
            queues,
            sink,
            handlers,
        }
    }

    #[test]
    fn test_input_reaches_runtime() {
        let f = fixture();
        f.handlers
            .handle_text(r#"{"type":"input","matchId":4,"accountId":9,"moveX":3.0,"moveY":-0.5,"seq":2}"#)
            .unwrap();
        f.queues.flush(9).unwrap();

        let rt = f.registry.get(4).unwrap();
        let pending = rt.lock().player(9).unwrap().pending_move();
        assert_eq!((pending.x, pending.y, pending.seq), (1.0, -0.5, 2));
    }

    fn input(match_id: i64, account_id: i64) -> InputMsg {
        InputMsg {
            match_id,
            account_id,
            move_x: 1.0,
            move_y: 0.0,
            seq: 1,
        }
    }

    #[test]
    fn test_input_for_unknown_match_is_rejected() {
        let f = fixture();
        assert_eq!(
            f.handlers.submit_input(input(99, 9)),
            Err(HandlerError::Rejected(ActionError::UnknownMatch(99)))
        );
        assert_eq!(
            f.handlers.submit_input(input(4, 12)),
            Err(HandlerError::Rejected(ActionError::UnknownPlayer(12)))
        );
        assert!(f.queues.is_empty());
        assert!(f.sink.is_empty());
    }

    #[test]
    fn test_input_after_match_removed_is_a_miss() {
        let f = fixture();
        let gate = Arc::new(parking_lot::Mutex::new(()));
        let held = gate.lock();
        let blocker = gate.clone();
        f.queues
            .submit(9, move || {
                drop(blocker.lock());
                Ok(())
            })
            .unwrap();

        f.handlers.submit_input(input(4, 9)).unwrap();
        f.registry.end(4);
        drop(held);

        f.queues.flush(9).unwrap();
        assert_eq!(f.queues.failed(), 1);
    }

    #[test]
    fn test_pick_from_unknown_player_is_rejected() {
        let f = fixture();
        let pick = UpgradePick {
            player_id: 31,
            selected_upgrade: "MAX_HP_UP".into(),
        };
        assert_eq!(
            f.handlers.submit_upgrade_pick(pick),
            Err(HandlerError::Rejected(ActionError::UnknownPlayer(31)))
        );
        assert!(f.queues.is_empty());
    }

    #[test]
    fn test_malformed_text_is_rejected() {
        let f = fixture();
        assert!(matches!(f.handlers.handle_text("{oops"), Err(HandlerError::Protocol(_))));
        assert!(f.queues.is_empty());
    }

    #[test]
    fn test_upgrade_pick_applies_and_confirms() {
        let f = fixture();
        {
            let rt = f.registry.get(4).unwrap();
            let mut rng = StdRng::seed_from_u64(1);
            rt.lock().player_mut(9).unwrap().add_xp(150, &mut rng);
        }

        f.handlers
            .handle_text(r#"{"type":"upgrade.pick","playerId":9,"selectedUpgrade":"NOT_A_THING"}"#)
            .unwrap();
        f.queues.flush(9).unwrap();

        let rt = f.registry.get(4).unwrap();
        let p = rt.lock();
        let player = p.player(9).unwrap();
        assert!(!player.is_choosing_upgrade());
        assert!((player.damage_multiplier - 1.01).abs() < 1e-9);

        let sent = f.sink.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].match_id, 4);
        assert_eq!(sent[0].destination, Destination::Match);
        assert_eq!(
            sent[0].event,
            GameEvent::UpgradeApplied {
                player_id: 9,
                selected: UpgradeType::DamageUp
            }
        );
    }

    #[test]
    fn test_upgrade_pick_when_not_choosing_is_ignored() {
        let f = fixture();
        f.handlers
            .submit_upgrade_pick(UpgradePick {
                player_id: 9,
                selected_upgrade: "MAX_HP_UP".into(),
            })
            .unwrap();
        f.queues.flush(9).unwrap();

        assert!(f.sink.is_empty());
        assert_eq!(f.queues.failed(), 1);
        let rt = f.registry.get(4).unwrap();
        assert_eq!(rt.lock().player(9).unwrap().max_hp, 100);
    }
}
