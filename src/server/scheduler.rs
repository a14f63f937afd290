//! Fixed-rate tick scheduler
//!
//! Every frame the scheduler walks a snapshot of the registry, ticks each
//! started runtime and publishes what the tick produced. A tick that leaves
//! no living player triggers match end, which runs its side effects at most
//! once per match.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::game::runtime::{now_ms, MatchDelta, MatchRuntime};
use crate::game::state::{MatchId, PlayerId};
use crate::game::systems::snapshot;
use crate::metrics::{Metrics, Population};
use crate::net::protocol::GameEvent;
use crate::net::sink::MessageSink;
use crate::server::action_queue::ActionQueues;
use crate::server::progress::ProgressStore;
use crate::server::registry::RuntimeRegistry;

/// What one frame did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub ticked: usize,
    pub ended: usize,
    pub published: u64,
}

pub struct TickScheduler {
    registry: Arc<RuntimeRegistry>,
    sink: Arc<dyn MessageSink>,
    progress: Arc<dyn ProgressStore>,
    metrics: Arc<Metrics>,
    tick_rate_hz: u32,
    per_user_snapshots: bool,
    /// Released for the roster of every match that ends or is stopped
    queues: Option<Arc<ActionQueues>>,
    /// (match, player) -> level whose options were already sent
    upgrade_sent: Mutex<HashMap<(MatchId, PlayerId), u32>>,
}

impl TickScheduler {
    pub fn new(
        registry: Arc<RuntimeRegistry>,
        sink: Arc<dyn MessageSink>,
        progress: Arc<dyn ProgressStore>,
        metrics: Arc<Metrics>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            registry,
            sink,
            progress,
            metrics,
            tick_rate_hz: config.tick_rate_hz.max(1),
            per_user_snapshots: config.per_user_snapshots,
            queues: None,
            upgrade_sent: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_action_queues(mut self, queues: Arc<ActionQueues>) -> Self {
        self.queues = Some(queues);
        self
    }

    /// Run the scheduler on the tokio runtime until the task is aborted
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(&self) {
        let tick_duration = Duration::from_millis(1000 / u64::from(self.tick_rate_hz));
        let mut ticker = interval(tick_duration);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("Tick scheduler started at {} Hz", self.tick_rate_hz);

        let stats_every = u64::from(self.tick_rate_hz) * 30;
        let mut frames: u64 = 0;

        loop {
            ticker.tick().await;
            self.run_frame();
            frames += 1;

            if frames % stats_every == 0 {
                info!(
                    "Scheduler stats: {} matches, {} players alive, frame {}us (p99 {}us)",
                    self.metrics.active_matches.load(Ordering::Relaxed),
                    self.metrics.living_players.load(Ordering::Relaxed),
                    self.metrics.tick_time_us.load(Ordering::Relaxed),
                    self.metrics.tick_time_p99_us.load(Ordering::Relaxed),
                );
            }
        }
    }

    pub fn run_frame(&self) -> FrameReport {
        self.run_frame_at(now_ms())
    }

    /// Tick every started runtime once at wall-clock `now` (ms)
    pub fn run_frame_at(&self, now: i64) -> FrameReport {
        let frame_start = Instant::now();
        let mut report = FrameReport::default();
        let mut population = Population::default();

        for (match_id, runtime) in self.registry.active() {
            let mut rt = runtime.lock();
            // Removed or stopped since the snapshot was taken
            if !self.registry.contains(match_id) || !rt.is_started() {
                continue;
            }

            let level_before = rt.world_level();
            let delta = rt.tick_at(now);
            report.ticked += 1;
            if rt.world_level() > level_before {
                self.metrics
                    .waves_spawned
                    .fetch_add(u64::from(rt.world_level() - level_before), Ordering::Relaxed);
            }

            report.published += self.dispatch(&rt, &delta);

            if delta.should_end {
                if self.handle_match_end(&mut rt, now) {
                    report.ended += 1;
                    report.published += 1;
                }
                continue;
            }

            population.matches += 1;
            population.living_players += rt.living_players() as u64;
            population.living_enemies += rt.living_enemies() as u64;
            population.active_enemies += rt.active_enemies() as u64;
        }

        self.metrics.record_population(population);
        self.metrics
            .messages_published
            .fetch_add(report.published, Ordering::Relaxed);
        self.metrics.record_tick_time(frame_start.elapsed());
        report
    }

    /// Publish one tick's output; returns the number of events sent
    fn dispatch(&self, rt: &MatchRuntime, delta: &MatchDelta) -> u64 {
        let match_id = rt.match_id();
        let mut published = 0;
        let mut send = |event: GameEvent| {
            self.sink.broadcast(match_id, event);
            published += 1;
        };

        if !delta.events.damages.is_empty() {
            send(GameEvent::Damage {
                damages: delta.events.damages.clone(),
            });
        }
        if !delta.events.deaths.is_empty() {
            send(GameEvent::Death {
                deaths: delta.events.deaths.clone(),
            });
        }

        // Sent even when empty so clients keep a heartbeat
        send(GameEvent::world_snapshot(snapshot::aggregate(&delta.snapshots), rt.world_level()));

        let mut upgrade_sent = self.upgrade_sent.lock();
        for player in rt.players().values().filter(|p| p.is_alive()) {
            send(GameEvent::XpUpdate {
                player_id: player.id,
                xp: player.xp(),
                level: player.level(),
                xp_to_next: player.xp_to_next(),
            });

            let key = (match_id, player.id);
            if player.is_choosing_upgrade() && !player.upgrade_options().is_empty() {
                if upgrade_sent.get(&key) != Some(&player.level()) {
                    send(GameEvent::UpgradeOptions {
                        player_id: player.id,
                        level: player.level(),
                        options: player.upgrade_options().to_vec(),
                    });
                    upgrade_sent.insert(key, player.level());
                }
            } else {
                upgrade_sent.remove(&key);
            }
        }
        drop(upgrade_sent);

        if self.per_user_snapshots {
            for snap in &delta.snapshots {
                self.sink
                    .to_player(match_id, snap.account_id, GameEvent::player_snapshot(snap.clone()));
                published += 1;
            }
        }

        published
    }

    /// Run match-end side effects and publish `MATCH_ENDED`. Returns false
    /// when they already ran or the match was stopped.
    pub fn handle_match_end(&self, rt: &mut MatchRuntime, now: i64) -> bool {
        let match_id = rt.match_id();
        if !rt.begin_finalize() {
            debug!("Match {} already finalized", match_id);
            return false;
        }

        self.registry.end(match_id);
        self.forget_match(rt);

        let result = rt.result(now);
        let winner_id = result.winner_or_sentinel();

        // Clients hear about the end before anything is persisted
        self.sink.broadcast(
            match_id,
            GameEvent::MatchEnded {
                winner_id,
                results: result.results.clone(),
            },
        );

        if let Err(e) = self.progress.mark_ended(match_id, result.winner_id, now) {
            error!("Failed to mark match {} ended: {}", match_id, e);
        }
        if !result.results.is_empty() {
            if let Err(e) = self.progress.write_results(match_id, &result.results) {
                error!("Failed to persist results for match {}: {}", match_id, e);
            }
        }

        self.metrics
            .matches_ended
            .fetch_add(1, Ordering::Relaxed);
        info!(
            "Match {} ended after {}s. Winner: {}",
            match_id,
            result.duration_ms / 1000,
            winner_id
        );
        true
    }

    /// Stop a match without end side effects. Its prompt memo and the
    /// roster's action queues are dropped as well.
    pub fn stop_match(&self, match_id: MatchId) -> bool {
        let Some(runtime) = self.registry.get(match_id) else {
            return false;
        };
        let stopped = self.registry.stop(match_id);
        self.forget_match(&runtime.lock());
        stopped
    }

    fn forget_match(&self, rt: &MatchRuntime) {
        let match_id = rt.match_id();
        self.upgrade_sent.lock().retain(|(m, _), _| *m != match_id);
        if let Some(queues) = &self.queues {
            let roster: Vec<PlayerId> = rt.players().keys().copied().collect();
            queues.release(&roster);
        }
    }

    /// Number of (match, player) pairs with options already sent
    pub fn pending_upgrade_prompts(&self) -> usize {
        self.upgrade_sent.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FogConfig;
    use crate::game::state::PlayerSpec;
    use crate::game::stats::Stats;
    use crate::net::sink::{BufferedSink, Destination, Envelope};
    use crate::server::progress::{InMemoryProgressStore, ProgressError};
    use crate::game::match_result::ParticipantResult;
    use crate::game::upgrades::UpgradeType;
    use crate::util::vec2::Vec2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const T0: i64 = 1_700_000_000_000;

    struct Fixture {
        registry: Arc<RuntimeRegistry>,
        queues: Arc<ActionQueues>,
        sink: Arc<BufferedSink>,
        progress: Arc<InMemoryProgressStore>,
        metrics: Arc<Metrics>,
        scheduler: TickScheduler,
    }

    fn fixture_with(config: &ServerConfig) -> Fixture {
        let registry = Arc::new(RuntimeRegistry::new());
        let sink = Arc::new(BufferedSink::new());
        let progress = Arc::new(InMemoryProgressStore::new());
        let metrics = Arc::new(Metrics::new());
        let queues = Arc::new(ActionQueues::new());
        let scheduler = TickScheduler::new(registry.clone(), sink.clone(), progress.clone(), metrics.clone(), config)
            .with_action_queues(queues.clone());
        Fixture {
            registry,
            queues,
            sink,
            progress,
            metrics,
            scheduler,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(&ServerConfig::default())
    }

    fn spec(id: PlayerId, x: f64) -> PlayerSpec {
        PlayerSpec::new(id, Vec2::new(x, 1000.0), Stats::new(100, 50, 30, 20, 5, 10))
    }

    /// Started runtime with the given players, registered under `match_id`
    fn start_match(f: &Fixture, match_id: MatchId, players: &[PlayerId]) {
        let mut rt = MatchRuntime::with_seed(match_id, FogConfig::default(), 11);
        for (i, id) in players.iter().enumerate() {
            rt.add_player(&spec(*id, 1000.0 + 40.0 * i as f64));
        }
        rt.start_at(T0);
        f.registry.insert(rt);
    }

    fn events_named<'a>(sent: &'a [Envelope], name: &str) -> Vec<&'a Envelope> {
        sent.iter().filter(|e| e.event.name() == name).collect()
    }

    #[test]
    fn test_heartbeat_and_xp_updates() {
        let f = fixture();
        start_match(&f, 1, &[7, 8]);

        let report = f.scheduler.run_frame_at(T0 + 50);

        assert_eq!(report.ticked, 1);
        let sent = f.sink.drain();
        let snaps = events_named(&sent, "worldSnapshot");
        assert_eq!(snaps.len(), 1);
        let GameEvent::WorldSnapshot { players, world_level, .. } = &snaps[0].event else {
            panic!("Expected a world snapshot");
        };
        assert_eq!(players.len(), 2);
        assert!(*world_level >= 1);
        assert_eq!(events_named(&sent, "xpUpdate").len(), 2);
        assert!(sent.iter().all(|e| e.destination == Destination::Match && e.match_id == 1));
        assert_eq!(report.published, sent.len() as u64);
        assert_eq!(f.metrics.active_matches.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_created_runtime_is_not_ticked() {
        let f = fixture();
        f.registry.create_runtime(5, FogConfig::default());
        f.registry.add_player(5, &spec(1, 100.0));

        let report = f.scheduler.run_frame_at(T0);

        assert_eq!(report.ticked, 0);
        assert!(f.sink.is_empty());
    }

    #[test]
    fn test_match_end_runs_once() {
        let f = fixture();
        start_match(&f, 2, &[1, 2]);
        {
            let rt = f.registry.get(2).unwrap();
            let mut rt = rt.lock();
            for id in [1, 2] {
                rt.player_mut(id).unwrap().apply_damage(100);
            }
        }
        let runtime = f.registry.get(2).unwrap();
        let level = runtime.lock().world_level();

        let report = f.scheduler.run_frame_at(T0 + 50);

        assert_eq!(report.ended, 1);
        assert!(f.registry.get(2).is_none());
        assert_eq!(runtime.lock().world_level(), level);
        assert!(runtime.lock().is_finalized());

        let sent = f.sink.drain();
        let ended = events_named(&sent, "MATCH_ENDED");
        assert_eq!(ended.len(), 1);
        let GameEvent::MatchEnded { winner_id, results } = &ended[0].event else {
            panic!("Expected MATCH_ENDED");
        };
        assert_eq!(*winner_id, -1);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.time_alive_ms == 50 && r.kills == 0));
        // Dead players get no xp updates
        assert!(events_named(&sent, "xpUpdate").is_empty());

        let ended_record = f.progress.ended_match(2).unwrap();
        assert_eq!(ended_record.winner, None);
        assert_eq!(f.progress.account(1).unwrap().matches_played, 1);

        // Nothing further for this match
        let again = f.scheduler.run_frame_at(T0 + 100);
        assert_eq!(again.ticked, 0);
        assert!(f.sink.is_empty());
    }

    #[test]
    fn test_handle_match_end_twice() {
        let f = fixture();
        start_match(&f, 3, &[1]);
        let runtime = f.registry.get(3).unwrap();
        let mut rt = runtime.lock();
        rt.player_mut(1).unwrap().apply_damage(100);

        assert!(f.scheduler.handle_match_end(&mut rt, T0 + 1_000));
        assert!(!f.scheduler.handle_match_end(&mut rt, T0 + 2_000));

        let sent = f.sink.drain();
        assert_eq!(events_named(&sent, "MATCH_ENDED").len(), 1);
        assert!(rt.is_ended());
        assert!(f.registry.is_empty());
        assert_eq!(f.progress.credited_matches(), 1);
        assert_eq!(f.metrics.matches_ended.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_stopped_match_goes_quiet() {
        let f = fixture();
        start_match(&f, 4, &[1]);
        let runtime = f.registry.get(4).unwrap();
        f.scheduler.run_frame_at(T0 + 50);
        f.sink.drain();

        assert!(f.registry.stop(4));
        let report = f.scheduler.run_frame_at(T0 + 100);

        assert_eq!(report.ticked, 0);
        assert!(f.sink.is_empty());
        // A later end trigger does not run side effects for a stopped match
        assert!(!f.scheduler.handle_match_end(&mut runtime.lock(), T0 + 150));
        assert!(f.sink.is_empty());
        assert!(f.progress.ended_match(4).is_none());
    }

    #[test]
    fn test_finished_match_releases_action_queues() {
        let f = fixture();
        start_match(&f, 9, &[1, 2]);
        start_match(&f, 10, &[3]);
        for id in [1, 2, 3] {
            f.queues.submit(id, || Ok(())).unwrap();
        }
        assert_eq!(f.queues.len(), 3);
        {
            let runtime = f.registry.get(9).unwrap();
            let mut rt = runtime.lock();
            for id in [1, 2] {
                rt.player_mut(id).unwrap().apply_damage(100);
            }
        }

        let report = f.scheduler.run_frame_at(T0 + 50);

        assert_eq!(report.ended, 1);
        assert_eq!(f.queues.len(), 1);

        assert!(f.scheduler.stop_match(10));
        assert_eq!(f.queues.len(), 0);
        assert!(!f.scheduler.stop_match(10));
    }

    #[test]
    fn test_stop_clears_upgrade_memo() {
        let f = fixture();
        start_match(&f, 11, &[1]);
        let runtime = f.registry.get(11).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        runtime.lock().player_mut(1).unwrap().add_xp(150, &mut rng);
        f.scheduler.run_frame_at(T0 + 50);
        assert_eq!(f.scheduler.pending_upgrade_prompts(), 1);

        assert!(f.scheduler.stop_match(11));

        assert_eq!(f.scheduler.pending_upgrade_prompts(), 0);
        assert!(runtime.lock().is_stopped());
        assert!(f.progress.ended_match(11).is_none());
    }

    #[test]
    fn test_upgrade_options_once_per_level() {
        let f = fixture();
        start_match(&f, 6, &[1]);
        let runtime = f.registry.get(6).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        runtime.lock().player_mut(1).unwrap().add_xp(150, &mut rng);

        let mut options_sent = Vec::new();
        for i in 1..=3 {
            f.scheduler.run_frame_at(T0 + 50 * i);
            options_sent.extend(
                f.sink
                    .drain()
                    .into_iter()
                    .filter(|e| e.event.name() == "upgradeOptions"),
            );
        }
        assert_eq!(options_sent.len(), 1);
        let GameEvent::UpgradeOptions { level, options, .. } = &options_sent[0].event else {
            panic!("Expected upgradeOptions");
        };
        assert_eq!(*level, 2);
        assert_eq!(options.len(), 3);
        assert_eq!(f.scheduler.pending_upgrade_prompts(), 1);

        // Picking clears the memo on the next frame
        assert!(runtime.lock().apply_upgrade(1, UpgradeType::MaxHpUp));
        f.scheduler.run_frame_at(T0 + 200);
        assert_eq!(f.scheduler.pending_upgrade_prompts(), 0);
        f.sink.drain();

        // The next level-up prompts again
        runtime.lock().player_mut(1).unwrap().add_xp(200, &mut rng);
        f.scheduler.run_frame_at(T0 + 250);
        f.scheduler.run_frame_at(T0 + 300);
        let sent = f.sink.drain();
        let prompts = events_named(&sent, "upgradeOptions");
        assert_eq!(prompts.len(), 1);
        assert!(matches!(prompts[0].event, GameEvent::UpgradeOptions { level: 3, .. }));
    }

    #[test]
    fn test_per_user_snapshots() {
        let config = ServerConfig {
            per_user_snapshots: true,
            ..ServerConfig::default()
        };
        let f = fixture_with(&config);
        start_match(&f, 7, &[1, 2]);

        f.scheduler.run_frame_at(T0 + 50);

        let sent = f.sink.drain();
        let direct: Vec<_> = sent
            .iter()
            .filter(|e| matches!(e.destination, Destination::Player(_)))
            .collect();
        assert_eq!(direct.len(), 2);
        assert_eq!(direct[0].destination, Destination::Player(1));
        assert_eq!(direct[0].event.name(), "playerSnapshot");
    }

    struct FailingStore;

    impl ProgressStore for FailingStore {
        fn mark_ended(&self, _: MatchId, _: Option<PlayerId>, _: i64) -> Result<(), ProgressError> {
            Err(ProgressError::Storage("offline".into()))
        }

        fn write_results(&self, _: MatchId, _: &[ParticipantResult]) -> Result<(), ProgressError> {
            Err(ProgressError::Storage("offline".into()))
        }
    }

    #[test]
    fn test_persistence_failure_still_ends_match() {
        let registry = Arc::new(RuntimeRegistry::new());
        let sink = Arc::new(BufferedSink::new());
        let scheduler = TickScheduler::new(
            registry.clone(),
            sink.clone(),
            Arc::new(FailingStore),
            Arc::new(Metrics::new()),
            &ServerConfig::default(),
        );
        let mut rt = MatchRuntime::with_seed(8, FogConfig::default(), 3);
        rt.add_player(&spec(1, 500.0));
        rt.start_at(T0);
        rt.player_mut(1).unwrap().apply_damage(100);
        registry.insert(rt);

        let report = scheduler.run_frame_at(T0 + 50);

        assert_eq!(report.ended, 1);
        assert!(registry.is_empty());
        assert_eq!(
            sink.drain().iter().filter(|e| e.event.name() == "MATCH_ENDED").count(),
            1
        );
    }
}
