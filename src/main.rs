use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use survivor_arena_server::config::ServerConfig;
use survivor_arena_server::game::state::{MatchId, PlayerId, PlayerSpec};
use survivor_arena_server::game::stats::Stats;
use survivor_arena_server::metrics::Metrics;
use survivor_arena_server::net::protocol::{InputMsg, UpgradePick};
use survivor_arena_server::net::sink::{self, BufferedSink, LogTransport};
use survivor_arena_server::server::action_queue::ActionQueues;
use survivor_arena_server::server::handlers::Handlers;
use survivor_arena_server::server::progress::InMemoryProgressStore;
use survivor_arena_server::server::registry::RuntimeRegistry;
use survivor_arena_server::server::scheduler::TickScheduler;
use survivor_arena_server::util::vec2::Vec2;

const SANDBOX_MATCH: MatchId = 1;
const SANDBOX_PLAYER: PlayerId = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Survivor Arena Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {} Hz, fog {}/{}/{} tiles, metrics on {}:{}",
        config.tick_rate_hz,
        config.fog.light,
        config.fog.wake,
        config.fog.sleep,
        config.bind_address,
        config.metrics_port
    );

    let metrics = Arc::new(Metrics::new());

    #[cfg(feature = "metrics_server")]
    {
        let metrics = metrics.clone();
        let addr = std::net::SocketAddr::new(config.bind_address, config.metrics_port);
        tokio::spawn(async move {
            if let Err(e) = survivor_arena_server::metrics::start_metrics_server(metrics, addr).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let registry = Arc::new(RuntimeRegistry::new());
    let queues = Arc::new(ActionQueues::new());
    let progress = Arc::new(InMemoryProgressStore::new());
    let outbound = Arc::new(BufferedSink::new());
    let flusher = sink::spawn_flusher(outbound.clone(), Arc::new(LogTransport), config.sink_flush_interval_ms);

    let handlers = Arc::new(Handlers::new(registry.clone(), queues.clone(), outbound.clone()));
    let scheduler = Arc::new(TickScheduler::new(
        registry.clone(),
        outbound.clone(),
        progress,
        metrics.clone(),
        &config,
    )
    .with_action_queues(queues.clone()));
    let ticker = scheduler.clone().spawn();

    let sandbox = if config.sandbox_match {
        Some(start_sandbox(&config, registry.clone(), handlers.clone()))
    } else {
        None
    };

    info!("Server ready");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    ticker.abort();
    if let Some(sandbox) = sandbox {
        sandbox.abort();
    }
    flusher.abort();
    sink::flush(&outbound, &LogTransport);

    let active = registry.active();
    for (match_id, _) in &active {
        scheduler.stop_match(*match_id);
    }
    tokio::task::spawn_blocking(move || queues.shutdown()).await?;

    info!("Server stopped ({} matches stopped)", active.len());
    Ok(())
}

/// Start a one-player match and steer it through the inbound path so the
/// loop, sink and metrics can be watched without a transport
fn start_sandbox(
    config: &ServerConfig,
    registry: Arc<RuntimeRegistry>,
    handlers: Arc<Handlers>,
) -> tokio::task::JoinHandle<()> {
    registry.create_runtime(SANDBOX_MATCH, config.fog);
    registry.add_player(
        SANDBOX_MATCH,
        &PlayerSpec::new(SANDBOX_PLAYER, Vec2::new(1000.0, 1000.0), Stats::new(100, 50, 30, 20, 5, 10)),
    );
    registry.start_existing_runtime(SANDBOX_MATCH);
    info!("Sandbox match {} started", SANDBOX_MATCH);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        let mut seq: u64 = 0;

        loop {
            ticker.tick().await;
            let Some(runtime) = registry.get(SANDBOX_MATCH) else {
                info!("Sandbox match is over");
                return;
            };
            let pick = runtime
                .lock()
                .player(SANDBOX_PLAYER)
                .and_then(|p| p.upgrade_options().first().copied());

            let result = match pick {
                Some(upgrade) => handlers.submit_upgrade_pick(UpgradePick {
                    player_id: SANDBOX_PLAYER,
                    selected_upgrade: upgrade.name().to_string(),
                }),
                None => {
                    seq += 1;
                    let angle = seq as f64 * 0.3;
                    handlers.submit_input(InputMsg {
                        match_id: SANDBOX_MATCH,
                        account_id: SANDBOX_PLAYER,
                        move_x: angle.cos(),
                        move_y: angle.sin(),
                        seq,
                    })
                }
            };
            if let Err(e) = result {
                error!("Sandbox input rejected: {}", e);
                return;
            }
        }
    })
}
