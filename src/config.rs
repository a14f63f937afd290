use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::game::constants::{fog, sim, tiles_to_px};
use crate::game::systems::ai::FogRadii;

/// Configuration rejected by `ServerConfig::validate`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("fog wake radius ({wake}) must be smaller than sleep radius ({sleep})")]
    FogHysteresis { wake: u32, sleep: u32 },
    #[error("fog light radius must be at least 1 tile")]
    FogLightZero,
    #[error("tick rate {0} Hz outside 1..=120")]
    TickRate(u32),
}

/// Fog-of-war radii in tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FogConfig {
    /// Snapshot visibility and enemy fairness radius
    pub light: u32,
    /// Enemies closer than this to a living player wake up
    pub wake: u32,
    /// Enemies at least this far from every living player fall asleep
    pub sleep: u32,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            light: fog::LIGHT,
            wake: fog::WAKE,
            sleep: fog::SLEEP,
        }
    }
}

impl FogConfig {
    pub fn new(light: u32, wake: u32, sleep: u32) -> Self {
        Self { light, wake, sleep }
    }

    pub fn radii(&self) -> FogRadii {
        FogRadii {
            light_px: tiles_to_px(self.light),
            wake_px: tiles_to_px(self.wake),
            sleep_px: tiles_to_px(self.sleep),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.light == 0 {
            return Err(ConfigError::FogLightZero);
        }
        if self.wake >= self.sleep {
            return Err(ConfigError::FogHysteresis {
                wake: self.wake,
                sleep: self.sleep,
            });
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the metrics endpoint binds to
    pub bind_address: IpAddr,
    /// Metrics endpoint port
    pub metrics_port: u16,
    /// Fog radii used for runtimes created without explicit fog
    pub fog: FogConfig,
    /// Scheduler frequency; the simulation step stays 1/20 s
    pub tick_rate_hz: u32,
    /// Also send each player its own un-merged snapshot
    pub per_user_snapshots: bool,
    /// How often the buffered sink drains to the transport
    pub sink_flush_interval_ms: u64,
    /// Start one single-player match at boot
    pub sandbox_match: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            metrics_port: 9090,
            fog: FogConfig::default(),
            tick_rate_hz: sim::TICK_RATE,
            per_user_snapshots: false,
            sink_flush_interval_ms: 10,
            sandbox_match: false,
        }
    }
}

/// Overwrite `field` with the parsed value of `name`, warning on garbage
fn read_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, field: &mut T) {
    if let Some(raw) = lookup(name) {
        match raw.trim().parse::<T>() {
            Ok(parsed) => *field = parsed,
            Err(_) => tracing::warn!("Invalid {} '{}', using default", name, raw),
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load config from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        read_var(&lookup, "BIND_ADDRESS", &mut config.bind_address);
        read_var(&lookup, "METRICS_PORT", &mut config.metrics_port);
        read_var(&lookup, "FOG_LIGHT", &mut config.fog.light);
        read_var(&lookup, "FOG_WAKE", &mut config.fog.wake);
        read_var(&lookup, "FOG_SLEEP", &mut config.fog.sleep);
        read_var(&lookup, "TICK_RATE_HZ", &mut config.tick_rate_hz);
        read_var(&lookup, "PER_USER_SNAPSHOTS", &mut config.per_user_snapshots);
        read_var(&lookup, "SINK_FLUSH_MS", &mut config.sink_flush_interval_ms);
        read_var(&lookup, "SANDBOX_MATCH", &mut config.sandbox_match);

        if config.sink_flush_interval_ms == 0 {
            tracing::warn!("SINK_FLUSH_MS must be > 0, using 1");
            config.sink_flush_interval_ms = 1;
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fog.validate()?;
        if !(1..=120).contains(&self.tick_rate_hz) {
            return Err(ConfigError::TickRate(self.tick_rate_hz));
        }
        Ok(())
    }

    /// Scheduler period in milliseconds
    pub fn tick_interval_ms(&self) -> u64 {
        1000 / u64::from(self.tick_rate_hz.max(1))
    }
}
