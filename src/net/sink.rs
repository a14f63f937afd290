//! Outbound message sink
//!
//! The tick thread never performs I/O. It hands events to a `MessageSink`;
//! `BufferedSink` only pushes them onto a channel, and a flusher task drains
//! the channel into the transport outside the tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, trace, warn};

use crate::game::state::{MatchId, PlayerId};
use crate::net::protocol::{encode, GameEvent};

/// Where the core publishes per-match traffic
pub trait MessageSink: Send + Sync {
    /// Send to every client of the match
    fn broadcast(&self, match_id: MatchId, event: GameEvent);

    /// Send to one player of the match
    fn to_player(&self, match_id: MatchId, player_id: PlayerId, event: GameEvent);
}

/// Recipient of an outbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Match,
    Player(PlayerId),
}

/// One queued outbound event
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub match_id: MatchId,
    pub destination: Destination,
    pub event: GameEvent,
}

impl Envelope {
    /// Topic string in the transport's naming scheme
    pub fn topic(&self) -> String {
        match self.destination {
            Destination::Match => format!("/topic/match.{}.game", self.match_id),
            Destination::Player(player) => format!("/topic/match.{}.player.{}", self.match_id, player),
        }
    }
}

/// Non-blocking sink backed by an unbounded channel
pub struct BufferedSink {
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
    published: AtomicU64,
}

impl Default for BufferedSink {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferedSink {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            published: AtomicU64::new(0),
        }
    }

    fn push(&self, envelope: Envelope) {
        // The sink owns the receiver, so sending cannot fail while `self` lives
        if self.tx.send(envelope).is_ok() {
            self.published.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take everything queued so far, oldest first
    pub fn drain(&self) -> Vec<Envelope> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Total events accepted since creation
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl MessageSink for BufferedSink {
    fn broadcast(&self, match_id: MatchId, event: GameEvent) {
        self.push(Envelope {
            match_id,
            destination: Destination::Match,
            event,
        });
    }

    fn to_player(&self, match_id: MatchId, player_id: PlayerId, event: GameEvent) {
        self.push(Envelope {
            match_id,
            destination: Destination::Player(player_id),
            event,
        });
    }
}

/// Wire-level delivery, implemented by the transport collaborator
pub trait Transport: Send + Sync {
    fn deliver(&self, topic: &str, payload: &str) -> Result<(), String>;
}

/// Transport that only logs; used when no real transport is attached
#[derive(Debug, Default)]
pub struct LogTransport;

impl Transport for LogTransport {
    fn deliver(&self, topic: &str, payload: &str) -> Result<(), String> {
        trace!("{} <- {}", topic, payload);
        Ok(())
    }
}

/// Encode and deliver everything queued in `sink`; returns the number delivered
pub fn flush(sink: &BufferedSink, transport: &dyn Transport) -> usize {
    let mut delivered = 0;
    for envelope in sink.drain() {
        let payload = match encode(&envelope.event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode {} for match {}: {}", envelope.event.name(), envelope.match_id, e);
                continue;
            }
        };
        match transport.deliver(&envelope.topic(), &payload) {
            Ok(()) => delivered += 1,
            Err(e) => warn!("Failed to deliver {} to {}: {}", envelope.event.name(), envelope.topic(), e),
        }
    }
    delivered
}

/// Start the background task that drains `sink` every `interval_ms`
pub fn spawn_flusher(sink: Arc<BufferedSink>, transport: Arc<dyn Transport>, interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        debug!("Sink flusher started ({} ms)", interval_ms);

        loop {
            ticker.tick().await;
            flush(&sink, transport.as_ref());
        }
    })
}
