//! Match result assembly
//!
//! Computes the winner and the per-player results persisted and broadcast
//! when a match ends.

use serde::{Deserialize, Serialize};

use crate::game::state::{PlayerId, Players};

/// Winner id sent when nobody survived
pub const NO_WINNER: PlayerId = -1;

/// One player's outcome, as persisted and broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResult {
    pub account_id: PlayerId,
    pub score: u32,
    pub coins: u32,
    /// Not tracked yet; always 0
    pub kills: u32,
    pub time_alive_ms: i64,
}

/// Match result information
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub winner_id: Option<PlayerId>,
    pub results: Vec<ParticipantResult>,
    pub duration_ms: i64,
}

impl MatchResult {
    /// Winner id in wire form
    pub fn winner_or_sentinel(&self) -> PlayerId {
        self.winner_id.unwrap_or(NO_WINNER)
    }
}

/// Reason why match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEndReason {
    /// No living player remains
    AllPlayersDead,
    /// The lobby stopped the match
    Stopped,
}

/// Determine match result from the final player table.
///
/// The winner is the first living player in id order. Every participant's
/// time alive is measured from match start to `now_ms`.
pub fn determine_result(players: &Players, start_time_ms: i64, now_ms: i64) -> MatchResult {
    let duration_ms = (now_ms - start_time_ms).max(0);
    let winner_id = players.values().find(|p| p.is_alive()).map(|p| p.id);

    let results = players
        .values()
        .map(|p| ParticipantResult {
            account_id: p.id,
            score: p.score,
            coins: p.coins_earned,
            kills: 0,
            time_alive_ms: duration_ms,
        })
        .collect();

    MatchResult {
        winner_id,
        results,
        duration_ms,
    }
}

/// Check if match should end
pub fn check_match_end(players: &Players) -> Option<MatchEndReason> {
    if players.values().any(|p| p.is_alive()) {
        None
    } else {
        Some(MatchEndReason::AllPlayersDead)
    }
}
