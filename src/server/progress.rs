//! Result persistence collaborator
//!
//! The core hands finished-match results to a `ProgressStore`. The store
//! shipped here keeps everything in memory; a database-backed store plugs in
//! behind the same trait.

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use tracing::debug;

use crate::game::match_result::ParticipantResult;
use crate::game::state::{MatchId, PlayerId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgressError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Where match outcomes are persisted
pub trait ProgressStore: Send + Sync {
    /// Record that a match finished, with its winner if any
    fn mark_ended(&self, match_id: MatchId, winner: Option<PlayerId>, ended_at_ms: i64) -> Result<(), ProgressError>;

    /// Credit each participant's result to their running totals
    fn write_results(&self, match_id: MatchId, results: &[ParticipantResult]) -> Result<(), ProgressError>;
}

/// Running totals of one account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountProgress {
    pub coins: u64,
    pub total_score: u64,
    pub matches_played: u32,
}

/// Ended-match record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndedMatch {
    pub winner: Option<PlayerId>,
    pub ended_at_ms: i64,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<PlayerId, AccountProgress>,
    ended: HashMap<MatchId, EndedMatch>,
    credited: HashSet<MatchId>,
}

/// Process-local progress store
#[derive(Default)]
pub struct InMemoryProgressStore {
    inner: Mutex<Inner>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, account_id: PlayerId) -> Option<AccountProgress> {
        self.inner.lock().accounts.get(&account_id).copied()
    }

    pub fn ended_match(&self, match_id: MatchId) -> Option<EndedMatch> {
        self.inner.lock().ended.get(&match_id).copied()
    }

    /// Number of matches whose results were credited
    pub fn credited_matches(&self) -> usize {
        self.inner.lock().credited.len()
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn mark_ended(&self, match_id: MatchId, winner: Option<PlayerId>, ended_at_ms: i64) -> Result<(), ProgressError> {
        self.inner
            .lock()
            .ended
            .entry(match_id)
            .or_insert(EndedMatch { winner, ended_at_ms });
        Ok(())
    }

    fn write_results(&self, match_id: MatchId, results: &[ParticipantResult]) -> Result<(), ProgressError> {
        let mut inner = self.inner.lock();
        if !inner.credited.insert(match_id) {
            debug!("Results for match {} already credited", match_id);
            return Ok(());
        }

        for r in results {
            let account = inner.accounts.entry(r.account_id).or_default();
            account.coins += u64::from(r.coins);
            account.total_score += u64::from(r.score);
            account.matches_played += 1;
        }
        debug!("Credited {} results for match {}", results.len(), match_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(account_id: PlayerId, score: u32, coins: u32) -> ParticipantResult {
        ParticipantResult {
            account_id,
            score,
            coins,
            kills: 0,
            time_alive_ms: 1_000,
        }
    }

    #[test]
    fn test_write_results_accumulates_across_matches() {
        let store = InMemoryProgressStore::new();
        store.write_results(1, &[result(7, 40, 4), result(8, 10, 0)]).unwrap();
        store.write_results(2, &[result(7, 20, 2)]).unwrap();

        let a = store.account(7).unwrap();
        assert_eq!(a.coins, 6);
        assert_eq!(a.total_score, 60);
        assert_eq!(a.matches_played, 2);
        assert_eq!(store.account(8).unwrap().matches_played, 1);
        assert!(store.account(9).is_none());
    }

    #[test]
    fn test_duplicate_write_is_ignored() {
        let store = InMemoryProgressStore::new();
        store.write_results(1, &[result(7, 40, 4)]).unwrap();
        store.write_results(1, &[result(7, 40, 4)]).unwrap();

        assert_eq!(store.account(7).unwrap().coins, 4);
        assert_eq!(store.credited_matches(), 1);
    }

    #[test]
    fn test_mark_ended_keeps_first_record() {
        let store = InMemoryProgressStore::new();
        store.mark_ended(3, Some(7), 100).unwrap();
        store.mark_ended(3, None, 200).unwrap();

        assert_eq!(
            store.ended_match(3),
            Some(EndedMatch {
                winner: Some(7),
                ended_at_ms: 100
            })
        );
    }
}
