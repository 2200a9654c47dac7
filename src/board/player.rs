//! Player records and the composite ranking key.
//!
//! Semantics of the ordering tuple: higher score ranks first; among equal
//! scores the *earlier* update wins (rewarding whoever got there first);
//! the id is a final, total tie-break.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Internal, shared player state.  Never handed out to callers; reads are
/// answered with [`PlayerView`] copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PlayerRecord {
    pub(crate) id: i64,
    pub(crate) score: i64,
    /// Unix milliseconds of the last score change.
    pub(crate) update_time_ms: i64,
}

impl PlayerRecord {
    #[inline]
    pub(crate) fn key(&self) -> RankKey {
        RankKey {
            score: self.score,
            update_time_ms: self.update_time_ms,
            id: self.id,
        }
    }
}

/// Composite ordering key `(score desc, update_time asc, id asc)`.
///
/// `Ord` is arranged so that *ascending* key order is rank order: the
/// smallest key is rank 1.  Every structure that orders players (skip
/// list traversal, insertion, deletion) goes through this one comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RankKey {
    pub(crate) score: i64,
    pub(crate) update_time_ms: i64,
    pub(crate) id: i64,
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| self.update_time_ms.cmp(&other.update_time_ms))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A defensively-copied row returned by read operations.
///
/// `rank` is computed at read time and never stored in shared state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerView {
    pub id: i64,
    pub score: i64,
    /// 1-based rank at the time of the read.
    pub rank: u64,
    /// Unix milliseconds of the player's last score change.
    pub update_time_ms: i64,
}

impl PlayerView {
    pub(crate) fn from_record(record: &PlayerRecord, rank: u64) -> Self {
        PlayerView {
            id: record.id,
            score: record.score,
            rank,
            update_time_ms: record.update_time_ms,
        }
    }
}
