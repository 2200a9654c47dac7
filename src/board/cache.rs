//! Short-TTL memoization of TopN reads, keyed by the requested limit.
//!
//! The cache trades a little staleness (bounded by the TTL) for keeping
//! hot `top_n` reads off the skip list entirely.  Every mutation commit
//! drops the whole cache, so the TTL only matters between commits.
//!
//! `get` hands out a **copy** of the stored snapshot: the vector is cloned
//! so callers can never observe a snapshot that a later `set` replaces.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;

use super::player::PlayerView;

struct CachedTop {
    players: Vec<PlayerView>,
    inserted_at: Instant,
}

pub(crate) struct RankCache {
    entries: Mutex<AHashMap<usize, CachedTop>>,
    ttl: Duration,
}

impl RankCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        RankCache {
            entries: Mutex::new(AHashMap::new()),
            ttl,
        }
    }

    /// Returns a copy of the snapshot for `limit` if it is still fresh.
    /// Stale entries are dropped on the way out.
    pub(crate) fn get(&self, limit: usize) -> Option<Vec<PlayerView>> {
        let mut entries = self.entries.lock();
        if let Some(cached) = entries.get(&limit) {
            if cached.inserted_at.elapsed() < self.ttl {
                return Some(cached.players.clone());
            }
            entries.remove(&limit);
        }
        None
    }

    pub(crate) fn set(&self, limit: usize, players: Vec<PlayerView>) {
        self.entries.lock().insert(
            limit,
            CachedTop {
                players,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drops every snapshot.  Called on each mutation commit.
    pub(crate) fn invalidate(&self) {
        self.entries.lock().clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: i64, rank: u64) -> PlayerView {
        PlayerView {
            id,
            score: id * 10,
            rank,
            update_time_ms: 0,
        }
    }

    #[test]
    fn fresh_entry_is_returned_as_a_copy() {
        let cache = RankCache::new(Duration::from_secs(2));
        cache.set(3, vec![view(1, 1), view(2, 2)]);

        let mut first = cache.get(3).expect("fresh entry");
        first[0].score = 999; // mutating the copy must not leak back
        let second = cache.get(3).expect("still cached");
        assert_eq!(second[0].score, 10);
    }

    #[test]
    fn entry_expires_after_ttl() {
        let cache = RankCache::new(Duration::from_millis(30));
        cache.set(5, vec![view(1, 1)]);
        assert!(cache.get(5).is_some());
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get(5).is_none(), "entry should have aged out");
    }

    #[test]
    fn invalidate_drops_every_limit() {
        let cache = RankCache::new(Duration::from_secs(60));
        cache.set(3, vec![view(1, 1)]);
        cache.set(10, vec![view(2, 1)]);
        cache.invalidate();
        assert!(cache.get(3).is_none());
        assert!(cache.get(10).is_none());
    }

    #[test]
    fn limits_are_cached_independently() {
        let cache = RankCache::new(Duration::from_secs(60));
        cache.set(3, vec![view(1, 1)]);
        assert!(cache.get(10).is_none(), "different limit is a miss");
        assert!(cache.get(3).is_some());
    }
}
