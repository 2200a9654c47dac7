//! Hybrid leaderboard engine.
//!
//! Three structures cooperate under one reader-writer lock:
//!
//! - an **indexed skip list** answers exact ranks and rank ranges in
//!   O(log n),
//! - a **bounded top-K min-heap** tracks the K highest scores so the hot
//!   TopN path never has to scan,
//! - a **player map** gives O(1) identity lookups and holds each player's
//!   current composite key.
//!
//! Writes flow through a bounded channel into a single mutator worker that
//! applies them in batches: one write-lock acquisition per batch, then a
//! version bump and a wholesale rank-cache invalidation.  When the channel
//! is full the caller applies its update synchronously instead; updates are
//! never dropped.  Reads take the read lock; `top_n` consults a short-TTL
//! cache first.
//!
//! # Example
//! ```
//! use flywheel::board::LeaderboardBuilder;
//!
//! let board = LeaderboardBuilder::new("s1", "season one").build().unwrap();
//! board.apply_update(7, 1500).unwrap();
//! board.apply_update(9, 900).unwrap();
//!
//! assert_eq!(board.player_rank(7).unwrap(), 1);
//! let top = board.top_n(10);
//! assert_eq!(top[0].id, 7);
//! board.close();
//! ```

mod cache;
mod player;
mod skiplist;
mod stats;
mod top_heap;

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ahash::AHashMap;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use crate::error::Error;
use cache::RankCache;
use player::PlayerRecord;
use skiplist::SkipList;
use stats::BoardStats;
use top_heap::TopKHeap;

pub use player::PlayerView;
pub use stats::BoardMetrics;

/// Mutator worker commits a batch at this size even mid-interval.
const BATCH_MAX: usize = 100;
/// Mutator worker flushes a partial batch this often.
const FLUSH_INTERVAL: Duration = Duration::from_millis(50);

const DEFAULT_TOP_K: usize = 1_000;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(2);
const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

struct ScoreUpdate {
    player_id: i64,
    score: i64,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`Leaderboard`].
pub struct LeaderboardBuilder {
    id: String,
    name: String,
    top_k: usize,
    cache_ttl: Duration,
    queue_capacity: usize,
}

impl LeaderboardBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        LeaderboardBuilder {
            id: id.into(),
            name: name.into(),
            top_k: DEFAULT_TOP_K,
            cache_ttl: DEFAULT_CACHE_TTL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Number of highest-scoring players tracked by the top heap
    /// (default: 1000).
    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// TTL of cached TopN snapshots (default: 2 s).
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Capacity of the update queue; a full queue makes callers apply
    /// synchronously (default: 10 000).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<Leaderboard, Error> {
        if self.top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidArgument("queue_capacity must be at least 1"));
        }

        let inner = Arc::new(BoardInner {
            id: self.id,
            name: self.name,
            state: RwLock::new(BoardState {
                skiplist: SkipList::new(),
                top: TopKHeap::new(self.top_k),
                players: AHashMap::new(),
            }),
            cache: RankCache::new(self.cache_ttl),
            version: AtomicU64::new(0),
            stats: BoardStats::new(),
        });

        let (tx, rx) = bounded(self.queue_capacity);
        let worker = {
            let inner = Arc::clone(&inner);
            std::thread::spawn(move || mutator_loop(&inner, &rx))
        };

        Ok(Leaderboard {
            inner,
            updates: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Builds the board and restores the player set from a snapshot
    /// previously written by [`Leaderboard::snapshot`].
    pub fn load<R: BufRead>(self, reader: R) -> Result<Leaderboard, Error> {
        let board = self.build()?;
        {
            let mut state = board.inner.state.write();
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: PlayerRecord = serde_json::from_str(&line)?;
                install(&mut state, record);
            }
        }
        board.inner.commit(0);
        Ok(board)
    }
}

// ---------------------------------------------------------------------------
// Shared interior
// ---------------------------------------------------------------------------

struct BoardState {
    skiplist: SkipList,
    top: TopKHeap,
    players: AHashMap<i64, PlayerRecord>,
}

struct BoardInner {
    id: String,
    name: String,
    state: RwLock<BoardState>,
    cache: RankCache,
    version: AtomicU64,
    stats: BoardStats,
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Applies one update to all three structures.  Caller holds the write
/// lock.
fn apply_one(state: &mut BoardState, player_id: i64, score: i64) {
    match state.players.get(&player_id).copied() {
        None => {
            let record = PlayerRecord {
                id: player_id,
                score,
                update_time_ms: now_unix_ms(),
            };
            state.players.insert(player_id, record);
            state.skiplist.insert(record);
            state.top.offer(&record);
        }
        // Same score again: keep the original update time so the ranking
        // among ties is unchanged (re-setting a score is idempotent).
        Some(old) if old.score == score => {}
        Some(old) => {
            let record = PlayerRecord {
                id: player_id,
                score,
                update_time_ms: now_unix_ms(),
            };
            state.skiplist.update(old.key(), record);
            state.players.insert(player_id, record);
            state.top.offer(&record);
        }
    }
}

/// Installs a snapshot record, preserving its stored update time.
fn install(state: &mut BoardState, record: PlayerRecord) {
    if let Some(old) = state.players.get(&record.id).copied() {
        state.skiplist.delete(old.key());
    }
    state.players.insert(record.id, record);
    state.skiplist.insert(record);
    state.top.offer(&record);
}

impl BoardInner {
    /// Version bump + cache drop after a mutation batch.
    fn commit(&self, applied: u64) {
        self.version.fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate();
        if applied > 0 {
            self.stats.record_updates(applied);
        }
        self.stats.record_batch();
    }

    fn apply_batch(&self, batch: &[ScoreUpdate]) {
        {
            let mut state = self.state.write();
            for update in batch {
                apply_one(&mut state, update.player_id, update.score);
            }
        }
        self.commit(batch.len() as u64);
        tracing::trace!(board = %self.id, updates = batch.len(), "batch committed");
    }

    fn apply_sync(&self, update: ScoreUpdate) {
        {
            let mut state = self.state.write();
            apply_one(&mut state, update.player_id, update.score);
        }
        self.commit(1);
    }
}

/// Mutator worker: the only consumer of the update channel.  Batches up to
/// [`BATCH_MAX`] updates or whatever accumulated in a flush interval, and
/// drains the remainder when the channel closes.
fn mutator_loop(inner: &BoardInner, rx: &Receiver<ScoreUpdate>) {
    let ticker = crossbeam_channel::tick(FLUSH_INTERVAL);
    let mut batch: Vec<ScoreUpdate> = Vec::with_capacity(BATCH_MAX);
    loop {
        select! {
            recv(rx) -> msg => match msg {
                Ok(update) => {
                    batch.push(update);
                    if batch.len() >= BATCH_MAX {
                        inner.apply_batch(&batch);
                        batch.clear();
                    }
                }
                Err(_) => {
                    // Channel closed: commit what is left and exit.
                    if !batch.is_empty() {
                        inner.apply_batch(&batch);
                    }
                    tracing::debug!(board = %inner.id, "mutator worker exiting");
                    return;
                }
            },
            recv(ticker) -> _ => {
                if !batch.is_empty() {
                    inner.apply_batch(&batch);
                    batch.clear();
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Leaderboard
// ---------------------------------------------------------------------------

/// Concurrent leaderboard handle.
///
/// All methods take `&self`; reads and writes may come from any thread.
/// [`close`] stops the mutator worker after draining pending updates and is
/// idempotent.
///
/// [`close`]: Leaderboard::close
pub struct Leaderboard {
    inner: Arc<BoardInner>,
    /// Taken (dropped) on close; a closed board rejects new updates.
    updates: Mutex<Option<Sender<ScoreUpdate>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Leaderboard {
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Submits a score update.
    ///
    /// Non-blocking on the happy path (a channel send).  When the queue is
    /// full the update is applied synchronously under the write lock, so it
    /// is never dropped.  Fails only on a closed board.
    pub fn update_score(&self, player_id: i64, score: i64) -> Result<(), Error> {
        let guard = self.updates.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(Error::Closed);
        };
        match tx.try_send(ScoreUpdate { player_id, score }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(update)) => {
                drop(guard);
                self.inner.stats.record_sync_apply();
                self.inner.apply_sync(update);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::Closed),
        }
    }

    /// Applies one update synchronously, bypassing the batch queue.
    ///
    /// This is the replay hook for external persistence: an append-only log
    /// replays through here so the caller observes each update fully
    /// applied when the call returns.
    pub fn apply_update(&self, player_id: i64, score: i64) -> Result<(), Error> {
        if self.updates.lock().is_none() {
            return Err(Error::Closed);
        }
        self.inner.apply_sync(ScoreUpdate { player_id, score });
        Ok(())
    }

    /// Exact 1-based rank of a player.
    pub fn player_rank(&self, player_id: i64) -> Result<u64, Error> {
        let state = self.inner.state.read();
        let record = state
            .players
            .get(&player_id)
            .ok_or(Error::PlayerNotFound(player_id))?;
        match state.skiplist.rank_by_key(record.key()) {
            Some(rank) => Ok(rank),
            None => {
                debug_assert!(false, "player map and skip list disagree on {player_id}");
                tracing::error!(player_id, "player map entry missing from skip list");
                Err(Error::PlayerNotFound(player_id))
            }
        }
    }

    /// The top `limit` players in rank order.
    ///
    /// Served from the rank cache when a fresh snapshot for this limit
    /// exists; otherwise recomputed from the skip list and cached.  Each
    /// returned view is a defensive copy with `rank` filled in.
    pub fn top_n(&self, limit: usize) -> Vec<PlayerView> {
        if limit == 0 {
            return Vec::new();
        }
        if let Some(hit) = self.inner.cache.get(limit) {
            self.inner.stats.record_cache_hit();
            return hit;
        }
        self.inner.stats.record_cache_miss();

        let views: Vec<PlayerView> = {
            let state = self.inner.state.read();
            state
                .skiplist
                .range(1, limit as u64)
                .iter()
                .enumerate()
                .map(|(i, record)| PlayerView::from_record(record, i as u64 + 1))
                .collect()
        };
        self.inner.cache.set(limit, views.clone());
        views
    }

    /// Players ranked within `half_span` positions of `player_id`, in rank
    /// order (the player itself included).
    pub fn nearby(&self, player_id: i64, half_span: u64) -> Result<Vec<PlayerView>, Error> {
        let state = self.inner.state.read();
        let record = state
            .players
            .get(&player_id)
            .ok_or(Error::PlayerNotFound(player_id))?;
        let rank = state
            .skiplist
            .rank_by_key(record.key())
            .ok_or(Error::PlayerNotFound(player_id))?;

        let start = rank.saturating_sub(half_span).max(1);
        let end = (rank + half_span).min(state.skiplist.len());
        Ok(state
            .skiplist
            .range(start, end)
            .iter()
            .enumerate()
            .map(|(i, record)| PlayerView::from_record(record, start + i as u64))
            .collect())
    }

    pub fn player_count(&self) -> u64 {
        self.inner.state.read().players.len() as u64
    }

    /// Monotonic mutation-commit counter.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    /// Serializes every `(id, score, update_time)` triple as JSON lines.
    /// The skip list and top heap are rebuilt from these on
    /// [`LeaderboardBuilder::load`].
    pub fn snapshot<W: Write>(&self, mut writer: W) -> Result<(), Error> {
        let state = self.inner.state.read();
        for record in state.players.values() {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Closes the update queue and joins the mutator worker after it has
    /// drained.  Idempotent; reads keep working on the final state.
    pub fn close(&self) {
        let tx = self.updates.lock().take();
        drop(tx);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }

    pub fn metrics(&self) -> BoardMetrics {
        self.inner.stats.snapshot()
    }
}

impl Drop for Leaderboard {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Tests (coordinator-level; scenario tests live in tests/board.rs)
// ---------------------------------------------------------------------------
