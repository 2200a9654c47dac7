//! Indexed skip list ordered by the composite ranking key.
//!
//! ## Structure
//!
//! Nodes live in an index arena (`Vec` + free list) and link to each other
//! by slot index, so there are no raw pointers and no ownership cycles:
//! forward and backward links are plain `usize` indices with `NIL` as the
//! null sentinel.
//!
//! Every forward link carries a `span`: the number of rank positions it
//! crosses.  The sum of spans along any path from the header to a node is
//! that node's 1-based rank, which is what makes rank queries and
//! rank-range jumps O(log n).
//!
//! The header is a pure sentinel: traversal only ever compares the keys
//! of *forward* nodes, never the header's own record, so no sentinel score
//! participates in any comparison.  Deletion locates its target by the
//! complete composite key (which ends in the id) of the record being
//! removed: identity is part of the key, so the descent lands exactly on
//! the node to unlink.
//!
//! ## References
//! - Pugh (1990). *Skip Lists: A Probabilistic Alternative to Balanced
//!   Trees*, section on indexable lists.
//! - Redis `t_zset.c` (`zslInsert` / `zslDeleteNode` span bookkeeping).

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::player::{PlayerRecord, RankKey};

const MAX_LEVEL: usize = 32;
/// Probability that a node is promoted one more level.
const P: f64 = 0.25;
/// Null link sentinel.
const NIL: usize = usize::MAX;
/// Arena slot of the header sentinel.
const HEADER: usize = 0;

struct Link {
    forward: usize,
    /// Rank positions crossed by following `forward`.
    span: u64,
}

struct Node {
    record: PlayerRecord,
    backward: usize,
    links: Vec<Link>,
}

pub(crate) struct SkipList {
    /// Slot 0 is the header sentinel; its record is never compared.
    nodes: Vec<Node>,
    free: Vec<usize>,
    length: u64,
    level: usize,
    rng: SmallRng,
}

impl SkipList {
    pub(crate) fn new() -> Self {
        Self::with_rng(SmallRng::from_entropy())
    }

    #[cfg(test)]
    pub(crate) fn with_seed(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        let header = Node {
            record: PlayerRecord {
                id: 0,
                score: 0,
                update_time_ms: 0,
            },
            backward: NIL,
            links: (0..MAX_LEVEL)
                .map(|_| Link {
                    forward: NIL,
                    span: 0,
                })
                .collect(),
        };
        SkipList {
            nodes: vec![header],
            free: Vec::new(),
            length: 0,
            level: 1,
            rng,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> u64 {
        self.length
    }

    #[cfg(test)]
    pub(crate) fn level(&self) -> usize {
        self.level
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.gen::<f64>() < P {
            level += 1;
        }
        level
    }

    fn alloc(&mut self, record: PlayerRecord, level: usize) -> usize {
        let links = (0..level)
            .map(|_| Link {
                forward: NIL,
                span: 0,
            })
            .collect();
        if let Some(idx) = self.free.pop() {
            self.nodes[idx] = Node {
                record,
                backward: NIL,
                links,
            };
            idx
        } else {
            self.nodes.push(Node {
                record,
                backward: NIL,
                links,
            });
            self.nodes.len() - 1
        }
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Inserts `record`.  The caller guarantees the key is not already
    /// present (updates go through [`update`]).
    ///
    /// [`update`]: SkipList::update
    pub(crate) fn insert(&mut self, record: PlayerRecord) {
        let key = record.key();
        let mut update = [HEADER; MAX_LEVEL];
        let mut rank = [0u64; MAX_LEVEL];
        let mut x = HEADER;

        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            loop {
                let link = &self.nodes[x].links[i];
                let fwd = link.forward;
                if fwd == NIL || self.nodes[fwd].record.key() >= key {
                    break;
                }
                rank[i] += link.span;
                x = fwd;
            }
            update[i] = x;
        }

        let level = self.random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = HEADER;
                self.nodes[HEADER].links[i].span = self.length;
            }
            self.level = level;
        }

        let node = self.alloc(record, level);
        for i in 0..level {
            let prev = update[i];
            let crossed = rank[0] - rank[i];
            let prev_forward = self.nodes[prev].links[i].forward;
            let prev_span = self.nodes[prev].links[i].span;
            self.nodes[node].links[i].forward = prev_forward;
            self.nodes[node].links[i].span = prev_span - crossed;
            self.nodes[prev].links[i].forward = node;
            self.nodes[prev].links[i].span = crossed + 1;
        }
        // Levels above the new node just got one more rank to cross.
        for i in level..self.level {
            self.nodes[update[i]].links[i].span += 1;
        }

        self.nodes[node].backward = if update[0] == HEADER { NIL } else { update[0] };
        let next = self.nodes[node].links[0].forward;
        if next != NIL {
            self.nodes[next].backward = node;
        }
        self.length += 1;
    }

    /// Removes the node whose composite key equals `key`.
    ///
    /// The key carries the id, so this is removal by identity: the caller
    /// supplies the *current* key of a known record (from the player map),
    /// and the descent lands exactly on that node or nowhere.
    pub(crate) fn delete(&mut self, key: RankKey) -> bool {
        let mut update = [HEADER; MAX_LEVEL];
        let mut x = HEADER;

        for i in (0..self.level).rev() {
            loop {
                let fwd = self.nodes[x].links[i].forward;
                if fwd == NIL || self.nodes[fwd].record.key() >= key {
                    break;
                }
                x = fwd;
            }
            update[i] = x;
        }

        let target = self.nodes[x].links[0].forward;
        if target == NIL || self.nodes[target].record.key() != key {
            return false;
        }

        for i in 0..self.level {
            let prev = update[i];
            if self.nodes[prev].links[i].forward == target {
                let target_forward = self.nodes[target].links[i].forward;
                let target_span = self.nodes[target].links[i].span;
                // Sum before subtracting: a tail link's span is 0 and the
                // bare `span - 1` would underflow.
                let prev_span = self.nodes[prev].links[i].span;
                self.nodes[prev].links[i].span = prev_span + target_span - 1;
                self.nodes[prev].links[i].forward = target_forward;
            } else {
                self.nodes[prev].links[i].span -= 1;
            }
        }

        let next = self.nodes[target].links[0].forward;
        let backward = self.nodes[target].backward;
        if next != NIL {
            self.nodes[next].backward = backward;
        }
        while self.level > 1 && self.nodes[HEADER].links[self.level - 1].forward == NIL {
            self.level -= 1;
        }
        self.length -= 1;
        self.free.push(target);
        true
    }

    /// Score change = delete under the old key, reinsert under the new
    /// record.  Caller holds the external write lock across both halves.
    pub(crate) fn update(&mut self, old_key: RankKey, record: PlayerRecord) -> bool {
        if !self.delete(old_key) {
            return false;
        }
        self.insert(record);
        true
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// 1-based rank of the record with exactly this key, via the same
    /// comparator the mutations use.
    pub(crate) fn rank_by_key(&self, key: RankKey) -> Option<u64> {
        let mut rank = 0u64;
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            loop {
                let link = &self.nodes[x].links[i];
                let fwd = link.forward;
                if fwd == NIL || self.nodes[fwd].record.key() > key {
                    break;
                }
                rank += link.span;
                x = fwd;
            }
        }
        if x != HEADER && self.nodes[x].record.key() == key {
            Some(rank)
        } else {
            None
        }
    }

    /// Records with ranks in `[start, end]` (1-based, inclusive), in rank
    /// order.  Uses spans to jump to `start` without overshooting, then
    /// walks level-0 links.
    pub(crate) fn range(&self, start: u64, end: u64) -> Vec<PlayerRecord> {
        let start = start.max(1);
        let end = end.min(self.length);
        if start > end {
            return Vec::new();
        }

        let mut traversed = 0u64;
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            loop {
                let link = &self.nodes[x].links[i];
                if link.forward == NIL || traversed + link.span > start {
                    break;
                }
                traversed += link.span;
                x = link.forward;
            }
        }
        debug_assert_eq!(traversed, start, "span jump must land on start rank");

        let mut out = Vec::with_capacity((end - start + 1) as usize);
        let mut idx = x;
        let mut rank = start;
        while idx != NIL && rank <= end {
            out.push(self.nodes[idx].record);
            idx = self.nodes[idx].links[0].forward;
            rank += 1;
        }
        out
    }

    #[cfg(test)]
    fn get_by_rank(&self, rank: u64) -> Option<PlayerRecord> {
        self.range(rank, rank).into_iter().next()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
