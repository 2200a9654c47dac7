use flywheel::{Error, LeaderboardBuilder};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Seeds the five-player fixture: two tied at 50 (id 2 updated first),
/// then 20, 10, 5.  Synchronous applies keep the setup deterministic.
fn seeded_board() -> flywheel::Leaderboard {
    let board = LeaderboardBuilder::new("test", "test board").build().unwrap();
    board.apply_update(2, 50).unwrap();
    std::thread::sleep(Duration::from_millis(2)); // distinct update_time for the tie
    board.apply_update(4, 50).unwrap();
    board.apply_update(3, 20).unwrap();
    board.apply_update(1, 10).unwrap();
    board.apply_update(5, 5).unwrap();
    board
}

fn top_ids(board: &flywheel::Leaderboard, limit: usize) -> Vec<i64> {
    board.top_n(limit).iter().map(|p| p.id).collect()
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

#[test]
fn ranks_prefer_score_then_earlier_update() {
    let board = seeded_board();
    for (id, want) in [(2, 1), (4, 2), (3, 3), (1, 4), (5, 5)] {
        assert_eq!(board.player_rank(id).unwrap(), want, "rank of player {id}");
    }
    board.close();
}

#[test]
fn tie_break_rewards_the_earlier_achiever_regardless_of_id() {
    let board = LeaderboardBuilder::new("t", "ties").build().unwrap();
    board.apply_update(9, 100).unwrap(); // bigger id, but first to the score
    std::thread::sleep(Duration::from_millis(2));
    board.apply_update(1, 100).unwrap();

    assert_eq!(board.player_rank(9).unwrap(), 1);
    assert_eq!(board.player_rank(1).unwrap(), 2);
    board.close();
}

#[test]
fn top_n_returns_rank_ordered_views() {
    let board = seeded_board();
    let top = board.top_n(3);
    assert_eq!(top.len(), 3);
    assert_eq!(top_ids(&board, 3), vec![2, 4, 3]);
    for (i, view) in top.iter().enumerate() {
        assert_eq!(view.rank, i as u64 + 1, "rank field is filled per position");
    }
    assert!(
        top.windows(2).all(|w| w[0].score >= w[1].score),
        "scores must be non-increasing"
    );
    board.close();
}

#[test]
fn top_n_clamps_to_population() {
    let board = seeded_board();
    assert_eq!(board.top_n(100).len(), 5);
    assert!(board.top_n(0).is_empty());
    board.close();
}

#[test]
fn update_moves_a_player_to_the_top() {
    let board = seeded_board();
    board.apply_update(1, 60).unwrap();

    assert_eq!(board.player_rank(1).unwrap(), 1);
    assert_eq!(top_ids(&board, 3), vec![1, 2, 4]);
    board.close();
}

#[test]
fn unknown_player_yields_not_found() {
    let board = seeded_board();
    assert!(matches!(
        board.player_rank(99_999),
        Err(Error::PlayerNotFound(99_999))
    ));
    assert!(matches!(
        board.nearby(99_999, 2),
        Err(Error::PlayerNotFound(99_999))
    ));
    board.close();
}

#[test]
fn nearby_returns_the_surrounding_window() {
    let board = seeded_board();
    let near = board.nearby(3, 1).unwrap();
    let ids: Vec<_> = near.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![4, 3, 1], "rank 2..=4 window around player 3");
    let ranks: Vec<_> = near.iter().map(|p| p.rank).collect();
    assert_eq!(ranks, vec![2, 3, 4]);

    // Window clamped at the edges of the board.
    let top_edge = board.nearby(2, 3).unwrap();
    assert_eq!(top_edge.first().unwrap().rank, 1);
    board.close();
}

// ---------------------------------------------------------------------------
// Cache consistency
// ---------------------------------------------------------------------------

#[test]
fn mutation_invalidates_cached_top_n() {
    let board = seeded_board();
    assert_eq!(top_ids(&board, 3), vec![2, 4, 3]); // populate the cache
    board.apply_update(5, 100).unwrap();

    let top = board.top_n(3);
    assert_eq!(top[0].id, 5, "new leader must be visible immediately");
    assert_eq!(top[0].rank, 1);
    board.close();
}

#[test]
fn repeated_top_n_hits_the_cache() {
    let board = seeded_board();
    let _ = board.top_n(3);
    let _ = board.top_n(3);
    let _ = board.top_n(3);
    let metrics = board.metrics();
    assert!(metrics.cache_hits >= 2, "hits: {}", metrics.cache_hits);
    board.close();
}

// ---------------------------------------------------------------------------
// Update pipeline
// ---------------------------------------------------------------------------

#[test]
fn queued_updates_become_visible_within_a_flush_interval() {
    let board = LeaderboardBuilder::new("q", "queued").build().unwrap();
    for i in 0..250i64 {
        board.update_score(i, i).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    while board.player_count() < 250 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(board.player_count(), 250);
    assert_eq!(board.player_rank(249).unwrap(), 1);
    board.close();
}

#[test]
fn full_queue_falls_back_to_synchronous_apply_without_loss() {
    let board = LeaderboardBuilder::new("f", "full")
        .queue_capacity(4)
        .build()
        .unwrap();
    for i in 0..2_000i64 {
        board.update_score(i, i % 100).unwrap();
    }
    board.close();

    assert_eq!(board.player_count(), 2_000);
    assert_eq!(board.metrics().updates, 2_000, "no update may be dropped");
}

#[test]
fn concurrent_writers_and_readers_settle_consistently() {
    let board = Arc::new(LeaderboardBuilder::new("c", "concurrent").build().unwrap());
    let mut handles = Vec::new();
    for t in 0..4i64 {
        let board = Arc::clone(&board);
        handles.push(std::thread::spawn(move || {
            for i in 0..500i64 {
                board.update_score(t * 500 + i, i).unwrap();
                if i % 50 == 0 {
                    let _ = board.top_n(10);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    board.close();

    assert_eq!(board.player_count(), 2_000);
    let top = board.top_n(10);
    assert_eq!(top.len(), 10);
    let mut ids: Vec<_> = top.iter().map(|p| p.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 10, "top_n ids must be distinct");
}

// ---------------------------------------------------------------------------
// Snapshot / replay hooks
// ---------------------------------------------------------------------------

#[test]
fn snapshot_round_trip_preserves_ranks_and_tie_order() {
    let board = seeded_board();
    let mut buf: Vec<u8> = Vec::new();
    board.snapshot(&mut buf).unwrap();
    board.close();

    let restored = LeaderboardBuilder::new("test", "restored")
        .load(buf.as_slice())
        .unwrap();
    assert_eq!(restored.player_count(), 5);
    for (id, want) in [(2, 1), (4, 2), (3, 3), (1, 4), (5, 5)] {
        assert_eq!(
            restored.player_rank(id).unwrap(),
            want,
            "restored rank of {id}"
        );
    }
    restored.close();
}

#[test]
fn replay_through_apply_update_rebuilds_state() {
    let board = LeaderboardBuilder::new("r", "replayed").build().unwrap();
    // An external append-only log replays in arrival order.
    for (id, score) in [(1, 10), (2, 30), (1, 40), (3, 20)] {
        board.apply_update(id, score).unwrap();
    }
    assert_eq!(board.player_rank(1).unwrap(), 1, "latest score wins");
    assert_eq!(board.player_count(), 3);
    board.close();
}
