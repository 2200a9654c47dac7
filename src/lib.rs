//! In-process systems primitives: a hierarchical timing-wheel scheduler
//! ([`timer`]) and a hybrid leaderboard engine ([`board`]).
//!
//! Both cores are plain-thread constructs (no async runtime) built for
//! high task/update volume: the timer sleeps exactly until the next expiry
//! and cascades far-dated tasks through lazily created coarser wheels; the
//! leaderboard combines an indexed skip list, a bounded top-K heap, and a
//! short-TTL TopN cache behind a batched update pipeline.

pub mod board;
mod error;
pub mod timer;

pub use board::{BoardMetrics, Leaderboard, LeaderboardBuilder, PlayerView};
pub use error::Error;
pub use timer::{TaskHandle, TimerBuilder, TimerMetrics, TimingWheel};
