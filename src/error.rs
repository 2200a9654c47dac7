use thiserror::Error;

/// Errors surfaced by the public API.
///
/// User-callback panics are deliberately **not** represented here: they are
/// caught at the worker boundary, logged, and swallowed so one bad task
/// cannot take down a driver loop.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested player id has no record on the board.
    #[error("player {0} not found")]
    PlayerNotFound(i64),

    /// The operation was attempted after `close()` / `stop()`.
    #[error("closed")]
    Closed,

    /// A constructor or operation received an out-of-range argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Snapshot I/O failure.
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encode/decode failure.
    #[error("snapshot codec: {0}")]
    Codec(#[from] serde_json::Error),
}
