/// Errors produced while building or waiting on a limiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    /// The limiter was configured to admit nothing.
    #[error("request limit must be greater than zero")]
    InvalidCapacity,

    /// The window has no length, so no admission could ever be tracked.
    #[error("window duration must be greater than zero")]
    InvalidWindow,

    /// The caller gave up waiting before a quota slot became available.
    ///
    /// Nothing was recorded for the cancelled attempt.
    #[error("cancelled while waiting for rate limit capacity")]
    Cancelled,
}
