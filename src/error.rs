//! Error types shared by the engine.
//!
//! `Cancelled` and `Exhausted` are part of normal operation: the viewer
//! swallows the former and turns the latter into a soft "shake" cue.

use thiserror::Error;

/// Failure reported by a [`crate::source::FetchBytes`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The backend asked us to slow down; the media cache retries these.
    #[error("rate limited by media backend")]
    RateLimited,
    #[error("media not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

/// Failure reported by a [`crate::source::SetSource`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("unknown set: {0}")]
    UnknownSet(String),
    #[error("{0}")]
    Other(String),
}

/// Failure to keep the screen awake.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WakeLockError {
    #[error("no {0} available on this platform")]
    Unsupported(&'static str),
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ViewerError {
    /// Network or storage failure after all retries.
    #[error("failed to fetch {id}: {source}")]
    FetchFailure {
        id: String,
        #[source]
        source: FetchError,
    },
    /// Superseded by a newer request. Never shown to the user.
    #[error("request cancelled")]
    Cancelled,
    /// Nothing more can be appended to the current context.
    #[error("no more images available")]
    Exhausted,
    /// Requested with no open context, or from a context that does not allow it.
    #[error("invalid navigation state: {0}")]
    InvalidState(&'static str),
    #[error("set source failed: {0}")]
    Source(#[from] SourceError),
    #[error("failed to decode {id}: {reason}")]
    Decode { id: String, reason: String },
}

impl ViewerError {
    /// Whether this error should be absorbed rather than shown to the user.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            ViewerError::Cancelled | ViewerError::Exhausted | ViewerError::InvalidState(_)
        )
    }
}

pub type Result<T, E = ViewerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_and_exhaustion_are_silent() {
        assert!(ViewerError::Cancelled.is_silent());
        assert!(ViewerError::Exhausted.is_silent());
        assert!(ViewerError::InvalidState("no context").is_silent());
        let fetch = ViewerError::FetchFailure {
            id: "a".into(),
            source: FetchError::RateLimited,
        };
        assert!(!fetch.is_silent());
        assert_eq!(fetch.to_string(), "failed to fetch a: rate limited by media backend");
    }
}
