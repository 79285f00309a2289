//! Failure taxonomy for a single capture-and-detect round.
//!
//! None of these are fatal. The polling loop logs them and waits for the next tick;
//! everything outside a round propagates `anyhow::Error` with context instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoundError {
    /// The frame source produced nothing this tick.
    #[error("no frame available from capture device")]
    CaptureUnavailable,

    /// Transport-level failure talking to the detection backend.
    #[error("detection backend unreachable: {reason}")]
    BackendUnreachable { reason: String },

    /// The backend answered with a non-success status.
    #[error("detection backend returned HTTP {status}")]
    BackendRejected { status: u16 },

    #[error("detection backend sent an unreadable response: {reason}")]
    MalformedResponse { reason: String },

    /// The result belongs to a session that is no longer current.
    #[error("result for session {round_session} discarded; current session is {current:?}")]
    SessionMismatch {
        round_session: String,
        current: Option<String>,
    },

    #[error("round exceeded {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

impl From<reqwest::Error> for RoundError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            RoundError::BackendRejected {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            RoundError::MalformedResponse {
                reason: err.to_string(),
            }
        } else {
            RoundError::BackendUnreachable {
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_names_both_sessions() {
        let err = RoundError::SessionMismatch {
            round_session: "old".into(),
            current: Some("new".into()),
        };
        let message = err.to_string();
        assert!(message.contains("old"));
        assert!(message.contains("new"));
    }

    #[test]
    fn rejected_mentions_status() {
        let err = RoundError::BackendRejected { status: 503 };
        assert_eq!(err.to_string(), "detection backend returned HTTP 503");
    }
}
