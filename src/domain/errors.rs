// Errors shared across layers that are not owned by a single aggregate.

use std::fmt;

/// Failures of one assistant completion attempt. None of them are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    Upstream(String),
    Timeout,
    EmptyReply,
    Disabled,
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiError::Upstream(detail) => write!(f, "assistant upstream error: {detail}"),
            AiError::Timeout => f.write_str("assistant request timed out"),
            AiError::EmptyReply => f.write_str("assistant returned an empty reply"),
            AiError::Disabled => f.write_str("assistant is not configured"),
        }
    }
}

impl std::error::Error for AiError {}

/// Reasons a join handshake is refused by the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    RoomClosed,
    Kicked,
    RoomUnavailable,
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::RoomClosed => f.write_str("room closed"),
            JoinError::Kicked => f.write_str("kicked from room"),
            JoinError::RoomUnavailable => f.write_str("room unavailable"),
        }
    }
}

impl std::error::Error for JoinError {}
