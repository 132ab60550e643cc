//! Error types surfaced by the room server

use shared::RoomKind;
use thiserror::Error;

/// Why a join, create or reconnect attempt was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("room '{0}' not found")]
    RoomNotFound(String),

    #[error("unknown room type '{0}'")]
    UnknownKind(String),

    #[error("{0} match already in progress")]
    InProgress(RoomKind),

    #[error("room is full")]
    RoomFull,

    #[error("session {0} cannot be resumed")]
    NotResumable(u32),

    #[error("room is shutting down")]
    RoomClosed,
}

impl JoinError {
    /// HTTP-style status code reported to the client.
    pub fn code(&self) -> u16 {
        match self {
            JoinError::RoomNotFound(_) | JoinError::UnknownKind(_) | JoinError::NotResumable(_) => {
                404
            }
            JoinError::InProgress(_) | JoinError::RoomFull => 409,
            JoinError::RoomClosed => 410,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.code() == 409
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed frame: {0}")]
    Codec(#[from] bincode::Error),

    #[error("client closed the connection before joining")]
    HandshakeAborted,

    #[error("unexpected message before join")]
    UnexpectedHandshake,
}
