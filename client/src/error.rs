use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed frame: {0}")]
    Codec(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("join rejected ({code}): {reason}")]
    Rejected { code: u16, reason: String },

    #[error("disconnected by server: {0}")]
    Disconnected(String),

    #[error("connection closed")]
    Closed,
}

impl ClientError {
    /// True for rejections a user could fix by retrying later, e.g. a match in progress.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Rejected { code: 409, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_display() {
        let err = ClientError::Rejected {
            code: 409,
            reason: "slimevolley match already in progress".to_string(),
        };
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "join rejected (409): slimevolley match already in progress"
        );
        assert!(!ClientError::Closed.is_conflict());
    }
}
