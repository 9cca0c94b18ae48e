use tokio_tungstenite::tungstenite;

/// Synchronous precondition failures of the session façade.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("the session must be started first; call start()")]
    NotStarted,

    #[error("a session is already running; call stop() before starting another")]
    AlreadyStarted,

    #[error("no tokio runtime is available to drive the session")]
    NoRuntime,
}

/// Failures of the request/response half of the protocol.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error("negotiation response has no {0}")]
    Incomplete(&'static str),
}

impl ClientError {
    /// True when the bot service could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Http(err) if err.is_connect() || err.is_timeout())
    }
}

/// Failures of the streaming half of the protocol.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to open stream: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("stream transport error: {0}")]
    Transport(#[source] tungstenite::Error),

    #[error("dropped undecodable frame: {0}")]
    Decode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_started_display() {
        assert_eq!(
            SessionError::NotStarted.to_string(),
            "the session must be started first; call start()"
        );
    }

    #[test]
    fn status_display_includes_body() {
        let err = ClientError::Status {
            status: reqwest::StatusCode::FORBIDDEN,
            body: "bad secret".to_string(),
        };
        assert_eq!(err.to_string(), "server returned 403 Forbidden: bad secret");
        assert!(!err.is_unavailable());
    }

    #[test]
    fn incomplete_display() {
        let err = ClientError::Incomplete("streamUrl");
        assert_eq!(err.to_string(), "negotiation response has no streamUrl");
    }

    #[tokio::test]
    async fn connect_refused_is_unavailable() {
        // Port 1 is reserved and nothing listens on it
        let err = reqwest::get("http://127.0.0.1:1/nope").await.unwrap_err();
        assert!(ClientError::from(err).is_unavailable());
    }

    #[test]
    fn decode_error_wraps_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = StreamError::from(serde_err);
        assert!(err.to_string().starts_with("dropped undecodable frame:"));
    }

    #[test]
    fn connect_error_display() {
        let err = StreamError::Connect(tungstenite::Error::ConnectionClosed);
        assert!(err.to_string().starts_with("failed to open stream:"));
    }
}
