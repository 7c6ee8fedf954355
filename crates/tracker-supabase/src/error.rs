use thiserror::Error;
use tracker_core::CoreError;

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Supabase API error {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Channel join rejected: {0}")]
    JoinRejected(String),

    #[error("Realtime connection closed")]
    ConnectionClosed,
}

pub type SupabaseResult<T> = Result<T, SupabaseError>;

impl From<SupabaseError> for CoreError {
    fn from(e: SupabaseError) -> Self {
        match e {
            SupabaseError::Websocket(_)
            | SupabaseError::JoinRejected(_)
            | SupabaseError::ConnectionClosed => CoreError::Feed(e.to_string()),
            other => CoreError::Store(other.to_string()),
        }
    }
}
