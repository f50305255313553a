use thiserror::Error;

use alumnet_shared::ProtocolError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("could not determine data directory")]
    NoDataDir,

    #[error("no conversation selected")]
    NoSelection,

    #[error("Message is required")]
    EmptyContent,

    #[error("live channel is closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
