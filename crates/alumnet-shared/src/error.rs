use thiserror::Error;

/// Errors raised while decoding or validating wire data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Message content is empty")]
    EmptyContent,
}
