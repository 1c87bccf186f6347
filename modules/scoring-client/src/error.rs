use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoringError>;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Client build error: {0}")]
    Build(String),
}

impl From<reqwest::Error> for ScoringError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ScoringError::Parse(err.to_string())
        } else {
            ScoringError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ScoringError {
    fn from(err: serde_json::Error) -> Self {
        ScoringError::Parse(err.to_string())
    }
}
