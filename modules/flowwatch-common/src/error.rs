use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowwatchError>;

/// Run-level failure taxonomy. Every variant aborts the current run under the
/// default policy; none are retried in-process.
#[derive(Error, Debug)]
pub enum FlowwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error ({stage}): {message}")]
    Transport { stage: &'static str, message: String },

    #[error("Decode error ({stage}): {message}")]
    Decode { stage: &'static str, message: String },

    #[error("Encode error ({stage}): {message}")]
    Encode { stage: &'static str, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Contract violation: {0}")]
    Contract(String),
}

impl FlowwatchError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
