use thiserror::Error;

/// Raised before any item is touched; maps to exit status 1.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Service error: {0}")]
    Service(#[from] anyhow::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),

    #[error("Sweep cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Exit status for a sweep that ended early. An unreadable source
    /// directory is an argument problem; everything else counts as failed work.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Io(_) => 1,
            _ => 2,
        }
    }
}
