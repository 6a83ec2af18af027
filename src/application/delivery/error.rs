use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("delivery API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode delivery response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("delivery client misconfigured: {0}")]
    Configuration(String),
}

impl DeliveryError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True if the upstream reported the requested object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DeliveryError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}
